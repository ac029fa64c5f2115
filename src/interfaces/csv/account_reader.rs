use super::reader_builder;
use crate::domain::account::PaymentGatewayAccount;
use crate::error::{CardPresentError, Result};
use std::io::Read;

/// Reads cached gateway accounts from CSV, one account per row.
///
/// `requirements_deadline` is an RFC 3339 timestamp or empty. The
/// `statement_descriptor` and `default_currency` columns may be omitted.
pub struct AccountReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> AccountReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: reader_builder().from_reader(source),
        }
    }

    pub fn accounts(self) -> impl Iterator<Item = Result<PaymentGatewayAccount>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(CardPresentError::from))
    }
}
