use super::reader_builder;
use crate::domain::plugin::SitePlugin;
use crate::error::{CardPresentError, Result};
use std::io::Read;

/// Reads a site's plugin inventory from CSV.
///
/// Expected header: `site_id, plugin, display_name, version, is_active,
/// is_network_active`. Whitespace around fields is trimmed.
pub struct PluginReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> PluginReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: reader_builder().from_reader(source),
        }
    }

    /// Lazily deserializes one plugin per row.
    pub fn plugins(self) -> impl Iterator<Item = Result<SitePlugin>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(CardPresentError::from))
    }
}
