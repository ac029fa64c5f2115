//! CSV import of a site's cached records, used by the offline CLI flow.

pub mod account_reader;
pub mod plugin_reader;

fn reader_builder() -> ::csv::ReaderBuilder {
    let mut builder = ::csv::ReaderBuilder::new();
    builder.trim(::csv::Trim::All).flexible(true);
    builder
}
