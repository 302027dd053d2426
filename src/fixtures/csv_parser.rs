use std::io::Read;

use csv::{DeserializeRecordsIntoIter, Trim};
use serde::Deserialize;

/// One property per row. `images` holds identifiers separated by `|`.
#[derive(Debug, Deserialize)]
pub struct PropertyRow {
    pub name: String,
    pub location: String,
    pub price: String,
    #[serde(default)]
    pub images: String,
    #[serde(default)]
    pub description: String,
    pub owner: String,
    pub listed: bool,
}

impl PropertyRow {
    pub fn image_refs(&self) -> impl Iterator<Item = &str> {
        self.images
            .split('|')
            .map(str::trim)
            .filter(|image| !image.is_empty())
    }
}

/// Parses a property list in CSV format, with the line of each row.
pub struct CsvPropertyParser<R> {
    iter: DeserializeRecordsIntoIter<R, PropertyRow>,
}

impl<R> CsvPropertyParser<R>
where
    R: Read,
{
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(source);

        Self {
            iter: reader.into_deserialize(),
        }
    }
}

impl<R> Iterator for CsvPropertyParser<R>
where
    R: Read,
{
    type Item = (u64, Result<PropertyRow, csv::Error>);

    fn next(&mut self) -> Option<Self::Item> {
        let curr_line = self.iter.reader().position().line();
        self.iter.next().map(|row| (curr_line, row))
    }
}
