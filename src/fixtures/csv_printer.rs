use std::io::Write;

use csv::Writer;
use serde::Serialize;

use crate::{property::PropertyId, registry::RegistrySnapshot};

#[derive(Debug, Serialize)]
pub struct PropertyLine {
    pub id: PropertyId,
    pub name: String,
    pub location: String,
    pub price: String,
    pub owner: String,
    pub listed: bool,
    pub images: String,
}

/// Writes every property of `snapshot` in id order.
pub fn print_snapshot<W>(output: &mut W, snapshot: &RegistrySnapshot) -> anyhow::Result<()>
where
    W: Write,
{
    let mut writer = Writer::from_writer(output);
    for property in snapshot {
        let line = PropertyLine {
            id: property.id,
            name: property.name.clone(),
            location: property.location.clone(),
            price: property.price_display(),
            owner: property.owner.to_string(),
            listed: property.is_listed_for_sale,
            images: property
                .asset_refs
                .iter()
                .map(|asset| asset.as_str())
                .collect::<Vec<_>>()
                .join("|"),
        };
        if let Err(err) = writer.serialize(line) {
            anyhow::bail!("Failed to write to CSV: {err}")
        }
    }
    if let Err(err) = writer.flush() {
        anyhow::bail!("Failed to flush CSV writer: {err}")
    }
    Ok(())
}
