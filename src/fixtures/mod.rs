//! Loads property lists into an [`InMemoryLedger`] and exports snapshots, so
//! demos and tests can start from a readable CSV file.

use std::io::Read;

use anyhow::{Context, Result};
use tracing::debug;

use crate::{
    ledger::{
        Address,
        in_memory_ledger::{InMemoryLedger, PropertyRecord},
    },
    property::{AssetRef, PropertyId},
    units::to_minor_units,
};

pub mod csv_parser;
pub mod csv_printer;

use csv_parser::{CsvPropertyParser, PropertyRow};
pub use csv_printer::print_snapshot;

fn record(row: PropertyRow) -> Result<PropertyRecord> {
    let owner: Address = row
        .owner
        .parse()
        .with_context(|| format!("invalid owner `{}`", row.owner))?;
    let price = to_minor_units(&row.price)?;
    let asset_refs = row.image_refs().map(AssetRef::new).collect();
    Ok(PropertyRecord {
        name: row.name,
        location: row.location,
        description: row.description,
        price,
        asset_refs,
        owner,
        is_listed_for_sale: row.listed,
    })
}

/// Inserts every row of `source` into `ledger`, in file order.
///
/// Stops at the first bad row; rows before it stay inserted.
pub fn seed_ledger<R>(ledger: &InMemoryLedger, source: R) -> Result<Vec<PropertyId>>
where
    R: Read,
{
    let mut ids = Vec::new();
    for (line, row) in CsvPropertyParser::new(source) {
        let record = row
            .map_err(anyhow::Error::from)
            .and_then(record)
            .with_context(|| format!("property row at line {line}"))?;
        let id = ledger.insert(record);
        debug!(id, line, "seeded property");
        ids.push(id);
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROWS: &str = "\
name,location,price,images,description,owner,listed
Canal House, Amsterdam ,1.25,QmA|QmB,Three floors,0x0101010101010101010101010101010101010101,true
Barn,Utrecht,0.5,,,0x0202020202020202020202020202020202020202,false
";

    #[test]
    fn seed_rows_in_order() {
        let ledger = InMemoryLedger::default();
        let ids = seed_ledger(&ledger, ROWS.as_bytes()).unwrap();
        assert_eq!(ids, vec![1, 2]);

        let canal = ledger.property(1).unwrap();
        assert_eq!(canal.location, "Amsterdam");
        assert_eq!(canal.price_display(), "1.25");
        assert_eq!(canal.asset_refs, vec![AssetRef::new("QmA"), AssetRef::new("QmB")]);
        assert!(canal.is_listed_for_sale);

        let barn = ledger.property(2).unwrap();
        assert!(barn.asset_refs.is_empty());
        assert_eq!(barn.owner, Address::repeat_byte(0x02));
    }

    #[test]
    fn report_the_failing_line() {
        let rows = "\
name,location,price,images,description,owner,listed
Ok,Bern,1,,,0x0101010101010101010101010101010101010101,true
Bad,Basel,1.2.3,,,0x0101010101010101010101010101010101010101,true
";
        let ledger = InMemoryLedger::default();
        let err = seed_ledger(&ledger, rows.as_bytes()).unwrap_err();
        assert!(err.to_string().starts_with("property row at line"));
        assert!(format!("{err:#}").contains("`1.2.3`"));
        assert_eq!(ledger.property_count(), 1);
    }
}
