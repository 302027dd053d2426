use std::fmt;

use crate::{
    ledger::Address,
    units::{self, MinorUnits},
};

/// Ledger-assigned key of a property. Never reused.
pub type PropertyId = u64;

/// Content identifier of an uploaded image, as stored on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetRef(String);

impl AssetRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for AssetRef {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for AssetRef {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl fmt::Display for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A property exactly as the ledger reports it. Nothing here is computed
/// locally; display values are derived on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub id: PropertyId,
    pub name: String,
    pub location: String,
    pub description: String,
    /// Binding sale price while `is_listed_for_sale` holds.
    pub price: MinorUnits,
    /// Display order only.
    pub asset_refs: Vec<AssetRef>,
    pub owner: Address,
    pub is_listed_for_sale: bool,
}

impl Property {
    pub fn price_display(&self) -> String {
        units::to_display(self.price)
    }

    pub fn is_owned_by(&self, address: &Address) -> bool {
        &self.owner == address
    }

    /// Buying is only valid for a listed property, and never by its owner.
    pub fn can_be_bought_by(&self, buyer: &Address) -> bool {
        self.is_listed_for_sale && !self.is_owned_by(buyer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn property(listed: bool) -> Property {
        Property {
            id: 1,
            name: "Harbor Loft".to_string(),
            location: "Lisbon".to_string(),
            description: String::new(),
            price: units::to_minor_units("2.25").unwrap(),
            asset_refs: vec![AssetRef::new("QmHarbor")],
            owner: Address::repeat_byte(0xaa),
            is_listed_for_sale: listed,
        }
    }

    #[test]
    fn buy_predicate() {
        let buyer = Address::repeat_byte(0xbb);
        let owner = Address::repeat_byte(0xaa);

        assert!(property(true).can_be_bought_by(&buyer));
        assert!(!property(false).can_be_bought_by(&buyer));
        // owners cannot buy their own listing
        assert!(!property(true).can_be_bought_by(&owner));
        assert_eq!(property(true).price_display(), "2.25");
    }
}
