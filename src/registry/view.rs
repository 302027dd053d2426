use std::collections::BTreeSet;

use crate::{
    assets::AssetUploader,
    ledger::Address,
    property::{Property, PropertyId},
    units,
    wallet::Session,
};

use super::RegistrySnapshot;

/// Fractional digits shown on compact price labels.
pub const SHORT_PRICE_DECIMALS: u32 = 4;

/// Role predicates of one account against one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleView {
    pub snapshot_sequence: u64,
    pub session_epoch: u64,
    pub address: Option<Address>,
    pub is_admin: bool,
    owned: BTreeSet<PropertyId>,
}

impl RoleView {
    pub fn is_mine(&self, id: PropertyId) -> bool {
        self.owned.contains(&id)
    }

    pub fn owned(&self) -> impl Iterator<Item = PropertyId> + '_ {
        self.owned.iter().copied()
    }

    /// `false` once the account or the snapshot moved on since derivation.
    pub fn is_current(&self, session: &Session, snapshot: &RegistrySnapshot) -> bool {
        self.session_epoch == session.epoch && self.snapshot_sequence == snapshot.sequence()
    }
}

/// Recomputes role predicates; no I/O.
pub fn derive_roles(snapshot: &RegistrySnapshot, session: &Session) -> RoleView {
    let (is_admin, owned) = match session.address {
        Some(address) => (
            snapshot.admin() == Some(address),
            snapshot
                .iter()
                .filter(|property| property.is_owned_by(&address))
                .map(|property| property.id)
                .collect(),
        ),
        None => (false, BTreeSet::new()),
    };
    RoleView {
        snapshot_sequence: snapshot.sequence(),
        session_epoch: session.epoch,
        address: session.address,
        is_admin,
        owned,
    }
}

/// What a property card needs to render and gate its actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyView {
    pub property: Property,
    pub price_display: String,
    pub price_short: String,
    pub image_urls: Vec<String>,
    pub is_mine: bool,
    pub can_buy: bool,
    /// List or withdraw from sale.
    pub can_manage_listing: bool,
    pub can_modify: bool,
}

pub fn property_views(
    snapshot: &RegistrySnapshot,
    roles: &RoleView,
    assets: &AssetUploader,
) -> Vec<PropertyView> {
    snapshot
        .iter()
        .map(|property| {
            let is_mine = roles.is_mine(property.id);
            PropertyView {
                price_display: property.price_display(),
                price_short: units::to_display_rounded(property.price, SHORT_PRICE_DECIMALS),
                image_urls: property
                    .asset_refs
                    .iter()
                    .map(|asset| assets.resolve(asset))
                    .collect(),
                is_mine,
                can_buy: roles
                    .address
                    .is_some_and(|address| property.can_be_bought_by(&address)),
                can_manage_listing: is_mine,
                can_modify: roles.is_admin,
                property: property.clone(),
            }
        })
        .collect()
}
