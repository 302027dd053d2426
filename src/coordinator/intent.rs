use thiserror::Error;

use crate::{
    assets::Blob,
    error::ErrorKind,
    ledger::{TransactionRequest, WriteCall},
    property::{AssetRef, PropertyId},
    registry::RegistrySnapshot,
    units::{AmountError, MinorUnits, to_minor_units},
    wallet::Session,
};

/// Image of a modified property: keep the stored one or upload a replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetSource {
    Keep(AssetRef),
    Upload(Blob),
}

/// A mutating action as the user entered it. Prices are display strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    AddProperty {
        name: String,
        location: String,
        price: String,
        description: String,
        assets: Vec<Blob>,
    },
    /// `price` is the price the user was shown; it is attached as the value.
    BuyProperty {
        id: PropertyId,
        price: MinorUnits,
    },
    ListForSale {
        id: PropertyId,
        price: String,
    },
    RemoveFromSale {
        id: PropertyId,
    },
    ModifyDetails {
        id: PropertyId,
        name: String,
        location: String,
        price: String,
        description: String,
        asset: AssetSource,
    },
}

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Intent::AddProperty { .. } => "add_property",
            Intent::BuyProperty { .. } => "buy_property",
            Intent::ListForSale { .. } => "list_for_sale",
            Intent::RemoveFromSale { .. } => "remove_from_sale",
            Intent::ModifyDetails { .. } => "modify_details",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Connect a wallet first")]
    NotConnected,
    #[error("The wallet account changed, review the action and try again")]
    AccountChanged,
    #[error("`{field}` is required")]
    MissingField { field: &'static str },
    #[error("`{field}` is not a valid amount: {source}")]
    InvalidPrice {
        field: &'static str,
        #[source]
        source: AmountError,
    },
    #[error("At least one image is required")]
    MissingAsset,
    #[error("Property {id} is not in the current registry")]
    UnknownProperty { id: PropertyId },
    #[error("Property {id} is not listed for sale")]
    NotListed { id: PropertyId },
    #[error("You already own property {id}")]
    AlreadyOwner { id: PropertyId },
    #[error("The price of property {id} changed from {offered} to {listed}")]
    PriceChanged {
        id: PropertyId,
        offered: MinorUnits,
        listed: MinorUnits,
    },
}

/// Intent that passed validation, with prices in minor units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PreparedIntent {
    Add {
        name: String,
        location: String,
        price: MinorUnits,
        description: String,
        assets: Vec<Blob>,
    },
    Buy {
        id: PropertyId,
        price: MinorUnits,
    },
    List {
        id: PropertyId,
        price: MinorUnits,
    },
    Remove {
        id: PropertyId,
    },
    Modify {
        id: PropertyId,
        name: String,
        location: String,
        price: MinorUnits,
        description: String,
        asset: AssetSource,
    },
}

impl ValidationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ValidationError::InvalidPrice { .. } => ErrorKind::InvalidAmount,
            _ => ErrorKind::ValidationError,
        }
    }
}

/// Text is stored verbatim; blank values are rejected.
fn required(field: &'static str, value: &str) -> Result<String, ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::MissingField { field })
    } else {
        Ok(value.to_string())
    }
}

fn price(field: &'static str, value: &str) -> Result<MinorUnits, ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField { field });
    }
    to_minor_units(value).map_err(|source| ValidationError::InvalidPrice { field, source })
}

fn known(snapshot: &RegistrySnapshot, id: PropertyId) -> Result<(), ValidationError> {
    snapshot
        .get(id)
        .map(|_| ())
        .ok_or(ValidationError::UnknownProperty { id })
}

impl Intent {
    /// Local checks only; nothing here touches the network.
    pub(crate) fn validate(
        &self,
        snapshot: &RegistrySnapshot,
        session: &Session,
    ) -> Result<PreparedIntent, ValidationError> {
        let account = session.address.ok_or(ValidationError::NotConnected)?;

        match self {
            Intent::AddProperty {
                name,
                location,
                price: display_price,
                description,
                assets,
            } => {
                let name = required("name", name)?;
                let location = required("location", location)?;
                let price = price("price", display_price)?;
                if assets.is_empty() {
                    return Err(ValidationError::MissingAsset);
                }
                Ok(PreparedIntent::Add {
                    name,
                    location,
                    price,
                    description: description.clone(),
                    assets: assets.clone(),
                })
            }
            Intent::BuyProperty { id, price } => {
                let property = snapshot
                    .get(*id)
                    .ok_or(ValidationError::UnknownProperty { id: *id })?;
                if !property.is_listed_for_sale {
                    return Err(ValidationError::NotListed { id: *id });
                }
                if property.is_owned_by(&account) {
                    return Err(ValidationError::AlreadyOwner { id: *id });
                }
                if property.price != *price {
                    return Err(ValidationError::PriceChanged {
                        id: *id,
                        offered: *price,
                        listed: property.price,
                    });
                }
                Ok(PreparedIntent::Buy {
                    id: *id,
                    price: *price,
                })
            }
            Intent::ListForSale {
                id,
                price: display_price,
            } => {
                known(snapshot, *id)?;
                Ok(PreparedIntent::List {
                    id: *id,
                    price: price("price", display_price)?,
                })
            }
            Intent::RemoveFromSale { id } => {
                known(snapshot, *id)?;
                Ok(PreparedIntent::Remove { id: *id })
            }
            Intent::ModifyDetails {
                id,
                name,
                location,
                price: display_price,
                description,
                asset,
            } => {
                known(snapshot, *id)?;
                let name = required("name", name)?;
                let location = required("location", location)?;
                let price = price("price", display_price)?;
                if let AssetSource::Keep(asset_ref) = asset {
                    required("image", asset_ref.as_str())?;
                }
                Ok(PreparedIntent::Modify {
                    id: *id,
                    name,
                    location,
                    price,
                    description: description.clone(),
                    asset: asset.clone(),
                })
            }
        }
    }
}

impl PreparedIntent {
    /// Blobs that must be uploaded before submission.
    pub(crate) fn pending_uploads(&self) -> &[Blob] {
        match self {
            PreparedIntent::Add { assets, .. } => assets,
            PreparedIntent::Modify {
                asset: AssetSource::Upload(blob),
                ..
            } => std::slice::from_ref(blob),
            _ => &[],
        }
    }

    /// Builds the ledger request; `uploaded` holds the identifiers of
    /// [`Self::pending_uploads`] in the same order.
    ///
    /// `None` when an upload the request depends on produced no identifier.
    pub(crate) fn into_request(self, uploaded: Vec<AssetRef>) -> Option<TransactionRequest> {
        let request = match self {
            PreparedIntent::Add {
                name,
                location,
                price,
                description,
                ..
            } => TransactionRequest::new(WriteCall::AddProperty {
                name,
                location,
                price,
                asset_refs: uploaded,
                description,
            }),
            PreparedIntent::Buy { id, price } => {
                TransactionRequest::with_value(WriteCall::BuyProperty { id }, price)
            }
            PreparedIntent::List { id, price } => {
                TransactionRequest::new(WriteCall::ListPropertyForSale { id, price })
            }
            PreparedIntent::Remove { id } => {
                TransactionRequest::new(WriteCall::RemovePropertyFromSale { id })
            }
            PreparedIntent::Modify {
                id,
                name,
                location,
                price,
                description,
                asset,
            } => {
                let asset_ref = match asset {
                    AssetSource::Keep(asset_ref) => asset_ref,
                    AssetSource::Upload(_) => uploaded.into_iter().next()?,
                };
                TransactionRequest::new(WriteCall::ModifyPropertyDetails {
                    id,
                    name,
                    location,
                    price,
                    asset_ref,
                    description,
                })
            }
        };
        Some(request)
    }
}
