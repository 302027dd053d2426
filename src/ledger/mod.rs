use async_trait::async_trait;
use thiserror::Error;

use crate::{
    property::{AssetRef, PropertyId},
    units::MinorUnits,
};

pub mod address;
pub mod in_memory_ledger;
pub mod token;

pub use address::{Address, ParseHexError, TxHash};
pub use token::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadCall {
    PropertyCount,
    GetProperty(PropertyId),
    Admin,
}

impl ReadCall {
    pub fn method(&self) -> &'static str {
        match self {
            ReadCall::PropertyCount => "propertyCount",
            ReadCall::GetProperty(_) => "getProperty",
            ReadCall::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteCall {
    AddProperty {
        name: String,
        location: String,
        price: MinorUnits,
        asset_refs: Vec<AssetRef>,
        description: String,
    },
    BuyProperty {
        id: PropertyId,
    },
    ListPropertyForSale {
        id: PropertyId,
        price: MinorUnits,
    },
    RemovePropertyFromSale {
        id: PropertyId,
    },
    /// Admin only.
    ModifyPropertyDetails {
        id: PropertyId,
        name: String,
        location: String,
        price: MinorUnits,
        asset_ref: AssetRef,
        description: String,
    },
}

impl WriteCall {
    pub fn method(&self) -> &'static str {
        match self {
            WriteCall::AddProperty { .. } => "addProperty",
            WriteCall::BuyProperty { .. } => "buyProperty",
            WriteCall::ListPropertyForSale { .. } => "listPropertyForSale",
            WriteCall::RemovePropertyFromSale { .. } => "removePropertyFromSale",
            WriteCall::ModifyPropertyDetails { .. } => "modifyPropertyDetails",
        }
    }
}

/// A contract write together with the value attached to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    pub call: WriteCall,
    pub value: MinorUnits,
}

impl TransactionRequest {
    pub fn new(call: WriteCall) -> Self {
        Self {
            call,
            value: MinorUnits::ZERO,
        }
    }

    pub fn with_value(call: WriteCall, value: MinorUnits) -> Self {
        Self { call, value }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptStatus {
    Success,
    Reverted,
}

/// Inclusion record of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub status: ReceiptStatus,
    pub revert_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("ledger node unreachable: {0}")]
    Unreachable(String),
    #[error("call `{method}` failed: {message}")]
    CallFailed {
        method: &'static str,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignerError {
    #[error("transaction rejected: {0}")]
    Rejected(String),
    #[error("transaction dispatch failed: {0}")]
    Dispatch(String),
}

/// Read access to the deployed contract.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn call(&self, call: ReadCall) -> Result<Token, TransportError>;

    /// `None` while the transaction is not yet included.
    async fn receipt(&self, tx_hash: &TxHash) -> Result<Option<Receipt>, TransportError>;
}

/// Capability to authorize and dispatch a transaction for one account.
#[async_trait]
pub trait Signer: Send + Sync {
    fn address(&self) -> Address;

    async fn send_transaction(&self, request: TransactionRequest) -> Result<TxHash, SignerError>;
}
