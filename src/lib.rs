/// Conversion between the ledger's integer minor units and decimal display amounts.
pub mod units;

/// Error classification shared by every component, so a UI can render a
/// specific message for each failure.
pub mod error;

/// Client configuration: asset gateway, pinning service and confirmation timing.
pub mod config;

/// The property record as the ledger stores it.
pub mod property;

/// Raw ledger surface: addresses, call descriptions, receipts, plus the
/// client and signer traits that reach the deployed contract.
///
/// Also provides an in-memory ledger following the contract's rules, used to
/// drive the rest of the crate without a node.
pub mod ledger;

/// Uploads images to the content-addressed store and resolves their identifiers.
pub mod assets;

/// Typed ledger operations with the submit/confirm write lifecycle.
pub mod gateway;

/// Connected account tracking and account-change notifications.
pub mod wallet;

/// Read-model of all properties, refreshed atomically from the ledger,
/// plus role derivation for the connected account.
pub mod registry;

/// Drives a user intent from validation to refreshed read-model.
pub mod coordinator;

/// CSV helpers to seed an in-memory ledger and export a registry snapshot.
pub mod fixtures;
