use std::{sync::Arc, time::Duration};

use thiserror::Error;
use tracing::{debug, info, instrument, trace, warn};

use crate::{
    config::ClientConfig,
    error::ErrorKind,
    ledger::{
        Address, LedgerClient, ReadCall, Receipt, ReceiptStatus, SignerError, Token,
        TransactionRequest, TransportError, TxHash, WriteCall,
    },
    property::{AssetRef, Property, PropertyId},
    units::MinorUnits,
    wallet::{Session, WalletError, WalletSession},
};

mod decode;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("No wallet signer is available, connect a wallet first")]
    NoSigner,
    #[error("`{method}` was rejected by the wallet: {reason}")]
    SubmissionRejected {
        method: &'static str,
        reason: String,
    },
    #[error("`{method}` could not be submitted: {reason}")]
    SubmissionError {
        method: &'static str,
        reason: String,
    },
    #[error("Transaction {tx_hash} was not confirmed within {waited:?}, its outcome is unknown")]
    ConfirmationTimeout { tx_hash: TxHash, waited: Duration },
    #[error("Transaction {tx_hash} reverted: {reason}")]
    TransactionReverted { tx_hash: TxHash, reason: String },
    #[error("Ledger read `{method}` failed: {source}")]
    ReadError {
        method: &'static str,
        #[source]
        source: TransportError,
    },
    #[error("Ledger read `{method}` returned an unexpected value: {detail}")]
    DecodeError {
        method: &'static str,
        detail: String,
    },
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::NoSigner => ErrorKind::NoSigner,
            GatewayError::SubmissionRejected { .. } => ErrorKind::SubmissionRejected,
            GatewayError::SubmissionError { .. } => ErrorKind::SubmissionError,
            GatewayError::ConfirmationTimeout { .. } => ErrorKind::ConfirmationTimeout,
            GatewayError::TransactionReverted { .. } => ErrorKind::TransactionReverted,
            GatewayError::ReadError { .. } => ErrorKind::ReadError,
            GatewayError::DecodeError { .. } => ErrorKind::DecodeError,
        }
    }
}

/// Bounds on waiting for a submitted transaction to be included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl From<&ClientConfig> for ConfirmationPolicy {
    fn from(config: &ClientConfig) -> Self {
        Self {
            timeout: config.confirmation_timeout(),
            poll_interval: config.poll_interval(),
        }
    }
}

/// A transaction the ledger included successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmed {
    pub tx_hash: TxHash,
    pub block_number: u64,
}

/// Fields of a new property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProperty {
    pub name: String,
    pub location: String,
    pub price: MinorUnits,
    pub asset_refs: Vec<AssetRef>,
    pub description: String,
}

/// Replacement fields for an existing property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDetails {
    pub name: String,
    pub location: String,
    pub price: MinorUnits,
    pub asset_ref: AssetRef,
    pub description: String,
}

/// Typed access to the property contract.
///
/// Writes are signed by the wallet session's active account and follow a
/// submit/confirm lifecycle; they are never resubmitted. Reads only decode
/// and return values, adopting them is up to the caller.
pub struct LedgerGateway {
    client: Arc<dyn LedgerClient>,
    wallet: Arc<WalletSession>,
    policy: ConfirmationPolicy,
}

impl LedgerGateway {
    pub fn new(
        client: Arc<dyn LedgerClient>,
        wallet: Arc<WalletSession>,
        policy: ConfirmationPolicy,
    ) -> Self {
        Self {
            client,
            wallet,
            policy,
        }
    }

    pub fn policy(&self) -> ConfirmationPolicy {
        self.policy
    }

    async fn read(&self, call: ReadCall) -> Result<Token, GatewayError> {
        self.client
            .call(call)
            .await
            .map_err(|source| GatewayError::ReadError {
                method: call.method(),
                source,
            })
    }

    pub async fn property_count(&self) -> Result<u64, GatewayError> {
        let call = ReadCall::PropertyCount;
        decode::count(self.read(call).await?).map_err(|detail| GatewayError::DecodeError {
            method: call.method(),
            detail,
        })
    }

    pub async fn admin(&self) -> Result<Address, GatewayError> {
        let call = ReadCall::Admin;
        decode::address(self.read(call).await?).map_err(|detail| GatewayError::DecodeError {
            method: call.method(),
            detail,
        })
    }

    pub async fn get_property(&self, id: PropertyId) -> Result<Property, GatewayError> {
        let call = ReadCall::GetProperty(id);
        decode::property(id, self.read(call).await?).map_err(|detail| {
            GatewayError::DecodeError {
                method: call.method(),
                detail,
            }
        })
    }

    /// Every property in ascending id order. Ids run from 1 to the count.
    pub async fn list_all(&self) -> Result<Vec<Property>, GatewayError> {
        let count = self.property_count().await?;
        let mut properties = Vec::new();
        for id in 1..=count {
            properties.push(self.get_property(id).await?);
        }
        Ok(properties)
    }

    /// Signs and sends `request` with the session's signer.
    pub async fn submit(&self, request: TransactionRequest) -> Result<TxHash, GatewayError> {
        self.submit_as(request, self.wallet.session()).await
    }

    /// Like [`Self::submit`], but only for the account of `session`.
    ///
    /// Fails with [`GatewayError::NoSigner`] without dispatching once the
    /// wallet session moved past `session`.
    #[instrument(skip_all, fields(method = request.call.method(), epoch = session.epoch))]
    pub async fn submit_as(
        &self,
        request: TransactionRequest,
        session: Session,
    ) -> Result<TxHash, GatewayError> {
        let method = request.call.method();
        let signer = self.wallet.signer_for(session).await.map_err(|err| match err {
            WalletError::UserRejected => GatewayError::SubmissionRejected {
                method,
                reason: err.to_string(),
            },
            WalletError::ProviderError(reason) => GatewayError::SubmissionError { method, reason },
            WalletError::NoSigner | WalletError::ProviderUnavailable => GatewayError::NoSigner,
        })?;

        match signer.send_transaction(request).await {
            Ok(tx_hash) => {
                info!(%tx_hash, from = %signer.address(), "transaction submitted");
                Ok(tx_hash)
            }
            Err(SignerError::Rejected(reason)) => {
                warn!(%reason, "transaction rejected by the wallet");
                Err(GatewayError::SubmissionRejected { method, reason })
            }
            Err(SignerError::Dispatch(reason)) => {
                warn!(%reason, "transaction dispatch failed");
                Err(GatewayError::SubmissionError { method, reason })
            }
        }
    }

    /// Waits for `tx_hash` to be included, bounded by the policy timeout.
    ///
    /// A revert is terminal. A timeout says nothing about the outcome; the
    /// transaction may still be included later.
    #[instrument(skip(self))]
    pub async fn confirm(&self, tx_hash: TxHash) -> Result<Confirmed, GatewayError> {
        let receipt = tokio::time::timeout(self.policy.timeout, self.wait_for_receipt(&tx_hash))
            .await
            .map_err(|_| {
                warn!(waited = ?self.policy.timeout, "confirmation timed out");
                GatewayError::ConfirmationTimeout {
                    tx_hash,
                    waited: self.policy.timeout,
                }
            })?;

        match receipt.status {
            ReceiptStatus::Success => {
                info!(block = receipt.block_number, "transaction confirmed");
                Ok(Confirmed {
                    tx_hash,
                    block_number: receipt.block_number,
                })
            }
            ReceiptStatus::Reverted => {
                let reason = receipt
                    .revert_reason
                    .unwrap_or_else(|| "execution reverted".to_string());
                warn!(%reason, "transaction reverted");
                Err(GatewayError::TransactionReverted { tx_hash, reason })
            }
        }
    }

    async fn wait_for_receipt(&self, tx_hash: &TxHash) -> Receipt {
        loop {
            match self.client.receipt(tx_hash).await {
                Ok(Some(receipt)) => return receipt,
                Ok(None) => trace!("transaction not included yet"),
                // receipt lookups are idempotent, keep polling until the deadline
                Err(err) => debug!(%err, "receipt lookup failed"),
            }
            tokio::time::sleep(self.policy.poll_interval).await;
        }
    }

    async fn execute(&self, request: TransactionRequest) -> Result<Confirmed, GatewayError> {
        let tx_hash = self.submit(request).await?;
        self.confirm(tx_hash).await
    }

    pub async fn add_property(&self, property: NewProperty) -> Result<Confirmed, GatewayError> {
        self.execute(TransactionRequest::new(WriteCall::AddProperty {
            name: property.name,
            location: property.location,
            price: property.price,
            asset_refs: property.asset_refs,
            description: property.description,
        }))
        .await
    }

    /// `value` must equal the listed price or the ledger reverts.
    pub async fn buy_property(
        &self,
        id: PropertyId,
        value: MinorUnits,
    ) -> Result<Confirmed, GatewayError> {
        self.execute(TransactionRequest::with_value(
            WriteCall::BuyProperty { id },
            value,
        ))
        .await
    }

    pub async fn list_property_for_sale(
        &self,
        id: PropertyId,
        price: MinorUnits,
    ) -> Result<Confirmed, GatewayError> {
        self.execute(TransactionRequest::new(WriteCall::ListPropertyForSale {
            id,
            price,
        }))
        .await
    }

    pub async fn remove_property_from_sale(
        &self,
        id: PropertyId,
    ) -> Result<Confirmed, GatewayError> {
        self.execute(TransactionRequest::new(WriteCall::RemovePropertyFromSale {
            id,
        }))
        .await
    }

    pub async fn modify_property_details(
        &self,
        id: PropertyId,
        details: PropertyDetails,
    ) -> Result<Confirmed, GatewayError> {
        self.execute(TransactionRequest::new(WriteCall::ModifyPropertyDetails {
            id,
            name: details.name,
            location: details.location,
            price: details.price,
            asset_ref: details.asset_ref,
            description: details.description,
        }))
        .await
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        ledger::in_memory_ledger::{InMemoryLedger, PropertyRecord, RecordLayout},
        units::to_minor_units,
        wallet::in_memory_wallet::InMemoryWallet,
    };

    use super::*;

    const ADMIN: Address = Address::repeat_byte(0xad);
    const SELLER: Address = Address::repeat_byte(0x5e);
    const BUYER: Address = Address::repeat_byte(0xb1);

    struct Harness {
        ledger: InMemoryLedger,
        provider: Arc<InMemoryWallet>,
        wallet: Arc<WalletSession>,
        gateway: LedgerGateway,
    }

    fn harness(account: Address) -> Harness {
        let ledger = InMemoryLedger::new(ADMIN);
        ledger.insert(PropertyRecord {
            name: "Mill House".to_string(),
            location: "Bruges".to_string(),
            description: String::new(),
            price: to_minor_units("4").unwrap(),
            asset_refs: vec![AssetRef::new("QmMill")],
            owner: SELLER,
            is_listed_for_sale: true,
        });
        let provider = Arc::new(InMemoryWallet::new(ledger.clone(), Some(account)));
        let wallet = Arc::new(WalletSession::new(provider.clone()));
        let gateway = LedgerGateway::new(
            Arc::new(ledger.clone()),
            wallet.clone(),
            ConfirmationPolicy {
                timeout: Duration::from_secs(30),
                poll_interval: Duration::from_millis(100),
            },
        );
        Harness {
            ledger,
            provider,
            wallet,
            gateway,
        }
    }

    #[tokio::test]
    async fn read_and_decode() {
        let h = harness(BUYER);
        assert_eq!(h.gateway.property_count().await.unwrap(), 1);
        assert_eq!(h.gateway.admin().await.unwrap(), ADMIN);

        h.ledger.set_layout(RecordLayout::SingleImage);
        let single = h.gateway.get_property(1).await.unwrap();
        h.ledger.set_layout(RecordLayout::WithId);
        assert_eq!(h.gateway.get_property(1).await.unwrap(), single);
        assert_eq!(h.gateway.list_all().await.unwrap(), vec![single]);

        h.ledger.corrupt_record(1);
        let err = h.gateway.get_property(1).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DecodeError);

        h.ledger.set_unreachable(true);
        let err = h.gateway.property_count().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ReadError);
    }

    #[tokio::test]
    async fn write_requires_signer() {
        let h = harness(BUYER);
        let err = h
            .gateway
            .buy_property(1, to_minor_units("4").unwrap())
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::NoSigner);
        assert_eq!(h.ledger.dispatched_count(), 0);
    }

    #[tokio::test]
    async fn submit_and_confirm() {
        let h = harness(BUYER);
        h.wallet.connect().await.unwrap();

        let confirmed = h
            .gateway
            .buy_property(1, to_minor_units("4").unwrap())
            .await
            .unwrap();
        assert_eq!(confirmed.block_number, 1);
        assert_eq!(h.ledger.property(1).unwrap().owner, BUYER);
    }

    #[tokio::test]
    async fn rejected_and_reverted() {
        let h = harness(BUYER);
        h.wallet.connect().await.unwrap();

        h.ledger.reject_next_submission("User denied transaction signature");
        let err = h
            .gateway
            .buy_property(1, to_minor_units("4").unwrap())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            GatewayError::SubmissionRejected {
                method: "buyProperty",
                reason: "User denied transaction signature".to_string()
            }
        );

        let err = h
            .gateway
            .buy_property(1, to_minor_units("3.99").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(
            &err,
            GatewayError::TransactionReverted { reason, .. } if reason == "Incorrect payment amount"
        ));
        assert_eq!(h.ledger.property(1).unwrap().owner, SELLER);
        assert_eq!(h.ledger.dispatched_count(), 1);

        h.ledger.set_unreachable(true);
        let err = h
            .gateway
            .buy_property(1, to_minor_units("4").unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SubmissionError);
        assert!(matches!(
            &err,
            GatewayError::SubmissionError { method: "buyProperty", reason }
                if reason == "ledger node unreachable"
        ));
        assert_eq!(h.ledger.dispatched_count(), 1);
        h.ledger.set_unreachable(false);

        h.provider.fail_signer_requests(Some("wallet locked".to_string()));
        let err = h
            .gateway
            .buy_property(1, to_minor_units("4").unwrap())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            GatewayError::SubmissionError {
                method: "buyProperty",
                reason: "wallet locked".to_string()
            }
        );
        assert_eq!(h.ledger.dispatched_count(), 1);
    }

    #[tokio::test]
    async fn submit_as_refuses_a_moved_session() {
        let h = harness(SELLER);
        h.wallet.connect().await.unwrap();
        let prepared = h.wallet.session();

        h.wallet.apply_account_change(Some(BUYER));
        let err = h
            .gateway
            .submit_as(
                TransactionRequest::new(WriteCall::RemovePropertyFromSale { id: 1 }),
                prepared,
            )
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::NoSigner);
        assert_eq!(h.ledger.dispatched_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn confirmation_times_out() {
        let h = harness(SELLER);
        h.wallet.connect().await.unwrap();
        h.ledger.withhold_receipts(true);

        let err = h.gateway.remove_property_from_sale(1).await.unwrap_err();
        let (tx_hash, waited) = match err {
            GatewayError::ConfirmationTimeout { tx_hash, waited } => (tx_hash, waited),
            other => panic!("expected a timeout, got {other:?}"),
        };
        assert_eq!(waited, Duration::from_secs(30));
        // the transaction was dispatched and applied, only the receipt is missing
        assert_eq!(h.ledger.dispatched_count(), 1);
        h.ledger.withhold_receipts(false);
        assert!(h.gateway.confirm(tx_hash).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn confirmation_survives_transient_receipt_errors() {
        let h = harness(SELLER);
        h.wallet.connect().await.unwrap();
        let tx_hash = h
            .gateway
            .submit(TransactionRequest::new(WriteCall::RemovePropertyFromSale {
                id: 1,
            }))
            .await
            .unwrap();

        h.ledger.set_unreachable(true);
        let confirm = h.gateway.confirm(tx_hash);
        let recover = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            h.ledger.set_unreachable(false);
        };
        let (confirmed, ()) = tokio::join!(confirm, recover);
        assert_eq!(confirmed.unwrap().tx_hash, tx_hash);
    }
}
