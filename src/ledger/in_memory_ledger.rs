use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    property::{AssetRef, Property, PropertyId},
    units::MinorUnits,
};

use super::{
    Address, LedgerClient, ReadCall, Receipt, ReceiptStatus, Signer, SignerError, Token,
    TransactionRequest, TransportError, TxHash, WriteCall,
};

/// How `getProperty` records are laid out on the wire. Deployed variants of
/// the contract differ, the decoder has to accept all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordLayout {
    /// 7 fields, one image string.
    SingleImage,
    /// 7 fields, an array of image strings.
    #[default]
    ImageList,
    /// 8 fields, the public struct getter with the id first.
    WithId,
}

/// Property fields as stored by the contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyRecord {
    pub name: String,
    pub location: String,
    pub description: String,
    pub price: MinorUnits,
    pub asset_refs: Vec<AssetRef>,
    pub owner: Address,
    pub is_listed_for_sale: bool,
}

#[derive(Debug)]
enum LedgerEvent {
    Added(PropertyRecord),
    Sold {
        id: PropertyId,
        buyer: Address,
    },
    Listed {
        id: PropertyId,
        price: MinorUnits,
    },
    Delisted {
        id: PropertyId,
    },
    Modified {
        id: PropertyId,
        name: String,
        location: String,
        price: MinorUnits,
        asset_ref: AssetRef,
        description: String,
    },
}

#[derive(Debug, Default)]
struct Faults {
    unreachable: bool,
    failing_reads: HashSet<PropertyId>,
    corrupt_reads: HashSet<PropertyId>,
    reject_next_submission: Option<String>,
    revert_next: Option<String>,
    withhold_receipts: bool,
    yield_on_calls: bool,
}

type ReadHook = Box<dyn Fn(&ReadCall) + Send + Sync>;

#[derive(Debug, Default)]
struct State {
    admin: Address,
    records: Vec<PropertyRecord>,
    receipts: HashMap<TxHash, Receipt>,
    block_number: u64,
    dispatched: Vec<(Address, TransactionRequest)>,
    layout: RecordLayout,
    faults: Faults,
    calls_in_flight: usize,
    max_calls_in_flight: usize,
    read_counts: HashMap<&'static str, usize>,
}

impl State {
    fn record(&self, id: PropertyId) -> Result<&PropertyRecord, String> {
        usize::try_from(id)
            .ok()
            .and_then(|id| id.checked_sub(1))
            .and_then(|index| self.records.get(index))
            .ok_or_else(|| "Property does not exist".to_string())
    }

    fn record_mut(&mut self, id: PropertyId) -> Option<&mut PropertyRecord> {
        let index = usize::try_from(id).ok()?.checked_sub(1)?;
        self.records.get_mut(index)
    }

    /// Checks the contract's preconditions; nothing is modified here.
    fn handle(&self, sender: Address, request: &TransactionRequest) -> Result<LedgerEvent, String> {
        match &request.call {
            WriteCall::AddProperty {
                name,
                location,
                price,
                asset_refs,
                description,
            } => Ok(LedgerEvent::Added(PropertyRecord {
                name: name.clone(),
                location: location.clone(),
                description: description.clone(),
                price: *price,
                asset_refs: asset_refs.clone(),
                owner: sender,
                is_listed_for_sale: true,
            })),
            WriteCall::BuyProperty { id } => {
                let record = self.record(*id)?;
                if !record.is_listed_for_sale {
                    return Err("Property is not for sale".to_string());
                }
                if record.owner == sender {
                    return Err("Owner cannot buy own property".to_string());
                }
                if request.value != record.price {
                    return Err("Incorrect payment amount".to_string());
                }
                Ok(LedgerEvent::Sold {
                    id: *id,
                    buyer: sender,
                })
            }
            WriteCall::ListPropertyForSale { id, price } => {
                if self.record(*id)?.owner != sender {
                    return Err("Only the owner can list the property".to_string());
                }
                Ok(LedgerEvent::Listed {
                    id: *id,
                    price: *price,
                })
            }
            WriteCall::RemovePropertyFromSale { id } => {
                if self.record(*id)?.owner != sender {
                    return Err("Only the owner can remove the property from sale".to_string());
                }
                Ok(LedgerEvent::Delisted { id: *id })
            }
            WriteCall::ModifyPropertyDetails {
                id,
                name,
                location,
                price,
                asset_ref,
                description,
            } => {
                self.record(*id)?;
                if sender != self.admin {
                    return Err("Only admin can modify property details".to_string());
                }
                Ok(LedgerEvent::Modified {
                    id: *id,
                    name: name.clone(),
                    location: location.clone(),
                    price: *price,
                    asset_ref: asset_ref.clone(),
                    description: description.clone(),
                })
            }
        }
    }

    fn apply(&mut self, event: LedgerEvent) {
        match event {
            LedgerEvent::Added(record) => self.records.push(record),
            LedgerEvent::Sold { id, buyer } => {
                if let Some(record) = self.record_mut(id) {
                    record.owner = buyer;
                    record.is_listed_for_sale = false;
                }
            }
            LedgerEvent::Listed { id, price } => {
                if let Some(record) = self.record_mut(id) {
                    record.price = price;
                    record.is_listed_for_sale = true;
                }
            }
            LedgerEvent::Delisted { id } => {
                if let Some(record) = self.record_mut(id) {
                    record.is_listed_for_sale = false;
                }
            }
            LedgerEvent::Modified {
                id,
                name,
                location,
                price,
                asset_ref,
                description,
            } => {
                if let Some(record) = self.record_mut(id) {
                    record.name = name;
                    record.location = location;
                    record.price = price;
                    record.asset_refs = vec![asset_ref];
                    record.description = description;
                }
            }
        }
    }

    fn read(&self, call: ReadCall) -> Result<Token, TransportError> {
        if self.faults.unreachable {
            return Err(TransportError::Unreachable("connection refused".to_string()));
        }
        match call {
            ReadCall::PropertyCount => Ok(Token::Uint(self.records.len() as u128)),
            ReadCall::Admin => Ok(Token::Address(self.admin)),
            ReadCall::GetProperty(id) => {
                if self.faults.failing_reads.contains(&id) {
                    return Err(TransportError::CallFailed {
                        method: call.method(),
                        message: "connection reset".to_string(),
                    });
                }
                let record = self.record(id).map_err(|message| TransportError::CallFailed {
                    method: call.method(),
                    message,
                })?;
                if self.faults.corrupt_reads.contains(&id) {
                    return Ok(Token::Tuple(vec![
                        Token::String(record.name.clone()),
                        Token::Uint(record.price.get()),
                    ]));
                }
                Ok(encode_record(id, record, self.layout))
            }
        }
    }

    fn dispatch(
        &mut self,
        sender: Address,
        request: TransactionRequest,
    ) -> Result<TxHash, SignerError> {
        if let Some(reason) = self.faults.reject_next_submission.take() {
            return Err(SignerError::Rejected(reason));
        }
        if self.faults.unreachable {
            return Err(SignerError::Dispatch("ledger node unreachable".to_string()));
        }

        let outcome = match self.faults.revert_next.take() {
            Some(reason) => Err(reason),
            None => self.handle(sender, &request),
        };
        self.dispatched.push((sender, request));
        self.block_number += 1;

        let mut hash = [0u8; 32];
        hash[..20].copy_from_slice(sender.as_bytes());
        hash[24..].copy_from_slice(&(self.dispatched.len() as u64).to_be_bytes());
        let tx_hash = TxHash::new(hash);

        let (status, revert_reason) = match outcome {
            Ok(event) => {
                self.apply(event);
                (ReceiptStatus::Success, None)
            }
            Err(reason) => (ReceiptStatus::Reverted, Some(reason)),
        };
        self.receipts.insert(
            tx_hash,
            Receipt {
                tx_hash,
                block_number: self.block_number,
                status,
                revert_reason,
            },
        );
        Ok(tx_hash)
    }
}

fn encode_record(id: PropertyId, record: &PropertyRecord, layout: RecordLayout) -> Token {
    let images = match layout {
        RecordLayout::SingleImage => Token::String(
            record
                .asset_refs
                .first()
                .map(|asset| asset.to_string())
                .unwrap_or_default(),
        ),
        RecordLayout::ImageList | RecordLayout::WithId => Token::Array(
            record
                .asset_refs
                .iter()
                .map(|asset| Token::String(asset.to_string()))
                .collect(),
        ),
    };
    let mut fields = vec![
        Token::String(record.name.clone()),
        Token::String(record.location.clone()),
        Token::Uint(record.price.get()),
        images,
        Token::String(record.description.clone()),
        Token::Address(record.owner),
        Token::Bool(record.is_listed_for_sale),
    ];
    if layout == RecordLayout::WithId {
        fields.insert(0, Token::Uint(u128::from(id)));
    }
    Token::Tuple(fields)
}

/// A ledger held in memory that follows the property contract's rules.
///
/// Every dispatched transaction is included immediately; receipts can be
/// withheld to keep confirmations pending. Faults are scripted through the
/// setter methods.
#[derive(Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<Mutex<State>>,
    read_hook: Arc<Mutex<Option<ReadHook>>>,
}

impl InMemoryLedger {
    pub fn new(admin: Address) -> Self {
        let ledger = Self::default();
        ledger.state.lock().admin = admin;
        ledger
    }

    pub fn admin(&self) -> Address {
        self.state.lock().admin
    }

    /// Stores a record directly, bypassing the transaction path.
    pub fn insert(&self, record: PropertyRecord) -> PropertyId {
        let mut state = self.state.lock();
        state.records.push(record);
        state.records.len() as PropertyId
    }

    pub fn property(&self, id: PropertyId) -> Option<Property> {
        let state = self.state.lock();
        let record = state.record(id).ok()?;
        Some(Property {
            id,
            name: record.name.clone(),
            location: record.location.clone(),
            description: record.description.clone(),
            price: record.price,
            asset_refs: record.asset_refs.clone(),
            owner: record.owner,
            is_listed_for_sale: record.is_listed_for_sale,
        })
    }

    /// Reprices a record without a transaction, as another client would.
    pub fn set_price(&self, id: PropertyId, price: MinorUnits) -> bool {
        match self.state.lock().record_mut(id) {
            Some(record) => {
                record.price = price;
                true
            }
            None => false,
        }
    }

    pub fn property_count(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn signer(&self, address: Address) -> Arc<dyn Signer> {
        Arc::new(InMemorySigner {
            ledger: self.clone(),
            address,
        })
    }

    pub fn set_layout(&self, layout: RecordLayout) {
        self.state.lock().layout = layout;
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().faults.unreachable = unreachable;
    }

    pub fn fail_reads_of(&self, id: PropertyId) {
        self.state.lock().faults.failing_reads.insert(id);
    }

    pub fn corrupt_record(&self, id: PropertyId) {
        self.state.lock().faults.corrupt_reads.insert(id);
    }

    pub fn clear_read_faults(&self) {
        let mut state = self.state.lock();
        state.faults.failing_reads.clear();
        state.faults.corrupt_reads.clear();
    }

    /// The next submission is declined as if the user cancelled it in the wallet.
    pub fn reject_next_submission(&self, reason: impl Into<String>) {
        self.state.lock().faults.reject_next_submission = Some(reason.into());
    }

    /// The next submission is included but reverts with `reason`.
    pub fn revert_next_transaction(&self, reason: impl Into<String>) {
        self.state.lock().faults.revert_next = Some(reason.into());
    }

    pub fn withhold_receipts(&self, withhold: bool) {
        self.state.lock().faults.withhold_receipts = withhold;
    }

    /// Suspends every read once, so concurrent callers interleave.
    pub fn set_yield_on_calls(&self, yield_on_calls: bool) {
        self.state.lock().faults.yield_on_calls = yield_on_calls;
    }

    /// Runs `hook` at the start of every read call.
    pub fn on_read(&self, hook: impl Fn(&ReadCall) + Send + Sync + 'static) {
        *self.read_hook.lock() = Some(Box::new(hook));
    }

    pub fn dispatched_count(&self) -> usize {
        self.state.lock().dispatched.len()
    }

    pub fn dispatched(&self) -> Vec<(Address, TransactionRequest)> {
        self.state.lock().dispatched.clone()
    }

    pub fn read_count(&self, method: &str) -> usize {
        self.state
            .lock()
            .read_counts
            .get(method)
            .copied()
            .unwrap_or_default()
    }

    /// Highest number of read calls that were suspended at the same time.
    pub fn max_calls_in_flight(&self) -> usize {
        self.state.lock().max_calls_in_flight
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn call(&self, call: ReadCall) -> Result<Token, TransportError> {
        let yield_on_calls = {
            let mut state = self.state.lock();
            state.calls_in_flight += 1;
            state.max_calls_in_flight = state.max_calls_in_flight.max(state.calls_in_flight);
            *state.read_counts.entry(call.method()).or_default() += 1;
            state.faults.yield_on_calls
        };
        if let Some(hook) = self.read_hook.lock().as_ref() {
            hook(&call);
        }
        if yield_on_calls {
            tokio::task::yield_now().await;
        }
        let mut state = self.state.lock();
        state.calls_in_flight -= 1;
        state.read(call)
    }

    async fn receipt(&self, tx_hash: &TxHash) -> Result<Option<Receipt>, TransportError> {
        let state = self.state.lock();
        if state.faults.unreachable {
            return Err(TransportError::Unreachable("connection refused".to_string()));
        }
        if state.faults.withhold_receipts {
            return Ok(None);
        }
        Ok(state.receipts.get(tx_hash).cloned())
    }
}

struct InMemorySigner {
    ledger: InMemoryLedger,
    address: Address,
}

#[async_trait]
impl Signer for InMemorySigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn send_transaction(&self, request: TransactionRequest) -> Result<TxHash, SignerError> {
        self.ledger.state.lock().dispatch(self.address, request)
    }
}

#[cfg(test)]
mod tests {
    use crate::units::to_minor_units;

    use super::*;

    const ADMIN: Address = Address::repeat_byte(0xad);
    const SELLER: Address = Address::repeat_byte(0x01);
    const BUYER: Address = Address::repeat_byte(0x02);

    fn record(owner: Address, price: &str) -> PropertyRecord {
        PropertyRecord {
            name: "Canal House".to_string(),
            location: "Amsterdam".to_string(),
            description: "Three floors".to_string(),
            price: to_minor_units(price).unwrap(),
            asset_refs: vec![AssetRef::new("QmCanal"), AssetRef::new("QmCanal2")],
            owner,
            is_listed_for_sale: true,
        }
    }

    async fn send(
        ledger: &InMemoryLedger,
        sender: Address,
        request: TransactionRequest,
    ) -> Receipt {
        let tx_hash = ledger.signer(sender).send_transaction(request).await.unwrap();
        ledger.receipt(&tx_hash).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn buy_transfers_and_delists() {
        let ledger = InMemoryLedger::new(ADMIN);
        let id = ledger.insert(record(SELLER, "2"));

        // wrong value reverts and changes nothing
        let receipt = send(
            &ledger,
            BUYER,
            TransactionRequest::with_value(
                WriteCall::BuyProperty { id },
                to_minor_units("1").unwrap(),
            ),
        )
        .await;
        assert_eq!(receipt.status, ReceiptStatus::Reverted);
        assert_eq!(receipt.revert_reason.as_deref(), Some("Incorrect payment amount"));
        assert_eq!(ledger.property(id).unwrap().owner, SELLER);

        let receipt = send(
            &ledger,
            BUYER,
            TransactionRequest::with_value(
                WriteCall::BuyProperty { id },
                to_minor_units("2").unwrap(),
            ),
        )
        .await;
        assert_eq!(receipt.status, ReceiptStatus::Success);
        let property = ledger.property(id).unwrap();
        assert_eq!(property.owner, BUYER);
        assert!(!property.is_listed_for_sale);

        // not for sale anymore
        let receipt = send(
            &ledger,
            SELLER,
            TransactionRequest::with_value(
                WriteCall::BuyProperty { id },
                to_minor_units("2").unwrap(),
            ),
        )
        .await;
        assert_eq!(receipt.revert_reason.as_deref(), Some("Property is not for sale"));
        assert_eq!(ledger.dispatched_count(), 3);
    }

    #[tokio::test]
    async fn owner_and_admin_rules() {
        let ledger = InMemoryLedger::new(ADMIN);
        let id = ledger.insert(record(SELLER, "1"));

        let receipt = send(
            &ledger,
            BUYER,
            TransactionRequest::new(WriteCall::RemovePropertyFromSale { id }),
        )
        .await;
        assert_eq!(receipt.status, ReceiptStatus::Reverted);

        let receipt = send(
            &ledger,
            SELLER,
            TransactionRequest::new(WriteCall::RemovePropertyFromSale { id }),
        )
        .await;
        assert_eq!(receipt.status, ReceiptStatus::Success);
        assert!(!ledger.property(id).unwrap().is_listed_for_sale);

        let modify = WriteCall::ModifyPropertyDetails {
            id,
            name: "Canal House II".to_string(),
            location: "Utrecht".to_string(),
            price: to_minor_units("3").unwrap(),
            asset_ref: AssetRef::new("QmNew"),
            description: "Renovated".to_string(),
        };
        let receipt = send(&ledger, SELLER, TransactionRequest::new(modify.clone())).await;
        assert_eq!(
            receipt.revert_reason.as_deref(),
            Some("Only admin can modify property details")
        );
        let receipt = send(&ledger, ADMIN, TransactionRequest::new(modify)).await;
        assert_eq!(receipt.status, ReceiptStatus::Success);

        let property = ledger.property(id).unwrap();
        assert_eq!(property.name, "Canal House II");
        assert_eq!(property.asset_refs, vec![AssetRef::new("QmNew")]);
        // modification never changes ownership
        assert_eq!(property.owner, SELLER);
    }

    #[tokio::test]
    async fn encode_layouts() {
        let ledger = InMemoryLedger::new(ADMIN);
        let id = ledger.insert(record(SELLER, "1"));

        ledger.set_layout(RecordLayout::SingleImage);
        let Token::Tuple(fields) = ledger.call(ReadCall::GetProperty(id)).await.unwrap() else {
            panic!("expected a tuple");
        };
        assert_eq!(fields.len(), 7);
        assert_eq!(fields[3], Token::String("QmCanal".to_string()));

        ledger.set_layout(RecordLayout::WithId);
        let Token::Tuple(fields) = ledger.call(ReadCall::GetProperty(id)).await.unwrap() else {
            panic!("expected a tuple");
        };
        assert_eq!(fields.len(), 8);
        assert_eq!(fields[0], Token::Uint(1));

        assert!(ledger.call(ReadCall::GetProperty(2)).await.is_err());
        assert_eq!(ledger.read_count("getProperty"), 3);
    }

    #[tokio::test]
    async fn scripted_submission_faults() {
        let ledger = InMemoryLedger::new(ADMIN);
        let id = ledger.insert(record(SELLER, "1"));
        let signer = ledger.signer(SELLER);

        ledger.reject_next_submission("User denied transaction signature");
        let err = signer
            .send_transaction(TransactionRequest::new(WriteCall::RemovePropertyFromSale { id }))
            .await
            .unwrap_err();
        assert!(matches!(err, SignerError::Rejected(_)));
        assert_eq!(ledger.dispatched_count(), 0);

        ledger.withhold_receipts(true);
        let tx_hash = signer
            .send_transaction(TransactionRequest::new(WriteCall::RemovePropertyFromSale { id }))
            .await
            .unwrap();
        assert_eq!(ledger.receipt(&tx_hash).await.unwrap(), None);
        ledger.withhold_receipts(false);
        assert!(ledger.receipt(&tx_hash).await.unwrap().is_some());
    }
}
