#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use estate_ledger::{
    assets::{AssetUploader, in_memory_store::InMemoryAssetStore},
    coordinator::TransactionCoordinator,
    fixtures::seed_ledger,
    gateway::{ConfirmationPolicy, LedgerGateway},
    ledger::{Address, in_memory_ledger::InMemoryLedger},
    registry::PropertyRegistryModel,
    wallet::{WalletSession, in_memory_wallet::InMemoryWallet},
};

pub const PROPERTIES: &str = include_str!("../properties.csv");

pub const ADMIN: Address = Address::repeat_byte(0xad);
pub const SELLER: Address = Address::repeat_byte(0x5e);
pub const NEIGHBOUR: Address = Address::repeat_byte(0x0b);
pub const BUYER: Address = Address::repeat_byte(0xb1);

pub const CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(120);

pub struct App {
    pub ledger: InMemoryLedger,
    pub store: Arc<InMemoryAssetStore>,
    pub provider: Arc<InMemoryWallet>,
    pub wallet: Arc<WalletSession>,
    pub registry: Arc<PropertyRegistryModel>,
    pub assets: Arc<AssetUploader>,
    pub coordinator: TransactionCoordinator,
}

/// Seeded ledger, `account` connected and an initial registry refresh done.
pub async fn app(account: Address) -> App {
    let ledger = InMemoryLedger::new(ADMIN);
    seed_ledger(&ledger, PROPERTIES.as_bytes()).unwrap();

    let provider = Arc::new(InMemoryWallet::new(ledger.clone(), Some(account)));
    let wallet = Arc::new(WalletSession::new(provider.clone()));
    wallet.connect().await.unwrap();

    let gateway = Arc::new(LedgerGateway::new(
        Arc::new(ledger.clone()),
        wallet.clone(),
        ConfirmationPolicy {
            timeout: CONFIRMATION_TIMEOUT,
            poll_interval: Duration::from_secs(1),
        },
    ));
    let registry = Arc::new(PropertyRegistryModel::new(gateway.clone()));
    registry.refresh().await.unwrap();

    let store = Arc::new(InMemoryAssetStore::default());
    let assets = Arc::new(AssetUploader::new(
        store.clone(),
        "https://gateway.pinata.cloud/ipfs",
    ));
    let coordinator = TransactionCoordinator::new(
        wallet.clone(),
        gateway,
        registry.clone(),
        assets.clone(),
    );

    App {
        ledger,
        store,
        provider,
        wallet,
        registry,
        assets,
        coordinator,
    }
}
