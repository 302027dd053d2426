use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::SystemTime,
};

use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, instrument, warn};

use crate::{
    assets::AssetUploader,
    error::ErrorKind,
    gateway::{GatewayError, LedgerGateway},
    ledger::Address,
    property::{Property, PropertyId},
    wallet::Session,
};

mod view;

pub use view::{PropertyView, RoleView, SHORT_PRICE_DECIMALS, derive_roles, property_views};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Property registry refresh failed: {0}")]
    RefreshFailed(#[from] GatewayError),
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::RefreshFailed
    }

    /// Kind of the ledger failure that aborted the refresh.
    pub fn cause_kind(&self) -> ErrorKind {
        match self {
            RegistryError::RefreshFailed(err) => err.kind(),
        }
    }
}

/// Complete property list as of one successful refresh.
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    sequence: u64,
    fetched_at: SystemTime,
    admin: Option<Address>,
    properties: Vec<Property>,
}

impl RegistrySnapshot {
    /// Placeholder before the first refresh.
    pub fn empty() -> Self {
        Self {
            sequence: 0,
            fetched_at: SystemTime::UNIX_EPOCH,
            admin: None,
            properties: Vec::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn loaded(admin: Address, properties: Vec<Property>) -> Self {
        Self {
            sequence: 1,
            fetched_at: SystemTime::now(),
            admin: Some(admin),
            properties,
        }
    }

    /// Increments with every adopted refresh; 0 means never loaded.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn fetched_at(&self) -> SystemTime {
        self.fetched_at
    }

    pub fn admin(&self) -> Option<Address> {
        self.admin
    }

    pub fn is_loaded(&self) -> bool {
        self.sequence > 0
    }

    /// Properties in ascending id order. Ids are not necessarily contiguous.
    pub fn iter(&self) -> std::slice::Iter<'_, Property> {
        self.properties.iter()
    }

    pub fn listed(&self) -> impl Iterator<Item = &Property> {
        self.iter().filter(|property| property.is_listed_for_sale)
    }

    pub fn get(&self, id: PropertyId) -> Option<&Property> {
        self.properties
            .binary_search_by_key(&id, |property| property.id)
            .ok()
            .map(|index| &self.properties[index])
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

impl<'a> IntoIterator for &'a RegistrySnapshot {
    type Item = &'a Property;
    type IntoIter = std::slice::Iter<'a, Property>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// The read-model and single writer of the current [`RegistrySnapshot`].
///
/// Snapshots are swapped in whole, only after every record was fetched. At
/// most one fetch sequence runs at a time; callers arriving while one runs
/// reuse a fetch that started after their request, or run the next one.
pub struct PropertyRegistryModel {
    gateway: Arc<LedgerGateway>,
    snapshot: watch::Sender<Arc<RegistrySnapshot>>,
    fetch_lock: Mutex<()>,
    requested: AtomicU64,
    covered: AtomicU64,
}

impl PropertyRegistryModel {
    pub fn new(gateway: Arc<LedgerGateway>) -> Self {
        let (snapshot, _) = watch::channel(Arc::new(RegistrySnapshot::empty()));
        Self {
            gateway,
            snapshot,
            fetch_lock: Mutex::new(()),
            requested: AtomicU64::new(0),
            covered: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<RegistrySnapshot>> {
        self.snapshot.subscribe()
    }

    /// Refetches everything and adopts the result.
    ///
    /// On failure the last good snapshot stays in place.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<Arc<RegistrySnapshot>, RegistryError> {
        let ticket = self.requested.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = self.fetch_lock.lock().await;

        if self.covered.load(Ordering::SeqCst) >= ticket {
            debug!(ticket, "refresh coalesced into a newer fetch");
            return Ok(self.snapshot());
        }

        // every request made up to now is answered by this fetch
        let covering = self.requested.load(Ordering::SeqCst);
        debug!(ticket, covering, "fetching property registry");
        let (admin, properties) = self.fetch().await.map_err(|err| {
            warn!(%err, "registry refresh failed, keeping the last snapshot");
            RegistryError::RefreshFailed(err)
        })?;

        let next = Arc::new(RegistrySnapshot {
            sequence: self.snapshot.borrow().sequence + 1,
            fetched_at: SystemTime::now(),
            admin: Some(admin),
            properties,
        });
        self.snapshot.send_replace(next.clone());
        self.covered.store(covering, Ordering::SeqCst);
        info!(
            sequence = next.sequence,
            properties = next.len(),
            "property registry refreshed"
        );
        Ok(next)
    }

    async fn fetch(&self) -> Result<(Address, Vec<Property>), GatewayError> {
        let admin = self.gateway.admin().await?;
        let properties = self.gateway.list_all().await?;
        Ok((admin, properties))
    }

    /// Roles of `session` against the current snapshot.
    pub fn roles(&self, session: &Session) -> RoleView {
        derive_roles(&self.snapshot(), session)
    }

    pub fn views(&self, session: &Session, assets: &AssetUploader) -> Vec<PropertyView> {
        let snapshot = self.snapshot();
        property_views(&snapshot, &derive_roles(&snapshot, session), assets)
    }
}
