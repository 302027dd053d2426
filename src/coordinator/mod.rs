use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use thiserror::Error;
use tokio::sync::watch;
use tracing::{Span, debug, info, instrument, warn};

use crate::{
    assets::{AssetUploader, StoreError, UploadError},
    error::ErrorKind,
    gateway::{Confirmed, GatewayError, LedgerGateway},
    registry::{PropertyRegistryModel, RegistryError, RegistrySnapshot, RoleView, derive_roles},
    wallet::{Session, WalletSession},
};

mod intent;

pub use intent::{AssetSource, Intent, ValidationError};

/// Where an intent currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Validating,
    Uploading,
    Submitting,
    Confirming,
    Refreshing,
    Done,
    Failed(ErrorKind),
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Done | Phase::Failed(_))
    }

    /// Nothing has been handed to the ledger yet.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, Phase::Validating | Phase::Uploading)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntentError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("This action is already in progress")]
    InFlight,
    #[error("The action was cancelled before anything was submitted")]
    Cancelled,
}

impl IntentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IntentError::Validation(err) => err.kind(),
            IntentError::Upload(err) => err.kind(),
            IntentError::Gateway(err) => err.kind(),
            IntentError::InFlight => ErrorKind::InFlight,
            IntentError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

/// Result of a confirmed write.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// The registry was refreshed after the write.
    Done {
        confirmed: Confirmed,
        snapshot: Arc<RegistrySnapshot>,
        roles: RoleView,
    },
    /// The write is on the ledger but the registry could not be reloaded;
    /// the UI should offer a manual refresh.
    RefreshStale {
        confirmed: Confirmed,
        cause: RegistryError,
    },
}

impl Outcome {
    pub fn confirmed(&self) -> &Confirmed {
        match self {
            Outcome::Done { confirmed, .. } | Outcome::RefreshStale { confirmed, .. } => confirmed,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Outcome::RefreshStale { .. })
    }

    /// `Some(RefreshStale)` for a write that needs a manual refresh.
    pub fn kind(&self) -> Option<ErrorKind> {
        self.is_stale().then_some(ErrorKind::RefreshStale)
    }
}

static NEXT_TICKET_ID: AtomicU64 = AtomicU64::new(1);

/// One user-initiated action, executed by a [`TransactionCoordinator`].
///
/// A ticket runs at most once at a time. Once terminal it may be executed
/// again, which is a new attempt initiated by the user.
pub struct IntentTicket {
    id: u64,
    intent: Intent,
    in_flight: AtomicBool,
    cancelled: AtomicBool,
    phase: watch::Sender<Phase>,
}

impl IntentTicket {
    pub fn new(intent: Intent) -> Self {
        let (phase, _) = watch::channel(Phase::Idle);
        Self {
            id: NEXT_TICKET_ID.fetch_add(1, Ordering::Relaxed),
            intent,
            in_flight: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            phase,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn intent(&self) -> &Intent {
        &self.intent
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Abandons the intent if it has not been submitted yet.
    ///
    /// Returns `false` when it is too late (or nothing is running); a
    /// submitted transaction cannot be withdrawn.
    pub fn cancel(&self) -> bool {
        let mut accepted = false;
        self.phase.send_if_modified(|phase| {
            if phase.is_cancellable() {
                self.cancelled.store(true, Ordering::SeqCst);
                accepted = true;
            }
            false
        });
        if accepted {
            debug!(ticket = self.id, "intent cancelled");
        }
        accepted
    }

    fn set_phase(&self, next: Phase) {
        debug!(ticket = self.id, phase = ?next, "intent phase");
        self.phase.send_replace(next);
    }

    fn ensure_not_cancelled(&self) -> Result<(), IntentError> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(IntentError::Cancelled);
        }
        Ok(())
    }

    fn begin(&self) {
        self.phase.send_modify(|phase| {
            self.cancelled.store(false, Ordering::SeqCst);
            *phase = Phase::Validating;
        });
        debug!(ticket = self.id, phase = ?Phase::Validating, "intent phase");
    }

    /// Moves to `Submitting` unless a cancel got there first or the account
    /// changed since validation. Shares the phase lock with [`Self::cancel`],
    /// so exactly one of them wins.
    fn begin_submission(
        &self,
        validated: &Session,
        current: impl FnOnce() -> Session,
    ) -> Result<(), IntentError> {
        let mut blocked = None;
        self.phase.send_if_modified(|phase| {
            if self.cancelled.load(Ordering::SeqCst) {
                blocked = Some(IntentError::Cancelled);
                return false;
            }
            if current().epoch != validated.epoch {
                blocked = Some(ValidationError::AccountChanged.into());
                return false;
            }
            *phase = Phase::Submitting;
            true
        });
        if let Some(err) = blocked {
            return Err(err);
        }
        debug!(ticket = self.id, phase = ?Phase::Submitting, "intent phase");
        Ok(())
    }
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Runs intents through validate, upload, submit, confirm and refresh.
///
/// Writes are never retried here: every outcome, including an unknown one
/// after a confirmation timeout, is reported to the caller exactly once.
pub struct TransactionCoordinator {
    wallet: Arc<WalletSession>,
    gateway: Arc<LedgerGateway>,
    registry: Arc<PropertyRegistryModel>,
    assets: Arc<AssetUploader>,
}

impl TransactionCoordinator {
    pub fn new(
        wallet: Arc<WalletSession>,
        gateway: Arc<LedgerGateway>,
        registry: Arc<PropertyRegistryModel>,
        assets: Arc<AssetUploader>,
    ) -> Self {
        Self {
            wallet,
            gateway,
            registry,
            assets,
        }
    }

    pub fn registry(&self) -> &Arc<PropertyRegistryModel> {
        &self.registry
    }

    /// Executes `ticket`'s intent to completion.
    ///
    /// A second call while the first is still running returns
    /// [`IntentError::InFlight`] and leaves the running attempt alone.
    #[instrument(
        skip_all,
        fields(ticket = ticket.id(), intent = ticket.intent().name(), tx_hash = tracing::field::Empty)
    )]
    pub async fn execute(&self, ticket: &IntentTicket) -> Result<Outcome, IntentError> {
        if ticket
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("intent is already running");
            return Err(IntentError::InFlight);
        }
        let _guard = InFlightGuard(&ticket.in_flight);

        ticket.begin();
        match self.run(ticket).await {
            Ok(outcome) => {
                ticket.set_phase(Phase::Done);
                Ok(outcome)
            }
            Err(err) => {
                warn!(%err, kind = %err.kind(), "intent failed");
                ticket.set_phase(Phase::Failed(err.kind()));
                Err(err)
            }
        }
    }

    async fn run(&self, ticket: &IntentTicket) -> Result<Outcome, IntentError> {
        let session = self.wallet.session();
        let prepared = ticket
            .intent()
            .validate(&self.registry.snapshot(), &session)?;
        ticket.ensure_not_cancelled()?;

        let uploaded = if prepared.pending_uploads().is_empty() {
            Vec::new()
        } else {
            ticket.set_phase(Phase::Uploading);
            let uploaded = self.assets.upload_many(prepared.pending_uploads()).await?;
            ticket.ensure_not_cancelled()?;
            uploaded
        };
        let request = prepared.into_request(uploaded).ok_or_else(|| {
            IntentError::Upload(UploadError {
                index: 0,
                file_name: String::new(),
                cause: StoreError::MalformedResponse(
                    "upload returned no identifier".to_string(),
                ),
            })
        })?;

        ticket.begin_submission(&session, || self.wallet.session())?;
        // signs only for the validated account, even if it switches from here on
        let tx_hash = self.gateway.submit_as(request, session).await?;

        ticket.set_phase(Phase::Confirming);
        Span::current().record("tx_hash", tracing::field::display(&tx_hash));
        let confirmed = self.gateway.confirm(tx_hash).await?;

        ticket.set_phase(Phase::Refreshing);
        match self.registry.refresh().await {
            Ok(snapshot) => {
                // the account may have switched while the refresh ran
                let roles = derive_roles(&snapshot, &self.wallet.session());
                info!(tx_hash = %confirmed.tx_hash, "intent completed");
                Ok(Outcome::Done {
                    confirmed,
                    snapshot,
                    roles,
                })
            }
            Err(cause) => {
                warn!(%cause, tx_hash = %confirmed.tx_hash, "write confirmed but the registry is stale");
                Ok(Outcome::RefreshStale { confirmed, cause })
            }
        }
    }
}
