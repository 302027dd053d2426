use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{
    error::ErrorKind,
    ledger::{Address, Signer},
};

pub mod in_memory_wallet;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletError {
    #[error("No wallet provider is available")]
    ProviderUnavailable,
    #[error("The account request was rejected by the user")]
    UserRejected,
    #[error("Wallet provider error: {0}")]
    ProviderError(String),
    #[error("No signer is available for the connected account")]
    NoSigner,
}

impl WalletError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WalletError::ProviderUnavailable => ErrorKind::ProviderUnavailable,
            WalletError::UserRejected => ErrorKind::UserRejected,
            WalletError::ProviderError(_) => ErrorKind::ProviderError,
            WalletError::NoSigner => ErrorKind::NoSigner,
        }
    }
}

/// Browser-style wallet, e.g. an injected extension.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Prompts the user for account access if needed.
    async fn request_accounts(&self) -> Result<Vec<Address>, WalletError>;

    async fn signer(&self) -> Result<Arc<dyn Signer>, WalletError>;

    /// Active account as reported by the provider; `None` once disconnected.
    fn account_changes(&self) -> watch::Receiver<Option<Address>>;
}

/// Connected account state.
///
/// `epoch` increments on every account change, so anything derived from an
/// address can tell whether it is still current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Session {
    pub address: Option<Address>,
    pub epoch: u64,
}

impl Session {
    pub fn is_connected(&self) -> bool {
        self.address.is_some()
    }
}

type AccountHandler = Arc<dyn Fn(Option<Address>) + Send + Sync>;

/// Sole owner of the [`Session`].
///
/// Other components read it through [`WalletSession::session`] or a
/// subscription; only this type writes it.
pub struct WalletSession {
    provider: Option<Arc<dyn WalletProvider>>,
    session: watch::Sender<Session>,
    handlers: Mutex<Vec<AccountHandler>>,
}

impl WalletSession {
    pub fn new(provider: Arc<dyn WalletProvider>) -> Self {
        Self::with_provider(Some(provider))
    }

    /// Session for an environment without any wallet installed.
    pub fn without_provider() -> Self {
        Self::with_provider(None)
    }

    fn with_provider(provider: Option<Arc<dyn WalletProvider>>) -> Self {
        let (session, _) = watch::channel(Session::default());
        Self {
            provider,
            session,
            handlers: Mutex::new(Vec::new()),
        }
    }

    /// Requests account access and adopts the first account returned.
    ///
    /// Does not refresh any registry; callers do that once the account is known.
    pub async fn connect(&self) -> Result<Address, WalletError> {
        let provider = self
            .provider
            .as_ref()
            .ok_or(WalletError::ProviderUnavailable)?;
        let accounts = provider.request_accounts().await.inspect_err(|err| {
            warn!(%err, "wallet connection failed");
        })?;
        let address = accounts.first().copied().ok_or_else(|| {
            WalletError::ProviderError("provider returned no accounts".to_string())
        })?;
        self.apply_account_change(Some(address));
        info!(%address, "wallet connected");
        Ok(address)
    }

    pub fn current_address(&self) -> Option<Address> {
        self.session.borrow().address
    }

    pub fn session(&self) -> Session {
        *self.session.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.session.subscribe()
    }

    /// `handler` runs after every account change with the new account.
    ///
    /// Handlers may call back into the session; a handler registered while
    /// a change is being delivered sees the next change only.
    pub fn on_account_changed(&self, handler: impl Fn(Option<Address>) + Send + Sync + 'static) {
        self.handlers.lock().push(Arc::new(handler));
    }

    /// Adopts `next` as the active account. Returns `false` when it already was.
    pub fn apply_account_change(&self, next: Option<Address>) -> bool {
        let changed = self.session.send_if_modified(|session| {
            if session.address == next {
                return false;
            }
            session.address = next;
            session.epoch += 1;
            true
        });
        if changed {
            match next {
                Some(address) => debug!(%address, "active account changed"),
                None => debug!("wallet disconnected"),
            }
            let handlers = self.handlers.lock().clone();
            for handler in handlers {
                handler(next);
            }
        }
        changed
    }

    pub fn disconnect(&self) {
        self.apply_account_change(None);
    }

    /// Forwards the provider's account changes into this session until the
    /// provider goes away.
    ///
    /// Only switches are followed: while the session is disconnected the
    /// provider's accounts are ignored, reconnecting takes [`Self::connect`].
    pub async fn follow_provider(&self) -> Result<(), WalletError> {
        let provider = self
            .provider
            .as_ref()
            .ok_or(WalletError::ProviderUnavailable)?;
        let mut changes = provider.account_changes();
        // catch up with a switch that happened before we subscribed
        if self.current_address().is_some() {
            let current = *changes.borrow_and_update();
            self.apply_account_change(current);
        }
        while changes.changed().await.is_ok() {
            let next = *changes.borrow_and_update();
            if next.is_some() && self.current_address().is_none() {
                debug!("ignoring provider account while disconnected");
                continue;
            }
            self.apply_account_change(next);
        }
        debug!("wallet provider closed its account stream");
        Ok(())
    }

    /// Signer for the active account.
    ///
    /// A signer for any other account than the session's is refused: the
    /// provider switched accounts and the session has not caught up yet.
    pub async fn signer(&self) -> Result<Arc<dyn Signer>, WalletError> {
        self.signer_for(self.session()).await
    }

    /// Signer for the account of `expected`, refused once the session has
    /// moved past it, even if it later returned to the same address.
    pub async fn signer_for(&self, expected: Session) -> Result<Arc<dyn Signer>, WalletError> {
        let address = expected.address.ok_or(WalletError::NoSigner)?;
        let provider = self.provider.as_ref().ok_or(WalletError::NoSigner)?;
        if self.session() != expected {
            warn!(epoch = expected.epoch, "account changed since the action was prepared");
            return Err(WalletError::NoSigner);
        }
        let signer = provider.signer().await?;
        if signer.address() != address {
            warn!(
                session = %address,
                signer = %signer.address(),
                "signer does not match the session account"
            );
            return Err(WalletError::NoSigner);
        }
        // the provider call may have suspended across an account change
        if self.session().epoch != expected.epoch {
            warn!(epoch = expected.epoch, "account changed while obtaining the signer");
            return Err(WalletError::NoSigner);
        }
        Ok(signer)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::ledger::in_memory_ledger::InMemoryLedger;

    use super::{in_memory_wallet::InMemoryWallet, *};

    const ALICE: Address = Address::repeat_byte(0xa1);
    const BOB: Address = Address::repeat_byte(0xb0);

    fn wallet(account: Option<Address>) -> (Arc<InMemoryWallet>, WalletSession) {
        let provider = Arc::new(InMemoryWallet::new(InMemoryLedger::default(), account));
        let session = WalletSession::new(provider.clone());
        (provider, session)
    }

    #[tokio::test]
    async fn connect_outcomes() {
        let err = WalletSession::without_provider().connect().await.unwrap_err();
        assert_eq!(err, WalletError::ProviderUnavailable);

        let (provider, session) = wallet(Some(ALICE));
        provider.reject_requests(true);
        assert_eq!(session.connect().await.unwrap_err(), WalletError::UserRejected);
        assert_eq!(session.current_address(), None);

        provider.reject_requests(false);
        assert_eq!(session.connect().await.unwrap(), ALICE);
        assert_eq!(session.current_address(), Some(ALICE));
        assert_eq!(session.session().epoch, 1);

        // reconnecting to the same account is not a change
        session.connect().await.unwrap();
        assert_eq!(session.session().epoch, 1);

        let (_, locked) = wallet(None);
        assert!(matches!(
            locked.connect().await.unwrap_err(),
            WalletError::ProviderError(_)
        ));
    }

    #[tokio::test]
    async fn account_changes_notify_and_bump_epoch() {
        let (_, session) = wallet(Some(ALICE));
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let calls = calls.clone();
            let seen = seen.clone();
            session.on_account_changed(move |address| {
                calls.fetch_add(1, Ordering::SeqCst);
                seen.lock().push(address);
            });
        }

        session.connect().await.unwrap();
        assert!(session.apply_account_change(Some(BOB)));
        assert!(!session.apply_account_change(Some(BOB)));
        session.disconnect();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(*seen.lock(), vec![Some(ALICE), Some(BOB), None]);
        assert_eq!(session.session(), Session { address: None, epoch: 3 });
    }

    #[tokio::test]
    async fn follow_provider_switches() {
        let (provider, session) = wallet(Some(ALICE));
        let session = Arc::new(session);
        session.connect().await.unwrap();
        let mut updates = session.subscribe();

        let follower = tokio::spawn({
            let session = session.clone();
            async move { session.follow_provider().await }
        });

        provider.switch_account(Some(BOB));
        updates
            .wait_for(|current| current.address == Some(BOB))
            .await
            .unwrap();
        assert_eq!(session.session().epoch, 2);

        drop(provider);
        follower.abort();
    }

    #[tokio::test]
    async fn handlers_may_call_back_into_the_session() {
        let (_, session) = wallet(Some(ALICE));
        let session = Arc::new(session);
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let weak = Arc::downgrade(&session);
            let seen = seen.clone();
            session.on_account_changed(move |address| {
                seen.lock().push(address);
                if let (Some(_), Some(session)) = (address, weak.upgrade()) {
                    session.disconnect();
                }
            });
        }

        assert_eq!(session.connect().await.unwrap(), ALICE);
        assert_eq!(*seen.lock(), vec![Some(ALICE), None]);
        assert_eq!(session.session(), Session { address: None, epoch: 2 });
    }

    #[tokio::test]
    async fn follow_provider_ignores_accounts_while_disconnected() {
        let (provider, session) = wallet(Some(ALICE));
        let session = Arc::new(session);
        let follower = tokio::spawn({
            let session = session.clone();
            async move { session.follow_provider().await }
        });

        provider.switch_account(Some(BOB));
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(session.session(), Session::default());

        // a disconnect by the user is not undone by the provider either
        assert_eq!(session.connect().await.unwrap(), BOB);
        session.disconnect();
        provider.switch_account(Some(ALICE));
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(session.current_address(), None);
        assert_eq!(session.session().epoch, 2);

        follower.abort();
    }

    #[tokio::test]
    async fn signer_for_rejects_an_older_session() {
        let (_, session) = wallet(Some(ALICE));
        session.connect().await.unwrap();
        let prepared = session.session();
        assert_eq!(session.signer_for(prepared).await.unwrap().address(), ALICE);

        // away and back: same address, later epoch
        session.apply_account_change(Some(BOB));
        session.apply_account_change(Some(ALICE));
        assert_eq!(
            session.signer_for(prepared).await.err(),
            Some(WalletError::NoSigner)
        );
        assert_eq!(session.signer().await.unwrap().address(), ALICE);
    }

    #[tokio::test]
    async fn signer_requires_matching_session() {
        let (provider, session) = wallet(Some(ALICE));
        assert_eq!(session.signer().await.err(), Some(WalletError::NoSigner));

        session.connect().await.unwrap();
        assert_eq!(session.signer().await.unwrap().address(), ALICE);

        // provider moved on, session still on the old account
        provider.switch_account(Some(BOB));
        assert_eq!(session.signer().await.err(), Some(WalletError::NoSigner));
    }
}
