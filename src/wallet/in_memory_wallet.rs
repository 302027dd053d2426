use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::ledger::{Address, Signer, in_memory_ledger::InMemoryLedger};

use super::{WalletError, WalletProvider};

/// Wallet backed by an [`InMemoryLedger`], with a scripted active account.
pub struct InMemoryWallet {
    ledger: InMemoryLedger,
    account: watch::Sender<Option<Address>>,
    reject_requests: AtomicBool,
    signer_error: Mutex<Option<String>>,
}

impl InMemoryWallet {
    pub fn new(ledger: InMemoryLedger, account: Option<Address>) -> Self {
        let (account, _) = watch::channel(account);
        Self {
            ledger,
            account,
            reject_requests: AtomicBool::new(false),
            signer_error: Mutex::new(None),
        }
    }

    /// Changes the active account and notifies listeners, as a user
    /// switching accounts in the wallet would.
    pub fn switch_account(&self, next: Option<Address>) {
        self.account.send_replace(next);
    }

    /// While set, account requests are declined by the user.
    pub fn reject_requests(&self, reject: bool) {
        self.reject_requests.store(reject, Ordering::SeqCst);
    }

    /// While set, signer requests fail with a provider error carrying `reason`.
    pub fn fail_signer_requests(&self, reason: Option<String>) {
        *self.signer_error.lock() = reason;
    }
}

#[async_trait]
impl WalletProvider for InMemoryWallet {
    async fn request_accounts(&self) -> Result<Vec<Address>, WalletError> {
        if self.reject_requests.load(Ordering::SeqCst) {
            return Err(WalletError::UserRejected);
        }
        Ok(self.account.borrow().iter().copied().collect())
    }

    async fn signer(&self) -> Result<Arc<dyn Signer>, WalletError> {
        if let Some(reason) = self.signer_error.lock().clone() {
            return Err(WalletError::ProviderError(reason));
        }
        let account = (*self.account.borrow()).ok_or(WalletError::NoSigner)?;
        Ok(self.ledger.signer(account))
    }

    fn account_changes(&self) -> watch::Receiver<Option<Address>> {
        self.account.subscribe()
    }
}
