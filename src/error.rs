use std::fmt;

/// Every failure a UI can be told about.
///
/// Component errors keep their own detail and map onto one of these through
/// a `kind()` method; wrapping never changes the kind of the original failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ProviderUnavailable,
    UserRejected,
    ProviderError,
    NoSigner,
    ValidationError,
    InvalidAmount,
    UploadFailed,
    SubmissionRejected,
    SubmissionError,
    ConfirmationTimeout,
    TransactionReverted,
    ReadError,
    DecodeError,
    RefreshFailed,
    /// The write succeeded but the follow-up read did not.
    RefreshStale,
    /// A second execution of an intent that is still running.
    InFlight,
    /// The intent was abandoned before anything was submitted.
    Cancelled,
}

impl ErrorKind {
    /// Errors the user can fix by changing input or wallet state and trying again.
    #[must_use]
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            Self::ValidationError
                | Self::InvalidAmount
                | Self::UserRejected
                | Self::SubmissionRejected
                | Self::NoSigner
        )
    }

    /// Whether the failure happened before any transaction reached the ledger.
    #[must_use]
    pub fn is_pre_submission(&self) -> bool {
        matches!(
            self,
            Self::ProviderUnavailable
                | Self::UserRejected
                | Self::ProviderError
                | Self::NoSigner
                | Self::ValidationError
                | Self::InvalidAmount
                | Self::UploadFailed
                | Self::SubmissionRejected
                | Self::InFlight
                | Self::Cancelled
        )
    }

    /// The ledger state is unknown after this failure; the caller should
    /// refresh before deciding anything.
    #[must_use]
    pub fn outcome_unknown(&self) -> bool {
        matches!(self, Self::ConfirmationTimeout | Self::RefreshStale)
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::ProviderUnavailable => "provider unavailable",
            Self::UserRejected => "user rejected",
            Self::ProviderError => "provider error",
            Self::NoSigner => "no signer",
            Self::ValidationError => "validation error",
            Self::InvalidAmount => "invalid amount",
            Self::UploadFailed => "upload failed",
            Self::SubmissionRejected => "submission rejected",
            Self::SubmissionError => "submission error",
            Self::ConfirmationTimeout => "confirmation timeout",
            Self::TransactionReverted => "transaction reverted",
            Self::ReadError => "read error",
            Self::DecodeError => "decode error",
            Self::RefreshFailed => "refresh failed",
            Self::RefreshStale => "refresh stale",
            Self::InFlight => "already in flight",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
