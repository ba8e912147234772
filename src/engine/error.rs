use thiserror::Error;
use uuid::Uuid;

use crate::{db::RepositoryError, ethereum::ChainError};

/// Coarse classification used by the HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    ChainUnavailable,
    Configuration,
    Internal,
}

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("order {0} not found")]
    OrderNotFound(i64),

    #[error("order {0} is already paid")]
    OrderAlreadyPaid(i64),

    #[error("order {order_id} already has payment {payment_id} in progress")]
    PaymentInProgress { order_id: i64, payment_id: Uuid },

    #[error("invalid wallet address: {0}")]
    InvalidAddress(String),

    #[error("platform wallet address is missing or invalid")]
    MisconfiguredPlatformWallet,

    #[error("payment not found: {0}")]
    PaymentNotFound(String),

    #[error("invalid transaction hash format")]
    InvalidHashFormat,

    #[error("transaction {0} is already used by another payment")]
    DuplicateTransaction(String),

    #[error("payment {0} already has a different transaction attached")]
    HashAlreadyAttached(Uuid),

    #[error("payment {0} is already settled")]
    PaymentAlreadySettled(Uuid),

    #[error("transaction {0} not found")]
    TransactionNotFound(String),

    #[error("transaction {0} failed")]
    TransactionFailed(String),

    #[error("chain unavailable: {0}")]
    ChainUnavailable(#[from] ChainError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl PaymentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidAddress(_)
            | Self::InvalidHashFormat
            | Self::TransactionNotFound(_)
            | Self::TransactionFailed(_) => ErrorKind::Validation,
            Self::OrderNotFound(_) | Self::PaymentNotFound(_) => ErrorKind::NotFound,
            Self::OrderAlreadyPaid(_)
            | Self::PaymentInProgress { .. }
            | Self::DuplicateTransaction(_)
            | Self::HashAlreadyAttached(_)
            | Self::PaymentAlreadySettled(_) => ErrorKind::Conflict,
            Self::ChainUnavailable(_) => ErrorKind::ChainUnavailable,
            Self::MisconfiguredPlatformWallet => ErrorKind::Configuration,
            Self::Repository(_) => ErrorKind::Internal,
        }
    }
}
