use crate::{
    cart::FundingShortfall,
    query::QueryKey,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::path::PathBuf;
use thiserror::Error;

/// Coarse category of a chain-side failure, used to pick the feedback shown
/// to the player.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChainErrorKind {
    InsufficientFunds,
    UserRejected,
    RateLimited,
    BlockDelay,
    Unknown,
}

/// Failure reported by the chain boundary. Adapters tag the error when it is
/// produced; nothing downstream inspects message text.
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainError {
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("transaction rejected: {0}")]
    UserRejected(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("waiting for the next block: {0}")]
    BlockDelay(String),
    #[error("{0}")]
    Unknown(String),
}

impl ChainError {
    pub fn kind(&self) -> ChainErrorKind {
        match self {
            ChainError::InsufficientFunds(_) => ChainErrorKind::InsufficientFunds,
            ChainError::UserRejected(_) => ChainErrorKind::UserRejected,
            ChainError::RateLimited(_) => ChainErrorKind::RateLimited,
            ChainError::BlockDelay(_) => ChainErrorKind::BlockDelay,
            ChainError::Unknown(_) => ChainErrorKind::Unknown,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ChainError::InsufficientFunds(message)
            | ChainError::UserRejected(message)
            | ChainError::RateLimited(message)
            | ChainError::BlockDelay(message)
            | ChainError::Unknown(message) => message,
        }
    }

    /// Tags a raw error string coming back from a wallet or RPC node.
    ///
    /// Boundary adapters call this once, at the point the failure is
    /// produced.
    pub fn classify_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lowered = message.to_lowercase();
        let contains_any =
            |needles: &[&str]| needles.iter().any(|needle| lowered.contains(needle));

        if contains_any(&["rate limit", "too many requests", "429"]) {
            ChainError::RateLimited(message)
        } else if contains_any(&["block delay", "wait for block", "next block"]) {
            ChainError::BlockDelay(message)
        } else if contains_any(&["insufficient", "exceeds balance", "not enough balance"])
        {
            ChainError::InsufficientFunds(message)
        } else if contains_any(&["rejected", "user abort", "declined"]) {
            ChainError::UserRejected(message)
        } else {
            ChainError::Unknown(message)
        }
    }
}

#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("indexer request failed: {0}")]
    Transport(String),
    #[error("indexer responded with {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid {key} payload: {reason}")]
    Decode { key: QueryKey, reason: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CartError {
    #[error("a submission is already in flight")]
    SubmissionInFlight,
    #[error("no calls are pending")]
    EmptyCart,
    #[error(
        "account {} needs funding: balance {} is below the fee ceiling {}",
        .0.address,
        .0.balance,
        .0.fee_ceiling
    )]
    NeedsFunding(FundingShortfall),
    #[error(transparent)]
    Chain(#[from] ChainError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn classify_message__tags_known_node_failures() {
        // given
        let cases = [
            ("429 Too Many Requests", ChainErrorKind::RateLimited),
            ("Please wait for block to be mined", ChainErrorKind::BlockDelay),
            (
                "Account balance is insufficient to pay the max fee",
                ChainErrorKind::InsufficientFunds,
            ),
            ("User abort", ChainErrorKind::UserRejected),
            ("Contract not found", ChainErrorKind::Unknown),
        ];

        for (message, expected) in cases {
            // when
            let error = ChainError::classify_message(message);

            // then
            assert_eq!(error.kind(), expected, "{message}");
            assert_eq!(error.message(), message);
        }
    }
}
