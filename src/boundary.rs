//! Seams to the outside world: the indexer, the chain and the transaction
//! status source.

use crate::{
    cart::{
        FeeOptions,
        PendingCall,
    },
    error::{
        ChainError,
        IndexerError,
    },
    ledger::{
        TxHash,
        TxStatus,
    },
    query::{
        QueryData,
        QueryKey,
        QueryVariables,
    },
};
use std::future::Future;

pub trait IndexerQuery: Clone + Send + Sync + 'static {
    fn query(
        &self,
        key: QueryKey,
        variables: &QueryVariables,
    ) -> impl Future<Output = Result<QueryData, IndexerError>> + Send;
}

pub trait ChainExecutor: Send + Sync {
    fn execute(
        &self,
        calls: &[PendingCall],
        fee: Option<&FeeOptions>,
    ) -> impl Future<Output = Result<TxHash, ChainError>> + Send;
}

pub trait StatusWatcher: Send + Sync {
    fn status(
        &self,
        hash: &TxHash,
    ) -> impl Future<Output = Result<TxStatus, ChainError>> + Send;
}
