//! In-memory boundaries for tests.

use crate::{
    boundary::{
        ChainExecutor,
        IndexerQuery,
        StatusWatcher,
    },
    cart::{
        FeeAccount,
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
use std::{
    collections::{
        HashMap,
        VecDeque,
    },
    sync::{
        Arc,
        Mutex,
    },
};
use tokio::sync::watch;

#[derive(Default)]
struct FakeIndexerState {
    scripted: HashMap<QueryKey, VecDeque<Result<QueryData, IndexerError>>>,
    standing: HashMap<QueryKey, QueryData>,
    calls: Vec<(QueryKey, QueryVariables)>,
}

/// Answers queries from scripted results. One-shot results pushed with
/// `push_response` win over the standing response set with `set_response`;
/// keys with neither answer with an empty result.
#[derive(Clone)]
pub struct FakeIndexer {
    state: Arc<Mutex<FakeIndexerState>>,
    gate: Arc<watch::Sender<bool>>,
}

/// Holds every query of a gated `FakeIndexer` until opened.
pub struct IndexerGate(Arc<watch::Sender<bool>>);

impl IndexerGate {
    pub fn open(&self) {
        self.0.send_replace(true);
    }

    pub fn close(&self) {
        self.0.send_replace(false);
    }
}

impl Default for FakeIndexer {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeIndexer {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            state: Arc::new(Mutex::new(FakeIndexerState::default())),
            gate: Arc::new(gate),
        }
    }

    pub fn gated() -> (Self, IndexerGate) {
        let indexer = Self::new();
        let gate = IndexerGate(indexer.gate.clone());
        gate.close();
        (indexer, gate)
    }

    pub fn set_response(&self, key: QueryKey, data: QueryData) {
        self.state.lock().unwrap().standing.insert(key, data);
    }

    pub fn push_response(&self, key: QueryKey, result: Result<QueryData, IndexerError>) {
        self.state
            .lock()
            .unwrap()
            .scripted
            .entry(key)
            .or_default()
            .push_back(result);
    }

    pub fn call_count(&self, key: QueryKey) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(called, _)| *called == key)
            .count()
    }

    pub fn calls(&self) -> Vec<(QueryKey, QueryVariables)> {
        self.state.lock().unwrap().calls.clone()
    }
}

impl IndexerQuery for FakeIndexer {
    async fn query(
        &self,
        key: QueryKey,
        variables: &QueryVariables,
    ) -> Result<QueryData, IndexerError> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push((key, variables.clone()));
        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        let mut state = self.state.lock().unwrap();
        if let Some(result) = state.scripted.get_mut(&key).and_then(VecDeque::pop_front) {
            return result;
        }
        Ok(state
            .standing
            .get(&key)
            .cloned()
            .unwrap_or_else(|| QueryData::empty(key.shape())))
    }
}

#[derive(Default)]
struct FakeChainState {
    batches: Vec<Vec<PendingCall>>,
    fees: Vec<Option<FeeOptions>>,
    results: VecDeque<Result<TxHash, ChainError>>,
}

/// Records every batch it is asked to execute and replies with scripted
/// results, repeating the last one once the script runs out.
#[derive(Clone, Default)]
pub struct FakeChain {
    state: Arc<Mutex<FakeChainState>>,
}

impl FakeChain {
    pub fn succeeding(hash: TxHash) -> Self {
        Self::scripted([Ok(hash)])
    }

    pub fn failing(err: ChainError) -> Self {
        Self::scripted([Err(err)])
    }

    pub fn scripted(results: impl IntoIterator<Item = Result<TxHash, ChainError>>) -> Self {
        let chain = Self::default();
        chain.state.lock().unwrap().results = results.into_iter().collect();
        chain
    }

    pub fn execute_count(&self) -> usize {
        self.state.lock().unwrap().batches.len()
    }

    pub fn batches(&self) -> Vec<Vec<PendingCall>> {
        self.state.lock().unwrap().batches.clone()
    }

    pub fn fees(&self) -> Vec<Option<FeeOptions>> {
        self.state.lock().unwrap().fees.clone()
    }
}

impl ChainExecutor for FakeChain {
    async fn execute(
        &self,
        calls: &[PendingCall],
        fee: Option<&FeeOptions>,
    ) -> Result<TxHash, ChainError> {
        let mut state = self.state.lock().unwrap();
        state.batches.push(calls.to_vec());
        state.fees.push(fee.copied());
        let result = if state.results.len() > 1 {
            state.results.pop_front()
        } else {
            state.results.front().cloned()
        };
        result.unwrap_or_else(|| Err(ChainError::Unknown("no scripted result".to_string())))
    }
}

/// Reports whatever status was last set for a hash; unknown hashes are
/// `Received`.
#[derive(Clone, Default)]
pub struct FakeStatusWatcher {
    statuses: Arc<Mutex<HashMap<TxHash, TxStatus>>>,
    queries: Arc<Mutex<Vec<TxHash>>>,
}

impl FakeStatusWatcher {
    pub fn set_status(&self, hash: TxHash, status: TxStatus) {
        self.statuses.lock().unwrap().insert(hash, status);
    }

    pub fn query_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }
}

impl StatusWatcher for FakeStatusWatcher {
    async fn status(&self, hash: &TxHash) -> Result<TxStatus, ChainError> {
        self.queries.lock().unwrap().push(*hash);
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .get(hash)
            .copied()
            .unwrap_or(TxStatus::Received))
    }
}

pub fn test_hash(byte: u8) -> TxHash {
    TxHash::new([byte; 32])
}

pub fn wallet_account() -> FeeAccount {
    FeeAccount {
        address: "0x0wallet".to_string(),
        balance: 0,
        requires_fee_preflight: false,
    }
}

pub fn burner_account(balance: u128) -> FeeAccount {
    FeeAccount {
        address: "0x0burner".to_string(),
        balance,
        requires_fee_preflight: true,
    }
}
