use crate::{
    boundary::{
        ChainExecutor,
        IndexerQuery,
        StatusWatcher,
    },
    cache::{
        RefetchFn,
        RemoteStateCache,
    },
    cart::{
        Batch,
        FeeAccount,
        FundingShortfall,
        PendingCall,
        TransactionCart,
    },
    config::SyncConfig,
    error::{
        CartError,
        ChainError,
    },
    ledger::{
        Metadata,
        TransactionLedger,
        TxHash,
        TxStatus,
    },
    notification::{
        BattleOutcome,
        ExploreOutcome,
        MulticallOutcome,
        NotificationEvent,
        NotificationSequencer,
        NotificationTimings,
        Outcome,
        SequencerState,
        SequencerTransition,
        SubOutcome,
        UpgradeSummary,
        classify,
    },
    polling::{
        PollEvent,
        PollHandle,
        spawn_poll_worker,
    },
    query::{
        QueryData,
        QueryKey,
        QueryVariables,
    },
    records::{
        Attacker,
        Battle,
        Discovery,
    },
};
use futures::{
    StreamExt,
    future::BoxFuture,
    stream::FuturesUnordered,
};
use rand::{
    SeedableRng,
    rngs::StdRng,
};
use std::{
    collections::HashSet,
    time::Duration,
};
use tokio::{
    sync::{
        mpsc,
        oneshot,
        watch,
    },
    task::JoinHandle,
    time::{
        self,
        Instant,
        MissedTickBehavior,
    },
};
use tracing::{
    debug,
    error,
    info,
    trace,
    warn,
};

/// What the player asked for, kept until the transaction resolves so the
/// right outcome can be built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActionKind {
    Explore,
    Attack { beast: Option<String> },
    Flee { beast: Option<String> },
    Multicall { actions: Vec<SubOutcome> },
    Upgrade(UpgradeSummary),
    Other { message: String },
}

impl ActionKind {
    /// Query whose refresh carries the action's result. Actions without one
    /// resolve as soon as the transaction is accepted.
    pub fn watched_key(&self) -> Option<QueryKey> {
        match self {
            ActionKind::Explore => Some(QueryKey::DiscoveryByTxHash),
            ActionKind::Attack { .. } | ActionKind::Flee { .. } => {
                Some(QueryKey::BattlesByTxHash)
            }
            ActionKind::Multicall { .. } => Some(QueryKey::AdventurerById),
            ActionKind::Upgrade(_) | ActionKind::Other { .. } => None,
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            ActionKind::Explore => "Explore",
            ActionKind::Attack { .. } => "Attack",
            ActionKind::Flee { .. } => "Flee",
            ActionKind::Multicall { .. } => "Multicall",
            ActionKind::Upgrade(_) => "Upgrade",
            ActionKind::Other { .. } => "Other",
        }
    }
}

#[derive(Clone, Debug)]
pub struct SubmitRequest {
    pub action: ActionKind,
    pub metadata: Metadata,
    pub account: FeeAccount,
}

impl SubmitRequest {
    pub fn new(action: ActionKind, account: FeeAccount) -> Self {
        let metadata = Metadata::new(action.method());
        Self {
            action,
            metadata,
            account,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitReport {
    Submitted(TxHash),
    NeedsFunding(FundingShortfall),
    Failed(ChainError),
    Busy,
    Empty,
}

/// A batch taken out of the cart, waiting on the chain. The cart stays locked
/// until it is handed back to `SyncEngine::finish_submit`.
#[derive(Debug)]
pub struct PreparedSubmission {
    batch: Batch,
    action: ActionKind,
    metadata: Metadata,
}

impl PreparedSubmission {
    pub fn batch(&self) -> &Batch {
        &self.batch
    }
}

#[derive(Clone, Debug)]
struct AwaitingOutcome {
    hash: TxHash,
    action: ActionKind,
    accepted: bool,
}

/// Read-only view published after every state change.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncSnapshot {
    pub active_notification: Option<NotificationEvent>,
    pub sequencer: SequencerState,
    pub pending_calls: usize,
    pub submission_in_flight: bool,
    pub cart_error: Option<String>,
    pub needs_funding: Option<FundingShortfall>,
    pub awaiting: Vec<TxHash>,
    pub any_updated: bool,
    pub ledger_len: usize,
}

pub struct SyncEngine {
    cache: RemoteStateCache,
    cart: TransactionCart,
    ledger: TransactionLedger,
    sequencer: NotificationSequencer,
    awaiting: Vec<AwaitingOutcome>,
    needs_funding: Option<FundingShortfall>,
    fee_ceiling: u128,
    timings: NotificationTimings,
    rng: StdRng,
    snapshot_tx: watch::Sender<SyncSnapshot>,
}

impl SyncEngine {
    pub fn new(config: &SyncConfig) -> Self {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    pub fn with_seed(config: &SyncConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: &SyncConfig, rng: StdRng) -> Self {
        let (snapshot_tx, _) = watch::channel(SyncSnapshot::default());
        Self {
            cache: RemoteStateCache::with_optimistic_keys(config.optimistic_policies()),
            cart: TransactionCart::new(),
            ledger: TransactionLedger::new(),
            sequencer: NotificationSequencer::new(),
            awaiting: Vec::new(),
            needs_funding: None,
            fee_ceiling: config.fee_ceiling,
            timings: config.timings(),
            rng,
            snapshot_tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        SyncSnapshot {
            active_notification: self.sequencer.active().cloned(),
            sequencer: self.sequencer.state(),
            pending_calls: self.cart.calls().len(),
            submission_in_flight: self.cart.is_in_flight(),
            cart_error: self.cart.error().map(str::to_string),
            needs_funding: self.needs_funding.clone(),
            awaiting: self.awaiting.iter().map(|awaiting| awaiting.hash).collect(),
            any_updated: self.cache.any_updated(),
            ledger_len: self.ledger.len(),
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }

    pub fn active_notification(&self) -> Option<&NotificationEvent> {
        self.sequencer.active()
    }

    pub fn cache(&self) -> &RemoteStateCache {
        &self.cache
    }

    pub fn cart(&self) -> &TransactionCart {
        &self.cart
    }

    pub fn ledger(&self) -> &TransactionLedger {
        &self.ledger
    }

    pub fn sequencer(&self) -> &NotificationSequencer {
        &self.sequencer
    }

    /// Hashes still waiting for an accepted status.
    pub fn unaccepted_hashes(&self) -> Vec<TxHash> {
        self.awaiting
            .iter()
            .filter(|awaiting| !awaiting.accepted)
            .map(|awaiting| awaiting.hash)
            .collect()
    }

    pub fn apply_poll(
        &mut self,
        event: PollEvent,
        refetch: Option<RefetchFn>,
        now: Instant,
    ) -> bool {
        let PollEvent { key, data, seq } = event;
        let changed = self.cache.update(key, data, false, refetch);
        if changed {
            trace!(%key, seq, "cache updated from poll");
            self.resolve_awaiting(now);
            self.publish();
        }
        changed
    }

    pub fn add_call(&mut self, call: PendingCall) {
        self.cart.add_call(call);
        self.publish();
    }

    pub fn remove_call(&mut self, call: &PendingCall) -> usize {
        let removed = self.cart.remove_call(call);
        self.publish();
        removed
    }

    pub fn remove_by_entrypoint(&mut self, entrypoint: &str) -> usize {
        let removed = self.cart.remove_by_entrypoint(entrypoint);
        self.publish();
        removed
    }

    pub async fn submit<C: ChainExecutor>(
        &mut self,
        request: SubmitRequest,
        chain: &C,
    ) -> SubmitReport {
        let prepared = match self.begin_submit(request, Instant::now()) {
            Ok(prepared) => prepared,
            Err(report) => return report,
        };
        let result = chain
            .execute(prepared.batch.calls(), prepared.batch.fee())
            .await;
        self.finish_submit(prepared, result, Instant::now())
    }

    /// Locks the cart and takes its calls. `Err` carries the final report when
    /// nothing needs to reach the chain.
    pub fn begin_submit(
        &mut self,
        request: SubmitRequest,
        now: Instant,
    ) -> Result<PreparedSubmission, SubmitReport> {
        let SubmitRequest {
            action,
            metadata,
            account,
        } = request;
        let batch = match self.cart.begin_submission(&account, self.fee_ceiling) {
            Ok(batch) => batch,
            Err(CartError::NeedsFunding(shortfall)) => {
                warn!(
                    address = %shortfall.address,
                    balance = %shortfall.balance,
                    fee_ceiling = %shortfall.fee_ceiling,
                    "account needs funding before submitting"
                );
                self.needs_funding = Some(shortfall.clone());
                self.publish();
                return Err(SubmitReport::NeedsFunding(shortfall));
            }
            Err(CartError::SubmissionInFlight) => return Err(SubmitReport::Busy),
            Err(CartError::EmptyCart) => return Err(SubmitReport::Empty),
            Err(CartError::Chain(err)) => return Err(self.fail_submission(err, now)),
        };
        self.needs_funding = None;
        self.publish();
        Ok(PreparedSubmission {
            batch,
            action,
            metadata,
        })
    }

    /// Unlocks the cart with the chain's answer for a prepared batch.
    pub fn finish_submit(
        &mut self,
        prepared: PreparedSubmission,
        result: Result<TxHash, ChainError>,
        now: Instant,
    ) -> SubmitReport {
        let PreparedSubmission {
            batch,
            action,
            metadata,
        } = prepared;
        match self.cart.complete_submission(batch, result) {
            Ok(submission) => {
                let hash = submission.hash;
                self.ledger.append(hash, metadata);
                info!(
                    %hash,
                    method = action.method(),
                    calls = submission.call_count,
                    "transaction submitted"
                );
                self.awaiting.push(AwaitingOutcome {
                    hash,
                    action,
                    accepted: false,
                });
                self.publish();
                SubmitReport::Submitted(hash)
            }
            Err(CartError::Chain(err)) => self.fail_submission(err, now),
            Err(other) => {
                error!(%other, "unexpected cart state after submission");
                self.fail_submission(ChainError::Unknown(other.to_string()), now)
            }
        }
    }

    fn fail_submission(&mut self, err: ChainError, now: Instant) -> SubmitReport {
        error!(kind = ?err.kind(), %err, "transaction submission failed");
        self.enqueue_outcome(Outcome::Failed(err.clone()), Vec::new(), now);
        SubmitReport::Failed(err)
    }

    pub fn record_status(&mut self, hash: &TxHash, status: TxStatus, now: Instant) {
        let Some(position) = self
            .awaiting
            .iter()
            .position(|awaiting| &awaiting.hash == hash)
        else {
            debug!(%hash, ?status, "status for untracked transaction");
            return;
        };
        let method = self
            .ledger
            .find_by_hash(hash)
            .map(|record| record.metadata.method.clone())
            .unwrap_or_default();

        match status {
            TxStatus::Rejected => {
                self.awaiting.remove(position);
                warn!(%hash, %method, "transaction rejected");
                self.enqueue_outcome(
                    Outcome::Failed(ChainError::UserRejected(format!("{method} rejected"))),
                    Vec::new(),
                    now,
                );
            }
            status if status.is_accepted() => {
                debug!(%hash, %method, ?status, "transaction accepted");
                self.awaiting[position].accepted = true;
                self.resolve_awaiting(now);
            }
            status => trace!(%hash, ?status, "transaction pending"),
        }
        self.publish();
    }

    fn resolve_awaiting(&mut self, now: Instant) {
        let mut index = 0;
        while index < self.awaiting.len() {
            let awaiting = &self.awaiting[index];
            if !awaiting.accepted || !self.outcome_data_ready(awaiting) {
                index += 1;
                continue;
            }
            let awaiting = self.awaiting.remove(index);
            let watched = awaiting.action.watched_key();
            let outcome = self.build_outcome(&awaiting);
            debug!(hash = %awaiting.hash, method = awaiting.action.method(), "outcome resolved");
            self.enqueue_outcome(outcome, watched.into_iter().collect(), now);
        }
    }

    /// Records keyed by transaction hash only count once they carry this
    /// transaction's hash. The updated flag alone may be left over from an
    /// earlier poll or outcome.
    fn outcome_data_ready(&self, awaiting: &AwaitingOutcome) -> bool {
        match &awaiting.action {
            ActionKind::Explore => !self.discoveries_for(&awaiting.hash).is_empty(),
            ActionKind::Attack { .. } | ActionKind::Flee { .. } => {
                !self.battles_for(&awaiting.hash).is_empty()
            }
            action => action
                .watched_key()
                .is_none_or(|key| self.cache.is_updated(key)),
        }
    }

    fn build_outcome(&self, awaiting: &AwaitingOutcome) -> Outcome {
        let hash = awaiting.hash;
        match &awaiting.action {
            ActionKind::Explore => Outcome::Explore(ExploreOutcome {
                discoveries: self.discoveries_for(&hash),
            }),
            ActionKind::Attack { beast } => Outcome::Attack(BattleOutcome {
                battles: self.battles_for(&hash),
                beast_name: beast.clone(),
            }),
            ActionKind::Flee { beast } => Outcome::Flee(BattleOutcome {
                battles: self.battles_for(&hash),
                beast_name: beast.clone(),
            }),
            ActionKind::Multicall { actions } => Outcome::Multicall(MulticallOutcome {
                actions: actions.clone(),
                beast_alive: self.beast_alive(),
                last_battle: self.last_beast_battle(),
            }),
            ActionKind::Upgrade(summary) => Outcome::Upgrade(summary.clone()),
            ActionKind::Other { message } => Outcome::Message(message.clone()),
        }
    }

    fn battles_for(&self, hash: &TxHash) -> Vec<Battle> {
        self.cache
            .data(QueryKey::BattlesByTxHash)
            .and_then(QueryData::battles)
            .map(|battles| {
                battles
                    .iter()
                    .filter(|battle| battle.tx_hash.as_ref() == Some(hash))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn discoveries_for(&self, hash: &TxHash) -> Vec<Discovery> {
        self.cache
            .data(QueryKey::DiscoveryByTxHash)
            .and_then(QueryData::discoveries)
            .map(|discoveries| {
                discoveries
                    .iter()
                    .filter(|discovery| discovery.tx_hash.as_ref() == Some(hash))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn beast_alive(&self) -> bool {
        self.cache
            .data(QueryKey::AdventurerById)
            .and_then(QueryData::adventurers)
            .and_then(|adventurers| adventurers.first())
            .is_some_and(|adventurer| adventurer.in_battle())
    }

    fn last_beast_battle(&self) -> Option<Battle> {
        self.cache
            .data(QueryKey::LastBeastBattle)
            .and_then(QueryData::battles)
            .and_then(|battles| {
                battles
                    .iter()
                    .rev()
                    .find(|battle| battle.attacker == Attacker::Beast)
            })
            .cloned()
    }

    fn enqueue_outcome(&mut self, outcome: Outcome, consumed: Vec<QueryKey>, now: Instant) {
        let events = classify(&outcome, &self.timings, &mut self.rng);
        match self.sequencer.enqueue(events, consumed.clone(), now) {
            Some(queue) => debug!(%queue, "notifications queued"),
            None => {
                for key in consumed {
                    self.cache.reset_updated(Some(key));
                }
            }
        }
        self.publish();
    }

    pub fn tick(&mut self, now: Instant) -> Vec<SequencerTransition> {
        let transitions = self.sequencer.advance(now);
        for transition in &transitions {
            match transition {
                SequencerTransition::Completed { queue, consumed } => {
                    debug!(%queue, "notification queue finished");
                    for key in consumed {
                        self.cache.reset_updated(Some(*key));
                    }
                }
                SequencerTransition::Started { queue } => {
                    debug!(%queue, "notification queue started")
                }
                SequencerTransition::Advanced { queue, index } => {
                    trace!(%queue, index, "next notification")
                }
            }
        }
        if !transitions.is_empty() {
            self.publish();
        }
        transitions
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.sequencer.next_deadline()
    }
}

#[derive(Debug)]
pub enum EngineCommand {
    AddCall(PendingCall),
    RemoveCall(PendingCall),
    RemoveByEntrypoint(String),
    Submit {
        request: SubmitRequest,
        reply: Option<oneshot::Sender<SubmitReport>>,
    },
    EnablePoll {
        key: QueryKey,
        variables: QueryVariables,
    },
    DisablePoll(QueryKey),
    Refetch(QueryKey),
    Shutdown,
}

/// Cloneable front door to a running `EngineDriver`.
#[derive(Clone, Debug)]
pub struct EngineHandle {
    commands: mpsc::UnboundedSender<EngineCommand>,
    snapshots: watch::Receiver<SyncSnapshot>,
}

impl EngineHandle {
    pub fn send(&self, command: EngineCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn add_call(&self, call: PendingCall) -> bool {
        self.send(EngineCommand::AddCall(call))
    }

    pub fn enable_poll(&self, key: QueryKey, variables: QueryVariables) -> bool {
        self.send(EngineCommand::EnablePoll { key, variables })
    }

    pub async fn submit(&self, request: SubmitRequest) -> Option<SubmitReport> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if !self.send(EngineCommand::Submit {
            request,
            reply: Some(reply_tx),
        }) {
            return None;
        }
        reply_rx.await.ok()
    }

    pub fn snapshots(&self) -> watch::Receiver<SyncSnapshot> {
        self.snapshots.clone()
    }

    pub fn shutdown(&self) {
        let _ = self.commands.send(EngineCommand::Shutdown);
    }
}

pub struct EngineDriver<C, W> {
    engine: SyncEngine,
    chain: C,
    watcher: W,
    poll: PollHandle,
    poll_events: mpsc::UnboundedReceiver<PollEvent>,
    status_interval: Duration,
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl<C: ChainExecutor, W: StatusWatcher> EngineDriver<C, W> {
    pub fn new(
        engine: SyncEngine,
        chain: C,
        watcher: W,
        poll: PollHandle,
        poll_events: mpsc::UnboundedReceiver<PollEvent>,
        status_interval: Duration,
    ) -> Self {
        Self {
            engine,
            chain,
            watcher,
            poll,
            poll_events,
            status_interval,
        }
    }

    /// Runs until `Shutdown`, every command sender is dropped or the poll
    /// worker goes away. Returns the engine for inspection.
    ///
    /// Chain submissions and status checks run as in-flight futures next to
    /// the loop, so a slow chain never holds up notification ticks or polls.
    pub async fn run(self, mut commands: mpsc::UnboundedReceiver<EngineCommand>) -> SyncEngine {
        let Self {
            mut engine,
            chain,
            watcher,
            poll,
            mut poll_events,
            status_interval,
        } = self;
        let mut status_ticker = time::interval(status_interval);
        status_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut submissions: FuturesUnordered<BoxFuture<'_, SubmissionDone>> =
            FuturesUnordered::new();
        let mut status_checks: FuturesUnordered<BoxFuture<'_, StatusDone>> =
            FuturesUnordered::new();
        let mut checking: HashSet<TxHash> = HashSet::new();

        loop {
            let deadline = engine.next_deadline();
            tokio::select! {
                maybe_event = poll_events.recv() => {
                    match maybe_event {
                        Some(event) => {
                            let refetch = poll.refetch_fn(event.key);
                            engine.apply_poll(event, Some(refetch), Instant::now());
                        }
                        None => {
                            warn!("poll worker channel closed");
                            break;
                        }
                    }
                }
                maybe_command = commands.recv() => {
                    let Some(command) = maybe_command else {
                        break;
                    };
                    if !handle_command(&mut engine, &chain, &poll, &mut submissions, command).await {
                        break;
                    }
                }
                Some((prepared, result, reply)) = submissions.next(), if !submissions.is_empty() => {
                    let report = engine.finish_submit(prepared, result, Instant::now());
                    if let Some(reply) = reply {
                        let _ = reply.send(report);
                    }
                }
                _ = status_ticker.tick() => {
                    for hash in engine.unaccepted_hashes() {
                        if !checking.insert(hash) {
                            continue;
                        }
                        let watcher = &watcher;
                        status_checks.push(Box::pin(async move {
                            let result = watcher.status(&hash).await;
                            (hash, result)
                        }));
                    }
                }
                Some((hash, result)) = status_checks.next(), if !status_checks.is_empty() => {
                    checking.remove(&hash);
                    match result {
                        Ok(status) => engine.record_status(&hash, status, Instant::now()),
                        Err(err) => warn!(%hash, %err, "status check failed"),
                    }
                }
                _ = sleep_until_deadline(deadline) => {
                    engine.tick(Instant::now());
                }
            }
        }
        if !submissions.is_empty() {
            warn!(in_flight = submissions.len(), "stopping with submissions in flight");
        }
        poll.shutdown();
        engine
    }
}

type SubmissionDone = (
    PreparedSubmission,
    Result<TxHash, ChainError>,
    Option<oneshot::Sender<SubmitReport>>,
);

type StatusDone = (TxHash, Result<TxStatus, ChainError>);

async fn handle_command<'a, C: ChainExecutor>(
    engine: &mut SyncEngine,
    chain: &'a C,
    poll: &PollHandle,
    submissions: &mut FuturesUnordered<BoxFuture<'a, SubmissionDone>>,
    command: EngineCommand,
) -> bool {
    match command {
        EngineCommand::AddCall(call) => engine.add_call(call),
        EngineCommand::RemoveCall(call) => {
            engine.remove_call(&call);
        }
        EngineCommand::RemoveByEntrypoint(entrypoint) => {
            engine.remove_by_entrypoint(&entrypoint);
        }
        EngineCommand::Submit { request, reply } => {
            match engine.begin_submit(request, Instant::now()) {
                Ok(prepared) => submissions.push(Box::pin(async move {
                    let result = chain
                        .execute(prepared.batch.calls(), prepared.batch.fee())
                        .await;
                    (prepared, result, reply)
                })),
                Err(report) => {
                    if let Some(reply) = reply {
                        let _ = reply.send(report);
                    }
                }
            }
        }
        EngineCommand::EnablePoll { key, variables } => poll.enable(key, variables),
        EngineCommand::DisablePoll(key) => poll.disable(key),
        EngineCommand::Refetch(key) => {
            engine.cache().refetch(key).await;
        }
        EngineCommand::Shutdown => return false,
    }
    true
}

/// Spawns the poll worker and the engine driver on the current runtime.
pub fn start<I, C, W>(
    config: &SyncConfig,
    engine: SyncEngine,
    indexer: I,
    chain: C,
    watcher: W,
) -> (EngineHandle, JoinHandle<SyncEngine>)
where
    I: IndexerQuery,
    C: ChainExecutor + 'static,
    W: StatusWatcher + 'static,
{
    let (poll, poll_events, _poll_worker) =
        spawn_poll_worker(indexer, config.poll_interval());
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let snapshots = engine.subscribe();
    let driver = EngineDriver::new(
        engine,
        chain,
        watcher,
        poll,
        poll_events,
        config.status_poll_interval(),
    );
    let handle = tokio::spawn(driver.run(command_rx));
    (
        EngineHandle {
            commands: command_tx,
            snapshots,
        },
        handle,
    )
}
