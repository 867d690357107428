use crate::{
    boundary::IndexerQuery,
    cache::RefetchFn,
    error::IndexerError,
    query::{
        QueryData,
        QueryKey,
        QueryVariables,
    },
};
use color_eyre::eyre::eyre;
use futures::{
    StreamExt,
    future::BoxFuture,
    stream::FuturesUnordered,
};
use std::{
    cmp::Reverse,
    collections::{
        BinaryHeap,
        HashMap,
    },
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{
        self,
        Instant,
    },
};
use tracing::{
    debug,
    warn,
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5000);

#[derive(Clone, Debug)]
struct PollSlot {
    variables: QueryVariables,
    enabled: bool,
    generation: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DueFetch {
    pub key: QueryKey,
    pub variables: QueryVariables,
}

/// Single priority queue of `(next due time, key)` entries.
///
/// Disabling a key bumps its generation so queued entries for the old
/// generation are skipped when they surface.
#[derive(Debug)]
pub struct PollScheduler {
    interval: Duration,
    slots: HashMap<QueryKey, PollSlot>,
    queue: BinaryHeap<Reverse<(Instant, u64, QueryKey)>>,
}

impl PollScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            slots: HashMap::new(),
            queue: BinaryHeap::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Starts polling `key` with its first fetch due at `now`. Enabling a key
    /// that is already polled only refreshes its variables.
    pub fn enable(&mut self, key: QueryKey, variables: QueryVariables, now: Instant) -> bool {
        if let Some(slot) = self.slots.get_mut(&key)
            && slot.enabled
        {
            slot.variables = variables;
            return false;
        }
        let generation = self
            .slots
            .get(&key)
            .map_or(0, |slot| slot.generation + 1);
        self.slots.insert(
            key,
            PollSlot {
                variables,
                enabled: true,
                generation,
            },
        );
        self.queue.push(Reverse((now, generation, key)));
        true
    }

    pub fn disable(&mut self, key: QueryKey) -> bool {
        match self.slots.get_mut(&key) {
            Some(slot) if slot.enabled => {
                slot.enabled = false;
                slot.generation += 1;
                true
            }
            _ => false,
        }
    }

    pub fn is_enabled(&self, key: QueryKey) -> bool {
        self.slots.get(&key).is_some_and(|slot| slot.enabled)
    }

    /// Variables last registered for `key`, kept after it is disabled so a
    /// manual refetch still knows what to ask for.
    pub fn variables(&self, key: QueryKey) -> Option<&QueryVariables> {
        self.slots.get(&key).map(|slot| &slot.variables)
    }

    pub fn pop_due(&mut self, now: Instant) -> Vec<DueFetch> {
        let mut due = Vec::new();
        while let Some(Reverse((at, generation, key))) = self.queue.peek().copied() {
            if at > now {
                break;
            }
            self.queue.pop();
            let Some(slot) = self.slots.get(&key) else {
                continue;
            };
            if !slot.enabled || slot.generation != generation {
                continue;
            }
            due.push(DueFetch {
                key,
                variables: slot.variables.clone(),
            });
            self.queue.push(Reverse((now + self.interval, generation, key)));
        }
        due
    }

    pub fn next_due(&mut self) -> Option<Instant> {
        while let Some(Reverse((at, generation, key))) = self.queue.peek().copied() {
            let live = self
                .slots
                .get(&key)
                .is_some_and(|slot| slot.enabled && slot.generation == generation);
            if live {
                return Some(at);
            }
            self.queue.pop();
        }
        None
    }
}

#[derive(Debug)]
pub enum PollCommand {
    Enable {
        key: QueryKey,
        variables: QueryVariables,
    },
    Disable(QueryKey),
    FetchNow(QueryKey),
    Shutdown,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollEvent {
    pub key: QueryKey,
    pub data: QueryData,
    pub seq: u64,
}

#[derive(Clone, Debug)]
pub struct PollHandle {
    cmd_tx: mpsc::UnboundedSender<PollCommand>,
}

impl PollHandle {
    pub fn enable(&self, key: QueryKey, variables: QueryVariables) {
        let _ = self.cmd_tx.send(PollCommand::Enable { key, variables });
    }

    pub fn disable(&self, key: QueryKey) {
        let _ = self.cmd_tx.send(PollCommand::Disable(key));
    }

    pub fn fetch_now(&self, key: QueryKey) {
        let _ = self.cmd_tx.send(PollCommand::FetchNow(key));
    }

    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(PollCommand::Shutdown);
    }

    /// Closure stored in the cache; asks the worker for an immediate fetch.
    pub fn refetch_fn(&self, key: QueryKey) -> RefetchFn {
        let cmd_tx = self.cmd_tx.clone();
        Arc::new(move || {
            let sent = cmd_tx
                .send(PollCommand::FetchNow(key))
                .map_err(|_| eyre!("poll worker stopped"));
            Box::pin(async move { sent })
        })
    }
}

pub fn spawn_poll_worker<I: IndexerQuery>(
    indexer: I,
    interval: Duration,
) -> (
    PollHandle,
    mpsc::UnboundedReceiver<PollEvent>,
    JoinHandle<()>,
) {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(poll_worker(
        indexer,
        PollScheduler::new(interval),
        cmd_rx,
        event_tx,
    ));
    (PollHandle { cmd_tx }, event_rx, handle)
}

type FetchResult = (QueryKey, u64, Result<QueryData, IndexerError>);

async fn sleep_until_due(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

pub async fn poll_worker<I: IndexerQuery>(
    indexer: I,
    mut scheduler: PollScheduler,
    mut cmd_rx: mpsc::UnboundedReceiver<PollCommand>,
    event_tx: mpsc::UnboundedSender<PollEvent>,
) {
    let mut in_flight: FuturesUnordered<BoxFuture<'static, FetchResult>> =
        FuturesUnordered::new();
    let mut next_seq: u64 = 0;
    let mut delivered: HashMap<QueryKey, u64> = HashMap::new();

    let mut dispatch = |key: QueryKey,
                        variables: QueryVariables,
                        in_flight: &mut FuturesUnordered<BoxFuture<'static, FetchResult>>| {
        let seq = next_seq;
        next_seq += 1;
        let indexer = indexer.clone();
        debug!(%key, seq, "dispatching poll fetch");
        in_flight.push(Box::pin(async move {
            let result = indexer.query(key, &variables).await;
            (key, seq, result)
        }));
    };

    loop {
        let wake = scheduler.next_due();
        tokio::select! {
            _ = sleep_until_due(wake) => {
                for due in scheduler.pop_due(Instant::now()) {
                    dispatch(due.key, due.variables, &mut in_flight);
                }
            }
            Some((key, seq, result)) = in_flight.next(), if !in_flight.is_empty() => {
                match result {
                    Ok(data) => {
                        if delivered.get(&key).is_some_and(|last| *last > seq) {
                            debug!(%key, seq, "dropping stale poll result");
                            continue;
                        }
                        delivered.insert(key, seq);
                        if event_tx.send(PollEvent { key, data, seq }).is_err() {
                            debug!("poll event receiver dropped");
                            break;
                        }
                    }
                    Err(err) => warn!(%key, %err, "poll fetch failed"),
                }
            }
            maybe_cmd = cmd_rx.recv() => {
                match maybe_cmd {
                    Some(PollCommand::Enable { key, variables }) => {
                        scheduler.enable(key, variables, Instant::now());
                    }
                    Some(PollCommand::Disable(key)) => {
                        scheduler.disable(key);
                    }
                    Some(PollCommand::FetchNow(key)) => {
                        match scheduler.variables(key).cloned() {
                            Some(variables) => dispatch(key, variables, &mut in_flight),
                            None => debug!(%key, "fetch requested for unknown key"),
                        }
                    }
                    Some(PollCommand::Shutdown) | None => break,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        records::Score,
        test_helpers::FakeIndexer,
    };

    fn scores(score: u64) -> QueryData {
        QueryData::Scores(vec![Score {
            adventurer_id: 1,
            score,
        }])
    }

    #[test]
    fn enable__is_idempotent_and_due_immediately() {
        // given
        let now = Instant::now();
        let mut scheduler = PollScheduler::new(DEFAULT_POLL_INTERVAL);

        // when
        let first = scheduler.enable(QueryKey::TopScores, QueryVariables::new(), now);
        let second = scheduler.enable(QueryKey::TopScores, QueryVariables::new(), now);

        // then
        assert!(first);
        assert!(!second);
        let due = scheduler.pop_due(now);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].key, QueryKey::TopScores);
        assert!(scheduler.pop_due(now).is_empty());
    }

    #[test]
    fn pop_due__reschedules_one_interval_later() {
        // given
        let now = Instant::now();
        let mut scheduler = PollScheduler::new(Duration::from_secs(5));
        scheduler.enable(QueryKey::TopScores, QueryVariables::new(), now);
        scheduler.pop_due(now);

        // then
        assert_eq!(scheduler.next_due(), Some(now + Duration::from_secs(5)));
        assert!(
            scheduler
                .pop_due(now + Duration::from_millis(4999))
                .is_empty()
        );
        assert_eq!(scheduler.pop_due(now + Duration::from_secs(5)).len(), 1);
    }

    #[test]
    fn disable__stops_future_fetches_and_keeps_variables() {
        // given
        let now = Instant::now();
        let variables = QueryVariables::new().with("id", 4);
        let mut scheduler = PollScheduler::new(Duration::from_secs(5));
        scheduler.enable(QueryKey::AdventurerById, variables.clone(), now);
        scheduler.pop_due(now);

        // when
        let disabled = scheduler.disable(QueryKey::AdventurerById);

        // then
        assert!(disabled);
        assert!(!scheduler.is_enabled(QueryKey::AdventurerById));
        assert_eq!(scheduler.next_due(), None);
        assert!(scheduler.pop_due(now + Duration::from_secs(60)).is_empty());
        assert_eq!(scheduler.variables(QueryKey::AdventurerById), Some(&variables));
    }

    #[test]
    fn enable__after_disable_does_not_revive_old_entries() {
        // given
        let now = Instant::now();
        let mut scheduler = PollScheduler::new(Duration::from_secs(5));
        scheduler.enable(QueryKey::TopScores, QueryVariables::new(), now);
        scheduler.disable(QueryKey::TopScores);

        // when
        let later = now + Duration::from_secs(1);
        scheduler.enable(QueryKey::TopScores, QueryVariables::new(), later);

        // then
        assert_eq!(scheduler.pop_due(later).len(), 1);
        assert!(scheduler.pop_due(later).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn poll_worker__polls_each_interval_until_disabled() {
        // given
        let indexer = FakeIndexer::new();
        indexer.set_response(QueryKey::TopScores, scores(10));
        let (handle, mut events, _worker) =
            spawn_poll_worker(indexer.clone(), Duration::from_secs(5));

        // when
        handle.enable(QueryKey::TopScores, QueryVariables::new());
        let first = events.recv().await.unwrap();
        time::sleep(Duration::from_secs(5)).await;
        let second = events.recv().await.unwrap();
        handle.disable(QueryKey::TopScores);
        time::sleep(Duration::from_secs(30)).await;

        // then
        assert_eq!(first.data, scores(10));
        assert!(second.seq > first.seq);
        assert_eq!(indexer.call_count(QueryKey::TopScores), 2);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn poll_worker__delivers_in_flight_result_after_disable() {
        // given
        let (indexer, gate) = FakeIndexer::gated();
        indexer.set_response(QueryKey::TopScores, scores(7));
        let (handle, mut events, _worker) =
            spawn_poll_worker(indexer.clone(), Duration::from_secs(5));
        handle.enable(QueryKey::TopScores, QueryVariables::new());
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(indexer.call_count(QueryKey::TopScores), 1);

        // when
        handle.disable(QueryKey::TopScores);
        time::sleep(Duration::from_millis(10)).await;
        gate.open();
        let event = events.recv().await.unwrap();

        // then
        assert_eq!(event.data, scores(7));
        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(indexer.call_count(QueryKey::TopScores), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_worker__drops_fetch_errors_and_retries_next_tick() {
        // given
        let indexer = FakeIndexer::new();
        indexer.push_response(
            QueryKey::TopScores,
            Err(IndexerError::Transport("connection reset".to_string())),
        );
        indexer.set_response(QueryKey::TopScores, scores(3));
        let (handle, mut events, _worker) =
            spawn_poll_worker(indexer.clone(), Duration::from_secs(5));

        // when
        handle.enable(QueryKey::TopScores, QueryVariables::new());
        let event = events.recv().await.unwrap();

        // then
        assert_eq!(event.data, scores(3));
        assert_eq!(indexer.call_count(QueryKey::TopScores), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn refetch_fn__triggers_an_immediate_fetch() {
        // given
        let indexer = FakeIndexer::new();
        indexer.set_response(QueryKey::TopScores, scores(1));
        let (handle, mut events, _worker) =
            spawn_poll_worker(indexer.clone(), Duration::from_secs(60));
        handle.enable(QueryKey::TopScores, QueryVariables::new());
        events.recv().await.unwrap();
        indexer.set_response(QueryKey::TopScores, scores(2));

        // when
        let refetch = handle.refetch_fn(QueryKey::TopScores);
        refetch().await.unwrap();
        let event = events.recv().await.unwrap();

        // then
        assert_eq!(event.data, scores(2));
        assert_eq!(indexer.call_count(QueryKey::TopScores), 2);
    }
}
