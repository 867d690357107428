use crate::query::{
    QueryData,
    QueryKey,
};
use color_eyre::eyre::Result;
use futures::future::BoxFuture;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fmt,
    sync::Arc,
};
use tracing::{
    debug,
    warn,
};

pub type RefetchFn = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Bounded tolerance for empty results on a key that is written
/// optimistically before the indexer catches up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimisticPolicy {
    pub max_ignored_empty: u32,
}

#[derive(Clone, Default)]
pub struct CacheEntry {
    pub data: Option<QueryData>,
    pub is_loading: bool,
    pub is_updated: bool,
    refetch: Option<RefetchFn>,
    ignored_empty: u32,
}

impl CacheEntry {
    pub fn has_refetch(&self) -> bool {
        self.refetch.is_some()
    }
}

impl fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("data", &self.data)
            .field("is_loading", &self.is_loading)
            .field("is_updated", &self.is_updated)
            .field("has_refetch", &self.refetch.is_some())
            .field("ignored_empty", &self.ignored_empty)
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateEffect {
    Unchanged,
    IgnoredEmpty,
    Replaced,
}

impl UpdateEffect {
    pub fn changed(self) -> bool {
        self == UpdateEffect::Replaced
    }
}

/// Applies one fetch result to an entry.
pub fn apply_update(
    entry: &mut CacheEntry,
    new_data: QueryData,
    loading: bool,
    refetch: Option<RefetchFn>,
    policy: Option<OptimisticPolicy>,
) -> UpdateEffect {
    if entry.data.as_ref() == Some(&new_data) {
        return UpdateEffect::Unchanged;
    }

    let holds_records = entry.data.as_ref().is_some_and(|data| !data.is_empty());
    if new_data.is_empty()
        && holds_records
        && let Some(policy) = policy
        && entry.ignored_empty < policy.max_ignored_empty
    {
        entry.ignored_empty += 1;
        return UpdateEffect::IgnoredEmpty;
    }

    entry.ignored_empty = 0;
    entry.data = Some(new_data);
    entry.is_loading = loading;
    entry.is_updated = true;
    if let Some(refetch) = refetch {
        entry.refetch = Some(refetch);
    }
    UpdateEffect::Replaced
}

/// Latest indexer result per query key plus the "something changed" flags
/// the notification flow waits on.
pub struct RemoteStateCache {
    entries: [CacheEntry; QueryKey::COUNT],
    policies: [Option<OptimisticPolicy>; QueryKey::COUNT],
    any_updated: bool,
}

impl Default for RemoteStateCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RemoteStateCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteStateCache")
            .field("any_updated", &self.any_updated)
            .field(
                "populated",
                &QueryKey::ALL
                    .iter()
                    .filter(|key| self.entry(**key).data.is_some())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl RemoteStateCache {
    pub fn new() -> Self {
        Self {
            entries: std::array::from_fn(|_| CacheEntry::default()),
            policies: [None; QueryKey::COUNT],
            any_updated: false,
        }
    }

    pub fn with_optimistic_keys(
        policies: impl IntoIterator<Item = (QueryKey, OptimisticPolicy)>,
    ) -> Self {
        let mut cache = Self::new();
        for (key, policy) in policies {
            cache.policies[key.index()] = Some(policy);
        }
        cache
    }

    /// Returns `true` when the stored data was replaced.
    pub fn update(
        &mut self,
        key: QueryKey,
        new_data: QueryData,
        loading: bool,
        refetch: Option<RefetchFn>,
    ) -> bool {
        let policy = self.policies[key.index()];
        let effect = apply_update(
            &mut self.entries[key.index()],
            new_data,
            loading,
            refetch,
            policy,
        );
        match effect {
            UpdateEffect::Unchanged => debug!(%key, "query result unchanged"),
            UpdateEffect::IgnoredEmpty => {
                debug!(%key, "ignoring empty result for optimistic key")
            }
            UpdateEffect::Replaced => self.any_updated = true,
        }
        effect.changed()
    }

    /// Clears the updated flag of one key, or of every key and the global
    /// flag when `key` is `None`. A per-key clear leaves the global flag set.
    pub fn reset_updated(&mut self, key: Option<QueryKey>) {
        match key {
            Some(key) => self.entries[key.index()].is_updated = false,
            None => {
                for entry in &mut self.entries {
                    entry.is_updated = false;
                }
                self.any_updated = false;
            }
        }
    }

    /// Drops cached data for one key, or for every key.
    pub fn reset(&mut self, key: Option<QueryKey>) {
        let reset_entry = |entry: &mut CacheEntry| {
            entry.data = None;
            entry.is_loading = false;
            entry.is_updated = false;
            entry.ignored_empty = 0;
        };
        match key {
            Some(key) => reset_entry(&mut self.entries[key.index()]),
            None => {
                self.entries.iter_mut().for_each(reset_entry);
                self.any_updated = false;
            }
        }
    }

    pub fn refetch_handle(&self, key: QueryKey) -> Option<RefetchFn> {
        self.entries[key.index()].refetch.clone()
    }

    /// Runs the stored refetch closure. Failures are logged and swallowed;
    /// returns whether the refetch was issued successfully.
    pub async fn refetch(&self, key: QueryKey) -> bool {
        let Some(refetch) = self.refetch_handle(key) else {
            debug!(%key, "no refetch registered");
            return false;
        };
        match refetch().await {
            Ok(()) => true,
            Err(err) => {
                warn!(%key, ?err, "refetch failed");
                false
            }
        }
    }

    pub fn entry(&self, key: QueryKey) -> &CacheEntry {
        &self.entries[key.index()]
    }

    pub fn data(&self, key: QueryKey) -> Option<&QueryData> {
        self.entry(key).data.as_ref()
    }

    pub fn is_loading(&self, key: QueryKey) -> bool {
        self.entry(key).is_loading
    }

    pub fn is_updated(&self, key: QueryKey) -> bool {
        self.entry(key).is_updated
    }

    pub fn any_updated(&self) -> bool {
        self.any_updated
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::records::Score;
    use color_eyre::eyre::eyre;
    use proptest::prelude::*;
    use std::sync::atomic::{
        AtomicUsize,
        Ordering,
    };

    fn scores(values: &[(u64, u64)]) -> QueryData {
        QueryData::Scores(
            values
                .iter()
                .map(|(adventurer_id, score)| Score {
                    adventurer_id: *adventurer_id,
                    score: *score,
                })
                .collect(),
        )
    }

    fn counting_refetch(counter: Arc<AtomicUsize>, fail: bool) -> RefetchFn {
        Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                if fail {
                    Err(eyre!("indexer unavailable"))
                } else {
                    Ok(())
                }
            })
        })
    }

    proptest! {
        #[test]
        fn update__second_identical_update_is_a_no_op(
            values in proptest::collection::vec((any::<u64>(), any::<u64>()), 0..8)
        ) {
            // given
            let mut cache = RemoteStateCache::new();
            let data = scores(&values);
            prop_assert!(cache.update(QueryKey::TopScores, data.clone(), false, None));
            cache.reset_updated(None);

            // when
            let changed = cache.update(QueryKey::TopScores, data.clone(), false, None);

            // then
            prop_assert!(!changed);
            prop_assert!(!cache.is_updated(QueryKey::TopScores));
            prop_assert!(!cache.any_updated());
            prop_assert_eq!(cache.data(QueryKey::TopScores), Some(&data));
        }
    }

    #[test]
    fn update__sets_key_and_global_flags() {
        // given
        let mut cache = RemoteStateCache::new();

        // when
        let changed = cache.update(QueryKey::TopScores, scores(&[(1, 10)]), true, None);

        // then
        assert!(changed);
        assert!(cache.is_updated(QueryKey::TopScores));
        assert!(cache.is_loading(QueryKey::TopScores));
        assert!(cache.any_updated());
        assert!(!cache.is_updated(QueryKey::AdventurerById));
    }

    #[test]
    fn reset_updated__single_key_leaves_global_flag_set() {
        // given
        let mut cache = RemoteStateCache::new();
        cache.update(QueryKey::TopScores, scores(&[(1, 10)]), false, None);
        cache.update(QueryKey::KilledBeasts, QueryData::Beasts(Vec::new()), false, None);

        // when
        cache.reset_updated(Some(QueryKey::TopScores));

        // then
        assert!(!cache.is_updated(QueryKey::TopScores));
        assert!(cache.is_updated(QueryKey::KilledBeasts));
        assert!(cache.any_updated());
    }

    #[test]
    fn reset_updated__none_clears_every_flag() {
        // given
        let mut cache = RemoteStateCache::new();
        cache.update(QueryKey::TopScores, scores(&[(1, 10)]), false, None);
        cache.update(QueryKey::KilledBeasts, QueryData::Beasts(Vec::new()), false, None);

        // when
        cache.reset_updated(None);

        // then
        assert!(QueryKey::ALL.iter().all(|key| !cache.is_updated(*key)));
        assert!(!cache.any_updated());
        assert_eq!(cache.data(QueryKey::TopScores), Some(&scores(&[(1, 10)])));
    }

    #[test]
    fn update__optimistic_key_ignores_empty_results_within_budget() {
        // given
        let mut cache = RemoteStateCache::with_optimistic_keys([(
            QueryKey::TopScores,
            OptimisticPolicy {
                max_ignored_empty: 2,
            },
        )]);
        let written = scores(&[(3, 30)]);
        cache.update(QueryKey::TopScores, written.clone(), false, None);
        cache.reset_updated(None);

        // when
        let first = cache.update(QueryKey::TopScores, scores(&[]), false, None);
        let second = cache.update(QueryKey::TopScores, scores(&[]), false, None);

        // then
        assert!(!first && !second);
        assert_eq!(cache.data(QueryKey::TopScores), Some(&written));
        assert!(!cache.is_updated(QueryKey::TopScores));

        // when
        let third = cache.update(QueryKey::TopScores, scores(&[]), false, None);

        // then
        assert!(third);
        assert_eq!(cache.data(QueryKey::TopScores), Some(&scores(&[])));
    }

    #[test]
    fn update__non_optimistic_key_accepts_empty_results() {
        // given
        let mut cache = RemoteStateCache::new();
        cache.update(QueryKey::TopScores, scores(&[(3, 30)]), false, None);

        // when
        let changed = cache.update(QueryKey::TopScores, scores(&[]), false, None);

        // then
        assert!(changed);
        assert_eq!(cache.data(QueryKey::TopScores), Some(&scores(&[])));
    }

    #[test]
    fn reset__drops_data_for_one_key() {
        // given
        let mut cache = RemoteStateCache::new();
        cache.update(QueryKey::TopScores, scores(&[(3, 30)]), false, None);
        cache.update(QueryKey::KilledBeasts, QueryData::Beasts(Vec::new()), false, None);

        // when
        cache.reset(Some(QueryKey::TopScores));

        // then
        assert!(cache.data(QueryKey::TopScores).is_none());
        assert!(!cache.is_updated(QueryKey::TopScores));
        assert!(cache.data(QueryKey::KilledBeasts).is_some());
    }

    #[tokio::test]
    async fn refetch__swallows_failures_from_the_stored_closure() {
        // given
        let calls = Arc::new(AtomicUsize::new(0));
        let mut cache = RemoteStateCache::new();
        cache.update(
            QueryKey::TopScores,
            scores(&[(1, 1)]),
            false,
            Some(counting_refetch(calls.clone(), true)),
        );

        // when
        let issued = cache.refetch(QueryKey::TopScores).await;

        // then
        assert!(!issued);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.data(QueryKey::TopScores), Some(&scores(&[(1, 1)])));
    }

    #[tokio::test]
    async fn refetch__without_registered_closure_does_nothing() {
        // given
        let cache = RemoteStateCache::new();

        // when
        let issued = cache.refetch(QueryKey::Beast).await;

        // then
        assert!(!issued);
    }

    #[tokio::test]
    async fn refetch__keeps_previous_closure_when_update_passes_none() {
        // given
        let calls = Arc::new(AtomicUsize::new(0));
        let mut cache = RemoteStateCache::new();
        cache.update(
            QueryKey::TopScores,
            scores(&[(1, 1)]),
            false,
            Some(counting_refetch(calls.clone(), false)),
        );
        cache.update(QueryKey::TopScores, scores(&[(2, 2)]), false, None);

        // when
        let issued = cache.refetch(QueryKey::TopScores).await;

        // then
        assert!(issued);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
