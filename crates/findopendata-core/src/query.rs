//! Joinability query service.
//!
//! [`JoinabilityService`] owns the current LSH index generation and ranks
//! joinable columns for a query column id. It works entirely through the
//! [`SketchStore`] trait; the application supplies the backend.
//!
//! # Ranking
//!
//! 1. Fetch the query sketch (`NotFound` if absent).
//! 2. Collect LSH candidates and drop the query's own id.
//! 3. For each candidate: fetch its sketch, skip same-table columns, score
//!    Jaccard over the full signatures and derive containment.
//! 4. Keep the best `limit` by `(containment, id)` and return them
//!    descending.
//!
//! A failure on one candidate drops that candidate with a warning; only a
//! missing query sketch or missing index fails the request.
//!
//! # Generations
//!
//! [`rebuild`](JoinabilityService::rebuild) builds a fresh index from a
//! full store scan and swaps it in under a short write lock. Queries clone
//! the `Arc` of the generation they start with, so an in-flight query
//! finishes against the index it began on.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::lsh::{LshConfig, LshIndex, LshIndexBuilder, LshParams};
use crate::minhash::MinHashSignature;
use crate::store::{SketchEntry, SketchStore};

pub const DEFAULT_TOP_K: usize = 50;

/// Keyset page size for the bootstrap scan.
const SCAN_PAGE_SIZE: usize = 1000;

/// Containment of Q in X estimated from Jaccard `j` and distinct counts.
///
/// A heuristic bound kept bit-for-bit for compatibility with existing
/// result rankings.
pub fn containment(j: f64, q: u64, x: u64) -> f64 {
    if j == 1.0 {
        return 1.0;
    }
    if j == 0.0 || x == 0 || q == 0 {
        return 0.0;
    }
    let (q, x) = (q as f64, x as f64);
    let bound = (x.min(q) / q).min(j * (1.0 + x) / (1.0 - j));
    j.max(bound.clamp(j, 1.0))
}

/// Columns eligible for indexing: non-empty, and either high-cardinality
/// or mostly unique.
pub fn is_indexable(entry: &SketchEntry) -> bool {
    let non_empty = entry.non_empty_count();
    if non_empty == 0 {
        return false;
    }
    let d = entry.distinct_count;
    d >= 50 || (d >= 10 && d as f64 / non_empty as f64 >= 0.9)
}

struct Ranked<T> {
    score: f64,
    id: String,
    item: T,
}

impl<T> Ranked<T> {
    fn key_cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl<T> PartialEq for Ranked<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key_cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Ranked<T> {}

impl<T> PartialOrd for Ranked<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Ranked<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key_cmp(other)
    }
}

/// Bounded best-`k` selection keyed by `(score, id)`.
pub struct TopK<T> {
    k: usize,
    heap: BinaryHeap<Reverse<Ranked<T>>>,
}

impl<T> TopK<T> {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k),
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn push(&mut self, score: f64, id: impl Into<String>, item: T) {
        if self.k == 0 {
            return;
        }
        let entry = Ranked {
            score,
            id: id.into(),
            item,
        };
        if self.heap.len() < self.k {
            self.heap.push(Reverse(entry));
            return;
        }
        let replace = matches!(self.heap.peek(), Some(Reverse(min)) if entry > *min);
        if replace {
            self.heap.pop();
            self.heap.push(Reverse(entry));
        }
    }

    /// Items ordered by `(score, id)` descending.
    pub fn into_sorted_vec(self) -> Vec<T> {
        // ascending order of Reverse is descending order of the key
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|Reverse(r)| r.item)
            .collect()
    }
}

/// One joinability request.
#[derive(Debug, Clone, Default)]
pub struct JoinQuery {
    pub id: String,
    /// Only rank columns from tables with this source.
    pub source_filter: Option<String>,
    /// Overrides the service's top-k; clamped to at least 1.
    pub limit: Option<usize>,
}

impl JoinQuery {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

/// A ranked joinable column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinableColumn {
    pub id: String,
    pub jaccard: f64,
    pub containment: f64,
    pub column_name: String,
    pub table_id: String,
    pub table_name: String,
    pub source: String,
    pub sample: Vec<String>,
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub lsh: LshConfig,
    pub top_k: usize,
    pub filter_low_cardinality: bool,
    /// Seed every indexed sketch must carry. `None` takes the seed of the
    /// first sketch scanned.
    pub minhash_seed: Option<u64>,
}

impl ServiceConfig {
    pub fn new(lsh: LshConfig) -> Self {
        Self {
            lsh,
            top_k: DEFAULT_TOP_K,
            filter_low_cardinality: true,
            minhash_seed: None,
        }
    }
}

/// A built index and the facts recorded about it.
#[derive(Debug)]
pub struct IndexGeneration {
    pub generation: u64,
    pub index: LshIndex,
    /// Sketches read from the store.
    pub scanned: usize,
    /// Sketches skipped by the cardinality filter.
    pub filtered: usize,
}

impl IndexGeneration {
    pub fn seed(&self) -> Option<u64> {
        self.index.seed()
    }

    pub fn params(&self) -> LshParams {
        self.index.params()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

pub struct JoinabilityService<S> {
    store: Arc<S>,
    config: ServiceConfig,
    current: RwLock<Option<Arc<IndexGeneration>>>,
    generations: AtomicU64,
    rebuilding: Mutex<()>,
}

impl<S: SketchStore> JoinabilityService<S> {
    pub fn new(store: Arc<S>, config: ServiceConfig) -> Result<Self> {
        config.lsh.validate()?;
        Ok(Self {
            store,
            config,
            current: RwLock::new(None),
            generations: AtomicU64::new(0),
            rebuilding: Mutex::new(()),
        })
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// The generation queries currently run against.
    pub fn current(&self) -> Option<Arc<IndexGeneration>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Build a new index from a full store scan and swap it in.
    ///
    /// Any store failure, or a sketch whose seed or length disagrees with
    /// the rest, fails with `IndexUnavailable` and leaves the current
    /// generation in place.
    ///
    /// Rebuilds run one at a time, so a later generation always reflects a
    /// later scan.
    pub async fn rebuild(&self) -> Result<Arc<IndexGeneration>> {
        let _guard = self.rebuilding.lock().await;
        let mut builder = LshIndexBuilder::new(self.config.lsh.clone())?;
        if let Some(seed) = self.config.minhash_seed {
            builder = builder.expect_seed(seed);
        }
        info!(
            threshold = self.config.lsh.threshold,
            num_perm = self.config.lsh.num_perm,
            bands = builder.params().bands,
            rows = builder.params().rows,
            "building LSH index"
        );

        let mut after: Option<String> = None;
        let mut scanned = 0usize;
        let mut filtered = 0usize;
        loop {
            let page = self
                .store
                .scan(after.as_deref(), SCAN_PAGE_SIZE)
                .await
                .map_err(|e| Error::IndexUnavailable(format!("bootstrap scan failed: {:#}", e)))?;
            let Some(last) = page.last() else {
                break;
            };
            after = Some(last.id.clone());
            scanned += page.len();

            for entry in &page {
                if self.config.filter_low_cardinality && !is_indexable(entry) {
                    filtered += 1;
                    continue;
                }
                builder.insert(&entry.id, &entry.signature).map_err(|e| {
                    Error::IndexUnavailable(format!("sketch {} rejected: {}", entry.id, e))
                })?;
            }
            debug!(scanned, indexed = builder.len(), "bootstrap page");
        }

        let generation = self.generations.fetch_add(1, AtomicOrdering::SeqCst) + 1;
        let built = Arc::new(IndexGeneration {
            generation,
            index: builder.build(),
            scanned,
            filtered,
        });
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(built.clone());
        info!(
            generation,
            scanned,
            filtered,
            indexed = built.len(),
            seed = ?built.seed(),
            "LSH index swapped in"
        );
        Ok(built)
    }

    /// Raw LSH candidates for a signature, ascending by id.
    pub fn candidates(&self, signature: &MinHashSignature) -> Result<Vec<String>> {
        let current = self.require_index()?;
        current.index.query(signature)
    }

    /// Rank joinable columns for `query.id`.
    pub async fn query(&self, query: &JoinQuery) -> Result<Vec<JoinableColumn>> {
        let current = self.require_index()?;
        let target = self
            .store
            .get(&query.id)
            .await?
            .ok_or_else(|| Error::NotFound(query.id.clone()))?;

        let candidates: Vec<String> = current
            .index
            .query(&target.signature)?
            .into_iter()
            .filter(|id| *id != target.id)
            .collect();
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let limit = query.limit.unwrap_or(self.config.top_k).max(1);
        let mut top = TopK::new(limit);
        for id in candidates {
            match self.score(&target, &id, query.source_filter.as_deref()).await {
                Ok(Some(result)) => {
                    let score = result.containment;
                    top.push(score, id, result);
                }
                Ok(None) => {}
                Err(e) => warn!(query = %target.id, candidate = %id, error = %e, "dropping candidate"),
            }
        }
        Ok(top.into_sorted_vec())
    }

    /// Score one candidate. `Ok(None)` means it is legitimately excluded.
    async fn score(
        &self,
        target: &SketchEntry,
        id: &str,
        source_filter: Option<&str>,
    ) -> Result<Option<JoinableColumn>> {
        let candidate = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        target.signature.check_compatible(&candidate.signature)?;
        if candidate.table_id == target.table_id {
            return Ok(None);
        }
        let jaccard = target.signature.jaccard(&candidate.signature)?;
        let metadata = self
            .store
            .get_metadata(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("metadata for {}", id)))?;
        if source_filter.is_some_and(|s| s != metadata.source) {
            return Ok(None);
        }
        Ok(Some(JoinableColumn {
            id: id.to_string(),
            jaccard,
            containment: containment(jaccard, target.distinct_count, candidate.distinct_count),
            column_name: metadata.column_name,
            table_id: metadata.table_id,
            table_name: metadata.table_name,
            source: metadata.source,
            sample: metadata.sample,
        }))
    }

    fn require_index(&self) -> Result<Arc<IndexGeneration>> {
        self.current()
            .ok_or_else(|| Error::IndexUnavailable("index has not been built".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{ColumnSketchRecord, SketchParams};
    use crate::store::memory::InMemoryStore;
    use crate::store::TableRecord;
    use crate::table::TableSketch;
    use crate::value::{FieldValue, Record};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    #[test]
    fn containment_edge_cases() {
        assert_eq!(containment(1.0, 5, 1000), 1.0);
        assert_eq!(containment(1.0, 0, 0), 1.0);
        assert_eq!(containment(0.0, 10, 10), 0.0);
        assert_eq!(containment(0.5, 0, 10), 0.0);
        assert_eq!(containment(0.5, 10, 0), 0.0);
        assert_eq!(containment(0.5, 10, 10), 1.0);
    }

    #[test]
    fn containment_never_below_jaccard() {
        for &(j, q, x) in &[(0.1, 1000, 5), (0.3, 100, 40), (0.9, 7, 7000), (0.05, 3, 1)] {
            let c = containment(j, q, x);
            assert!(c >= j && c <= 1.0, "c={} j={}", c, j);
        }
        // small X bounds containment of a large Q
        let c = containment(0.1, 1000, 5);
        assert!((c - 0.1).abs() < 1e-12);
    }

    #[test]
    fn top_k_keeps_best_with_id_tiebreak() {
        let mut top = TopK::new(3);
        for (score, id) in [(0.2, "a"), (0.9, "b"), (0.5, "c"), (0.5, "d"), (0.1, "e"), (0.9, "a2")] {
            top.push(score, id, id.to_string());
        }
        assert_eq!(top.len(), 3);
        assert_eq!(top.into_sorted_vec(), vec!["b", "a2", "d"]);
    }

    #[test]
    fn top_k_zero_keeps_nothing() {
        let mut top = TopK::new(0);
        top.push(1.0, "a", ());
        assert!(top.is_empty());
    }

    #[test]
    fn indexability_rule() {
        let entry = |count, empty, distinct| SketchEntry {
            id: "x".into(),
            table_id: "t".into(),
            signature: MinHashSignature::new(1, vec![0; 4]),
            distinct_count: distinct,
            count,
            empty_count: empty,
        };
        assert!(!is_indexable(&entry(10, 10, 0)));
        assert!(is_indexable(&entry(1000, 0, 50)));
        assert!(is_indexable(&entry(12, 2, 10)));
        assert!(!is_indexable(&entry(100, 0, 10)));
        assert!(!is_indexable(&entry(9, 0, 9)));
    }

    fn params() -> SketchParams {
        SketchParams {
            num_perm: 128,
            seed: 1,
            hll_precision: 8,
            sample_capacity: 100,
        }
    }

    fn column_of(params: &SketchParams, name: &str, values: &[&str]) -> Vec<ColumnSketchRecord> {
        let mut sketch = TableSketch::new(params.clone(), 5);
        for v in values {
            let record: Record = [(name.to_string(), FieldValue::from(*v))].into_iter().collect();
            sketch.update(&record);
        }
        sketch.to_records()
    }

    async fn add_table(
        store: &InMemoryStore,
        table_id: &str,
        source: &str,
        columns: &[ColumnSketchRecord],
    ) -> Vec<String> {
        store
            .upsert_table(&TableRecord {
                id: table_id.into(),
                source: source.into(),
                name: format!("{}-name", table_id),
                content_hash: String::new(),
                record_sample: Vec::new(),
                record_count: 0,
                created_at: 0,
                updated_at: 0,
            })
            .await
            .unwrap();
        store.replace_columns(table_id, columns).await.unwrap()
    }

    fn unfiltered(threshold: f64) -> ServiceConfig {
        ServiceConfig {
            filter_low_cardinality: false,
            ..ServiceConfig::new(LshConfig::new(threshold, 128))
        }
    }

    #[tokio::test]
    async fn query_before_build_is_unavailable() {
        let service = JoinabilityService::new(Arc::new(InMemoryStore::new()), unfiltered(0.5)).unwrap();
        assert!(matches!(
            service.query(&JoinQuery::new("x")).await,
            Err(Error::IndexUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let service = JoinabilityService::new(Arc::new(InMemoryStore::new()), unfiltered(0.5)).unwrap();
        service.rebuild().await.unwrap();
        assert!(matches!(
            service.query(&JoinQuery::new("nope")).await,
            Err(Error::NotFound(_))
        ));
    }

    /// Columns A = {a,b,c,d} and B = {c,d,e,f}, true Jaccard 1/3.
    #[tokio::test]
    async fn end_to_end_overlapping_columns() {
        let p = params();
        let a_rec = column_of(&p, "a", &["a", "b", "c", "d"]);
        let b_rec = column_of(&p, "b", &["c", "d", "e", "f"]);
        let estimate = a_rec[0].signature.jaccard(&b_rec[0].signature).unwrap();
        assert!((estimate - 1.0 / 3.0).abs() <= 0.15, "estimate {}", estimate);

        let store = Arc::new(InMemoryStore::new());
        let a = add_table(&store, "ta", "s1", &a_rec).await;
        let b = add_table(&store, "tb", "s2", &b_rec).await;

        let service = JoinabilityService::new(store, unfiltered(0.1)).unwrap();
        let generation = service.rebuild().await.unwrap();
        assert_eq!(generation.generation, 1);
        assert_eq!(generation.len(), 2);

        let candidates = service.candidates(&a_rec[0].signature).unwrap();
        assert!(candidates.contains(&b[0]));

        let results = service.query(&JoinQuery::new(a[0].clone())).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, b[0]);
        assert_eq!(results[0].jaccard, estimate);
        assert_eq!(results[0].containment, containment(estimate, 4, 4));
        assert_eq!(results[0].table_name, "tb-name");
        assert_eq!(results[0].source, "s2");
    }

    #[tokio::test]
    async fn excludes_self_and_same_table_and_filters_source() {
        let p = params();
        let values: Vec<String> = (0..60).map(|i| format!("v{}", i)).collect();
        let values: Vec<&str> = values.iter().map(|s| s.as_str()).collect();
        let rec = column_of(&p, "k", &values);

        let store = Arc::new(InMemoryStore::new());
        // two identical columns in one table, plus copies in two other tables
        let mut same_table = rec.clone();
        let mut twin = rec[0].clone();
        twin.column_name = "k2".into();
        same_table.push(twin);
        let q = add_table(&store, "t1", "s1", &same_table).await;
        let x = add_table(&store, "t2", "s1", &rec).await;
        let y = add_table(&store, "t3", "s2", &rec).await;

        let service = JoinabilityService::new(store, ServiceConfig::new(LshConfig::new(0.5, 128))).unwrap();
        service.rebuild().await.unwrap();

        let results = service.query(&JoinQuery::new(q[0].clone())).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        // ties on containment 1.0 break by id descending
        let mut expected = vec![x[0].as_str(), y[0].as_str()];
        expected.sort();
        expected.reverse();
        assert_eq!(ids, expected);
        assert!(results.iter().all(|r| r.jaccard == 1.0 && r.containment == 1.0));

        let filtered = service
            .query(&JoinQuery {
                id: q[0].clone(),
                source_filter: Some("s2".into()),
                limit: None,
            })
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, y[0]);

        let limited = service
            .query(&JoinQuery {
                id: q[0].clone(),
                source_filter: None,
                limit: Some(0),
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn low_cardinality_columns_are_not_indexed() {
        let p = params();
        let store = Arc::new(InMemoryStore::new());
        add_table(&store, "t1", "s", &column_of(&p, "flag", &["y", "n", "y", "n"])).await;
        let service = JoinabilityService::new(store, ServiceConfig::new(LshConfig::new(0.5, 128))).unwrap();
        let generation = service.rebuild().await.unwrap();
        assert_eq!(generation.scanned, 1);
        assert_eq!(generation.filtered, 1);
        assert!(generation.is_empty());
    }

    #[tokio::test]
    async fn mixed_seeds_fail_bootstrap_and_keep_previous_index() {
        let store = Arc::new(InMemoryStore::new());
        add_table(&store, "t1", "s", &column_of(&params(), "a", &["x"])).await;
        let service = JoinabilityService::new(store.clone(), unfiltered(0.5)).unwrap();
        service.rebuild().await.unwrap();

        let other = SketchParams { seed: 2, ..params() };
        add_table(&store, "t2", "s", &column_of(&other, "b", &["x"])).await;
        assert!(matches!(service.rebuild().await, Err(Error::IndexUnavailable(_))));
        assert_eq!(service.current().unwrap().generation, 1);
    }

    /// Store whose lookups fail for one id.
    struct FlakyStore {
        inner: InMemoryStore,
        broken: std::sync::Mutex<Option<String>>,
    }

    #[async_trait]
    impl SketchStore for FlakyStore {
        async fn get(&self, id: &str) -> anyhow::Result<Option<SketchEntry>> {
            if self.broken.lock().unwrap().as_deref() == Some(id) {
                return Err(anyhow!("connection reset"));
            }
            self.inner.get(id).await
        }
        async fn scan(&self, after: Option<&str>, limit: usize) -> anyhow::Result<Vec<SketchEntry>> {
            self.inner.scan(after, limit).await
        }
        async fn get_metadata(&self, id: &str) -> anyhow::Result<Option<crate::store::ColumnMetadata>> {
            self.inner.get_metadata(id).await
        }
        async fn get_table(&self, source: &str, name: &str) -> anyhow::Result<Option<TableRecord>> {
            self.inner.get_table(source, name).await
        }
        async fn upsert_table(&self, table: &TableRecord) -> anyhow::Result<String> {
            self.inner.upsert_table(table).await
        }
        async fn replace_columns(
            &self,
            table_id: &str,
            columns: &[ColumnSketchRecord],
        ) -> anyhow::Result<Vec<String>> {
            self.inner.replace_columns(table_id, columns).await
        }
    }

    #[tokio::test]
    async fn failing_candidate_is_dropped() {
        let rec = column_of(&params(), "a", &["1", "2", "3"]);
        let flaky = Arc::new(FlakyStore {
            inner: InMemoryStore::new(),
            broken: std::sync::Mutex::new(None),
        });
        let q = add_table(&flaky.inner, "t1", "s", &rec).await;
        let x = add_table(&flaky.inner, "t2", "s", &rec).await;
        let y = add_table(&flaky.inner, "t3", "s", &rec).await;

        let service = JoinabilityService::new(flaky.clone(), unfiltered(0.5)).unwrap();
        service.rebuild().await.unwrap();
        *flaky.broken.lock().unwrap() = Some(x[0].clone());

        let results = service.query(&JoinQuery::new(q[0].clone())).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, y[0]);
    }

    #[tokio::test]
    async fn configured_seed_is_enforced_at_bootstrap() {
        let store = Arc::new(InMemoryStore::new());
        add_table(&store, "t1", "s", &column_of(&params(), "a", &["x"])).await;

        let pinned = ServiceConfig {
            minhash_seed: Some(2),
            ..unfiltered(0.5)
        };
        let service = JoinabilityService::new(store.clone(), pinned).unwrap();
        assert!(matches!(service.rebuild().await, Err(Error::IndexUnavailable(_))));
        assert!(service.current().is_none());

        let matching = ServiceConfig {
            minhash_seed: Some(1),
            ..unfiltered(0.5)
        };
        let service = JoinabilityService::new(store, matching).unwrap();
        assert_eq!(service.rebuild().await.unwrap().seed(), Some(1));
    }

    /// Holds the first scan page back, as a slow store read would.
    struct StallingStore {
        inner: InMemoryStore,
        stall_next: AtomicBool,
    }

    #[async_trait]
    impl SketchStore for StallingStore {
        async fn get(&self, id: &str) -> anyhow::Result<Option<SketchEntry>> {
            self.inner.get(id).await
        }
        async fn scan(&self, after: Option<&str>, limit: usize) -> anyhow::Result<Vec<SketchEntry>> {
            let page = self.inner.scan(after, limit).await?;
            if self.stall_next.swap(false, std::sync::atomic::Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(300)).await;
            }
            Ok(page)
        }
        async fn get_metadata(&self, id: &str) -> anyhow::Result<Option<crate::store::ColumnMetadata>> {
            self.inner.get_metadata(id).await
        }
        async fn get_table(&self, source: &str, name: &str) -> anyhow::Result<Option<TableRecord>> {
            self.inner.get_table(source, name).await
        }
        async fn upsert_table(&self, table: &TableRecord) -> anyhow::Result<String> {
            self.inner.upsert_table(table).await
        }
        async fn replace_columns(
            &self,
            table_id: &str,
            columns: &[ColumnSketchRecord],
        ) -> anyhow::Result<Vec<String>> {
            self.inner.replace_columns(table_id, columns).await
        }
    }

    #[tokio::test]
    async fn overlapping_rebuilds_swap_in_scan_order() {
        let p = params();
        let a = column_of(&p, "a", &["1", "2"]);
        let b = column_of(&p, "b", &["3", "4"]);
        let store = Arc::new(StallingStore {
            inner: InMemoryStore::new(),
            stall_next: AtomicBool::new(true),
        });
        add_table(&store.inner, "t1", "s", &[a[0].clone(), b[0].clone()]).await;
        let service = JoinabilityService::new(store.clone(), unfiltered(0.5)).unwrap();

        // the first rebuild reads {a, b} and stalls; column a is dropped
        // before the second rebuild starts
        let first = service.rebuild();
        let second = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            store.inner.replace_columns("t1", &b).await.unwrap();
            service.rebuild().await
        };
        let (first, second) = tokio::join!(first, second);
        let (first, second) = (first.unwrap(), second.unwrap());

        assert_eq!((first.generation, first.len()), (1, 2));
        assert_eq!((second.generation, second.len()), (2, 1));
        let current = service.current().unwrap();
        assert_eq!(current.generation, 2);
        assert_eq!(current.len(), 1);
    }
}
