use crate::error::{CrawlError, Result, SourceError};
use crate::limiter::RateLimiter;
use crate::result::{CrawlCheckpoint, CrawlOutcome, EdgeRecord, NodeId, RelatedVideo};
use crate::source::RelationSource;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Progress events emitted while crawling. Levels are 1-based.
#[derive(Debug, Clone)]
pub enum CrawlProgress {
    LevelStarted { level: usize, frontier: usize },
    Fetched { level: usize, id: NodeId, related: usize },
    Skipped { level: usize, id: NodeId, reason: String },
    LevelCompleted { level: usize, discovered: usize },
}

pub type ProgressCallback = Arc<dyn Fn(CrawlProgress) + Send + Sync>;
pub type CheckpointCallback = Arc<dyn Fn(&CrawlCheckpoint) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Concurrent relation source calls within one level.
    pub workers: usize,
    /// Minimum spacing between outbound calls.
    pub min_interval: Duration,
    /// Upper bound for the spacing after back-off.
    pub max_interval: Duration,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            min_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(60),
        }
    }
}

impl CrawlConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }
}

struct CrawlState {
    visited: HashSet<NodeId>,
    frontier: Vec<NodeId>,
    level: usize,
}

/// Level-synchronous breadth-first crawler over a [`RelationSource`].
pub struct Crawler<S> {
    source: S,
    config: CrawlConfig,
    limiter: Arc<RateLimiter>,
    progress_callback: Option<ProgressCallback>,
    checkpoint_callback: Option<CheckpointCallback>,
    stop_signal: Arc<AtomicBool>,
}

impl<S: RelationSource> Crawler<S> {
    pub fn new(source: S) -> Self {
        Self::with_config(source, CrawlConfig::default())
    }

    pub fn with_config(source: S, config: CrawlConfig) -> Self {
        let limiter = Arc::new(RateLimiter::new(config.min_interval, config.max_interval));
        Self {
            source,
            config,
            limiter,
            progress_callback: None,
            checkpoint_callback: None,
            stop_signal: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Called with the accumulated state after every completed level.
    pub fn with_checkpoint_callback(mut self, callback: CheckpointCallback) -> Self {
        self.checkpoint_callback = Some(callback);
        self
    }

    pub fn with_stop_signal(mut self, signal: Arc<AtomicBool>) -> Self {
        self.stop_signal = signal;
        self
    }

    /// Handle that stops the crawl at the next level boundary when set.
    pub fn stop_signal(&self) -> Arc<AtomicBool> {
        self.stop_signal.clone()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Crawl outward from `seeds` for at most `max_depth` levels.
    pub async fn crawl(&self, seeds: &[NodeId], max_depth: usize) -> Result<CrawlOutcome> {
        if max_depth == 0 {
            return Err(CrawlError::InvalidDepth(max_depth));
        }
        if seeds.is_empty() {
            return Err(CrawlError::NoSeeds);
        }

        info!(
            "Starting crawl of {} seeds to depth {} with {} workers",
            seeds.len(),
            max_depth,
            self.config.workers
        );

        let state = CrawlState {
            visited: HashSet::new(),
            frontier: seeds.to_vec(),
            level: 0,
        };
        Ok(self.run(state, Vec::new(), max_depth).await)
    }

    /// Continue a crawl from a checkpoint until `max_depth` levels are done.
    pub async fn resume(&self, checkpoint: CrawlCheckpoint, max_depth: usize) -> Result<CrawlOutcome> {
        if max_depth == 0 {
            return Err(CrawlError::InvalidDepth(max_depth));
        }

        let frontier = checkpoint.pending_frontier();
        info!(
            "Resuming crawl at level {} with {} pending ids (target depth {})",
            checkpoint.level,
            frontier.len(),
            max_depth
        );

        let state = CrawlState {
            visited: checkpoint.visited,
            frontier,
            level: checkpoint.level,
        };
        Ok(self.run(state, checkpoint.edges, max_depth).await)
    }

    async fn run(&self, mut state: CrawlState, mut edges: Vec<EdgeRecord>, max_depth: usize) -> CrawlOutcome {
        let mut skipped = Vec::new();
        let mut stopped = false;

        while state.level < max_depth {
            if self.stop_signal.load(Ordering::SeqCst) {
                info!("Stop requested, ending crawl after level {}", state.level);
                stopped = true;
                break;
            }

            let batch = Self::claim_frontier(&mut state);
            if batch.is_empty() {
                debug!("Frontier exhausted at level {}", state.level);
                break;
            }

            let level = state.level + 1;
            info!("Level {}: expanding {} videos", level, batch.len());
            self.report(CrawlProgress::LevelStarted {
                level,
                frontier: batch.len(),
            });

            let results = self.expand(&batch).await;

            let mut next_frontier = Vec::new();
            let mut queued = HashSet::new();
            for (id, result) in results {
                match result {
                    Ok(related) => {
                        self.report(CrawlProgress::Fetched {
                            level,
                            id: id.clone(),
                            related: related.len(),
                        });
                        for video in related {
                            if !state.visited.contains(&video.id) && queued.insert(video.id.clone()) {
                                next_frontier.push(video.id.clone());
                            }
                            edges.push(EdgeRecord::from_related(&id, video));
                        }
                    }
                    Err(e) => {
                        warn!("Skipping {}: {}", id, e);
                        self.report(CrawlProgress::Skipped {
                            level,
                            id: id.clone(),
                            reason: e.to_string(),
                        });
                        skipped.push(id);
                    }
                }
            }

            state.frontier = next_frontier;
            state.level = level;
            self.report(CrawlProgress::LevelCompleted {
                level,
                discovered: state.frontier.len(),
            });

            if let Some(ref callback) = self.checkpoint_callback {
                callback(&CrawlCheckpoint {
                    visited: state.visited.clone(),
                    edges: edges.clone(),
                    level: state.level,
                });
            }
        }

        info!(
            "Crawl complete. Visited {} videos, {} edges, {} skipped",
            state.visited.len(),
            edges.len(),
            skipped.len()
        );

        CrawlOutcome {
            edges,
            visited: state.visited,
            levels: state.level,
            skipped,
            stopped,
        }
    }

    /// Take the unvisited, deduplicated ids of the frontier and mark them visited.
    fn claim_frontier(state: &mut CrawlState) -> Vec<NodeId> {
        let frontier = std::mem::take(&mut state.frontier);
        frontier
            .into_iter()
            .filter(|id| state.visited.insert(id.clone()))
            .collect()
    }

    /// Fetch every id of one level concurrently. Results come back in batch order.
    async fn expand(&self, batch: &[NodeId]) -> Vec<(NodeId, std::result::Result<Vec<RelatedVideo>, SourceError>)> {
        stream::iter(batch.iter().cloned())
            .map(|id| async move {
                self.limiter.acquire().await;
                let result = self.source.fetch_related(&id).await;
                match &result {
                    Ok(_) => self.limiter.recover().await,
                    Err(SourceError::RateLimited { retry_after }) => {
                        self.limiter.back_off(*retry_after).await
                    }
                    Err(_) => {}
                }
                (id, result)
            })
            .buffered(self.config.workers.max(1))
            .collect()
            .await
    }

    fn report(&self, event: CrawlProgress) {
        if let Some(ref callback) = self.progress_callback {
            callback(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// In-memory relation source that records every call.
    struct MapSource {
        relations: HashMap<String, Vec<String>>,
        failing: HashSet<String>,
        calls: Mutex<Vec<String>>,
    }

    impl MapSource {
        fn new(relations: &[(&str, &[&str])]) -> Self {
            Self {
                relations: relations
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
                    .collect(),
                failing: HashSet::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing_on(mut self, id: &str) -> Self {
            self.failing.insert(id.to_string());
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl RelationSource for MapSource {
        async fn fetch_related(&self, id: &str) -> std::result::Result<Vec<RelatedVideo>, SourceError> {
            self.calls.lock().unwrap().push(id.to_string());
            if self.failing.contains(id) {
                return Err(SourceError::SourceUnavailable(format!("{} is down", id)));
            }
            Ok(self
                .relations
                .get(id)
                .map(|ids| ids.iter().map(RelatedVideo::new).collect())
                .unwrap_or_default())
        }
    }

    fn fast_config() -> CrawlConfig {
        CrawlConfig::default()
            .with_min_interval(Duration::ZERO)
            .with_max_interval(Duration::ZERO)
    }

    fn seeds(ids: &[&str]) -> Vec<NodeId> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn edge_pairs(outcome: &CrawlOutcome) -> Vec<(String, String)> {
        outcome
            .edges
            .iter()
            .map(|e| (e.parent.clone(), e.child.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_depth_one_expands_only_seeds() {
        let source = MapSource::new(&[("A", &["B", "C"]), ("B", &["D"]), ("C", &["E"])]);
        let crawler = Crawler::with_config(source, fast_config());

        let outcome = crawler.crawl(&seeds(&["A"]), 1).await.unwrap();

        assert_eq!(
            edge_pairs(&outcome),
            vec![("A".to_string(), "B".to_string()), ("A".to_string(), "C".to_string())]
        );
        assert_eq!(outcome.visited, HashSet::from(["A".to_string()]));
        assert_eq!(outcome.levels, 1);
        assert_eq!(crawler.source().calls(), vec!["A"]);
    }

    #[tokio::test]
    async fn test_never_fetches_same_id_twice() {
        let source = MapSource::new(&[
            ("A", &["B", "C", "A"]),
            ("B", &["C", "A"]),
            ("C", &["B", "D"]),
            ("D", &["A"]),
        ]);
        let crawler = Crawler::with_config(source, fast_config().with_workers(3));

        let outcome = crawler.crawl(&seeds(&["A", "A", "B"]), 5).await.unwrap();

        let calls = crawler.source().calls();
        let unique: HashSet<_> = calls.iter().collect();
        assert_eq!(calls.len(), unique.len(), "duplicate calls: {:?}", calls);
        assert_eq!(unique.len(), 4);
        assert_eq!(outcome.visited.len(), 4);
    }

    #[tokio::test]
    async fn test_self_loop_is_recorded() {
        let source = MapSource::new(&[("A", &["A", "B"])]);
        let crawler = Crawler::with_config(source, fast_config());

        let outcome = crawler.crawl(&seeds(&["A"]), 2).await.unwrap();

        assert!(edge_pairs(&outcome).contains(&("A".to_string(), "A".to_string())));
        assert_eq!(crawler.source().calls(), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_failed_node_is_skipped_and_crawl_continues() {
        let source = MapSource::new(&[("A", &["B", "C"]), ("B", &["X"]), ("C", &["D"])]).failing_on("B");
        let crawler = Crawler::with_config(source, fast_config());

        let outcome = crawler.crawl(&seeds(&["A"]), 2).await.unwrap();

        assert_eq!(outcome.skipped, vec!["B"]);
        assert_eq!(outcome.skipped_count(), 1);
        assert!(outcome.visited.contains("B"));
        let pairs = edge_pairs(&outcome);
        assert!(pairs.contains(&("C".to_string(), "D".to_string())));
        assert!(!pairs.iter().any(|(parent, _)| parent == "B"));
    }

    #[tokio::test]
    async fn test_empty_frontier_ends_early() {
        let source = MapSource::new(&[("A", &["B"])]);
        let crawler = Crawler::with_config(source, fast_config());

        let outcome = crawler.crawl(&seeds(&["A"]), 10).await.unwrap();

        assert_eq!(outcome.levels, 2);
        assert!(!outcome.stopped);
        assert_eq!(crawler.source().calls(), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_invalid_requests() {
        let crawler = Crawler::with_config(MapSource::new(&[]), fast_config());

        assert!(matches!(
            crawler.crawl(&seeds(&["A"]), 0).await,
            Err(CrawlError::InvalidDepth(0))
        ));
        assert!(matches!(crawler.crawl(&[], 1).await, Err(CrawlError::NoSeeds)));
    }

    #[tokio::test]
    async fn test_stop_signal_ends_at_level_boundary() {
        let source = MapSource::new(&[("A", &["B"]), ("B", &["C"]), ("C", &["D"])]);
        let crawler = Crawler::with_config(source, fast_config());
        let stop = crawler.stop_signal();
        let crawler = crawler.with_checkpoint_callback(Arc::new(move |checkpoint| {
            if checkpoint.level == 1 {
                stop.store(true, Ordering::SeqCst);
            }
        }));

        let outcome = crawler.crawl(&seeds(&["A"]), 3).await.unwrap();

        assert!(outcome.stopped);
        assert_eq!(outcome.levels, 1);
        assert_eq!(edge_pairs(&outcome), vec![("A".to_string(), "B".to_string())]);
    }

    #[tokio::test]
    async fn test_checkpoint_emitted_per_level() {
        let source = MapSource::new(&[("A", &["B"]), ("B", &["C"])]);
        let levels = Arc::new(Mutex::new(Vec::new()));
        let levels_clone = levels.clone();
        let crawler = Crawler::with_config(source, fast_config()).with_checkpoint_callback(Arc::new(
            move |checkpoint| {
                levels_clone
                    .lock()
                    .unwrap()
                    .push((checkpoint.level, checkpoint.edges.len()));
            },
        ));

        crawler.crawl(&seeds(&["A"]), 3).await.unwrap();

        assert_eq!(*levels.lock().unwrap(), vec![(1, 1), (2, 2), (3, 2)]);
    }

    #[tokio::test]
    async fn test_resume_matches_fresh_crawl() {
        let relations: &[(&str, &[&str])] = &[
            ("A", &["B", "C"]),
            ("B", &["D", "A"]),
            ("C", &["D", "E"]),
            ("D", &["F"]),
        ];

        let fresh = Crawler::with_config(MapSource::new(relations), fast_config())
            .crawl(&seeds(&["A"]), 3)
            .await
            .unwrap();

        let first = Crawler::with_config(MapSource::new(relations), fast_config())
            .crawl(&seeds(&["A"]), 1)
            .await
            .unwrap();
        let resumed_crawler = Crawler::with_config(MapSource::new(relations), fast_config());
        let resumed = resumed_crawler.resume(first.checkpoint(), 3).await.unwrap();

        assert_eq!(edge_pairs(&resumed), edge_pairs(&fresh));
        assert_eq!(resumed.visited, fresh.visited);
        assert_eq!(resumed.levels, 3);
        assert!(!resumed_crawler.source().calls().contains(&"A".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_calls_respect_min_interval() {
        let source = MapSource::new(&[]);
        let config = CrawlConfig::default()
            .with_workers(4)
            .with_min_interval(Duration::from_secs(1))
            .with_max_interval(Duration::from_secs(5));
        let crawler = Crawler::with_config(source, config);

        let start = Instant::now();
        crawler.crawl(&seeds(&["A", "B", "C"]), 1).await.unwrap();

        assert!(start.elapsed() >= Duration::from_secs(2));
        assert_eq!(crawler.source().calls().len(), 3);
    }

    /// Answers the first call with a rate-limit hint, then succeeds.
    struct ThrottledSource {
        retry_after: Duration,
        calls: Mutex<Vec<(String, Instant)>>,
    }

    impl RelationSource for ThrottledSource {
        async fn fetch_related(&self, id: &str) -> std::result::Result<Vec<RelatedVideo>, SourceError> {
            let mut calls = self.calls.lock().unwrap();
            calls.push((id.to_string(), Instant::now()));
            if calls.len() == 1 {
                return Err(SourceError::RateLimited {
                    retry_after: Some(self.retry_after),
                });
            }
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_response_spaces_next_call() {
        let source = ThrottledSource {
            retry_after: Duration::from_secs(3),
            calls: Mutex::new(Vec::new()),
        };
        let config = CrawlConfig::default()
            .with_workers(1)
            .with_min_interval(Duration::from_millis(100))
            .with_max_interval(Duration::from_secs(60));
        let crawler = Crawler::with_config(source, config);

        let outcome = crawler.crawl(&seeds(&["A", "B"]), 1).await.unwrap();

        assert_eq!(outcome.skipped, vec!["A"]);
        let calls = crawler.source().calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].1 - calls[0].1 >= Duration::from_secs(3));

        // the success on B narrows the interval again
        let interval = crawler.limiter.current_interval().await;
        assert!(interval < Duration::from_secs(3));
        assert!(interval >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_progress_events() {
        let source = MapSource::new(&[("A", &["B", "C"])]).failing_on("C");
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = events.clone();
        let crawler = Crawler::with_config(source, fast_config()).with_progress_callback(Arc::new(
            move |event| events_clone.lock().unwrap().push(event),
        ));

        crawler.crawl(&seeds(&["A"]), 2).await.unwrap();

        let events = events.lock().unwrap();
        let skipped = events
            .iter()
            .filter(|e| matches!(e, CrawlProgress::Skipped { id, .. } if id == "C"))
            .count();
        let completed = events
            .iter()
            .filter(|e| matches!(e, CrawlProgress::LevelCompleted { .. }))
            .count();
        assert_eq!(skipped, 1);
        assert_eq!(completed, 2);
    }
}
