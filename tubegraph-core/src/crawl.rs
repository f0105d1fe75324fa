use crate::data::Database;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use tubegraph_crawler::{
    CheckpointCallback, CrawlCheckpoint, CrawlConfig, CrawlError, CrawlOutcome, CrawlProgress,
    Crawler, NodeId, ProgressCallback, RelationSource,
};

/// Options for one crawl run
pub struct CrawlOptions {
    pub seeds: Vec<NodeId>,
    pub max_depth: usize,
    pub config: CrawlConfig,
    pub show_progress_bars: bool,
    /// Continue from this checkpoint instead of starting at the seeds.
    pub resume_from: Option<CrawlCheckpoint>,
}

/// Checkpoint callback that stores every completed level in `db` under
/// `session_id`. Write failures are logged and do not stop the crawl.
pub fn persist_checkpoints(db: Arc<Mutex<Database>>, session_id: String) -> CheckpointCallback {
    Arc::new(move |checkpoint: &CrawlCheckpoint| {
        let Ok(db) = db.lock() else {
            warn!("Checkpoint database lock poisoned; level {} not saved", checkpoint.level);
            return;
        };
        match db.save_checkpoint(&session_id, checkpoint) {
            Ok(()) => info!(
                "Saved checkpoint for level {} ({} nodes visited)",
                checkpoint.level,
                checkpoint.visited.len()
            ),
            Err(e) => warn!("Failed to save checkpoint for level {}: {}", checkpoint.level, e),
        }
    })
}

/// Execute a crawl with the given options.
pub async fn execute_crawl<S: RelationSource>(
    source: S,
    options: CrawlOptions,
    stop_signal: Arc<AtomicBool>,
    checkpoint_callback: Option<CheckpointCallback>,
) -> Result<CrawlOutcome, CrawlError> {
    let CrawlOptions {
        seeds,
        max_depth,
        config,
        show_progress_bars,
        resume_from,
    } = options;

    let progress_bar = if show_progress_bars {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message("Starting crawl...");
        Some(Arc::new(pb))
    } else {
        None
    };

    let fetched = Arc::new(AtomicUsize::new(0));
    let skipped = Arc::new(AtomicUsize::new(0));

    let progress_callback: ProgressCallback = match progress_bar.clone() {
        Some(pb) => {
            let fetched = fetched.clone();
            let skipped = skipped.clone();
            Arc::new(move |event: CrawlProgress| match event {
                CrawlProgress::LevelStarted { level, frontier } => {
                    pb.set_message(format!("Level {}: expanding {} videos...", level, frontier));
                }
                CrawlProgress::Fetched { level, .. } => {
                    let count = fetched.fetch_add(1, Ordering::Relaxed) + 1;
                    pb.set_message(format!(
                        "Level {}: {} videos fetched, {} skipped",
                        level,
                        count,
                        skipped.load(Ordering::Relaxed)
                    ));
                    pb.tick();
                }
                CrawlProgress::Skipped { .. } => {
                    skipped.fetch_add(1, Ordering::Relaxed);
                }
                CrawlProgress::LevelCompleted { level, discovered } => {
                    pb.println(format!("  level {} done, {} new videos", level, discovered));
                }
            })
        }
        None => Arc::new(|_event: CrawlProgress| {}),
    };

    let mut crawler = Crawler::with_config(source, config)
        .with_progress_callback(progress_callback)
        .with_stop_signal(stop_signal);
    if let Some(callback) = checkpoint_callback {
        crawler = crawler.with_checkpoint_callback(callback);
    }

    let result = match resume_from {
        Some(checkpoint) => {
            info!("Resuming crawl from level {}", checkpoint.level);
            crawler.resume(checkpoint, max_depth).await
        }
        None => crawler.crawl(&seeds, max_depth).await,
    };

    if let Some(pb) = progress_bar {
        match &result {
            Ok(outcome) if outcome.stopped => pb.finish_with_message(format!(
                "Crawl stopped after level {}: {} edges",
                outcome.levels,
                outcome.edges.len()
            )),
            Ok(outcome) => pb.finish_with_message(format!(
                "Crawl complete: {} videos expanded, {} edges, {} skipped",
                outcome.visited.len(),
                outcome.edges.len(),
                outcome.skipped_count()
            )),
            Err(e) => pb.abandon_with_message(format!("Crawl failed: {}", e)),
        }
    }

    result
}
