use anyhow::{Context, Result, anyhow, bail};
use clap::ArgMatches;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{info, warn};
use tubegraph_core::analytics::{AnalysisConfig, AnalysisResult, analyze};
use tubegraph_core::crawl::{CrawlOptions, execute_crawl, persist_checkpoints};
use tubegraph_core::data::{Database, SessionConfig, SessionStatus};
use tubegraph_core::report::{export_all, generate_text_report, load_related_csv};
use tubegraph_core::{GraphStore, InfluenceWeights, StoreError};
use tubegraph_crawler::serpapi::video_id_from_link;
use tubegraph_crawler::{
    CrawlCheckpoint, CrawlConfig, CrawlOutcome, NodeId, SerpApiSource, is_valid_video_id,
};
use url::Url;

/// Upper bound for the request spacing after rate-limit back-off.
const MAX_INTERVAL: Duration = Duration::from_secs(60);

// Helper functions for seed loading

/// Parse one seed: a bare video id or a watch URL carrying a `v` parameter.
/// Blank lines and invalid ids yield `None`; invalid ids are logged.
pub fn parse_seed_line(line: &str) -> Option<NodeId> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let candidate = if Url::parse(line).is_ok() {
        match video_id_from_link(line) {
            Some(id) => id,
            None => {
                warn!("Skipping URL without a video id '{}'", line);
                return None;
            }
        }
    } else {
        line.to_string()
    };

    if is_valid_video_id(&candidate) {
        Some(candidate)
    } else {
        warn!("Skipping invalid video id '{}'", line);
        None
    }
}

/// Load seeds from a newline-delimited file. Duplicates are dropped, order
/// is kept.
pub fn load_seeds_from_file(path: &Path) -> Result<Vec<NodeId>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read seeds file {}", path.display()))?;

    let seeds = dedup_seeds(content.lines().filter_map(parse_seed_line));
    if seeds.is_empty() {
        bail!("No valid video ids found in {}", path.display());
    }
    Ok(seeds)
}

/// Load seeds from either a seeds file or the `--video` arguments
pub fn load_seeds_from_source(videos: &[String], seeds_file: Option<&PathBuf>) -> Result<Vec<NodeId>> {
    if let Some(path) = seeds_file {
        return load_seeds_from_file(path);
    }
    if videos.is_empty() {
        bail!("Either --video or --seeds-file must be provided");
    }

    let seeds = dedup_seeds(videos.iter().filter_map(|v| parse_seed_line(v)));
    if seeds.is_empty() {
        bail!("None of the given videos is a valid video id");
    }
    Ok(seeds)
}

fn dedup_seeds(seeds: impl Iterator<Item = NodeId>) -> Vec<NodeId> {
    let mut seen = std::collections::HashSet::new();
    seeds.filter(|id| seen.insert(id.clone())).collect()
}

pub fn resolve_db_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).as_ref())
}

/// Export settings shared by crawl, resume and analyze.
#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub output_dir: PathBuf,
    pub prefix: String,
    pub top: usize,
    pub skip_analysis: bool,
    pub weights: InfluenceWeights,
    pub quiet: bool,
}

impl OutputOptions {
    pub fn from_matches(matches: &ArgMatches, quiet: bool) -> Self {
        Self {
            output_dir: matches
                .get_one::<PathBuf>("output-dir")
                .cloned()
                .unwrap_or_else(|| PathBuf::from("results")),
            prefix: matches
                .get_one::<String>("prefix")
                .cloned()
                .unwrap_or_else(|| "output".to_string()),
            top: matches.get_one::<usize>("top").copied().unwrap_or(10),
            skip_analysis: matches.get_flag("skip-analysis"),
            weights: matches
                .get_one::<InfluenceWeights>("weights")
                .copied()
                .unwrap_or_default(),
            quiet,
        }
    }
}

fn open_database(matches: &ArgMatches) -> Result<Database> {
    let raw = matches
        .get_one::<String>("db")
        .map(String::as_str)
        .unwrap_or(crate::commands::DEFAULT_DB_PATH);
    let path = resolve_db_path(raw);
    info!("Using checkpoint database {}", path.display());
    Database::new(&path).with_context(|| format!("Failed to open database {}", path.display()))
}

fn lock(db: &Mutex<Database>) -> Result<MutexGuard<'_, Database>> {
    db.lock().map_err(|_| anyhow!("checkpoint database lock poisoned"))
}

/// What a Ctrl-C does given the current stop flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptAction {
    /// First interrupt of a running crawl: finish the level, keep results.
    StopAfterLevel,
    /// Crawl already stopping or finished: exit right away.
    Exit,
}

/// Raise the stop flag and decide how to react to this interrupt.
pub fn on_interrupt(stop: &AtomicBool) -> InterruptAction {
    if stop.swap(true, Ordering::SeqCst) {
        InterruptAction::Exit
    } else {
        InterruptAction::StopAfterLevel
    }
}

/// Stop flag raised by Ctrl-C. The crawl ends at the next level boundary; a
/// second Ctrl-C, or one after the crawl returned, exits the process.
fn install_stop_signal() -> Arc<AtomicBool> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            match on_interrupt(&flag) {
                InterruptAction::StopAfterLevel => eprintln!(
                    "\n{} Stopping after the current level, partial results will be kept \
                     (Ctrl-C again to abort)",
                    "⚠".yellow().bold()
                ),
                InterruptAction::Exit => {
                    eprintln!("\n{} Interrupted", "✗".red().bold());
                    std::process::exit(130);
                }
            }
        }
    });
    stop
}

async fn run_crawl(
    db: Database,
    session_id: &str,
    api_key: &str,
    seeds: Vec<NodeId>,
    resume_from: Option<CrawlCheckpoint>,
    settings: &SessionConfig,
    quiet: bool,
) -> Result<CrawlOutcome> {
    let db = Arc::new(Mutex::new(db));
    let source = SerpApiSource::new(api_key)?;

    let min_interval = Duration::from_millis(settings.delay_ms);
    let config = CrawlConfig::default()
        .with_workers(settings.workers)
        .with_min_interval(min_interval)
        .with_max_interval(MAX_INTERVAL.max(min_interval));

    let options = CrawlOptions {
        seeds,
        max_depth: settings.max_depth,
        config,
        show_progress_bars: !quiet,
        resume_from,
    };

    let stop = install_stop_signal();
    let result = execute_crawl(
        source,
        options,
        stop.clone(),
        Some(persist_checkpoints(db.clone(), session_id.to_string())),
    )
    .await;
    // Nothing left to stop gracefully; further interrupts exit.
    stop.store(true, Ordering::SeqCst);

    let guard = lock(&db)?;
    match result {
        Ok(outcome) => {
            if outcome.stopped {
                guard.cancel_session(session_id)?;
            } else {
                guard.complete_session(session_id)?;
            }
            Ok(outcome)
        }
        Err(e) => {
            guard.fail_session(session_id)?;
            Err(e.into())
        }
    }
}

fn print_outcome(outcome: &CrawlOutcome, session_id: &str) {
    let headline = if outcome.stopped {
        format!("{} Crawl stopped early", "⚠".yellow().bold())
    } else {
        format!("{} Crawl complete", "✓".green().bold())
    };
    println!("\n{}", headline);
    println!("{} Session: {}", "→".blue(), session_id.bright_white());
    println!("{} Levels: {}", "→".blue(), outcome.levels);
    println!("{} Videos expanded: {}", "→".blue(), outcome.visited.len());
    println!("{} Relations found: {}", "→".blue(), outcome.edges.len());
    if outcome.skipped_count() > 0 {
        println!(
            "{} Skipped after source errors: {}",
            "⚠".yellow(),
            outcome.skipped_count()
        );
    }
}

/// Build the graph from `checkpoint`, analyze it unless disabled, and write
/// every export file.
pub fn analyze_and_export(
    checkpoint: &CrawlCheckpoint,
    output: &OutputOptions,
    session_id: Option<&str>,
) -> Result<Option<AnalysisResult>> {
    let store = GraphStore::from_checkpoint(checkpoint);

    let analysis = if output.skip_analysis {
        None
    } else {
        let spinner = (!output.quiet).then(|| {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
                pb.set_style(style);
            }
            pb.enable_steady_tick(Duration::from_millis(100));
            pb.set_message(format!(
                "Analyzing {} videos and {} relations...",
                store.node_count(),
                store.edge_count()
            ));
            pb
        });

        let config = AnalysisConfig::default().with_weights(output.weights);
        let result = analyze(&store, &config);
        if let Some(pb) = spinner {
            pb.finish_and_clear();
        }
        Some(result?)
    };

    let paths = export_all(
        &output.output_dir,
        &output.prefix,
        &checkpoint.edges,
        analysis.as_ref(),
        output.top,
        session_id,
    )?;

    if !output.quiet {
        if let Some(result) = &analysis {
            println!();
            print!("{}", generate_text_report(result, output.top, session_id));
        }
        println!("\n{} Exported:", "✓".green().bold());
        for path in [
            Some(&paths.related_csv),
            paths.stats_csv.as_ref(),
            paths.network_json.as_ref(),
            paths.summary_txt.as_ref(),
        ]
        .into_iter()
        .flatten()
        {
            println!("  {} {}", "•".blue(), path.display());
        }
    }

    if let Some(result) = &analysis {
        for warning in &result.warnings {
            eprintln!("{} {}", "⚠".yellow().bold(), warning);
        }
    }

    Ok(analysis)
}

pub async fn handle_crawl(matches: &ArgMatches, quiet: bool) -> Result<()> {
    let videos: Vec<String> = matches
        .get_many::<String>("video")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    let seeds = load_seeds_from_source(&videos, matches.get_one::<PathBuf>("seeds-file"))?;

    let settings = SessionConfig {
        max_depth: matches.get_one::<usize>("depth").copied().unwrap_or(1),
        workers: matches.get_one::<usize>("workers").copied().unwrap_or(4),
        delay_ms: matches.get_one::<u64>("delay-ms").copied().unwrap_or(1000),
    };
    if settings.max_depth == 0 {
        bail!("--depth must be at least 1");
    }
    let api_key = matches
        .get_one::<String>("api-key")
        .ok_or_else(|| anyhow!("--api-key or SERP_API_KEY is required"))?;
    let output = OutputOptions::from_matches(matches, quiet);

    let db = open_database(matches)?;
    let session_id = db.create_session(&seeds, Some(&settings))?;

    if !quiet {
        println!("{} Crawling from {} seed videos", "✓".green().bold(), seeds.len());
        println!(
            "{} Depth {}, {} workers, {} ms between requests",
            "→".blue(),
            settings.max_depth,
            settings.workers,
            settings.delay_ms
        );
        println!("{} Session: {}\n", "→".blue(), session_id.bright_white());
    }

    let outcome = run_crawl(db, &session_id, api_key, seeds, None, &settings, quiet).await?;
    if !quiet {
        print_outcome(&outcome, &session_id);
    }

    analyze_and_export(&outcome.checkpoint(), &output, Some(session_id.as_str()))?;
    Ok(())
}

pub async fn handle_resume(matches: &ArgMatches, quiet: bool) -> Result<()> {
    let session_id = matches
        .get_one::<String>("session")
        .ok_or_else(|| anyhow!("--session is required"))?;
    let depth = matches.get_one::<usize>("depth").copied().unwrap_or(1);
    if depth == 0 {
        bail!("--depth must be at least 1");
    }
    let api_key = matches
        .get_one::<String>("api-key")
        .ok_or_else(|| anyhow!("--api-key or SERP_API_KEY is required"))?;
    let output = OutputOptions::from_matches(matches, quiet);

    let db = open_database(matches)?;
    let session = db
        .get_session(session_id)?
        .ok_or_else(|| StoreError::SessionNotFound(session_id.clone()))?;

    let stored = session.configuration.clone();
    let settings = SessionConfig {
        max_depth: depth,
        workers: matches
            .get_one::<usize>("workers")
            .copied()
            .or(stored.as_ref().map(|c| c.workers))
            .unwrap_or(4),
        delay_ms: matches
            .get_one::<u64>("delay-ms")
            .copied()
            .or(stored.as_ref().map(|c| c.delay_ms))
            .unwrap_or(1000),
    };

    let checkpoint = db.load_checkpoint(session_id)?;
    if !quiet {
        match &checkpoint {
            Some(cp) => println!(
                "{} Resuming session {} from level {} ({} videos expanded)",
                "✓".green().bold(),
                session_id.bright_white(),
                cp.level,
                cp.visited.len()
            ),
            None => println!(
                "{} Session {} has no checkpoint, restarting from its {} seeds",
                "→".blue(),
                session_id.bright_white(),
                session.seeds.len()
            ),
        }
    }
    if checkpoint.as_ref().is_some_and(|cp| cp.level >= depth) {
        info!(
            "Session {} already reached depth {}, nothing left to crawl",
            session_id, depth
        );
    }

    db.reopen_session(session_id)?;
    let outcome = run_crawl(
        db,
        session_id,
        api_key,
        session.seeds.clone(),
        checkpoint,
        &settings,
        quiet,
    )
    .await?;
    if !quiet {
        print_outcome(&outcome, session_id);
    }

    analyze_and_export(&outcome.checkpoint(), &output, Some(session_id.as_str()))?;
    Ok(())
}

pub fn handle_analyze(matches: &ArgMatches, quiet: bool) -> Result<()> {
    let output = OutputOptions::from_matches(matches, quiet);

    if let Some(path) = matches.get_one::<PathBuf>("from-csv") {
        let checkpoint = load_csv_checkpoint(path, &output)?;
        if !quiet {
            println!(
                "{} Loaded {} relations from {}",
                "✓".green().bold(),
                checkpoint.edges.len(),
                path.display()
            );
        }
        analyze_and_export(&checkpoint, &output, None)?;
        return Ok(());
    }

    let session_id = matches
        .get_one::<String>("session")
        .ok_or_else(|| anyhow!("--session or --from-csv is required"))?;

    let db = open_database(matches)?;
    if db.get_session(session_id)?.is_none() {
        return Err(StoreError::SessionNotFound(session_id.clone()).into());
    }
    let checkpoint = db
        .load_checkpoint(session_id)?
        .ok_or_else(|| StoreError::NoCheckpoint(session_id.clone()))?;

    if !quiet {
        println!(
            "{} Loaded checkpoint at level {} ({} relations)",
            "✓".green().bold(),
            checkpoint.level,
            checkpoint.edges.len()
        );
    }

    analyze_and_export(&checkpoint, &output, Some(session_id.as_str()))?;
    Ok(())
}

/// Rebuild crawl state from a related-videos CSV. Every parent counts as
/// expanded; the depth it was crawled to is unknown and recorded as 0.
pub fn load_csv_checkpoint(path: &Path, output: &OutputOptions) -> Result<CrawlCheckpoint> {
    let target = output
        .output_dir
        .join(format!("{}_related_videos.csv", output.prefix));
    if let (Ok(input), Ok(target)) = (path.canonicalize(), target.canonicalize())
        && input == target
    {
        bail!(
            "{} would be overwritten by the export, pick another --prefix or --output-dir",
            path.display()
        );
    }

    let edges = load_related_csv(path)
        .with_context(|| format!("Failed to read related videos from {}", path.display()))?;
    if edges.is_empty() {
        bail!("No relations found in {}", path.display());
    }

    Ok(CrawlCheckpoint {
        visited: edges.iter().map(|e| e.parent.clone()).collect(),
        edges,
        level: 0,
    })
}

pub fn handle_sessions(matches: &ArgMatches) -> Result<()> {
    let db = open_database(matches)?;
    let sessions = db.list_sessions()?;

    if sessions.is_empty() {
        println!("No crawl sessions stored yet.");
        return Ok(());
    }

    for session in sessions {
        let status = match session.status {
            SessionStatus::Running => session.status.as_str().cyan(),
            SessionStatus::Completed => session.status.as_str().green(),
            SessionStatus::Cancelled => session.status.as_str().yellow(),
            SessionStatus::Failed => session.status.as_str().red(),
        };
        let started = chrono::DateTime::from_timestamp(session.start_time, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| session.start_time.to_string());
        let level = session
            .checkpoint_level
            .map(|level| level.to_string())
            .unwrap_or_else(|| "-".to_string());
        let depth = session
            .configuration
            .as_ref()
            .map(|c| c.max_depth.to_string())
            .unwrap_or_else(|| "?".to_string());

        println!(
            "{}  {:<10} level {}/{}  {} seeds  {}",
            session.id.bright_white(),
            status,
            level,
            depth,
            session.seeds.len(),
            started.dimmed()
        );
    }
    Ok(())
}
