// Export of crawl output and analysis results

use crate::analytics::AnalysisResult;
use crate::error::{StoreError, StoreResult};
use csv::StringRecord;
use serde_json::Value;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use tubegraph_crawler::serpapi::{parse_video_length, parse_view_count, video_id_from_link};
use tubegraph_crawler::{EdgeRecord, VideoMetadata, is_valid_video_id};

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n";

/// Files written by [`export_all`].
#[derive(Debug, Clone)]
pub struct ExportPaths {
    pub related_csv: PathBuf,
    pub stats_csv: Option<PathBuf>,
    pub network_json: Option<PathBuf>,
    pub summary_txt: Option<PathBuf>,
}

/// Quote a CSV field when it contains a comma, quote or line break.
pub fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// One row per discovered relation, in crawl order.
pub fn generate_related_csv(records: &[EdgeRecord]) -> String {
    let mut csv = String::from("video_id,title,channel,views,duration_seconds,related_to\n");
    for record in records {
        csv.push_str(&format!(
            "{},{},{},{},{},{}\n",
            csv_field(&record.child),
            csv_field(&record.metadata.title),
            csv_field(&record.metadata.channel),
            record.metadata.view_count,
            record.metadata.duration_seconds,
            csv_field(&record.parent)
        ));
    }
    csv
}

/// Column positions of a related-videos CSV, looked up by header name.
struct RelatedColumns {
    video_id: usize,
    related_to: usize,
    link: Option<usize>,
    title: Option<usize>,
    channel: Option<usize>,
    views: Vec<usize>,
    duration: Vec<usize>,
    length: Option<usize>,
}

impl RelatedColumns {
    fn from_headers(headers: &StringRecord) -> StoreResult<Self> {
        let find = |name: &str| headers.iter().position(|h| h.trim() == name);
        let required = |name: &str| {
            find(name).ok_or_else(|| StoreError::InvalidCsv(format!("missing column '{}'", name)))
        };

        Ok(Self {
            video_id: required("video_id")?,
            related_to: required("related_to")?,
            link: find("link"),
            title: find("title"),
            channel: find("channel"),
            views: ["parsed_views", "views"].into_iter().filter_map(find).collect(),
            duration: ["duration_seconds", "parsed_length"]
                .into_iter()
                .filter_map(find)
                .collect(),
            length: find("length_str"),
        })
    }
}

fn text(row: &StringRecord, column: Option<usize>) -> String {
    column
        .and_then(|i| row.get(i))
        .map(str::to_string)
        .unwrap_or_default()
}

fn id(row: &StringRecord, column: Option<usize>) -> String {
    text(row, column).trim().to_string()
}

/// Integer cell, also accepting pandas-style floats ("120.0").
fn count(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    raw.parse::<u64>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 0.0 && *v < u64::MAX as f64)
            .map(|v| v as u64)
    })
}

fn first_count(row: &StringRecord, columns: &[usize]) -> Option<u64> {
    columns.iter().filter_map(|&i| row.get(i)).find_map(count)
}

/// Read a related-videos CSV back into edge records, one per row in file
/// order. Accepts the layout written by [`generate_related_csv`] as well as
/// the older export carrying `link`, `parsed_views`, `parsed_length` and
/// `length_str` columns. Rows with an empty `related_to` describe seeds and
/// carry no relation; rows with an unusable id are skipped.
pub fn parse_related_csv<R: Read>(reader: R) -> StoreResult<Vec<EdgeRecord>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let columns = RelatedColumns::from_headers(reader.headers()?)?;

    let mut records = Vec::new();
    for (line, row) in reader.records().enumerate() {
        let row = row?;

        let parent = id(&row, Some(columns.related_to));
        if parent.is_empty() {
            debug!("Row {} is a seed row, no relation", line + 1);
            continue;
        }

        let mut child = id(&row, Some(columns.video_id));
        if child.is_empty() {
            child = video_id_from_link(&id(&row, columns.link)).unwrap_or_default();
        }
        if !is_valid_video_id(&child) || !is_valid_video_id(&parent) {
            warn!(
                "Skipping row {} with invalid ids '{}' -> '{}'",
                line + 1,
                parent,
                child
            );
            continue;
        }

        let view_count = first_count(&row, &columns.views).unwrap_or_else(|| {
            let views = text(&row, columns.views.last().copied());
            parse_view_count(&Value::String(views))
        });
        let duration_seconds = first_count(&row, &columns.duration)
            .unwrap_or_else(|| parse_video_length(&text(&row, columns.length)));

        records.push(EdgeRecord {
            parent,
            child,
            metadata: VideoMetadata {
                title: text(&row, columns.title),
                channel: text(&row, columns.channel),
                view_count,
                duration_seconds,
            },
        });
    }
    Ok(records)
}

pub fn load_related_csv(path: &Path) -> StoreResult<Vec<EdgeRecord>> {
    parse_related_csv(File::open(path)?)
}

/// Per-node statistics, most influential first.
pub fn generate_stats_csv(result: &AnalysisResult) -> String {
    let mut csv = String::from(
        "video_id,title,channel,views,in_degree_cent,betweenness,eigenvector,pagerank,influence,community\n",
    );
    for node in result.top_by_influence(result.snapshot.nodes.len()) {
        csv.push_str(&format!(
            "{},{},{},{},{:.6},{:.6},{:.6},{:.6},{:.6},{}\n",
            csv_field(&node.video.id),
            csv_field(&node.video.title),
            csv_field(&node.video.channel),
            node.video.view_count,
            node.centrality.in_degree,
            node.centrality.betweenness,
            node.centrality.eigenvector,
            node.centrality.pagerank,
            node.influence,
            node.community
        ));
    }
    csv
}

pub fn generate_json_report(
    result: &AnalysisResult,
    session_id: Option<&str>,
) -> Result<String, serde_json::Error> {
    let json_report = serde_json::json!({
        "metadata": {
            "generator": "tubegraph",
            "version": env!("CARGO_PKG_VERSION"),
            "generated_at": chrono::Utc::now().to_rfc3339(),
            "session_id": session_id,
            "modularity": result.modularity,
            "community_levels": result.community_levels,
            "warnings": result.warnings,
        },
        "summary": {
            "nodes": result.snapshot.nodes.len(),
            "edges": result.snapshot.edges.len(),
            "communities": result.community_count(),
        },
        "nodes": result.snapshot.nodes,
        "edges": result.snapshot.edges,
    });

    serde_json::to_string_pretty(&json_report)
}

pub fn generate_text_report(result: &AnalysisResult, top: usize, session_id: Option<&str>) -> String {
    let mut report = String::new();

    report.push_str(RULE);
    report.push_str("                      TUBEGRAPH RELATED-VIDEO NETWORK REPORT\n");
    report.push_str(RULE);
    report.push('\n');

    if let Some(id) = session_id {
        report.push_str(&format!("Session ID:   {}\n", id));
    }
    report.push_str(&format!("Videos:       {}\n", result.snapshot.nodes.len()));
    report.push_str(&format!("Relations:    {}\n", result.snapshot.edges.len()));
    report.push_str(&format!("Communities:  {}\n", result.community_count()));
    report.push_str(&format!("Modularity:   {:.4}\n\n", result.modularity));

    report.push_str(RULE);
    report.push_str("COMMUNITIES BY SIZE\n");
    report.push_str(RULE);
    report.push('\n');
    for (community, size) in result.communities_by_size().into_iter().take(top) {
        report.push_str(&format!("  #{:<6} {} videos\n", community, size));
    }
    report.push('\n');

    report.push_str(RULE);
    report.push_str(&format!("TOP {} VIDEOS BY INFLUENCE\n", top));
    report.push_str(RULE);
    report.push('\n');
    for (rank, node) in result.top_by_influence(top).into_iter().enumerate() {
        let title = if node.video.title.is_empty() {
            "(untitled)"
        } else {
            node.video.title.as_str()
        };
        report.push_str(&format!(
            "{:>3}. {}  {:.4}  {}\n",
            rank + 1,
            node.video.id,
            node.influence,
            title
        ));
        report.push_str(&format!(
            "     in-degree {:.4}  betweenness {:.4}  eigenvector {:.4}  pagerank {:.4}  community #{}\n",
            node.centrality.in_degree,
            node.centrality.betweenness,
            node.centrality.eigenvector,
            node.centrality.pagerank,
            node.community
        ));
    }

    if !result.warnings.is_empty() {
        report.push('\n');
        report.push_str(RULE);
        report.push_str("WARNINGS\n");
        report.push_str(RULE);
        report.push('\n');
        for warning in &result.warnings {
            report.push_str(&format!("  ! {}\n", warning));
        }
    }

    report.push('\n');
    report.push_str(RULE);
    report
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

/// Write the crawl dump and, when analysis ran, the statistics, network JSON
/// and text summary into `dir`.
pub fn export_all(
    dir: &Path,
    prefix: &str,
    records: &[EdgeRecord],
    analysis: Option<&AnalysisResult>,
    top: usize,
    session_id: Option<&str>,
) -> StoreResult<ExportPaths> {
    fs::create_dir_all(dir)?;

    let related_csv = dir.join(format!("{}_related_videos.csv", prefix));
    save_report(&generate_related_csv(records), &related_csv)?;

    let mut paths = ExportPaths {
        related_csv,
        stats_csv: None,
        network_json: None,
        summary_txt: None,
    };

    if let Some(result) = analysis {
        let stats_csv = dir.join(format!("{}_network_advanced_stats.csv", prefix));
        save_report(&generate_stats_csv(result), &stats_csv)?;

        let network_json = dir.join(format!("{}_network.json", prefix));
        save_report(&generate_json_report(result, session_id)?, &network_json)?;

        let summary_txt = dir.join(format!("{}_summary.txt", prefix));
        save_report(&generate_text_report(result, top, session_id), &summary_txt)?;

        paths.stats_csv = Some(stats_csv);
        paths.network_json = Some(network_json);
        paths.summary_txt = Some(summary_txt);
    }

    Ok(paths)
}
