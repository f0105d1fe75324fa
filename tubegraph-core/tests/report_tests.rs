// Tests for export generation

use tempfile::TempDir;
use tubegraph_core::analytics::{AnalysisConfig, AnalysisResult, analyze};
use tubegraph_core::report::{
    csv_field, export_all, generate_json_report, generate_related_csv, generate_stats_csv,
    generate_text_report, load_related_csv, parse_related_csv,
};
use tubegraph_core::{GraphStore, StoreError};
use tubegraph_crawler::{EdgeRecord, VideoMetadata};

fn records() -> Vec<EdgeRecord> {
    vec![
        EdgeRecord {
            parent: "aaaaaaaaaaa".to_string(),
            child: "bbbbbbbbbbb".to_string(),
            metadata: VideoMetadata {
                title: "Hello, \"world\"".to_string(),
                channel: "Chan".to_string(),
                view_count: 1234,
                duration_seconds: 65,
            },
        },
        EdgeRecord {
            parent: "aaaaaaaaaaa".to_string(),
            child: "ccccccccccc".to_string(),
            metadata: VideoMetadata::default(),
        },
        EdgeRecord {
            parent: "bbbbbbbbbbb".to_string(),
            child: "ccccccccccc".to_string(),
            metadata: VideoMetadata::default(),
        },
    ]
}

fn analysis() -> AnalysisResult {
    let store = GraphStore::from_records(&records());
    analyze(&store, &AnalysisConfig::default()).unwrap()
}

// ============================================================================
// CSV Tests
// ============================================================================

#[test]
fn test_related_csv_reads_back_written_edges() {
    let csv = generate_related_csv(&records());
    let parsed = parse_related_csv(csv.as_bytes()).unwrap();
    assert_eq!(parsed, records());
}

#[test]
fn test_parse_related_csv_legacy_layout() {
    let csv = "title,link,video_id,channel,views,snippet,length_str,parsed_length,parsed_views,related_to\n\
               Seed,https://www.youtube.com/watch?v=aaaaaaaaaaa,aaaaaaaaaaa,Chan,\"1,000 views\",,4:05,245,1000,\n\
               Child,https://www.youtube.com/watch?v=bbbbbbbbbbb,bbbbbbbbbbb,Chan,\"2.5K views\",,1:00,60.0,2500.0,aaaaaaaaaaa\n\
               From link,https://www.youtube.com/watch?v=ccccccccccc&t=3,,Other,7 views,,0:07,,,aaaaaaaaaaa\n\
               Broken,,not-an-id,X,,,,,,aaaaaaaaaaa\n";

    let parsed = parse_related_csv(csv.as_bytes()).unwrap();

    assert_eq!(parsed.len(), 2);
    assert_eq!(parsed[0].parent, "aaaaaaaaaaa");
    assert_eq!(parsed[0].child, "bbbbbbbbbbb");
    assert_eq!(parsed[0].metadata.view_count, 2500);
    assert_eq!(parsed[0].metadata.duration_seconds, 60);
    assert_eq!(parsed[1].child, "ccccccccccc");
    assert_eq!(parsed[1].metadata.channel, "Other");
    assert_eq!(parsed[1].metadata.view_count, 7);
    assert_eq!(parsed[1].metadata.duration_seconds, 7);
}

#[test]
fn test_parse_related_csv_requires_columns() {
    let result = parse_related_csv("video_id,title\naaaaaaaaaaa,x\n".as_bytes());
    assert!(matches!(result, Err(StoreError::InvalidCsv(msg)) if msg.contains("related_to")));
}

#[test]
fn test_load_related_csv_from_export() {
    let dir = TempDir::new().unwrap();
    let paths = export_all(dir.path(), "again", &records(), None, 5, None).unwrap();

    let loaded = load_related_csv(&paths.related_csv).unwrap();
    let store = GraphStore::from_records(&loaded);
    assert_eq!(store.node_count(), 3);
    assert_eq!(store.edge_count(), 3);
    assert_eq!(store.node("bbbbbbbbbbb").unwrap().title, "Hello, \"world\"");
}

#[test]
fn test_csv_field_quoting() {
    assert_eq!(csv_field("plain"), "plain");
    assert_eq!(csv_field("a,b"), "\"a,b\"");
    assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    assert_eq!(csv_field("two\nlines"), "\"two\nlines\"");
}

#[test]
fn test_related_csv_rows() {
    let csv = generate_related_csv(&records());
    let lines: Vec<&str> = csv.lines().collect();

    assert_eq!(
        lines[0],
        "video_id,title,channel,views,duration_seconds,related_to"
    );
    assert_eq!(
        lines[1],
        "bbbbbbbbbbb,\"Hello, \"\"world\"\"\",Chan,1234,65,aaaaaaaaaaa"
    );
    assert_eq!(lines[2], "ccccccccccc,,,0,0,aaaaaaaaaaa");
    assert_eq!(lines.len(), 4);
}

#[test]
fn test_stats_csv_has_every_node() {
    let result = analysis();
    let csv = generate_stats_csv(&result);
    let lines: Vec<&str> = csv.lines().collect();

    assert_eq!(
        lines[0],
        "video_id,title,channel,views,in_degree_cent,betweenness,eigenvector,pagerank,influence,community"
    );
    assert_eq!(lines.len(), 4);
    assert!(lines[1].starts_with("ccccccccccc,"));
}

// ============================================================================
// JSON and Text Tests
// ============================================================================

#[test]
fn test_json_report_structure() {
    let result = analysis();
    let json = generate_json_report(&result, Some("session-1")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(value["metadata"]["generator"], "tubegraph");
    assert_eq!(value["metadata"]["session_id"], "session-1");
    assert_eq!(value["summary"]["nodes"], 3);
    assert_eq!(value["summary"]["edges"], 3);
    assert_eq!(value["nodes"].as_array().unwrap().len(), 3);
    assert!(value["nodes"][0]["pagerank"].is_number());
    assert!(value["nodes"][0]["community"].is_number());
}

#[test]
fn test_text_report_sections() {
    let mut result = analysis();
    result.warnings.push("pagerank did not converge within 100 iterations".to_string());

    let report = generate_text_report(&result, 2, None);
    assert!(report.contains("Videos:       3"));
    assert!(report.contains("Relations:    3"));
    assert!(report.contains("TOP 2 VIDEOS BY INFLUENCE"));
    assert!(report.contains("WARNINGS"));
    assert!(report.contains("pagerank did not converge"));
}

// ============================================================================
// Export Tests
// ============================================================================

#[test]
fn test_export_all_writes_files() {
    let temp_dir = TempDir::new().unwrap();
    let out_dir = temp_dir.path().join("results");
    let result = analysis();

    let paths = export_all(&out_dir, "run", &records(), Some(&result), 5, None).unwrap();

    assert!(paths.related_csv.ends_with("run_related_videos.csv"));
    assert!(paths.related_csv.exists());
    assert!(paths.stats_csv.unwrap().ends_with("run_network_advanced_stats.csv"));
    assert!(paths.network_json.unwrap().exists());
    assert!(paths.summary_txt.unwrap().exists());
}

#[test]
fn test_export_without_analysis() {
    let temp_dir = TempDir::new().unwrap();
    let paths = export_all(temp_dir.path(), "raw", &records(), None, 5, None).unwrap();

    assert!(paths.related_csv.exists());
    assert!(paths.stats_csv.is_none());
    assert!(paths.network_json.is_none());
}
