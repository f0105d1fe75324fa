use colored::Colorize;

pub mod analytics;
pub mod crawl;
pub mod data;
pub mod error;
pub mod graph;
pub mod model;
pub mod report;

pub use analytics::{AnalysisConfig, AnalysisResult, InfluenceWeights, analyze};
pub use error::{AnalyticsError, StoreError};
pub use graph::GraphStore;
pub use model::{AnalyzedNode, CentralityVector, CommunityId, Edge, GraphSnapshot, VideoNode};

pub fn print_banner() {
    let banner = r#"
  _        _                              _
 | |_ _  _| |__  ___ __ _ _ _ __ _ _ __ | |_
 |  _| || | '_ \/ -_) _` | '_/ _` | '_ \| ' \
  \__|\_,_|_.__/\___\__, |_| \__,_| .__/|_||_|
                    |___/         |_|
"#;
    println!("{}", banner.bright_red());
    println!(
        "  {} {}\n",
        "related-video network crawler".dimmed(),
        concat!("v", env!("CARGO_PKG_VERSION")).dimmed()
    );
}
