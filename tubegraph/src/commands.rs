use crate::CLAP_STYLING;
use clap::{Arg, ArgAction, ArgGroup, arg, command};
use std::path::PathBuf;
use tubegraph_core::InfluenceWeights;

pub const DEFAULT_DB_PATH: &str = "~/.config/tubegraph/tubegraph.db";

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("tubegraph")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("tubegraph")
        .styles(CLAP_STYLING)
        .about("Crawl related-video networks and rank videos by influence")
        .arg(arg!(-q --"quiet" "Suppress banner and non-essential output").required(false))
        .arg(
            arg!(-v --"verbose" "Increase log verbosity (-v info, -vv debug)")
                .required(false)
                .action(ArgAction::Count),
        )
        .subcommand_required(false)
        .subcommand(
            command!("crawl")
                .about(
                    "Crawl the related-video graph outward from seed videos, then analyze and \
                export it.",
                )
                .arg(
                    arg!(--"video" <ID>)
                        .required(false)
                        .help("Seed video id or watch URL (repeatable)")
                        .action(ArgAction::Append)
                        .conflicts_with("seeds-file"),
                )
                .arg(
                    arg!(-s --"seeds-file" <PATH>)
                        .required(false)
                        .help("Path to a newline-delimited file of video ids or watch URLs")
                        .value_parser(clap::value_parser!(PathBuf))
                        .conflicts_with("video"),
                )
                .group(
                    ArgGroup::new("seeds")
                        .args(["video", "seeds-file"])
                        .required(true),
                )
                .arg(
                    arg!(-d --"depth" <LEVELS>)
                        .required(false)
                        .help("Number of breadth-first levels to expand")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("1"),
                )
                .args(crawl_args(true))
                .args(output_args()),
        )
        .subcommand(
            command!("resume")
                .about("Continue a stored crawl session from its latest checkpoint")
                .arg(
                    arg!(--"session" <ID>)
                        .required(true)
                        .help("Session id, as listed by `tubegraph sessions`"),
                )
                .arg(
                    arg!(-d --"depth" <LEVELS>)
                        .required(true)
                        .help("Total depth to reach, counting levels already crawled")
                        .value_parser(clap::value_parser!(usize)),
                )
                .args(crawl_args(false))
                .args(output_args()),
        )
        .subcommand(
            command!("analyze")
                .about(
                    "Rebuild the graph of a stored session, or of an exported related-videos \
                CSV, and run analysis without crawling",
                )
                .arg(
                    arg!(--"session" <ID>)
                        .required(false)
                        .help("Session id, as listed by `tubegraph sessions`"),
                )
                .arg(
                    arg!(--"from-csv" <PATH>)
                        .required(false)
                        .help("Related-videos CSV written by an earlier run")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .group(
                    ArgGroup::new("input")
                        .args(["session", "from-csv"])
                        .required(true),
                )
                .arg(db_arg())
                .args(output_args()),
        )
        .subcommand(
            command!("sessions")
                .about("List stored crawl sessions")
                .arg(db_arg()),
        )
}

fn db_arg() -> Arg {
    arg!(--"db" <PATH>)
        .required(false)
        .help("Location of the checkpoint database")
        .default_value(DEFAULT_DB_PATH)
}

/// Arguments of the commands that talk to the relation source. Resume falls
/// back to the stored session settings, so it gets no defaults.
fn crawl_args(with_defaults: bool) -> Vec<Arg> {
    let mut workers = arg!(-w --"workers" <NUM_WORKERS>)
        .required(false)
        .help("Concurrent requests within one level")
        .value_parser(clap::value_parser!(usize));
    let mut delay = arg!(--"delay-ms" <MILLIS>)
        .required(false)
        .help("Minimum spacing between requests in milliseconds")
        .value_parser(clap::value_parser!(u64));
    if with_defaults {
        workers = workers.default_value("4");
        delay = delay.default_value("1000");
    }

    vec![
        workers,
        delay,
        arg!(--"api-key" <KEY>)
            .required(true)
            .help("SerpApi key")
            .env("SERP_API_KEY")
            .hide_env_values(true),
        db_arg(),
    ]
}

fn output_args() -> Vec<Arg> {
    vec![
        arg!(-o --"output-dir" <DIR>)
            .required(false)
            .help("Directory for exported CSV, JSON and summary files")
            .value_parser(clap::value_parser!(PathBuf))
            .default_value("results"),
        arg!(-p --"prefix" <PREFIX>)
            .required(false)
            .help("File name prefix of exported files")
            .default_value("output"),
        arg!(--"weights" <WEIGHTS>)
            .required(false)
            .help("Influence weights in-degree,betweenness,eigenvector,pagerank (must sum to 1)")
            .value_parser(clap::value_parser!(InfluenceWeights)),
        arg!(--"top" <N>)
            .required(false)
            .help("Number of videos listed in the summary")
            .value_parser(clap::value_parser!(usize))
            .default_value("10"),
        arg!(--"skip-analysis")
            .required(false)
            .help("Only export the raw crawl, skip centrality and community analysis")
            .action(ArgAction::SetTrue),
    ]
}
