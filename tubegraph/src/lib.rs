pub mod commands;
pub mod handlers;

pub use handlers::{
    InterruptAction, OutputOptions, analyze_and_export, load_csv_checkpoint,
    load_seeds_from_file, load_seeds_from_source, on_interrupt, parse_seed_line, resolve_db_path,
};

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);
