//! tabula CLI
//!
//! Compiles schema source files (or a live database catalog) into one
//! of the output formats.

use std::path::Path;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

use tabula_core::format::canonical::CanonicalFormatter;
use tabula_core::format::plantuml::PlantUmlFormatter;
use tabula_core::format::sql::hypersql::HyperSqlDialect;
use tabula_core::format::sql::postgres::PostgresDialect;
use tabula_core::format::sql::SqlOptions;
use tabula_core::format::Formatter;
use tabula_core::model::Database;

/// Relational schema compiler.
#[derive(Parser)]
#[command(name = "tabula")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Schema source file, or a database URL to reverse engineer.
    input: String,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = Format::Postgresql)]
    format: Format,

    /// Path to an external driver library (ignored; drivers are
    /// linked in at build time).
    #[arg(short, long)]
    driver: Option<String>,

    /// Upper-case generated identifiers.
    #[arg(long)]
    uppercase: bool,

    /// Double-quote generated identifiers.
    #[arg(long)]
    quoted: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    /// Source text, normalized.
    Canonical,
    /// PlantUML class diagram.
    Plantuml,
    /// PostgreSQL DDL.
    Postgresql,
    /// HyperSQL DDL.
    Hypersql,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(driver) = &cli.driver {
        tracing::info!("driver {driver} ignored; connectivity is built in");
    }

    let db = load(&cli.input).await?;
    debug!(database = %db.name, "model built");

    let options = SqlOptions {
        uppercase: cli.uppercase,
        quoted: cli.quoted,
    };
    let output = match cli.format {
        Format::Canonical => CanonicalFormatter.format(&db),
        Format::Plantuml => PlantUmlFormatter.format(&db),
        Format::Postgresql => PostgresDialect::new(options).format(&db),
        Format::Hypersql => HyperSqlDialect::new(options).format(&db),
    }?;
    print!("{output}");
    Ok(())
}

/// Builds the model from a source file or, for URL inputs, from a live
/// catalog.
async fn load(input: &str) -> anyhow::Result<Database> {
    if is_connection_url(input) {
        return Ok(tabula_reverse::reverse(input).await?);
    }
    let source = std::fs::read_to_string(Path::new(input))
        .with_context(|| format!("could not read {input}"))?;
    Ok(tabula_core::compile(&source)?)
}

fn is_connection_url(input: &str) -> bool {
    // single letters are drive prefixes, not schemes
    input
        .split_once("://")
        .is_some_and(|(scheme, _)| scheme.len() > 1 && scheme.chars().all(|c| c.is_ascii_alphanumeric()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_url_detection() {
        assert!(is_connection_url("postgres://localhost/app"));
        assert!(!is_connection_url("schemas/app.tab"));
        assert!(!is_connection_url("C://not-a-scheme/app.tab"));
    }
}
