//! CLI command definitions and argument parsing.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Tenderscan - Extract source-traced records from tender documents.
#[derive(Debug, Parser)]
#[command(name = "tenderscan")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(short, long, value_enum, global = true)]
    pub format: Option<CliFormat>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Configuration file path
    #[arg(short, long, global = true, env = "TENDERSCAN_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Output format options.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum CliFormat {
    /// Table format (default)
    Table,
    /// JSON format
    Json,
}

/// CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Detect headings, tables, lists, footnotes and references
    Structure(StructureArgs),

    /// Split a document into chunks and check character accounting
    Chunk(ChunkArgs),

    /// Decode a raw model response, repairing it if truncated
    Repair(RepairArgs),

    /// Run the full pipeline against recorded model responses
    Run(RunArgs),
}

/// Arguments for the structure command.
#[derive(Debug, Parser)]
pub struct StructureArgs {
    /// Tender text file
    pub file: PathBuf,
}

/// Arguments for the chunk command.
#[derive(Debug, Parser)]
pub struct ChunkArgs {
    /// Tender text file, or a JSON array of sheets with --sheets
    pub file: PathBuf,

    /// Maximum chunk size in characters (overrides the config)
    #[arg(short, long)]
    pub max_chars: Option<usize>,

    /// Treat the file as spreadsheet tabs (`[{"name", "header", "rows"}]`)
    #[arg(long)]
    pub sheets: bool,
}

/// Arguments for the repair command.
#[derive(Debug, Parser)]
pub struct RepairArgs {
    /// File holding the raw model response
    pub file: PathBuf,
}

/// Arguments for the run command.
#[derive(Debug, Parser)]
pub struct RunArgs {
    /// Tender text file
    pub file: PathBuf,

    /// Recorded responses: a JSON object mapping chunk IDs to raw model output
    #[arg(short, long)]
    pub responses: PathBuf,

    /// Document ID (defaults to the file stem)
    #[arg(short, long)]
    pub document_id: Option<String>,

    /// Write the monitor report here as JSON
    #[arg(long)]
    pub report: Option<PathBuf>,
}

impl From<CliFormat> for crate::config::OutputFormat {
    fn from(format: CliFormat) -> Self {
        match format {
            CliFormat::Table => crate::config::OutputFormat::Table,
            CliFormat::Json => crate::config::OutputFormat::Json,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structure_command() {
        let cli = Cli::parse_from(["tenderscan", "structure", "tender.txt"]);
        match cli.command {
            Command::Structure(args) => assert_eq!(args.file, PathBuf::from("tender.txt")),
            _ => panic!("Expected Structure command"),
        }
    }

    #[test]
    fn test_chunk_command_with_limit() {
        let cli = Cli::parse_from(["tenderscan", "chunk", "tender.txt", "--max-chars", "4000"]);
        match cli.command {
            Command::Chunk(args) => {
                assert_eq!(args.max_chars, Some(4000));
                assert!(!args.sheets);
            }
            _ => panic!("Expected Chunk command"),
        }
    }

    #[test]
    fn test_run_command_requires_responses() {
        assert!(Cli::try_parse_from(["tenderscan", "run", "tender.txt"]).is_err());

        let cli = Cli::parse_from([
            "tenderscan",
            "--format",
            "json",
            "run",
            "tender.txt",
            "-r",
            "responses.json",
            "--document-id",
            "t-14",
        ]);
        assert!(matches!(cli.format, Some(CliFormat::Json)));
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.responses, PathBuf::from("responses.json"));
                assert_eq!(args.document_id.as_deref(), Some("t-14"));
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_format_conversion() {
        let format: crate::config::OutputFormat = CliFormat::Json.into();
        assert_eq!(format, crate::config::OutputFormat::Json);
    }
}
