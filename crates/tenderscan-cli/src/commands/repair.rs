//! Repair command implementation.

use crate::cli::RepairArgs;
use crate::commands::read_input;
use crate::error::{CliError, Result};
use crate::output::Formatter;
use tenderscan_extractor::parser::safe_json_parse;

/// Execute the repair command.
pub fn execute_repair(args: RepairArgs, formatter: &Formatter) -> Result<()> {
    let raw = read_input(&args.file)?;
    let parsed = safe_json_parse(&raw).map_err(|e| CliError::InvalidInput(e.to_string()))?;
    println!("{}", formatter.format_repair(&parsed)?);
    Ok(())
}
