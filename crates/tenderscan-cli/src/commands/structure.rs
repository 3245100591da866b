//! Structure command implementation.

use crate::cli::StructureArgs;
use crate::commands::read_input;
use crate::error::Result;
use crate::output::Formatter;
use tenderscan_extractor::PipelineConfig;
use tenderscan_structure::detect_structure_with_limit;

/// Execute the structure command.
pub fn execute_structure(
    args: StructureArgs,
    config: &PipelineConfig,
    formatter: &Formatter,
) -> Result<()> {
    let text = read_input(&args.file)?;
    let index = detect_structure_with_limit(&text, config.max_text_length)?;
    println!("{}", formatter.format_structure(&index)?);
    Ok(())
}
