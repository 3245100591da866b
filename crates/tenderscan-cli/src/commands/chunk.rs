//! Chunk command implementation.

use crate::cli::ChunkArgs;
use crate::commands::read_input;
use crate::error::{CliError, Result};
use crate::output::Formatter;
use tenderscan_extractor::chunking::{
    chunk, validate_character_count, ChunkInput, ChunkOptions, Sheet,
};
use tenderscan_extractor::PipelineConfig;
use tenderscan_structure::detect_structure_with_limit;
use tracing::debug;

/// Execute the chunk command.
pub fn execute_chunk(args: ChunkArgs, config: &PipelineConfig, formatter: &Formatter) -> Result<()> {
    let max_chars = args.max_chars.unwrap_or(config.max_chunk_chars);
    if max_chars <= config.heading_min_body_chars {
        return Err(CliError::InvalidInput(format!(
            "--max-chars must exceed heading_min_body_chars ({})",
            config.heading_min_body_chars
        )));
    }
    let options = ChunkOptions::new(max_chars)
        .with_heading_min_body_chars(config.heading_min_body_chars)
        .with_max_rows(config.max_sheet_rows);

    let input = read_input(&args.file)?;
    let chunked = if args.sheets {
        let sheets: Vec<Sheet> = serde_json::from_str(&input)?;
        chunk(ChunkInput::Sheets(&sheets), &options)?
    } else {
        let index = detect_structure_with_limit(&input, config.max_text_length)?;
        chunk(ChunkInput::Structured { text: &input, index: &index }, &options)?
    };
    debug!(chunks = chunked.chunks.len(), max_chars, "Chunked input");

    let report = validate_character_count(&chunked.text, &chunked.chunks)?;
    println!("{}", formatter.format_chunks(&chunked.chunks, &report)?);
    Ok(())
}
