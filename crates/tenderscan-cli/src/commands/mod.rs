//! Command implementations.

pub mod chunk;
pub mod repair;
pub mod run;
pub mod structure;

pub use self::chunk::execute_chunk;
pub use self::repair::execute_repair;
pub use self::run::execute_run;
pub use self::structure::execute_structure;

use crate::error::{CliError, Result};
use std::fs;
use std::path::Path;

/// Read a UTF-8 input file, naming it in the error.
pub(crate) fn read_input(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| {
        CliError::InvalidInput(format!("cannot read {}: {}", path.display(), e))
    })
}
