pub mod predict;
pub mod targets;

use crate::error::{CliError, Result};
use std::path::Path;

fn require_dir(path: &Path, what: &str) -> Result<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(CliError::Argument(format!(
            "{} '{}' is not a directory",
            what,
            path.display()
        )))
    }
}
