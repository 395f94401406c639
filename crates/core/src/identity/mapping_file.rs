//! TOML mapping file loader.
//!
//! File format:
//!
//! ```toml
//! [authors."Ivan Petrov"]
//! name = "Ivan Petrov"
//! email = "ivan@example.com"
//! ```
//!
//! Table keys are wiki usernames (quoted when they contain spaces).

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::IdentityError;

/// A git author entry from the mapping file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorEntry {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
struct MappingFileFormat {
    #[serde(default)]
    authors: HashMap<String, AuthorEntry>,
}

/// Loader for the wiki-user → git-identity mapping file.
pub struct MappingFile;

impl MappingFile {
    /// Load the mapping file and return the username → entry map.
    pub fn load(path: &Path) -> Result<HashMap<String, AuthorEntry>, IdentityError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| IdentityError::MappingFileError {
                path: path.display().to_string(),
                detail: e.to_string(),
            })?;

        let parsed: MappingFileFormat =
            toml::from_str(&contents).map_err(|e| IdentityError::ParseError(e.to_string()))?;

        debug!(
            path = %path.display(),
            count = parsed.authors.len(),
            "loaded identity mapping file"
        );
        Ok(parsed.authors)
    }
}
