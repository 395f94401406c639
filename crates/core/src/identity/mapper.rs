//! Core identity mapping logic.
//!
//! [`IdentityMapper`] translates wiki usernames into git author identities.
//! Unmapped users fall back to the raw wiki username with an empty email so
//! authorship is never silently lost.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::mapping_file::{AuthorEntry, MappingFile};
use crate::errors::IdentityError;

/// A git author/committer identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitIdentity {
    /// Display name.
    pub name: String,
    /// Email address (may be empty for unmapped users).
    pub email: String,
}

/// Maps wiki usernames to git identities.
#[derive(Debug, Clone)]
pub struct IdentityMapper {
    map: HashMap<String, AuthorEntry>,
}

impl IdentityMapper {
    /// Create a mapper from an optional mapping file.
    ///
    /// A configured but missing file is tolerated with a warning: the
    /// fallback still produces usable identities.
    pub fn new(mapping_file: Option<&Path>) -> Result<Self, IdentityError> {
        let map = match mapping_file {
            Some(path) if path.exists() => {
                info!(path = %path.display(), "loading identity mapping file");
                MappingFile::load(path)?
            }
            Some(path) => {
                warn!(path = %path.display(), "mapping file not found, starting with empty map");
                HashMap::new()
            }
            None => {
                debug!("no mapping file configured");
                HashMap::new()
            }
        };
        Ok(Self { map })
    }

    /// Map a wiki username to a git identity.
    ///
    /// Unmapped users become `{username} <>` — the raw wiki username with an
    /// empty email.
    pub fn wiki_to_git(&self, wiki_username: &str) -> GitIdentity {
        match self.map.get(wiki_username) {
            Some(entry) => {
                debug!(wiki_username, "found in mapping file");
                GitIdentity {
                    name: entry.name.clone(),
                    email: entry.email.clone(),
                }
            }
            None => GitIdentity {
                name: wiki_username.to_string(),
                email: String::new(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_test_mapping(path: &Path) {
        let content = r#"
[authors.jdoe]
name = "John Doe"
email = "john.doe@example.com"

[authors."Alice Smith"]
name = "Alice Smith"
email = "alice@example.com"
"#;
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_wiki_to_git_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("authors.toml");
        write_test_mapping(&path);

        let mapper = IdentityMapper::new(Some(&path)).unwrap();
        let identity = mapper.wiki_to_git("jdoe");
        assert_eq!(identity.name, "John Doe");
        assert_eq!(identity.email, "john.doe@example.com");

        let identity = mapper.wiki_to_git("Alice Smith");
        assert_eq!(identity.email, "alice@example.com");
    }

    #[test]
    fn test_wiki_to_git_fallback() {
        let mapper = IdentityMapper::new(None).unwrap();
        let identity = mapper.wiki_to_git("Unknown User");
        assert_eq!(identity.name, "Unknown User");
        assert_eq!(identity.email, "");
    }

    #[test]
    fn test_missing_file_tolerated() {
        let mapper = IdentityMapper::new(Some(Path::new("/nonexistent/authors.toml"))).unwrap();
        let identity = mapper.wiki_to_git("anyone");
        assert_eq!(identity.name, "anyone");
    }
}
