//! Bidirectional page-title ↔ file-path translation.
//!
//! A page and its sub-pages ("Page" and "Page/doc") cannot both exist in a
//! file tree, because a path cannot be a file and a directory at the same
//! time. Every hierarchical separator in a title is therefore replaced with
//! a reserved marker segment: "Page/doc" becomes "Page.d/doc", leaving the
//! plain file "Page" free for the parent page.
//!
//! Round-trip identity holds in both directions for any title or path that
//! does not literally contain the marker.

use crate::errors::MapperError;

/// Marker appended to each directory-ified title segment.
pub const DIR_MARKER: &str = ".d";

/// Translates between wiki page titles (namespace-stripped) and repository
/// file paths for one binding.
#[derive(Debug, Clone)]
pub struct NameMapper {
    /// Forced content extension for root-level pages (e.g. "lua" for syntax
    /// highlighting), without the leading dot.
    force_ext: Option<String>,
}

impl NameMapper {
    /// Create a mapper, validating that the forced extension cannot collide
    /// with the marker or the path syntax itself.
    pub fn new(force_ext: Option<&str>) -> Result<Self, MapperError> {
        if let Some(ext) = force_ext {
            if ext.is_empty() || ext.contains('/') || ext.contains('.') {
                return Err(MapperError::InvalidExtension {
                    ext: ext.to_string(),
                    detail: "must be non-empty and contain no '/' or '.'".into(),
                });
            }
            // With extension "d", a root page "X" maps to file "X.d" while
            // its sub-page "X/sub" maps into directory "X.d/" — a collision.
            if format!(".{ext}") == DIR_MARKER {
                return Err(MapperError::ExtensionCollidesWithMarker(ext.to_string()));
            }
        }
        Ok(Self {
            force_ext: force_ext.map(str::to_string),
        })
    }

    /// Map a page title to its repository path.
    ///
    /// The forced extension is appended only for root-level pages; sub-page
    /// paths already carry the marker segment.
    pub fn title_to_path(&self, title: &str) -> String {
        let mut path = title.replace('/', &format!("{DIR_MARKER}/"));
        if let Some(ext) = &self.force_ext {
            if !title.contains('/') {
                path.push('.');
                path.push_str(ext);
            }
        }
        path
    }

    /// Map a repository path back to its page title. Exact inverse of
    /// [`title_to_path`](Self::title_to_path).
    pub fn path_to_title(&self, path: &str) -> String {
        let title = path.replace(&format!("{DIR_MARKER}/"), "/");
        if let Some(ext) = &self.force_ext {
            if !title.contains('/') {
                if let Some(stripped) = title.strip_suffix(&format!(".{ext}")) {
                    return stripped.to_string();
                }
            }
        }
        title
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_plain_titles() {
        let mapper = NameMapper::new(None).unwrap();
        for title in ["Foo", "Foo/Bar", "Foo/Bar/Baz", "Common.css", "A b c"] {
            let path = mapper.title_to_path(title);
            assert_eq!(mapper.path_to_title(&path), title, "title: {title}");
        }
    }

    #[test]
    fn test_round_trip_with_extension() {
        let mapper = NameMapper::new(Some("lua")).unwrap();
        for title in ["Foo", "Foo/doc", "String utilities", "Foo/Bar/doc"] {
            let path = mapper.title_to_path(title);
            assert_eq!(mapper.path_to_title(&path), title, "title: {title}");
        }
    }

    #[test]
    fn test_subpage_does_not_collide_with_parent() {
        let mapper = NameMapper::new(None).unwrap();
        assert_eq!(mapper.title_to_path("Foo"), "Foo");
        assert_eq!(mapper.title_to_path("Foo/Bar"), "Foo.d/Bar");
    }

    #[test]
    fn test_extension_only_on_root_pages() {
        let mapper = NameMapper::new(Some("lua")).unwrap();
        assert_eq!(mapper.title_to_path("Sandbox"), "Sandbox.lua");
        assert_eq!(mapper.title_to_path("Sandbox/doc"), "Sandbox.d/doc");
    }

    #[test]
    fn test_path_to_title_strips_extension_at_root_only() {
        let mapper = NameMapper::new(Some("lua")).unwrap();
        assert_eq!(mapper.path_to_title("Sandbox.lua"), "Sandbox");
        assert_eq!(mapper.path_to_title("Sandbox.d/doc"), "Sandbox/doc");
    }

    #[test]
    fn test_title_with_literal_dot_segments() {
        let mapper = NameMapper::new(Some("lua")).unwrap();
        // A root page whose name already ends in ".lua" gains a second
        // extension and still round-trips.
        let path = mapper.title_to_path("Legacy.lua");
        assert_eq!(path, "Legacy.lua.lua");
        assert_eq!(mapper.path_to_title(&path), "Legacy.lua");
    }

    #[test]
    fn test_invalid_extension_rejected() {
        assert!(matches!(
            NameMapper::new(Some("")),
            Err(MapperError::InvalidExtension { .. })
        ));
        assert!(matches!(
            NameMapper::new(Some("tar.gz")),
            Err(MapperError::InvalidExtension { .. })
        ));
        assert!(matches!(
            NameMapper::new(Some("a/b")),
            Err(MapperError::InvalidExtension { .. })
        ));
    }

    #[test]
    fn test_marker_extension_rejected() {
        assert!(matches!(
            NameMapper::new(Some("d")),
            Err(MapperError::ExtensionCollidesWithMarker(_))
        ));
    }
}
