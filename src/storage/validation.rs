//! Path validation
//!
//! Lexical normalization of client-supplied paths.

use std::path::PathBuf;

use crate::error::ConfinementError;

/// Normalizes a client path into a path relative to the directory root.
///
/// `.` and empty segments are dropped and `..` pops the previous segment.
/// A `..` with nothing left to pop would climb above the root and is
/// rejected rather than clamped.
pub fn normalize_virtual_path(virtual_path: &str) -> Result<PathBuf, ConfinementError> {
    if virtual_path.contains('\0') {
        return Err(ConfinementError::InvalidPath(virtual_path.escape_default().to_string()));
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in virtual_path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                if segments.pop().is_none() {
                    return Err(ConfinementError::Escape(virtual_path.to_string()));
                }
            }
            s => segments.push(s),
        }
    }

    Ok(segments.iter().collect())
}

/// Whether the client spelled the path as a directory.
pub fn is_directory_spelling(virtual_path: &str) -> bool {
    virtual_path.is_empty() || virtual_path.ends_with('/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn drops_dot_and_empty_segments() {
        let p = normalize_virtual_path("//a/./b//c").unwrap();
        assert_eq!(p, Path::new("a/b/c"));
    }

    #[test]
    fn dotdot_inside_root_is_collapsed() {
        let p = normalize_virtual_path("/a/b/../c").unwrap();
        assert_eq!(p, Path::new("a/c"));
    }

    #[test]
    fn dotdot_above_root_is_rejected() {
        assert!(matches!(
            normalize_virtual_path("/../etc/passwd"),
            Err(ConfinementError::Escape(_))
        ));
        assert!(matches!(
            normalize_virtual_path("a/../../b"),
            Err(ConfinementError::Escape(_))
        ));
    }

    #[test]
    fn nul_bytes_are_invalid() {
        assert!(matches!(
            normalize_virtual_path("/a\0b"),
            Err(ConfinementError::InvalidPath(_))
        ));
    }

    #[test]
    fn root_spellings_normalize_to_empty() {
        assert_eq!(normalize_virtual_path("/").unwrap(), PathBuf::new());
        assert_eq!(normalize_virtual_path("").unwrap(), PathBuf::new());
        assert!(is_directory_spelling("/"));
        assert!(is_directory_spelling("/dir/"));
        assert!(!is_directory_spelling("/file"));
    }
}
