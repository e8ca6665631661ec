use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("resource path is empty")]
    Empty,
    #[error("resource path contains unsupported segment")]
    UnsupportedSegment,
}

/// Composes the address of a named child under `parent`.
pub fn join_url(parent: &str, name: &str) -> String {
    let parent = parent.trim_end_matches('/');
    if parent.is_empty() {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// Canonicalizes a root-relative resource path.
///
/// Collapses empty and "." segments and rejects parent traversal; the
/// result always starts with "/" and carries no trailing slash.
pub fn normalize_url(url: &str) -> Result<String, PathError> {
    if url.is_empty() {
        return Err(PathError::Empty);
    }

    let mut out = String::new();
    for segment in url.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(PathError::UnsupportedSegment),
            segment => {
                out.push('/');
                out.push_str(segment);
            }
        }
    }
    if out.is_empty() {
        out.push('/');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_child_under_parent() {
        assert_eq!(join_url("/a", "doc1"), "/a/doc1");
        assert_eq!(join_url("/a/", "doc1"), "/a/doc1");
        assert_eq!(join_url("/", "doc1"), "/doc1");
    }

    #[test]
    fn normalizes_redundant_segments() {
        assert_eq!(normalize_url("/a//b/./c/").unwrap(), "/a/b/c");
        assert_eq!(normalize_url("/").unwrap(), "/");
    }

    #[test]
    fn rejects_empty_path() {
        assert!(matches!(normalize_url(""), Err(PathError::Empty)));
    }

    #[test]
    fn rejects_parent_traversal() {
        assert!(matches!(
            normalize_url("/a/../b"),
            Err(PathError::UnsupportedSegment)
        ));
    }
}
