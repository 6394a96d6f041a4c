use std::collections::HashSet;

use camino::{Utf8Path, Utf8PathBuf};
use glob::Pattern;

use crate::error::WatchError;

/// Splits a glob string into a canonicalized static root path (for
/// watching) and a compiled absolute Pattern (for matching).
pub fn resolve_watch_path(glob_str: impl AsRef<str>) -> Result<(Utf8PathBuf, Pattern), WatchError> {
    let glob_str = glob_str.as_ref();
    let resolve_err = |e: &dyn std::fmt::Display| WatchError::Resolve(glob_str.to_string(), e.to_string());

    let path = Utf8Path::new(glob_str);

    // Split path into static root and dynamic suffix (containing wildcards)
    let components: Vec<_> = path.components().collect();
    let split_idx = components
        .iter()
        .position(|c| c.as_str().contains(['*', '?', '[']))
        .unwrap_or(components.len());

    let root_part: Utf8PathBuf = components.iter().take(split_idx).collect();
    let suffix_part: Utf8PathBuf = components.iter().skip(split_idx).collect();

    // The static root must exist on disk
    let absolute_root = root_part.canonicalize_utf8().map_err(|e| resolve_err(&e))?;

    // A concrete file is watched through its parent, so that editors which
    // replace files atomically are still caught.
    let (watch_root, match_pattern) = if suffix_part.as_str().is_empty() && absolute_root.is_file() {
        let parent = absolute_root
            .parent()
            .unwrap_or(&absolute_root)
            .to_path_buf();
        (parent, absolute_root)
    } else {
        let pattern = absolute_root.join(&suffix_part);
        (absolute_root, pattern)
    };

    let escaped = format!(
        "{}{}",
        Pattern::escape(watch_root.as_str()),
        &match_pattern.as_str()[watch_root.as_str().len()..]
    );
    let pattern = Pattern::new(&escaped).map_err(|e| resolve_err(&e))?;

    Ok((watch_root, pattern))
}

/// Reduces a set of paths to the minimal set of watch roots.
///
/// If we watch `/a` and `/a/b`, we only need to watch `/a` because
/// the watcher is recursive.
pub fn collapse_watch_paths(paths: HashSet<Utf8PathBuf>) -> Vec<Utf8PathBuf> {
    let mut paths: Vec<_> = paths.into_iter().collect();
    paths.sort();

    let mut filtered = Vec::new();
    for path in paths {
        if let Some(last) = filtered.last()
            && path.starts_with(last)
        {
            continue;
        }
        filtered.push(path);
    }

    filtered
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn site() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().canonicalize().unwrap()).unwrap();

        fs::create_dir_all(root.join("sass/blocks")).unwrap();
        fs::create_dir_all(root.join("js")).unwrap();
        fs::write(root.join("js/script.js"), "").unwrap();
        fs::write(root.join("index.html"), "").unwrap();

        (dir, root)
    }

    #[test]
    fn test_concrete_file_watches_parent() {
        let (_dir, root) = site();

        let (watch, pattern) = resolve_watch_path(root.join("js/script.js")).unwrap();

        assert_eq!(watch, root.join("js"));
        assert!(pattern.matches_path(root.join("js/script.js").as_std_path()));
        assert!(!pattern.matches_path(root.join("js/other.js").as_std_path()));
    }

    #[test]
    fn test_directory_wildcard() {
        let (_dir, root) = site();

        let (watch, pattern) = resolve_watch_path(root.join("sass/**/*.scss")).unwrap();

        assert_eq!(watch, root.join("sass"));
        assert!(pattern.matches_path(root.join("sass/blocks/header.scss").as_std_path()));
        assert!(!pattern.matches_path(root.join("js/script.js").as_std_path()));
    }

    #[test]
    fn test_wildcard_in_root_directory() {
        let (_dir, root) = site();

        let (watch, pattern) = resolve_watch_path(root.join("*.html")).unwrap();

        assert_eq!(watch, root);
        assert!(pattern.matches_path(root.join("index.html").as_std_path()));
    }

    #[test]
    fn test_missing_root() {
        let (_dir, root) = site();

        let err = resolve_watch_path(root.join("fonts/**/*.woff2")).unwrap_err();
        assert!(matches!(err, WatchError::Resolve(..)));
    }

    #[test]
    fn test_collapse_watch_paths() {
        let mut paths = HashSet::new();
        paths.insert(Utf8PathBuf::from("/a"));
        paths.insert(Utf8PathBuf::from("/a/b"));
        paths.insert(Utf8PathBuf::from("/a/b/c"));
        paths.insert(Utf8PathBuf::from("/b"));
        paths.insert(Utf8PathBuf::from("/c/d"));

        let collapsed = collapse_watch_paths(paths);

        // /a/b and /a/b/c are covered by /a.
        assert_eq!(
            collapsed,
            vec![
                Utf8PathBuf::from("/a"),
                Utf8PathBuf::from("/b"),
                Utf8PathBuf::from("/c/d")
            ]
        );
    }

    #[test]
    fn test_collapse_watch_paths_similar_names() {
        let mut paths = HashSet::new();
        paths.insert(Utf8PathBuf::from("/sass"));
        paths.insert(Utf8PathBuf::from("/sass-old"));

        let collapsed = collapse_watch_paths(paths);

        // /sass-old is not a subdirectory of /sass
        assert_eq!(
            collapsed,
            vec![Utf8PathBuf::from("/sass"), Utf8PathBuf::from("/sass-old")]
        );
    }
}
