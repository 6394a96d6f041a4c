use std::fmt::Display;
use std::fs;
use std::sync::LazyLock;
use std::time::Instant;

use camino::Utf8Path;
use console::Style;
use indicatif::ProgressStyle;

use crate::error::TaskError;

const ANSI_BLUE: Style = Style::new().blue();

pub(crate) static STYLE_ROOT: LazyLock<ProgressStyle> = LazyLock::new(|| {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .expect("Error setting progress bar template")
        .progress_chars("=>-")
});

pub(crate) static STYLE_TASK: LazyLock<ProgressStyle> = LazyLock::new(|| {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .expect("Error setting progress bar template")
});

pub fn as_overhead(s: Instant) -> impl Display {
    let e = Instant::now();
    let f = format!("(+{}ms)", e.duration_since(s).as_millis());
    ANSI_BLUE.apply_to(f)
}

/// Delete the entire output directory if it exists, then recreate it empty.
pub fn clear_dir(dir: &Utf8Path) -> Result<(), TaskError> {
    if fs::metadata(dir).is_ok() {
        fs::remove_dir_all(dir).map_err(|e| TaskError::io(dir, e))?;
    }

    fs::create_dir_all(dir).map_err(|e| TaskError::io(dir, e))?;

    Ok(())
}

/// Writes `data` to `path`, creating parent directories on the way.
pub fn write_file(path: &Utf8Path, data: impl AsRef<[u8]>) -> Result<(), TaskError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| TaskError::io(parent, e))?;
    }

    fs::write(path, data).map_err(|e| TaskError::io(path, e))
}

pub fn copy_file(from: &Utf8Path, to: &Utf8Path) -> Result<(), TaskError> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(|e| TaskError::io(parent, e))?;
    }

    fs::copy(from, to).map_err(|e| TaskError::io(from, e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;

    use super::*;

    #[test]
    fn test_clear_dir_removes_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().join("build")).unwrap();

        write_file(&root.join("old/stale.css"), "a{}").unwrap();
        clear_dir(&root).unwrap();

        assert!(root.is_dir());
        assert_eq!(fs::read_dir(&root).unwrap().count(), 0);
    }

    #[test]
    fn test_clear_dir_missing_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().join("nope")).unwrap();

        clear_dir(&root).unwrap();
        assert!(root.is_dir());
    }
}
