//! File name helpers for downloaded artifacts

use regex::Regex;
use std::path::{Path, PathBuf};

use crate::error::{CommonError, Result};

/// Longest path (directory plus file name) a generated file may have.
pub const MAX_PATH_LEN: usize = 250;

/// Characters that are unsafe in a file name on at least one platform.
const UNSAFE_CHARS: &str = r#"[/\\?%*:|"<> \t\n]"#;

/// Replace path separators and reserved characters with `-`.
pub fn sanitize(name: &str) -> Result<String> {
    let pattern = Regex::new(UNSAFE_CHARS).map_err(|e| CommonError::InvalidFileName(e.to_string()))?;

    let name = name.replace(" // ", "-").replace(" / ", "-");
    Ok(pattern.replace_all(&name, "-").into_owned())
}

/// Truncate `stem` so that `dir/stem.ext` stays within [`MAX_PATH_LEN`].
///
/// Truncation never splits a multi-byte character. Fails when `dir` leaves no
/// room for even one character of the stem.
pub fn bounded(dir: &Path, stem: &str, ext: &str) -> Result<String> {
    let budget = MAX_PATH_LEN.saturating_sub(dir.as_os_str().len() + ext.len() + 2);
    if stem.len() <= budget {
        return Ok(stem.to_string());
    }

    let mut end = budget;
    while end > 0 && !stem.is_char_boundary(end) {
        end -= 1;
    }
    if end == 0 {
        return Err(CommonError::InvalidFileName(format!(
            "{} leaves no room for a file name within {} characters",
            dir.display(),
            MAX_PATH_LEN
        )));
    }
    Ok(stem[..end].to_string())
}

/// Pick a path in `dir` for `stem.ext` that does not exist yet.
///
/// Collisions get a ` (n)` suffix, starting at 1.
pub async fn unique_path(dir: &Path, stem: &str, ext: &str) -> Result<PathBuf> {
    let candidate = dir.join(format!("{}.{}", stem, ext));
    if !tokio::fs::try_exists(&candidate).await? {
        return Ok(candidate);
    }

    let mut n = 1usize;
    loop {
        let candidate = dir.join(format!("{} ({}).{}", stem, n, ext));
        if !tokio::fs::try_exists(&candidate).await? {
            return Ok(candidate);
        }
        n += 1;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_separators() {
        assert_eq!(sanitize("Site A / Level 2").unwrap(), "Site-A-Level-2");
        assert_eq!(sanitize("a // b").unwrap(), "a-b");
        assert_eq!(sanitize("what?*<x>").unwrap(), "what---x-");
        assert_eq!(sanitize("tab\there").unwrap(), "tab-here");
    }

    #[test]
    fn test_sanitize_keeps_safe_names() {
        assert_eq!(sanitize("Daily_Check-01").unwrap(), "Daily_Check-01");
    }

    #[test]
    fn test_bounded_respects_budget() {
        let dir = Path::new("/tmp/reports");
        let long = "x".repeat(400);
        let stem = bounded(dir, &long, "pdf").unwrap();
        let path = dir.join(format!("{}.pdf", stem));
        assert_eq!(path.as_os_str().len(), MAX_PATH_LEN);
    }

    #[test]
    fn test_bounded_multibyte() {
        let dir = Path::new("");
        let long = "é".repeat(200);
        let stem = bounded(dir, &long, "docx").unwrap();
        assert!(stem.len() + 5 <= MAX_PATH_LEN);
        assert!(stem.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_bounded_short_name_unchanged() {
        assert_eq!(bounded(Path::new("/tmp"), "Daily Check", "pdf").unwrap(), "Daily Check");
    }

    #[test]
    fn test_bounded_rejects_exhausted_budget() {
        let deep = format!("/{}", "d".repeat(MAX_PATH_LEN));
        let err = bounded(Path::new(&deep), "Daily Check", "pdf").unwrap_err();
        assert!(matches!(err, CommonError::InvalidFileName(_)));

        // Exactly one character of room is still enough
        let dir = "d".repeat(MAX_PATH_LEN - "pdf".len() - 3);
        assert_eq!(bounded(Path::new(&dir), "Daily", "pdf").unwrap(), "D");
    }

    #[tokio::test]
    async fn test_unique_path_suffixes() {
        let dir = tempfile::tempdir().unwrap();
        let first = unique_path(dir.path(), "report", "pdf").await.unwrap();
        assert_eq!(first.file_name().unwrap(), "report.pdf");

        std::fs::write(&first, b"1").unwrap();
        let second = unique_path(dir.path(), "report", "pdf").await.unwrap();
        assert_eq!(second.file_name().unwrap(), "report (1).pdf");

        std::fs::write(&second, b"2").unwrap();
        let third = unique_path(dir.path(), "report", "pdf").await.unwrap();
        assert_eq!(third.file_name().unwrap(), "report (2).pdf");
    }
}
