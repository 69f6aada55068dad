//! Task checklist inspection.
//!
//! A textual heuristic, not a semantic verifier: it trusts the worker to
//! have checked items honestly.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::Context;
use regex::Regex;

/// Unchecked markdown checkbox at the start of a list item.
static UNCHECKED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*[-*]\s+\[ \]").expect("static checklist regex"));

/// Outcome of inspecting the task checklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Artifact exists and every checkbox is checked.
    Complete,
    /// Artifact exists with this many unchecked items.
    Incomplete(usize),
    /// No artifact at the given path. Not an error — some tasks don't
    /// use the checklist mechanism.
    NoArtifact,
}

/// Count unchecked checklist markers in the artifact at `path`.
pub fn check_artifact(path: &Path) -> anyhow::Result<Completion> {
    if !path.exists() {
        return Ok(Completion::NoArtifact);
    }
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("reading checklist {}", path.display()))?;
    let remaining = UNCHECKED.find_iter(&body).count();
    if remaining == 0 {
        Ok(Completion::Complete)
    } else {
        Ok(Completion::Incomplete(remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_artifact(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("TASKS.md");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn all_checked_is_complete() {
        let (_dir, path) = write_artifact("# Tasks\n- [x] one\n- [X] two\n");
        assert_eq!(check_artifact(&path).unwrap(), Completion::Complete);
    }

    #[test]
    fn counts_unchecked_items() {
        let (_dir, path) = write_artifact(
            "# Tasks\n- [x] done\n- [ ] pending\n  - [ ] nested pending\n* [ ] star style\n",
        );
        assert_eq!(check_artifact(&path).unwrap(), Completion::Incomplete(3));
    }

    #[test]
    fn missing_file_is_no_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("TASKS.md");
        assert_eq!(check_artifact(&path).unwrap(), Completion::NoArtifact);
    }

    #[test]
    fn prose_brackets_are_not_checkboxes() {
        let (_dir, path) = write_artifact("see [ ] in the middle of a line\n- [x] real item\n");
        assert_eq!(check_artifact(&path).unwrap(), Completion::Complete);
    }

    #[test]
    fn empty_artifact_is_complete() {
        let (_dir, path) = write_artifact("");
        assert_eq!(check_artifact(&path).unwrap(), Completion::Complete);
    }
}
