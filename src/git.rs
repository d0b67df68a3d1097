//! Git operations — an external collaborator of spec.md §1/§6. Everything
//! that touches the repository's history goes through one shell-out point
//! so a mock implementation can stand in during tests.

use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum GitError {
    #[error("failed to spawn git: {0}")]
    Spawn(String),
    #[error("git {args} exited with status {status}: {stderr}")]
    NonZeroExit { args: String, status: i32, stderr: String },
}

pub type GitResult<T> = Result<T, GitError>;

/// A line-stat summary of a diff (spec.md §6 `DiffStat*` operations).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffStat {
    pub files_changed: u32,
    pub insertions: u32,
    pub deletions: u32,
}

/// `GitCommitter` — the subset of git plumbing the executor, gate, and
/// journal need: committing a phase's work, inspecting diffs, and
/// resetting when a phase is rejected (spec.md §6).
#[async_trait]
pub trait GitCommitter: Send + Sync {
    /// Stages everything under `repo_root` and commits with `message`.
    /// Returns the new commit hash, or `None` if there was nothing to
    /// commit.
    async fn commit_phase(&self, repo_root: &str, message: &str) -> GitResult<Option<String>>;

    /// Full diff of the working tree against `HEAD`.
    async fn diff(&self, repo_root: &str) -> GitResult<String>;

    /// Diff introduced by the last commit.
    async fn diff_last_commit(&self, repo_root: &str) -> GitResult<String>;

    /// `--stat` summary of the last commit.
    async fn diff_stat_last_commit(&self, repo_root: &str) -> GitResult<DiffStat>;

    /// Diff between two refs (e.g. a phase's pre-commit and post-commit
    /// hashes), for re-review or decomposition bookkeeping.
    async fn diff_range(&self, repo_root: &str, from: &str, to: &str) -> GitResult<String>;

    /// `--stat` summary between two refs.
    async fn diff_stat_range(&self, repo_root: &str, from: &str, to: &str) -> GitResult<DiffStat>;

    /// Hard-resets the working tree to `commit` — used when a gate
    /// rejects a phase and its changes must be discarded (spec.md §4.7).
    async fn reset_to(&self, repo_root: &str, commit: &str) -> GitResult<()>;

    /// The current `HEAD` commit hash.
    async fn head(&self, repo_root: &str) -> GitResult<String>;
}

/// Default [`GitCommitter`] backed by the system `git` binary, following
/// the same shell-out-and-check-status idiom as the teacher's worktree
/// management.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellGitCommitter;

impl ShellGitCommitter {
    async fn run(&self, repo_root: &str, args: &[&str]) -> GitResult<std::process::Output> {
        debug!(repo_root, args = ?args, "running git");
        let output = Command::new("git")
            .current_dir(repo_root)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| GitError::Spawn(e.to_string()))?;

        if !output.status.success() {
            return Err(GitError::NonZeroExit {
                args: args.join(" "),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }

    fn parse_diff_stat(raw: &str) -> DiffStat {
        // `git diff --shortstat` renders a single summary line like:
        // " 3 files changed, 42 insertions(+), 7 deletions(-)"
        let mut stat = DiffStat::default();
        for part in raw.split(',') {
            let part = part.trim();
            let Some(n) = part.split_whitespace().next().and_then(|s| s.parse::<u32>().ok()) else {
                continue;
            };
            if part.contains("file") {
                stat.files_changed = n;
            } else if part.contains("insertion") {
                stat.insertions = n;
            } else if part.contains("deletion") {
                stat.deletions = n;
            }
        }
        stat
    }
}

#[async_trait]
impl GitCommitter for ShellGitCommitter {
    async fn commit_phase(&self, repo_root: &str, message: &str) -> GitResult<Option<String>> {
        self.run(repo_root, &["add", "-A"]).await?;

        let status = self.run(repo_root, &["status", "--porcelain"]).await?;
        if String::from_utf8_lossy(&status.stdout).trim().is_empty() {
            warn!(repo_root, "phase produced no changes to commit");
            return Ok(None);
        }

        self.run(repo_root, &["commit", "-m", message]).await?;
        let hash = self.head(repo_root).await?;
        Ok(Some(hash))
    }

    async fn diff(&self, repo_root: &str) -> GitResult<String> {
        let output = self.run(repo_root, &["diff", "HEAD"]).await?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn diff_last_commit(&self, repo_root: &str) -> GitResult<String> {
        let output = self.run(repo_root, &["diff", "HEAD~1", "HEAD"]).await?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn diff_stat_last_commit(&self, repo_root: &str) -> GitResult<DiffStat> {
        let output = self.run(repo_root, &["diff", "--shortstat", "HEAD~1", "HEAD"]).await?;
        Ok(Self::parse_diff_stat(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn diff_range(&self, repo_root: &str, from: &str, to: &str) -> GitResult<String> {
        let output = self.run(repo_root, &["diff", from, to]).await?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn diff_stat_range(&self, repo_root: &str, from: &str, to: &str) -> GitResult<DiffStat> {
        let output = self.run(repo_root, &["diff", "--shortstat", from, to]).await?;
        Ok(Self::parse_diff_stat(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn reset_to(&self, repo_root: &str, commit: &str) -> GitResult<()> {
        self.run(repo_root, &["reset", "--hard", commit]).await?;
        Ok(())
    }

    async fn head(&self, repo_root: &str) -> GitResult<String> {
        let output = self.run(repo_root, &["rev-parse", "HEAD"]).await?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_shortstat_line() {
        let stat = ShellGitCommitter::parse_diff_stat(" 3 files changed, 42 insertions(+), 7 deletions(-)");
        assert_eq!(stat, DiffStat { files_changed: 3, insertions: 42, deletions: 7 });
    }

    #[test]
    fn parses_insertions_only() {
        let stat = ShellGitCommitter::parse_diff_stat(" 1 file changed, 5 insertions(+)");
        assert_eq!(stat, DiffStat { files_changed: 1, insertions: 5, deletions: 0 });
    }
}
