//! Git CLI invocation layer
//!
//! All version-control operations shell out to the system `git` binary so that
//! credential helpers, submodule handling, and pull-request ref namespaces
//! behave exactly as they do for a human operator. Command output is captured
//! and carried inside [`ToolError`] on failure.
//!
//! Commit history is exported with an explicit field/record-separator format
//! (ASCII unit separator between fields, record separator between commits),
//! which survives arbitrary subject lines without any escaping.

use crate::error::{ParseError, ToolError};
use crate::history::{GitLogPerson, GitLogRecord};
use chrono::{DateTime, FixedOffset};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// ASCII unit separator, placed between fields of one record
pub const FIELD_SEPARATOR: char = '\u{1f}';

/// ASCII record separator, placed after each exported commit
pub const RECORD_SEPARATOR: char = '\u{1e}';

/// Per-commit export template: hash, parent(s), subject, author, authored
/// date, committer, committed date
const LOG_EXPORT_FORMAT: &str =
    "--pretty=format:%H%x1f%P%x1f%s%x1f%aN%x1f%aE%x1f%aD%x1f%cN%x1f%cE%x1f%cD%x1e";

/// Single-commit export template used for pull-request heads
const PR_HEAD_FORMAT: &str = "--pretty=format:%s%x1f%aD";

/// Refspec mapping all pull-request heads into local tracking refs
const PR_FETCH_REFSPEC: &str = "+refs/pull/*/head:refs/remotes/origin/pr-head/*";

/// Run an external command, capturing stdout and stderr
///
/// On a non-zero exit the combined output travels with the error so callers
/// can surface the tool's own diagnostics.
pub(crate) async fn run_command(
    phase: &str,
    program: &str,
    args: &[&str],
    cwd: &Path,
    envs: &[(&str, &str)],
) -> Result<String, ToolError> {
    let command_line = format!("{} {}", program, args.join(" "));
    tracing::debug!("[{}] running `{}` in {}", phase, command_line, cwd.display());

    let output = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .envs(envs.iter().copied())
        .output()
        .await
        .map_err(|e| ToolError::Launch {
            phase: phase.to_string(),
            command: command_line.clone(),
            reason: e.to_string(),
        })?;

    if !output.status.success() {
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        return Err(ToolError::Failed {
            phase: phase.to_string(),
            command: command_line,
            status: output.status.to_string(),
            output: combined,
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Handle on the single mutable working tree
///
/// The tree is always at exactly one checked-out ref; every mutation goes
/// through `&mut self` so ownership of the checkout is enforced by whatever
/// lock guards the handle.
#[derive(Debug)]
pub struct WorkingTree {
    dir: PathBuf,
}

impl WorkingTree {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether a checkout already exists on disk
    pub fn exists(&self) -> bool {
        self.dir.exists()
    }

    /// Clone a fresh working tree, then initialize submodules recursively
    pub async fn clone_from(
        clone_url: &str,
        parent_dir: &Path,
        dir_name: &str,
    ) -> Result<Self, ToolError> {
        run_command(
            "clone sources",
            "git",
            &["clone", clone_url, dir_name],
            parent_dir,
            &[],
        )
        .await?;

        let tree = Self::new(parent_dir.join(dir_name));
        tree.git("clone sources", &["submodule", "sync"]).await?;
        tree.git(
            "clone sources",
            &["submodule", "update", "--init", "--recursive"],
        )
        .await?;
        Ok(tree)
    }

    async fn git(&self, phase: &str, args: &[&str]) -> Result<String, ToolError> {
        run_command(phase, "git", args, &self.dir, &[]).await
    }

    pub async fn checkout(&mut self, reference: &str) -> Result<(), ToolError> {
        self.git("checkout", &["checkout", reference]).await?;
        Ok(())
    }

    pub async fn pull(&mut self) -> Result<(), ToolError> {
        self.git("pull", &["pull"]).await?;
        Ok(())
    }

    pub async fn submodule_sync(&mut self) -> Result<(), ToolError> {
        self.git("submodule sync", &["submodule", "sync"]).await?;
        Ok(())
    }

    pub async fn submodule_update(&mut self) -> Result<(), ToolError> {
        self.git("submodule update", &["submodule", "update", "--recursive"])
            .await?;
        Ok(())
    }

    /// Fetch all pull-request head refs into local tracking refs, metadata
    /// only (no submodule recursion)
    pub async fn fetch_pull_request_refs(&mut self) -> Result<(), ToolError> {
        self.git(
            "fetch pull requests",
            &["fetch", "origin", PR_FETCH_REFSPEC, "--no-recurse-submodules"],
        )
        .await?;
        Ok(())
    }

    /// List refs advertised by the origin remote
    pub async fn list_remote_refs(&self) -> Result<String, ToolError> {
        self.git("list remote refs", &["ls-remote", "origin"]).await
    }

    /// Export the full history of the current checkout in separator format
    pub async fn export_log(&self) -> Result<String, ToolError> {
        self.git("commit history export", &["log", LOG_EXPORT_FORMAT])
            .await
    }

    /// Export subject and authored date of a single commit
    pub async fn export_single_commit(&self, revision: &str) -> Result<String, ToolError> {
        self.git(
            "single commit export",
            &["log", "-n", "1", PR_HEAD_FORMAT, revision],
        )
        .await
    }

    /// Hash of the most recent commit at-or-before the current checkout that
    /// touched the given path
    pub async fn most_recent_commit_touching(&self, path: &str) -> Result<String, ToolError> {
        let out = self
            .git(
                "path-scoped log",
                &["log", "-1", "--pretty=format:%H", "--", path],
            )
            .await?;
        Ok(out.trim().to_string())
    }

    /// Run a repository script through bash with the given extra environment
    pub async fn run_script(
        &self,
        phase: &str,
        script: &Path,
        envs: &[(&str, &str)],
    ) -> Result<String, ToolError> {
        let script = script.to_string_lossy().into_owned();
        run_command(phase, "bash", &[script.as_str()], &self.dir, envs).await
    }
}

/// Parse a git RFC-2822 date string (`%aD` / `%cD`)
pub fn parse_git_date(value: &str) -> Result<DateTime<FixedOffset>, ParseError> {
    DateTime::parse_from_rfc2822(value.trim()).map_err(|e| ParseError::Timestamp {
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Parse the separator-format history export into records
///
/// The raw date strings are discarded once parsed; the timestamps are
/// canonical from here on.
pub fn parse_log_export(raw: &str) -> Result<Vec<GitLogRecord>, ParseError> {
    let mut records = Vec::new();
    for chunk in raw.split(RECORD_SEPARATOR) {
        let chunk = chunk.trim();
        if chunk.is_empty() {
            continue;
        }
        let fields: Vec<&str> = chunk.split(FIELD_SEPARATOR).collect();
        if fields.len() != 9 {
            return Err(ParseError::FieldCount {
                expected: 9,
                actual: fields.len(),
            });
        }
        records.push(GitLogRecord {
            commit_hash: fields[0].to_string(),
            parent_commit_hash: fields[1].to_string(),
            subject: fields[2].to_string(),
            author: GitLogPerson {
                name: fields[3].to_string(),
                email: fields[4].to_string(),
            },
            authored: parse_git_date(fields[5])?,
            committer: GitLogPerson {
                name: fields[6].to_string(),
                email: fields[7].to_string(),
            },
            committed: parse_git_date(fields[8])?,
        });
    }
    Ok(records)
}

/// Parse the single-commit export for a pull-request head
pub fn parse_pr_head_export(raw: &str) -> Result<(String, DateTime<FixedOffset>), ParseError> {
    let fields: Vec<&str> = raw.trim().split(FIELD_SEPARATOR).collect();
    if fields.len() != 2 {
        return Err(ParseError::FieldCount {
            expected: 2,
            actual: fields.len(),
        });
    }
    Ok((fields[0].to_string(), parse_git_date(fields[1])?))
}

/// Pull-request refs advertised by the remote
#[derive(Debug, Default)]
pub struct PullRequestRefs {
    /// PR numbers with a provider-synthesized merge ref (mergeable at last check)
    pub mergeable: HashSet<u64>,
    /// PR number -> head commit hash
    pub heads: HashMap<u64, String>,
}

/// Classify `ls-remote` output lines
///
/// `refs/pull/<N>/merge` marks PR N as currently mergeable;
/// `refs/pull/<N>/head` records its head commit. Everything else is ignored.
pub fn classify_remote_refs(raw: &str) -> PullRequestRefs {
    let mut refs = PullRequestRefs::default();
    for line in raw.lines() {
        let Some((hash, reference)) = line.split_once('\t') else {
            continue;
        };
        let Some(rest) = reference.strip_prefix("refs/pull/") else {
            continue;
        };
        let Some(number) = rest.split('/').next().and_then(|n| n.parse::<u64>().ok()) else {
            continue;
        };
        if reference.ends_with("/merge") {
            tracing::debug!("detected (at one point) mergeable PR #{}", number);
            refs.mergeable.insert(number);
        } else if reference.ends_with("/head") {
            refs.heads.insert(number, hash.to_string());
        }
    }
    refs
}

#[cfg(test)]
mod tests {
    use super::*;

    const US: char = FIELD_SEPARATOR;
    const RS: char = RECORD_SEPARATOR;

    fn export_record(hash: &str, subject: &str) -> String {
        format!(
            "{h}{us}{h}^{us}{s}{us}Alice{us}alice@example.com{us}Mon, 3 Jun 2024 10:00:00 +0200{us}Bob{us}bob@example.com{us}Mon, 3 Jun 2024 11:30:00 +0200{rs}",
            h = hash,
            s = subject,
            us = US,
            rs = RS,
        )
    }

    #[test]
    fn test_parse_log_export() {
        let raw = format!(
            "{}\n{}",
            export_record("aaa111", "First commit"),
            export_record("bbb222", "Second commit")
        );
        let records = parse_log_export(&raw).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].commit_hash, "aaa111");
        assert_eq!(records[0].parent_commit_hash, "aaa111^");
        assert_eq!(records[0].subject, "First commit");
        assert_eq!(records[0].author.name, "Alice");
        assert_eq!(records[0].committer.email, "bob@example.com");
        assert_eq!(records[1].commit_hash, "bbb222");
        assert_eq!(
            records[0].committed - records[0].authored,
            chrono::Duration::minutes(90)
        );
    }

    #[test]
    fn test_parse_log_export_subject_with_quotes_and_braces() {
        let raw = export_record("ccc333", r#"Fix "quoted" {braced}, with commas"#);
        let records = parse_log_export(&raw).unwrap();
        assert_eq!(records[0].subject, r#"Fix "quoted" {braced}, with commas"#);
    }

    #[test]
    fn test_parse_log_export_empty_input() {
        assert!(parse_log_export("").unwrap().is_empty());
        assert!(parse_log_export("\n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_log_export_field_count_mismatch() {
        let raw = format!("aaa{us}bbb{rs}", us = US, rs = RS);
        assert!(matches!(
            parse_log_export(&raw),
            Err(ParseError::FieldCount {
                expected: 9,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_parse_log_export_bad_date() {
        let raw = export_record("ddd444", "subject").replace("Mon, 3 Jun 2024 10:00:00 +0200", "yesterday");
        assert!(matches!(
            parse_log_export(&raw),
            Err(ParseError::Timestamp { .. })
        ));
    }

    #[test]
    fn test_parse_git_date_rfc2822() {
        let date = parse_git_date("Thu, 7 Apr 2005 22:13:13 +0200").unwrap();
        assert_eq!(date.timezone().local_minus_utc(), 7200);
    }

    #[test]
    fn test_parse_pr_head_export() {
        let raw = format!("Add limbo mode{}Mon, 3 Jun 2024 10:00:00 +0200", US);
        let (subject, authored) = parse_pr_head_export(&raw).unwrap();
        assert_eq!(subject, "Add limbo mode");
        assert_eq!(authored, parse_git_date("Mon, 3 Jun 2024 10:00:00 +0200").unwrap());
    }

    #[test]
    fn test_parse_pr_head_export_malformed() {
        assert!(parse_pr_head_export("no separators here").is_err());
    }

    #[tokio::test]
    async fn test_run_command_failure_carries_command_line() {
        let cwd = std::env::temp_dir();
        let err = run_command("ref lookup", "git", &["rev-parse", "--nope"], &cwd, &[])
            .await
            .unwrap_err();
        match err {
            ToolError::Failed { phase, command, .. } => {
                assert_eq!(phase, "ref lookup");
                assert_eq!(command, "git rev-parse --nope");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_run_command_launch_failure() {
        let cwd = std::env::temp_dir();
        let err = run_command("launch", "definitely-not-a-real-binary", &["--version"], &cwd, &[])
            .await
            .unwrap_err();
        match err {
            ToolError::Launch { command, .. } => {
                assert_eq!(command, "definitely-not-a-real-binary --version");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_classify_remote_refs() {
        let raw = "\
abc111\trefs/heads/trunk
abc222\trefs/pull/17/head
abc333\trefs/pull/17/merge
abc444\trefs/pull/23/head
abc555\trefs/tags/v1.0
not-a-ref-line
abc666\trefs/pull/not-a-number/head
";
        let refs = classify_remote_refs(raw);
        assert_eq!(refs.heads.len(), 2);
        assert_eq!(refs.heads.get(&17).map(String::as_str), Some("abc222"));
        assert_eq!(refs.heads.get(&23).map(String::as_str), Some("abc444"));
        assert!(refs.mergeable.contains(&17));
        assert!(!refs.mergeable.contains(&23));
    }
}
