//! Commit log model: records, pull-request retention windowing, the
//! positional splice, and windowed queries.
//!
//! Everything in this module is pure; the git layer feeds it and the manager
//! swaps the result in wholesale. The log is rebuilt on every synchronization
//! and is deliberately not deduplicated: a pull-request head that coincides
//! with an already-merged mainline commit can appear twice.

use crate::error::NotFoundError;
use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

/// Number of mainline records pinned at the top of the spliced log
pub const PINNED_MAINLINE_RECORDS: usize = 3;

/// Author or committer identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitLogPerson {
    pub name: String,
    pub email: String,
}

/// One entry of the reconciled commit log
///
/// Synthetic pull-request entries carry an empty parent hash and a committed
/// timestamp equal to the authored timestamp; they are display-only, not real
/// commits in the checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitLogRecord {
    #[serde(rename = "commit")]
    pub commit_hash: String,
    #[serde(rename = "parent")]
    pub parent_commit_hash: String,
    pub subject: String,
    pub author: GitLogPerson,
    pub authored: DateTime<FixedOffset>,
    pub committer: GitLogPerson,
    pub committed: DateTime<FixedOffset>,
}

impl GitLogRecord {
    /// Build the synthetic display entry for an open pull request
    pub fn for_pull_request(
        number: u64,
        head_commit: &str,
        subject: &str,
        authored: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            commit_hash: head_commit.to_string(),
            parent_commit_hash: String::new(),
            subject: format!("PR #{} - {}", number, subject),
            author: GitLogPerson::default(),
            authored,
            committer: GitLogPerson::default(),
            committed: authored,
        }
    }
}

/// Retention policy for pull-request entries
///
/// Include a PR iff it was authored within the last 48 hours, or it is
/// currently mergeable and was authored within the last 90 days.
pub fn within_retention(
    authored: DateTime<FixedOffset>,
    mergeable: bool,
    now: DateTime<Utc>,
) -> bool {
    let authored = authored.with_timezone(&Utc);
    authored > now - Duration::hours(48) || (mergeable && authored > now - Duration::days(90))
}

/// Assemble the final log from mainline history and retained PR entries
///
/// The first [`PINNED_MAINLINE_RECORDS`] mainline records stay on top in
/// original order, PR entries follow sorted newest-first by authored date, and
/// the rest of mainline history trails in original order. This is a positional
/// splice, not a timestamp merge.
pub fn splice(mainline: Vec<GitLogRecord>, mut pr_records: Vec<GitLogRecord>) -> Vec<GitLogRecord> {
    pr_records.sort_by(|a, b| b.authored.cmp(&a.authored));

    let pin = PINNED_MAINLINE_RECORDS.min(mainline.len());
    let mut log = mainline;
    let tail = log.split_off(pin);
    log.extend(pr_records);
    log.extend(tail);
    log
}

/// The reconciled, ordered commit log
#[derive(Debug, Clone, Default)]
pub struct CommitLog {
    records: Vec<GitLogRecord>,
}

impl CommitLog {
    pub fn new(records: Vec<GitLogRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Windowed query over the log
    ///
    /// An empty log yields an empty result without error. An offset at or past
    /// the end is an out-of-bounds failure. With `include_oldest` the single
    /// oldest record is appended regardless of the window, possibly duplicating
    /// a record already included.
    pub fn window(
        &self,
        offset: usize,
        limit: usize,
        include_oldest: bool,
    ) -> Result<Vec<GitLogRecord>, NotFoundError> {
        if self.records.is_empty() {
            return Ok(Vec::new());
        }
        if offset >= self.records.len() {
            return Err(NotFoundError::LogOutOfBounds {
                offset,
                length: self.records.len(),
            });
        }

        let end = offset.saturating_add(limit).min(self.records.len());
        let mut result = self.records[offset..end].to_vec();
        if include_oldest {
            if let Some(oldest) = self.records.last() {
                result.push(oldest.clone());
            }
        }
        Ok(result)
    }

    /// Membership test by exact commit hash
    pub fn contains(&self, hash: &str) -> bool {
        self.records.iter().any(|r| r.commit_hash == hash)
    }
}
