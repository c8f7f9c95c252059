//! The Sources Manager
//!
//! One component coordinating working-tree mutation, commit-history
//! reconciliation, and build execution. Exactly one working tree exists
//! process-wide; a single mutex over the [`WorkingTree`] handle serializes
//! every operation that touches it. The commit log sits behind its own
//! read-write lock and is only ever replaced wholesale, so concurrent queries
//! observe either the fully-old or the fully-new log, never an intermediate
//! state.

use crate::archive::{ArchiveKind, ArchiveStore};
use crate::config::Config;
use crate::error::Result;
use crate::git::{self, WorkingTree};
use crate::history::{self, CommitLog, GitLogRecord};
use crate::paths::{Layout, SOURCES_DIR_NAME};
use crate::pipeline::{self, Progress};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};

/// The one fixed repository file whose changes force reseeding of benchmark
/// shards
pub const SEEDER_SOURCE_PATH: &str = "tools/shard-seeder/shard-seeder.cpp";

/// Manager of the shared working tree, the reconciled commit log, and the
/// archive key spaces
///
/// Cheap to clone; clones share the same working tree, lock, and log.
#[derive(Clone)]
pub struct SourcesManager {
    config: Arc<Config>,
    layout: Layout,
    store: ArchiveStore,
    tree: Arc<Mutex<WorkingTree>>,
    log: Arc<RwLock<CommitLog>>,
}

impl SourcesManager {
    pub fn new(config: Config) -> Self {
        let layout = Layout::new(config.data_dir.clone());
        let store = ArchiveStore::new(layout.clone());
        let tree = WorkingTree::new(layout.sources_dir());
        Self {
            config: Arc::new(config),
            layout,
            store,
            tree: Arc::new(Mutex::new(tree)),
            log: Arc::new(RwLock::new(CommitLog::default())),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Clone the working tree if it does not exist yet, otherwise bring the
    /// mainline branch up to date; then rebuild the commit log
    pub async fn ensure_sources_updated(&self) -> Result<()> {
        {
            let mut tree = self.tree.lock().await;
            if !tree.exists() {
                self.clone_sources(&mut tree).await?;
            } else {
                self.update_sources(&mut tree).await?;
            }
        }
        self.synchronize().await
    }

    async fn clone_sources(&self, tree: &mut WorkingTree) -> Result<()> {
        self.config.validate()?;
        let clone_url = self.config.clone_url()?;
        tokio::fs::create_dir_all(self.layout.root()).await?;
        tracing::info!("cloning sources into {}", self.layout.sources_dir().display());
        *tree = WorkingTree::clone_from(&clone_url, self.layout.root(), SOURCES_DIR_NAME).await?;
        Ok(())
    }

    async fn update_sources(&self, tree: &mut WorkingTree) -> Result<()> {
        tree.checkout(&self.config.main_branch).await?;
        tree.pull().await?;
        Ok(())
    }

    /// Rebuild the commit log from mainline history plus pull-request
    /// activity
    ///
    /// All-or-nothing: the stored log is only replaced after every step has
    /// succeeded; any failure leaves the previous log authoritative. Runs
    /// under the global lock for its full duration.
    pub async fn synchronize(&self) -> Result<()> {
        let mut tree = self.tree.lock().await;

        let raw = tree.export_log().await?;
        let mainline = git::parse_log_export(&raw)?;

        tree.fetch_pull_request_refs().await?;
        let refs = git::classify_remote_refs(&tree.list_remote_refs().await?);

        let now = Utc::now();
        let mut pr_records = Vec::new();
        for (number, head) in &refs.heads {
            let mergeable = refs.mergeable.contains(number);
            // A single broken PR head must not take down the whole rebuild.
            let exported = match tree.export_single_commit(head).await {
                Ok(out) => out,
                Err(e) => {
                    tracing::warn!("git log for PR {} failed: {}", number, e);
                    continue;
                }
            };
            let (subject, authored) = match git::parse_pr_head_export(&exported) {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::warn!("parsing log entry for PR {} failed: {}", number, e);
                    continue;
                }
            };
            if history::within_retention(authored, mergeable, now) {
                pr_records.push(GitLogRecord::for_pull_request(
                    *number, head, &subject, authored,
                ));
            }
        }

        let rebuilt = history::splice(mainline, pr_records);
        let mut log = self.log.write().await;
        *log = CommitLog::new(rebuilt);
        tracing::info!("commit log rebuilt with {} records", log.len());
        Ok(())
    }

    /// Windowed query over the current commit log
    ///
    /// With `include_oldest` the single oldest record is appended regardless
    /// of the window.
    pub async fn get_git_log(
        &self,
        offset: usize,
        limit: usize,
        include_oldest: bool,
    ) -> Result<Vec<GitLogRecord>> {
        Ok(self.log.read().await.window(offset, limit, include_oldest)?)
    }

    /// Membership test over the current log by exact hash match
    pub async fn commit_exists(&self, hash: &str) -> bool {
        self.log.read().await.contains(hash)
    }

    /// Compile the given commit and package the output into the binary
    /// archive keyed by (hash, profiling)
    ///
    /// Idempotent: if the target archive already exists the call succeeds
    /// immediately without touching the checkout. The optional progress
    /// channel receives coarse checkpoints (0-100) and is closed exactly
    /// once, on success and failure alike, with 100 always the final value.
    pub async fn compile(
        &self,
        hash: &str,
        profiling: bool,
        progress_tx: Option<mpsc::UnboundedSender<f64>>,
    ) -> Result<()> {
        let progress = Progress::new(progress_tx);
        let result = self.compile_locked(hash, profiling, &progress).await;
        progress.report(100.0);
        result
    }

    async fn compile_locked(
        &self,
        hash: &str,
        profiling: bool,
        progress: &Progress,
    ) -> Result<()> {
        progress.report(1.0);
        let mut tree = self.tree.lock().await;
        progress.report(2.0);

        let destination = self.store.path(hash, ArchiveKind::Binary { profiling })?;
        if destination.exists() {
            tracing::info!(
                "[compile {}-{}] binary archive already exists, skipping build",
                hash,
                profiling
            );
            return Ok(());
        }

        pipeline::run_build(&mut tree, &destination, hash, profiling, progress).await
    }

    /// Package a snapshot of the working tree at the given commit into the
    /// source archive key space; a no-op if the archive already exists
    pub async fn make_commit_archive(&self, hash: &str) -> Result<()> {
        let mut tree = self.tree.lock().await;

        let destination = self.store.path(hash, ArchiveKind::Source)?;
        if destination.exists() {
            return Ok(());
        }

        tree.checkout(hash).await?;
        tree.submodule_sync().await?;
        tree.submodule_update().await?;
        ArchiveStore::create(tree.dir(), &destination)
    }

    /// Bytes of a previously created source archive
    pub fn read_commit_archive(&self, hash: &str) -> Result<Vec<u8>> {
        self.store.read(hash, ArchiveKind::Source)
    }

    /// Bytes of a previously created binary archive
    pub fn read_binary_archive(&self, hash: &str, profiling: bool) -> Result<Vec<u8>> {
        self.store.read(hash, ArchiveKind::Binary { profiling })
    }

    /// Find the most recent commit at-or-before `commit_hash` that changed
    /// the shard-seeder source
    ///
    /// The working tree is restored to the mainline branch on every exit
    /// path; when both the lookup and the restore fail, the lookup error
    /// wins and the restore failure is logged.
    pub async fn find_most_recent_commit_changing_seeder(
        &self,
        commit_hash: &str,
    ) -> Result<String> {
        let mut tree = self.tree.lock().await;

        tree.checkout(commit_hash).await?;
        let located = tree.most_recent_commit_touching(SEEDER_SOURCE_PATH).await;
        let restored = tree.checkout(&self.config.main_branch).await;

        match (located, restored) {
            (Ok(hash), Ok(())) => Ok(hash),
            (Ok(_), Err(restore_err)) => Err(restore_err.into()),
            (Err(e), Ok(())) => Err(e.into()),
            (Err(e), Err(restore_err)) => {
                tracing::warn!(
                    "failed to restore {} after seeder lookup: {}",
                    self.config.main_branch,
                    restore_err
                );
                Err(e.into())
            }
        }
    }
}
