//! Multi-phase compile-and-package flow
//!
//! Each phase is a hard failure point; failures carry a phase-identifying
//! message plus the captured process output. Progress values are coarse
//! checkpoints on an observable stream, not a measured percentage.

use crate::archive::ArchiveStore;
use crate::error::{Result, ToolError};
use crate::git::WorkingTree;
use std::io;
use std::path::Path;
use tokio::sync::mpsc;
use walkdir::WalkDir;

/// Embedded protocol-proxy subtree staged into the packaged output when present
const RPC_PROXY_SUBTREE: &str = "src/parsec/agent/runners/evm/rpc_proxy";

/// Where the proxy contents land inside the packaged output: the runner
/// directory itself, without the trailing `rpc_proxy` component
const RPC_PROXY_STAGE_DIR: &str = "src/parsec/agent/runners/evm";

/// Progress reporter over an optional channel
///
/// The channel closes when the reporter is dropped, which the manager
/// guarantees happens exactly once per compile, on success and failure alike.
pub struct Progress {
    tx: Option<mpsc::UnboundedSender<f64>>,
}

impl Progress {
    pub fn new(tx: Option<mpsc::UnboundedSender<f64>>) -> Self {
        Self { tx }
    }

    /// Report a checkpoint; a gone receiver is not an error
    pub fn report(&self, value: f64) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(value);
        }
    }
}

/// Environment handed to setup scripts: release flag unless profiling
fn setup_env(profiling: bool) -> Vec<(&'static str, &'static str)> {
    if profiling {
        Vec::new()
    } else {
        vec![("BUILD_RELEASE", "1")]
    }
}

/// Environment handed to the main build script: exactly one mode flag
fn build_env(profiling: bool) -> [(&'static str, &'static str); 1] {
    if profiling {
        [("BUILD_PROFILING", "1")]
    } else {
        [("BUILD_RELEASE", "1")]
    }
}

/// Environment setup phase
///
/// Modern path first: run `install-build-tools.sh` then `setup-dependencies.sh`
/// when present; a present script failing is fatal. If either is absent, the
/// legacy `configure.sh` runs as well; its absence or failure is fatal.
pub(crate) async fn setup_environment(tree: &WorkingTree, profiling: bool) -> Result<()> {
    let scripts_dir = tree.dir().join("scripts");
    let env = setup_env(profiling);
    let mut modern_complete = true;

    for (name, phase) in [
        ("install-build-tools.sh", "build-environment setup"),
        ("setup-dependencies.sh", "dependency installation"),
    ] {
        let script = scripts_dir.join(name);
        if script.exists() {
            tree.run_script(phase, &script, &env).await?;
            tracing::info!("{} complete", phase);
        } else {
            modern_complete = false;
        }
    }

    if !modern_complete {
        tracing::info!("attempting to use legacy configuration");
        let script = scripts_dir.join("configure.sh");
        if !script.exists() {
            return Err(ToolError::ScriptMissing {
                phase: "legacy configuration".to_string(),
                path: script.display().to_string(),
            }
            .into());
        }
        tree.run_script("legacy configuration", &script, &env).await?;
        tracing::info!("legacy configuration complete");
    }

    Ok(())
}

/// Run the build phases against an already-locked working tree and package
/// the output into `destination`
///
/// The caller has already handled the idempotence short-circuit and owns the
/// progress channel lifecycle.
pub(crate) async fn run_build(
    tree: &mut WorkingTree,
    destination: &Path,
    commit_hash: &str,
    profiling: bool,
    progress: &Progress,
) -> Result<()> {
    tree.checkout(commit_hash).await?;
    tracing::info!("[compile {}-{}] checkout complete", commit_hash, profiling);
    progress.report(5.0);

    tree.submodule_sync().await?;
    tree.submodule_update().await?;
    tracing::info!(
        "[compile {}-{}] update submodules complete",
        commit_hash,
        profiling
    );
    progress.report(10.0);

    let build_dir = tree.dir().join("build");
    match tokio::fs::remove_dir_all(&build_dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    tracing::info!("[compile {}-{}] cleaned build directory", commit_hash, profiling);

    setup_environment(tree, profiling).await?;
    progress.report(50.0);

    let build_script = tree.dir().join("scripts").join("build.sh");
    tree.run_script("build", &build_script, &build_env(profiling))
        .await?;
    tracing::info!("[compile {}-{}] build script complete", commit_hash, profiling);
    progress.report(90.0);

    stage_rpc_proxy(tree.dir(), &build_dir)?;

    ArchiveStore::create(&build_dir, destination)?;
    Ok(())
}

/// Deep-copy the embedded protocol proxy into the packaged output tree when
/// the checkout carries one
fn stage_rpc_proxy(tree_dir: &Path, build_dir: &Path) -> Result<()> {
    let proxy = tree_dir.join(RPC_PROXY_SUBTREE);
    if !proxy.exists() {
        return Ok(());
    }
    tracing::info!("staging embedded RPC proxy into build output");
    copy_dir_all(&proxy, &build_dir.join(RPC_PROXY_STAGE_DIR))?;
    Ok(())
}

fn copy_dir_all(src: &Path, dst: &Path) -> io::Result<()> {
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let target = dst.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
