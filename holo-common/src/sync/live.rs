//! Live mode: push Hologram edits as they happen while following the build log.

use super::Projector;
use crate::build::find_build_context;
use crate::errors::Result;
use crate::monitor::{LogMonitor, MonitorMode};
use crate::transport::Transport;
use crate::{CONFIG_FILE, COMPILE_DB_FILE};
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::inspect::CLANGD_FILE;

/// Files under the Hologram root that belong to the projector, not the host.
const CONTROL_FILES: &[&str] = &[COMPILE_DB_FILE, CONFIG_FILE, CLANGD_FILE];

/// Whether `path` is a projector control file at the top of `hologram_root`.
pub fn is_control_file(hologram_root: &Path, path: &Path) -> bool {
    path.parent() == Some(hologram_root)
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| CONTROL_FILES.contains(&n))
}

/// Modification-time poller over the Hologram.
#[derive(Debug)]
pub struct HologramWatcher {
    root: PathBuf,
    mtimes: HashMap<PathBuf, SystemTime>,
}

impl HologramWatcher {
    /// Start watching; files present now form the baseline.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let mut watcher = Self {
            root: root.into(),
            mtimes: HashMap::new(),
        };
        let baseline = watcher.scan().len();
        debug!(root = %watcher.root.display(), files = baseline, "watch baseline");
        watcher
    }

    /// Files that are new or whose mtime moved forward since the last scan.
    pub fn scan(&mut self) -> Vec<PathBuf> {
        let mut changed = BTreeSet::new();
        for entry in WalkDir::new(&self.root)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|e| e.file_type().is_file())
        {
            let path = entry.path();
            if is_control_file(&self.root, path) {
                continue;
            }
            let Ok(mtime) = entry
                .metadata()
                .map_err(std::io::Error::from)
                .and_then(|m| m.modified()) else {
                continue;
            };
            match self.mtimes.get(path) {
                Some(seen) if *seen >= mtime => {}
                _ => {
                    self.mtimes.insert(path.to_path_buf(), mtime);
                    changed.insert(path.to_path_buf());
                }
            }
        }
        changed.into_iter().collect()
    }
}

impl<T: Transport + Clone + 'static> Projector<T> {
    /// Live mode until Ctrl-C.
    pub async fn live(&mut self, auto_build: bool) -> Result<()> {
        self.live_until(auto_build, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "cannot listen for interrupt");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Follow the build log in a background task and push changed Hologram
    /// files until `shutdown` resolves.
    pub async fn live_until<F>(&mut self, auto_build: bool, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mirror = self.mirror_log_path();
        info!(mirror = %mirror.display(), "mirroring build log");
        let monitor = LogMonitor::new(self.transport().clone(), self.config().remote_log_path())
            .with_mirror(mirror)
            .with_backoff(self.env().reconnect_backoff);
        let radio = tokio::spawn(async move {
            monitor
                .run_until(MonitorMode::Follow, std::future::pending())
                .await
        });

        let hologram_root = self.layout().hologram_root().to_path_buf();
        if !hologram_root.is_dir() {
            warn!(path = %hologram_root.display(), "hologram directory missing; run 'holo init'");
        }
        let mut watcher = HologramWatcher::new(&hologram_root);
        let poll = self.env().poll_interval;
        let debounce = self.env().debounce;

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                () = tokio::time::sleep(poll) => {}
            }
            let mut batch: BTreeSet<PathBuf> = watcher.scan().into_iter().collect();
            if batch.is_empty() {
                continue;
            }
            info!(count = batch.len(), "changes detected; debouncing");
            tokio::time::sleep(debounce).await;
            batch.extend(watcher.scan());

            self.push_batch(&batch, auto_build).await;
        }

        radio.abort();
        info!("live mode stopped");
        Ok(())
    }

    async fn push_batch(&mut self, batch: &BTreeSet<PathBuf>, auto_build: bool) {
        let mut first = None;
        for path in batch.iter().filter(|p| p.exists()) {
            match self.push(path, false).await {
                Ok(report) => {
                    info!(path = %path.display(), remote = %report.remote_path, "pushed");
                    first.get_or_insert(path);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "push failed"),
            }
        }

        let Some(first) = first else {
            return;
        };
        if !auto_build {
            info!("synced; run 'holo build' or use --auto-build to trigger");
            return;
        }
        let context = find_build_context(self.layout().hologram_root(), first);
        match self.trigger(context.as_ref()).await {
            Ok(report) => info!(root = %report.target_root, "synced and triggered"),
            Err(e) => warn!(error = %e, "build trigger failed"),
        }
    }
}
