//! Projector flows: pull, push, retract, build and mount.
//!
//! Everything here composes the overlay, the remote resolver, the rewriter
//! and the build trigger over one project and one transport.

pub mod inspect;
pub mod live;

use crate::build::{BuildContext, TriggerOptions, TriggerReport, find_build_context, trigger_build};
use crate::config::{ConfigStore, HoloEnv, ProjectConfig, TransportKind, parse_host_target};
use crate::errors::{ErrorCode, HoloError, Result};
use crate::monitor::LogMonitor;
use crate::overlay::{OverlayLayout, OverlayStore, PathZone, RetractOutcome};
use crate::resolver::candidates::{CandidateDiff, candidate_diffs};
use crate::resolver::{DependencyMount, ResolveReport, SelectionWarning};
use crate::rewriter::{RewriteOutcome, RewriteWarning, Rewriter};
use crate::transport::{HostTransport, Transport};
use crate::util::{absolutize, is_header, join_command, path_string, quote};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use live::is_control_file;

/// Local mirror of the remote build log, kept outside the Hologram.
pub const MIRROR_LOG: &str = ".ddd/run/build.log";

#[derive(Debug, Clone)]
pub struct PullReport {
    pub remote_path: String,
    pub local_path: PathBuf,
    pub report: ResolveReport,
    /// How many dependencies were requested into the OutsideWall.
    pub synced_dependencies: usize,
    /// `None` for headers and for files without a compile context.
    pub rewrite: Option<RewriteOutcome>,
    pub header: bool,
}

impl PullReport {
    pub fn selection_warnings(&self) -> &[SelectionWarning] {
        &self.report.warnings
    }

    /// Per-candidate flag differences, when the selection was ambiguous.
    pub fn candidate_diffs(&self) -> Vec<CandidateDiff> {
        match &self.report.compile_context {
            Some(ctx) if !self.report.warnings.is_empty() => candidate_diffs(&ctx.candidates),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PushReport {
    pub local_path: PathBuf,
    pub remote_path: String,
    pub trigger: Option<TriggerReport>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetractTarget {
    Path(PathBuf),
    All,
}

#[derive(Debug, Clone, Default)]
pub struct RetractReport {
    pub outcomes: Vec<RetractOutcome>,
    pub database_entries_removed: usize,
    pub pruned_dirs: usize,
}

#[derive(Debug, Clone)]
pub struct BuildReport {
    /// Set when a pre-build sync was requested and succeeded.
    pub synced: Option<PushReport>,
    pub trigger: TriggerReport,
}

#[derive(Debug, Clone, Default)]
pub struct RepairReport {
    pub system_includes: Vec<String>,
    pub warnings: Vec<RewriteWarning>,
}

/// One project bound to a transport.
pub struct Projector<T> {
    transport: T,
    store: ConfigStore,
    config: ProjectConfig,
    layout: OverlayLayout,
    env: HoloEnv,
}

impl Projector<HostTransport> {
    /// Find the project above `start` and connect with its configured transport.
    pub fn discover(start: &Path, env: HoloEnv) -> Result<Self> {
        let store = ConfigStore::discover(start)?;
        let config = store.load()?;
        let kind = env.transport.unwrap_or(config.transport);
        let transport = HostTransport::new(kind, &config.host_target);
        debug!(root = %store.root().display(), transport = %kind, "projector ready");
        Ok(Self::new(transport, store, config, env))
    }
}

impl<T: Transport> Projector<T> {
    pub fn new(transport: T, store: ConfigStore, config: ProjectConfig, env: HoloEnv) -> Self {
        let layout = OverlayLayout::from_config(store.root(), &config);
        Self {
            transport,
            store,
            config,
            layout,
            env,
        }
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn layout(&self) -> &OverlayLayout {
        &self.layout
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn env(&self) -> &HoloEnv {
        &self.env
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn overlay(&self) -> OverlayStore<'_, T> {
        OverlayStore::new(&self.layout, &self.transport)
    }

    fn rewriter(&self) -> Rewriter<'_> {
        Rewriter::new(&self.layout, &self.config.system_includes)
    }

    pub fn mirror_log_path(&self) -> PathBuf {
        self.layout.project_root().join(MIRROR_LOG)
    }

    /// Bring a remote file into the Hologram and register how it compiles.
    pub async fn pull(&self, input: &str, flags: &[String]) -> Result<PullReport> {
        let remote = self.layout.remote_path(input)?;
        if !self
            .transport
            .probe(&format!("test -f {}", quote(&remote)))
            .await?
        {
            return Err(HoloError::RemoteMissing { path: remote });
        }

        let local_path = self.overlay().project_from_remote(&remote).await?;
        info!(remote = %remote, local = %local_path.display(), "pulled into hologram");

        let report = self.resolve_full(&remote, flags).await;
        for warning in &report.warnings {
            warn!(code = %warning.code().code_string(), path = %remote, "{warning}");
        }
        if !report.missing.is_empty() {
            debug!(count = report.missing.len(), "includes not found on host");
        }

        let synced_dependencies = self.overlay().ghost_dependencies(&report.dependencies).await;

        let header = is_header(Path::new(&remote));
        let rewrite = match (&report.compile_context, header) {
            (_, true) => {
                info!(
                    path = %remote,
                    "header pulled; compile database unchanged (use 'holo focus <source>' for clangd)"
                );
                None
            }
            (Some(ctx), false) => {
                let outcome = self.rewriter().upsert(&ctx.entry(), &report.dependencies)?;
                for warning in &outcome.warnings {
                    warn!("{warning}");
                }
                Some(outcome)
            }
            (None, false) => {
                warn!(path = %remote, "no compile context found; compile database unchanged");
                None
            }
        };

        Ok(PullReport {
            remote_path: remote,
            local_path,
            report,
            synced_dependencies,
            rewrite,
            header,
        })
    }

    fn database_args(&self) -> String {
        self.config
            .compilation_dbs
            .iter()
            .map(|db| format!(" --db {}", quote(db)))
            .collect()
    }

    /// Run the resolver on the host for one file. Failures yield an empty report.
    async fn resolve_full(&self, remote: &str, flags: &[String]) -> ResolveReport {
        let dir = Path::new(remote)
            .parent()
            .map(path_string)
            .unwrap_or_else(|| self.layout.remote_root().to_string());
        let mut cmd = format!(
            "cd {} && {} --full {} --root {}{}",
            quote(&dir),
            self.config.resolver_command(),
            quote(remote),
            quote(self.layout.remote_root()),
            self.database_args()
        );
        if !flags.is_empty() {
            cmd.push_str(&format!(" --flags={}", quote(&join_command(flags))));
        }
        self.run_resolver(&cmd).await
    }

    async fn run_resolver(&self, cmd: &str) -> ResolveReport {
        let output = match self.transport.run(cmd).await {
            Ok(output) => output,
            Err(e) => {
                warn!(
                    code = %ErrorCode::TransportFailure.code_string(),
                    error = %e,
                    "resolver failed; continuing without compile context"
                );
                return ResolveReport::default();
            }
        };
        match serde_json::from_str(&output) {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "resolver returned invalid JSON; continuing without compile context");
                ResolveReport::default()
            }
        }
    }

    /// Send a Hologram file back to the host, optionally requesting a build.
    pub async fn push(&mut self, local: &Path, trigger: bool) -> Result<PushReport> {
        let local_path = absolutize(local)
            .map_err(|e| HoloError::io(format!("resolve {}", local.display()), e))?;
        let remote = self.layout.remote_path_for_local(&local_path)?;

        if let Some(parent) = Path::new(&remote).parent()
            && let Err(e) = self
                .transport
                .run(&format!("mkdir -p {}", quote(&path_string(parent))))
                .await
        {
            debug!(error = %e, "could not create remote parent directory");
        }
        self.transport.push(&local_path, &remote).await?;
        info!(local = %local_path.display(), remote = %remote, "pushed");

        let trigger = if trigger {
            let context = find_build_context(self.layout.hologram_root(), &local_path);
            Some(self.trigger(context.as_ref()).await?)
        } else {
            None
        };

        Ok(PushReport {
            local_path,
            remote_path: remote,
            trigger,
        })
    }

    /// Accept a path inside the Hologram, or one relative to the project
    /// root that names a Hologram file.
    fn hologram_target(&self, input: &Path) -> Result<PathBuf> {
        let path = absolutize(input)
            .map_err(|e| HoloError::io(format!("resolve {}", input.display()), e))?;
        if matches!(self.layout.classify(&path), PathZone::Elsewhere)
            && let Ok(rel) = path.strip_prefix(self.layout.project_root())
        {
            let candidate = self.layout.hologram_root().join(rel);
            if candidate.exists() {
                return Ok(candidate);
            }
        }
        Ok(path)
    }

    /// Remove files from the Hologram, restoring their OutsideWall copies.
    pub async fn retract(&self, target: RetractTarget) -> Result<RetractReport> {
        let all = target == RetractTarget::All;
        let files = match target {
            RetractTarget::Path(path) => vec![self.hologram_target(&path)?],
            RetractTarget::All => self.hologram_files(),
        };
        let mut report = RetractReport::default();
        if files.is_empty() {
            info!("nothing to retract");
            return Ok(report);
        }

        for file in &files {
            let outcome = self.overlay().retract(file).await?;
            info!(path = %file.display(), restore = ?outcome.restore, "retracted");
            report.outcomes.push(outcome);
        }

        let removed: HashSet<PathBuf> = files.into_iter().collect();
        match self.rewriter().remove_entries(&removed) {
            Ok(n) => report.database_entries_removed = n,
            Err(e) => warn!(error = %e, "could not clean compile database"),
        }
        if all {
            report.pruned_dirs = prune_empty_dirs(self.layout.hologram_root());
        }
        Ok(report)
    }

    fn hologram_files(&self) -> Vec<PathBuf> {
        let root = self.layout.hologram_root();
        let mut files: Vec<PathBuf> = WalkDir::new(root)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(walkdir::DirEntry::into_path)
            .filter(|p| !is_control_file(root, p))
            .collect();
        files.sort();
        files
    }

    /// Request a build for `context`; the config follows any context switch.
    pub async fn trigger(&mut self, context: Option<&BuildContext>) -> Result<TriggerReport> {
        let options = TriggerOptions {
            startup_delay: self.env.daemon_startup,
        };
        let report = trigger_build(
            &self.transport,
            &self.store,
            self.config.clone(),
            &self.layout,
            context,
            &options,
        )
        .await?;
        self.config = report.config.clone();
        Ok(report)
    }

    /// Build for the context of `context_from`, else `sync`, else `cwd`;
    /// pushing `sync` first when given. A failed pre-build sync is logged.
    pub async fn build(
        &mut self,
        context_from: Option<&Path>,
        sync: Option<&Path>,
        cwd: &Path,
    ) -> Result<BuildReport> {
        let synced = match sync {
            Some(path) => match self.push(path, false).await {
                Ok(report) => Some(report),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "pre-build sync failed");
                    None
                }
            },
            None => None,
        };

        let start = context_from.or(sync).unwrap_or(cwd);
        let start = absolutize(start)
            .map_err(|e| HoloError::io(format!("resolve {}", start.display()), e))?;
        let context = find_build_context(self.layout.hologram_root(), &start);
        if let Some(ctx) = &context {
            info!(context = %ctx.relative().display(), "build context derived");
        }
        let trigger = self.trigger(context.as_ref()).await?;
        Ok(BuildReport { synced, trigger })
    }

    /// Materialize every external include tree the host's databases reference.
    pub async fn mount_externals(&self) -> Result<Vec<PathBuf>> {
        let root = self.layout.remote_root();
        let cmd = format!(
            "cd {q} && {} --mounts --root {q}{}",
            self.config.resolver_command(),
            self.database_args(),
            q = quote(root)
        );
        let report = self.run_resolver(&cmd).await;
        if report.mounts.is_empty() {
            info!("no external mounts discovered");
            return Ok(Vec::new());
        }

        let mut mounted = Vec::new();
        for mount in &report.mounts {
            mounted.push(self.mount(mount).await?);
        }
        Ok(mounted)
    }

    async fn mount(&self, mount: &DependencyMount) -> Result<PathBuf> {
        self.overlay().mount(mount).await
    }

    /// Capture the host compiler's default include directories into the
    /// OutsideWall and re-inject them into every local entry.
    pub async fn repair_headers(&mut self) -> Result<RepairReport> {
        let query = self.config.system_include_query();
        let q = quote(&query);
        let output = self.transport.run(&format!("chmod +x {q} && {q}")).await?;
        let includes: Vec<String> = output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        if includes.is_empty() {
            warn!("host reported no system include directories");
            return Ok(RepairReport::default());
        }

        for inc in &includes {
            if let Err(e) = self
                .transport
                .pull_files(std::slice::from_ref(inc), self.layout.outside_wall_root(), true)
                .await
            {
                warn!(path = %inc, error = %e, "failed to sync system include");
            }
        }
        info!(count = includes.len(), "synced system include directories");

        self.config.system_includes = includes.clone();
        self.store.save(&self.config)?;
        let warnings = self.rewriter().refresh_system_includes()?;
        for warning in &warnings {
            warn!("{warning}");
        }
        Ok(RepairReport {
            system_includes: includes,
            warnings,
        })
    }
}

impl<T: Transport + Clone> Projector<T> {
    /// Monitor over the log of the root the daemon currently serves.
    pub fn monitor(&self) -> LogMonitor<T> {
        LogMonitor::new(self.transport.clone(), self.config.remote_log_path())
            .with_backoff(self.env.reconnect_backoff)
    }
}

/// Delete empty directories below `root`, deepest first.
fn prune_empty_dirs(root: &Path) -> usize {
    let mut pruned = 0;
    for entry in WalkDir::new(root)
        .min_depth(1)
        .contents_first(true)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_dir())
    {
        let empty = std::fs::read_dir(entry.path()).is_ok_and(|mut it| it.next().is_none());
        if empty && std::fs::remove_dir(entry.path()).is_ok() {
            pruned += 1;
        }
    }
    pruned
}

/// Create the project skeleton under `root` and write its config.
///
/// `host_target` may carry the root as `user@host:/path`; an explicit
/// `remote_root` wins over it.
pub fn init_project(
    root: &Path,
    host_target: &str,
    remote_root: Option<&str>,
    transport: TransportKind,
    remote_mission_root: Option<String>,
) -> Result<(ConfigStore, ProjectConfig)> {
    let (host, embedded_root) = parse_host_target(host_target);
    let remote_root = remote_root
        .map(str::to_string)
        .or(embedded_root)
        .unwrap_or_default();
    let remote_root = match remote_root.trim_end_matches('/') {
        "" if remote_root.starts_with('/') => "/".to_string(),
        trimmed => trimmed.to_string(),
    };

    let store = ConfigStore::at(root);
    let mut config = ProjectConfig::new(host, remote_root);
    config.transport = transport;
    config.remote_mission_root = remote_mission_root;
    config.validate(&store.path())?;

    for dir in [store.hologram_dir(), store.outside_wall_dir()] {
        std::fs::create_dir_all(&dir)
            .map_err(|e| HoloError::io(format!("create {}", dir.display()), e))?;
    }
    store.save(&config)?;
    info!(
        host = %config.host_target,
        remote_root = %config.remote_root,
        "hologram initialized"
    );
    Ok((store, config))
}
