//! Build context tracking and remote daemon triggering.
//!
//! The build daemon on the host watches `<root>/.ddd/run/build.request`.
//! Which `<root>` it serves is fixed at launch via `PROJECT_ROOT`, so a build
//! for a different context restarts the daemon before touching the sentinel.

use crate::COMPILE_DB_FILE;
use crate::config::{ConfigStore, ProjectConfig};
use crate::errors::{ErrorCode, HoloError, Result};
use crate::overlay::OverlayLayout;
use crate::transport::Transport;
use crate::util::quote;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Files or directories that mark a directory as a build root.
pub const BUILD_MARKERS: &[&str] = &["Makefile", COMPILE_DB_FILE, ".ddd"];

/// Directory the daemon reads requests from and writes its log into.
pub const RUN_DIR: &str = ".ddd/run";

/// A build root below the Hologram root, relative to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildContext(pub PathBuf);

impl BuildContext {
    pub fn relative(&self) -> &Path {
        &self.0
    }
}

/// Nearest build root at or above `path`, stopping at the Hologram root.
///
/// Returns `None` when the nearest root is the Hologram root itself, when no
/// marker is found, or when `path` is outside the Hologram.
pub fn find_build_context(hologram_root: &Path, path: &Path) -> Option<BuildContext> {
    let start = if path.is_dir() { path } else { path.parent()? };
    if !start.starts_with(hologram_root) {
        return None;
    }
    for dir in start.ancestors() {
        if dir == hologram_root || !dir.starts_with(hologram_root) {
            return None;
        }
        if BUILD_MARKERS.iter().any(|marker| dir.join(marker).exists()) {
            let rel = dir.strip_prefix(hologram_root).ok()?;
            return Some(BuildContext(rel.to_path_buf()));
        }
    }
    None
}

#[derive(Debug, Clone)]
pub struct TriggerOptions {
    /// Pause after relaunching the daemon so it is watching before the touch.
    pub startup_delay: Duration,
}

impl Default for TriggerOptions {
    fn default() -> Self {
        Self {
            startup_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TriggerReport {
    pub target_root: String,
    pub previous_context: Option<String>,
    pub switched: bool,
    pub request_path: String,
    /// Config after the trigger; carries the new `last_context` on a switch.
    pub config: ProjectConfig,
}

/// Remote root a build for `context` runs in.
pub fn target_root(layout: &OverlayLayout, context: Option<&BuildContext>) -> String {
    match context {
        Some(ctx) => layout.remote_of_relative(ctx.relative()),
        None => layout.remote_root().to_string(),
    }
}

/// Request a build for `context`, restarting the daemon on a context switch.
pub async fn trigger_build<T: Transport>(
    transport: &T,
    store: &ConfigStore,
    mut config: ProjectConfig,
    layout: &OverlayLayout,
    context: Option<&BuildContext>,
    options: &TriggerOptions,
) -> Result<TriggerReport> {
    let target = target_root(layout, context);
    let previous = config.last_context.clone();
    let switched = previous.as_deref() != Some(target.as_str());

    if switched {
        info!(
            from = previous.as_deref().unwrap_or("<none>"),
            to = %target,
            "context switch; restarting build daemon"
        );
        restart_daemon(transport, &config, &target).await;
        config.last_context = Some(target.clone());
        if let Err(e) = store.save(&config) {
            warn!(error = %e, "could not persist build context");
        }
        tokio::time::sleep(options.startup_delay).await;
    }

    let run_dir = format!("{target}/{RUN_DIR}");
    let request = format!("{run_dir}/build.request");
    if let Err(e) = transport
        .run(&format!("mkdir -p {}", quote(&run_dir)))
        .await
    {
        warn!(error = %e, dir = %run_dir, "could not create daemon run directory");
    }

    let quoted = quote(&request);
    transport
        .run(&format!("rm -f {quoted} && touch {quoted}"))
        .await
        .map_err(|source| HoloError::TriggerFailed {
            request: request.clone(),
            source,
        })?;
    info!(request = %request, "build requested");

    Ok(TriggerReport {
        target_root: target,
        previous_context: previous,
        switched,
        request_path: request,
        config,
    })
}

async fn restart_daemon<T: Transport>(transport: &T, config: &ProjectConfig, target: &str) {
    let session = config.daemon_session();
    if let Err(e) = transport
        .run(&format!("tmux kill-session -t {} 2>/dev/null", quote(session)))
        .await
    {
        debug!(error = %e, session, "no daemon session to kill");
    }

    let launch = format!(
        "export PROJECT_ROOT={}; {}",
        quote(target),
        config.daemon_launcher()
    );
    if let Err(e) = transport.run(&launch).await {
        warn!(
            code = %ErrorCode::BuildDaemonRestartFailed.code_string(),
            error = %e,
            "failed to relaunch build daemon"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockResponse, MockTransport};
    use tempfile::TempDir;

    fn hologram() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("hologram");
        std::fs::create_dir_all(root.join("app/src")).unwrap();
        std::fs::create_dir_all(root.join("lib")).unwrap();
        (dir, root)
    }

    #[test]
    fn nearest_marker_wins() {
        let (_dir, root) = hologram();
        std::fs::write(root.join("app/Makefile"), "").unwrap();
        std::fs::write(root.join("app/src/main.c"), "").unwrap();

        let ctx = find_build_context(&root, &root.join("app/src/main.c"));
        assert_eq!(ctx, Some(BuildContext(PathBuf::from("app"))));
        assert_eq!(
            find_build_context(&root, &root.join("app/src")),
            Some(BuildContext(PathBuf::from("app")))
        );
    }

    #[test]
    fn root_marker_and_outside_paths_are_none() {
        let (dir, root) = hologram();
        std::fs::write(root.join(COMPILE_DB_FILE), "[]").unwrap();
        assert_eq!(find_build_context(&root, &root.join("lib/x.c")), None);
        assert_eq!(find_build_context(&root, &dir.path().join("elsewhere.c")), None);
    }

    #[test]
    fn ddd_directory_is_a_marker() {
        let (_dir, root) = hologram();
        std::fs::create_dir_all(root.join("lib/.ddd")).unwrap();
        assert_eq!(
            find_build_context(&root, &root.join("lib/y.c")),
            Some(BuildContext(PathBuf::from("lib")))
        );
    }

    struct TriggerFixture {
        _dir: TempDir,
        store: ConfigStore,
        layout: OverlayLayout,
        transport: MockTransport,
    }

    fn trigger_fixture() -> TriggerFixture {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::at(dir.path());
        let layout = OverlayLayout::new(dir.path(), "/srv/repo");
        let transport = MockTransport::new()
            .with_rule("tmux kill-session", MockResponse::fail(1, "no session"))
            .with_rule("launch_tower", MockResponse::ok(""))
            .with_rule("mkdir -p", MockResponse::ok(""))
            .with_rule("touch", MockResponse::ok(""));
        TriggerFixture {
            _dir: dir,
            store,
            layout,
            transport,
        }
    }

    fn no_delay() -> TriggerOptions {
        TriggerOptions {
            startup_delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn switch_restarts_daemon_and_persists_context() {
        let fx = trigger_fixture();
        let config = ProjectConfig::new("dev@host", "/srv/repo");
        let ctx = BuildContext(PathBuf::from("app"));

        let report = trigger_build(&fx.transport, &fx.store, config, &fx.layout, Some(&ctx), &no_delay())
            .await
            .unwrap();
        assert!(report.switched);
        assert_eq!(report.target_root, "/srv/repo/app");
        assert_eq!(report.request_path, "/srv/repo/app/.ddd/run/build.request");
        assert_eq!(report.config.last_context.as_deref(), Some("/srv/repo/app"));

        let calls = fx.transport.calls();
        let kill = calls.iter().position(|c| c.contains("tmux kill-session")).unwrap();
        let launch = calls
            .iter()
            .position(|c| c.contains("export PROJECT_ROOT=/srv/repo/app"))
            .unwrap();
        let touch = calls.iter().position(|c| c.contains("touch")).unwrap();
        assert!(kill < launch && launch < touch);

        let saved = fx.store.load().unwrap();
        assert_eq!(saved.last_context.as_deref(), Some("/srv/repo/app"));
    }

    #[tokio::test]
    async fn same_context_only_touches_sentinel() {
        let fx = trigger_fixture();
        let mut config = ProjectConfig::new("dev@host", "/srv/repo");
        config.last_context = Some("/srv/repo".to_string());

        let report = trigger_build(&fx.transport, &fx.store, config, &fx.layout, None, &no_delay())
            .await
            .unwrap();
        assert!(!report.switched);
        assert!(fx.transport.calls_containing("tmux").is_empty());
        assert!(fx.transport.calls_containing("launch_tower").is_empty());
        assert_eq!(fx.transport.calls_containing("rm -f").len(), 1);
    }

    #[tokio::test]
    async fn sentinel_failure_propagates_but_launch_failure_does_not() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::at(dir.path());
        let layout = OverlayLayout::new(dir.path(), "/srv/repo");
        let transport = MockTransport::new()
            .with_rule("tmux", MockResponse::ok(""))
            .with_rule("launch_tower", MockResponse::fail(127, "not found"))
            .with_rule("mkdir", MockResponse::fail(1, "read-only"))
            .with_rule("touch", MockResponse::fail(1, "permission denied"));
        let config = ProjectConfig::new("dev@host", "/srv/repo");

        let err = trigger_build(&transport, &store, config, &layout, None, &no_delay())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::BuildTriggerFailed);
        assert!(err.to_string().contains("/srv/repo/.ddd/run/build.request"), "{err}");
        // The switch itself still happened before the touch failed.
        assert_eq!(store.load().unwrap().last_context.as_deref(), Some("/srv/repo"));
    }
}
