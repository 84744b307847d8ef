//! Configuration system for Hologram Projector.
//!
//! Two layers:
//! - the persisted project config (`.hologram_config`, JSON) found by walking
//!   up from the working directory; its directory is the project root
//! - `HOLO_*` environment overrides parsed by [`EnvParser`]

pub mod env;

pub use env::{EnvError, EnvParser, HoloEnv};

use crate::errors::{HoloError, Result};
use crate::{CONFIG_FILE, HOLOGRAM_DIR, OUTSIDE_WALL_DIR};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Default remote command that runs the compile-context resolver.
pub const DEFAULT_RESOLVER_COMMAND: &str = "holo resolve";

/// Default tmux session name of the remote build daemon.
pub const DEFAULT_DAEMON_SESSION: &str = "mission_tower";

/// How the projector reaches the repository host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Ssh,
    Local,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ssh => write!(f, "ssh"),
            Self::Local => write!(f, "local"),
        }
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ssh" => Ok(Self::Ssh),
            "local" => Ok(Self::Local),
            other => Err(format!("unknown transport '{other}'")),
        }
    }
}

/// Persisted per-project configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// ssh destination of the repository host (`user@box`).
    pub host_target: String,
    /// Absolute repository root on the host.
    pub remote_root: String,
    /// Where the daemon tooling lives on the host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_mission_root: Option<String>,
    /// Root the daemon was last launched for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_context: Option<String>,
    /// Compiler default include directories on the host.
    #[serde(default)]
    pub system_includes: Vec<String>,
    #[serde(default)]
    pub transport: TransportKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolver_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daemon_session: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daemon_launcher: Option<String>,
    /// Remote command printing the compiler's default include directories.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_include_query: Option<String>,
    /// Extra compilation databases the resolver consults.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub compilation_dbs: Vec<String>,
}

impl ProjectConfig {
    pub fn new(host_target: impl Into<String>, remote_root: impl Into<String>) -> Self {
        Self {
            host_target: host_target.into(),
            remote_root: remote_root.into(),
            remote_mission_root: None,
            last_context: None,
            system_includes: Vec::new(),
            transport: TransportKind::default(),
            resolver_command: None,
            daemon_session: None,
            daemon_launcher: None,
            system_include_query: None,
            compilation_dbs: Vec::new(),
        }
    }

    /// Check the fields every flow relies on.
    pub fn validate(&self, path: &Path) -> Result<()> {
        let invalid = |reason: &str| HoloError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };
        if self.host_target.trim().is_empty() {
            return Err(invalid("host_target is empty"));
        }
        if !self.remote_root.starts_with('/') {
            return Err(invalid("remote_root must be an absolute path"));
        }
        Ok(())
    }

    /// Mission tooling root on the host, with `~/` usable inside quotes.
    pub fn mission_root(&self) -> String {
        let root = self
            .remote_mission_root
            .clone()
            .unwrap_or_else(|| format!("{}/.mission", self.remote_root));
        match root.strip_prefix("~/") {
            Some(rest) => format!("$HOME/{rest}"),
            None => root,
        }
    }

    pub fn resolver_command(&self) -> &str {
        self.resolver_command
            .as_deref()
            .unwrap_or(DEFAULT_RESOLVER_COMMAND)
    }

    pub fn daemon_session(&self) -> &str {
        self.daemon_session
            .as_deref()
            .unwrap_or(DEFAULT_DAEMON_SESSION)
    }

    pub fn daemon_launcher(&self) -> String {
        self.daemon_launcher
            .clone()
            .unwrap_or_else(|| format!("{}/tools/bin/launch_tower", self.mission_root()))
    }

    pub fn system_include_query(&self) -> String {
        self.system_include_query
            .clone()
            .unwrap_or_else(|| format!("{}/tools/lib/sys_headers.py", self.mission_root()))
    }

    /// Root the daemon currently serves.
    pub fn current_root(&self) -> &str {
        self.last_context.as_deref().unwrap_or(&self.remote_root)
    }

    /// Remote build log for the current root.
    pub fn remote_log_path(&self) -> String {
        format!("{}/.ddd/run/build.log", self.current_root())
    }
}

/// Split `user@host:/path` into the host and the optional root.
pub fn parse_host_target(target: &str) -> (String, Option<String>) {
    match target.split_once(':') {
        Some((host, root)) if !root.is_empty() => (host.to_string(), Some(root.to_string())),
        Some((host, _)) => (host.to_string(), None),
        None => (target.to_string(), None),
    }
}

/// Location of a project's config file and the project root it defines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigStore {
    root: PathBuf,
}

impl ConfigStore {
    /// Store rooted at an explicit project directory.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Walk up from `start` to the nearest directory holding `.hologram_config`.
    pub fn discover(start: &Path) -> Result<Self> {
        for dir in start.ancestors() {
            if dir.join(CONFIG_FILE).is_file() {
                debug!(root = %dir.display(), "project root discovered");
                return Ok(Self::at(dir));
            }
        }
        Err(HoloError::ConfigMissing {
            start: start.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn hologram_dir(&self) -> PathBuf {
        self.root.join(HOLOGRAM_DIR)
    }

    pub fn outside_wall_dir(&self) -> PathBuf {
        self.root.join(OUTSIDE_WALL_DIR)
    }

    /// Read and validate the config.
    pub fn load(&self) -> Result<ProjectConfig> {
        let path = self.path();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| HoloError::io(format!("read {}", path.display()), e))?;
        let config: ProjectConfig =
            serde_json::from_str(&content).map_err(|source| HoloError::ConfigInvalid {
                path: path.clone(),
                reason: source.to_string(),
            })?;
        config.validate(&path)?;
        Ok(config)
    }

    /// Persist the config through a temp file renamed over the original.
    pub fn save(&self, config: &ProjectConfig) -> Result<()> {
        let path = self.path();
        let body = serde_json::to_string_pretty(config).map_err(|source| HoloError::Json {
            path: path.clone(),
            source,
        })?;
        write_atomic(&path, body.as_bytes()).map_err(|e| HoloError::ConfigWrite {
            reason: e.to_string(),
            path,
        })
    }
}

/// Write `bytes` to `path` via a sibling temp file and rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .map_err(|e| HoloError::io(format!("create {}", dir.display()), e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| HoloError::io(format!("create temp file in {}", dir.display()), e))?;
    tmp.write_all(bytes)
        .and_then(|()| tmp.flush())
        .map_err(|e| HoloError::io(format!("write {}", tmp.path().display()), e))?;
    tmp.persist(path)
        .map_err(|e| HoloError::io(format!("replace {}", path.display()), e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_derive_from_mission_root() {
        let config = ProjectConfig::new("dev@box", "/srv/repo");
        assert_eq!(config.mission_root(), "/srv/repo/.mission");
        assert_eq!(
            config.daemon_launcher(),
            "/srv/repo/.mission/tools/bin/launch_tower"
        );
        assert_eq!(config.daemon_session(), "mission_tower");
        assert_eq!(config.resolver_command(), "holo resolve");
        assert_eq!(config.remote_log_path(), "/srv/repo/.ddd/run/build.log");
    }

    #[test]
    fn test_tilde_mission_root_expands_to_home() {
        let mut config = ProjectConfig::new("dev@box", "/srv/repo");
        config.remote_mission_root = Some("~/mission".to_string());
        assert_eq!(config.mission_root(), "$HOME/mission");
    }

    #[test]
    fn test_log_path_follows_last_context() {
        let mut config = ProjectConfig::new("dev@box", "/srv/repo");
        config.last_context = Some("/srv/repo/apps/a".to_string());
        assert_eq!(config.remote_log_path(), "/srv/repo/apps/a/.ddd/run/build.log");
    }

    #[test]
    fn test_parse_host_target() {
        assert_eq!(
            parse_host_target("dev@box:/srv/repo"),
            ("dev@box".to_string(), Some("/srv/repo".to_string()))
        );
        assert_eq!(parse_host_target("dev@box"), ("dev@box".to_string(), None));
        assert_eq!(parse_host_target("dev@box:"), ("dev@box".to_string(), None));
    }

    #[test]
    fn test_validate_rejects_relative_root() {
        let config = ProjectConfig::new("dev@box", "repo");
        let err = config.validate(Path::new("/p/.hologram_config")).unwrap_err();
        assert!(matches!(err, HoloError::ConfigInvalid { .. }));
    }

    #[test]
    fn test_discover_walks_up() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::at(dir.path());
        store.save(&ProjectConfig::new("dev@box", "/srv/repo")).unwrap();
        let nested = dir.path().join("hologram/src/deep");
        std::fs::create_dir_all(&nested).unwrap();

        let found = ConfigStore::discover(&nested).unwrap();
        assert_eq!(found.root(), dir.path());
    }

    #[test]
    fn test_discover_without_config_fails() {
        let dir = TempDir::new().unwrap();
        let err = ConfigStore::discover(dir.path()).unwrap_err();
        assert!(matches!(err, HoloError::ConfigMissing { .. }));
    }

    #[test]
    fn test_save_then_load_preserves_fields() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::at(dir.path());
        let mut config = ProjectConfig::new("dev@box", "/srv/repo");
        config.last_context = Some("/srv/repo/app".to_string());
        config.system_includes = vec!["/usr/include".to_string()];
        config.transport = TransportKind::Local;
        store.save(&config).unwrap();

        assert_eq!(store.load().unwrap(), config);
    }

    #[test]
    fn test_save_into_unusable_root_reports_write_failure() {
        let dir = TempDir::new().unwrap();
        let not_a_dir = dir.path().join("plain-file");
        std::fs::write(&not_a_dir, "x").unwrap();

        let err = ConfigStore::at(&not_a_dir)
            .save(&ProjectConfig::new("dev@box", "/srv/repo"))
            .unwrap_err();
        assert_eq!(err.code(), crate::errors::ErrorCode::ConfigWriteFailed);
        assert!(err.to_string().contains(CONFIG_FILE), "{err}");
    }

    #[test]
    fn test_load_accepts_minimal_legacy_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"host_target": "dev@box", "remote_root": "/srv/repo"}"#,
        )
        .unwrap();
        let config = ConfigStore::at(dir.path()).load().unwrap();
        assert!(config.system_includes.is_empty());
        assert_eq!(config.transport, TransportKind::Ssh);
    }

    #[test]
    fn test_load_reports_invalid_json() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{not json").unwrap();
        let err = ConfigStore::at(dir.path()).load().unwrap_err();
        assert!(matches!(err, HoloError::ConfigInvalid { .. }));
    }
}
