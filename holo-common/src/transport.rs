//! Transport backends for reaching the repository host.
//!
//! Two backends implement [`Transport`]:
//!
//! - [`SshTransport`]: `ssh` for commands, `rsync -az -e ssh` for files
//! - [`LocalTransport`]: `sh -c` for commands, filesystem copies for files
//!   (same-host projects and tests)
//!
//! Every shell command is prefixed with `unset HISTFILE;` so projector
//! traffic never lands in the remote shell history.

use crate::config::TransportKind;
use crate::errors::ErrorCode;
use crate::util::strip_leading_slash;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::process::{Child, Command};
use tracing::debug;
use walkdir::WalkDir;

/// Prefix applied to every remote shell command.
pub const HISTORY_GUARD: &str = "unset HISTFILE;";

/// Options passed to every ssh invocation (including rsync's `-e`).
pub const DEFAULT_SSH_OPTS: [&str; 4] = [
    "-o",
    "StrictHostKeyChecking=no",
    "-o",
    "UserKnownHostsFile=/dev/null",
];

/// Exit code rsync uses for partial transfers; reused by the local backend.
const PARTIAL_TRANSFER_EXIT: i32 = 23;

/// Errors raised by transport backends.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {}{}", status_label(.status), stderr_suffix(.stderr))]
    Failed {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("copy {} -> {} failed: {source}", from.display(), to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TransportError {
    /// Catalogued code for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Spawn { .. } => ErrorCode::TransportSpawnFailed,
            Self::Failed { .. } => ErrorCode::TransportFailure,
            Self::Copy { .. } => ErrorCode::TransportCopyFailed,
        }
    }
}

fn status_label(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

/// Drop benign stderr noise (locale complaints, ssh host-key warnings).
///
/// What remains decides whether a failure carries a message worth surfacing.
pub fn filter_benign_stderr(stderr: &str) -> String {
    stderr
        .lines()
        .filter(|line| !(line.starts_with("Warning:") || line.contains("setlocale")))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Wrap a shell command with the history guard.
pub fn guarded(cmd: &str) -> String {
    format!("{HISTORY_GUARD} {cmd}")
}

/// Access to the repository host.
///
/// Remote paths are plain strings (they name locations on another machine);
/// local paths are [`Path`]s.
pub trait Transport: Send + Sync {
    /// Run a shell command and return its trimmed stdout.
    fn run(&self, cmd: &str) -> impl Future<Output = Result<String, TransportError>> + Send;

    /// Run a shell command and report whether it exited zero.
    fn probe(&self, cmd: &str) -> impl Future<Output = Result<bool, TransportError>> + Send;

    /// Copy one remote file to a local path.
    fn pull(
        &self,
        remote: &str,
        local: &Path,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Copy the contents of a remote directory into a local directory.
    fn pull_tree(
        &self,
        remote_dir: &str,
        local_dir: &Path,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Recreate absolute remote paths below `local_root` (rsync `--files-from` semantics).
    fn pull_files(
        &self,
        remote_paths: &[String],
        local_root: &Path,
        recursive: bool,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Copy one local file to a remote path.
    fn push(
        &self,
        local: &Path,
        remote: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Start a long-running command whose stdout is streamed by the caller.
    fn follow(&self, cmd: &str) -> Result<Child, TransportError>;
}

/// Run a prepared command and turn non-zero exits into [`TransportError::Failed`].
async fn execute(mut cmd: Command, program: &str, shown: String) -> Result<Output, TransportError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    debug!(command = %shown, "transport exec");

    let output = cmd.output().await.map_err(|source| TransportError::Spawn {
        program: program.to_string(),
        source,
    })?;

    if !output.status.success() {
        let stderr = filter_benign_stderr(&String::from_utf8_lossy(&output.stderr));
        return Err(TransportError::Failed {
            command: shown,
            status: output.status.code(),
            stderr,
        });
    }
    Ok(output)
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

// =============================================================================
// SSH backend
// =============================================================================

/// ssh + rsync transport.
#[derive(Debug, Clone)]
pub struct SshTransport {
    host: String,
    ssh_opts: Vec<String>,
}

impl SshTransport {
    /// Transport for `host` (an ssh destination such as `user@box`).
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ssh_opts: DEFAULT_SSH_OPTS.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn ssh_command(&self, cmd: &str) -> Command {
        let mut command = Command::new("ssh");
        command.args(&self.ssh_opts);
        command.arg(&self.host);
        command.arg(guarded(cmd));
        command
    }

    fn rsync_command(&self) -> Command {
        let mut command = Command::new("rsync");
        command.arg("-az");
        command.arg("-e").arg(format!("ssh {}", self.ssh_opts.join(" ")));
        command
    }

    fn remote_spec(&self, path: &str) -> String {
        format!("{}:{}", self.host, path)
    }
}

impl Transport for SshTransport {
    async fn run(&self, cmd: &str) -> Result<String, TransportError> {
        let output = execute(
            self.ssh_command(cmd),
            "ssh",
            format!("ssh {} {}", self.host, cmd),
        )
        .await?;
        Ok(stdout_of(&output))
    }

    async fn probe(&self, cmd: &str) -> Result<bool, TransportError> {
        match execute(
            self.ssh_command(cmd),
            "ssh",
            format!("ssh {} {}", self.host, cmd),
        )
        .await
        {
            Ok(_) => Ok(true),
            // 255 is ssh's own failure, not the remote command's answer.
            Err(TransportError::Failed {
                status: Some(code), ..
            }) if code != 255 => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn pull(&self, remote: &str, local: &Path) -> Result<(), TransportError> {
        ensure_parent(local)?;
        let mut cmd = self.rsync_command();
        cmd.arg(self.remote_spec(remote)).arg(local);
        execute(
            cmd,
            "rsync",
            format!("rsync {} {}", self.remote_spec(remote), local.display()),
        )
        .await?;
        Ok(())
    }

    async fn pull_tree(&self, remote_dir: &str, local_dir: &Path) -> Result<(), TransportError> {
        create_dir(local_dir)?;
        let source = format!("{}/", remote_dir.trim_end_matches('/'));
        let mut cmd = self.rsync_command();
        cmd.arg(self.remote_spec(&source))
            .arg(format!("{}/", local_dir.display()));
        execute(
            cmd,
            "rsync",
            format!("rsync {} {}", self.remote_spec(&source), local_dir.display()),
        )
        .await?;
        Ok(())
    }

    async fn pull_files(
        &self,
        remote_paths: &[String],
        local_root: &Path,
        recursive: bool,
    ) -> Result<(), TransportError> {
        if remote_paths.is_empty() {
            return Ok(());
        }
        create_dir(local_root)?;

        let list = write_file_list(remote_paths)?;
        let mut cmd = self.rsync_command();
        if recursive {
            cmd.arg("-r");
        }
        cmd.arg("--files-from")
            .arg(list.path())
            .arg(self.remote_spec("/"))
            .arg(local_root);
        execute(
            cmd,
            "rsync",
            format!(
                "rsync --files-from ({} paths) {} {}",
                remote_paths.len(),
                self.remote_spec("/"),
                local_root.display()
            ),
        )
        .await?;
        Ok(())
    }

    async fn push(&self, local: &Path, remote: &str) -> Result<(), TransportError> {
        let mut cmd = self.rsync_command();
        cmd.arg(local).arg(self.remote_spec(remote));
        execute(
            cmd,
            "rsync",
            format!("rsync {} {}", local.display(), self.remote_spec(remote)),
        )
        .await?;
        Ok(())
    }

    fn follow(&self, cmd: &str) -> Result<Child, TransportError> {
        let mut command = self.ssh_command(cmd);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        command.spawn().map_err(|source| TransportError::Spawn {
            program: "ssh".to_string(),
            source,
        })
    }
}

fn write_file_list(paths: &[String]) -> Result<tempfile::NamedTempFile, TransportError> {
    use std::io::Write;

    let mut list = tempfile::NamedTempFile::new().map_err(|source| TransportError::Spawn {
        program: "rsync".to_string(),
        source,
    })?;
    for path in paths {
        writeln!(list, "{path}").map_err(|source| TransportError::Copy {
            from: PathBuf::from(path),
            to: list.path().to_path_buf(),
            source,
        })?;
    }
    list.flush().map_err(|source| TransportError::Copy {
        from: PathBuf::from("<file list>"),
        to: list.path().to_path_buf(),
        source,
    })?;
    Ok(list)
}

// =============================================================================
// Local backend
// =============================================================================

/// Same-host transport: `sh -c` for commands, plain copies for files.
#[derive(Debug, Clone, Default)]
pub struct LocalTransport;

impl LocalTransport {
    pub fn new() -> Self {
        Self
    }

    fn shell(cmd: &str) -> Command {
        let mut command = Command::new("sh");
        command.arg("-c").arg(guarded(cmd));
        command
    }
}

impl Transport for LocalTransport {
    async fn run(&self, cmd: &str) -> Result<String, TransportError> {
        let output = execute(Self::shell(cmd), "sh", cmd.to_string()).await?;
        Ok(stdout_of(&output))
    }

    async fn probe(&self, cmd: &str) -> Result<bool, TransportError> {
        match execute(Self::shell(cmd), "sh", cmd.to_string()).await {
            Ok(_) => Ok(true),
            Err(TransportError::Failed { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn pull(&self, remote: &str, local: &Path) -> Result<(), TransportError> {
        let from = PathBuf::from(remote);
        let to = local.to_path_buf();
        blocking(move || replace_file(&from, &to)).await
    }

    async fn pull_tree(&self, remote_dir: &str, local_dir: &Path) -> Result<(), TransportError> {
        let from = PathBuf::from(remote_dir);
        let to = local_dir.to_path_buf();
        blocking(move || copy_tree(&from, &to)).await
    }

    async fn pull_files(
        &self,
        remote_paths: &[String],
        local_root: &Path,
        recursive: bool,
    ) -> Result<(), TransportError> {
        let paths = remote_paths.to_vec();
        let root = local_root.to_path_buf();
        blocking(move || {
            let mut missing = Vec::new();
            for path in &paths {
                let from = PathBuf::from(path);
                let to = root.join(strip_leading_slash(path));
                if from.is_file() {
                    replace_file(&from, &to)?;
                } else if from.is_dir() {
                    if recursive {
                        copy_tree(&from, &to)?;
                    } else {
                        create_dir(&to)?;
                    }
                } else {
                    missing.push(path.clone());
                }
            }
            if missing.is_empty() {
                Ok(())
            } else {
                Err(TransportError::Failed {
                    command: format!("copy --files-from ({} paths)", paths.len()),
                    status: Some(PARTIAL_TRANSFER_EXIT),
                    stderr: format!("missing: {}", missing.join(", ")),
                })
            }
        })
        .await
    }

    async fn push(&self, local: &Path, remote: &str) -> Result<(), TransportError> {
        let from = local.to_path_buf();
        let to = PathBuf::from(remote);
        blocking(move || replace_file(&from, &to)).await
    }

    fn follow(&self, cmd: &str) -> Result<Child, TransportError> {
        let mut command = Self::shell(cmd);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        command.spawn().map_err(|source| TransportError::Spawn {
            program: "sh".to_string(),
            source,
        })
    }
}

// =============================================================================
// Backend selection
// =============================================================================

/// The backend a project is configured for.
#[derive(Debug, Clone)]
pub enum HostTransport {
    Ssh(SshTransport),
    Local(LocalTransport),
}

impl HostTransport {
    /// Backend for `kind`; `host` is the ssh destination (ignored for local).
    pub fn new(kind: TransportKind, host: &str) -> Self {
        match kind {
            TransportKind::Ssh => Self::Ssh(SshTransport::new(host)),
            TransportKind::Local => Self::Local(LocalTransport::new()),
        }
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Ssh(_) => TransportKind::Ssh,
            Self::Local(_) => TransportKind::Local,
        }
    }
}

impl Transport for HostTransport {
    async fn run(&self, cmd: &str) -> Result<String, TransportError> {
        match self {
            Self::Ssh(t) => t.run(cmd).await,
            Self::Local(t) => t.run(cmd).await,
        }
    }

    async fn probe(&self, cmd: &str) -> Result<bool, TransportError> {
        match self {
            Self::Ssh(t) => t.probe(cmd).await,
            Self::Local(t) => t.probe(cmd).await,
        }
    }

    async fn pull(&self, remote: &str, local: &Path) -> Result<(), TransportError> {
        match self {
            Self::Ssh(t) => t.pull(remote, local).await,
            Self::Local(t) => t.pull(remote, local).await,
        }
    }

    async fn pull_tree(&self, remote_dir: &str, local_dir: &Path) -> Result<(), TransportError> {
        match self {
            Self::Ssh(t) => t.pull_tree(remote_dir, local_dir).await,
            Self::Local(t) => t.pull_tree(remote_dir, local_dir).await,
        }
    }

    async fn pull_files(
        &self,
        remote_paths: &[String],
        local_root: &Path,
        recursive: bool,
    ) -> Result<(), TransportError> {
        match self {
            Self::Ssh(t) => t.pull_files(remote_paths, local_root, recursive).await,
            Self::Local(t) => t.pull_files(remote_paths, local_root, recursive).await,
        }
    }

    async fn push(&self, local: &Path, remote: &str) -> Result<(), TransportError> {
        match self {
            Self::Ssh(t) => t.push(local, remote).await,
            Self::Local(t) => t.push(local, remote).await,
        }
    }

    fn follow(&self, cmd: &str) -> Result<Child, TransportError> {
        match self {
            Self::Ssh(t) => t.follow(cmd),
            Self::Local(t) => t.follow(cmd),
        }
    }
}

async fn blocking<F>(f: F) -> Result<(), TransportError>
where
    F: FnOnce() -> Result<(), TransportError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .unwrap_or_else(|join_err| {
            Err(TransportError::Spawn {
                program: "copy".to_string(),
                source: std::io::Error::other(join_err),
            })
        })
}

fn create_dir(dir: &Path) -> Result<(), TransportError> {
    std::fs::create_dir_all(dir).map_err(|source| TransportError::Copy {
        from: PathBuf::new(),
        to: dir.to_path_buf(),
        source,
    })
}

fn ensure_parent(path: &Path) -> Result<(), TransportError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => create_dir(parent),
        _ => Ok(()),
    }
}

/// Copy like rsync does: the destination is replaced, not written through,
/// so read-only destinations inside writable directories are updated too.
fn replace_file(from: &Path, to: &Path) -> Result<(), TransportError> {
    let copy_err = |source| TransportError::Copy {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };
    ensure_parent(to)?;
    if to.symlink_metadata().is_ok() {
        std::fs::remove_file(to).map_err(copy_err)?;
    }
    std::fs::copy(from, to).map_err(copy_err)?;
    Ok(())
}

fn copy_tree(from: &Path, to: &Path) -> Result<(), TransportError> {
    create_dir(to)?;
    for entry in WalkDir::new(from).follow_links(true) {
        let entry = entry.map_err(|err| TransportError::Copy {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source: err.into(),
        })?;
        let Ok(rel) = entry.path().strip_prefix(from) else {
            continue;
        };
        let dest = to.join(rel);
        if entry.file_type().is_dir() {
            create_dir(&dest)?;
        } else {
            replace_file(entry.path(), &dest)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn filter_benign_stderr_drops_locale_noise() {
        let stderr = "Warning: Permanently added 'box' to the list of known hosts.\n\
                      bash: warning: setlocale: LC_ALL: cannot change locale\n\
                      rsync: link_stat \"/x\" failed: No such file or directory";
        assert_eq!(
            filter_benign_stderr(stderr),
            "rsync: link_stat \"/x\" failed: No such file or directory"
        );
        assert_eq!(filter_benign_stderr("Warning: only noise"), "");
    }

    #[test]
    fn failed_error_formats_status_and_stderr() {
        let err = TransportError::Failed {
            command: "test -f /x".to_string(),
            status: Some(1),
            stderr: String::new(),
        };
        assert_eq!(err.to_string(), "`test -f /x` exited with status 1");
        assert_eq!(err.code(), ErrorCode::TransportFailure);

        let err = TransportError::Failed {
            command: "rsync".to_string(),
            status: None,
            stderr: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "`rsync` exited with a signal: boom");
    }

    #[tokio::test]
    async fn local_run_returns_trimmed_stdout() {
        let transport = LocalTransport::new();
        let out = transport.run("echo '  hello  '").await.expect("run");
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn local_run_reports_failure_with_filtered_stderr() {
        let transport = LocalTransport::new();
        let err = transport
            .run("echo 'Warning: noise' >&2; echo real >&2; exit 3")
            .await
            .expect_err("must fail");
        match err {
            TransportError::Failed { status, stderr, .. } => {
                assert_eq!(status, Some(3));
                assert_eq!(stderr, "real");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn local_probe_maps_exit_status() {
        let dir = TempDir::new().expect("tempdir");
        let file = dir.path().join("present.c");
        std::fs::write(&file, "int x;").expect("write");
        let transport = LocalTransport::new();

        let present = format!("test -f {}", file.display());
        let absent = format!("test -f {}", dir.path().join("absent.c").display());
        assert!(transport.probe(&present).await.expect("probe"));
        assert!(!transport.probe(&absent).await.expect("probe"));
    }

    #[tokio::test]
    async fn local_pull_replaces_read_only_destination() {
        let dir = TempDir::new().expect("tempdir");
        let remote = dir.path().join("remote.h");
        let local = dir.path().join("mirror/nested/remote.h");
        std::fs::write(&remote, "v2").expect("write remote");
        std::fs::create_dir_all(local.parent().unwrap()).expect("mkdir");
        std::fs::write(&local, "v1").expect("write local");
        let mut perms = std::fs::metadata(&local).unwrap().permissions();
        perms.set_readonly(true);
        std::fs::set_permissions(&local, perms).unwrap();

        LocalTransport::new()
            .pull(remote.to_str().unwrap(), &local)
            .await
            .expect("pull");
        assert_eq!(std::fs::read_to_string(&local).unwrap(), "v2");
    }

    #[tokio::test]
    async fn local_pull_files_recreates_absolute_layout() {
        let dir = TempDir::new().expect("tempdir");
        let src = dir.path().join("src/include");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("a.h"), "a").unwrap();
        let wall = dir.path().join("wall");

        let a = src.join("a.h").to_string_lossy().to_string();
        LocalTransport::new()
            .pull_files(&[a.clone()], &wall, false)
            .await
            .expect("pull relative");
        assert!(wall.join(strip_leading_slash(&a)).is_file());

        let missing = dir.path().join("nope.h").to_string_lossy().to_string();
        let err = LocalTransport::new()
            .pull_files(&[missing], &wall, false)
            .await
            .expect_err("missing source must fail");
        assert!(matches!(
            err,
            TransportError::Failed {
                status: Some(PARTIAL_TRANSFER_EXIT),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn local_pull_tree_copies_nested_files() {
        let dir = TempDir::new().expect("tempdir");
        let src = dir.path().join("sdk");
        std::fs::create_dir_all(src.join("sub")).unwrap();
        std::fs::write(src.join("sub/b.h"), "b").unwrap();
        let dest = dir.path().join("out/sdk");

        LocalTransport::new()
            .pull_tree(src.to_str().unwrap(), &dest)
            .await
            .expect("pull tree");
        assert_eq!(std::fs::read_to_string(dest.join("sub/b.h")).unwrap(), "b");
    }
}
