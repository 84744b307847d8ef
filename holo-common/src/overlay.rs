//! Hologram / OutsideWall overlay.
//!
//! A remote file under `remote_root` has two local homes:
//!
//! - `hologram/<path relative to remote_root>`: writable, pushed back on save
//! - `outside_wall/<absolute remote path without leading />`: read-only mirror
//!
//! A file exists in at most one of them. Projecting into the Hologram ghosts
//! (deletes) the wall copy first; retracting restores it from the host.

use crate::config::ProjectConfig;
use crate::errors::{HoloError, Result, ViolationKind};
use crate::resolver::DependencyMount;
use crate::transport::Transport;
use crate::util::{normalize_lexically, path_string, quote, strip_leading_slash};
use crate::{COMPILE_DB_FILE, HOLOGRAM_DIR, OUTSIDE_WALL_DIR};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const READ_ONLY: u32 = 0o444;
const WRITABLE_FILE: u32 = 0o644;
const WRITABLE_DIR: u32 = 0o755;

/// Where a local path lives relative to the overlay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathZone {
    /// Inside the Hologram; carries the path relative to its root.
    Hologram(PathBuf),
    /// Inside the OutsideWall; carries the path relative to its root.
    OutsideWall(PathBuf),
    Elsewhere,
}

/// Directory layout of one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayLayout {
    project_root: PathBuf,
    hologram: PathBuf,
    outside_wall: PathBuf,
    remote_root: String,
}

impl OverlayLayout {
    pub fn new(project_root: &Path, remote_root: &str) -> Self {
        let project_root = normalize_lexically(project_root);
        let remote_root = match remote_root.trim_end_matches('/') {
            "" => "/".to_string(),
            trimmed => trimmed.to_string(),
        };
        Self {
            hologram: project_root.join(HOLOGRAM_DIR),
            outside_wall: project_root.join(OUTSIDE_WALL_DIR),
            project_root,
            remote_root,
        }
    }

    pub fn from_config(project_root: &Path, config: &ProjectConfig) -> Self {
        Self::new(project_root, &config.remote_root)
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn hologram_root(&self) -> &Path {
        &self.hologram
    }

    pub fn outside_wall_root(&self) -> &Path {
        &self.outside_wall
    }

    pub fn remote_root(&self) -> &str {
        &self.remote_root
    }

    pub fn compile_db_path(&self) -> PathBuf {
        self.hologram.join(COMPILE_DB_FILE)
    }

    /// Normalize a user-supplied remote path (absolute, or relative to
    /// `remote_root`) and require it to lie under `remote_root`.
    pub fn remote_path(&self, input: &str) -> Result<String> {
        let joined = if input.starts_with('/') {
            PathBuf::from(input)
        } else {
            Path::new(&self.remote_root).join(input)
        };
        let normalized = path_string(&normalize_lexically(&joined));
        if self.relative_of_remote(&normalized).is_none() {
            return Err(HoloError::violation(
                normalized,
                ViolationKind::OutsideRemoteRoot,
            ));
        }
        Ok(normalized)
    }

    /// Path of a remote file relative to `remote_root`, if it lies under it.
    pub fn relative_of_remote(&self, remote: &str) -> Option<PathBuf> {
        Path::new(remote)
            .strip_prefix(&self.remote_root)
            .ok()
            .map(Path::to_path_buf)
    }

    /// Remote path for a path relative to `remote_root`.
    pub fn remote_of_relative(&self, rel: &Path) -> String {
        path_string(&Path::new(&self.remote_root).join(rel))
    }

    /// Hologram location of a remote file.
    pub fn hologram_path(&self, remote: &str) -> Result<PathBuf> {
        match self.relative_of_remote(remote) {
            Some(rel) => Ok(self.hologram.join(rel)),
            None => Err(HoloError::violation(remote, ViolationKind::OutsideRemoteRoot)),
        }
    }

    /// OutsideWall location of any absolute remote path.
    pub fn wall_path(&self, remote: &str) -> PathBuf {
        self.outside_wall.join(strip_leading_slash(remote))
    }

    /// Classify an absolute (or already absolutized) local path.
    pub fn classify(&self, local: &Path) -> PathZone {
        let local = normalize_lexically(local);
        if let Ok(rel) = local.strip_prefix(&self.hologram) {
            PathZone::Hologram(rel.to_path_buf())
        } else if let Ok(rel) = local.strip_prefix(&self.outside_wall) {
            PathZone::OutsideWall(rel.to_path_buf())
        } else {
            PathZone::Elsewhere
        }
    }

    /// Remote counterpart of a Hologram path; anything else is refused.
    pub fn remote_path_for_local(&self, local: &Path) -> Result<String> {
        match self.classify(local) {
            PathZone::Hologram(rel) => Ok(self.remote_of_relative(&rel)),
            PathZone::OutsideWall(_) => Err(HoloError::violation(local, ViolationKind::WallBreach)),
            PathZone::Elsewhere => Err(HoloError::violation(local, ViolationKind::NotInHologram)),
        }
    }

    /// Whether the Hologram currently projects this remote path.
    pub fn is_projected(&self, remote: &str) -> bool {
        self.hologram_path(remote).is_ok_and(|path| path.exists())
    }
}

/// What happened to the wall copy during a retract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Restore {
    Restored(PathBuf),
    /// The host no longer has the file, so nothing to restore.
    NotOnRemote,
    /// Restoration was attempted and failed; logged.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetractOutcome {
    pub remote_path: String,
    pub removed: bool,
    pub restore: Restore,
}

/// Overlay operations over one layout and transport.
pub struct OverlayStore<'a, T> {
    layout: &'a OverlayLayout,
    transport: &'a T,
}

impl<'a, T: Transport> OverlayStore<'a, T> {
    pub fn new(layout: &'a OverlayLayout, transport: &'a T) -> Self {
        Self { layout, transport }
    }

    pub fn layout(&self) -> &OverlayLayout {
        self.layout
    }

    /// Delete the wall copy of a remote path. Returns whether one existed.
    pub fn ghost(&self, remote: &str) -> Result<bool> {
        let wall = self.layout.wall_path(remote);
        if wall.symlink_metadata().is_err() {
            return Ok(false);
        }
        if let Some(parent) = wall.parent() {
            relax_dir(parent);
        }
        set_mode(&wall, WRITABLE_FILE);
        std::fs::remove_file(&wall)
            .map_err(|e| HoloError::io(format!("ghost {}", wall.display()), e))?;
        info!(path = %wall.display(), "ghosted outside wall copy");
        Ok(true)
    }

    /// Write content into the Hologram for a remote path, ghosting first.
    pub fn project(&self, remote: &str, content: &[u8]) -> Result<PathBuf> {
        let dest = self.layout.hologram_path(remote)?;
        self.ghost(remote)?;
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| HoloError::io(format!("create {}", parent.display()), e))?;
        }
        std::fs::write(&dest, content)
            .map_err(|e| HoloError::io(format!("write {}", dest.display()), e))?;
        Ok(dest)
    }

    /// Copy a remote file into the Hologram, ghosting first.
    pub async fn project_from_remote(&self, remote: &str) -> Result<PathBuf> {
        let dest = self.layout.hologram_path(remote)?;
        self.ghost(remote)?;
        self.transport.pull(remote, &dest).await?;
        Ok(dest)
    }

    /// Remove a Hologram file and restore its read-only wall copy.
    pub async fn retract(&self, local: &Path) -> Result<RetractOutcome> {
        let remote = self.layout.remote_path_for_local(local)?;
        let hologram = self.layout.hologram_path(&remote)?;

        let removed = match std::fs::remove_file(&hologram) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %hologram.display(), "file not in hologram; restoring wall copy only");
                false
            }
            Err(e) => return Err(HoloError::io(format!("remove {}", hologram.display()), e)),
        };

        let restore = self.restore(&remote).await;
        Ok(RetractOutcome {
            remote_path: remote,
            removed,
            restore,
        })
    }

    async fn restore(&self, remote: &str) -> Restore {
        match self
            .transport
            .probe(&format!("test -f {}", quote(remote)))
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                info!(path = remote, "no longer on remote host; nothing to restore");
                return Restore::NotOnRemote;
            }
            Err(e) => {
                warn!(path = remote, error = %e, "could not check remote file; wall copy not restored");
                return Restore::Failed;
            }
        }

        let wall = self.layout.wall_path(remote);
        if let Some(parent) = wall.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(path = %parent.display(), error = %e, "cannot create wall directory");
                return Restore::Failed;
            }
            relax_dir(parent);
        }
        if wall.exists() {
            set_mode(&wall, WRITABLE_FILE);
        }
        match self.transport.pull(remote, &wall).await {
            Ok(()) => {
                set_mode(&wall, READ_ONLY);
                info!(path = %wall.display(), "restored read-only wall copy");
                Restore::Restored(wall)
            }
            Err(e) => {
                warn!(path = remote, error = %e, "failed to restore wall copy");
                Restore::Failed
            }
        }
    }

    /// Materialize a host path at `outside_wall/<container_path>`, read-only,
    /// then ghost anything the Hologram projects inside it.
    pub async fn mount(&self, mount: &DependencyMount) -> Result<PathBuf> {
        let dest = self.layout.wall_path(&mount.container_path);
        let is_dir = self
            .transport
            .probe(&format!("test -d {}", quote(&mount.host_path)))
            .await?;

        if is_dir {
            relax_tree(&dest);
            self.transport.pull_tree(&mount.host_path, &dest).await?;
            seal_tree(&dest);
        } else {
            if dest.exists() {
                set_mode(&dest, WRITABLE_FILE);
            }
            self.transport.pull(&mount.host_path, &dest).await?;
            set_mode(&dest, READ_ONLY);
        }
        info!(
            host = %mount.host_path,
            container = %mount.container_path,
            dest = %dest.display(),
            "mounted external dependency"
        );

        let reghosted = self.reghost_projected()?;
        if reghosted > 0 {
            debug!(count = reghosted, "re-ghosted projected files after mount");
        }
        Ok(dest)
    }

    /// Ghost the wall copy of every file currently in the Hologram.
    fn reghost_projected(&self) -> Result<usize> {
        let mut count = 0;
        for entry in WalkDir::new(self.layout.hologram_root())
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|e| e.file_type().is_file())
        {
            let Ok(rel) = entry.path().strip_prefix(self.layout.hologram_root()) else {
                continue;
            };
            let remote = self.layout.remote_of_relative(rel);
            if self.ghost(&remote)? {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Batch-copy dependency files into the wall, read-only, skipping any the
    /// Hologram projects. Returns how many were requested.
    pub async fn ghost_dependencies(&self, dependencies: &[String]) -> usize {
        let mut pending: Vec<String> = Vec::new();
        for dep in dependencies {
            if !dep.starts_with('/') {
                debug!(path = %dep, "skipping relative dependency");
                continue;
            }
            if self.layout.is_projected(dep) {
                debug!(path = %dep, "dependency is projected; keeping it out of the wall");
                continue;
            }
            if !pending.contains(dep) {
                pending.push(dep.clone());
            }
        }
        if pending.is_empty() {
            return 0;
        }

        for dep in &pending {
            let wall = self.layout.wall_path(dep);
            if wall.exists() {
                set_mode(&wall, WRITABLE_FILE);
            }
        }
        if let Err(e) = self
            .transport
            .pull_files(&pending, self.layout.outside_wall_root(), false)
            .await
        {
            warn!(error = %e, "batch dependency sync failed; some headers may be missing");
        }
        for dep in &pending {
            let wall = self.layout.wall_path(dep);
            if wall.is_file() {
                set_mode(&wall, READ_ONLY);
            }
        }
        info!(count = pending.len(), "synced dependencies into outside wall");
        pending.len()
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)) {
        debug!(path = %path.display(), error = %e, "chmod failed");
    }
}

#[cfg(not(unix))]
fn set_mode(path: &Path, mode: u32) {
    if let Ok(meta) = std::fs::metadata(path) {
        let mut perms = meta.permissions();
        perms.set_readonly(mode & 0o200 == 0);
        let _ = std::fs::set_permissions(path, perms);
    }
}

#[cfg(unix)]
fn relax_dir(dir: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = std::fs::metadata(dir) {
        if meta.permissions().mode() & 0o200 == 0 {
            set_mode(dir, WRITABLE_DIR);
        }
    }
}

#[cfg(not(unix))]
fn relax_dir(dir: &Path) {
    set_mode(dir, WRITABLE_DIR);
}

/// Make every file under `root` writable so a refresh can replace it.
fn relax_tree(root: &Path) {
    for entry in WalkDir::new(root).into_iter().filter_map(std::result::Result::ok) {
        if entry.file_type().is_dir() {
            relax_dir(entry.path());
        } else {
            set_mode(entry.path(), WRITABLE_FILE);
        }
    }
}

/// Mark every file under `root` read-only; directories stay writable so
/// ghosting and restores keep working.
fn seal_tree(root: &Path) {
    for entry in WalkDir::new(root).into_iter().filter_map(std::result::Result::ok) {
        if entry.file_type().is_file() {
            set_mode(entry.path(), READ_ONLY);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        layout: OverlayLayout,
        remote: PathBuf,
    }

    /// Project and "remote host" side by side in one temp dir.
    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let remote = dir.path().join("remote");
        std::fs::create_dir_all(remote.join("src")).unwrap();
        let project = dir.path().join("project");
        std::fs::create_dir_all(&project).unwrap();
        let layout = OverlayLayout::new(&project, remote.to_str().unwrap());
        Fixture {
            _dir: dir,
            layout,
            remote,
        }
    }

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn is_read_only(path: &Path) -> bool {
        std::fs::metadata(path).unwrap().permissions().readonly()
    }

    #[test]
    fn remote_path_resolves_relative_inputs() {
        let layout = OverlayLayout::new(Path::new("/p"), "/srv/repo/");
        assert_eq!(layout.remote_root(), "/srv/repo");
        assert_eq!(layout.remote_path("src/a.c").unwrap(), "/srv/repo/src/a.c");
        assert_eq!(
            layout.remote_path("/srv/repo/src/../lib/b.c").unwrap(),
            "/srv/repo/lib/b.c"
        );
    }

    #[test]
    fn remote_path_outside_root_is_refused() {
        let layout = OverlayLayout::new(Path::new("/p"), "/srv/repo");
        let err = layout.remote_path("/etc/passwd").unwrap_err();
        assert!(matches!(
            err,
            HoloError::OverlayViolation {
                kind: ViolationKind::OutsideRemoteRoot,
                ..
            }
        ));
        assert!(layout.remote_path("../escape.c").is_err());
        // Prefix match must be component-wise.
        assert!(layout.remote_path("/srv/repository/x.c").is_err());
    }

    #[test]
    fn layout_maps_both_trees() {
        let layout = OverlayLayout::new(Path::new("/p"), "/srv/repo");
        assert_eq!(
            layout.hologram_path("/srv/repo/src/a.c").unwrap(),
            PathBuf::from("/p/hologram/src/a.c")
        );
        assert_eq!(
            layout.wall_path("/srv/repo/src/a.c"),
            PathBuf::from("/p/outside_wall/srv/repo/src/a.c")
        );
        assert_eq!(
            layout.wall_path("/usr/include/stdio.h"),
            PathBuf::from("/p/outside_wall/usr/include/stdio.h")
        );
    }

    #[test]
    fn classify_distinguishes_zones() {
        let layout = OverlayLayout::new(Path::new("/p"), "/srv/repo");
        assert_eq!(
            layout.classify(Path::new("/p/hologram/src/a.c")),
            PathZone::Hologram(PathBuf::from("src/a.c"))
        );
        assert_eq!(
            layout.classify(Path::new("/p/outside_wall/usr/x.h")),
            PathZone::OutsideWall(PathBuf::from("usr/x.h"))
        );
        assert_eq!(layout.classify(Path::new("/p/notes.md")), PathZone::Elsewhere);
        assert_eq!(
            layout.classify(Path::new("/p/hologram/../outside_wall/x.h")),
            PathZone::OutsideWall(PathBuf::from("x.h"))
        );
    }

    #[test]
    fn remote_path_for_local_refuses_wall() {
        let layout = OverlayLayout::new(Path::new("/p"), "/srv/repo");
        let err = layout
            .remote_path_for_local(Path::new("/p/outside_wall/srv/repo/a.h"))
            .unwrap_err();
        assert!(matches!(
            err,
            HoloError::OverlayViolation {
                kind: ViolationKind::WallBreach,
                ..
            }
        ));
        assert_eq!(
            layout
                .remote_path_for_local(Path::new("/p/hologram/a.h"))
                .unwrap(),
            "/srv/repo/a.h"
        );
    }

    #[test]
    fn project_ghosts_read_only_wall_copy() {
        let fx = fixture();
        let transport = MockTransport::new();
        let store = OverlayStore::new(&fx.layout, &transport);
        let remote = format!("{}/src/a.c", fx.remote.display());
        let wall = fx.layout.wall_path(&remote);
        write(&wall, "old");
        set_mode(&wall, READ_ONLY);

        let dest = store.project(&remote, b"new").unwrap();
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "new");
        assert!(!wall.exists(), "wall copy must be ghosted");
    }

    #[tokio::test]
    async fn project_then_retract_keeps_single_location() {
        let fx = fixture();
        let transport = MockTransport::new();
        let store = OverlayStore::new(&fx.layout, &transport);
        let remote_file = fx.remote.join("src/a.c");
        write(&remote_file, "int main;");
        let remote = remote_file.to_string_lossy().to_string();
        write(&fx.layout.wall_path(&remote), "stale");

        let hologram = store.project_from_remote(&remote).await.unwrap();
        assert!(hologram.exists());
        assert!(!fx.layout.wall_path(&remote).exists());

        let outcome = store.retract(&hologram).await.unwrap();
        assert!(outcome.removed);
        assert!(!hologram.exists());
        let wall = fx.layout.wall_path(&remote);
        assert_eq!(outcome.restore, Restore::Restored(wall.clone()));
        assert_eq!(std::fs::read_to_string(&wall).unwrap(), "int main;");
        assert!(is_read_only(&wall));
    }

    #[tokio::test]
    async fn retract_of_deleted_remote_leaves_neither() {
        let fx = fixture();
        let transport = MockTransport::new();
        let store = OverlayStore::new(&fx.layout, &transport);
        let remote = format!("{}/src/gone.c", fx.remote.display());
        let hologram = store.project(&remote, b"x").unwrap();

        let outcome = store.retract(&hologram).await.unwrap();
        assert_eq!(outcome.restore, Restore::NotOnRemote);
        assert!(!hologram.exists());
        assert!(!fx.layout.wall_path(&remote).exists());
    }

    #[tokio::test]
    async fn retract_outside_hologram_is_a_violation() {
        let fx = fixture();
        let transport = MockTransport::new();
        let store = OverlayStore::new(&fx.layout, &transport);
        let stray = fx.layout.project_root().join("notes.md");

        let err = store.retract(&stray).await.unwrap_err();
        assert!(matches!(
            err,
            HoloError::OverlayViolation {
                kind: ViolationKind::NotInHologram,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn ghost_dependencies_skips_projected_files() {
        let fx = fixture();
        let transport = MockTransport::new();
        let store = OverlayStore::new(&fx.layout, &transport);
        let header = fx.remote.join("include/a.h");
        let projected = fx.remote.join("include/b.h");
        write(&header, "a");
        write(&projected, "b");
        let header = header.to_string_lossy().to_string();
        let projected = projected.to_string_lossy().to_string();
        store.project(&projected, b"local edit").unwrap();

        let count = store
            .ghost_dependencies(&[header.clone(), projected.clone(), "rel.h".to_string()])
            .await;
        assert_eq!(count, 1);
        let wall = fx.layout.wall_path(&header);
        assert!(wall.is_file());
        assert!(is_read_only(&wall));
        assert!(!fx.layout.wall_path(&projected).exists());
    }

    #[tokio::test]
    async fn mount_reghosts_projected_files() {
        let fx = fixture();
        let transport = MockTransport::new();
        let store = OverlayStore::new(&fx.layout, &transport);
        write(&fx.remote.join("src/lib.c"), "lib");
        write(&fx.remote.join("src/edit.c"), "edit");
        let edited = format!("{}/src/edit.c", fx.remote.display());
        store.project(&edited, b"mine").unwrap();

        let src = format!("{}/src", fx.remote.display());
        let mount = DependencyMount::new(src.clone(), src.clone());
        let dest = store.mount(&mount).await.unwrap();

        assert!(dest.join("lib.c").is_file());
        assert!(is_read_only(&dest.join("lib.c")));
        assert!(
            !dest.join("edit.c").exists(),
            "projected file must not reappear in the wall"
        );
        assert!(fx.layout.hologram_path(&edited).unwrap().exists());
    }

    #[tokio::test]
    async fn mount_single_file_and_refresh() {
        let fx = fixture();
        let transport = MockTransport::new();
        let store = OverlayStore::new(&fx.layout, &transport);
        let host = fx.remote.join("config.h");
        write(&host, "v1");
        let host = host.to_string_lossy().to_string();
        let mount = DependencyMount::new(host.clone(), "/opt/sdk/config.h".to_string());

        let dest = store.mount(&mount).await.unwrap();
        assert_eq!(dest, fx.layout.wall_path("/opt/sdk/config.h"));
        assert!(is_read_only(&dest));

        std::fs::write(&host, "v2").unwrap();
        store.mount(&mount).await.unwrap();
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "v2");
    }
}
