use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// A local project next to a fake repository host, driven through the
/// `holo` binary over the local transport.
pub struct TestProject {
    pub dir: TempDir,
    pub remote: PathBuf,
    pub project: PathBuf,
}

impl TestProject {
    pub fn new() -> Self {
        crate::test_log!("FIXTURE: Creating remote repository and empty project");

        let dir = TempDir::new().expect("Failed to create temp dir");
        let base = fs::canonicalize(dir.path()).expect("Failed to canonicalize temp dir");
        let remote = base.join("remote");
        let project = base.join("project");
        fs::create_dir_all(remote.join("src")).expect("Failed to create src dir");
        fs::create_dir_all(remote.join("include")).expect("Failed to create include dir");
        fs::create_dir_all(&project).expect("Failed to create project dir");

        fs::write(
            remote.join("src/main.c"),
            "#include \"api.h\"\n\nint main(void) { return api(); }\n",
        )
        .expect("Failed to write main.c");
        fs::write(remote.join("include/api.h"), "int api(void);\n").expect("Failed to write api.h");
        fs::write(remote.join("Makefile"), "all:\n\tcc -Iinclude -c src/main.c\n")
            .expect("Failed to write Makefile");

        let db = serde_json::json!([{
            "directory": remote.display().to_string(),
            "file": "src/main.c",
            "arguments": ["gcc", "-Iinclude", "-DMODE=1", "-c", "src/main.c", "-o", "main.o"],
        }]);
        fs::write(remote.join("compile_commands.json"), db.to_string())
            .expect("Failed to write compile_commands.json");

        Self {
            dir,
            remote,
            project,
        }
    }

    /// Run `holo` in the project directory.
    pub fn holo(&self, args: &[&str]) -> Output {
        self.holo_in(&self.project, args)
    }

    pub fn holo_in(&self, cwd: &Path, args: &[&str]) -> Output {
        crate::test_log!("RUN: holo {}", args.join(" "));
        Command::new(env!("CARGO_BIN_EXE_holo"))
            .args(args)
            .current_dir(cwd)
            .env("HOLO_TRANSPORT", "local")
            .env("HOLO_DAEMON_STARTUP_MS", "0")
            .env("HOLO_RECONNECT_BACKOFF_MS", "50")
            .env("HOLO_LOG_LEVEL", "warn")
            .env_remove("HOLO_LOG_FILE")
            .output()
            .expect("Failed to run holo")
    }

    /// `holo init` against the fake host, with the resolver pointed at this
    /// very binary.
    pub fn init(&self) {
        let target = format!("dev@localhost:{}", self.remote.display());
        let output = self.holo(&["init", &target, "--transport", "local"]);
        assert!(
            output.status.success(),
            "holo init failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );

        let path = self.config_path();
        let mut config: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).expect("Failed to read config"))
                .expect("Config is not JSON");
        config["resolver_command"] = serde_json::json!(format!("{} resolve", env!("CARGO_BIN_EXE_holo")));
        fs::write(&path, config.to_string()).expect("Failed to write config");
    }

    pub fn config_path(&self) -> PathBuf {
        self.project.join(".hologram_config")
    }

    pub fn config(&self) -> serde_json::Value {
        serde_json::from_str(&fs::read_to_string(self.config_path()).expect("Failed to read config"))
            .expect("Config is not JSON")
    }

    pub fn hologram(&self, rel: &str) -> PathBuf {
        self.project.join("hologram").join(rel)
    }

    /// OutsideWall copy of an absolute remote path.
    pub fn wall(&self, remote: &Path) -> PathBuf {
        let rel = remote.strip_prefix("/").unwrap_or(remote);
        self.project.join("outside_wall").join(rel)
    }

    pub fn write_remote_log(&self, body: &str) {
        let dir = self.remote.join(".ddd/run");
        fs::create_dir_all(&dir).expect("Failed to create run dir");
        fs::write(dir.join("build.log"), body).expect("Failed to write build log");
    }
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}
