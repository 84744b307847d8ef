//! Hologram Projector
//!
//! Pull single files of a remote C/C++ repository into a local Hologram,
//! keep their dependencies in a read-only OutsideWall, and drive the remote
//! build daemon.

#![forbid(unsafe_code)]

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use holo_common::{HoloError, LogConfig, TransportKind, init_logging};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "holo")]
#[command(author, version, about = "Hologram Projector - remote code, local context")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create hologram/ and outside_wall/ and write .hologram_config
    Init {
        /// SSH target (user@host, or user@host:/remote/root)
        host_target: String,

        /// Absolute repository root on the host
        #[arg(long)]
        remote_root: Option<String>,

        /// How to reach the host (ssh or local)
        #[arg(long, default_value = "ssh")]
        transport: TransportKind,

        /// Where the daemon tooling lives on the host, if not <root>/.mission
        #[arg(long)]
        remote_mission_root: Option<String>,
    },

    /// Project a remote file into the Hologram with its compile context
    Pull {
        /// Remote path, absolute or relative to the remote root
        file: String,

        /// Flags that pick the right compile entry (e.g. "-DTEST")
        #[arg(long, allow_hyphen_values = true)]
        flags: Option<String>,
    },

    /// Send a Hologram file back to the host
    Push {
        file: PathBuf,

        /// Trigger a remote build after the push
        #[arg(long)]
        trigger: bool,
    },

    /// Remove files from the Hologram and restore their read-only copies
    Retract {
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        file: Option<PathBuf>,

        /// Retract every file in the Hologram
        #[arg(long)]
        all: bool,
    },

    /// Trigger the remote build
    Build {
        /// Derive the build context from this file
        #[arg(long)]
        context_from: Option<PathBuf>,

        /// Push this file before building
        #[arg(long)]
        sync: Option<PathBuf>,

        /// Stream the log until the build finishes
        #[arg(long)]
        wait: bool,
    },

    /// Print the remote build log
    Log {
        /// Only the last N lines
        #[arg(short = 'n', long)]
        lines: Option<usize>,
    },

    /// Follow the remote build log
    Listen {
        /// Append every raw line to this local file
        #[arg(long)]
        mirror_log: Option<PathBuf>,
    },

    /// Push Hologram edits as they happen while following the build log
    Live {
        /// Trigger a build after each pushed batch
        #[arg(long)]
        auto_build: bool,
    },

    /// Point clangd at the flags a source file is compiled with
    Focus { file: PathBuf },

    /// Print a markdown compile-context summary of a file for an agent
    Context {
        file: PathBuf,

        /// Task description to put at the top
        task: Option<String>,
    },

    /// Sync the host compiler's system headers into the OutsideWall
    RepairHeaders,

    /// Materialize external include trees referenced by the host's databases
    Mount,

    /// Resolve compile context on the repository host (prints JSON)
    Resolve {
        /// Target file for full context
        #[arg(long, required_unless_present = "mounts")]
        full: Option<PathBuf>,

        /// Flags that pick the right compile entry
        #[arg(long, allow_hyphen_values = true)]
        flags: Option<String>,

        /// Extra compilation databases
        #[arg(long)]
        db: Vec<PathBuf>,

        /// Repository root
        #[arg(long)]
        root: Option<PathBuf>,

        /// Report consolidated external mounts instead
        #[arg(long, conflicts_with = "full")]
        mounts: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env("info").with_stderr();
    if cli.verbose {
        log_config = log_config.with_level("debug");
    }
    let _logging_guards = match init_logging(&log_config) {
        Ok(guards) => guards,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    match run(cli.command).await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        }
    }
}

fn report(err: &anyhow::Error) {
    match err.downcast_ref::<HoloError>() {
        Some(holo) => {
            eprintln!("Error: {holo}");
            eprint!("{}", holo.code().entry().format_full());
        }
        None => eprintln!("Error: {err:#}"),
    }
}

async fn run(command: Commands) -> Result<u8> {
    match command {
        Commands::Init {
            host_target,
            remote_root,
            transport,
            remote_mission_root,
        } => commands::project::init(
            &host_target,
            remote_root.as_deref(),
            transport,
            remote_mission_root,
        ),
        Commands::Pull { file, flags } => commands::project::pull(&file, flags.as_deref()).await,
        Commands::Push { file, trigger } => commands::project::push(&file, trigger).await,
        Commands::Retract { file, all } => commands::project::retract(file, all).await,
        Commands::Build {
            context_from,
            sync,
            wait,
        } => commands::build::build(context_from.as_deref(), sync.as_deref(), wait).await,
        Commands::Log { lines } => commands::build::log(lines).await,
        Commands::Listen { mirror_log } => commands::build::listen(mirror_log).await,
        Commands::Live { auto_build } => commands::build::live(auto_build).await,
        Commands::Focus { file } => commands::inspect::focus(&file),
        Commands::Context { file, task } => commands::inspect::context(&file, task.as_deref()),
        Commands::RepairHeaders => commands::project::repair_headers().await,
        Commands::Mount => commands::project::mount().await,
        Commands::Resolve {
            full,
            flags,
            db,
            root,
            mounts,
        } => commands::resolve::resolve(full, flags.as_deref(), &db, root, mounts),
    }
}
