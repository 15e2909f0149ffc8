use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{ArgGroup, Parser};
use idmap::LockMode;

use crate::commands::{command_fd, command_inspect, command_path, command_scan, command_verify};

mod commands;

/// Create, verify and catalog resource overlay idmaps
#[derive(Parser)]
#[command(version, about, arg_required_else_help(true))]
#[command(group(ArgGroup::new("mode").required(true).multiple(false)))]
struct Cli {
    /// Create idmap for the target and overlay apks, stored at the given path
    #[arg(long, num_args = 3, value_names = ["TARGET", "OVERLAY", "IDMAP"], group = "mode")]
    path: Option<Vec<PathBuf>>,

    /// Create idmap for the target and overlay apks, written to an inherited descriptor
    #[arg(long, num_args = 3, value_names = ["TARGET", "OVERLAY", "FD"], group = "mode")]
    fd: Option<Vec<String>>,

    /// Exit with 0 if the idmap behind the descriptor is up to date
    #[arg(long, num_args = 3, value_names = ["TARGET", "OVERLAY", "FD"], group = "mode")]
    verify: Option<Vec<String>>,

    /// Find static overlays for a package, build their idmaps and write overlays.list
    #[arg(
        long,
        num_args = 4..,
        value_names = ["TARGET_PACKAGE", "TARGET_APK", "IDMAP_DIR", "OVERLAY_DIR"],
        group = "mode"
    )]
    scan: Option<Vec<String>>,

    /// Print the content of an idmap file
    #[arg(long, value_name = "IDMAP", group = "mode")]
    inspect: Option<PathBuf>,

    /// System property file consulted by --scan
    #[arg(long, value_name = "FILE", default_value = "/system/build.prop")]
    properties: PathBuf,

    /// Give up waiting for a file lock after this many milliseconds
    #[arg(long, value_name = "MS")]
    lock_timeout: Option<u64>,

    /// Print --inspect output as json
    #[arg(long, requires = "inspect")]
    json: bool,
}

impl Cli {
    fn lock_mode(&self) -> LockMode {
        match self.lock_timeout {
            Some(ms) => LockMode::Bounded(Duration::from_millis(ms)),
            None => LockMode::Blocking,
        }
    }

    fn run(&self) -> anyhow::Result<bool> {
        let lock_mode = self.lock_mode();

        if let Some(args) = &self.path {
            command_path(args, lock_mode)?;
        } else if let Some(args) = &self.fd {
            command_fd(args, lock_mode)?;
        } else if let Some(args) = &self.verify {
            return command_verify(args);
        } else if let Some(args) = &self.scan {
            command_scan(args, &self.properties, lock_mode)?;
        } else if let Some(path) = &self.inspect {
            command_inspect(path, self.json)?;
        }

        Ok(true)
    }
}

fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();

    match cli.run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}
