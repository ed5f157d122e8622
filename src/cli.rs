//! Command surface of the `fleetgen` binary.
//!
//! ```text
//! fleetgen generate-keys            <key_dir> [password] [role] [count]
//! fleetgen generate-register-script <key_dir> [role] [environment]
//! fleetgen generate-manifest        <docker_dir> [role] [output_file] [--stdout]
//! ```
//!
//! Every input is checked before the first file is touched. All real work is
//! delegated to [`identity`](crate::identity), [`topology`](crate::topology)
//! and [`artifacts`](crate::artifacts).

use std::{
    env,
    io::Write,
    path::{Path, PathBuf},
};

use clap::{Parser, Subcommand};
use tracing::info;

use crate::{
    artifacts::{ComposeManifestGenerator, RegistrationScriptGenerator, manifest},
    config::Config,
    error::FleetError,
    fleet::Role,
    identity::{IdentityStore, KeyOutcome},
    observer::FleetObserver,
    topology,
};

pub const PASSWORD_ENV: &str = "FLEETGEN_KEY_PASSWORD";
const DEFAULT_PASSWORD: &str = "test";

#[derive(Parser, Debug)]
#[command(name = "fleetgen", version, about = "Provision node keys and deployment artifacts for a node fleet")]
pub struct Cli {
    /// Config file (default: $FLEETGEN_CONFIG, then ./fleetgen.toml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level: error, warn, info, debug, trace
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create node_key.json for slots 1..=count that do not have one yet
    GenerateKeys {
        /// Directory holding <role><index>/node_key.json
        key_dir: PathBuf,
        /// Keystore password (default: $FLEETGEN_KEY_PASSWORD, then "test")
        password: Option<String>,
        /// Node role: v, s or a (validator, storage, archival)
        #[arg(default_value = "v")]
        role: String,
        /// Number of slots, 1..100
        #[arg(default_value_t = 10)]
        count: u32,
    },

    /// Print one registration command per provisioned slot
    GenerateRegisterScript {
        /// Directory holding <role><index>/node_key.json
        key_dir: PathBuf,
        /// Node role: v, s or a
        #[arg(default_value = "v")]
        role: String,
        /// Environment name, e.g. localhost or sepolia
        #[arg(default_value = "localhost")]
        environment: String,
    },

    /// Write a compose manifest with one service per provisioned slot
    GenerateManifest {
        /// Directory holding the <role><index> slot directories
        docker_dir: PathBuf,
        /// Node role: v, s or a
        #[arg(default_value = "v")]
        role: String,
        /// Output file, relative to docker_dir (default: <role>.yml)
        output_file: Option<String>,
        /// Print the manifest instead of writing it
        #[arg(long)]
        stdout: bool,
    },
}

/// Execute `command`, writing human-readable output to `out`.
pub fn run(
    command: Command,
    config: &Config,
    observer: &dyn FleetObserver,
    out: &mut dyn Write,
) -> Result<(), FleetError> {
    match command {
        Command::GenerateKeys { key_dir, password, role, count } => {
            let password = password
                .or_else(|| env::var(PASSWORD_ENV).ok())
                .unwrap_or_else(|| DEFAULT_PASSWORD.to_string());
            generate_keys(config, &key_dir, &password, &role, count, observer, out)
        }
        Command::GenerateRegisterScript { key_dir, role, environment } => {
            generate_register_script(config, &key_dir, &role, &environment, observer, out)
        }
        Command::GenerateManifest { docker_dir, role, output_file, stdout } => generate_manifest(
            config,
            &docker_dir,
            &role,
            output_file.as_deref(),
            stdout,
            observer,
            out,
        ),
    }
}

fn generate_keys(
    config: &Config,
    key_dir: &Path,
    password: &str,
    role: &str,
    count: u32,
    observer: &dyn FleetObserver,
    out: &mut dyn Write,
) -> Result<(), FleetError> {
    let role: Role = role.parse()?;
    info!(
        dir = %key_dir.display(),
        role = role.describe(),
        count,
        "generating node keys"
    );

    let outcomes = IdentityStore::new(config.kdf).ensure_keys(key_dir, role, count, password, observer)?;

    let created = outcomes.iter().filter(|o| o.is_created()).count();
    for outcome in &outcomes {
        let status = match outcome {
            KeyOutcome::Created { .. } => "created",
            KeyOutcome::Skipped { .. } => "skipped",
        };
        emit(out, &format!("[{}] {status} {}", outcome.slot(), outcome.address()))?;
    }
    info!(created, skipped = outcomes.len() - created, "node keys ready");
    Ok(())
}

fn generate_register_script(
    config: &Config,
    key_dir: &Path,
    role: &str,
    environment: &str,
    observer: &dyn FleetObserver,
    out: &mut dyn Write,
) -> Result<(), FleetError> {
    let role: Role = role.parse()?;
    require_dir(key_dir)?;
    let env = config.environment(environment)?;

    let topology = topology::scan_dir(key_dir, role, observer)?;

    let generator = RegistrationScriptGenerator::new(config.command_prefix.clone());
    let commands = generator.generate(&topology, &env);
    let script = generator.render(&environment.trim().to_ascii_lowercase(), &commands);
    out.write_all(script.as_bytes())
        .map_err(|e| FleetError::io("<stdout>", e))
}

fn generate_manifest(
    config: &Config,
    docker_dir: &Path,
    role: &str,
    output_file: Option<&str>,
    to_stdout: bool,
    observer: &dyn FleetObserver,
    out: &mut dyn Write,
) -> Result<(), FleetError> {
    let role: Role = role.parse()?;
    require_dir(docker_dir)?;
    let path = manifest::output_path(docker_dir, role, output_file);

    let topology = topology::scan_dir(docker_dir, role, observer)?;

    let text = ComposeManifestGenerator::new(config.manifest.clone()).generate(&topology)?;
    if to_stdout {
        return out
            .write_all(text.as_bytes())
            .map_err(|e| FleetError::io("<stdout>", e));
    }

    manifest::write_manifest(&path, &text)?;
    info!(path = %path.display(), services = topology.len(), "manifest written");
    emit(out, &format!("wrote {}", path.display()))
}

fn require_dir(dir: &Path) -> Result<(), FleetError> {
    if dir.is_dir() {
        Ok(())
    } else {
        Err(FleetError::Validation(format!(
            "{} does not exist or is not a directory",
            dir.display()
        )))
    }
}

fn emit(out: &mut dyn Write, line: &str) -> Result<(), FleetError> {
    writeln!(out, "{line}").map_err(|e| FleetError::io("<stdout>", e))
}
