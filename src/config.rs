//! Configuration loading with env-var overrides.
//!
//! Every setting has a built-in default, so a config file is optional. The
//! file is taken from `--config`, else `FLEETGEN_CONFIG`, else `fleetgen.toml`
//! in the current directory when present. `FLEETGEN_LOG_LEVEL` overrides the
//! log level.
//!
//! ```toml
//! log_level = "info"
//!
//! [keystore]
//! m_cost = 65536
//! t_cost = 3
//! p_cost = 1
//!
//! [networks.localhost]
//! kind = "local"
//!
//! [networks.sepolia]
//! kind = "public"
//! domain_suffix = "dev.push.org"
//!
//! [register]
//! command_prefix = "npx hardhat --network {network} v:"
//!
//! [manifest]
//! network = "push-dev-network"
//! image_suffix = "node-main"
//! abi_dir = "./_abi/"
//! ```

use std::{
    collections::BTreeMap,
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::{
    artifacts::{manifest::ManifestSettings, register::NetworkEnvironment},
    error::FleetError,
    keystore::KdfParams,
};

pub const DEFAULT_CONFIG_FILE: &str = "fleetgen.toml";
pub const DEFAULT_PUBLIC_DOMAIN: &str = "dev.push.org";

/// Fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub kdf: KdfParams,
    /// Environment name (lowercase) -> how nodes in it are addressed.
    pub networks: BTreeMap<String, NetworkEnvironment>,
    /// Prepended to each registration line; `{network}` expands to the
    /// environment name.
    pub command_prefix: String,
    pub manifest: ManifestSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            kdf: KdfParams::default(),
            networks: default_networks(),
            command_prefix: String::new(),
            manifest: ManifestSettings::default(),
        }
    }
}

impl Config {
    /// Look up a named environment. Names compare case-insensitively.
    pub fn environment(&self, name: &str) -> Result<NetworkEnvironment, FleetError> {
        self.networks
            .get(&name.trim().to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| FleetError::UnsupportedEnvironment(name.to_string()))
    }
}

/// Raw TOML shape — `serde` target before resolution.
#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    log_level: Option<String>,
    #[serde(default)]
    keystore: RawKeystore,
    #[serde(default)]
    networks: BTreeMap<String, RawNetwork>,
    #[serde(default)]
    register: RawRegister,
    #[serde(default)]
    manifest: RawManifest,
}

#[derive(Deserialize, Default)]
struct RawKeystore {
    m_cost: Option<u32>,
    t_cost: Option<u32>,
    p_cost: Option<u32>,
}

#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum RawNetwork {
    Local,
    Public { domain_suffix: String },
}

#[derive(Deserialize, Default)]
struct RawRegister {
    #[serde(default)]
    command_prefix: String,
}

#[derive(Deserialize, Default)]
struct RawManifest {
    network: Option<String>,
    image_suffix: Option<String>,
    abi_dir: Option<String>,
    archival_entrypoint: Option<Vec<String>>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_networks() -> BTreeMap<String, NetworkEnvironment> {
    let public = NetworkEnvironment::Public { domain_suffix: DEFAULT_PUBLIC_DOMAIN.to_string() };
    BTreeMap::from([
        ("local".to_string(), NetworkEnvironment::Local),
        ("localhost".to_string(), NetworkEnvironment::Local),
        ("public".to_string(), public.clone()),
        ("sepolia".to_string(), public),
    ])
}

/// Resolve the config file location and load it, then apply env overrides.
pub fn load(explicit: Option<&Path>) -> Result<Config, FleetError> {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(|| env::var("FLEETGEN_CONFIG").ok().map(PathBuf::from))
        .or_else(|| {
            let p = PathBuf::from(DEFAULT_CONFIG_FILE);
            p.is_file().then_some(p)
        });
    let log_level_override = env::var("FLEETGEN_LOG_LEVEL").ok();

    match path {
        Some(p) => load_from(&p, log_level_override.as_deref()),
        None => {
            let mut cfg = Config::default();
            if let Some(level) = log_level_override {
                cfg.log_level = level;
            }
            Ok(cfg)
        }
    }
}

/// Internal loader — accepts an explicit path and optional overrides.
/// Tests pass overrides directly instead of mutating env vars.
pub fn load_from(path: &Path, log_level_override: Option<&str>) -> Result<Config, FleetError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| FleetError::Config(format!("cannot read {}: {e}", path.display())))?;
    let mut cfg = parse(&raw)
        .map_err(|e| FleetError::Config(format!("{} in {}", e, path.display())))?;
    if let Some(level) = log_level_override {
        cfg.log_level = level.to_string();
    }
    Ok(cfg)
}

fn parse(text: &str) -> Result<Config, String> {
    let parsed: RawConfig = toml::from_str(text).map_err(|e| format!("parse error: {e}"))?;
    let defaults = Config::default();

    let kdf = KdfParams {
        m_cost: parsed.keystore.m_cost.unwrap_or(defaults.kdf.m_cost),
        t_cost: parsed.keystore.t_cost.unwrap_or(defaults.kdf.t_cost),
        p_cost: parsed.keystore.p_cost.unwrap_or(defaults.kdf.p_cost),
    };
    if kdf.t_cost == 0 || kdf.p_cost == 0 || kdf.m_cost < kdf.p_cost.saturating_mul(8) {
        return Err(format!(
            "keystore cost out of range (m_cost={}, t_cost={}, p_cost={})",
            kdf.m_cost, kdf.t_cost, kdf.p_cost
        ));
    }

    // Configured environments extend and override the built-in ones.
    let mut networks = defaults.networks;
    for (name, raw) in parsed.networks {
        let env = match raw {
            RawNetwork::Local => NetworkEnvironment::Local,
            RawNetwork::Public { domain_suffix } => {
                let suffix = domain_suffix.trim().trim_matches('.').to_string();
                if suffix.is_empty() {
                    return Err(format!("network '{name}': domain_suffix must not be empty"));
                }
                NetworkEnvironment::Public { domain_suffix: suffix }
            }
        };
        networks.insert(name.to_ascii_lowercase(), env);
    }

    let m = parsed.manifest;
    let manifest = ManifestSettings {
        network: m.network.unwrap_or(defaults.manifest.network),
        image_suffix: m.image_suffix.unwrap_or(defaults.manifest.image_suffix),
        abi_dir: m.abi_dir.unwrap_or(defaults.manifest.abi_dir),
        archival_entrypoint: m
            .archival_entrypoint
            .unwrap_or(defaults.manifest.archival_entrypoint),
    };

    Ok(Config {
        log_level: parsed.log_level.unwrap_or(defaults.log_level),
        kdf,
        networks,
        command_prefix: parsed.register.command_prefix,
        manifest,
    })
}
