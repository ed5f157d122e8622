//! Compose manifest — one container service per provisioned slot.
//!
//! Rendering goes through `serde_yaml` over plain structs, so field order is
//! fixed by declaration order and services keep topology order. The same
//! topology always renders to the same bytes.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::{Serialize, Serializer};

use crate::{
    error::FleetError,
    fleet::{NodeSlot, Role},
    persist,
    topology::{Topology, TopologyEntry},
};

/// Knobs shared by every service in a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestSettings {
    /// External container network every service joins.
    pub network: String,
    /// Image name is `<letter><image_suffix>`, e.g. `vnode-main`.
    pub image_suffix: String,
    /// Host directory holding contract ABIs, mounted read-only by convention.
    pub abi_dir: String,
    /// Entrypoint override for archival nodes, which need a bootstrap script.
    pub archival_entrypoint: Vec<String>,
}

impl Default for ManifestSettings {
    fn default() -> Self {
        Self {
            network: "push-dev-network".into(),
            image_suffix: "node-main".into(),
            abi_dir: "./_abi/".into(),
            archival_entrypoint: vec!["sh".into(), "/entrypoint.sh".into()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestService {
    #[serde(skip)]
    pub service_name: String,
    #[serde(skip)]
    pub port: u16,
    pub image: String,
    pub container_name: String,
    pub networks: BTreeMap<String, NetworkAttachment>,
    pub environment: ServiceEnvironment,
    pub env_file: Vec<String>,
    pub ports: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<Vec<String>>,
    pub volumes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkAttachment {
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceEnvironment {
    #[serde(rename = "DB_NAME")]
    pub db_name: String,
    #[serde(rename = "PORT")]
    pub port: u16,
}

#[derive(Serialize)]
struct ComposeDocument<'a> {
    version: &'static str,
    #[serde(serialize_with = "services_in_order")]
    services: &'a [ManifestService],
    networks: BTreeMap<&'a str, ExternalNetwork>,
}

#[derive(Serialize)]
struct ExternalNetwork {
    external: bool,
}

fn services_in_order<S>(services: &&[ManifestService], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_map(services.iter().map(|s| (s.service_name.as_str(), s)))
}

#[derive(Debug, Clone, Default)]
pub struct ComposeManifestGenerator {
    settings: ManifestSettings,
}

impl ComposeManifestGenerator {
    pub fn new(settings: ManifestSettings) -> Self {
        Self { settings }
    }

    /// Service block for one topology entry. Volumes mount the directory the
    /// entry's keystore was read from.
    pub fn service(&self, entry: &TopologyEntry) -> ManifestService {
        let slot = entry.slot;
        let dir = &entry.dir;
        let l = slot.role.letter();
        let n = slot.index;
        let name = format!("{l}node{n}");
        let port = slot.port();

        let networks = BTreeMap::from([(
            self.settings.network.clone(),
            NetworkAttachment { aliases: vec![format!("{name}.local")] },
        )]);
        let entrypoint = (slot.role == Role::Archival)
            .then(|| self.settings.archival_entrypoint.clone());

        ManifestService {
            service_name: name.clone(),
            port,
            image: format!("{l}{}", self.settings.image_suffix),
            container_name: name.clone(),
            networks,
            environment: ServiceEnvironment { db_name: name, port },
            env_file: vec![".env".into(), "common.env".into(), format!("{l}-specific.env")],
            ports: vec![format!("{port}:{port}")],
            entrypoint,
            volumes: vec![
                format!("./{dir}:/config"),
                format!("./{dir}/log:/log"),
                format!("{}:/config/abi/", self.settings.abi_dir),
            ],
        }
    }

    pub fn services(&self, topology: &Topology) -> Vec<ManifestService> {
        topology.entries().iter().map(|e| self.service(e)).collect()
    }

    /// Render the manifest for `topology` as YAML.
    pub fn generate(&self, topology: &Topology) -> Result<String, FleetError> {
        let services = self.services(topology);
        let doc = ComposeDocument {
            version: "3",
            services: &services,
            networks: BTreeMap::from([(
                self.settings.network.as_str(),
                ExternalNetwork { external: true },
            )]),
        };
        serde_yaml::to_string(&doc).map_err(|e| FleetError::Serialize(e.to_string()))
    }
}

/// Where `generate-manifest` writes: `<dir>/<letter>.yml` by default, or
/// `file` resolved against `dir` when relative.
pub fn output_path(dir: &Path, role: Role, file: Option<&str>) -> PathBuf {
    match file.map(str::trim).filter(|f| !f.is_empty()) {
        Some(f) => dir.join(f),
        None => dir.join(format!("{}.yml", role.letter())),
    }
}

/// Write a rendered manifest in one piece.
pub fn write_manifest(path: &Path, text: &str) -> Result<(), FleetError> {
    persist::write_atomic(path, text.as_bytes(), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::TopologyEntry;
    use serde_yaml::Value;

    fn topology(role: Role, indices: &[u32]) -> Topology {
        Topology::from_entries(
            role,
            indices
                .iter()
                .map(|&i| TopologyEntry::new(NodeSlot::new(role, i), format!("{:040x}", i).parse().unwrap())),
        )
    }

    fn parse(text: &str) -> Value {
        serde_yaml::from_str(text).unwrap()
    }

    #[test]
    fn validator_service_block() {
        let text = ComposeManifestGenerator::default()
            .generate(&topology(Role::Validator, &[2]))
            .unwrap();
        let doc = parse(&text);

        assert_eq!(doc["version"], Value::from("3"));
        let svc = &doc["services"]["vnode2"];
        assert_eq!(svc["image"], Value::from("vnode-main"));
        assert_eq!(svc["container_name"], Value::from("vnode2"));
        assert_eq!(svc["environment"]["DB_NAME"], Value::from("vnode2"));
        assert_eq!(svc["environment"]["PORT"].as_u64(), Some(4002));
        assert_eq!(svc["ports"][0], Value::from("4002:4002"));
        assert_eq!(svc["networks"]["push-dev-network"]["aliases"][0], Value::from("vnode2.local"));
        assert_eq!(svc["env_file"][2], Value::from("v-specific.env"));
        assert_eq!(svc["volumes"][0], Value::from("./v2:/config"));
        assert_eq!(svc["volumes"][1], Value::from("./v2/log:/log"));
        assert_eq!(svc["volumes"][2], Value::from("./_abi/:/config/abi/"));
        assert!(svc.get("entrypoint").is_none());
        assert_eq!(doc["networks"]["push-dev-network"]["external"], Value::from(true));
    }

    #[test]
    fn only_archival_gets_entrypoint() {
        let generator = ComposeManifestGenerator::default();
        let archival = parse(&generator.generate(&topology(Role::Archival, &[1])).unwrap());
        let svc = &archival["services"]["anode1"];
        assert_eq!(svc["entrypoint"][0], Value::from("sh"));
        assert_eq!(svc["entrypoint"][1], Value::from("/entrypoint.sh"));
        assert_eq!(svc["ports"][0], Value::from("5001:5001"));

        let storage = parse(&generator.generate(&topology(Role::Storage, &[1])).unwrap());
        assert!(storage["services"]["snode1"].get("entrypoint").is_none());
        assert_eq!(storage["services"]["snode1"]["ports"][0], Value::from("3001:3001"));
    }

    #[test]
    fn services_keep_index_order() {
        let text = ComposeManifestGenerator::default()
            .generate(&topology(Role::Validator, &[10, 2, 1]))
            .unwrap();
        let p1 = text.find("vnode1:").unwrap();
        let p2 = text.find("vnode2:").unwrap();
        let p10 = text.find("vnode10:").unwrap();
        assert!(p1 < p2 && p2 < p10);
    }

    #[test]
    fn generation_is_byte_identical() {
        let generator = ComposeManifestGenerator::default();
        let t = topology(Role::Archival, &[1, 2, 3]);
        assert_eq!(generator.generate(&t).unwrap(), generator.generate(&t).unwrap());
    }

    #[test]
    fn settings_flow_into_services() {
        let generator = ComposeManifestGenerator::new(ManifestSettings {
            network: "fleet-net".into(),
            image_suffix: "node-dev".into(),
            abi_dir: "/srv/abi".into(),
            ..ManifestSettings::default()
        });
        let address = format!("{:040x}", 3).parse().unwrap();
        let svc = generator.service(&TopologyEntry::new(NodeSlot::new(Role::Storage, 3), address));
        assert_eq!(svc.image, "snode-dev");
        assert!(svc.networks.contains_key("fleet-net"));
        assert_eq!(svc.volumes[2], "/srv/abi:/config/abi/");
    }

    #[test]
    fn volumes_follow_the_scanned_directory() {
        let address = format!("{:040x}", 1).parse().unwrap();
        let entry = TopologyEntry { dir: "V1".into(), ..TopologyEntry::new(NodeSlot::new(Role::Validator, 1), address) };
        let svc = ComposeManifestGenerator::default().service(&entry);
        assert_eq!(svc.service_name, "vnode1");
        assert_eq!(svc.volumes[0], "./V1:/config");
        assert_eq!(svc.volumes[1], "./V1/log:/log");
    }

    #[test]
    fn highest_index_gets_top_port() {
        let text = ComposeManifestGenerator::default()
            .generate(&topology(Role::Storage, &[Role::Storage.max_index()]))
            .unwrap();
        let doc = parse(&text);
        assert_eq!(doc["services"]["snode62535"]["ports"][0], Value::from("65535:65535"));
    }

    #[test]
    fn output_path_defaults_to_role_file() {
        let dir = Path::new("/docker");
        assert_eq!(output_path(dir, Role::Validator, None), PathBuf::from("/docker/v.yml"));
        assert_eq!(output_path(dir, Role::Archival, Some("")), PathBuf::from("/docker/a.yml"));
        assert_eq!(output_path(dir, Role::Storage, Some("s-test.yml")), PathBuf::from("/docker/s-test.yml"));
        assert_eq!(output_path(dir, Role::Storage, Some("/tmp/x.yml")), PathBuf::from("/tmp/x.yml"));
    }
}
