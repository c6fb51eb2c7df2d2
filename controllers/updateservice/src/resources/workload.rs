//! The operand Deployment: volumes, containers and pod template

use super::names::{
    CLUSTER_CA_CONFIG_MAP, CLUSTER_CA_MOUNT_DIR, ENV_CONFIG_HASH_ANNOTATION,
    GRAPH_BUILDER_CONFIG_HASH_ANNOTATION, GRAPH_DATA_DIGEST_POD, GRAPH_DATA_IMAGE_ANNOTATION, PULL_SECRET_NAME,
    SSL_CERT_DIR, TRUSTED_CA_VOLUME,
};
use super::{Descriptor, MergePolicy, RenderContext};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy, RollingUpdateDeployment};
use k8s_openapi::api::core::v1::{
    ConfigMapKeySelector, ConfigMapVolumeSource, Container, ContainerPort, EmptyDirVolumeSource, EnvVar,
    EnvVarSource, HTTPGetAction, KeyToPath, Pod, PodSpec, PodTemplateSpec, Probe, ResourceRequirements,
    SecretVolumeSource, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;

/// rw-r--r--
const CONFIG_FILE_MODE: i32 = 0o644;

const CONFIGS_VOLUME: &str = "configs";
const GRAPH_DATA_VOLUME: &str = "cincinnati-graph-data";
const GRAPH_DATA_DIR: &str = "/var/lib/cincinnati/graph-data";

/// The containers the operator manages in the operand pod
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerRole {
    /// Scrapes the release repository and serves the raw graph
    GraphBuilder,
    /// Serves filtered views of the graph to clients
    PolicyEngine,
    /// Init container copying graph data into the shared volume
    GraphData,
}

impl ContainerRole {
    /// Every role, main containers first
    pub const ALL: [ContainerRole; 3] = [
        ContainerRole::GraphBuilder,
        ContainerRole::PolicyEngine,
        ContainerRole::GraphData,
    ];

    /// Container name
    pub fn name(self) -> &'static str {
        match self {
            ContainerRole::GraphBuilder => "graph-builder",
            ContainerRole::PolicyEngine => "policy-engine",
            ContainerRole::GraphData => "graph-data",
        }
    }

    /// Role of a container name, if it is one the operator manages
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.name() == name)
    }

    /// Whether the role runs as an init container
    pub fn is_init(self) -> bool {
        matches!(self, ContainerRole::GraphData)
    }
}

/// Rendered containers of the pod template
#[derive(Debug, Clone)]
pub(crate) struct Containers {
    pub main: Vec<Container>,
    pub init: Vec<Container>,
}

pub(crate) fn volumes(ctx: &RenderContext<'_>, with_trusted_ca: bool, with_cluster_ca: bool) -> Vec<Volume> {
    let mut volumes = vec![
        Volume {
            name: CONFIGS_VOLUME.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: ctx.names.config(),
                default_mode: Some(CONFIG_FILE_MODE),
                ..Default::default()
            }),
            ..Default::default()
        },
        Volume {
            name: GRAPH_DATA_VOLUME.to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        },
        Volume {
            name: PULL_SECRET_NAME.to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(ctx.names.pull_secret()),
                default_mode: Some(CONFIG_FILE_MODE),
                ..Default::default()
            }),
            ..Default::default()
        },
    ];

    if with_trusted_ca {
        volumes.push(Volume {
            name: TRUSTED_CA_VOLUME.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: ctx.names.trusted_ca(),
                default_mode: Some(CONFIG_FILE_MODE),
                items: Some(vec![KeyToPath {
                    key: ctx.ca_cert_key().to_string(),
                    path: "tls-ca-bundle.pem".to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        });
    }
    if with_cluster_ca {
        volumes.push(Volume {
            name: CLUSTER_CA_CONFIG_MAP.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: CLUSTER_CA_CONFIG_MAP.to_string(),
                default_mode: Some(CONFIG_FILE_MODE),
                ..Default::default()
            }),
            ..Default::default()
        });
    }
    volumes
}

pub(crate) fn containers(ctx: &RenderContext<'_>, with_trusted_ca: bool, with_cluster_ca: bool) -> Containers {
    let init = ctx
        .instance
        .spec
        .graph_data_image
        .as_deref()
        .filter(|image| !image.is_empty())
        .map(graph_data_container)
        .into_iter()
        .collect();
    Containers {
        main: vec![
            graph_builder_container(ctx, with_trusted_ca, with_cluster_ca),
            policy_engine_container(ctx),
        ],
        init,
    }
}

pub(crate) fn deployment(
    ctx: &RenderContext<'_>,
    volumes: Vec<Volume>,
    containers: Containers,
    graph_builder_config_hash: &str,
    env_config_hash: &str,
) -> Descriptor<Deployment> {
    let name = ctx.names.deployment();
    let description = format!(
        "This deployment launches the components for the OpenShift UpdateService {name}"
    );
    let deployment = Deployment {
        metadata: ctx.meta(name.clone(), &description),
        spec: Some(DeploymentSpec {
            replicas: Some(ctx.instance.spec.replicas),
            selector: LabelSelector {
                match_labels: Some(labels(&[("app", name.as_str())])),
                ..Default::default()
            },
            strategy: Some(DeploymentStrategy {
                type_: Some("RollingUpdate".to_string()),
                rolling_update: Some(RollingUpdateDeployment {
                    max_unavailable: Some(IntOrString::String("50%".to_string())),
                    max_surge: Some(IntOrString::String("100%".to_string())),
                }),
            }),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels(&[("app", name.as_str()), ("deployment", name.as_str())])),
                    annotations: Some(labels(&[
                        (GRAPH_BUILDER_CONFIG_HASH_ANNOTATION, graph_builder_config_hash),
                        (ENV_CONFIG_HASH_ANNOTATION, env_config_hash),
                    ])),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    volumes: Some(volumes),
                    containers: containers.main,
                    init_containers: (!containers.init.is_empty()).then_some(containers.init),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    };
    ctx.describe(deployment, MergePolicy::Workload)
}

impl Descriptor<Deployment> {
    /// Pin the graph-data image the pods should run by its resolved image ID.
    ///
    /// A tag pushed again under the same name changes the ID and with it the
    /// pod template, which rolls the Deployment out.
    pub fn pin_graph_data_image(&mut self, image_id: &str) {
        let Some(spec) = self.payload.spec.as_mut() else {
            return;
        };
        spec.template
            .metadata
            .get_or_insert_with(ObjectMeta::default)
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(GRAPH_DATA_IMAGE_ANNOTATION.to_string(), image_id.to_string());
    }
}

/// Pod that pulls the graph-data image so its status reveals the digest.
///
/// Not rendered when graph data is disabled or already referenced by digest.
pub(crate) fn graph_data_digest_pod(ctx: &RenderContext<'_>) -> Option<Descriptor<Pod>> {
    let image = ctx
        .instance
        .spec
        .graph_data_image
        .as_deref()
        .filter(|image| !image.is_empty() && !image.contains("@sha256"))?;
    let mut metadata = ctx.meta(
        GRAPH_DATA_DIGEST_POD.to_string(),
        "This pod resolves the graph-data image tag to a digest",
    );
    metadata.labels = Some(labels(&[("app", GRAPH_DATA_DIGEST_POD)]));
    let pod = Pod {
        metadata,
        spec: Some(PodSpec {
            restart_policy: Some("Never".to_string()),
            containers: vec![Container {
                name: ContainerRole::GraphData.name().to_string(),
                image: Some(image.to_string()),
                image_pull_policy: Some("Always".to_string()),
                command: Some(vec!["/bin/sh".to_string(), "-c".to_string(), "--".to_string()]),
                args: Some(vec!["sleep 300;".to_string()]),
                ..Default::default()
            }],
            ..Default::default()
        }),
        status: None,
    };
    Some(ctx.describe(pod, MergePolicy::CreateOnly))
}

pub(crate) fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

fn graph_data_container(image: &str) -> Container {
    Container {
        name: ContainerRole::GraphData.name().to_string(),
        image: Some(image.to_string()),
        image_pull_policy: Some("Always".to_string()),
        volume_mounts: Some(vec![mount(GRAPH_DATA_VOLUME, GRAPH_DATA_DIR, false)]),
        ..Default::default()
    }
}

fn graph_builder_container(ctx: &RenderContext<'_>, with_trusted_ca: bool, with_cluster_ca: bool) -> Container {
    let mut env = vec![config_map_env("RUST_BACKTRACE", "gb.rust_backtrace", ctx)];
    env.extend(ctx.proxy.env_vars().into_iter().map(|(name, value)| EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }));

    let mut mounts = vec![
        mount(CONFIGS_VOLUME, "/etc/configs", true),
        mount(GRAPH_DATA_VOLUME, GRAPH_DATA_DIR, false),
        mount(PULL_SECRET_NAME, "/var/lib/cincinnati/registry-credentials", true),
    ];
    if with_trusted_ca {
        mounts.push(mount(TRUSTED_CA_VOLUME, SSL_CERT_DIR, true));
    }
    if with_cluster_ca {
        mounts.push(mount(CLUSTER_CA_CONFIG_MAP, CLUSTER_CA_MOUNT_DIR, true));
    }

    Container {
        name: ContainerRole::GraphBuilder.name().to_string(),
        image: Some(ctx.operand_image.to_string()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        command: Some(vec!["/usr/bin/graph-builder".to_string()]),
        args: Some(strings(&["-c", "/etc/configs/gb.toml"])),
        ports: Some(vec![port("graph-builder", 8080), port("status-gb", 9080)]),
        env: Some(env),
        resources: Some(operand_resources()),
        volume_mounts: Some(mounts),
        liveness_probe: Some(http_probe("/liveness", 9080, 3, 10)),
        readiness_probe: Some(http_probe("/readiness", 9080, 3, 10)),
        ..Default::default()
    }
}

fn policy_engine_container(ctx: &RenderContext<'_>) -> Container {
    Container {
        name: ContainerRole::PolicyEngine.name().to_string(),
        image: Some(ctx.operand_image.to_string()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        command: Some(vec!["/usr/bin/policy-engine".to_string()]),
        args: Some(strings(&[
            "-$(PE_LOG_VERBOSITY)",
            "--service.address",
            "$(ADDRESS)",
            "--service.mandatory_client_parameters",
            "$(PE_MANDATORY_CLIENT_PARAMETERS)",
            "--service.path_prefix",
            "/api/upgrades_info",
            "--service.port",
            "8081",
            "--status.address",
            "$(PE_STATUS_ADDRESS)",
            "--status.port",
            "9081",
            "--upstream.cincinnati.url",
            "$(UPSTREAM)",
        ])),
        ports: Some(vec![port("policy-engine", 8081), port("status-pe", 9081)]),
        env: Some(vec![
            config_map_env("ADDRESS", "pe.address", ctx),
            config_map_env("PE_STATUS_ADDRESS", "pe.status.address", ctx),
            config_map_env("UPSTREAM", "pe.upstream", ctx),
            config_map_env("PE_LOG_VERBOSITY", "pe.log.verbosity", ctx),
            config_map_env("PE_MANDATORY_CLIENT_PARAMETERS", "pe.mandatory_client_parameters", ctx),
            config_map_env("RUST_BACKTRACE", "pe.rust_backtrace", ctx),
        ]),
        resources: Some(operand_resources()),
        liveness_probe: Some(http_probe("/livez", 9081, 120, 30)),
        readiness_probe: Some(http_probe("/readyz", 9081, 120, 30)),
        ..Default::default()
    }
}

fn operand_resources() -> ResourceRequirements {
    let quantities = |cpu: &str, memory: &str| {
        BTreeMap::from([
            ("cpu".to_string(), Quantity(cpu.to_string())),
            ("memory".to_string(), Quantity(memory.to_string())),
        ])
    };
    ResourceRequirements {
        limits: Some(quantities("750m", "512Mi")),
        requests: Some(quantities("150m", "64Mi")),
        ..Default::default()
    }
}

fn http_probe(path: &str, port: i32, initial_delay_seconds: i32, period_seconds: i32) -> Probe {
    Probe {
        failure_threshold: Some(3),
        success_threshold: Some(1),
        initial_delay_seconds: Some(initial_delay_seconds),
        period_seconds: Some(period_seconds),
        timeout_seconds: Some(3),
        http_get: Some(HTTPGetAction {
            path: Some(path.to_string()),
            port: IntOrString::Int(port),
            scheme: Some("HTTP".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn config_map_env(name: &str, key: &str, ctx: &RenderContext<'_>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            config_map_key_ref: Some(ConfigMapKeySelector {
                key: key.to_string(),
                name: ctx.names.env_config(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn mount(volume: &str, path: &str, read_only: bool) -> VolumeMount {
    VolumeMount {
        name: volume.to_string(),
        mount_path: path.to_string(),
        read_only: read_only.then_some(true),
        ..Default::default()
    }
}

fn port(name: &str, container_port: i32) -> ContainerPort {
    ContainerPort {
        name: Some(name.to_string()),
        container_port,
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}
