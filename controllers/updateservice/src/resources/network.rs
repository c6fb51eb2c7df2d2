//! Services, route, disruption budget and network policy

use super::workload::labels;
use super::{Descriptor, MergePolicy, RenderContext};
use crds::{Route, RoutePort, RouteSpec, RouteTargetPort, RouteTargetReference, TlsConfig};
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::api::networking::v1::{
    NetworkPolicy, NetworkPolicyEgressRule, NetworkPolicyIngressRule, NetworkPolicyPeer, NetworkPolicyPort,
    NetworkPolicySpec,
};
use k8s_openapi::api::policy::v1::{PodDisruptionBudget, PodDisruptionBudgetSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

const POLICY_ENGINE_DESCRIPTION: &str = "It exposes views of the update graph by applying a set of filters \
     which are defined within the particular Policy Engine instance. \
     See https://github.com/openshift/cincinnati/blob/master/docs/design/cincinnati.md#policy-engine for more details";

/// Minimum available pods for a replica count.
///
/// A single replica may be evicted, otherwise node drains would block.
pub(crate) fn min_available(replicas: i32) -> i32 {
    if replicas >= 2 { 1 } else { 0 }
}

pub(crate) fn graph_builder_service(ctx: &RenderContext<'_>) -> Descriptor<Service> {
    let name = ctx.names.graph_builder_service();
    let mut metadata = ctx.meta(
        name.clone(),
        "This Service exposes a client-agnostic update graph to other clients within the cluster. \
         This allows convenient in-cluster access to those graphs, and also allows platform monitoring to \
         scrape graph-builder containers for Prometheus metrics. \
         See https://github.com/openshift/cincinnati/blob/master/docs/design/cincinnati.md#graph-builder for more details",
    );
    metadata.labels = Some(labels(&[("app", name.as_str())]));
    let service = Service {
        metadata,
        spec: Some(service_spec(
            ctx,
            vec![
                service_port("graph-builder", 8080, 8080),
                service_port("status-gb", 9080, 9080),
            ],
        )),
        ..Default::default()
    };
    ctx.describe(service, MergePolicy::Service)
}

pub(crate) fn policy_engine_service(ctx: &RenderContext<'_>) -> Descriptor<Service> {
    let name = ctx.names.policy_engine_service();
    let mut metadata = ctx.meta(name.clone(), POLICY_ENGINE_DESCRIPTION);
    metadata.labels = Some(labels(&[("app", name.as_str())]));
    let service = Service {
        metadata,
        spec: Some(service_spec(
            ctx,
            vec![
                service_port("policy-engine", 80, 8081),
                service_port("status-pe", 9081, 9081),
            ],
        )),
        ..Default::default()
    };
    ctx.describe(service, MergePolicy::Service)
}

pub(crate) fn route(ctx: &RenderContext<'_>) -> Descriptor<Route> {
    let mut metadata = ctx.meta(ctx.names.route(), POLICY_ENGINE_DESCRIPTION);
    metadata.labels = Some(labels(&[("app", ctx.names.deployment().as_str())]));
    let route = Route {
        metadata,
        spec: RouteSpec {
            to: RouteTargetReference {
                kind: "Service".to_string(),
                name: ctx.names.policy_engine_service(),
                weight: Some(100),
            },
            port: Some(RoutePort {
                target_port: RouteTargetPort::Name("policy-engine".to_string()),
            }),
            tls: Some(TlsConfig {
                termination: "edge".to_string(),
                insecure_edge_termination_policy: Some("None".to_string()),
                ..Default::default()
            }),
            wildcard_policy: Some("None".to_string()),
            ..Default::default()
        },
        status: None,
    };
    ctx.describe(route, MergePolicy::RouteExceptTls)
}

pub(crate) fn pod_disruption_budget(ctx: &RenderContext<'_>) -> Descriptor<PodDisruptionBudget> {
    let pdb = PodDisruptionBudget {
        metadata: ctx.meta(
            ctx.names.deployment(),
            "This PodDisruptionBudget blocks graceful evictions \
             (but cannot guard against all external disruption) \
             to try and keep at least one Pod running at all times, if the Update Service instance \
             specifies two or more replicas.",
        ),
        spec: Some(PodDisruptionBudgetSpec {
            min_available: Some(IntOrString::Int(min_available(ctx.instance.spec.replicas))),
            selector: Some(app_selector(ctx)),
            ..Default::default()
        }),
        ..Default::default()
    };
    ctx.describe(pdb, MergePolicy::FullSpec)
}

pub(crate) fn network_policy(ctx: &RenderContext<'_>) -> Descriptor<NetworkPolicy> {
    let name = ctx.names.deployment();
    let mut metadata = ctx.meta(
        name.clone(),
        "This NetworkPolicy allows all egress, to support graph-builder scraping and DNS. \
         It allows ingress from the router, to support serving policy-engine responses. \
         All other ingress is blocked, including, for now, metrics scraping.",
    );
    metadata.labels = Some(labels(&[("app", name.as_str())]));

    let dns_port = |protocol: &str| NetworkPolicyPort {
        protocol: Some(protocol.to_string()),
        port: Some(IntOrString::Int(5353)),
        ..Default::default()
    };
    let policy = NetworkPolicy {
        metadata,
        spec: Some(NetworkPolicySpec {
            pod_selector: Some(app_selector(ctx)),
            policy_types: Some(vec!["Ingress".to_string(), "Egress".to_string()]),
            // router to policy-engine
            ingress: Some(vec![NetworkPolicyIngressRule {
                from: Some(vec![NetworkPolicyPeer {
                    namespace_selector: Some(selector(&[("policy-group.network.openshift.io/ingress", "")])),
                    ..Default::default()
                }]),
                ports: Some(vec![NetworkPolicyPort {
                    protocol: Some("TCP".to_string()),
                    port: Some(IntOrString::String("policy-engine".to_string())),
                    ..Default::default()
                }]),
            }]),
            egress: Some(vec![
                // registry access on any port, possibly through a proxy
                NetworkPolicyEgressRule {
                    ports: Some(vec![NetworkPolicyPort {
                        protocol: Some("TCP".to_string()),
                        ..Default::default()
                    }]),
                    ..Default::default()
                },
                NetworkPolicyEgressRule {
                    to: Some(vec![NetworkPolicyPeer {
                        namespace_selector: Some(selector(&[("kubernetes.io/metadata.name", "openshift-dns")])),
                        pod_selector: Some(selector(&[("dns.operator.openshift.io/daemonset-dns", "default")])),
                        ..Default::default()
                    }]),
                    ports: Some(vec![dns_port("TCP"), dns_port("UDP")]),
                },
            ]),
        }),
        ..Default::default()
    };
    ctx.describe(policy, MergePolicy::FullSpec)
}

fn service_spec(ctx: &RenderContext<'_>, ports: Vec<ServicePort>) -> ServiceSpec {
    ServiceSpec {
        type_: Some("ClusterIP".to_string()),
        ports: Some(ports),
        selector: Some(labels(&[("deployment", ctx.names.deployment().as_str())])),
        session_affinity: Some("None".to_string()),
        ..Default::default()
    }
}

fn service_port(name: &str, port: i32, target_port: i32) -> ServicePort {
    ServicePort {
        name: Some(name.to_string()),
        port,
        target_port: Some(IntOrString::Int(target_port)),
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}

fn app_selector(ctx: &RenderContext<'_>) -> LabelSelector {
    selector(&[("app", ctx.names.deployment().as_str())])
}

fn selector(pairs: &[(&str, &str)]) -> LabelSelector {
    LabelSelector {
        match_labels: Some(labels(pairs)),
        ..Default::default()
    }
}
