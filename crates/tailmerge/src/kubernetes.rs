//! Kubernetes-backed [`ClusterApi`].
//!
//! Instances are pods, workloads are deployments and channels are the pod's
//! containers in spec order. Requires the `kube` feature.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as meta;
use kube::api::{Api, ListParams, LogParams};
use kube::Client;
use tokio_util::compat::FuturesAsyncReadCompatExt;
use tracing::debug;

use crate::cluster::{ClusterApi, ClusterFuture, InstanceDescriptor, LogStream, LogStreamParams};
use crate::error::{ResourceKind, Result, TailError};
use crate::selector::{LabelSelector, Operator, Requirement};

/// [`ClusterApi`] over a Kubernetes API server.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    /// Wraps an existing client.
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connects using the ambient kubeconfig or in-cluster environment.
    ///
    /// # Errors
    ///
    /// Returns [`TailError::Config`] if no usable configuration is found.
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default()
            .await
            .map_err(|e| TailError::Config(format!("failed to create kubernetes client: {e}")))?;
        Ok(Self::new(client))
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

impl ClusterApi for KubeCluster {
    fn instance_channels<'a>(
        &'a self,
        namespace: &'a str,
        instance: &'a str,
    ) -> ClusterFuture<'a, Vec<String>> {
        Box::pin(async move {
            let pod = self
                .pods(namespace)
                .get(instance)
                .await
                .map_err(|e| lookup_error(ResourceKind::Instance, instance, &e))?;
            Ok(pod
                .spec
                .map(|spec| spec.containers.into_iter().map(|c| c.name).collect())
                .unwrap_or_default())
        })
    }

    fn workload_selector<'a>(
        &'a self,
        namespace: &'a str,
        workload: &'a str,
    ) -> ClusterFuture<'a, LabelSelector> {
        Box::pin(async move {
            let deployment = self
                .deployments(namespace)
                .get(workload)
                .await
                .map_err(|e| lookup_error(ResourceKind::Workload, workload, &e))?;
            let selector = deployment.spec.map(|spec| spec.selector).unwrap_or_default();
            convert_selector(&selector)
        })
    }

    fn list_instances<'a>(
        &'a self,
        namespace: &'a str,
        selector: &'a str,
    ) -> ClusterFuture<'a, Vec<InstanceDescriptor>> {
        Box::pin(async move {
            let params = ListParams::default().labels(selector);
            let pods = self
                .pods(namespace)
                .list(&params)
                .await
                .map_err(|e| lookup_error(ResourceKind::Namespace, namespace, &e))?;
            debug!(namespace, selector, pods = pods.items.len(), "listed pods");
            Ok(pods
                .items
                .into_iter()
                .filter_map(|pod| {
                    let name = pod.metadata.name?;
                    Some(InstanceDescriptor {
                        name,
                        labels: pod.metadata.labels.unwrap_or_default(),
                    })
                })
                .collect())
        })
    }

    fn open_log_stream<'a>(
        &'a self,
        namespace: &'a str,
        instance: &'a str,
        params: &'a LogStreamParams,
    ) -> ClusterFuture<'a, LogStream> {
        Box::pin(async move {
            let log_params = LogParams {
                container: Some(params.channel.clone()),
                follow: params.follow,
                previous: params.previous,
                timestamps: params.timestamps,
                limit_bytes: params.limit_bytes,
                since_time: params.since_time,
                tail_lines: params.tail_lines,
                ..LogParams::default()
            };
            let reader = self
                .pods(namespace)
                .log_stream(instance, &log_params)
                .await
                .map_err(|e| TailError::stream(instance, e))?;
            let stream: LogStream = Box::pin(reader.compat());
            Ok(stream)
        })
    }
}

fn is_not_found(e: &kube::Error) -> bool {
    matches!(
        e,
        kube::Error::Api(kube::core::ErrorResponse { code: 404, .. })
    )
}

fn lookup_error(kind: ResourceKind, name: &str, e: &kube::Error) -> TailError {
    if is_not_found(e) {
        TailError::not_found(kind, name)
    } else {
        TailError::stream(name, e)
    }
}

/// Converts a Kubernetes label selector into requirements, `matchLabels`
/// first (ordered by key), then `matchExpressions` in declared order.
fn convert_selector(selector: &meta::LabelSelector) -> Result<LabelSelector> {
    let labels: BTreeMap<String, String> = selector.match_labels.clone().unwrap_or_default();
    let mut converted = LabelSelector::from_match_labels(&labels);

    for expression in selector.match_expressions.iter().flatten() {
        let operator = match expression.operator.as_str() {
            "In" => Operator::In,
            "NotIn" => Operator::NotIn,
            "Exists" => Operator::Exists,
            "DoesNotExist" => Operator::DoesNotExist,
            other => {
                return Err(TailError::Selection(format!(
                    "unsupported operator {other:?} on key {:?}",
                    expression.key
                )));
            }
        };
        converted.requirements.push(Requirement {
            key: expression.key.clone(),
            operator,
            values: expression.values.clone().unwrap_or_default(),
        });
    }

    Ok(converted)
}
