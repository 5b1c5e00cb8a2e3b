//! Kubernetes backend
//!
//! Runs each batch as one pod through `kubectl`. Pods are labelled with the
//! batch identity and work class so later probes can find them, and with a
//! managed-by label so housekeeping only ever touches pods this executor
//! created.
//!
//! Pod names are generated by the API server from a per-batch prefix, so a
//! batch re-queued while its previous pod is still terminating never
//! collides with it.

use async_trait::async_trait;
use renex_core::Batch;
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use tracing::{debug, info, warn};

use crate::Runner;
use crate::command::ExternalCommand;
use crate::config::KubernetesConfig;
use crate::environment::{REPOSITORIES_VAR, repositories_value};
use crate::error::{Result, RunnerError};

/// Label carrying the batch identity
pub const BATCH_LABEL: &str = "batchId";

/// Label carrying the work class
pub const CLASS_LABEL: &str = "workClass";

const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
const MANAGED_BY_VALUE: &str = "renovate-executor";

/// Minimal view of `kubectl get pods -o json`
#[derive(Debug, Deserialize)]
struct PodList {
    #[serde(default)]
    items: Vec<Pod>,
}

#[derive(Debug, Deserialize)]
struct Pod {
    metadata: PodMetadata,
    #[serde(default)]
    status: Option<PodStatus>,
}

#[derive(Debug, Deserialize)]
struct PodMetadata {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PodStatus {
    #[serde(default)]
    phase: Option<String>,
}

impl Pod {
    fn phase(&self) -> &str {
        self.status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .unwrap_or("Unknown")
    }

    /// Pods still scheduled or running hold their batch's slot
    fn is_active(&self) -> bool {
        matches!(self.phase(), "Running" | "Pending")
    }
}

/// Splits the pods of one batch into "still running" and the finished ones
fn partition_pods(pods: &[Pod]) -> (bool, Vec<&Pod>) {
    let (active, finished): (Vec<&Pod>, Vec<&Pod>) = pods.iter().partition(|pod| pod.is_active());
    (!active.is_empty(), finished)
}

/// Runner backed by a Kubernetes namespace
pub struct KubernetesRunner {
    image: String,
    config: KubernetesConfig,
}

impl KubernetesRunner {
    pub fn new(image: String, config: KubernetesConfig) -> Self {
        Self { image, config }
    }

    fn kubectl(&self) -> ExternalCommand {
        ExternalCommand::new(&self.config.kubectl)
    }

    /// Pod manifest for a batch
    pub fn pod_manifest(&self, batch: &Batch) -> JsonValue {
        let mut spec = json!({
            "restartPolicy": "Never",
            "containers": [{
                "name": "renovate",
                "image": self.image,
                "resources": {
                    "requests": {
                        "cpu": self.config.cpu_request,
                        "memory": self.config.memory_request,
                    },
                    "limits": {
                        "cpu": self.config.cpu_limit,
                        "memory": self.config.memory_limit,
                    },
                },
                "envFrom": [{ "secretRef": { "name": "renovate-secret" } }],
                "env": [{
                    "name": REPOSITORIES_VAR,
                    "value": repositories_value(batch),
                }],
                "volumeMounts": [{
                    "name": "renovate-config",
                    "mountPath": "/tmp/config/",
                }],
            }],
            "volumes": [{
                "name": "renovate-config",
                "configMap": { "defaultMode": 420, "name": "renovate-config" },
            }],
        });

        if let Some(secret) = &self.config.image_pull_secret {
            spec["imagePullSecrets"] = json!([{ "name": secret }]);
        }

        json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "generateName": format!("{}-", batch.job_name()),
                "namespace": self.config.namespace,
                "labels": {
                    BATCH_LABEL: batch.id.as_str(),
                    CLASS_LABEL: batch.class.as_str(),
                    MANAGED_BY_LABEL: MANAGED_BY_VALUE,
                },
            },
            "spec": spec,
        })
    }

    fn batch_selector(batch: &Batch) -> String {
        format!("{}={},{}={}", BATCH_LABEL, batch.id, CLASS_LABEL, batch.class)
    }

    fn managed_selector() -> String {
        format!("{}={}", MANAGED_BY_LABEL, MANAGED_BY_VALUE)
    }

    async fn list_pods(&self, selector: &str) -> std::result::Result<Vec<Pod>, String> {
        let output = self
            .kubectl()
            .args(["get", "pods", "-n", self.config.namespace.as_str()])
            .args(["-l", selector, "-o", "json"])
            .output()
            .await
            .map_err(|e| format!("failed to execute kubectl get pods: {}", e))?;

        if !output.success() {
            return Err(format!("kubectl get pods failed: {}", output.failure_summary()));
        }

        let list: PodList = serde_json::from_str(&output.stdout)
            .map_err(|e| format!("failed to parse pod list: {}", e))?;

        Ok(list.items)
    }

    async fn delete_pod(&self, name: &str) -> std::result::Result<(), String> {
        info!("Deleting pod {}", name);

        let output = self
            .kubectl()
            .args(["delete", "pod", name, "-n", self.config.namespace.as_str()])
            .args(["--ignore-not-found", "--wait=false"])
            .output()
            .await
            .map_err(|e| format!("failed to execute kubectl delete pod: {}", e))?;

        if !output.success() {
            return Err(format!(
                "failed to delete pod {}: {}",
                name,
                output.failure_summary()
            ));
        }

        Ok(())
    }
}

#[async_trait]
impl Runner for KubernetesRunner {
    fn name(&self) -> &'static str {
        "kubernetes"
    }

    async fn verify(&self) -> Result<()> {
        let output = self
            .kubectl()
            .args(["version", "--client"])
            .output()
            .await
            .map_err(|e| {
                RunnerError::Config(format!(
                    "failed to execute '{} version'. Is kubectl installed? {}",
                    self.config.kubectl, e
                ))
            })?;

        if !output.success() {
            return Err(RunnerError::Config(format!(
                "kubectl is not working correctly: {}",
                output.failure_summary()
            )));
        }

        info!(
            "kubectl is available, using namespace {}",
            self.config.namespace
        );
        Ok(())
    }

    async fn run_job(&self, batch: &Batch) -> Result<()> {
        let manifest = self.pod_manifest(batch).to_string();

        let output = self
            .kubectl()
            .args(["create", "-n", self.config.namespace.as_str(), "-f", "-", "-o", "name"])
            .stdin(manifest)
            .output()
            .await
            .map_err(|e| {
                RunnerError::launch(batch, format!("failed to execute kubectl create: {}", e))
            })?;

        if !output.success() {
            return Err(RunnerError::launch(batch, output.failure_summary()));
        }

        info!("Created {} for batch {}", output.stdout.trim(), batch.id);
        Ok(())
    }

    async fn check_job(&self, batch: &Batch) -> Result<bool> {
        let pods = self
            .list_pods(&Self::batch_selector(batch))
            .await
            .map_err(|e| RunnerError::probe(batch, e))?;

        if pods.is_empty() {
            debug!("Pod for batch {} not found", batch.id);
            return Ok(false);
        }

        let (running, finished) = partition_pods(&pods);
        for pod in finished {
            debug!("Pod {} finished in phase {}", pod.metadata.name, pod.phase());
            if let Err(e) = self.delete_pod(&pod.metadata.name).await {
                // housekeeping retries on the next tick
                warn!("{}", e);
            }
        }

        Ok(running)
    }

    async fn clean_up(&self) -> Result<()> {
        let pods = self
            .list_pods(&Self::managed_selector())
            .await
            .map_err(RunnerError::Cleanup)?;

        let mut failures = Vec::new();
        for pod in pods.iter().filter(|pod| !pod.is_active()) {
            if let Err(e) = self.delete_pod(&pod.metadata.name).await {
                failures.push(e);
            }
        }

        if !failures.is_empty() {
            return Err(RunnerError::Cleanup(failures.join("; ")));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use renex_core::{Repository, WorkClass};

    fn batch() -> Batch {
        Batch::new(
            WorkClass::Scheduled,
            vec![
                Repository::new("1", "acme/api", "https://git.example/acme/api"),
                Repository::new("2", "acme/web", "https://git.example/acme/web"),
            ],
        )
        .unwrap()
    }

    fn runner(config: KubernetesConfig) -> KubernetesRunner {
        KubernetesRunner::new("renovate/renovate".to_string(), config)
    }

    #[test]
    fn test_pod_manifest() {
        let batch = batch();
        let manifest = runner(KubernetesConfig::default()).pod_manifest(&batch);

        assert_eq!(manifest["kind"], "Pod");
        assert!(manifest["metadata"].get("name").is_none());
        assert_eq!(
            manifest["metadata"]["generateName"],
            format!("{}-", batch.job_name())
        );
        assert_eq!(manifest["metadata"]["namespace"], "renovate-executor");
        assert_eq!(manifest["metadata"]["labels"]["batchId"], batch.id.as_str());
        assert_eq!(manifest["metadata"]["labels"]["workClass"], "scheduled");

        let container = &manifest["spec"]["containers"][0];
        assert_eq!(container["image"], "renovate/renovate");
        assert_eq!(container["resources"]["requests"]["cpu"], "1000m");
        assert_eq!(container["resources"]["limits"]["memory"], "2048Mi");
        assert_eq!(container["env"][0]["name"], "RENOVATE_REPOSITORIES");
        assert_eq!(container["env"][0]["value"], r#"["acme/api","acme/web"]"#);
        assert_eq!(manifest["spec"]["restartPolicy"], "Never");
        assert!(manifest["spec"].get("imagePullSecrets").is_none());
    }

    #[test]
    fn test_pod_manifest_with_pull_secret() {
        let config = KubernetesConfig {
            image_pull_secret: Some("regcred".to_string()),
            ..KubernetesConfig::default()
        };
        let manifest = runner(config).pod_manifest(&batch());
        assert_eq!(manifest["spec"]["imagePullSecrets"][0]["name"], "regcred");
    }

    #[test]
    fn test_label_values_fit_kubernetes_limits() {
        let batch = batch();
        assert_eq!(batch.id.as_str().len(), 40);
        assert!(batch.job_name().len() <= 63);
    }

    #[test]
    fn test_terminating_pod_does_not_hide_its_successor() {
        // a re-queued batch: the old pod is being deleted, the new one runs
        let list: PodList = serde_json::from_str(
            r#"{"items":[
                {"metadata":{"name":"renovate-event-1-x7k2p"},"status":{"phase":"Succeeded"}},
                {"metadata":{"name":"renovate-event-1-q9d4m"},"status":{"phase":"Running"}}
            ]}"#,
        )
        .unwrap();

        let (running, finished) = partition_pods(&list.items);
        assert!(running);
        let names: Vec<&str> = finished.iter().map(|p| p.metadata.name.as_str()).collect();
        assert_eq!(names, vec!["renovate-event-1-x7k2p"]);

        let (running, finished) = partition_pods(&list.items[..1]);
        assert!(!running);
        assert_eq!(finished.len(), 1);
    }

    #[test]
    fn test_selectors() {
        let batch = batch();
        assert_eq!(
            KubernetesRunner::batch_selector(&batch),
            format!("batchId={},workClass=scheduled", batch.id)
        );
        assert_eq!(
            KubernetesRunner::managed_selector(),
            "app.kubernetes.io/managed-by=renovate-executor"
        );
    }

    #[test]
    fn test_pod_list_parsing_and_phases() {
        let list: PodList = serde_json::from_str(
            r#"{"items":[
                {"metadata":{"name":"a"},"status":{"phase":"Running"}},
                {"metadata":{"name":"b"},"status":{"phase":"Pending"}},
                {"metadata":{"name":"c"},"status":{"phase":"Succeeded"}},
                {"metadata":{"name":"d"}}
            ]}"#,
        )
        .unwrap();

        let active: Vec<bool> = list.items.iter().map(Pod::is_active).collect();
        assert_eq!(active, vec![true, true, false, false]);
        assert_eq!(list.items[3].phase(), "Unknown");
    }

    #[tokio::test]
    async fn test_probe_without_kubectl_is_probe_error() {
        let config = KubernetesConfig {
            kubectl: "renex-missing-kubectl".to_string(),
            ..KubernetesConfig::default()
        };
        let err = runner(config).check_job(&batch()).await.unwrap_err();
        assert!(err.is_probe());
    }

    #[tokio::test]
    async fn test_clean_up_without_kubectl_is_cleanup_error() {
        let config = KubernetesConfig {
            kubectl: "renex-missing-kubectl".to_string(),
            ..KubernetesConfig::default()
        };
        let err = runner(config).clean_up().await.unwrap_err();
        assert!(matches!(err, RunnerError::Cleanup(_)));
    }
}
