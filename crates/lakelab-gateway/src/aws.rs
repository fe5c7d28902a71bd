//! AWS CLI adapter for live-resource inspection and cluster access

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info};

use lakelab_common::{Error, Result};

use crate::command::{CommandOutput, CommandRunner, Invocation};
use crate::provisioner::{ClusterStatus, DatabaseStatus};

/// Runs `aws` through a [`CommandRunner`]
pub struct AwsCli {
    runner: Arc<dyn CommandRunner>,
    region: String,
}

#[derive(Deserialize)]
struct DescribeCluster {
    cluster: ClusterBody,
}

#[derive(Deserialize)]
struct ClusterBody {
    status: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeDbInstances {
    #[serde(rename = "DBInstances")]
    db_instances: Vec<DbInstance>,
}

#[derive(Deserialize)]
struct DbInstance {
    #[serde(rename = "DBInstanceStatus")]
    status: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SecretValue {
    secret_string: Option<String>,
}

impl AwsCli {
    /// Create an adapter pinned to `region`
    pub fn new(runner: Arc<dyn CommandRunner>, region: impl Into<String>) -> Self {
        Self {
            runner,
            region: region.into(),
        }
    }

    async fn aws<I, S>(&self, args: I) -> Result<CommandOutput>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let invocation = Invocation::new("aws")
            .args(args)
            .args(["--region", self.region.as_str(), "--output", "json"]);
        self.runner.run(invocation).await
    }

    /// EKS control-plane status
    pub async fn cluster_status(&self, name: &str) -> Result<ClusterStatus> {
        let out = self.aws(["eks", "describe-cluster", "--name", name]).await?;
        if !out.success {
            let text = out.error_text();
            if text.contains("ResourceNotFoundException") {
                return Ok(ClusterStatus::NotFound);
            }
            return Err(Error::provisioner(name, "inspect", text));
        }
        let doc: DescribeCluster = serde_json::from_str(&out.stdout)?;
        let status = ClusterStatus::parse(&doc.cluster.status);
        debug!(cluster = %name, status = %status, "cluster status");
        Ok(status)
    }

    /// Whether the bucket exists and we can reach it
    pub async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        let out = self.aws(["s3api", "head-bucket", "--bucket", bucket]).await?;
        if out.success {
            return Ok(true);
        }
        let text = out.error_text();
        if text.contains("Not Found") || text.contains("404") || text.contains("NoSuchBucket") {
            return Ok(false);
        }
        Err(Error::provisioner(bucket, "inspect", text))
    }

    /// RDS instance status
    pub async fn database_status(&self, id: &str) -> Result<Option<DatabaseStatus>> {
        let out = self
            .aws(["rds", "describe-db-instances", "--db-instance-identifier", id])
            .await?;
        if !out.success {
            let text = out.error_text();
            if text.contains("DBInstanceNotFound") {
                return Ok(None);
            }
            return Err(Error::provisioner(id, "inspect", text));
        }
        let doc: DescribeDbInstances = serde_json::from_str(&out.stdout)?;
        Ok(doc
            .db_instances
            .first()
            .map(|db| DatabaseStatus::parse(&db.status)))
    }

    /// Secrets Manager entry holding a JSON object
    pub async fn read_secret(&self, secret_id: &str) -> Result<BTreeMap<String, String>> {
        let out = self
            .aws(["secretsmanager", "get-secret-value", "--secret-id", secret_id])
            .await?;
        if !out.success {
            return Err(Error::provisioner(secret_id, "read-secret", out.error_text()));
        }
        let doc: SecretValue = serde_json::from_str(&out.stdout)?;
        let raw = doc.secret_string.ok_or_else(|| {
            Error::provisioner(secret_id, "read-secret", "secret has no string value")
        })?;
        parse_secret_string(&raw)
            .map_err(|e| Error::provisioner(secret_id, "read-secret", e))
    }

    /// Write a kubeconfig for the EKS cluster to `path`
    pub async fn update_kubeconfig(&self, cluster: &str, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let path_str = path.display().to_string();
        let out = self
            .aws([
                "eks",
                "update-kubeconfig",
                "--name",
                cluster,
                "--kubeconfig",
                path_str.as_str(),
                "--alias",
                cluster,
            ])
            .await?;
        if !out.success {
            return Err(Error::provisioner(cluster, "update-kubeconfig", out.error_text()));
        }
        info!(cluster = %cluster, path = %path.display(), "wrote kubeconfig");
        Ok(())
    }
}

/// Secret payloads are JSON objects; non-string values are kept as JSON text
fn parse_secret_string(raw: &str) -> std::result::Result<BTreeMap<String, String>, String> {
    let doc: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(raw).map_err(|_| "secret value is not a JSON object".to_string())?;
    Ok(doc
        .into_iter()
        .map(|(k, v)| {
            let v = match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (k, v)
        })
        .collect())
}
