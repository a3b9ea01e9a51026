use std::{cmp, fmt};

use anyhow::Result;
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_redshift::{
  config::{self, retry::RetryConfig},
  Client,
};
use tokio::time::{sleep, timeout_at, Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::{config::ClusterSpec, error::ProviderError};

/// Construct and return the Redshift client
pub fn get_client(config: &SdkConfig, retries: u32) -> Result<Client> {
  let client = Client::from_conf(
    config::Builder::from(config)
      .retry_config(RetryConfig::standard().with_max_attempts(retries))
      .build(),
  );

  Ok(client)
}

/// Lifecycle state reported for a cluster
///
/// Only `available` is acted upon; every other state means "keep waiting"
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClusterState {
  Creating,
  Available,
  Deleting,
  Modifying,
  Other(String),
}

impl From<&str> for ClusterState {
  fn from(state: &str) -> Self {
    match state {
      "creating" => Self::Creating,
      "available" => Self::Available,
      "deleting" => Self::Deleting,
      "modifying" => Self::Modifying,
      other => Self::Other(other.to_owned()),
    }
  }
}

impl fmt::Display for ClusterState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Creating => write!(f, "creating"),
      Self::Available => write!(f, "available"),
      Self::Deleting => write!(f, "deleting"),
      Self::Modifying => write!(f, "modifying"),
      Self::Other(state) => write!(f, "{state}"),
    }
  }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
  pub address: String,
  pub port: i32,
}

impl fmt::Display for Endpoint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.address, self.port)
  }
}

/// A point-in-time observation of the cluster
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterStatus {
  pub identifier: String,
  pub state: ClusterState,
  /// Only present once the cluster is available
  pub endpoint: Option<Endpoint>,
  pub vpc_id: Option<String>,
}

impl ClusterStatus {
  pub fn is_available(&self) -> bool {
    self.state == ClusterState::Available
  }
}

/// Cluster management calls used by the lifecycle controller
#[async_trait]
pub trait RedshiftApi: Send + Sync {
  async fn create_cluster(&self, spec: &ClusterSpec, role_arn: &str) -> Result<(), ProviderError>;

  async fn describe_cluster(&self, identifier: &str) -> Result<ClusterStatus, ProviderError>;

  async fn delete_cluster(&self, identifier: &str, skip_final_snapshot: bool) -> Result<(), ProviderError>;
}

#[async_trait]
impl RedshiftApi for Client {
  async fn create_cluster(&self, spec: &ClusterSpec, role_arn: &str) -> Result<(), ProviderError> {
    self
      .create_cluster()
      .cluster_type(&spec.cluster_type)
      .node_type(&spec.node_type)
      .number_of_nodes(spec.node_count)
      .db_name(&spec.db_name)
      .cluster_identifier(&spec.cluster_identifier)
      .master_username(&spec.master_username)
      .master_user_password(&spec.master_password)
      .port(i32::from(spec.port))
      .iam_roles(role_arn)
      .send()
      .await
      .map_err(|err| ProviderError::from_sdk("create-cluster", err))?;

    Ok(())
  }

  async fn describe_cluster(&self, identifier: &str) -> Result<ClusterStatus, ProviderError> {
    let response = self
      .describe_clusters()
      .cluster_identifier(identifier)
      .send()
      .await
      .map_err(|err| ProviderError::from_sdk("describe-clusters", err))?;

    // A cluster identifier matches at most one cluster
    let cluster = response
      .clusters()
      .first()
      .ok_or_else(|| ProviderError::not_found("describe-clusters", format!("cluster {identifier} not returned")))?;

    let endpoint = cluster.endpoint().and_then(|endpoint| {
      Some(Endpoint {
        address: endpoint.address()?.to_owned(),
        port: endpoint.port()?,
      })
    });

    Ok(ClusterStatus {
      identifier: cluster.cluster_identifier().unwrap_or(identifier).to_owned(),
      state: ClusterState::from(cluster.cluster_status().unwrap_or_default()),
      endpoint,
      vpc_id: cluster.vpc_id().map(str::to_owned),
    })
  }

  async fn delete_cluster(&self, identifier: &str, skip_final_snapshot: bool) -> Result<(), ProviderError> {
    self
      .delete_cluster()
      .cluster_identifier(identifier)
      .skip_final_cluster_snapshot(skip_final_snapshot)
      .send()
      .await
      .map_err(|err| ProviderError::from_sdk("delete-cluster", err))?;

    Ok(())
  }
}

/// Fixed-interval polling with a fixed upper bound on the number of attempts
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollPolicy {
  pub interval: Duration,
  pub timeout: Duration,
}

impl Default for PollPolicy {
  fn default() -> Self {
    PollPolicy {
      interval: Duration::from_secs(15),
      timeout: Duration::from_secs(600),
    }
  }
}

impl PollPolicy {
  /// Number of describe calls made before giving up
  pub fn attempts(&self) -> u32 {
    let interval = cmp::max(self.interval.as_millis(), 1);
    let attempts = self.timeout.as_millis() / interval;
    cmp::max(1, u32::try_from(attempts).unwrap_or(u32::MAX))
  }
}

/// Result of waiting on the cluster to become available
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
  Available(ClusterStatus),
  /// The attempts ran out; `last_observed` is `None` when no describe call ever succeeded
  TimedOut { last_observed: Option<ClusterStatus> },
}

/// Request the cluster; does not wait for it to be created
pub async fn create(api: &dyn RedshiftApi, spec: &ClusterSpec, role_arn: &str) -> Result<(), ProviderError> {
  api.create_cluster(spec, role_arn).await?;
  info!("Creating cluster {}...", spec.cluster_identifier);

  Ok(())
}

/// Poll the cluster until it reports `available` or the policy's attempts are exhausted
///
/// The policy timeout is a hard deadline: a describe call still pending at the deadline is
/// abandoned, and no sleep is started that would end past it.
pub async fn await_available(api: &dyn RedshiftApi, identifier: &str, policy: &PollPolicy) -> WaitOutcome {
  let attempts = policy.attempts();
  let deadline = Instant::now() + policy.timeout;
  let mut last_observed = None;

  for attempt in 1..=attempts {
    let observed = timeout_at(deadline, api.describe_cluster(identifier)).await;
    let retrying = attempt < attempts && Instant::now() + policy.interval < deadline;

    match observed {
      Ok(Ok(status)) if status.is_available() => return WaitOutcome::Available(status),
      Ok(Ok(status)) => {
        if retrying {
          info!(
            "Cluster status is \"{}\". Retrying in {} seconds.",
            status.state,
            policy.interval.as_secs()
          );
        } else {
          info!("Cluster status is \"{}\"", status.state);
        }
        last_observed = Some(status);
      }
      Ok(Err(err)) => warn!("Unable to describe cluster {identifier}: {err}"),
      Err(_) => {
        warn!("Describing cluster {identifier} did not complete within {} seconds", policy.timeout.as_secs());
        break;
      }
    }

    if !retrying {
      break;
    }
    sleep(policy.interval).await;
  }

  debug!("Cluster {identifier} not available within {} seconds", policy.timeout.as_secs());
  WaitOutcome::TimedOut { last_observed }
}

/// Delete the cluster without a final snapshot
///
/// Failures are logged and not returned; a cluster that is already gone is only a warning
pub async fn delete(api: &dyn RedshiftApi, identifier: &str) {
  match api.delete_cluster(identifier, true).await {
    Ok(()) => info!("Deleted cluster {identifier}"),
    Err(err) if err.is_not_found() => warn!("{err}"),
    Err(err) => error!("{err}"),
  }
}
