use anyhow::{anyhow, bail, Result};
use tracing::{error, info, warn};

use crate::{
  config::ClusterSpec,
  ec2::{self, Ec2Api},
  iam::{self, IamApi, RoleSpec},
  redshift::{self, ClusterStatus, PollPolicy, RedshiftApi, WaitOutcome},
};

/// Create the role and the cluster, wait for the cluster and open its database port
///
/// Role and cluster creation conflicts do not stop the run. The port is only opened
/// once the cluster has been observed as available; otherwise an error is returned.
pub async fn provision(
  iam: &dyn IamApi,
  redshift: &dyn RedshiftApi,
  ec2: &dyn Ec2Api,
  spec: &ClusterSpec,
  role: &RoleSpec,
  policy: &PollPolicy,
) -> Result<ClusterStatus> {
  let role_arn = iam::create_role(iam, role).await?;

  match redshift::create(redshift, spec, &role_arn).await {
    Ok(()) => {}
    Err(err) if err.is_already_exists() => info!("{err}"),
    Err(err) => warn!("{err}"),
  }

  let status = match redshift::await_available(redshift, &spec.cluster_identifier, policy).await {
    WaitOutcome::Available(status) => status,
    WaitOutcome::TimedOut { last_observed } => {
      error!("Could not connect to cluster {}", spec.cluster_identifier);
      match last_observed {
        Some(status) => bail!(
          "Cluster {} still \"{}\" after {} seconds",
          spec.cluster_identifier,
          status.state,
          policy.timeout.as_secs()
        ),
        None => bail!(
          "Cluster {} was never observed within {} seconds",
          spec.cluster_identifier,
          policy.timeout.as_secs()
        ),
      }
    }
  };

  match &status.endpoint {
    Some(endpoint) => info!("Cluster created at {endpoint}"),
    None => info!("Cluster {} is available", status.identifier),
  }

  let vpc_id = status
    .vpc_id
    .as_deref()
    .ok_or_else(|| anyhow!("Cluster {} did not report a VPC", status.identifier))?;

  match ec2::ensure_ingress(ec2, vpc_id, spec.port).await {
    Ok(_) => {}
    Err(err) => warn!("{err}"),
  }

  Ok(status)
}
