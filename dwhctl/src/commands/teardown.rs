use anyhow::Result;

use crate::{
  iam::{self, IamApi, RoleSpec},
  redshift::{self, RedshiftApi},
};

/// Delete the cluster, then the role
///
/// Cluster deletion failures are only logged; a missing role fails the run
pub async fn teardown(
  iam: &dyn IamApi,
  redshift: &dyn RedshiftApi,
  cluster_identifier: &str,
  role: &RoleSpec,
) -> Result<()> {
  redshift::delete(redshift, cluster_identifier).await;
  iam::delete_role(iam, role).await?;

  Ok(())
}
