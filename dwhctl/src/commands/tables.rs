use anyhow::{anyhow, Result};
use clap::Args;
use tracing::{info, warn};

use crate::{
  config::Settings,
  etl::{self, Connection},
  iam::IamApi,
  redshift::RedshiftApi,
  s3::{self, S3Location},
  sql::{Catalog, CopySources, StatementKind},
  Clients,
};

/// Drop and re-create every warehouse table
pub async fn create_tables(settings: &Settings, clients: &Clients) -> Result<()> {
  // The table statements do not reference the role, so the catalog can be built without resolving it
  let arn = settings.iam_role.arn.clone().unwrap_or_default();
  let catalog = Catalog::new(&CopySources::new(settings, &arn));

  let host = resolve_host(settings, &clients.redshift).await?;
  let client = etl::connect(&connection(settings, host)?).await?;

  let executed = etl::run(&client, &catalog, &[StatementKind::Drop, StatementKind::Create]).await?;
  info!("Created tables ({executed} statements)");

  Ok(())
}

#[derive(Args, Debug)]
pub struct Load {
  /// Skip checking that the S3 source prefixes contain objects
  #[arg(long)]
  pub skip_preflight: bool,
}

impl Load {
  /// Copy the S3 datasets into the staging tables, then populate the star schema
  pub async fn load(&self, settings: &Settings, clients: &Clients) -> Result<()> {
    if !self.skip_preflight {
      preflight(settings, &clients.s3).await?;
    }

    let arn = resolve_role_arn(settings, &clients.iam).await?;
    let catalog = Catalog::new(&CopySources::new(settings, &arn));

    let host = resolve_host(settings, &clients.redshift).await?;
    let client = etl::connect(&connection(settings, host)?).await?;

    let executed = etl::run(&client, &catalog, &[StatementKind::Copy, StatementKind::Insert]).await?;
    info!("Loaded tables ({executed} statements)");

    Ok(())
  }
}

/// Warn about source prefixes with no objects; a COPY from them would load nothing
async fn preflight(settings: &Settings, client: &aws_sdk_s3::Client) -> Result<()> {
  for uri in [&settings.s3.log_data, &settings.s3.log_jsonpath, &settings.s3.song_data] {
    let location = S3Location::parse(uri)?;
    match s3::prefix_exists(client, &location).await {
      Ok(true) => info!("Found objects under {location}"),
      Ok(false) => warn!("No objects found under {location}"),
      Err(err) => warn!("Unable to list {location}: {err}"),
    }
  }

  Ok(())
}

/// The role ARN from the configuration, or the ARN of the configured role name
pub async fn resolve_role_arn(settings: &Settings, iam: &dyn IamApi) -> Result<String> {
  if let Some(arn) = &settings.iam_role.arn {
    return Ok(arn.clone());
  }

  let arn = iam.get_role(&settings.dwh.dwh_iam_role_name).await?;
  info!("Using role {arn}");

  Ok(arn)
}

/// The cluster host from the configuration, or the endpoint address reported by the cluster
pub async fn resolve_host(settings: &Settings, redshift: &dyn RedshiftApi) -> Result<String> {
  if let Some(host) = &settings.cluster.host {
    return Ok(host.clone());
  }

  let identifier = &settings.dwh.dwh_cluster_identifier;
  let status = redshift.describe_cluster(identifier).await?;
  let endpoint = status
    .endpoint
    .ok_or_else(|| anyhow!("Cluster {identifier} has no endpoint yet (status \"{}\")", status.state))?;

  Ok(endpoint.address)
}

pub fn connection(settings: &Settings, host: String) -> Result<Connection> {
  Ok(Connection {
    host,
    port: settings.db_port()?,
    dbname: settings.cluster.db_name.clone(),
    user: settings.cluster.db_user.clone(),
    password: settings.cluster.db_password.clone(),
  })
}
