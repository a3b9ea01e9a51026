pub mod cli;
pub mod commands;
pub mod config;
pub mod ec2;
pub mod error;
pub mod etl;
pub mod iam;
pub mod redshift;
pub mod s3;
pub mod sql;

#[cfg(test)]
pub(crate) mod testing;

use anyhow::Result;
use aws_config::{meta::region::RegionProviderChain, BehaviorVersion, SdkConfig};
use aws_sdk_iam::config::Credentials;
use aws_types::region::Region;
pub use cli::{Cli, EtlCli, EtlCommands};

use crate::config::{AwsSection, Settings};

/// Max attempts for every AWS client
const AWS_CLIENT_RETRIES: u32 = 3;

/// Get the configuration to authn/authz with AWS that will be used across AWS clients
///
/// Static credentials from the configuration file are used when both key and secret are set,
/// otherwise the default credential provider chain applies
pub async fn get_sdk_config(aws: &AwsSection, region: &str) -> Result<SdkConfig> {
  let aws_region = Some(region.trim())
    .filter(|region| !region.is_empty())
    .map(|region| Region::new(region.to_owned()));
  let region_provider = RegionProviderChain::first_try(aws_region).or_default_provider();

  let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region_provider);
  if !aws.key.is_empty() && !aws.secret.is_empty() {
    loader = loader.credentials_provider(Credentials::new(&aws.key, &aws.secret, None, None, "dwh-config"));
  }

  Ok(loader.load().await)
}

/// The four control-plane handles, all built from the same credentials and region
#[derive(Clone, Debug)]
pub struct Clients {
  pub ec2: aws_sdk_ec2::Client,
  pub s3: aws_sdk_s3::Client,
  pub iam: aws_sdk_iam::Client,
  pub redshift: aws_sdk_redshift::Client,
}

impl Clients {
  pub async fn new(settings: &Settings) -> Result<Self> {
    let config = get_sdk_config(&settings.aws, &settings.dwh.dwh_region).await?;

    Ok(Clients {
      ec2: ec2::get_client(&config, AWS_CLIENT_RETRIES)?,
      s3: s3::get_client(&config, AWS_CLIENT_RETRIES)?,
      iam: iam::get_client(&config, AWS_CLIENT_RETRIES)?,
      redshift: redshift::get_client(&config, AWS_CLIENT_RETRIES)?,
    })
  }
}
