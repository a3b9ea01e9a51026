use anyhow::Result;
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_ec2::{
  config::{self, retry::RetryConfig},
  types::{Filter, IpPermission, IpRange},
  Client,
};
use ipnet::Ipv4Net;
use tracing::{debug, info, warn};

use crate::error::ProviderError;

/// Name EC2 gives the security group created with every VPC
const DEFAULT_SECURITY_GROUP: &str = "default";

/// Construct and return the EC2 client
pub fn get_client(config: &SdkConfig, retries: u32) -> Result<Client> {
  let client = Client::from_conf(
    config::Builder::from(config)
      .retry_config(RetryConfig::standard().with_max_attempts(retries))
      .build(),
  );

  Ok(client)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecurityGroup {
  pub group_id: String,
  pub group_name: String,
}

/// A single inbound rule on a security group
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IngressRule {
  pub group_id: String,
  pub protocol: String,
  pub from_port: i32,
  pub to_port: i32,
  pub cidr: Ipv4Net,
}

impl IngressRule {
  /// Inbound TCP on exactly `port`, from any IPv4 address
  pub fn tcp_from_anywhere(group_id: &str, port: u16) -> Self {
    IngressRule {
      group_id: group_id.to_owned(),
      protocol: "tcp".to_owned(),
      from_port: i32::from(port),
      to_port: i32::from(port),
      // 0.0.0.0/0
      cidr: Ipv4Net::default(),
    }
  }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IngressOutcome {
  Authorized(IngressRule),
  /// The same rule was already on the group
  AlreadyPresent(IngressRule),
}

/// Network calls used to open access to the cluster
#[async_trait]
pub trait Ec2Api: Send + Sync {
  /// Security groups that belong to the VPC, in the order EC2 returns them
  async fn vpc_security_groups(&self, vpc_id: &str) -> Result<Vec<SecurityGroup>, ProviderError>;

  async fn authorize_ingress(&self, rule: &IngressRule) -> Result<(), ProviderError>;
}

#[async_trait]
impl Ec2Api for Client {
  async fn vpc_security_groups(&self, vpc_id: &str) -> Result<Vec<SecurityGroup>, ProviderError> {
    let response = self
      .describe_security_groups()
      .filters(Filter::builder().name("vpc-id").values(vpc_id).build())
      .send()
      .await
      .map_err(|err| ProviderError::from_sdk("describe-security-groups", err))?;

    let groups = response
      .security_groups()
      .iter()
      .filter_map(|group| {
        Some(SecurityGroup {
          group_id: group.group_id()?.to_owned(),
          group_name: group.group_name().unwrap_or_default().to_owned(),
        })
      })
      .collect();

    Ok(groups)
  }

  async fn authorize_ingress(&self, rule: &IngressRule) -> Result<(), ProviderError> {
    self
      .authorize_security_group_ingress()
      .group_id(&rule.group_id)
      .ip_permissions(
        IpPermission::builder()
          .ip_protocol(&rule.protocol)
          .from_port(rule.from_port)
          .to_port(rule.to_port)
          .ip_ranges(IpRange::builder().cidr_ip(rule.cidr.to_string()).build())
          .build(),
      )
      .send()
      .await
      .map_err(|err| ProviderError::from_sdk("authorize-security-group-ingress", err))?;

    Ok(())
  }
}

/// Pick the VPC's default security group, falling back to the first group listed
fn default_group(groups: &[SecurityGroup]) -> Option<&SecurityGroup> {
  groups
    .iter()
    .find(|group| group.group_name == DEFAULT_SECURITY_GROUP)
    .or_else(|| groups.first())
}

/// Ensure the database port is reachable through the VPC's default security group
///
/// Re-running after the rule exists is not an error and reports [`IngressOutcome::AlreadyPresent`]
pub async fn ensure_ingress(api: &dyn Ec2Api, vpc_id: &str, port: u16) -> Result<IngressOutcome, ProviderError> {
  let groups = api.vpc_security_groups(vpc_id).await?;
  let group = default_group(&groups).ok_or_else(|| {
    ProviderError::not_found(
      "describe-security-groups",
      format!("no security group found for VPC {vpc_id}"),
    )
  })?;
  debug!("Using security group {} ({})", group.group_id, group.group_name);

  let rule = IngressRule::tcp_from_anywhere(&group.group_id, port);
  match api.authorize_ingress(&rule).await {
    Ok(()) => {
      info!("Allow TCP connection on port {} from {}", port, rule.cidr);
      Ok(IngressOutcome::Authorized(rule))
    }
    Err(err) if err.is_already_exists() => {
      warn!("{err}");
      Ok(IngressOutcome::AlreadyPresent(rule))
    }
    Err(err) => Err(err),
  }
}
