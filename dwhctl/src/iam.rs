use anyhow::Result;
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_iam::{
  config::{self, retry::RetryConfig},
  Client,
};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::ProviderError;

/// AWS managed policy granting read-only access to S3
pub const S3_READ_ONLY_POLICY_ARN: &str = "arn:aws:iam::aws:policy/AmazonS3ReadOnlyAccess";

/// Service principal allowed to assume the role
const REDSHIFT_SERVICE_PRINCIPAL: &str = "redshift.amazonaws.com";

/// Construct and return the IAM client
pub fn get_client(config: &SdkConfig, retries: u32) -> Result<Client> {
  let client = Client::from_conf(
    config::Builder::from(config)
      .retry_config(RetryConfig::standard().with_max_attempts(retries))
      .build(),
  );

  Ok(client)
}

/// The role the cluster assumes to read the raw data from S3
///
/// Trust policy and attached policy are fixed; only the name varies
#[derive(Clone, Debug, PartialEq)]
pub struct RoleSpec {
  pub role_name: String,
  pub trust_policy: Value,
  pub attached_policy_arn: &'static str,
}

impl RoleSpec {
  pub fn redshift_s3_read(role_name: &str) -> Self {
    RoleSpec {
      role_name: role_name.to_owned(),
      trust_policy: json!({
        "Statement": [{
          "Action": "sts:AssumeRole",
          "Effect": "Allow",
          "Principal": { "Service": REDSHIFT_SERVICE_PRINCIPAL }
        }],
        "Version": "2012-10-17"
      }),
      attached_policy_arn: S3_READ_ONLY_POLICY_ARN,
    }
  }
}

/// Role management calls used by the role manager
#[async_trait]
pub trait IamApi: Send + Sync {
  async fn create_role(&self, role_name: &str, trust_policy: &str) -> Result<(), ProviderError>;

  async fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> Result<(), ProviderError>;

  /// Returns the ARN of the role
  async fn get_role(&self, role_name: &str) -> Result<String, ProviderError>;

  async fn detach_role_policy(&self, role_name: &str, policy_arn: &str) -> Result<(), ProviderError>;

  async fn delete_role(&self, role_name: &str) -> Result<(), ProviderError>;
}

#[async_trait]
impl IamApi for Client {
  async fn create_role(&self, role_name: &str, trust_policy: &str) -> Result<(), ProviderError> {
    self
      .create_role()
      .path("/")
      .role_name(role_name)
      .assume_role_policy_document(trust_policy)
      .description("Allows Redshift clusters to call AWS services on your behalf")
      .send()
      .await
      .map_err(|err| ProviderError::from_sdk("create-role", err))?;

    Ok(())
  }

  async fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> Result<(), ProviderError> {
    self
      .attach_role_policy()
      .role_name(role_name)
      .policy_arn(policy_arn)
      .send()
      .await
      .map_err(|err| ProviderError::from_sdk("attach-role-policy", err))?;

    Ok(())
  }

  async fn get_role(&self, role_name: &str) -> Result<String, ProviderError> {
    let response = self
      .get_role()
      .role_name(role_name)
      .send()
      .await
      .map_err(|err| ProviderError::from_sdk("get-role", err))?;

    match response.role() {
      Some(role) => Ok(role.arn().to_owned()),
      None => Err(ProviderError::not_found("get-role", format!("role {role_name} not returned"))),
    }
  }

  async fn detach_role_policy(&self, role_name: &str, policy_arn: &str) -> Result<(), ProviderError> {
    self
      .detach_role_policy()
      .role_name(role_name)
      .policy_arn(policy_arn)
      .send()
      .await
      .map_err(|err| ProviderError::from_sdk("detach-role-policy", err))?;

    Ok(())
  }

  async fn delete_role(&self, role_name: &str) -> Result<(), ProviderError> {
    self
      .delete_role()
      .role_name(role_name)
      .send()
      .await
      .map_err(|err| ProviderError::from_sdk("delete-role", err))?;

    Ok(())
  }
}

/// Create the role and attach the read-only storage policy, returning the role ARN
///
/// A role that already exists is not an error: the conflict is logged and the ARN of the
/// existing role is returned. Any other creation failure is logged as well and left to the
/// final lookup, which propagates if the role really is absent.
pub async fn create_role(api: &dyn IamApi, spec: &RoleSpec) -> Result<String, ProviderError> {
  let trust_policy = spec.trust_policy.to_string();

  match api.create_role(&spec.role_name, &trust_policy).await {
    Ok(()) => {
      info!("Created role {}", spec.role_name);
      attach_policy(api, spec).await;
    }
    Err(err) if err.is_already_exists() => {
      warn!("{err}");
      attach_policy(api, spec).await;
    }
    Err(err) => warn!("{err}"),
  }

  let role_arn = api.get_role(&spec.role_name).await?;
  info!("Role {} with arn {}", spec.role_name, role_arn);

  Ok(role_arn)
}

async fn attach_policy(api: &dyn IamApi, spec: &RoleSpec) {
  if let Err(err) = api.attach_role_policy(&spec.role_name, spec.attached_policy_arn).await {
    warn!("{err}");
  }
}

/// Detach the storage policy and delete the role
///
/// Not idempotent: a missing role surfaces as [`ProviderError::NotFound`]
pub async fn delete_role(api: &dyn IamApi, spec: &RoleSpec) -> Result<(), ProviderError> {
  let role_arn = api.get_role(&spec.role_name).await?;
  api
    .detach_role_policy(&spec.role_name, spec.attached_policy_arn)
    .await?;
  api.delete_role(&spec.role_name).await?;
  info!("Deleted role {} with {}", spec.role_name, role_arn);

  Ok(())
}
