use std::fmt;

use anyhow::{anyhow, Result};
use aws_config::SdkConfig;
use aws_sdk_s3::{
  config::{self, retry::RetryConfig},
  Client,
};

/// Construct and return the S3 client
pub fn get_client(config: &SdkConfig, retries: u32) -> Result<Client> {
  let client = Client::from_conf(
    config::Builder::from(config)
      .retry_config(RetryConfig::standard().with_max_attempts(retries))
      .build(),
  );

  Ok(client)
}

/// A bucket plus key prefix, parsed from an `s3://bucket/prefix` URI
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct S3Location {
  pub bucket: String,
  pub prefix: String,
}

impl S3Location {
  pub fn parse(uri: &str) -> Result<Self> {
    let rest = uri
      .trim()
      .strip_prefix("s3://")
      .ok_or_else(|| anyhow!("Unable to parse S3 location {uri}: expected s3://bucket/prefix"))?;

    let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
    if bucket.is_empty() {
      return Err(anyhow!("Unable to parse S3 location {uri}: bucket name is empty"));
    }

    Ok(S3Location {
      bucket: bucket.to_owned(),
      prefix: prefix.to_owned(),
    })
  }
}

impl fmt::Display for S3Location {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "s3://{}/{}", self.bucket, self.prefix)
  }
}

/// Check that at least one object exists under the location
pub async fn prefix_exists(client: &Client, location: &S3Location) -> Result<bool> {
  let response = client
    .list_objects_v2()
    .bucket(&location.bucket)
    .prefix(&location.prefix)
    .max_keys(1)
    .send()
    .await?;

  Ok(response.key_count().unwrap_or_default() > 0)
}
