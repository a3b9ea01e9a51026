use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

/// Default location of the configuration file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "dwh.cfg";

/// Prefix for environment variable overrides, e.g. `DWH__CLUSTER__DB_PASSWORD`
const ENV_PREFIX: &str = "DWH";

/// Settings loaded from the `dwh.cfg` INI file
///
/// All values are kept as strings, mirroring the file. Numeric values are parsed
/// when a [`ClusterSpec`] is derived from the settings.
#[derive(Clone, Debug, Deserialize)]
pub struct Settings {
  #[serde(default)]
  pub aws: AwsSection,
  pub cluster: ClusterSection,
  pub dwh: DwhSection,

  #[serde(default)]
  pub iam_role: IamRoleSection,
  pub s3: S3Section,
}

/// Static credentials used by every AWS client
///
/// When left empty, the default credential provider chain is used instead
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AwsSection {
  #[serde(default)]
  pub key: String,

  #[serde(default)]
  pub secret: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ClusterSection {
  /// Database host used by `dwhetl`; discovered from the cluster endpoint when absent
  #[serde(default)]
  pub host: Option<String>,
  pub db_name: String,
  pub db_user: String,
  pub db_password: String,
  pub db_port: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct DwhSection {
  pub dwh_cluster_type: String,
  pub dwh_num_nodes: String,
  pub dwh_node_type: String,
  pub dwh_cluster_identifier: String,
  pub dwh_iam_role_name: String,
  pub dwh_region: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct IamRoleSection {
  /// ARN of the role the cluster assumes when running `COPY`
  #[serde(default)]
  pub arn: Option<String>,
}

/// Object storage locations of the raw data
#[derive(Clone, Debug, Deserialize)]
pub struct S3Section {
  pub log_data: String,
  pub log_jsonpath: String,
  pub song_data: String,
}

impl Settings {
  /// Load settings from the INI file at `path`, layered with `DWH__` environment overrides
  pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
    let path = path.as_ref();
    let config = Config::builder()
      .add_source(File::from(path).format(FileFormat::Ini))
      .add_source(Environment::with_prefix(ENV_PREFIX).prefix_separator("__").separator("__"))
      .build()?;

    Self::from_config(config)
  }

  /// Parse settings from INI text
  pub fn from_ini(contents: &str) -> Result<Self> {
    let config = Config::builder()
      .add_source(File::from_str(contents, FileFormat::Ini))
      .build()?;

    Self::from_config(config)
  }

  fn from_config(config: Config) -> Result<Self> {
    let mut settings: Settings = config.try_deserialize()?;
    settings.s3.log_data = unquote(&settings.s3.log_data);
    settings.s3.log_jsonpath = unquote(&settings.s3.log_jsonpath);
    settings.s3.song_data = unquote(&settings.s3.song_data);
    settings.iam_role.arn = settings
      .iam_role
      .arn
      .as_deref()
      .map(unquote)
      .filter(|arn| !arn.is_empty());
    settings.cluster.host = settings
      .cluster
      .host
      .as_deref()
      .map(str::trim)
      .filter(|host| !host.is_empty())
      .map(str::to_owned);

    debug!(
      cluster = settings.dwh.dwh_cluster_identifier.as_str(),
      region = settings.dwh.dwh_region.as_str(),
      "Loaded configuration"
    );

    Ok(settings)
  }

  /// The database port, validated as a TCP port
  pub fn db_port(&self) -> Result<u16> {
    let value = self.cluster.db_port.trim();
    match value.parse::<u16>() {
      Ok(port) if port > 0 => Ok(port),
      _ => Err(Error::InvalidSetting {
        key: "DB_PORT",
        value: value.to_owned(),
        reason: "expected a TCP port between 1 and 65535".to_owned(),
      }),
    }
  }
}

/// Strip one pair of surrounding quotes; S3 paths are commonly written quoted
fn unquote(value: &str) -> String {
  let value = value.trim();
  for quote in ['\'', '"'] {
    if let Some(inner) = value.strip_prefix(quote).and_then(|v| v.strip_suffix(quote)) {
      return inner.to_owned();
    }
  }
  value.to_owned()
}

/// The cluster requested by one provisioning run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterSpec {
  pub cluster_type: String,
  pub node_type: String,
  pub node_count: i32,
  pub db_name: String,
  pub cluster_identifier: String,
  pub master_username: String,
  pub master_password: String,
  pub port: u16,
}

impl ClusterSpec {
  pub fn from_settings(settings: &Settings) -> Result<Self> {
    let raw_nodes = settings.dwh.dwh_num_nodes.trim();
    let node_count = match raw_nodes.parse::<i32>() {
      Ok(count) if count > 0 => count,
      _ => {
        return Err(Error::InvalidSetting {
          key: "DWH_NUM_NODES",
          value: raw_nodes.to_owned(),
          reason: "expected a positive integer".to_owned(),
        })
      }
    };

    Ok(ClusterSpec {
      cluster_type: settings.dwh.dwh_cluster_type.clone(),
      node_type: settings.dwh.dwh_node_type.clone(),
      node_count,
      db_name: settings.cluster.db_name.clone(),
      cluster_identifier: settings.dwh.dwh_cluster_identifier.clone(),
      master_username: settings.cluster.db_user.clone(),
      master_password: settings.cluster.db_password.clone(),
      port: settings.db_port()?,
    })
  }
}
