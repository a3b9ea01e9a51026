use std::fmt::Debug;

use aws_sdk_iam::error::ProvideErrorMetadata;
use aws_smithy_runtime_api::client::result::SdkError;
use thiserror::Error;

/// Provider error codes that mean the resource being created is already there
const ALREADY_EXISTS_CODES: &[&str] = &[
  "EntityAlreadyExists",
  "ClusterAlreadyExists",
  "InvalidPermission.Duplicate",
];

/// Provider error codes that mean the resource being addressed does not exist
const NOT_FOUND_CODES: &[&str] = &[
  "NoSuchEntity",
  "ClusterNotFound",
  "InvalidVpcID.NotFound",
  "InvalidGroup.NotFound",
];

/// Errors reported by the cloud control-plane
///
/// Every call into IAM, Redshift or EC2 is reduced to one of these three kinds so that
/// callers can decide per kind whether to continue, abort, or treat the failure as success.
#[derive(Clone, Debug, Error)]
pub enum ProviderError {
  #[error("{operation}: resource not found: {message}")]
  NotFound { operation: &'static str, message: String },

  #[error("{operation}: resource already exists: {message}")]
  AlreadyExists { operation: &'static str, message: String },

  #[error("{operation} failed: {message}")]
  Failed { operation: &'static str, message: String },
}

impl ProviderError {
  pub fn not_found(operation: &'static str, message: impl Into<String>) -> Self {
    Self::NotFound {
      operation,
      message: message.into(),
    }
  }

  pub fn already_exists(operation: &'static str, message: impl Into<String>) -> Self {
    Self::AlreadyExists {
      operation,
      message: message.into(),
    }
  }

  pub fn failed(operation: &'static str, message: impl Into<String>) -> Self {
    Self::Failed {
      operation,
      message: message.into(),
    }
  }

  pub fn is_not_found(&self) -> bool {
    matches!(self, Self::NotFound { .. })
  }

  pub fn is_already_exists(&self) -> bool {
    matches!(self, Self::AlreadyExists { .. })
  }

  /// Classify an error code returned by the provider
  pub fn from_code(operation: &'static str, code: Option<&str>, message: impl Into<String>) -> Self {
    match code {
      Some(code) if ALREADY_EXISTS_CODES.contains(&code) => Self::already_exists(operation, message),
      Some(code) if NOT_FOUND_CODES.contains(&code) => Self::not_found(operation, message),
      _ => Self::failed(operation, message),
    }
  }

  /// Convert an AWS SDK error into a provider error, keeping the service code and message
  pub fn from_sdk<E, R>(operation: &'static str, err: SdkError<E, R>) -> Self
  where
    E: ProvideErrorMetadata,
    R: Debug,
  {
    match err.as_service_error() {
      Some(service) => {
        let code = service.code();
        let message = format!(
          "{}: {}",
          code.unwrap_or("Unknown"),
          service.message().unwrap_or("no message provided")
        );
        Self::from_code(operation, code, message)
      }
      None => Self::failed(operation, err.to_string()),
    }
  }
}

/// Errors raised while loading and validating configuration
#[derive(Debug, Error)]
pub enum Error {
  #[error("Configuration error: {0}")]
  Config(#[from] ::config::ConfigError),

  #[error("Invalid value {value:?} for {key}: {reason}")]
  InvalidSetting {
    key: &'static str,
    value: String,
    reason: String,
  },
}

pub type Result<T> = std::result::Result<T, Error>;
