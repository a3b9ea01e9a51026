//! In-memory stand-ins for the control-plane clients and the warehouse
use std::{
  collections::{BTreeSet, HashMap, VecDeque},
  sync::Mutex,
};

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::time::{sleep, Duration};

use crate::{
  config::ClusterSpec,
  ec2::{Ec2Api, IngressRule, SecurityGroup},
  error::ProviderError,
  etl::Execute,
  iam::IamApi,
  redshift::{ClusterState, ClusterStatus, Endpoint, RedshiftApi},
};

pub const SAMPLE_CONFIG: &str = r#"[AWS]
KEY=AKIAEXAMPLE
SECRET=secretexample

[CLUSTER]
DB_NAME=dwh
DB_USER=dwhuser
DB_PASSWORD=Passw0rd
DB_PORT=5439

[DWH]
DWH_CLUSTER_TYPE=multi-node
DWH_NUM_NODES=4
DWH_NODE_TYPE=dc2.large
DWH_CLUSTER_IDENTIFIER=dwhCluster
DWH_IAM_ROLE_NAME=dwhRole
DWH_REGION=us-west-2

[IAM_ROLE]
ARN='arn:aws:iam::123456789012:role/dwhRole'

[S3]
LOG_DATA='s3://udacity-dend/log_data'
LOG_JSONPATH='s3://udacity-dend/log_json_path.json'
SONG_DATA='s3://udacity-dend/song_data'
"#;

pub fn cluster_spec() -> ClusterSpec {
  ClusterSpec {
    cluster_type: "multi-node".to_owned(),
    node_type: "dc2.large".to_owned(),
    node_count: 4,
    db_name: "dwh".to_owned(),
    cluster_identifier: "dwhCluster".to_owned(),
    master_username: "dwhuser".to_owned(),
    master_password: "Passw0rd".to_owned(),
    port: 5439,
  }
}

/// Cluster observation in `state`; available clusters carry an endpoint
pub fn status(state: &str) -> ClusterStatus {
  let state = ClusterState::from(state);
  let endpoint = (state == ClusterState::Available).then(|| Endpoint {
    address: "dwhcluster.abc123.us-west-2.redshift.amazonaws.com".to_owned(),
    port: 5439,
  });

  ClusterStatus {
    identifier: "dwhCluster".to_owned(),
    state,
    endpoint,
    vpc_id: Some("vpc-0abc".to_owned()),
  }
}

#[derive(Default)]
struct Role {
  arn: String,
  policies: Vec<String>,
}

#[derive(Default)]
pub struct FakeIam {
  roles: Mutex<HashMap<String, Role>>,
  create_calls: Mutex<usize>,
  fail_create: bool,
}

impl FakeIam {
  /// Role creation fails with a generic error and nothing is created
  pub fn failing_create(mut self) -> Self {
    self.fail_create = true;
    self
  }

  pub fn create_calls(&self) -> usize {
    *self.create_calls.lock().unwrap()
  }

  pub fn attached_policies(&self, role_name: &str) -> Vec<String> {
    self
      .roles
      .lock()
      .unwrap()
      .get(role_name)
      .map(|role| role.policies.clone())
      .unwrap_or_default()
  }

  fn no_such_entity(operation: &'static str, role_name: &str) -> ProviderError {
    ProviderError::not_found(
      operation,
      format!("NoSuchEntity: The role with name {role_name} cannot be found."),
    )
  }
}

#[async_trait]
impl IamApi for FakeIam {
  async fn create_role(&self, role_name: &str, _trust_policy: &str) -> Result<(), ProviderError> {
    *self.create_calls.lock().unwrap() += 1;
    if self.fail_create {
      return Err(ProviderError::failed("create-role", "AccessDenied: not authorized"));
    }

    let mut roles = self.roles.lock().unwrap();
    if roles.contains_key(role_name) {
      return Err(ProviderError::already_exists(
        "create-role",
        format!("EntityAlreadyExists: Role with name {role_name} already exists."),
      ));
    }
    roles.insert(
      role_name.to_owned(),
      Role {
        arn: format!("arn:aws:iam::123456789012:role/{role_name}"),
        policies: Vec::new(),
      },
    );

    Ok(())
  }

  async fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> Result<(), ProviderError> {
    let mut roles = self.roles.lock().unwrap();
    let role = roles
      .get_mut(role_name)
      .ok_or_else(|| Self::no_such_entity("attach-role-policy", role_name))?;
    if !role.policies.iter().any(|p| p == policy_arn) {
      role.policies.push(policy_arn.to_owned());
    }

    Ok(())
  }

  async fn get_role(&self, role_name: &str) -> Result<String, ProviderError> {
    self
      .roles
      .lock()
      .unwrap()
      .get(role_name)
      .map(|role| role.arn.clone())
      .ok_or_else(|| Self::no_such_entity("get-role", role_name))
  }

  async fn detach_role_policy(&self, role_name: &str, policy_arn: &str) -> Result<(), ProviderError> {
    let mut roles = self.roles.lock().unwrap();
    let role = roles
      .get_mut(role_name)
      .ok_or_else(|| Self::no_such_entity("detach-role-policy", role_name))?;
    let before = role.policies.len();
    role.policies.retain(|p| p != policy_arn);
    if role.policies.len() == before {
      return Err(ProviderError::not_found(
        "detach-role-policy",
        format!("NoSuchEntity: Policy {policy_arn} was not found."),
      ));
    }

    Ok(())
  }

  async fn delete_role(&self, role_name: &str) -> Result<(), ProviderError> {
    self
      .roles
      .lock()
      .unwrap()
      .remove(role_name)
      .map(|_| ())
      .ok_or_else(|| Self::no_such_entity("delete-role", role_name))
  }
}

/// Replays scripted describe results, then repeats the fallback (or reports not found)
#[derive(Default)]
pub struct FakeRedshift {
  statuses: Mutex<VecDeque<Result<ClusterStatus, ProviderError>>>,
  fallback: Option<Result<ClusterStatus, ProviderError>>,
  describe_calls: Mutex<usize>,
  latency: Option<Duration>,
  creates: Mutex<Vec<(ClusterSpec, String)>>,
  create_error: Option<ProviderError>,
  deletes: Mutex<Vec<(String, bool)>>,
  delete_error: Option<ProviderError>,
}

impl FakeRedshift {
  pub fn with_statuses(statuses: Vec<Result<ClusterStatus, ProviderError>>) -> Self {
    FakeRedshift {
      statuses: Mutex::new(statuses.into()),
      ..Default::default()
    }
  }

  pub fn repeating(mut self, fallback: Result<ClusterStatus, ProviderError>) -> Self {
    self.fallback = Some(fallback);
    self
  }

  /// Every describe call takes `latency` before answering
  pub fn with_latency(mut self, latency: Duration) -> Self {
    self.latency = Some(latency);
    self
  }

  pub fn failing_create(mut self, err: ProviderError) -> Self {
    self.create_error = Some(err);
    self
  }

  pub fn failing_delete(mut self, err: ProviderError) -> Self {
    self.delete_error = Some(err);
    self
  }

  pub fn describe_calls(&self) -> usize {
    *self.describe_calls.lock().unwrap()
  }

  pub fn create_requests(&self) -> Vec<(ClusterSpec, String)> {
    self.creates.lock().unwrap().clone()
  }

  pub fn delete_requests(&self) -> Vec<(String, bool)> {
    self.deletes.lock().unwrap().clone()
  }
}

#[async_trait]
impl RedshiftApi for FakeRedshift {
  async fn create_cluster(&self, spec: &ClusterSpec, role_arn: &str) -> Result<(), ProviderError> {
    self.creates.lock().unwrap().push((spec.clone(), role_arn.to_owned()));
    match &self.create_error {
      Some(err) => Err(err.clone()),
      None => Ok(()),
    }
  }

  async fn describe_cluster(&self, identifier: &str) -> Result<ClusterStatus, ProviderError> {
    *self.describe_calls.lock().unwrap() += 1;
    if let Some(latency) = self.latency {
      sleep(latency).await;
    }

    if let Some(next) = self.statuses.lock().unwrap().pop_front() {
      return next;
    }

    match &self.fallback {
      Some(fallback) => fallback.clone(),
      None => Err(ProviderError::not_found(
        "describe-clusters",
        format!("ClusterNotFound: Cluster {identifier} not found."),
      )),
    }
  }

  async fn delete_cluster(&self, identifier: &str, skip_final_snapshot: bool) -> Result<(), ProviderError> {
    self
      .deletes
      .lock()
      .unwrap()
      .push((identifier.to_owned(), skip_final_snapshot));
    match &self.delete_error {
      Some(err) => Err(err.clone()),
      None => Ok(()),
    }
  }
}

/// Security groups of a single VPC; authorizing the same rule twice is a duplicate
pub struct FakeEc2 {
  vpc_id: String,
  groups: Vec<SecurityGroup>,
  rules: Mutex<Vec<IngressRule>>,
  authorize_error: Option<ProviderError>,
}

impl FakeEc2 {
  pub fn with_groups(vpc_id: &str, groups: Vec<SecurityGroup>) -> Self {
    FakeEc2 {
      vpc_id: vpc_id.to_owned(),
      groups,
      rules: Mutex::new(Vec::new()),
      authorize_error: None,
    }
  }

  pub fn failing_authorize(mut self, err: ProviderError) -> Self {
    self.authorize_error = Some(err);
    self
  }

  pub fn authorized_rules(&self) -> Vec<IngressRule> {
    self.rules.lock().unwrap().clone()
  }
}

#[async_trait]
impl Ec2Api for FakeEc2 {
  async fn vpc_security_groups(&self, vpc_id: &str) -> Result<Vec<SecurityGroup>, ProviderError> {
    if vpc_id != self.vpc_id {
      return Err(ProviderError::not_found(
        "describe-security-groups",
        format!("InvalidVpcID.NotFound: The vpc ID '{vpc_id}' does not exist"),
      ));
    }

    Ok(self.groups.clone())
  }

  async fn authorize_ingress(&self, rule: &IngressRule) -> Result<(), ProviderError> {
    if let Some(err) = &self.authorize_error {
      return Err(err.clone());
    }

    let mut rules = self.rules.lock().unwrap();
    if rules.contains(rule) {
      return Err(ProviderError::already_exists(
        "authorize-security-group-ingress",
        "InvalidPermission.Duplicate: the specified rule already exists",
      ));
    }
    rules.push(rule.clone());

    Ok(())
  }
}

/// Tracks which tables exist and rejects statements against missing ones
#[derive(Default)]
pub struct FakeWarehouse {
  tables: Mutex<BTreeSet<String>>,
  executed: Mutex<Vec<String>>,
}

impl FakeWarehouse {
  pub fn executed(&self) -> Vec<String> {
    self.executed.lock().unwrap().clone()
  }

  pub fn tables(&self) -> BTreeSet<String> {
    self.tables.lock().unwrap().clone()
  }
}

#[async_trait]
impl Execute for FakeWarehouse {
  async fn execute(&self, sql: &str) -> Result<()> {
    let words: Vec<&str> = sql.split_whitespace().collect();
    let mut tables = self.tables.lock().unwrap();

    match words.as_slice() {
      ["DROP", "TABLE", "IF", "EXISTS", table, ..] => {
        tables.remove(*table);
      }
      ["DROP", "TABLE", table, ..] => {
        if !tables.remove(*table) {
          bail!("table \"{table}\" does not exist");
        }
      }
      ["CREATE", "TABLE", "IF", "NOT", "EXISTS", table, ..] => {
        tables.insert((*table).to_owned());
      }
      ["COPY", table, ..] | ["INSERT", "INTO", table, ..] => {
        if !tables.contains(*table) {
          bail!("relation \"{table}\" does not exist");
        }
      }
      _ => bail!("unsupported statement: {sql}"),
    }

    self.executed.lock().unwrap().push(sql.to_owned());
    Ok(())
  }
}
