use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::NamedTempFile;

const CONFIG: &str = r#"[AWS]
KEY=
SECRET=

[CLUSTER]
DB_NAME=dwh
DB_USER=dwhuser
DB_PASSWORD=Passw0rd
DB_PORT=5439

[DWH]
DWH_CLUSTER_TYPE=multi-node
DWH_NUM_NODES=four
DWH_NODE_TYPE=dc2.large
DWH_CLUSTER_IDENTIFIER=dwhCluster
DWH_IAM_ROLE_NAME=dwhRole
DWH_REGION=us-west-2

[IAM_ROLE]
ARN=

[S3]
LOG_DATA='s3://udacity-dend/log_data'
LOG_JSONPATH='s3://udacity-dend/log_json_path.json'
SONG_DATA='s3://udacity-dend/song_data'
"#;

fn config_file(contents: &str) -> NamedTempFile {
  let mut file = tempfile::Builder::new().suffix(".cfg").tempfile().unwrap();
  file.write_all(contents.as_bytes()).unwrap();
  file
}

#[test]
fn dwhctl_help_lists_delete() {
  Command::cargo_bin("dwhctl")
    .unwrap()
    .arg("--help")
    .assert()
    .success()
    .stdout(predicate::str::contains("--delete"));
}

#[test]
fn dwhctl_fails_without_config() {
  let dir = tempfile::tempdir().unwrap();

  Command::cargo_bin("dwhctl")
    .unwrap()
    .args(["--config", dir.path().join("missing.cfg").to_str().unwrap()])
    .assert()
    .code(2)
    .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn dwhctl_rejects_invalid_node_count_before_provisioning() {
  let file = config_file(CONFIG);

  Command::cargo_bin("dwhctl")
    .unwrap()
    .args(["--no-color", "--config", file.path().to_str().unwrap()])
    .assert()
    .code(2)
    .stderr(predicate::str::contains("DWH_NUM_NODES"));
}

#[test]
fn dwhetl_help_lists_subcommands() {
  Command::cargo_bin("dwhetl")
    .unwrap()
    .arg("--help")
    .assert()
    .success()
    .stdout(predicate::str::contains("create-tables").and(predicate::str::contains("load")));
}
