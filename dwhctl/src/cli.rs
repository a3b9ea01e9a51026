use std::path::PathBuf;

use anstyle::{AnsiColor, Color, Style};
use anyhow::Result;
use clap::{builder::Styles, Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};

use crate::{
  commands::{provision, tables, teardown},
  config::{ClusterSpec, Settings, DEFAULT_CONFIG_PATH},
  iam::RoleSpec,
  redshift::PollPolicy,
  Clients,
};

/// Styles for CLI
fn get_styles() -> Styles {
  Styles::styled()
    .header(
      Style::new()
        .bold()
        .underline()
        .fg_color(Some(Color::Ansi(AnsiColor::Green))),
    )
    .literal(Style::new().bold().fg_color(Some(Color::Ansi(AnsiColor::BrightCyan))))
    .usage(Style::new().bold().fg_color(Some(Color::Ansi(AnsiColor::Green))))
    .placeholder(
      Style::new()
        .bold()
        .underline()
        .fg_color(Some(Color::Ansi(AnsiColor::Yellow))),
    )
}

/// Provision or tear down the Redshift data warehouse
///
/// Without flags: creates the IAM role, creates the cluster, waits for it to become
/// available and opens the database port
#[derive(Debug, Parser)]
#[command(author, about, version)]
#[command(propagate_version = true)]
#[command(styles=get_styles())]
pub struct Cli {
  /// Delete the cluster and the IAM role instead of creating them
  #[arg(long)]
  pub delete: bool,

  /// Path to the INI configuration file
  #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
  pub config: PathBuf,

  /// Disable colored log output
  #[arg(long)]
  pub no_color: bool,

  #[clap(flatten)]
  pub verbose: Verbosity<InfoLevel>,
}

impl Cli {
  pub async fn exec(&self) -> Result<()> {
    let settings = Settings::load(&self.config)?;
    let role = RoleSpec::redshift_s3_read(&settings.dwh.dwh_iam_role_name);

    if self.delete {
      let clients = Clients::new(&settings).await?;
      return teardown::teardown(
        &clients.iam,
        &clients.redshift,
        &settings.dwh.dwh_cluster_identifier,
        &role,
      )
      .await;
    }

    // Validate before any resource is created
    let spec = ClusterSpec::from_settings(&settings)?;
    let clients = Clients::new(&settings).await?;
    provision::provision(
      &clients.iam,
      &clients.redshift,
      &clients.ec2,
      &spec,
      &role,
      &PollPolicy::default(),
    )
    .await?;

    Ok(())
  }
}

/// Create the warehouse tables and run the ETL pipeline against the cluster
#[derive(Debug, Parser)]
#[command(author, about, version)]
#[command(propagate_version = true)]
#[command(styles=get_styles())]
pub struct EtlCli {
  #[command(subcommand)]
  pub command: EtlCommands,

  /// Path to the INI configuration file
  #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
  pub config: PathBuf,

  /// Disable colored log output
  #[arg(long, global = true)]
  pub no_color: bool,

  #[clap(flatten)]
  pub verbose: Verbosity<InfoLevel>,
}

#[derive(Debug, Subcommand)]
pub enum EtlCommands {
  /// Drop and re-create the staging, fact and dimension tables
  CreateTables,

  /// Bulk load the staging tables from S3 and populate the star schema
  Load(tables::Load),
}

impl EtlCli {
  pub async fn exec(&self) -> Result<()> {
    let settings = Settings::load(&self.config)?;
    let clients = Clients::new(&settings).await?;

    match &self.command {
      EtlCommands::CreateTables => tables::create_tables(&settings, &clients).await,
      EtlCommands::Load(load) => load.load(&settings, &clients).await,
    }
  }
}
