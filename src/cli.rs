//! CLI utilities for running and inspecting migrations against a deployment.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::couch::CouchClient;
use crate::import_job::ImportJobRunner;
use crate::migrations::builtin_registry;
use crate::runner::MigrationRunner;
use crate::{MigratorConfig, NoopPublisher};

#[derive(Parser)]
#[command(name = "migrate")]
#[command(about = "CouchDB schema migration management")]
pub struct MigrationCli {
    #[command(subcommand)]
    pub command: Option<MigrationCommand>,
}

#[derive(Subcommand)]
pub enum MigrationCommand {
    /// Run all pending migrations, resuming an interrupted one
    Up,
    /// Show migration status
    Status,
    /// Run the import job poll loop until interrupted
    Jobs {
        /// Migration id to apply to import jobs (defaults to the newest)
        #[arg(long)]
        migration: Option<String>,
    },
}

/// Connection settings, loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub couchdb_url: String,
    pub database_name: String,
    pub page_size: usize,
    pub job_poll_interval: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        let couchdb_url =
            env::var("COUCHDB_URL").unwrap_or_else(|_| "http://localhost:5984".to_string());
        let database_name =
            env::var("COUCHDB_DATABASE").unwrap_or_else(|_| "arsbackend".to_string());
        let page_size = env::var("MIGRATION_PAGE_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(200);
        let job_poll_interval = Duration::from_secs(
            env::var("IMPORT_JOB_POLL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
        );
        Self {
            couchdb_url,
            database_name,
            page_size,
            job_poll_interval,
        }
    }

    fn migrator_config(&self) -> MigratorConfig {
        MigratorConfig {
            page_size: self.page_size,
            job_poll_interval: self.job_poll_interval,
            service_name: self.database_name.clone(),
            ..MigratorConfig::default()
        }
    }
}

/// Parse command line arguments and execute the requested command.
pub async fn run_from_args() -> Result<()> {
    let cli = MigrationCli::parse();
    let config = Config::from_env();
    execute_command(cli.command.unwrap_or(MigrationCommand::Status), config).await
}

pub async fn execute_command(command: MigrationCommand, config: Config) -> Result<()> {
    let store = Arc::new(CouchClient::new(
        config.couchdb_url.clone(),
        config.database_name.clone(),
    ));

    match command {
        MigrationCommand::Up => {
            let runner = MigrationRunner::with_config(
                store,
                builtin_registry(),
                config.migrator_config(),
            );
            runner.initialize().await?;
            let results = runner.migrate_up().await?;
            for result in &results {
                println!(
                    "applied {} ({} step(s)) in {}ms",
                    result.id, result.steps, result.duration_ms
                );
            }
            if results.is_empty() {
                println!("nothing to do");
            }
        }
        MigrationCommand::Status => {
            let runner = MigrationRunner::with_config(
                store,
                builtin_registry(),
                config.migrator_config(),
            );
            let status = runner.status().await?;
            println!("{}", status.summary());
        }
        MigrationCommand::Jobs { migration } => {
            let registry = builtin_registry();
            let migration = match migration {
                Some(id) => registry
                    .get(&id)
                    .with_context(|| format!("no registered migration with id '{id}'"))?,
                None => registry
                    .latest()
                    .context("no migrations are registered")?,
            };
            let runner = ImportJobRunner::new(
                store,
                migration,
                Arc::new(NoopPublisher),
                config.migrator_config(),
            );
            let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    let _ = shutdown_tx.send(true);
                }
            });
            runner.run(shutdown_rx).await;
        }
    }
    Ok(())
}
