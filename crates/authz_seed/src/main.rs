mod config;

use anyhow::{Context, Result};
use authz_api::{AuthzRepositories, BootstrapInput};
use common::postgres::PostgresClient;
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig};
use crate::config::ServiceConfig;
use goose::MigrationRunner;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let telemetry_providers = match init_telemetry(&TelemetryConfig {
        service_name: config.otel_service_name.clone(),
        otel_endpoint: config.otel_endpoint.clone(),
        otel_enabled: config.otel_enabled,
        log_level: config.log_level.clone(),
    }) {
        Ok(providers) => providers,
        Err(e) => {
            eprintln!("Failed to initialize telemetry: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        otel_enabled = config.otel_enabled,
        run_migrations = config.run_migrations,
        "Starting authz-seed"
    );

    let exit_code = match seed(&config).await {
        Ok(()) => 0,
        Err(e) => {
            error!("Bootstrap failed: {:#}", e);
            1
        }
    };

    shutdown_telemetry(telemetry_providers);
    std::process::exit(exit_code);
}

async fn seed(config: &ServiceConfig) -> Result<()> {
    let administrator_user_id = config
        .administrator_user_id
        .clone()
        .filter(|id| !id.is_empty())
        .context("CAMPUS_AUTHZ_ADMINISTRATOR_USER_ID must be set")?;

    let postgres = config.postgres();

    if config.run_migrations {
        MigrationRunner::new(
            postgres.goose_binary_path.clone(),
            postgres.migrations_dir.clone(),
            "postgres",
            postgres.dsn(),
        )
        .run_migrations()
        .await
        .context("running PostgreSQL migrations")?;
    }

    let client = PostgresClient::from_config(&postgres)?;
    client.ping().await.context("connecting to PostgreSQL")?;
    debug!(host = %postgres.host, database = %postgres.database, "connected to PostgreSQL");

    let report = AuthzRepositories::postgres(client)
        .bootstrapper()
        .run(BootstrapInput {
            administrator_user_id,
        })
        .await?;

    info!(
        catalog_size = report.catalog_size,
        super_role_id = %report.super_role_id,
        super_role_created = report.super_role_created,
        roles_created = ?report.roles_created,
        bindings_created = report.bindings_created,
        administrator_assigned = report.administrator_assigned,
        "Bootstrap finished"
    );
    Ok(())
}
