use common::postgres::PostgresConfig;
use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// User who receives the super-role when nobody holds it yet
    #[serde(default)]
    pub administrator_user_id: Option<String>,

    /// Apply pending migrations before seeding
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,

    // PostgreSQL configuration
    /// PostgreSQL host
    #[serde(default = "default_postgres_host")]
    pub postgres_host: String,

    /// PostgreSQL port
    #[serde(default = "default_postgres_port")]
    pub postgres_port: u16,

    /// PostgreSQL database name
    #[serde(default = "default_postgres_database")]
    pub postgres_database: String,

    /// PostgreSQL username
    #[serde(default = "default_postgres_username")]
    pub postgres_username: String,

    /// PostgreSQL password
    #[serde(default = "default_postgres_password")]
    pub postgres_password: String,

    /// Maximum pooled connections
    #[serde(default = "default_postgres_max_pool_size")]
    pub postgres_max_pool_size: usize,

    /// Path to PostgreSQL migrations directory
    #[serde(default = "default_postgres_migrations_dir")]
    pub postgres_migrations_dir: String,

    /// Path to goose binary
    #[serde(default = "default_postgres_goose_binary_path")]
    pub postgres_goose_binary_path: String,

    // Telemetry configuration
    /// OpenTelemetry OTLP endpoint
    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    /// Export traces and logs over OTLP
    #[serde(default = "default_otel_enabled")]
    pub otel_enabled: bool,

    /// Service name reported to OpenTelemetry
    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_run_migrations() -> bool {
    true
}

fn default_postgres_host() -> String {
    PostgresConfig::default().host
}

fn default_postgres_port() -> u16 {
    PostgresConfig::default().port
}

fn default_postgres_database() -> String {
    PostgresConfig::default().database
}

fn default_postgres_username() -> String {
    PostgresConfig::default().username
}

fn default_postgres_password() -> String {
    PostgresConfig::default().password
}

fn default_postgres_max_pool_size() -> usize {
    // The seed runs its steps one after another
    2
}

fn default_postgres_migrations_dir() -> String {
    PostgresConfig::default().migrations_dir
}

fn default_postgres_goose_binary_path() -> String {
    PostgresConfig::default().goose_binary_path
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_enabled() -> bool {
    false
}

fn default_otel_service_name() -> String {
    "authz-seed".to_string()
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("CAMPUS_AUTHZ"))
            .build()?
            .try_deserialize()
    }

    pub fn postgres(&self) -> PostgresConfig {
        PostgresConfig {
            host: self.postgres_host.clone(),
            port: self.postgres_port,
            database: self.postgres_database.clone(),
            username: self.postgres_username.clone(),
            password: self.postgres_password.clone(),
            max_pool_size: self.postgres_max_pool_size,
            migrations_dir: self.postgres_migrations_dir.clone(),
            goose_binary_path: self.postgres_goose_binary_path.clone(),
        }
    }
}
