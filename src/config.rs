use anyhow::{ensure, Context};
use clap::Args;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Connection settings shared by every subcommand.
#[derive(Debug, Clone, Args)]
pub struct DatabaseArgs {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: String,

    #[arg(long, env = "FEEDFLOW_MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,
}

impl DatabaseArgs {
    pub async fn connect(&self) -> anyhow::Result<PgPool> {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .connect(&self.database_url)
            .await
            .context("failed to connect to Postgres")
    }
}

#[derive(Debug, Clone, Args)]
pub struct ServerSettings {
    #[arg(long, env = "FEEDFLOW_BIND", default_value = "0.0.0.0:3000")]
    pub bind: String,

    /// HS256 signing secret for bearer tokens
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,

    /// Prefix for the short links handed out when a survey is created
    #[arg(long, env = "FEEDFLOW_PUBLIC_URL", default_value = "https://feedflow.app")]
    pub public_base_url: String,
}

impl ServerSettings {
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(!self.jwt_secret.trim().is_empty(), "JWT_SECRET must not be empty");
        ensure!(
            self.public_base_url.starts_with("http://")
                || self.public_base_url.starts_with("https://"),
            "public base url must start with http:// or https://"
        );
        Ok(())
    }
}
