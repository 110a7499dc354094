use clap::{Parser, Subcommand};

use crate::adapters::PostgresStore;
use crate::config::{AllowedIps, Config};
use crate::ports::TransactionLedger;
use crate::services::reporting::status_message;

#[derive(Parser)]
#[command(name = "coursepay-core")]
#[command(about = "CoursePay Core - merchant endpoint for course purchases", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Transaction inspection commands
    #[command(subcommand)]
    Tx(TxCommands),

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Configuration validation
    Config,
}

#[derive(Subcommand)]
pub enum TxCommands {
    /// Show the ledger record for a processor transaction id
    Status {
        #[arg(value_name = "EXTERNAL_ID")]
        external_id: String,
    },
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

pub async fn handle_tx_status(config: &Config, external_id: &str) -> anyhow::Result<()> {
    let pool = crate::db::create_pool(config).await?;
    let store = PostgresStore::new(pool);

    match store.find(external_id).await? {
        Some(entry) => {
            println!("Transaction {}", entry.external_id);
            println!("  State:        {} ({})", entry.state.name(), status_message(entry.state));
            println!("  Amount:       {} (minor units)", entry.amount);
            println!("  Course/User:  {}/{}", entry.account.course_id, entry.account.user_id);
            println!("  Created:      {}", entry.create_time);
            println!("  Performed:    {}", display_time(entry.perform_time));
            println!("  Cancelled:    {}", display_time(entry.cancel_time));
            if let Some(reason) = entry.reason {
                println!("  Reason:       {}", reason);
            }
            Ok(())
        }
        None => {
            tracing::warn!(external_id, "transaction not found");
            anyhow::bail!("Transaction {} not found", external_id)
        }
    }
}

fn display_time(value: Option<i64>) -> String {
    value.map_or_else(|| "-".to_string(), |t| t.to_string())
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let pool = crate::db::create_pool(config).await?;

    tracing::info!("Running database migrations...");
    crate::db::run_migrations(&pool).await?;
    println!("✓ Database migrations completed");

    Ok(())
}

pub fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");
    config.validate()?;

    println!("Configuration:");
    println!("  Server Port: {}", config.server_port);
    println!("  Database URL: {}", mask_password(&config.database_url));
    println!("  Max DB Connections: {}", config.database_max_connections);
    println!("  Log Format: {:?}", config.log_format);
    println!("  Merchant ID: {}", config.merchant.merchant_id);
    println!("  Merchant Login: {}", config.merchant.login);
    println!(
        "  Allowed IPs: {}",
        match &config.merchant.allowed_ips {
            AllowedIps::Any => "any".to_string(),
            AllowedIps::Cidrs(cidrs) => cidrs
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        }
    );
    println!("  Trusted Proxy Depth: {}", config.merchant.trusted_proxy_depth);
    println!("  Checkout URL: {}", config.merchant.checkout_url);
    println!("  Return URL: {}", config.merchant.return_url);

    tracing::info!("Configuration is valid");
    println!("✓ Configuration is valid");

    Ok(())
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user_start = slash_pos + 2;
                let user = &url[user_start..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}
