use clap::{Parser, Subcommand};
use sqlx::PgPool;
use std::sync::Arc;

use crate::adapters::{PostgresOrderEvents, PostgresOrderRepository};
use crate::config::{AllowedIps, Config};
use crate::use_cases::{Actor, UpdateOrderStatus, UpdateStatusInput};
use crate::utils::sanitize::mask_secret;

#[derive(Parser)]
#[command(name = "freshcut-store")]
#[command(about = "FreshCut Store - fresh meat storefront API", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Order management commands
    #[command(subcommand)]
    Order(OrderCommands),

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Configuration validation
    Config,
}

#[derive(Subcommand)]
pub enum OrderCommands {
    /// Move an order to a new status through the normal workflow
    SetStatus {
        /// Order id
        #[arg(value_name = "ORDER_ID")]
        order_id: String,

        /// Target status, e.g. SHIPPING
        #[arg(value_name = "STATUS")]
        status: String,

        /// Reason recorded in the status history
        #[arg(short, long)]
        reason: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

/// Applies a status change as the system actor. The transition graph and the
/// concurrent-update check still apply.
pub async fn handle_order_set_status(
    pool: &PgPool,
    order_id: String,
    status: String,
    reason: Option<String>,
) -> anyhow::Result<()> {
    let use_case = UpdateOrderStatus::new(
        Arc::new(PostgresOrderRepository::new(pool.clone())),
        Arc::new(PostgresOrderEvents::inline(pool.clone())),
    );

    let order = use_case
        .execute(UpdateStatusInput {
            order_id,
            status,
            reason,
            actor: Actor::System,
        })
        .await?;

    println!("✓ Order {} is now {}", order.id, order.status);
    Ok(())
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let pool = crate::db::create_pool(config).await?;
    crate::db::run_migrations(&pool).await?;
    println!("✓ Database migrations completed");
    Ok(())
}

pub fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration:");
    println!("  Server Port: {}", config.server_port);
    println!("  Database URL: {}", mask_password(&config.database_url));
    println!("  Public Base URL: {}", config.public_base_url);
    println!("  JWT Secret: {}", mask_secret(&config.jwt_secret));
    println!("  VNPay Terminal: {}", config.vnpay.tmn_code);
    println!("  VNPay Hash Secret: {}", mask_secret(&config.vnpay.hash_secret));
    println!("  VNPay Payment URL: {}", config.vnpay.payment_url);
    println!("  VNPay IPN Allow-list: {}", describe_allowed_ips(&config.vnpay.ipn_allowed_ips));
    println!("  Trusted Proxy Depth: {}", config.trusted_proxy_depth);
    println!(
        "  Rate Limit: {} attempts / {}s",
        config.rate_limit.max_attempts, config.rate_limit.window_secs
    );
    println!("  Export Requires Admin: {}", config.export_require_admin);
    println!(
        "  Mail API: {}",
        config.mail.api_url.as_deref().unwrap_or("(log only)")
    );

    config.validate()?;
    tracing::info!("Configuration is valid");
    println!("✓ Configuration is valid");

    Ok(())
}

fn describe_allowed_ips(allowed: &AllowedIps) -> String {
    match allowed {
        AllowedIps::Any => "* (any address)".to_string(),
        AllowedIps::Cidrs(cidrs) => cidrs
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", "),
    }
}

fn mask_password(database_url: &str) -> String {
    match url::Url::parse(database_url) {
        Ok(mut parsed) if parsed.password().is_some() => match parsed.set_password(Some("****")) {
            Ok(()) => parsed.to_string(),
            Err(()) => database_url.to_string(),
        },
        _ => database_url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_password_is_masked() {
        assert_eq!(
            mask_password("postgres://shop:hunter2@db:5432/freshcut"),
            "postgres://shop:****@db:5432/freshcut"
        );
        assert_eq!(mask_password("postgres://db/freshcut"), "postgres://db/freshcut");
    }

    #[test]
    fn set_status_arguments_parse() {
        let cli = Cli::try_parse_from([
            "freshcut-store",
            "order",
            "set-status",
            "42",
            "SHIPPING",
            "--reason",
            "Handed to courier",
        ])
        .unwrap();

        match cli.command {
            Some(Commands::Order(OrderCommands::SetStatus {
                order_id,
                status,
                reason,
            })) => {
                assert_eq!(order_id, "42");
                assert_eq!(status, "SHIPPING");
                assert_eq!(reason.as_deref(), Some("Handed to courier"));
            }
            _ => panic!("expected order set-status"),
        }
    }

    #[test]
    fn no_subcommand_means_serve() {
        let cli = Cli::try_parse_from(["freshcut-store"]).unwrap();
        assert!(cli.command.is_none());
    }
}
