//! Geofence rule engine CLI
//!
//! Loads a rule set from configuration and answers access queries as JSON.

use clap::{Args as ClapArgs, Parser, Subcommand};
use geofence_rules::{
    authz::AccessSummaryRequest,
    config::{LogFormat, load_config},
    engine::Engine,
    events::TracingEventSink,
    model::{AccessRequest, AdminAccessRequest, AdminRuleFilter, RuleFilter},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Geofence rules - evaluate priority-ordered access rules for GIS data
#[derive(Parser, Debug)]
#[command(name = "geofence-rules")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "GEOFENCE_RULES_CONFIG")]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, env = "GEOFENCE_RULES_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve a data access request
    Check(RequestArgs),

    /// List the rules taking part in resolving a data access request
    Matching(RequestArgs),

    /// Resolve admin rights on a workspace
    Admin(AdminArgs),

    /// Summarize per-workspace access for a user
    Summary(IdentityArgs),

    /// List stored rules in priority order
    List(ListArgs),
}

#[derive(ClapArgs, Debug)]
struct IdentityArgs {
    /// User name
    #[arg(short, long)]
    user: Option<String>,

    /// Role held by the user (repeatable)
    #[arg(short, long = "role")]
    roles: Vec<String>,
}

#[derive(ClapArgs, Debug)]
struct RequestArgs {
    #[command(flatten)]
    identity: IdentityArgs,

    /// Restrict resolution to these roles (repeatable)
    #[arg(long = "role-filter")]
    role_filter: Vec<String>,

    /// Source IP address
    #[arg(long)]
    address: Option<String>,

    #[arg(long)]
    service: Option<String>,

    #[arg(long)]
    request: Option<String>,

    #[arg(long)]
    subfield: Option<String>,

    #[arg(short, long)]
    workspace: Option<String>,

    #[arg(short, long)]
    layer: Option<String>,
}

#[derive(ClapArgs, Debug)]
struct AdminArgs {
    #[command(flatten)]
    identity: IdentityArgs,

    /// Source IP address
    #[arg(long)]
    address: Option<String>,

    #[arg(short, long)]
    workspace: Option<String>,

    #[arg(long)]
    instance: Option<String>,
}

#[derive(ClapArgs, Debug)]
struct ListArgs {
    /// List admin rules instead of data rules
    #[arg(long)]
    admin: bool,

    /// Page size
    #[arg(long)]
    limit: Option<usize>,

    /// Rule id to start the page from
    #[arg(long)]
    cursor: Option<u64>,
}

impl RequestArgs {
    fn into_request(self) -> AccessRequest {
        let RequestArgs {
            identity,
            role_filter,
            address,
            service,
            request,
            subfield,
            workspace,
            layer,
        } = self;
        AccessRequest {
            user: identity.user,
            roles: identity.roles.into_iter().collect(),
            role_filter: (!role_filter.is_empty()).then(|| role_filter.into_iter().collect()),
            source_address: address,
            service,
            request,
            subfield,
            workspace,
            layer,
        }
    }
}

impl AdminArgs {
    fn into_request(self) -> AdminAccessRequest {
        AdminAccessRequest {
            user: self.identity.user,
            roles: self.identity.roles.into_iter().collect(),
            role_filter: None,
            source_address: self.address,
            workspace: self.workspace,
            instance: self.instance,
        }
    }
}

fn init_logging(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Pretty => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let config = load_config(args.config.as_deref())?;

    let level = args.log_level.as_deref().unwrap_or(&config.logging.level);
    init_logging(level, config.logging.format);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting geofence-rules");

    let engine = Engine::from_config(&config, Arc::new(TracingEventSink))
        .await
        .inspect_err(|e| error!(error = %e, "Failed to seed rule stores"))?;

    match args.command {
        Command::Check(request) => {
            let info = engine
                .resolver
                .get_access_info(&request.into_request())
                .await
                .inspect_err(|e| error!(error = %e, "Access resolution failed"))?;
            print_json(&info)?;
        }
        Command::Matching(request) => {
            let rules = engine
                .resolver
                .get_matching_rules(&request.into_request())
                .await?;
            print_json(&rules)?;
        }
        Command::Admin(request) => {
            let info = engine
                .resolver
                .get_admin_access_info(&request.into_request())
                .await
                .inspect_err(|e| error!(error = %e, "Admin resolution failed"))?;
            print_json(&info)?;
        }
        Command::Summary(identity) => {
            let request = AccessSummaryRequest {
                user: identity.user,
                roles: identity.roles.into_iter().collect(),
            };
            let summary = engine.resolver.get_access_summary(&request).await?;
            print_json(&summary)?;
        }
        Command::List(list) => {
            let page = engine.page(list.limit, list.cursor);
            if list.admin {
                let page = engine.admin_rules.list(&AdminRuleFilter::any(), page).await?;
                print_json(&page.items)?;
                if let Some(next) = page.next_cursor {
                    info!(next_cursor = %next, "More admin rules available");
                }
            } else {
                let page = engine.rules.list(&RuleFilter::any(), page).await?;
                print_json(&page.items)?;
                if let Some(next) = page.next_cursor {
                    info!(next_cursor = %next, "More rules available");
                }
            }
        }
    }

    Ok(())
}
