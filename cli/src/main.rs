use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;

mod commands;
mod utils;

use commands::{catalog, check};
use utils::config_file;

/// RBAC CLI - Command line interface for the role-based authorization engine
#[derive(Parser)]
#[command(name = "rbacctl")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the role/permission configuration (defaults to the nearest rbac.yaml)
    #[arg(short, long, global = true, env = "RBAC_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and report its contents
    Validate {
        /// Output format (json, text)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List all roles, most privileged first
    Roles {
        /// Output format (json, text)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List all permissions
    Permissions {
        /// Output format (json, text)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Evaluate an authorization question
    Check {
        #[command(subcommand)]
        query: CheckQuery,
    },

    /// Print the effective permission set of a principal
    Effective {
        /// Principal id from the configuration, or "anonymous"
        principal: String,

        /// Output format (json, text)
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

#[derive(Subcommand)]
enum CheckQuery {
    /// Check one or more permissions
    Permission {
        /// Principal id from the configuration, or "anonymous"
        principal: String,

        /// Permission ids
        #[arg(required = true)]
        permissions: Vec<String>,

        /// Allow if any permission is granted (default requires all)
        #[arg(long)]
        any: bool,

        /// Output format (json, text)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check one or more directly assigned roles
    Role {
        /// Principal id from the configuration, or "anonymous"
        principal: String,

        /// Role ids
        #[arg(required = true)]
        roles: Vec<String>,

        /// Allow if any role is assigned (default requires all)
        #[arg(long)]
        any: bool,

        /// Output format (json, text)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check an action on a resource type, applying resource overrides
    Action {
        /// Principal id from the configuration, or "anonymous"
        principal: String,

        /// Action name (e.g. "edit")
        action: String,

        /// Resource type (e.g. "node")
        resource_type: String,

        /// Principal id that created the resource
        #[arg(long)]
        owner: Option<String>,

        /// The resource is encrypted
        #[arg(long)]
        encrypted: bool,

        /// The resource is private
        #[arg(long)]
        private: bool,

        /// Output format (json, text)
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

/// Exit status for a well-formed query that was denied.
const EXIT_DENIED: i32 = 2;

fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging on stderr so stdout stays machine-readable
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .init();

    let config_path = match config_file::resolve(cli.config.as_deref()) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            eprintln!(
                "{}",
                "Pass --config <path>, set RBAC_CONFIG, or run rbacctl next to an rbac.yaml"
                    .yellow()
            );
            std::process::exit(1);
        }
    };

    let allowed = match cli.command {
        Commands::Validate { format } => {
            catalog::validate(&config_path, &format)?;
            true
        }
        Commands::Roles { format } => {
            catalog::roles(&config_path, &format)?;
            true
        }
        Commands::Permissions { format } => {
            catalog::permissions(&config_path, &format)?;
            true
        }
        Commands::Effective { principal, format } => {
            check::effective(&config_path, &principal, &format)?;
            true
        }
        Commands::Check { query } => match query {
            CheckQuery::Permission {
                principal,
                permissions,
                any,
                format,
            } => check::permissions(&config_path, &principal, &permissions, any, &format)?,
            CheckQuery::Role {
                principal,
                roles,
                any,
                format,
            } => check::roles(&config_path, &principal, &roles, any, &format)?,
            CheckQuery::Action {
                principal,
                action,
                resource_type,
                owner,
                encrypted,
                private,
                format,
            } => {
                let resource = check::ResourceFlags {
                    owner,
                    encrypted,
                    private,
                };
                check::action(
                    &config_path,
                    &principal,
                    &action,
                    &resource_type,
                    &resource,
                    &format,
                )?
            }
        },
    };

    if !allowed {
        std::process::exit(EXIT_DENIED);
    }

    Ok(())
}
