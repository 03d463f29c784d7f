use crate::utils::config_file;
use anyhow::Result;
use colored::*;
use rbac_authz::{Permission, Role};
use serde_json::json;
use std::path::Path;

/// Load the configuration, build the catalog and report what it contains
pub fn validate(path: &Path, format: &str) -> Result<()> {
    let loaded = config_file::load(path)?;
    let catalog = loaded.engine.catalog();
    let cycle = catalog.roles().find_cycle();

    let report = json!({
        "status": "valid",
        "path": path.display().to_string(),
        "roles": catalog.roles().len(),
        "permissions": catalog.permissions().len(),
        "principals": loaded.config.principals.len(),
        "cache_enabled": loaded.config.cache_enabled,
        "cache_ttl_ms": loaded.config.cache_ttl_ms,
        "max_inheritance_depth": loaded.config.max_inheritance_depth,
        "inheritance_cycle": cycle,
    });

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => {
            println!("{}", "=== RBAC Configuration ===".bold());
            println!();
            println!("{}: {}", "Path".bold(), path.display().to_string().green());
            println!("{}: {}", "Roles".bold(), catalog.roles().len());
            println!("{}: {}", "Permissions".bold(), catalog.permissions().len());
            println!("{}: {}", "Principals".bold(), loaded.config.principals.len());
            println!(
                "{}: {} (ttl {} ms)",
                "Decision cache".bold(),
                if loaded.config.cache_enabled {
                    "enabled".green()
                } else {
                    "disabled".yellow()
                },
                loaded.config.cache_ttl_ms
            );
            if let Some(cycle) = cycle {
                println!(
                    "{} {}",
                    "Inheritance cycle:".yellow().bold(),
                    cycle.join(" -> ").yellow()
                );
            }
            println!();
            println!("{}", "Configuration is valid".green());
        }
    }

    Ok(())
}

/// List roles, most privileged first
pub fn roles(path: &Path, format: &str) -> Result<()> {
    let loaded = config_file::load(path)?;
    let roles = loaded.engine.list_roles();

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&roles)?),
        _ => print_roles_text(&roles),
    }

    Ok(())
}

/// List permissions ordered by id
pub fn permissions(path: &Path, format: &str) -> Result<()> {
    let loaded = config_file::load(path)?;
    let permissions = loaded.engine.list_permissions();

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&permissions)?),
        _ => print_permissions_text(&permissions),
    }

    Ok(())
}

fn print_roles_text(roles: &[Role]) {
    println!("{}", "=== Roles ===".bold());
    println!();

    if roles.is_empty() {
        println!("{}", "No roles defined".yellow());
        return;
    }

    for role in roles {
        println!(
            "{} {} {}",
            format!("[{}]", role.id).cyan().bold(),
            role.name,
            format!("(level {})", role.level).magenta()
        );
        if !role.inherits.is_empty() {
            println!("  {}: {}", "inherits".cyan(), role.inherits.join(", "));
        }
        if !role.description.is_empty() {
            println!("  {}", role.description);
        }
    }

    println!();
    println!("{}", format!("Total roles: {}", roles.len()).green());
}

fn print_permissions_text(permissions: &[Permission]) {
    println!("{}", "=== Permissions ===".bold());
    println!();

    if permissions.is_empty() {
        println!("{}", "No permissions defined".yellow());
        return;
    }

    for permission in permissions {
        let granted_by = if permission.granting_roles.is_empty() {
            "(no roles)".yellow().to_string()
        } else {
            permission.granting_roles.join(", ")
        };
        println!("{} {}", permission.id.cyan().bold(), granted_by);
        if !permission.description.is_empty() {
            println!("  {}", permission.description);
        }
    }

    println!();
    println!(
        "{}",
        format!("Total permissions: {}", permissions.len()).green()
    );
}
