use crate::utils::config_file::{self, Loaded};
use anyhow::{anyhow, Result};
use colored::*;
use rbac_authz::{Principal, Resource};
use serde_json::json;
use std::path::Path;

/// Resource attributes given on the command line
pub struct ResourceFlags {
    pub owner: Option<String>,
    pub encrypted: bool,
    pub private: bool,
}

impl ResourceFlags {
    /// No flags means "no resource": the base grant alone decides.
    fn to_resource(&self, resource_type: &str) -> Option<Resource> {
        if self.owner.is_none() && !self.encrypted && !self.private {
            return None;
        }
        Some(Resource {
            resource_type: Some(resource_type.to_string()),
            created_by: self.owner.clone(),
            is_encrypted: self.encrypted,
            is_private: self.private,
            ..Resource::default()
        })
    }
}

/// Check permissions; returns whether access is allowed
pub fn permissions(
    path: &Path,
    principal_id: &str,
    permission_ids: &[String],
    any: bool,
    format: &str,
) -> Result<bool> {
    let loaded = config_file::load(path)?;
    let principal = loaded.principal(principal_id)?;

    let result = if any {
        loaded.engine.try_has_any_permission(&principal, permission_ids)
    } else {
        loaded.engine.try_has_all_permissions(&principal, permission_ids)
    };
    let allowed = result.map_err(|e| anyhow!("Invalid query: {}", e))?;

    let details = if permission_ids.len() == 1 {
        Some(
            loaded
                .engine
                .check_permission_detailed(&principal, &permission_ids[0])?,
        )
    } else {
        None
    };

    let query = format!(
        "{} {}",
        if any { "any of" } else { "all of" },
        permission_ids.join(", ")
    );

    match format {
        "json" => {
            let output = json!({
                "principal": principal.id,
                "permissions": permission_ids,
                "mode": if any { "any" } else { "all" },
                "allowed": allowed,
                "details": details,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        _ => {
            print_decision(&principal, &query, allowed);
            if let Some(details) = details {
                if let Some(reason) = details.denial_reason {
                    println!("  {}: {}", "reason".cyan(), reason);
                } else {
                    println!("  {}: {:?}", "granted by".cyan(), details.granted_by);
                }
            }
        }
    }

    Ok(allowed)
}

/// Check directly assigned roles; returns whether access is allowed
pub fn roles(
    path: &Path,
    principal_id: &str,
    role_ids: &[String],
    any: bool,
    format: &str,
) -> Result<bool> {
    let loaded = config_file::load(path)?;
    let principal = loaded.principal(principal_id)?;

    let result = if any {
        loaded.engine.try_has_any_role(&principal, role_ids)
    } else {
        loaded.engine.try_has_all_roles(&principal, role_ids)
    };
    let allowed = result.map_err(|e| anyhow!("Invalid query: {}", e))?;

    match format {
        "json" => {
            let output = json!({
                "principal": principal.id,
                "roles": role_ids,
                "mode": if any { "any" } else { "all" },
                "allowed": allowed,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        _ => {
            let query = format!(
                "role {} {}",
                if any { "any of" } else { "all of" },
                role_ids.join(", ")
            );
            print_decision(&principal, &query, allowed);
        }
    }

    Ok(allowed)
}

/// Check an action on a resource type; returns whether access is allowed
pub fn action(
    path: &Path,
    principal_id: &str,
    action: &str,
    resource_type: &str,
    flags: &ResourceFlags,
    format: &str,
) -> Result<bool> {
    let loaded = config_file::load(path)?;
    let principal = loaded.principal(principal_id)?;
    let resource = flags.to_resource(resource_type);

    let allowed = loaded
        .engine
        .try_can_perform_action(&principal, action, resource_type, resource.as_ref())
        .map_err(|e| anyhow!("Invalid query: {}", e))?;

    match format {
        "json" => {
            let output = json!({
                "principal": principal.id,
                "action": action,
                "resource_type": resource_type,
                "resource": resource,
                "allowed": allowed,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        _ => {
            let query = format!("{} on {}", action, resource_type);
            print_decision(&principal, &query, allowed);
            if let Some(resource) = &resource {
                print_resource(resource);
            }
        }
    }

    Ok(allowed)
}

/// Print the effective permission set of a principal
pub fn effective(path: &Path, principal_id: &str, format: &str) -> Result<()> {
    let loaded = config_file::load(path)?;
    let principal = loaded.principal(principal_id)?;
    let permissions = effective_permissions(&loaded, &principal)?;

    match format {
        "json" => {
            let output = json!({
                "principal": principal.id,
                "is_admin": principal.is_admin,
                "permissions": permissions,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        _ => {
            println!(
                "{}",
                format!("=== Effective permissions for {} ===", principal.id).bold()
            );
            println!();
            if permissions.is_empty() {
                println!("{}", "No permissions".yellow());
            }
            for permission in &permissions {
                println!("  {}", permission.cyan());
            }
            println!();
            println!(
                "{}",
                format!("Total permissions: {}", permissions.len()).green()
            );
        }
    }

    Ok(())
}

fn effective_permissions(loaded: &Loaded, principal: &Principal) -> Result<Vec<String>> {
    let permissions = loaded
        .engine
        .try_get_effective_permissions(principal)
        .map_err(|e| anyhow!("Failed to resolve permissions: {}", e))?;
    Ok(permissions.into_iter().collect())
}

fn print_decision(principal: &Principal, query: &str, allowed: bool) {
    let verdict = if allowed {
        "ALLOWED".green().bold()
    } else {
        "DENIED".red().bold()
    };
    let who = if principal.is_authenticated() {
        principal.id.clone()
    } else {
        format!("{} (unauthenticated)", principal.id)
    };
    println!("{} {} {}", verdict, who.cyan(), query);
}

fn print_resource(resource: &Resource) {
    let mut attributes = Vec::new();
    if let Some(owner) = &resource.created_by {
        attributes.push(format!("owner={}", owner));
    }
    if resource.is_encrypted {
        attributes.push("encrypted".to_string());
    }
    if resource.is_private {
        attributes.push("private".to_string());
    }
    println!("  {}: {}", "resource".cyan(), attributes.join(", "));
}
