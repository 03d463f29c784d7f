//! Core types for the role-based authorization system.
//!
//! # Security Considerations
//!
//! ## 1. Principal Identity
//! - Principals are supplied by the external identity provider per call
//! - The engine never persists principal records; a stale `Principal` keeps
//!   its stale grants until the caller re-resolves it
//! - An unauthenticated principal is never treated as an administrator
//!
//! ## 2. Role Hierarchy
//! - Inheritance is meant to form a DAG; cycles are tolerated, not trusted
//! - Role definitions are immutable once the catalog is built
//!
//! ## 3. Resource Attributes
//! - `created_by` and `is_encrypted` drive the ownership and sensitivity
//!   overrides, so they must come from the storage layer, not from the request

use serde::{Deserialize, Serialize};

/// A named bundle of grants, organized in an inheritance hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: String,

    /// Display name shown in admin UIs
    pub name: String,

    /// Hierarchy level; higher levels are more privileged
    pub level: i32,

    /// Role ids this role directly inherits from
    #[serde(default)]
    pub inherits: Vec<String>,

    #[serde(default)]
    pub description: String,
}

impl Role {
    pub fn new(id: impl Into<String>, name: impl Into<String>, level: i32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            level,
            inherits: Vec::new(),
            description: String::new(),
        }
    }

    /// Adds a directly inherited role.
    pub fn inheriting(mut self, role_id: impl Into<String>) -> Self {
        self.inherits.push(role_id.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// An atomic capability, conventionally named `{resourceType}:{action}`.
///
/// Sibling ids with an `:own` or `:encrypted` suffix act as overrides for
/// owned and encrypted resources respectively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: String,

    /// Role ids that grant this permission
    #[serde(default)]
    pub granting_roles: Vec<String>,

    #[serde(default)]
    pub description: String,
}

impl Permission {
    pub fn new<I, S>(id: impl Into<String>, granting_roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            granting_roles: granting_roles.into_iter().map(Into::into).collect(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// The entity whose access is being evaluated.
///
/// # Security Note
/// Principals must be derived from authenticated sessions only. Never build
/// one from untrusted request data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// The unique identifier for this principal (e.g., a user ULID)
    pub id: String,

    /// Directly assigned role ids
    #[serde(default)]
    pub roles: Vec<String>,

    /// Permissions granted directly, outside any role
    #[serde(default)]
    pub explicit_permissions: Vec<String>,

    #[serde(default)]
    pub is_admin: bool,

    #[serde(default = "default_authenticated")]
    pub authenticated: bool,
}

fn default_authenticated() -> bool {
    true
}

impl Principal {
    /// Creates an authenticated principal with no grants.
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            roles: Vec::new(),
            explicit_permissions: Vec::new(),
            is_admin: false,
            authenticated: true,
        }
    }

    /// Creates a principal representing an anonymous/unauthenticated caller.
    pub fn anonymous() -> Self {
        Self {
            authenticated: false,
            ..Self::user("anonymous")
        }
    }

    pub fn with_role(mut self, role_id: impl Into<String>) -> Self {
        self.roles.push(role_id.into());
        self
    }

    pub fn with_permission(mut self, permission_id: impl Into<String>) -> Self {
        self.explicit_permissions.push(permission_id.into());
        self
    }

    pub fn admin(mut self) -> Self {
        self.is_admin = true;
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Admin bypass only ever applies to authenticated principals.
    pub fn is_effective_admin(&self) -> bool {
        self.authenticated && self.is_admin
    }
}

/// Attributes of the resource an action targets.
///
/// Only the fields consulted by `can_perform_action` are modeled here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub resource_type: Option<String>,

    /// Principal id of the creator; enables the `:own` override
    #[serde(default)]
    pub created_by: Option<String>,

    /// Enables the `:encrypted` override
    #[serde(default)]
    pub is_encrypted: bool,

    /// Private resources are hidden from unauthenticated viewers
    #[serde(default)]
    pub is_private: bool,
}

impl Resource {
    pub fn new(id: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            resource_type: Some(resource_type.into()),
            ..Self::default()
        }
    }

    pub fn created_by(mut self, principal_id: impl Into<String>) -> Self {
        self.created_by = Some(principal_id.into());
        self
    }

    pub fn encrypted(mut self) -> Self {
        self.is_encrypted = true;
        self
    }

    pub fn private(mut self) -> Self {
        self.is_private = true;
        self
    }

    pub fn is_owned_by(&self, principal_id: &str) -> bool {
        self.created_by.as_deref() == Some(principal_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_principal_user_helper() {
        let principal = Principal::user("01H8XGJWBWBAQ4Z4M9D5K4Z3E1")
            .with_role("viewer")
            .with_permission("content:view");
        assert!(principal.is_authenticated());
        assert!(!principal.is_admin);
        assert_eq!(principal.roles, vec!["viewer"]);
        assert_eq!(principal.explicit_permissions, vec!["content:view"]);
    }

    #[test]
    fn test_principal_anonymous() {
        let principal = Principal::anonymous();
        assert_eq!(principal.id, "anonymous");
        assert!(!principal.is_authenticated());
    }

    #[test]
    fn test_anonymous_admin_is_not_effective_admin() {
        let principal = Principal::anonymous().admin();
        assert!(principal.is_admin);
        assert!(!principal.is_effective_admin());
        assert!(Principal::user("root").admin().is_effective_admin());
    }

    #[test]
    fn test_principal_deserialize_defaults() {
        let principal: Principal = serde_json::from_value(serde_json::json!({ "id": "u1" })).unwrap();
        assert!(principal.authenticated);
        assert!(principal.roles.is_empty());
        assert!(!principal.is_admin);
    }

    #[test]
    fn test_role_builder() {
        let role = Role::new("contributor", "Contributor", 50)
            .inheriting("viewer")
            .with_description("Can edit content");
        assert_eq!(role.inherits, vec!["viewer"]);
        assert_eq!(role.level, 50);
    }

    #[test]
    fn test_resource_ownership() {
        let resource = Resource::new("n1", "node").created_by("u1").encrypted();
        assert!(resource.is_owned_by("u1"));
        assert!(!resource.is_owned_by("u2"));
        assert!(resource.is_encrypted);
        assert!(!resource.is_private);
        assert!(!Resource::default().is_owned_by("u1"));
    }
}
