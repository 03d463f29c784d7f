//! YAML configuration for the decision engine.
//!
//! Holds the role and permission definitions plus cache and resolver tuning.
//! Unset tuning fields fall back to the library defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::cache::DEFAULT_TTL;
use crate::catalog::Catalog;
use crate::error::{AuthzError, Result};
use crate::resolver::DEFAULT_MAX_DEPTH;
use crate::types::{Permission, Principal, Role};

/// Static engine configuration: the role/permission definitions plus tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthzConfig {
    pub roles: Vec<Role>,

    pub permissions: Vec<Permission>,

    /// Lifetime of a cached decision in milliseconds
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,

    #[serde(default = "default_cache_enabled")]
    pub cache_enabled: bool,

    #[serde(default = "default_max_inheritance_depth")]
    pub max_inheritance_depth: usize,

    /// Known principals, for tooling that has no live identity provider
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub principals: Vec<Principal>,
}

fn default_cache_ttl_ms() -> u64 {
    DEFAULT_TTL.as_millis() as u64
}

fn default_cache_enabled() -> bool {
    true
}

fn default_max_inheritance_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

impl AuthzConfig {
    pub fn new(roles: Vec<Role>, permissions: Vec<Permission>) -> Self {
        Self {
            roles,
            permissions,
            cache_ttl_ms: default_cache_ttl_ms(),
            cache_enabled: default_cache_enabled(),
            max_inheritance_depth: default_max_inheritance_depth(),
            principals: Vec::new(),
        }
    }

    /// Create from YAML content
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from file path
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache_ttl_ms == 0 {
            return Err(AuthzError::Config(
                "cache_ttl_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_inheritance_depth == 0 {
            return Err(AuthzError::Config(
                "max_inheritance_depth must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn build_catalog(&self) -> Result<Catalog> {
        Catalog::new(self.roles.clone(), self.permissions.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
roles:
  - id: viewer
    name: Viewer
    level: 25
  - id: contributor
    name: Contributor
    level: 50
    inherits: [viewer]
    description: Can edit content
permissions:
  - id: content:view
    granting_roles: [viewer, contributor]
  - id: content:edit
    granting_roles: [contributor]
principals:
  - id: u1
    roles: [contributor]
"#;

    #[test]
    fn test_from_yaml_with_defaults() {
        let config = AuthzConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.roles.len(), 2);
        assert_eq!(config.roles[1].inherits, vec!["viewer"]);
        assert_eq!(config.permissions[0].granting_roles.len(), 2);
        assert_eq!(config.cache_ttl(), Duration::from_secs(300));
        assert!(config.cache_enabled);
        assert_eq!(config.max_inheritance_depth, 32);
        assert_eq!(config.principals[0].id, "u1");
        assert!(config.principals[0].authenticated);
    }

    #[test]
    fn test_build_catalog() {
        let catalog = AuthzConfig::from_yaml(SAMPLE).unwrap().build_catalog().unwrap();
        assert!(catalog.get_permission("content:edit").is_some());
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let yaml = format!("{}\ncache_ttl_ms: 0\n", SAMPLE);
        assert!(matches!(
            AuthzConfig::from_yaml(&yaml),
            Err(AuthzError::Config(_))
        ));
    }

    #[test]
    fn test_zero_depth_rejected() {
        let yaml = format!("{}\nmax_inheritance_depth: 0\n", SAMPLE);
        assert!(AuthzConfig::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_oversized_ttl_still_caches() {
        let yaml = format!("{}\ncache_ttl_ms: {}\n", SAMPLE, u64::MAX);
        let config = AuthzConfig::from_yaml(&yaml).unwrap();
        let engine = crate::DecisionEngine::from_config(&config).unwrap();
        let user = config.principals[0].clone();

        assert!(engine.has_permission(&user, "content:edit"));
        assert_eq!(engine.cache().stats().active_entries, 1);
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            AuthzConfig::from_yaml("roles: [this is: not valid"),
            Err(AuthzError::Yaml(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            AuthzConfig::from_file("/nonexistent/rbac.yaml"),
            Err(AuthzError::Io(_))
        ));
    }

    #[test]
    fn test_shipped_config() {
        let config = AuthzConfig::from_yaml(include_str!("../../config/rbac.yaml")).unwrap();
        let engine = crate::DecisionEngine::from_config(&config).unwrap();
        let principal = |id: &str| {
            config
                .principals
                .iter()
                .find(|p| p.id == id)
                .cloned()
                .unwrap()
        };

        let bob = principal("bob");
        let own_node = crate::Resource::new("n1", "node").created_by("bob");
        assert!(!engine.can_perform_action(&bob, "edit", "node", None));
        assert!(engine.can_perform_action(&bob, "edit", "node", Some(&own_node)));

        let alice = principal("alice");
        let secret = crate::Resource::new("n2", "node").encrypted();
        assert!(engine.can_perform_action(&alice, "view", "node", Some(&secret)));
        assert!(!engine.can_perform_action(&bob, "view", "node", Some(&secret)));

        assert!(engine.has_permission(&principal("carol"), "content:create"));
        assert!(engine.has_permission(&principal("root"), "user:manage"));
    }
}
