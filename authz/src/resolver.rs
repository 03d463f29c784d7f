//! Transitive expansion of role inheritance.

use std::collections::{BTreeSet, VecDeque};

use tracing::debug;

use crate::catalog::RoleCatalog;
use crate::error::{AuthzError, Result};

/// Default upper bound on inheritance depth.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Expands directly assigned roles into their effective role set.
///
/// Breadth-first over `inherits` with a visited set, so every role and edge is
/// touched at most once and configuration cycles terminate.
#[derive(Debug, Clone, Copy)]
pub struct RoleResolver {
    max_depth: usize,
}

impl RoleResolver {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Returns `direct_roles` plus every role reachable through inheritance.
    ///
    /// Direct roles unknown to the catalog are kept (they are still assigned)
    /// but contribute no further edges. Fails with
    /// [`AuthzError::Resolution`] if a role sits deeper than `max_depth`
    /// below the principal's direct assignments.
    pub fn expand<S: AsRef<str>>(
        &self,
        catalog: &RoleCatalog,
        direct_roles: &[S],
    ) -> Result<BTreeSet<String>> {
        let mut visited: BTreeSet<String> = BTreeSet::new();
        let mut queue: VecDeque<(&str, usize)> = VecDeque::new();

        for role in direct_roles {
            let role = role.as_ref();
            if visited.insert(role.to_string()) {
                queue.push_back((role, 0));
            }
        }

        while let Some((id, depth)) = queue.pop_front() {
            let Some(role) = catalog.get_role(id) else {
                continue;
            };

            for parent in &role.inherits {
                if visited.contains(parent) {
                    continue;
                }
                if depth + 1 > self.max_depth {
                    return Err(AuthzError::Resolution(format!(
                        "inheritance from '{}' exceeds maximum depth {}",
                        id, self.max_depth
                    )));
                }
                visited.insert(parent.clone());
                queue.push_back((parent.as_str(), depth + 1));
            }
        }

        debug!(
            "Expanded {} direct roles into {} effective roles",
            direct_roles.len(),
            visited.len()
        );
        Ok(visited)
    }
}

impl Default for RoleResolver {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    fn set(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn chain() -> RoleCatalog {
        RoleCatalog::new(vec![
            Role::new("A", "A", 3).inheriting("B"),
            Role::new("B", "B", 2).inheriting("C"),
            Role::new("C", "C", 1),
        ])
        .unwrap()
    }

    #[test]
    fn test_transitive_closure() {
        let resolver = RoleResolver::default();
        assert_eq!(resolver.expand(&chain(), &["A"]).unwrap(), set(&["A", "B", "C"]));
        assert_eq!(resolver.expand(&chain(), &["B"]).unwrap(), set(&["B", "C"]));
        assert_eq!(resolver.expand(&chain(), &["C"]).unwrap(), set(&["C"]));
    }

    #[test]
    fn test_cycle_terminates() {
        let catalog = RoleCatalog::new(vec![
            Role::new("A", "A", 1).inheriting("B"),
            Role::new("B", "B", 1).inheriting("A"),
        ])
        .unwrap();
        let resolver = RoleResolver::default();
        assert_eq!(resolver.expand(&catalog, &["A"]).unwrap(), set(&["A", "B"]));
    }

    #[test]
    fn test_order_independent() {
        let catalog = RoleCatalog::new(vec![
            Role::new("admin", "Admin", 100).inheriting("editor"),
            Role::new("editor", "Editor", 75).inheriting("viewer"),
            Role::new("auditor", "Auditor", 60).inheriting("viewer"),
            Role::new("viewer", "Viewer", 25),
        ])
        .unwrap();
        let resolver = RoleResolver::default();
        let a = resolver.expand(&catalog, &["auditor", "editor"]).unwrap();
        let b = resolver
            .expand(&catalog, &["editor", "auditor", "editor"])
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a, set(&["auditor", "editor", "viewer"]));
    }

    #[test]
    fn test_diamond_is_deduplicated() {
        let catalog = RoleCatalog::new(vec![
            Role::new("top", "Top", 3).inheriting("left").inheriting("right"),
            Role::new("left", "Left", 2).inheriting("base"),
            Role::new("right", "Right", 2).inheriting("base"),
            Role::new("base", "Base", 1),
        ])
        .unwrap();
        let expanded = RoleResolver::default().expand(&catalog, &["top"]).unwrap();
        assert_eq!(expanded, set(&["top", "left", "right", "base"]));
    }

    #[test]
    fn test_unknown_direct_role_is_kept() {
        let expanded = RoleResolver::default()
            .expand(&chain(), &["ghost", "C"])
            .unwrap();
        assert_eq!(expanded, set(&["ghost", "C"]));
    }

    #[test]
    fn test_empty_input() {
        let expanded = RoleResolver::default()
            .expand::<&str>(&chain(), &[])
            .unwrap();
        assert!(expanded.is_empty());
    }

    #[test]
    fn test_depth_limit() {
        let resolver = RoleResolver::new(1);
        assert!(resolver.expand(&chain(), &["B"]).is_ok());
        let err = resolver.expand(&chain(), &["A"]).unwrap_err();
        assert!(matches!(err, AuthzError::Resolution(_)));
    }

    #[test]
    fn test_depth_counts_from_nearest_assignment() {
        // C is two hops from A but only one from the directly assigned B.
        let resolver = RoleResolver::new(1);
        let expanded = resolver.expand(&chain(), &["B", "A"]).unwrap();
        assert_eq!(expanded, set(&["A", "B", "C"]));
    }
}
