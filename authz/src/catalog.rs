//! Role and permission catalogs.
//!
//! Both catalogs are built once from static configuration and are read-only
//! afterwards. Lookups return `Option` and never fail, since callers routinely
//! probe for ids that may not exist (e.g. `node:edit:own`).

use std::collections::{BTreeMap, BTreeSet, HashSet};

use tracing::{debug, info, warn};

use crate::error::{validate_id, AuthzError, Result};
use crate::types::{Permission, Role};

/// Role definitions keyed by id.
#[derive(Debug, Clone, Default)]
pub struct RoleCatalog {
    roles: BTreeMap<String, Role>,
}

impl RoleCatalog {
    /// Builds the catalog, rejecting duplicate or malformed ids.
    ///
    /// Dangling `inherits` references are checked by [`Catalog::new`], which
    /// sees both catalogs.
    pub fn new(roles: impl IntoIterator<Item = Role>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for role in roles {
            validate_id(&role.id, "role id").map_err(|e| AuthzError::Config(e.to_string()))?;
            if map.contains_key(&role.id) {
                return Err(AuthzError::Config(format!("duplicate role '{}'", role.id)));
            }
            map.insert(role.id.clone(), role);
        }
        Ok(Self { roles: map })
    }

    pub fn get_role(&self, id: &str) -> Option<&Role> {
        self.roles.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.roles.contains_key(id)
    }

    /// All roles, most privileged first, ties broken by id.
    pub fn list_roles(&self) -> Vec<Role> {
        let mut roles: Vec<Role> = self.roles.values().cloned().collect();
        roles.sort_by(|a, b| b.level.cmp(&a.level).then_with(|| a.id.cmp(&b.id)));
        roles
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Returns one inheritance cycle as a path `[a, b, .., a]`, if any exists.
    ///
    /// Iterative three-color DFS over the `inherits` edges. Edges to unknown
    /// roles are skipped.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            InProgress,
            Done,
        }

        let mut marks: BTreeMap<&str, Mark> = BTreeMap::new();

        for start in self.roles.keys() {
            if marks.contains_key(start.as_str()) {
                continue;
            }

            // (role id, index of the next edge to visit)
            let mut stack: Vec<(&str, usize)> = vec![(start.as_str(), 0)];
            marks.insert(start.as_str(), Mark::InProgress);

            while let Some(frame) = stack.last_mut() {
                let (id, next) = *frame;
                let edges = self
                    .roles
                    .get(id)
                    .map(|r| r.inherits.as_slice())
                    .unwrap_or(&[]);

                if next >= edges.len() {
                    marks.insert(id, Mark::Done);
                    stack.pop();
                    continue;
                }
                frame.1 += 1;

                let child = edges[next].as_str();
                if !self.roles.contains_key(child) {
                    continue;
                }
                match marks.get(child) {
                    Some(Mark::InProgress) => {
                        let pos = stack.iter().position(|(r, _)| *r == child).unwrap_or(0);
                        let mut path: Vec<String> =
                            stack[pos..].iter().map(|(r, _)| r.to_string()).collect();
                        path.push(child.to_string());
                        return Some(path);
                    }
                    Some(Mark::Done) => {}
                    None => {
                        marks.insert(child, Mark::InProgress);
                        stack.push((child, 0));
                    }
                }
            }
        }

        None
    }
}

/// Permission definitions keyed by id.
#[derive(Debug, Clone, Default)]
pub struct PermissionCatalog {
    permissions: BTreeMap<String, Permission>,
}

impl PermissionCatalog {
    pub fn new(permissions: impl IntoIterator<Item = Permission>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for permission in permissions {
            validate_id(&permission.id, "permission id")
                .map_err(|e| AuthzError::Config(e.to_string()))?;
            if map.contains_key(&permission.id) {
                return Err(AuthzError::Config(format!(
                    "duplicate permission '{}'",
                    permission.id
                )));
            }
            map.insert(permission.id.clone(), permission);
        }
        Ok(Self { permissions: map })
    }

    pub fn get_permission(&self, id: &str) -> Option<&Permission> {
        self.permissions.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.permissions.contains_key(id)
    }

    /// All permissions ordered by id.
    pub fn list_permissions(&self) -> Vec<Permission> {
        self.permissions.values().cloned().collect()
    }

    /// Ids of every permission granted by at least one of `roles`.
    pub fn granted_by(&self, roles: &BTreeSet<String>) -> BTreeSet<String> {
        self.permissions
            .values()
            .filter(|p| p.granting_roles.iter().any(|r| roles.contains(r)))
            .map(|p| p.id.clone())
            .collect()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.permissions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.permissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }
}

/// The pair of catalogs the engine evaluates against.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    roles: RoleCatalog,
    permissions: PermissionCatalog,
}

impl Catalog {
    /// Builds and cross-validates both catalogs.
    ///
    /// Every role referenced from `inherits` or `granting_roles` must be
    /// defined. Inheritance cycles are reported with a warning but accepted;
    /// the resolver's visited set keeps traversal finite.
    pub fn new(
        roles: impl IntoIterator<Item = Role>,
        permissions: impl IntoIterator<Item = Permission>,
    ) -> Result<Self> {
        let roles = RoleCatalog::new(roles)?;
        let permissions = PermissionCatalog::new(permissions)?;

        for role in roles.roles.values() {
            let mut seen = HashSet::new();
            for parent in &role.inherits {
                if !roles.contains(parent) {
                    return Err(AuthzError::Config(format!(
                        "role '{}' inherits undefined role '{}'",
                        role.id, parent
                    )));
                }
                if !seen.insert(parent.as_str()) {
                    debug!("Role '{}' lists '{}' more than once", role.id, parent);
                }
            }
        }

        for permission in permissions.permissions.values() {
            if let Some(missing) = permission
                .granting_roles
                .iter()
                .find(|r| !roles.contains(r))
            {
                return Err(AuthzError::Config(format!(
                    "permission '{}' is granted by undefined role '{}'",
                    permission.id, missing
                )));
            }
        }

        if let Some(cycle) = roles.find_cycle() {
            warn!("Role inheritance cycle detected: {}", cycle.join(" -> "));
        }

        info!(
            "Catalog built with {} roles and {} permissions",
            roles.len(),
            permissions.len()
        );

        Ok(Self { roles, permissions })
    }

    pub fn roles(&self) -> &RoleCatalog {
        &self.roles
    }

    pub fn permissions(&self) -> &PermissionCatalog {
        &self.permissions
    }

    pub fn get_role(&self, id: &str) -> Option<&Role> {
        self.roles.get_role(id)
    }

    pub fn get_permission(&self, id: &str) -> Option<&Permission> {
        self.permissions.get_permission(id)
    }

    pub fn list_roles(&self) -> Vec<Role> {
        self.roles.list_roles()
    }

    pub fn list_permissions(&self) -> Vec<Permission> {
        self.permissions.list_permissions()
    }
}
