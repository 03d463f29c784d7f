//! Role-based authorization decision engine.
//!
//! This crate answers "can this principal perform this action on this
//! resource?". Roles form an inheritance hierarchy; permissions are granted
//! through roles or directly; content-aware checks honour ownership (`:own`)
//! and sensitivity (`:encrypted`) overrides.
//!
//! # Architecture Overview
//!
//! 1. **Caller** (UI gate, API middleware) resolves a [`Principal`] through
//!    its identity provider
//! 2. **DecisionEngine** consults the [`DecisionCache`]
//! 3. On a miss, the [`RoleResolver`] expands the principal's roles and the
//!    [`Catalog`] is consulted
//! 4. The decision is cached and returned
//! 5. The [`NotificationSink`] clears the cache whenever the identity
//!    collaborator reports a sign-in, sign-out, expiry or grants change
//!
//! # Failure Semantics
//!
//! The boolean gates (`has_permission`, `can_perform_action`, ...) never
//! return errors. Invalid input and resolution failures resolve to `false`
//! and are reported on the `decision:error` telemetry channel. The `try_*`
//! twins return the underlying [`AuthzError`] for callers that need to tell
//! a deny from a malformed query.
//!
//! # Example
//!
//! ```rust
//! use rbac_authz::{Catalog, DecisionEngine, Permission, Principal, Role};
//!
//! let catalog = Catalog::new(
//!     vec![
//!         Role::new("viewer", "Viewer", 25),
//!         Role::new("contributor", "Contributor", 50).inheriting("viewer"),
//!     ],
//!     vec![
//!         Permission::new("content:view", ["viewer", "contributor"]),
//!         Permission::new("content:edit", ["contributor"]),
//!     ],
//! )
//! .unwrap();
//! let engine = DecisionEngine::new(catalog);
//! let user = Principal::user("u1").with_role("contributor");
//!
//! assert!(engine.has_permission(&user, "content:edit"));
//! assert!(!engine.has_role(&user, "viewer"));
//! ```

pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod identity;
pub mod notify;
pub mod resolver;
pub mod types;

use std::collections::BTreeSet;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub use cache::{CacheKey, CacheStats, CachedDecision, Clock, DecisionCache, ManualClock, SystemClock};
pub use catalog::{Catalog, PermissionCatalog, RoleCatalog};
pub use config::AuthzConfig;
pub use error::{AuthzError, Result};
pub use identity::{IdentityProvider, StaticIdentityProvider};
pub use notify::{
    AccessDenied, DecisionError, DecisionEvent, IdentityEvent, NotificationSink, Query,
};
pub use resolver::RoleResolver;
pub use types::{Permission, Principal, Resource, Role};

use error::validate_id;

/// The action unauthenticated callers may perform on public resources.
pub const ANONYMOUS_ACTION: &str = "view";

/// Where a granted permission came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", content = "roles", rename_all = "camelCase")]
pub enum GrantSource {
    Admin,
    Explicit,
    Roles(BTreeSet<String>),
    None,
}

/// Detailed permission check result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionCheck {
    pub granted: bool,
    pub granted_by: GrantSource,
    pub denial_reason: Option<String>,
}

impl PermissionCheck {
    fn granted(by: GrantSource) -> Self {
        Self {
            granted: true,
            granted_by: by,
            denial_reason: None,
        }
    }

    fn denied(reason: impl Into<String>) -> Self {
        Self {
            granted: false,
            granted_by: GrantSource::None,
            denial_reason: Some(reason.into()),
        }
    }
}

/// The authorization decision engine.
///
/// Cheap to share behind an `Arc`; every method takes `&self`. The catalog
/// can be swapped wholesale with [`reload_catalog`](Self::reload_catalog),
/// which also flushes the cache.
pub struct DecisionEngine {
    catalog: ArcSwap<Catalog>,
    resolver: RoleResolver,
    cache: Arc<DecisionCache>,
    cache_enabled: bool,
    notifications: Arc<NotificationSink>,
}

impl DecisionEngine {
    /// Creates an engine with the default cache TTL and inheritance depth.
    pub fn new(catalog: Catalog) -> Self {
        Self::from_parts(
            catalog,
            RoleResolver::default(),
            Arc::new(DecisionCache::default()),
            true,
        )
    }

    pub fn from_config(config: &AuthzConfig) -> Result<Self> {
        Self::from_config_with_clock(config, Arc::new(SystemClock))
    }

    /// Like [`from_config`](Self::from_config) with an explicit cache clock.
    pub fn from_config_with_clock(config: &AuthzConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let catalog = config.build_catalog()?;
        Ok(Self::from_parts(
            catalog,
            RoleResolver::new(config.max_inheritance_depth),
            Arc::new(DecisionCache::with_clock(config.cache_ttl(), clock)),
            config.cache_enabled,
        ))
    }

    pub fn from_parts(
        catalog: Catalog,
        resolver: RoleResolver,
        cache: Arc<DecisionCache>,
        cache_enabled: bool,
    ) -> Self {
        info!(
            "Decision engine initialized (cache {}, ttl {:?}, max depth {})",
            if cache_enabled { "enabled" } else { "disabled" },
            cache.ttl(),
            resolver.max_depth()
        );
        let notifications = Arc::new(NotificationSink::new(Arc::clone(&cache)));
        Self {
            catalog: ArcSwap::from_pointee(catalog),
            resolver,
            cache,
            cache_enabled,
            notifications,
        }
    }

    /// Snapshot of the current catalog.
    pub fn catalog(&self) -> Arc<Catalog> {
        self.catalog.load_full()
    }

    /// Replaces the catalog and drops every cached decision.
    pub fn reload_catalog(&self, catalog: Catalog) {
        self.catalog.store(Arc::new(catalog));
        let cleared = self.cache.invalidate_all();
        info!("Catalog reloaded, {} cached decisions dropped", cleared);
    }

    pub fn cache(&self) -> &Arc<DecisionCache> {
        &self.cache
    }

    pub fn notifications(&self) -> &Arc<NotificationSink> {
        &self.notifications
    }

    pub fn list_roles(&self) -> Vec<Role> {
        self.catalog.load().list_roles()
    }

    pub fn list_permissions(&self) -> Vec<Permission> {
        self.catalog.load().list_permissions()
    }

    // ------------------------------------------------------------------
    // Permission checks
    // ------------------------------------------------------------------

    pub fn has_permission(&self, principal: &Principal, permission_id: &str) -> bool {
        let result = self.try_has_permission(principal, permission_id);
        self.gate(principal, Query::permission(permission_id), result, || {
            denial_reason(principal, &format!("missing permission '{}'", permission_id))
        })
    }

    pub fn try_has_permission(&self, principal: &Principal, permission_id: &str) -> Result<bool> {
        validate_id(permission_id, "permission id")?;
        self.permission_decision(principal, permission_id)
    }

    pub fn has_any_permission<S: AsRef<str>>(&self, principal: &Principal, ids: &[S]) -> bool {
        let result = self.try_has_any_permission(principal, ids);
        self.gate(principal, permissions_query(ids, false), result, || {
            denial_reason(principal, "none of the requested permissions granted")
        })
    }

    pub fn try_has_any_permission<S: AsRef<str>>(
        &self,
        principal: &Principal,
        ids: &[S],
    ) -> Result<bool> {
        validate_batch(ids, "permission")?;
        for id in ids {
            if self.permission_decision(principal, id.as_ref())? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn has_all_permissions<S: AsRef<str>>(&self, principal: &Principal, ids: &[S]) -> bool {
        let result = self.try_has_all_permissions(principal, ids);
        self.gate(principal, permissions_query(ids, true), result, || {
            denial_reason(principal, "not all requested permissions granted")
        })
    }

    pub fn try_has_all_permissions<S: AsRef<str>>(
        &self,
        principal: &Principal,
        ids: &[S],
    ) -> Result<bool> {
        validate_batch(ids, "permission")?;
        for id in ids {
            if !self.permission_decision(principal, id.as_ref())? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Explains how a permission is (or is not) granted. Never cached.
    pub fn check_permission_detailed(
        &self,
        principal: &Principal,
        permission_id: &str,
    ) -> Result<PermissionCheck> {
        validate_id(permission_id, "permission id")?;

        if !principal.is_authenticated() {
            return Ok(PermissionCheck::denied("principal is not authenticated"));
        }
        if principal.is_effective_admin() {
            return Ok(PermissionCheck::granted(GrantSource::Admin));
        }
        if principal
            .explicit_permissions
            .iter()
            .any(|p| p == permission_id)
        {
            return Ok(PermissionCheck::granted(GrantSource::Explicit));
        }

        let catalog = self.catalog.load();
        let Some(permission) = catalog.get_permission(permission_id) else {
            return Ok(PermissionCheck::denied(format!(
                "unknown permission '{}'",
                permission_id
            )));
        };

        let effective = self.resolver.expand(catalog.roles(), &principal.roles)?;
        let granting: BTreeSet<String> = permission
            .granting_roles
            .iter()
            .filter(|r| effective.contains(*r))
            .cloned()
            .collect();

        if granting.is_empty() {
            Ok(PermissionCheck::denied(format!(
                "missing permission '{}'",
                permission_id
            )))
        } else {
            Ok(PermissionCheck::granted(GrantSource::Roles(granting)))
        }
    }

    /// Checks a permission for whoever the provider reports as current.
    /// No current principal is evaluated as anonymous.
    pub fn has_permission_for(&self, provider: &dyn IdentityProvider, permission_id: &str) -> bool {
        let principal = provider
            .current_principal()
            .unwrap_or_else(Principal::anonymous);
        self.has_permission(&principal, permission_id)
    }

    // ------------------------------------------------------------------
    // Role checks (direct assignment only)
    // ------------------------------------------------------------------

    pub fn has_role(&self, principal: &Principal, role_id: &str) -> bool {
        let result = self.try_has_role(principal, role_id);
        self.gate(principal, Query::role(role_id), result, || {
            denial_reason(principal, &format!("role '{}' not assigned", role_id))
        })
    }

    pub fn try_has_role(&self, principal: &Principal, role_id: &str) -> Result<bool> {
        validate_id(role_id, "role id")?;
        Ok(self.role_decision(principal, role_id))
    }

    pub fn has_any_role<S: AsRef<str>>(&self, principal: &Principal, ids: &[S]) -> bool {
        let result = self.try_has_any_role(principal, ids);
        self.gate(principal, roles_query(ids, false), result, || {
            denial_reason(principal, "none of the requested roles assigned")
        })
    }

    pub fn try_has_any_role<S: AsRef<str>>(&self, principal: &Principal, ids: &[S]) -> Result<bool> {
        validate_batch(ids, "role")?;
        Ok(ids.iter().any(|id| self.role_decision(principal, id.as_ref())))
    }

    pub fn has_all_roles<S: AsRef<str>>(&self, principal: &Principal, ids: &[S]) -> bool {
        let result = self.try_has_all_roles(principal, ids);
        self.gate(principal, roles_query(ids, true), result, || {
            denial_reason(principal, "not all requested roles assigned")
        })
    }

    pub fn try_has_all_roles<S: AsRef<str>>(&self, principal: &Principal, ids: &[S]) -> Result<bool> {
        validate_batch(ids, "role")?;
        Ok(ids.iter().all(|id| self.role_decision(principal, id.as_ref())))
    }

    // ------------------------------------------------------------------
    // Content-aware checks
    // ------------------------------------------------------------------

    /// Checks `{resource_type}:{action}` and applies the resource overrides.
    ///
    /// For an owned resource a registered `{type}:{action}:own` permission
    /// replaces the base decision; for an encrypted resource a registered
    /// `{type}:{action}:encrypted` permission then replaces whatever the
    /// decision is at that point. Overrides replace, they never combine, so
    /// an override can both grant and revoke.
    pub fn can_perform_action(
        &self,
        principal: &Principal,
        action: &str,
        resource_type: &str,
        resource: Option<&Resource>,
    ) -> bool {
        let result = self.try_can_perform_action(principal, action, resource_type, resource);
        let query = Query::Action {
            action: action.to_string(),
            resource_type: resource_type.to_string(),
        };
        self.gate(principal, query, result, || {
            denial_reason(
                principal,
                &format!("action '{}' on '{}' not permitted", action, resource_type),
            )
        })
    }

    pub fn try_can_perform_action(
        &self,
        principal: &Principal,
        action: &str,
        resource_type: &str,
        resource: Option<&Resource>,
    ) -> Result<bool> {
        validate_id(action, "action")?;
        validate_id(resource_type, "resource type")?;

        if !principal.is_authenticated() {
            return Ok(action == ANONYMOUS_ACTION && resource.map_or(true, |r| !r.is_private));
        }
        if principal.is_effective_admin() {
            return Ok(true);
        }

        let base = format!("{}:{}", resource_type, action);
        let mut allowed = self.permission_decision(principal, &base)?;

        let Some(resource) = resource else {
            return Ok(allowed);
        };

        let catalog = self.catalog.load();

        if resource.is_owned_by(&principal.id) {
            let own = format!("{}:own", base);
            if catalog.permissions().contains(&own) {
                allowed = self.permission_decision(principal, &own)?;
                debug!("Ownership override {} -> {}", own, allowed);
            }
        }

        if resource.is_encrypted {
            let encrypted = format!("{}:encrypted", base);
            if catalog.permissions().contains(&encrypted) {
                allowed = self.permission_decision(principal, &encrypted)?;
                debug!("Sensitivity override {} -> {}", encrypted, allowed);
            }
        }

        Ok(allowed)
    }

    // ------------------------------------------------------------------
    // Effective permissions
    // ------------------------------------------------------------------

    /// Every permission the principal holds; empty on error.
    pub fn get_effective_permissions(&self, principal: &Principal) -> BTreeSet<String> {
        match self.try_get_effective_permissions(principal) {
            Ok(permissions) => permissions,
            Err(e) => {
                self.report_error(Query::EffectivePermissions, &e);
                BTreeSet::new()
            }
        }
    }

    pub fn try_get_effective_permissions(&self, principal: &Principal) -> Result<BTreeSet<String>> {
        if !principal.is_authenticated() {
            return Ok(BTreeSet::new());
        }

        let generation = self.cache.generation();
        let key = CacheKey::all_permissions(&principal.id);
        if let Some(CachedDecision::Permissions(cached)) = self.cached(&key) {
            return Ok(cached);
        }

        let catalog = self.catalog.load();
        let mut permissions: BTreeSet<String> =
            principal.explicit_permissions.iter().cloned().collect();

        if principal.is_effective_admin() {
            permissions.extend(catalog.permissions().ids().map(str::to_string));
        } else {
            let effective = self.resolver.expand(catalog.roles(), &principal.roles)?;
            permissions.extend(catalog.permissions().granted_by(&effective));
        }

        self.store(key, CachedDecision::Permissions(permissions.clone()), generation);
        Ok(permissions)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// `has_permission` without validation or telemetry.
    fn permission_decision(&self, principal: &Principal, permission_id: &str) -> Result<bool> {
        if !principal.is_authenticated() {
            return Ok(false);
        }
        if principal.is_effective_admin() {
            return Ok(true);
        }

        // Read before the catalog so a concurrent reload can't be outlived.
        let generation = self.cache.generation();
        let key = CacheKey::permission(&principal.id, permission_id);
        if let Some(CachedDecision::Allowed(allowed)) = self.cached(&key) {
            return Ok(allowed);
        }

        let check = self.check_permission_detailed(principal, permission_id)?;
        debug!(
            "Permission {} for {}: {:?}",
            permission_id, principal.id, check.granted_by
        );
        self.store(key, CachedDecision::Allowed(check.granted), generation);
        Ok(check.granted)
    }

    fn role_decision(&self, principal: &Principal, role_id: &str) -> bool {
        if !principal.is_authenticated() {
            return false;
        }
        if principal.is_effective_admin() {
            return true;
        }

        let generation = self.cache.generation();
        let key = CacheKey::role(&principal.id, role_id);
        if let Some(CachedDecision::Allowed(assigned)) = self.cached(&key) {
            return assigned;
        }

        let assigned = principal.roles.iter().any(|r| r == role_id);
        self.store(key, CachedDecision::Allowed(assigned), generation);
        assigned
    }

    fn cached(&self, key: &CacheKey) -> Option<CachedDecision> {
        if self.cache_enabled {
            self.cache.get(key)
        } else {
            None
        }
    }

    /// Caches a decision unless an invalidation ran since `generation`.
    fn store(&self, key: CacheKey, value: CachedDecision, generation: u64) {
        if self.cache_enabled {
            self.cache.put_if_current(key, value, generation);
        }
    }

    /// Turns a fallible check into the fail-closed boolean, emitting telemetry.
    fn gate(
        &self,
        principal: &Principal,
        query: Query,
        result: Result<bool>,
        reason: impl FnOnce() -> String,
    ) -> bool {
        match result {
            Ok(true) => true,
            Ok(false) => {
                self.notifications
                    .emit(&DecisionEvent::Denied(AccessDenied {
                        principal_id: principal.id.clone(),
                        query,
                        reason: reason(),
                    }));
                false
            }
            Err(e) => {
                self.report_error(query, &e);
                false
            }
        }
    }

    fn report_error(&self, query: Query, error: &AuthzError) {
        self.notifications.emit(&DecisionEvent::Error(DecisionError {
            query,
            kind: error.kind().to_string(),
            error: error.to_string(),
        }));
    }
}

impl std::fmt::Debug for DecisionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let catalog = self.catalog.load();
        f.debug_struct("DecisionEngine")
            .field("roles", &catalog.roles().len())
            .field("permissions", &catalog.permissions().len())
            .field("resolver", &self.resolver)
            .field("cache_enabled", &self.cache_enabled)
            .finish()
    }
}

fn denial_reason(principal: &Principal, otherwise: &str) -> String {
    if principal.is_authenticated() {
        otherwise.to_string()
    } else {
        "principal is not authenticated".to_string()
    }
}

fn validate_batch<S: AsRef<str>>(ids: &[S], what: &str) -> Result<()> {
    if ids.is_empty() {
        return Err(AuthzError::Validation(format!(
            "{} list must not be empty",
            what
        )));
    }
    for id in ids {
        validate_id(id.as_ref(), &format!("{} id", what))?;
    }
    Ok(())
}

fn permissions_query<S: AsRef<str>>(ids: &[S], require_all: bool) -> Query {
    Query::Permissions {
        ids: ids.iter().map(|s| s.as_ref().to_string()).collect(),
        require_all,
    }
}

fn roles_query<S: AsRef<str>>(ids: &[S], require_all: bool) -> Query {
    Query::Roles {
        ids: ids.iter().map(|s| s.as_ref().to_string()).collect(),
        require_all,
    }
}
