//! The seam to the external identity collaborator.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::types::Principal;

/// Supplies principal records. Implemented by the host's session layer.
pub trait IdentityProvider: Send + Sync {
    /// The principal bound to the current request or session, if any.
    fn current_principal(&self) -> Option<Principal>;

    fn principal(&self, id: &str) -> Option<Principal>;
}

/// In-memory provider, used by the CLI and in tests.
#[derive(Debug, Default)]
pub struct StaticIdentityProvider {
    principals: HashMap<String, Principal>,
    current: RwLock<Option<String>>,
}

impl StaticIdentityProvider {
    pub fn new(principals: impl IntoIterator<Item = Principal>) -> Self {
        Self {
            principals: principals.into_iter().map(|p| (p.id.clone(), p)).collect(),
            current: RwLock::new(None),
        }
    }

    /// Binds the current principal; `None` signs out.
    pub fn set_current(&self, id: Option<&str>) {
        *self.current.write() = id.map(str::to_string);
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.principals.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

impl IdentityProvider for StaticIdentityProvider {
    fn current_principal(&self) -> Option<Principal> {
        let current = self.current.read();
        current.as_deref().and_then(|id| self.principal(id))
    }

    fn principal(&self, id: &str) -> Option<Principal> {
        self.principals.get(id).cloned()
    }
}
