//! Identity lifecycle signals and decision telemetry.
//!
//! The sink sits between the host's pub/sub channel and the decision cache:
//! any identity signal clears the whole cache. It also fans denied/error
//! decisions out to registered audit callbacks.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::DecisionCache;

pub const TOPIC_SIGNED_IN: &str = "identity:signedIn";
pub const TOPIC_SIGNED_OUT: &str = "identity:signedOut";
pub const TOPIC_SESSION_EXPIRED: &str = "identity:sessionExpired";
pub const TOPIC_GRANTS_CHANGED: &str = "identity:grantsChanged";
pub const TOPIC_DECISION_DENIED: &str = "decision:denied";
pub const TOPIC_DECISION_ERROR: &str = "decision:error";

/// A lifecycle signal from the external identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum IdentityEvent {
    SignedIn { principal_id: String },
    SignedOut { principal_id: String },
    SessionExpired { principal_id: String },
    GrantsChanged { principal_id: String },
}

impl IdentityEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            Self::SignedIn { .. } => TOPIC_SIGNED_IN,
            Self::SignedOut { .. } => TOPIC_SIGNED_OUT,
            Self::SessionExpired { .. } => TOPIC_SESSION_EXPIRED,
            Self::GrantsChanged { .. } => TOPIC_GRANTS_CHANGED,
        }
    }

    /// Parses the string form used on a generic pub/sub bus.
    pub fn from_topic(topic: &str, principal_id: impl Into<String>) -> Option<Self> {
        let principal_id = principal_id.into();
        match topic {
            TOPIC_SIGNED_IN => Some(Self::SignedIn { principal_id }),
            TOPIC_SIGNED_OUT => Some(Self::SignedOut { principal_id }),
            TOPIC_SESSION_EXPIRED => Some(Self::SessionExpired { principal_id }),
            TOPIC_GRANTS_CHANGED => Some(Self::GrantsChanged { principal_id }),
            _ => None,
        }
    }

    pub fn principal_id(&self) -> &str {
        match self {
            Self::SignedIn { principal_id }
            | Self::SignedOut { principal_id }
            | Self::SessionExpired { principal_id }
            | Self::GrantsChanged { principal_id } => principal_id,
        }
    }
}

/// The question a gate was asked, attached to telemetry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Query {
    Permissions { ids: Vec<String>, require_all: bool },
    Roles { ids: Vec<String>, require_all: bool },
    Action { action: String, resource_type: String },
    EffectivePermissions,
}

impl Query {
    pub fn permission(id: &str) -> Self {
        Self::Permissions {
            ids: vec![id.to_string()],
            require_all: true,
        }
    }

    pub fn role(id: &str) -> Self {
        Self::Roles {
            ids: vec![id.to_string()],
            require_all: true,
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = |all: bool| if all { "all" } else { "any" };
        match self {
            Self::Permissions { ids, require_all } if ids.len() == 1 && *require_all => {
                write!(f, "permission:{}", ids[0])
            }
            Self::Permissions { ids, require_all } => {
                write!(f, "permissions[{}]:{}", mode(*require_all), ids.join(","))
            }
            Self::Roles { ids, require_all } if ids.len() == 1 && *require_all => {
                write!(f, "role:{}", ids[0])
            }
            Self::Roles { ids, require_all } => {
                write!(f, "roles[{}]:{}", mode(*require_all), ids.join(","))
            }
            Self::Action {
                action,
                resource_type,
            } => write!(f, "action:{}:{}", resource_type, action),
            Self::EffectivePermissions => write!(f, "effectivePermissions"),
        }
    }
}

/// Context delivered to access-denied callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDenied {
    pub principal_id: String,
    pub query: Query,
    pub reason: String,
}

/// Context delivered to decision-error callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionError {
    pub query: Query,
    /// Error classification, see [`AuthzError::kind`](crate::AuthzError::kind)
    pub kind: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DecisionEvent {
    Denied(AccessDenied),
    Error(DecisionError),
}

impl DecisionEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            Self::Denied(_) => TOPIC_DECISION_DENIED,
            Self::Error(_) => TOPIC_DECISION_ERROR,
        }
    }
}

type DeniedCallback = Arc<dyn Fn(&AccessDenied) + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(&DecisionError) + Send + Sync>;

/// Receives identity signals and dispatches decision telemetry.
pub struct NotificationSink {
    cache: Arc<DecisionCache>,
    denied_callbacks: RwLock<Vec<DeniedCallback>>,
    error_callbacks: RwLock<Vec<ErrorCallback>>,
}

impl NotificationSink {
    pub fn new(cache: Arc<DecisionCache>) -> Self {
        Self {
            cache,
            denied_callbacks: RwLock::new(Vec::new()),
            error_callbacks: RwLock::new(Vec::new()),
        }
    }

    /// Clears every cached decision, whichever principal the signal names.
    pub fn handle(&self, event: &IdentityEvent) {
        let cleared = self.cache.invalidate_all();
        info!(
            "Identity signal {} for {}: cleared {} cached decisions",
            event.topic(),
            event.principal_id(),
            cleared
        );
    }

    /// Accepts the string topic form. Unknown topics are ignored.
    pub fn handle_topic(&self, topic: &str, principal_id: &str) -> bool {
        match IdentityEvent::from_topic(topic, principal_id) {
            Some(event) => {
                self.handle(&event);
                true
            }
            None => {
                debug!("Ignoring unrelated topic {}", topic);
                false
            }
        }
    }

    /// Follows a host broadcast channel until it closes.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_listener(
        self: &Arc<Self>,
        mut receiver: broadcast::Receiver<IdentityEvent>,
    ) -> JoinHandle<()> {
        let sink = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => sink.handle(&event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(
                            "Identity listener lagged by {} signals, clearing decision cache",
                            skipped
                        );
                        sink.cache.invalidate_all();
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Identity signal channel closed, listener exiting");
                        break;
                    }
                }
            }
        })
    }

    pub fn on_access_denied<F>(&self, callback: F)
    where
        F: Fn(&AccessDenied) + Send + Sync + 'static,
    {
        self.denied_callbacks.write().push(Arc::new(callback));
    }

    pub fn on_decision_error<F>(&self, callback: F)
    where
        F: Fn(&DecisionError) + Send + Sync + 'static,
    {
        self.error_callbacks.write().push(Arc::new(callback));
    }

    /// Dispatches to the registered callbacks. No lock is held while a
    /// callback runs, so callbacks may register callbacks or run gates.
    pub fn emit(&self, event: &DecisionEvent) {
        match event {
            DecisionEvent::Denied(denied) => {
                warn!(
                    principal = %denied.principal_id,
                    query = %denied.query,
                    "Access denied: {}",
                    denied.reason
                );
                let callbacks = self.denied_callbacks.read().clone();
                for callback in callbacks {
                    callback(denied);
                }
            }
            DecisionEvent::Error(error) => {
                warn!(
                    query = %error.query,
                    kind = %error.kind,
                    "Authorization error: {}",
                    error.error
                );
                let callbacks = self.error_callbacks.read().clone();
                for callback in callbacks {
                    callback(error);
                }
            }
        }
    }
}

impl fmt::Debug for NotificationSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationSink")
            .field("denied_callbacks", &self.denied_callbacks.read().len())
            .field("error_callbacks", &self.error_callbacks.read().len())
            .finish()
    }
}
