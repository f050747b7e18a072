//! Access gate for the cache and tracker stores.
//!
//! Every operation in this crate, read or write, passes through
//! [`AccessGate::authorize`] before touching a store. The default gate
//! implements the capability matrix:
//!
//! | role            | read | insert / update / delete / rebuild |
//! |-----------------|------|------------------------------------|
//! | `Public`        | yes  | no                                 |
//! | `Authenticated` | yes  | no                                 |
//! | `Service`       | yes  | yes                                |

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AuthorizationError;

/// Caller class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Anonymous, public-read caller.
    Public,
    /// Signed-in end user.
    Authenticated,
    /// Privileged writer (scheduled jobs, ingestion workers).
    Service,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Public => "public",
            Self::Authenticated => "authenticated",
            Self::Service => "service",
        };
        f.write_str(s)
    }
}

/// What the caller is trying to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Read,
    Insert,
    Update,
    Delete,
    Rebuild,
}

impl Action {
    /// Returns true for every action that changes state.
    #[must_use]
    pub const fn is_mutation(self) -> bool {
        !matches!(self, Self::Read)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Read => "read",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Rebuild => "rebuild",
        };
        f.write_str(s)
    }
}

/// Store the action targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    AggregateCache,
    Completeness,
    AnalyticsCache,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AggregateCache => "aggregate cache",
            Self::Completeness => "completeness tracker",
            Self::AnalyticsCache => "analytics cache",
        };
        f.write_str(s)
    }
}

/// Identity presented with every call.
///
/// Built by the embedding service from its own authentication, never
/// deserialized from request or job payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Caller {
    /// Role used for capability checks.
    pub role: Role,
    /// Optional principal name, used only for logging.
    pub principal: Option<String>,
}

impl Caller {
    /// Anonymous public caller.
    #[must_use]
    pub const fn public() -> Self {
        Self {
            role: Role::Public,
            principal: None,
        }
    }

    /// Signed-in caller.
    #[must_use]
    pub fn authenticated(principal: impl Into<String>) -> Self {
        Self {
            role: Role::Authenticated,
            principal: Some(principal.into()),
        }
    }

    /// Privileged writer.
    #[must_use]
    pub fn service(principal: impl Into<String>) -> Self {
        Self {
            role: Role::Service,
            principal: Some(principal.into()),
        }
    }

    /// Returns true for the privileged writer role.
    #[must_use]
    pub const fn is_privileged(&self) -> bool {
        matches!(self.role, Role::Service)
    }
}

/// Policy consulted by every store operation.
pub trait AccessGate: Send + Sync {
    /// Returns `Ok(())` if `caller` may perform `action` on `resource`.
    ///
    /// # Errors
    ///
    /// Returns `AuthorizationError` when the policy denies the request.
    fn authorize(
        &self,
        caller: &Caller,
        resource: Resource,
        action: Action,
    ) -> Result<(), AuthorizationError>;
}

/// Default capability matrix: everyone reads, only `Service` mutates.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultAccessGate;

impl DefaultAccessGate {
    /// Create the default gate.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    const fn allows(role: Role, action: Action) -> bool {
        match role {
            Role::Service => true,
            Role::Public | Role::Authenticated => !action.is_mutation(),
        }
    }
}

impl AccessGate for DefaultAccessGate {
    fn authorize(
        &self,
        caller: &Caller,
        resource: Resource,
        action: Action,
    ) -> Result<(), AuthorizationError> {
        if Self::allows(caller.role, action) {
            return Ok(());
        }
        tracing::debug!(
            role = %caller.role,
            principal = caller.principal.as_deref().unwrap_or("-"),
            %action,
            %resource,
            "access denied"
        );
        Err(AuthorizationError {
            role: caller.role,
            action,
            resource,
        })
    }
}
