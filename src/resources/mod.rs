//! Resource adapters and their lifecycle.
//!
//! Each adapter maps create/read/update/delete of one resource type onto IAM
//! actions. [`apply`] drives the lifecycle the way an infrastructure host
//! would: absent → created → read back → updated in place or replaced →
//! deleted.

pub mod oidc_provider;
pub mod role;
pub mod role_policy;

use std::fmt;

use async_trait::async_trait;
use log::{info, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::context::Context;
use crate::http::retry_on_concurrent_modification;
use crate::iam::{IAM_SERVICE, IamClient, Params, api_error, is_not_found};

pub use oidc_provider::{OidcProviderResource, OidcProviderState};
pub use role::{RoleResource, RoleState};
pub use role_policy::{RolePolicyResource, RolePolicyState};

/// What applying `planned` over `prior` requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    NoChange,
    Update,
    /// Destroy the existing object and create a new one.
    Replace,
}

/// A user-facing error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub summary: String,
    pub detail: String,
}

impl Diagnostic {
    pub fn new(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            detail: detail.into(),
        }
    }

    /// Describes `err`, including the API code, message and HTTP status when
    /// the failure came from the API.
    pub fn from_error(summary: impl Into<String>, err: &anyhow::Error) -> Self {
        let detail = match api_error(err) {
            Some(api) if api.message.is_empty() => {
                format!("{} returned {} (HTTP {})", api.action, api.code, api.status_code)
            }
            Some(api) => format!(
                "{} returned {} (HTTP {}): {}",
                api.action, api.code, api.status_code, api.message
            ),
            None => format!("{:#}", err),
        };
        Self::new(summary, detail)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.summary, self.detail)
    }
}

impl std::error::Error for Diagnostic {}

#[async_trait]
pub trait Resource: Send + Sync {
    type State: Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync;

    fn type_name(&self) -> &'static str;

    /// Creates the object and returns its state as read back from the server.
    async fn create(&self, ctx: &Context, planned: &Self::State) -> Result<Self::State, Diagnostic>;

    /// Refreshes `state`. `None` means the object is gone and should be
    /// dropped from state.
    async fn read(&self, ctx: &Context, state: &Self::State)
    -> Result<Option<Self::State>, Diagnostic>;

    fn plan(&self, prior: &Self::State, planned: &Self::State) -> Plan;

    async fn update(
        &self,
        ctx: &Context,
        prior: &Self::State,
        planned: &Self::State,
    ) -> Result<Self::State, Diagnostic>;

    /// Deletes the object. Deleting something already gone succeeds.
    async fn delete(&self, ctx: &Context, state: &Self::State) -> Result<(), Diagnostic>;

    /// Looks up an existing object by its import id.
    async fn import(&self, ctx: &Context, id: &str) -> Result<Option<Self::State>, Diagnostic>;
}

/// Moves an object from `prior` to `planned`. `None` on either side means
/// absent. Returns the resulting state.
#[tracing::instrument(skip(resource, ctx, prior, planned), fields(resource = resource.type_name()))]
pub async fn apply<R: Resource>(
    resource: &R,
    ctx: &Context,
    prior: Option<&R::State>,
    planned: Option<&R::State>,
) -> Result<Option<R::State>, Diagnostic> {
    match (prior, planned) {
        (None, None) => Ok(None),
        (None, Some(planned)) => resource.create(ctx, planned).await.map(Some),
        (Some(prior), None) => {
            resource.delete(ctx, prior).await?;
            Ok(None)
        }
        (Some(prior), Some(planned)) => match resource.plan(prior, planned) {
            Plan::NoChange => Ok(Some(prior.clone())),
            Plan::Update => resource.update(ctx, prior, planned).await.map(Some),
            Plan::Replace => {
                info!("{} must be replaced", resource.type_name());
                resource.delete(ctx, prior).await?;
                resource.create(ctx, planned).await.map(Some)
            }
        },
    }
}

/// Read-path handling: a missing object is removed from state, anything else
/// is surfaced.
pub(crate) fn found_or_removed<T>(
    type_name: &str,
    id: &str,
    result: anyhow::Result<T>,
) -> Result<Option<T>, Diagnostic> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if is_not_found(&err) => {
            warn!("{} {} no longer exists, removing it from state", type_name, id);
            Ok(None)
        }
        Err(err) => Err(Diagnostic::from_error(
            format!("Failed to read {} {}", type_name, id),
            &err,
        )),
    }
}

/// Delete-path handling: a missing object counts as deleted.
pub(crate) fn deleted_or_gone(
    type_name: &str,
    id: &str,
    result: anyhow::Result<()>,
) -> Result<(), Diagnostic> {
    match result {
        Ok(()) => Ok(()),
        Err(err) if is_not_found(&err) => {
            info!("{} {} was already deleted", type_name, id);
            Ok(())
        }
        Err(err) => Err(Diagnostic::from_error(
            format!("Failed to delete {} {}", type_name, id),
            &err,
        )),
    }
}

/// Sends a mutation, retrying while the gateway reports a concurrent
/// modification. The response body is discarded.
pub(crate) async fn send_with_retry(
    client: &IamClient,
    ctx: &Context,
    params: &Params,
) -> anyhow::Result<()> {
    let label = params.action_name().unwrap_or_default().to_string();
    retry_on_concurrent_modification(ctx, &label, move || async move {
        client.do_request(ctx, params, IAM_SERVICE).await.map(|_| ())
    })
    .await
}

/// Policy documents are equal when they parse to the same JSON value, so
/// formatting alone never causes a diff.
pub fn policies_equivalent(a: &str, b: &str) -> bool {
    match (
        serde_json::from_str::<serde_json::Value>(a),
        serde_json::from_str::<serde_json::Value>(b),
    ) {
        (Ok(a), Ok(b)) => a == b,
        _ => a.trim() == b.trim(),
    }
}

/// Keeps the configured document when the server's copy means the same thing.
pub(crate) fn prefer_configured_policy(configured: &str, remote: String) -> String {
    if policies_equivalent(configured, &remote) {
        configured.to_string()
    } else {
        remote
    }
}
