//! IAM roles.

use anyhow::Result;
use async_trait::async_trait;
use log::info;
use serde::{Deserialize, Serialize};

use super::{
    Diagnostic, Plan, Resource, deleted_or_gone, found_or_removed, policies_equivalent,
    prefer_configured_policy, send_with_retry,
};
use crate::context::Context;
use crate::iam::xml::{self, GetRoleResponse, decode_policy_document};
use crate::iam::{IAM_SERVICE, IamClient, Params};

const TYPE_NAME: &str = "role";

fn default_path() -> String {
    "/".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleState {
    pub name: String,
    #[serde(default = "default_path")]
    pub path: String,
    /// Trust policy, as JSON.
    pub assume_role_policy_document: String,
    /// Seconds. Left to the server default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_session_duration: Option<u32>,
    #[serde(default)]
    pub arn: String,
    #[serde(default)]
    pub role_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_date: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RoleResource {
    client: IamClient,
}

impl RoleResource {
    pub fn new(client: IamClient) -> Self {
        Self { client }
    }

    async fn fetch(&self, ctx: &Context, name: &str) -> Result<xml::Role> {
        let mut params = Params::action("GetRole");
        params.set("RoleName", name);
        let response: GetRoleResponse = self.client.call(ctx, &params, IAM_SERVICE).await?;
        Ok(response.result.role)
    }

    fn duration_changed(prior: &RoleState, planned: &RoleState) -> bool {
        planned.max_session_duration.is_some()
            && planned.max_session_duration != prior.max_session_duration
    }
}

/// Builds state from the server's role, keeping configured values that the
/// server reports in a different but equivalent form.
fn refreshed(configured: Option<&RoleState>, role: xml::Role) -> Result<RoleState> {
    let remote_policy = decode_policy_document(&role.assume_role_policy_document)?;
    let assume_role_policy_document = match configured {
        Some(state) => prefer_configured_policy(&state.assume_role_policy_document, remote_policy),
        None => remote_policy,
    };
    Ok(RoleState {
        name: role.role_name,
        path: if role.path.is_empty() {
            default_path()
        } else {
            role.path
        },
        assume_role_policy_document,
        max_session_duration: role.max_session_duration,
        arn: role.arn,
        role_id: role.role_id,
        create_date: role.create_date,
    })
}

#[async_trait]
impl Resource for RoleResource {
    type State = RoleState;

    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    #[tracing::instrument(skip(self, ctx, planned), fields(role = %planned.name))]
    async fn create(&self, ctx: &Context, planned: &RoleState) -> Result<RoleState, Diagnostic> {
        let summary = || format!("Failed to create role {}", planned.name);

        let mut params = Params::action("CreateRole");
        params
            .set("RoleName", planned.name.as_str())
            .set("Path", planned.path.as_str())
            .set("AssumeRolePolicyDocument", planned.assume_role_policy_document.as_str())
            .set_opt("MaxSessionDuration", planned.max_session_duration.map(|d| d.to_string()));

        send_with_retry(&self.client, ctx, &params)
            .await
            .map_err(|e| Diagnostic::from_error(summary(), &e))?;
        info!("Created role {}", planned.name);

        self.read(ctx, planned)
            .await?
            .ok_or_else(|| Diagnostic::new(summary(), "the role was not found right after creation"))
    }

    #[tracing::instrument(skip(self, ctx, state), fields(role = %state.name))]
    async fn read(&self, ctx: &Context, state: &RoleState) -> Result<Option<RoleState>, Diagnostic> {
        let Some(role) = found_or_removed(TYPE_NAME, &state.name, self.fetch(ctx, &state.name).await)?
        else {
            return Ok(None);
        };
        refreshed(Some(state), role)
            .map(Some)
            .map_err(|e| Diagnostic::from_error(format!("Failed to read role {}", state.name), &e))
    }

    fn plan(&self, prior: &RoleState, planned: &RoleState) -> Plan {
        if prior.name != planned.name || prior.path != planned.path {
            Plan::Replace
        } else if !policies_equivalent(
            &prior.assume_role_policy_document,
            &planned.assume_role_policy_document,
        ) || Self::duration_changed(prior, planned)
        {
            Plan::Update
        } else {
            Plan::NoChange
        }
    }

    #[tracing::instrument(skip(self, ctx, prior, planned), fields(role = %prior.name))]
    async fn update(
        &self,
        ctx: &Context,
        prior: &RoleState,
        planned: &RoleState,
    ) -> Result<RoleState, Diagnostic> {
        let summary = || format!("Failed to update role {}", prior.name);

        if !policies_equivalent(
            &prior.assume_role_policy_document,
            &planned.assume_role_policy_document,
        ) {
            let mut params = Params::action("UpdateAssumeRolePolicy");
            params
                .set("RoleName", prior.name.as_str())
                .set("PolicyDocument", planned.assume_role_policy_document.as_str());
            send_with_retry(&self.client, ctx, &params)
                .await
                .map_err(|e| Diagnostic::from_error(summary(), &e))?;
        }

        let new_duration = planned
            .max_session_duration
            .filter(|_| Self::duration_changed(prior, planned));
        if let Some(duration) = new_duration {
            let mut params = Params::action("UpdateRole");
            params
                .set("RoleName", prior.name.as_str())
                .set("MaxSessionDuration", duration.to_string());
            send_with_retry(&self.client, ctx, &params)
                .await
                .map_err(|e| Diagnostic::from_error(summary(), &e))?;
        }

        self.read(ctx, planned)
            .await?
            .ok_or_else(|| Diagnostic::new(summary(), "the role disappeared during the update"))
    }

    #[tracing::instrument(skip(self, ctx, state), fields(role = %state.name))]
    async fn delete(&self, ctx: &Context, state: &RoleState) -> Result<(), Diagnostic> {
        let mut params = Params::action("DeleteRole");
        params.set("RoleName", state.name.as_str());
        deleted_or_gone(
            TYPE_NAME,
            &state.name,
            send_with_retry(&self.client, ctx, &params).await,
        )
    }

    /// Imports by role name.
    async fn import(&self, ctx: &Context, id: &str) -> Result<Option<RoleState>, Diagnostic> {
        let Some(role) = found_or_removed(TYPE_NAME, id, self.fetch(ctx, id).await)? else {
            return Ok(None);
        };
        refreshed(None, role)
            .map(Some)
            .map_err(|e| Diagnostic::from_error(format!("Failed to import role {}", id), &e))
    }
}
