//! Inline policies attached to a role.

use anyhow::Result;
use async_trait::async_trait;
use log::info;
use serde::{Deserialize, Serialize};

use super::{
    Diagnostic, Plan, Resource, deleted_or_gone, found_or_removed, policies_equivalent,
    prefer_configured_policy, send_with_retry,
};
use crate::context::Context;
use crate::iam::xml::{GetRolePolicyResponse, ListRolePoliciesResponse, decode_policy_document};
use crate::iam::{IAM_SERVICE, IamClient, Params};

const TYPE_NAME: &str = "role_policy";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePolicyState {
    pub role_name: String,
    pub policy_name: String,
    pub policy_document: String,
}

impl RolePolicyState {
    /// `role:policy`
    pub fn id(&self) -> String {
        format!("{}:{}", self.role_name, self.policy_name)
    }
}

/// Splits a `role:policy` id.
pub fn parse_id(id: &str) -> Option<(&str, &str)> {
    match id.split_once(':') {
        Some((role, policy)) if !role.is_empty() && !policy.is_empty() => Some((role, policy)),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct RolePolicyResource {
    client: IamClient,
}

impl RolePolicyResource {
    pub fn new(client: IamClient) -> Self {
        Self { client }
    }

    /// The role's policy document, URL-decoded.
    async fn fetch(&self, ctx: &Context, role_name: &str, policy_name: &str) -> Result<String> {
        let mut params = Params::action("GetRolePolicy");
        params
            .set("RoleName", role_name)
            .set("PolicyName", policy_name);
        let response: GetRolePolicyResponse = self.client.call(ctx, &params, IAM_SERVICE).await?;
        decode_policy_document(&response.result.policy_document)
    }

    async fn put(&self, ctx: &Context, state: &RolePolicyState) -> Result<()> {
        let mut params = Params::action("PutRolePolicy");
        params
            .set("RoleName", state.role_name.as_str())
            .set("PolicyName", state.policy_name.as_str())
            .set("PolicyDocument", state.policy_document.as_str());
        send_with_retry(&self.client, ctx, &params).await
    }

    /// Names of the inline policies attached to `role_name`.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn list(&self, ctx: &Context, role_name: &str) -> Result<Vec<String>, Diagnostic> {
        let mut params = Params::action("ListRolePolicies");
        params.set("RoleName", role_name);
        let response: ListRolePoliciesResponse = self
            .client
            .call(ctx, &params, IAM_SERVICE)
            .await
            .map_err(|e| {
                Diagnostic::from_error(format!("Failed to list policies of role {}", role_name), &e)
            })?;
        Ok(response.result.policy_names.members)
    }

    async fn put_and_read(
        &self,
        ctx: &Context,
        planned: &RolePolicyState,
        verb: &str,
    ) -> Result<RolePolicyState, Diagnostic> {
        let summary = || format!("Failed to {} role policy {}", verb, planned.id());
        self.put(ctx, planned)
            .await
            .map_err(|e| Diagnostic::from_error(summary(), &e))?;
        info!("Put role policy {}", planned.id());

        self.read(ctx, planned)
            .await?
            .ok_or_else(|| Diagnostic::new(summary(), "the policy was not found after it was put"))
    }
}

#[async_trait]
impl Resource for RolePolicyResource {
    type State = RolePolicyState;

    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    #[tracing::instrument(skip(self, ctx, planned), fields(id = %planned.id()))]
    async fn create(
        &self,
        ctx: &Context,
        planned: &RolePolicyState,
    ) -> Result<RolePolicyState, Diagnostic> {
        self.put_and_read(ctx, planned, "create").await
    }

    #[tracing::instrument(skip(self, ctx, state), fields(id = %state.id()))]
    async fn read(
        &self,
        ctx: &Context,
        state: &RolePolicyState,
    ) -> Result<Option<RolePolicyState>, Diagnostic> {
        let document = self
            .fetch(ctx, &state.role_name, &state.policy_name)
            .await;
        let document = found_or_removed(TYPE_NAME, &state.id(), document)?;
        Ok(document.map(|document| RolePolicyState {
            policy_document: prefer_configured_policy(&state.policy_document, document),
            ..state.clone()
        }))
    }

    fn plan(&self, prior: &RolePolicyState, planned: &RolePolicyState) -> Plan {
        if prior.role_name != planned.role_name || prior.policy_name != planned.policy_name {
            Plan::Replace
        } else if policies_equivalent(&prior.policy_document, &planned.policy_document) {
            Plan::NoChange
        } else {
            Plan::Update
        }
    }

    #[tracing::instrument(skip(self, ctx, _prior, planned), fields(id = %planned.id()))]
    async fn update(
        &self,
        ctx: &Context,
        _prior: &RolePolicyState,
        planned: &RolePolicyState,
    ) -> Result<RolePolicyState, Diagnostic> {
        self.put_and_read(ctx, planned, "update").await
    }

    #[tracing::instrument(skip(self, ctx, state), fields(id = %state.id()))]
    async fn delete(&self, ctx: &Context, state: &RolePolicyState) -> Result<(), Diagnostic> {
        let mut params = Params::action("DeleteRolePolicy");
        params
            .set("RoleName", state.role_name.as_str())
            .set("PolicyName", state.policy_name.as_str());
        deleted_or_gone(
            TYPE_NAME,
            &state.id(),
            send_with_retry(&self.client, ctx, &params).await,
        )
    }

    /// Imports by `role:policy`.
    async fn import(&self, ctx: &Context, id: &str) -> Result<Option<RolePolicyState>, Diagnostic> {
        let Some((role_name, policy_name)) = parse_id(id) else {
            return Err(Diagnostic::new(
                format!("Invalid role policy id {}", id),
                "expected <role name>:<policy name>",
            ));
        };
        let document = found_or_removed(TYPE_NAME, id, self.fetch(ctx, role_name, policy_name).await)?;
        Ok(document.map(|policy_document| RolePolicyState {
            role_name: role_name.to_string(),
            policy_name: policy_name.to_string(),
            policy_document,
        }))
    }
}
