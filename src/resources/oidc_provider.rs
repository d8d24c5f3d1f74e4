//! OpenID Connect identity providers.

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::{Diagnostic, Plan, Resource, deleted_or_gone, found_or_removed, send_with_retry};
use crate::context::Context;
use crate::iam::xml::{
    CreateOpenIdConnectProviderResponse, GetOpenIdConnectProviderResponse,
    ListOpenIdConnectProvidersResponse, OpenIdConnectProvider,
};
use crate::iam::{IAM_SERVICE, IamClient, Params, is_method_not_allowed};

const TYPE_NAME: &str = "oidc_provider";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OidcProviderState {
    /// Assigned by the server on creation.
    #[serde(default)]
    pub arn: String,
    pub url: String,
    #[serde(default)]
    pub client_id_list: Vec<String>,
    #[serde(default)]
    pub thumbprint_list: Vec<String>,
    /// Change client IDs and thumbprints in place instead of replacing the
    /// provider. Needs a RadosGW release that implements the update actions.
    #[serde(default)]
    pub allow_updates: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_date: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OidcProviderResource {
    client: IamClient,
}

impl OidcProviderResource {
    pub fn new(client: IamClient) -> Self {
        Self { client }
    }

    async fn fetch(&self, ctx: &Context, arn: &str) -> Result<OpenIdConnectProvider> {
        let mut params = Params::action("GetOpenIDConnectProvider");
        params.set("OpenIDConnectProviderArn", arn);
        let response: GetOpenIdConnectProviderResponse =
            self.client.call(ctx, &params, IAM_SERVICE).await?;
        Ok(response.result)
    }

    /// ARNs of every provider the account owns.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn list(&self, ctx: &Context) -> Result<Vec<String>, Diagnostic> {
        let params = Params::action("ListOpenIDConnectProviders");
        let response: ListOpenIdConnectProvidersResponse = self
            .client
            .call(ctx, &params, IAM_SERVICE)
            .await
            .map_err(|e| Diagnostic::from_error("Failed to list OIDC providers", &e))?;
        Ok(response
            .result
            .providers
            .members
            .into_iter()
            .map(|p| p.arn)
            .collect())
    }

    async fn apply_changes(
        &self,
        ctx: &Context,
        prior: &OidcProviderState,
        planned: &OidcProviderState,
    ) -> Result<()> {
        let arn = prior.arn.as_str();

        for client_id in missing_from(&planned.client_id_list, &prior.client_id_list) {
            debug!("Adding client ID {} to {}", client_id, arn);
            let mut params = Params::action("AddClientIDToOpenIDConnectProvider");
            params
                .set("OpenIDConnectProviderArn", arn)
                .set("ClientID", client_id);
            send_with_retry(&self.client, ctx, &params).await?;
        }

        for client_id in missing_from(&prior.client_id_list, &planned.client_id_list) {
            debug!("Removing client ID {} from {}", client_id, arn);
            let mut params = Params::action("RemoveClientIDFromOpenIDConnectProvider");
            params
                .set("OpenIDConnectProviderArn", arn)
                .set("ClientID", client_id);
            send_with_retry(&self.client, ctx, &params).await?;
        }

        if !same_members(&prior.thumbprint_list, &planned.thumbprint_list) {
            debug!("Replacing thumbprints of {}", arn);
            let mut params = Params::action("UpdateOpenIDConnectProviderThumbprint");
            params
                .set("OpenIDConnectProviderArn", arn)
                .set_members("ThumbprintList", &planned.thumbprint_list);
            send_with_retry(&self.client, ctx, &params).await?;
        }

        Ok(())
    }
}

/// Items of `items` that `other` lacks, in `items` order.
fn missing_from<'a>(items: &'a [String], other: &[String]) -> Vec<&'a String> {
    items.iter().filter(|item| !other.contains(item)).collect()
}

fn same_members(a: &[String], b: &[String]) -> bool {
    missing_from(a, b).is_empty() && missing_from(b, a).is_empty()
}

/// RadosGW stores provider URLs without their scheme.
fn strip_scheme(url: &str) -> &str {
    url.strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url)
}

/// Merges the server's view into `state`, keeping the configured URL when
/// the server echoes it back without a scheme.
fn refreshed(state: &OidcProviderState, arn: &str, remote: OpenIdConnectProvider) -> OidcProviderState {
    let url = if strip_scheme(&state.url) == strip_scheme(&remote.url) && !state.url.is_empty() {
        state.url.clone()
    } else {
        remote.url
    };
    OidcProviderState {
        arn: arn.to_string(),
        url,
        client_id_list: remote.client_ids.members,
        thumbprint_list: remote.thumbprints.members,
        allow_updates: state.allow_updates,
        create_date: remote.create_date,
    }
}

#[async_trait]
impl Resource for OidcProviderResource {
    type State = OidcProviderState;

    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    #[tracing::instrument(skip(self, ctx, planned), fields(url = %planned.url))]
    async fn create(
        &self,
        ctx: &Context,
        planned: &OidcProviderState,
    ) -> Result<OidcProviderState, Diagnostic> {
        let mut params = Params::action("CreateOpenIDConnectProvider");
        params
            .set("Url", planned.url.as_str())
            .set_members("ClientIDList", &planned.client_id_list)
            .set_members("ThumbprintList", &planned.thumbprint_list);

        let response: CreateOpenIdConnectProviderResponse = self
            .client
            .call(ctx, &params, IAM_SERVICE)
            .await
            .map_err(|e| {
                Diagnostic::from_error(format!("Failed to create OIDC provider {}", planned.url), &e)
            })?;
        let arn = response.result.arn;
        info!("Created OIDC provider {}", arn);

        let created = OidcProviderState {
            arn: arn.clone(),
            ..planned.clone()
        };
        self.read(ctx, &created).await?.ok_or_else(|| {
            Diagnostic::new(
                format!("Failed to create OIDC provider {}", planned.url),
                format!("{} was not found right after creation", arn),
            )
        })
    }

    #[tracing::instrument(skip(self, ctx, state), fields(arn = %state.arn))]
    async fn read(
        &self,
        ctx: &Context,
        state: &OidcProviderState,
    ) -> Result<Option<OidcProviderState>, Diagnostic> {
        let remote = found_or_removed(TYPE_NAME, &state.arn, self.fetch(ctx, &state.arn).await)?;
        Ok(remote.map(|remote| refreshed(state, &state.arn, remote)))
    }

    fn plan(&self, prior: &OidcProviderState, planned: &OidcProviderState) -> Plan {
        if strip_scheme(&prior.url) != strip_scheme(&planned.url) {
            return Plan::Replace;
        }
        let lists_changed = !same_members(&prior.client_id_list, &planned.client_id_list)
            || !same_members(&prior.thumbprint_list, &planned.thumbprint_list);
        if lists_changed {
            if planned.allow_updates {
                Plan::Update
            } else {
                Plan::Replace
            }
        } else if prior.allow_updates != planned.allow_updates {
            Plan::Update
        } else {
            Plan::NoChange
        }
    }

    #[tracing::instrument(skip(self, ctx, prior, planned), fields(arn = %prior.arn))]
    async fn update(
        &self,
        ctx: &Context,
        prior: &OidcProviderState,
        planned: &OidcProviderState,
    ) -> Result<OidcProviderState, Diagnostic> {
        let summary = || format!("Failed to update OIDC provider {}", prior.arn);

        if let Err(err) = self.apply_changes(ctx, prior, planned).await {
            if is_method_not_allowed(&err) {
                return Err(Diagnostic::new(
                    summary(),
                    "this RadosGW release cannot update OpenID Connect providers in place; \
                     upgrade RadosGW or set allow_updates = false",
                ));
            }
            return Err(Diagnostic::from_error(summary(), &err));
        }

        let updated = OidcProviderState {
            arn: prior.arn.clone(),
            create_date: prior.create_date.clone(),
            ..planned.clone()
        };
        self.read(ctx, &updated)
            .await?
            .ok_or_else(|| Diagnostic::new(summary(), "the provider disappeared during the update"))
    }

    #[tracing::instrument(skip(self, ctx, state), fields(arn = %state.arn))]
    async fn delete(&self, ctx: &Context, state: &OidcProviderState) -> Result<(), Diagnostic> {
        let mut params = Params::action("DeleteOpenIDConnectProvider");
        params.set("OpenIDConnectProviderArn", state.arn.as_str());
        let result = send_with_retry(&self.client, ctx, &params).await;
        deleted_or_gone(TYPE_NAME, &state.arn, result)
    }

    /// Imports by ARN.
    async fn import(&self, ctx: &Context, id: &str) -> Result<Option<OidcProviderState>, Diagnostic> {
        let remote = found_or_removed(TYPE_NAME, id, self.fetch(ctx, id).await)?;
        Ok(remote.map(|remote| OidcProviderState {
            arn: id.to_string(),
            url: remote.url,
            client_id_list: remote.client_ids.members,
            thumbprint_list: remote.thumbprints.members,
            allow_updates: false,
            create_date: remote.create_date,
        }))
    }
}
