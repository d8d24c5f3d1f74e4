//! CLI operations over JSON state files.
//!
//! Every command maps onto the resource lifecycle: `create` applies a planned
//! object over nothing, `update` applies it over the recorded state, `delete`
//! applies nothing over the recorded state. `read` refreshes a state file in
//! place and removes it when the object is gone.

pub mod state;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Result, bail};
use log::{info, warn};

use crate::context::Context;
use crate::provider::Provider;
use crate::resources::{Resource, apply};
use crate::runtime::Runtime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    OidcProvider,
    Role,
    RolePolicy,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::OidcProvider => write!(f, "oidc-provider"),
            ResourceKind::Role => write!(f, "role"),
            ResourceKind::RolePolicy => write!(f, "role-policy"),
        }
    }
}

impl FromStr for ResourceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "oidc-provider" => Ok(ResourceKind::OidcProvider),
            "role" => Ok(ResourceKind::Role),
            "role-policy" => Ok(ResourceKind::RolePolicy),
            _ => bail!(
                "Unknown resource kind: {}. Expected oidc-provider, role, or role-policy.",
                s
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Create from `planned`, recording the result in `state` if given.
    Create {
        planned: PathBuf,
        state: Option<PathBuf>,
    },
    Read {
        state: PathBuf,
    },
    Update {
        state: PathBuf,
        planned: PathBuf,
    },
    Delete {
        state: PathBuf,
    },
    Import {
        id: String,
        state: Option<PathBuf>,
    },
    /// `role` narrows role policies to one role.
    List {
        role: Option<String>,
    },
}

/// Runs `operation` on `kind` and returns the JSON to print.
#[tracing::instrument(skip(runtime, provider, ctx))]
pub async fn run(
    runtime: &dyn Runtime,
    provider: &Provider,
    ctx: &Context,
    kind: ResourceKind,
    operation: &Operation,
) -> Result<String> {
    if let Operation::List { role } = operation {
        return list(provider, ctx, kind, role.as_deref()).await;
    }

    match kind {
        ResourceKind::OidcProvider => {
            run_lifecycle(runtime, &provider.oidc_providers(), ctx, operation).await
        }
        ResourceKind::Role => run_lifecycle(runtime, &provider.roles(), ctx, operation).await,
        ResourceKind::RolePolicy => {
            run_lifecycle(runtime, &provider.role_policies(), ctx, operation).await
        }
    }
}

async fn run_lifecycle<R: Resource>(
    runtime: &dyn Runtime,
    resource: &R,
    ctx: &Context,
    operation: &Operation,
) -> Result<String> {
    let result: Option<R::State> = match operation {
        Operation::Create { planned, state } => {
            let planned: R::State = state::load_required(runtime, planned)?;
            let created = apply(resource, ctx, None, Some(&planned)).await?;
            record(runtime, state.as_deref(), created.as_ref())?;
            info!("Created {}", resource.type_name());
            created
        }
        Operation::Read { state } => {
            let current: R::State = state::load_required(runtime, state)?;
            let refreshed = resource.read(ctx, &current).await?;
            record(runtime, Some(state.as_path()), refreshed.as_ref())?;
            refreshed
        }
        Operation::Update { state, planned } => {
            let prior: R::State = state::load_required(runtime, state)?;
            let planned: R::State = state::load_required(runtime, planned)?;
            let updated = apply(resource, ctx, Some(&prior), Some(&planned)).await?;
            record(runtime, Some(state.as_path()), updated.as_ref())?;
            updated
        }
        Operation::Delete { state } => {
            let prior: R::State = state::load_required(runtime, state)?;
            apply(resource, ctx, Some(&prior), None).await?;
            record::<R::State>(runtime, Some(state.as_path()), None)?;
            info!("Deleted {}", resource.type_name());
            None
        }
        Operation::Import { id, state } => {
            let imported = resource.import(ctx, id).await?;
            if imported.is_none() {
                warn!("{} {} does not exist", resource.type_name(), id);
            }
            record(runtime, state.as_deref(), imported.as_ref())?;
            imported
        }
        Operation::List { .. } => bail!("list is not a lifecycle operation"),
    };
    state::to_json(&result)
}

/// Saves `value` to `path`, or removes the file when the object is gone.
fn record<T: serde::Serialize>(
    runtime: &dyn Runtime,
    path: Option<&Path>,
    value: Option<&T>,
) -> Result<()> {
    match (path, value) {
        (Some(path), Some(value)) => state::save(runtime, path, value),
        (Some(path), None) => state::remove(runtime, path),
        (None, _) => Ok(()),
    }
}

async fn list(
    provider: &Provider,
    ctx: &Context,
    kind: ResourceKind,
    role: Option<&str>,
) -> Result<String> {
    let names = match (kind, role) {
        (ResourceKind::OidcProvider, _) => provider.oidc_providers().list(ctx).await?,
        (ResourceKind::RolePolicy, Some(role)) => provider.role_policies().list(ctx, role).await?,
        (ResourceKind::RolePolicy, None) => bail!("Listing role policies requires --role"),
        (ResourceKind::Role, _) => bail!("Listing is supported for oidc-provider and role-policy"),
    };
    state::to_json(&names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::ReqwestTransport;
    use crate::provider::ProviderConfig;
    use crate::runtime::MockRuntime;
    use mockall::predicate::eq;
    use mockito::Matcher;
    use std::sync::Arc;

    const DOCUMENT: &str = r#"{"Version":"2012-10-17","Statement":[]}"#;

    fn provider(url: &str) -> Provider {
        let config = ProviderConfig {
            endpoint: url.to_string(),
            access_key: "AKID".into(),
            secret_key: "SECRET".into(),
            ca_file: None,
            insecure: false,
            request_timeout: None,
        };
        Provider::with_transport(
            config,
            Arc::new(ReqwestTransport::from_client(reqwest::Client::new())),
        )
        .unwrap()
    }

    fn policy_json() -> String {
        serde_json::json!({
            "role_name": "foo",
            "policy_name": "bar",
            "policy_document": DOCUMENT,
        })
        .to_string()
    }

    #[test]
    fn test_resource_kind_parse() {
        assert_eq!(
            "oidc-provider".parse::<ResourceKind>().unwrap(),
            ResourceKind::OidcProvider
        );
        assert_eq!(
            "OIDC_PROVIDER".parse::<ResourceKind>().unwrap(),
            ResourceKind::OidcProvider
        );
        assert_eq!("role".parse::<ResourceKind>().unwrap(), ResourceKind::Role);
        assert_eq!(
            "role-policy".parse::<ResourceKind>().unwrap(),
            ResourceKind::RolePolicy
        );
        assert!("user".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn test_resource_kind_display_round_trips() {
        for kind in [
            ResourceKind::OidcProvider,
            ResourceKind::Role,
            ResourceKind::RolePolicy,
        ] {
            assert_eq!(kind.to_string().parse::<ResourceKind>().unwrap(), kind);
        }
    }

    #[tokio::test]
    async fn test_read_refreshes_state_file() {
        // --- Setup Mock Server ---

        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/")
            .match_query(Matcher::UrlEncoded("Action".into(), "GetRolePolicy".into()))
            .with_body(format!(
                "<GetRolePolicyResponse><GetRolePolicyResult>\
                 <PolicyDocument>{}</PolicyDocument>\
                 </GetRolePolicyResult></GetRolePolicyResponse>",
                crate::sigv4::uri_encode(DOCUMENT)
            ))
            .create_async()
            .await;

        // --- Setup MockRuntime ---

        let mut runtime = MockRuntime::new();
        runtime
            .expect_read_to_string()
            .with(eq(Path::new("policy.json")))
            .returning(|_| Ok(policy_json()));
        runtime.expect_exists().returning(|_| true);
        runtime
            .expect_write()
            .withf(|path, _| path == Path::new("policy.json"))
            .times(1)
            .returning(|_, _| Ok(()));

        // --- Execute ---

        let output = run(
            &runtime,
            &provider(&server.url()),
            &Context::background(),
            ResourceKind::RolePolicy,
            &Operation::Read {
                state: PathBuf::from("policy.json"),
            },
        )
        .await
        .unwrap();

        // --- Verify ---

        let printed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(printed["policy_document"], DOCUMENT);
    }

    #[tokio::test]
    async fn test_read_of_deleted_object_prints_null_and_removes_state() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/")
            .match_query(Matcher::Any)
            .with_status(404)
            .with_body("<ErrorResponse><Error><Code>NoSuchEntity</Code></Error></ErrorResponse>")
            .create_async()
            .await;

        let mut runtime = MockRuntime::new();
        runtime
            .expect_read_to_string()
            .returning(|_| Ok(policy_json()));
        runtime.expect_exists().returning(|_| true);
        runtime
            .expect_remove_file()
            .with(eq(Path::new("policy.json")))
            .times(1)
            .returning(|_| Ok(()));

        let output = run(
            &runtime,
            &provider(&server.url()),
            &Context::background(),
            ResourceKind::RolePolicy,
            &Operation::Read {
                state: PathBuf::from("policy.json"),
            },
        )
        .await
        .unwrap();

        assert_eq!(output, "null");
    }

    #[tokio::test]
    async fn test_delete_removes_state_file() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("Action".into(), "DeleteRolePolicy".into()),
                Matcher::UrlEncoded("PolicyName".into(), "bar".into()),
            ]))
            .with_body("<DeleteRolePolicyResponse/>")
            .expect(1)
            .create_async()
            .await;

        let mut runtime = MockRuntime::new();
        runtime
            .expect_read_to_string()
            .returning(|_| Ok(policy_json()));
        runtime.expect_exists().returning(|_| true);
        runtime.expect_remove_file().times(1).returning(|_| Ok(()));

        let output = run(
            &runtime,
            &provider(&server.url()),
            &Context::background(),
            ResourceKind::RolePolicy,
            &Operation::Delete {
                state: PathBuf::from("policy.json"),
            },
        )
        .await
        .unwrap();

        mock.assert_async().await;
        assert_eq!(output, "null");
    }

    #[tokio::test]
    async fn test_api_failure_surfaces_diagnostic() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(
                "<ErrorResponse><Error><Code>MalformedPolicyDocument</Code>\
                 <Message>bad policy</Message></Error></ErrorResponse>",
            )
            .create_async()
            .await;

        let mut runtime = MockRuntime::new();
        runtime
            .expect_read_to_string()
            .returning(|_| Ok(policy_json()));
        runtime.expect_write().never();

        let err = run(
            &runtime,
            &provider(&server.url()),
            &Context::background(),
            ResourceKind::RolePolicy,
            &Operation::Create {
                planned: PathBuf::from("policy.json"),
                state: Some(PathBuf::from("state.json")),
            },
        )
        .await
        .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Failed to create role policy foo:bar: \
             PutRolePolicy returned MalformedPolicyDocument (HTTP 400): bad policy"
        );
    }

    #[tokio::test]
    async fn test_list_role_policies_requires_role() {
        let runtime = MockRuntime::new();
        let err = run(
            &runtime,
            &provider("http://127.0.0.1:1"),
            &Context::background(),
            ResourceKind::RolePolicy,
            &Operation::List { role: None },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("requires --role"));
    }

    #[tokio::test]
    async fn test_list_oidc_providers() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/")
            .match_query(Matcher::UrlEncoded(
                "Action".into(),
                "ListOpenIDConnectProviders".into(),
            ))
            .with_body(
                "<ListOpenIDConnectProvidersResponse><ListOpenIDConnectProvidersResult>\
                 <OpenIDConnectProviderList><member><Arn>arn:a</Arn></member>\
                 </OpenIDConnectProviderList>\
                 </ListOpenIDConnectProvidersResult></ListOpenIDConnectProvidersResponse>",
            )
            .create_async()
            .await;

        let output = run(
            &MockRuntime::new(),
            &provider(&server.url()),
            &Context::background(),
            ResourceKind::OidcProvider,
            &Operation::List { role: None },
        )
        .await
        .unwrap();

        let arns: Vec<String> = serde_json::from_str(&output).unwrap();
        assert_eq!(arns, vec!["arn:a"]);
    }
}
