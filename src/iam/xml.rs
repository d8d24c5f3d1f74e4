//! Action-specific XML result shapes and decoding helpers.

use anyhow::{Context, Result};
use percent_encoding::percent_decode_str;
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Decodes a successful response body into `T`. The root element name is not
/// checked; `T` describes what sits inside it.
pub fn decode<T: DeserializeOwned>(action: &str, body: &[u8]) -> Result<T> {
    let text = std::str::from_utf8(body)
        .with_context(|| format!("{} response is not valid UTF-8", action))?;
    quick_xml::de::from_str(text).with_context(|| format!("Failed to parse {} response", action))
}

/// Policy documents come back URL-encoded. Plain JSON is passed through.
pub fn decode_policy_document(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') || trimmed.is_empty() {
        return Ok(trimmed.to_string());
    }
    let spaced = trimmed.replace('+', " ");
    let decoded = percent_decode_str(&spaced)
        .decode_utf8()
        .context("Policy document is not valid URL-encoded UTF-8")?;
    Ok(decoded.into_owned())
}

/// A `<member>` list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MemberList {
    #[serde(rename = "member", default)]
    pub members: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOpenIdConnectProviderResponse {
    #[serde(rename = "CreateOpenIDConnectProviderResult")]
    pub result: CreateOpenIdConnectProviderResult,
}

#[derive(Debug, Deserialize)]
pub struct CreateOpenIdConnectProviderResult {
    #[serde(rename = "OpenIDConnectProviderArn")]
    pub arn: String,
}

#[derive(Debug, Deserialize)]
pub struct GetOpenIdConnectProviderResponse {
    #[serde(rename = "GetOpenIDConnectProviderResult")]
    pub result: OpenIdConnectProvider,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OpenIdConnectProvider {
    #[serde(rename = "Url", default)]
    pub url: String,
    #[serde(rename = "ClientIDList", default)]
    pub client_ids: MemberList,
    #[serde(rename = "ThumbprintList", default)]
    pub thumbprints: MemberList,
    #[serde(rename = "CreateDate", default)]
    pub create_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListOpenIdConnectProvidersResponse {
    #[serde(rename = "ListOpenIDConnectProvidersResult")]
    pub result: ListOpenIdConnectProvidersResult,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListOpenIdConnectProvidersResult {
    #[serde(rename = "OpenIDConnectProviderList", default)]
    pub providers: ProviderArnList,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProviderArnList {
    #[serde(rename = "member", default)]
    pub members: Vec<ProviderArn>,
}

#[derive(Debug, Deserialize)]
pub struct ProviderArn {
    #[serde(rename = "Arn")]
    pub arn: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateRoleResponse {
    #[serde(rename = "CreateRoleResult")]
    pub result: RoleResult,
}

#[derive(Debug, Deserialize)]
pub struct GetRoleResponse {
    #[serde(rename = "GetRoleResult")]
    pub result: RoleResult,
}

#[derive(Debug, Deserialize)]
pub struct RoleResult {
    #[serde(rename = "Role")]
    pub role: Role,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Role {
    #[serde(rename = "RoleId", default)]
    pub role_id: String,
    #[serde(rename = "RoleName")]
    pub role_name: String,
    #[serde(rename = "Path", default)]
    pub path: String,
    #[serde(rename = "Arn", default)]
    pub arn: String,
    #[serde(rename = "CreateDate", default)]
    pub create_date: Option<String>,
    #[serde(rename = "MaxSessionDuration", default)]
    pub max_session_duration: Option<u32>,
    #[serde(rename = "AssumeRolePolicyDocument", default)]
    pub assume_role_policy_document: String,
}

#[derive(Debug, Deserialize)]
pub struct GetRolePolicyResponse {
    #[serde(rename = "GetRolePolicyResult")]
    pub result: RolePolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RolePolicy {
    #[serde(rename = "RoleName", default)]
    pub role_name: String,
    #[serde(rename = "PolicyName", default)]
    pub policy_name: String,
    #[serde(rename = "PolicyDocument", default)]
    pub policy_document: String,
}

#[derive(Debug, Deserialize)]
pub struct ListRolePoliciesResponse {
    #[serde(rename = "ListRolePoliciesResult")]
    pub result: ListRolePoliciesResult,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListRolePoliciesResult {
    #[serde(rename = "PolicyNames", default)]
    pub policy_names: MemberList,
}
