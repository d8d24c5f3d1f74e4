//! Signed client for the gateway's IAM-compatible API.

use std::fmt;
use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use chrono::{DateTime, Utc};
use log::debug;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Method, Request};
use serde::de::DeserializeOwned;
use url::Url;

use super::error::classify;
use super::params::Params;
use super::xml::decode;
use crate::context::Context;
use crate::http::HttpTransport;
use crate::sigv4::{self, Credentials, EMPTY_PAYLOAD_HASH, SignableRequest, SigningParams};

/// Service name used in the signing scope.
///
/// RadosGW verifies IAM and STS requests against the object-storage scope, so
/// this stays "s3" even though the requests are IAM actions. This is a
/// compatibility requirement of the gateway, not a general SigV4 rule.
pub const SIGNING_SERVICE: &str = "s3";

/// RadosGW does not validate regions; the scope region is left empty.
pub const SIGNING_REGION: &str = "";

/// Logging label for IAM actions.
pub const IAM_SERVICE: &str = "iam";

/// Parameter-only POSTs; every request is sent with an empty body.
const METHOD: &str = "POST";

#[derive(Clone)]
pub struct IamClient {
    endpoint: Url,
    credentials: Credentials,
    transport: Arc<dyn HttpTransport>,
}

impl fmt::Debug for IamClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IamClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

impl IamClient {
    pub fn new(
        endpoint: &str,
        credentials: Credentials,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self> {
        let endpoint =
            Url::parse(endpoint).with_context(|| format!("Invalid endpoint URL: {}", endpoint))?;
        if !matches!(endpoint.scheme(), "http" | "https") || endpoint.host_str().is_none() {
            bail!("Endpoint must be an http(s) URL with a host, got {}", endpoint);
        }
        Ok(Self {
            endpoint,
            credentials,
            transport,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// `{endpoint}/?{params}`
    fn request_url(&self, params: &Params) -> Url {
        let mut url = self.endpoint.clone();
        let path = format!("{}/", url.path().trim_end_matches('/'));
        url.set_path(&path);
        url.set_query(Some(&params.encode()));
        url
    }

    fn host_header(&self) -> String {
        let host = self.endpoint.host_str().unwrap_or_default();
        match self.endpoint.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }

    /// Builds the signed POST for `params` as of `time`.
    pub(crate) fn signed_request(&self, params: &Params, time: DateTime<Utc>) -> Result<Request> {
        let url = self.request_url(params);
        let mut signable =
            SignableRequest::new(METHOD, url.clone()).header("host", self.host_header());

        let signing = SigningParams {
            credentials: &self.credentials,
            service: SIGNING_SERVICE,
            region: SIGNING_REGION,
            time,
        };
        sigv4::sign(&mut signable, EMPTY_PAYLOAD_HASH, &signing)
            .context("Failed to sign request")?;

        let mut request = Request::new(Method::POST, url);
        for (name, value) in &signable.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .with_context(|| format!("Invalid header name {}", name))?;
            let mut value = HeaderValue::from_str(value)
                .with_context(|| format!("Invalid value for header {}", name))?;
            if name == reqwest::header::AUTHORIZATION {
                value.set_sensitive(true);
            }
            request.headers_mut().insert(name, value);
        }
        Ok(request)
    }

    /// Signs and sends one IAM action.
    ///
    /// `service` only labels log lines. A 2xx body is returned untouched; any
    /// other status becomes an [`ApiError`](super::ApiError). Network failures
    /// and context expiry come back as other error types.
    #[tracing::instrument(skip(self, ctx, params), fields(action = params.action_name()))]
    pub async fn do_request(&self, ctx: &Context, params: &Params, service: &str) -> Result<Vec<u8>> {
        let Some(action) = params.action_name() else {
            bail!("IAM request is missing the Action parameter");
        };

        let request = self.signed_request(params, Utc::now())?;

        let response = match ctx.run(action, self.transport.execute(request)).await {
            Ok(result) => result
                .with_context(|| format!("Failed to send {} request to {}", action, service))?,
            Err(cancelled) => return Err(cancelled.into()),
        };

        debug!(
            "{} ({}): HTTP {}: {}",
            action,
            service,
            response.status,
            String::from_utf8_lossy(&response.body)
        );

        if response.is_success() {
            Ok(response.body)
        } else {
            Err(classify(response.status, &response.body, action).into())
        }
    }

    /// [`do_request`](Self::do_request) followed by XML decoding into `T`.
    pub async fn call<T: DeserializeOwned>(
        &self,
        ctx: &Context,
        params: &Params,
        service: &str,
    ) -> Result<T> {
        let body = self.do_request(ctx, params, service).await?;
        decode(params.action_name().unwrap_or_default(), &body)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::context::Cancelled;
    use crate::http::{HttpResponse, MockHttpTransport, ReqwestTransport};
    use crate::iam::error::{
        CODE_UNKNOWN_ERROR, METHOD_NOT_ALLOWED, NO_SUCH_ENTITY, api_error, is_not_found,
    };
    use crate::iam::xml::{GetRolePolicyResponse, decode_policy_document};
    use chrono::TimeZone;
    use mockito::Matcher;
    use std::time::Duration;

    pub(crate) const SIGNATURE_PATTERN: &str = r"^AWS4-HMAC-SHA256 Credential=AKID/\d{8}//s3/aws4_request, SignedHeaders=host;x-amz-content-sha256;x-amz-date, Signature=[0-9a-f]{64}$";

    /// Client pointed at `url` with test credentials and a real transport.
    pub(crate) fn test_client(url: &str) -> IamClient {
        IamClient::new(
            url,
            Credentials::new("AKID", "SECRET"),
            Arc::new(ReqwestTransport::from_client(reqwest::Client::new())),
        )
        .unwrap()
    }

    fn mock_client(transport: MockHttpTransport) -> IamClient {
        IamClient::new(
            "http://rgw.local:8000",
            Credentials::new("AKID", "SECRET"),
            Arc::new(transport),
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_bad_endpoints() {
        let transport = || Arc::new(MockHttpTransport::new()) as Arc<dyn HttpTransport>;
        let creds = || Credentials::new("AKID", "SECRET");
        assert!(IamClient::new("not a url", creds(), transport()).is_err());
        assert!(IamClient::new("ftp://rgw.local", creds(), transport()).is_err());
        assert!(IamClient::new("https://rgw.local", creds(), transport()).is_ok());
    }

    #[test]
    fn test_signed_request_shape() {
        let client = mock_client(MockHttpTransport::new());
        let mut params = Params::action("GetRole");
        params.set("RoleName", "foo");

        let time = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        let request = client.signed_request(&params, time).unwrap();

        assert_eq!(request.method(), Method::POST);
        assert_eq!(
            request.url().as_str(),
            "http://rgw.local:8000/?Action=GetRole&RoleName=foo"
        );
        assert!(request.body().is_none());

        let headers = request.headers();
        assert_eq!(headers["host"], "rgw.local:8000");
        assert_eq!(headers["x-amz-date"], "20240506T070809Z");
        assert_eq!(headers["x-amz-content-sha256"], EMPTY_PAYLOAD_HASH);
        let auth = headers["authorization"].to_str().unwrap();
        assert!(auth.starts_with("AWS4-HMAC-SHA256 Credential=AKID/20240506//s3/aws4_request, "));
        assert!(headers["authorization"].is_sensitive());
    }

    #[test]
    fn test_request_url_keeps_endpoint_path() {
        let client = IamClient::new(
            "https://rgw.local/gateway/",
            Credentials::new("AKID", "SECRET"),
            Arc::new(MockHttpTransport::new()),
        )
        .unwrap();
        let url = client.request_url(&Params::action("ListRoles"));
        assert_eq!(url.as_str(), "https://rgw.local/gateway/?Action=ListRoles");
        assert_eq!(client.host_header(), "rgw.local");
    }

    #[tokio::test]
    async fn test_success_returns_body_unmodified() {
        for status in [200usize, 201, 299] {
            let mut server = mockito::Server::new_async().await;
            let body = format!("<ListRolesResponse><Status>{}</Status></ListRolesResponse>", status);
            let mock = server
                .mock("POST", "/")
                .match_query(Matcher::UrlEncoded("Action".into(), "ListRoles".into()))
                .match_header("authorization", Matcher::Regex(SIGNATURE_PATTERN.into()))
                .match_header("x-amz-content-sha256", EMPTY_PAYLOAD_HASH)
                .match_header("x-amz-date", Matcher::Regex(r"^\d{8}T\d{6}Z$".into()))
                .with_status(status)
                .with_body(&body)
                .create_async()
                .await;

            let client = test_client(&server.url());
            let result = client
                .do_request(&Context::background(), &Params::action("ListRoles"), IAM_SERVICE)
                .await
                .unwrap();

            mock.assert_async().await;
            assert_eq!(result, body.as_bytes());
        }
    }

    #[tokio::test]
    async fn test_get_role_policy_document_is_decoded() {
        let document = r#"{"Version":"2012-10-17","Statement":[{"Effect":"Allow","Action":["s3:GetObject"],"Resource":"arn:aws:s3:::bucket/*"}]}"#;
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("Action".into(), "GetRolePolicy".into()),
                Matcher::UrlEncoded("RoleName".into(), "foo".into()),
                Matcher::UrlEncoded("PolicyName".into(), "bar".into()),
            ]))
            .match_header("authorization", Matcher::Regex(SIGNATURE_PATTERN.into()))
            .with_status(200)
            .with_body(format!(
                "<GetRolePolicyResponse><GetRolePolicyResult>\
                 <RoleName>foo</RoleName><PolicyName>bar</PolicyName>\
                 <PolicyDocument>{}</PolicyDocument>\
                 </GetRolePolicyResult></GetRolePolicyResponse>",
                crate::sigv4::uri_encode(document)
            ))
            .create_async()
            .await;

        let client = test_client(&server.url());
        let mut params = Params::action("GetRolePolicy");
        params.set("RoleName", "foo").set("PolicyName", "bar");
        let response: GetRolePolicyResponse = client
            .call(&Context::background(), &params, IAM_SERVICE)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(
            decode_policy_document(&response.result.policy_document).unwrap(),
            document
        );
    }

    #[tokio::test]
    async fn test_not_found_is_typed() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/")
            .match_query(Matcher::Any)
            .with_status(404)
            .with_body(
                "<ErrorResponse><Error><Code>NoSuchEntity</Code>\
                 <Message>role bar not found</Message></Error></ErrorResponse>",
            )
            .create_async()
            .await;

        let client = test_client(&server.url());
        let mut params = Params::action("GetRole");
        params.set("RoleName", "bar");
        let err = client
            .do_request(&Context::background(), &params, IAM_SERVICE)
            .await
            .unwrap_err();

        assert!(is_not_found(&err));
        let api = api_error(&err).unwrap();
        assert!(api.is(&NO_SUCH_ENTITY));
        assert_eq!(api.message, "role bar not found");
        assert_eq!(api.status_code, 404);
        assert_eq!(api.action, "GetRole");
    }

    #[tokio::test]
    async fn test_bare_405_is_method_not_allowed() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/")
            .match_query(Matcher::Any)
            .with_status(405)
            .create_async()
            .await;

        let client = test_client(&server.url());
        let err = client
            .do_request(
                &Context::background(),
                &Params::action("AddClientIDToOpenIDConnectProvider"),
                IAM_SERVICE,
            )
            .await
            .unwrap_err();

        assert!(api_error(&err).unwrap().is(&METHOD_NOT_ALLOWED));
    }

    #[tokio::test]
    async fn test_garbage_error_body_is_unknown_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body("internal explosion")
            .create_async()
            .await;

        let client = test_client(&server.url());
        let err = client
            .do_request(&Context::background(), &Params::action("ListRoles"), IAM_SERVICE)
            .await
            .unwrap_err();

        let api = api_error(&err).unwrap();
        assert_eq!(api.code, CODE_UNKNOWN_ERROR);
        assert_eq!(api.message, "internal explosion");
        assert_eq!(api.status_code, 500);
    }

    #[tokio::test]
    async fn test_missing_action_sends_nothing() {
        let mut transport = MockHttpTransport::new();
        transport.expect_execute().never();

        let client = mock_client(transport);
        let mut params = Params::default();
        params.set("RoleName", "foo");
        let err = client
            .do_request(&Context::background(), &params, IAM_SERVICE)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("missing the Action parameter"));
    }

    #[tokio::test]
    async fn test_network_failure_is_not_typed() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("connection refused")));

        let client = mock_client(transport);
        let err = client
            .do_request(&Context::background(), &Params::action("GetRole"), IAM_SERVICE)
            .await
            .unwrap_err();

        assert!(api_error(&err).is_none());
        assert!(err.to_string().contains("Failed to send GetRole request to iam"));
    }

    #[tokio::test]
    async fn test_mocked_transport_sees_signed_request() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .withf(|request| {
                request.method() == Method::POST
                    && request.url().query() == Some("Action=ListOpenIDConnectProviders")
                    && request.headers().contains_key("authorization")
            })
            .times(1)
            .returning(|_| {
                Ok(HttpResponse {
                    status: 200,
                    body: b"<ok/>".to_vec(),
                })
            });

        let client = mock_client(transport);
        let body = client
            .do_request(
                &Context::background(),
                &Params::action("ListOpenIDConnectProviders"),
                IAM_SERVICE,
            )
            .await
            .unwrap();
        assert_eq!(body, b"<ok/>");
    }

    #[tokio::test]
    async fn test_context_deadline_aborts_request() {
        // Accepts connections but never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());

        let client = test_client(&url);
        let ctx = Context::with_timeout(Duration::from_millis(100));
        let err = client
            .do_request(&ctx, &Params::action("ListRoles"), IAM_SERVICE)
            .await
            .unwrap_err();

        assert!(err.downcast_ref::<Cancelled>().is_some());
        drop(listener);
    }
}
