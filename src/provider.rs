//! Provider configuration and the shared state handed to every resource.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use log::{debug, warn};
use url::Url;

use crate::http::{HttpTransport, ReqwestTransport, TlsOptions};
use crate::iam::IamClient;
use crate::locks::KeyCreationLocks;
use crate::resources::{OidcProviderResource, RolePolicyResource, RoleResource};
use crate::runtime::{Runtime, optional_env};
use crate::sigv4::Credentials;

pub const ENV_ENDPOINT: &str = "RGW_ENDPOINT";
pub const ENV_ACCESS_KEY: &str = "RGW_ACCESS_KEY";
pub const ENV_SECRET_KEY: &str = "RGW_SECRET_KEY";
pub const ENV_CA_FILE: &str = "RGW_CA_FILE";
pub const ENV_INSECURE: &str = "RGW_INSECURE";

#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Base URL of the RadosGW admin endpoint.
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    /// PEM bundle with additional trusted roots.
    pub ca_file: Option<PathBuf>,
    /// Skip TLS certificate verification.
    pub insecure: bool,
    pub request_timeout: Option<Duration>,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("ca_file", &self.ca_file)
            .field("insecure", &self.insecure)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Accepts the usual spellings of a true flag.
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Settings given on the command line. Each unset one falls back to its
/// `RGW_*` environment variable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub ca_file: Option<PathBuf>,
    pub insecure: bool,
    pub request_timeout: Option<Duration>,
}

impl ProviderConfig {
    /// Builds the configuration from `overrides`, reading anything missing
    /// from the environment through `runtime`.
    pub fn load(runtime: &dyn Runtime, overrides: &ConfigOverrides) -> Result<Self> {
        let required = |value: &Option<String>, flag: &str, key: &str| {
            value
                .clone()
                .or_else(|| optional_env(runtime, key))
                .with_context(|| format!("--{} or {} is required", flag, key))
        };

        let config = Self {
            endpoint: required(&overrides.endpoint, "endpoint", ENV_ENDPOINT)?,
            access_key: required(&overrides.access_key, "access-key", ENV_ACCESS_KEY)?,
            secret_key: required(&overrides.secret_key, "secret-key", ENV_SECRET_KEY)?,
            ca_file: overrides
                .ca_file
                .clone()
                .or_else(|| optional_env(runtime, ENV_CA_FILE).map(PathBuf::from)),
            insecure: overrides.insecure
                || optional_env(runtime, ENV_INSECURE).is_some_and(|v| parse_flag(&v)),
            request_timeout: overrides.request_timeout,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let endpoint = Url::parse(&self.endpoint)
            .with_context(|| format!("Invalid endpoint URL: {}", self.endpoint))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            bail!("Endpoint must use http or https, got {}", self.endpoint);
        }
        if self.access_key.trim().is_empty() {
            bail!("Access key must not be empty");
        }
        if self.secret_key.trim().is_empty() {
            bail!("Secret key must not be empty");
        }
        if self.request_timeout == Some(Duration::ZERO) {
            bail!("Request timeout must be greater than zero");
        }
        Ok(())
    }

    fn masked_access_key(&self) -> String {
        let key = &self.access_key;
        if key.len() > 8 && key.is_ascii() {
            format!("{}****{}", &key[..4], &key[key.len() - 4..])
        } else {
            "****".to_string()
        }
    }
}

/// Configured client plus process-wide shared state. Built once, then only
/// read.
#[derive(Debug, Clone)]
pub struct Provider {
    config: ProviderConfig,
    client: IamClient,
    key_locks: KeyCreationLocks,
}

impl Provider {
    /// Validates `config`, loads the CA bundle through `runtime` and builds the
    /// HTTP stack.
    pub fn configure(runtime: &dyn Runtime, config: ProviderConfig) -> Result<Self> {
        config.validate()?;

        let ca_pem = match &config.ca_file {
            Some(path) => {
                debug!("Loading CA bundle from {}", path.display());
                Some(
                    runtime
                        .read(path)
                        .with_context(|| format!("Failed to load CA file {}", path.display()))?,
                )
            }
            None => None,
        };
        if config.insecure {
            warn!("TLS certificate verification is disabled");
        }

        let tls = TlsOptions {
            ca_pem,
            insecure_skip_verify: config.insecure,
        };
        let transport = ReqwestTransport::new(&tls, config.request_timeout)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Builds a provider on top of an existing transport.
    pub fn with_transport(config: ProviderConfig, transport: Arc<dyn HttpTransport>) -> Result<Self> {
        config.validate()?;
        debug!(
            "Using endpoint {} with access key {}",
            config.endpoint,
            config.masked_access_key()
        );
        let credentials = Credentials::new(config.access_key.as_str(), config.secret_key.as_str());
        let client = IamClient::new(&config.endpoint, credentials, transport)?;
        Ok(Self {
            config,
            client,
            key_locks: KeyCreationLocks::new(),
        })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn client(&self) -> &IamClient {
        &self.client
    }

    pub fn oidc_providers(&self) -> OidcProviderResource {
        OidcProviderResource::new(self.client.clone())
    }

    pub fn roles(&self) -> RoleResource {
        RoleResource::new(self.client.clone())
    }

    pub fn role_policies(&self) -> RolePolicyResource {
        RolePolicyResource::new(self.client.clone())
    }

    /// Registry shared by every key-creating operation of this provider.
    pub fn key_locks(&self) -> &KeyCreationLocks {
        &self.key_locks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;
    use mockall::predicate::eq;
    use std::path::Path;

    fn config() -> ProviderConfig {
        ProviderConfig {
            endpoint: "http://rgw.local:8000".into(),
            access_key: "AKIAEXAMPLEKEY".into(),
            secret_key: "SECRET".into(),
            ca_file: None,
            insecure: false,
            request_timeout: None,
        }
    }

    /// Mock runtime answering `vars` and reporting everything else unset.
    fn env_runtime(vars: &'static [(&'static str, &'static str)]) -> MockRuntime {
        let mut runtime = MockRuntime::new();
        runtime.expect_env_var().returning(move |key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
                .ok_or(std::env::VarError::NotPresent)
        });
        runtime
    }

    #[test]
    fn test_load_from_env() {
        let runtime = env_runtime(&[
            (ENV_ENDPOINT, "https://rgw.example.com"),
            (ENV_ACCESS_KEY, "AKID"),
            (ENV_SECRET_KEY, "SECRET"),
            (ENV_CA_FILE, "/etc/ssl/rgw.pem"),
            (ENV_INSECURE, "true"),
        ]);

        let config = ProviderConfig::load(&runtime, &ConfigOverrides::default()).unwrap();
        assert_eq!(config.endpoint, "https://rgw.example.com");
        assert_eq!(config.access_key, "AKID");
        assert_eq!(config.ca_file.as_deref(), Some(Path::new("/etc/ssl/rgw.pem")));
        assert!(config.insecure);
        assert_eq!(config.request_timeout, None);
    }

    #[test]
    fn test_load_flags_win_over_env() {
        let runtime = env_runtime(&[
            (ENV_ENDPOINT, "https://rgw.example.com"),
            (ENV_ACCESS_KEY, "AKID"),
            (ENV_SECRET_KEY, "SECRET"),
        ]);
        let overrides = ConfigOverrides {
            endpoint: Some("http://rgw.local:8000".into()),
            access_key: Some("OTHER".into()),
            request_timeout: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        let config = ProviderConfig::load(&runtime, &overrides).unwrap();
        assert_eq!(config.endpoint, "http://rgw.local:8000");
        assert_eq!(config.access_key, "OTHER");
        assert_eq!(config.secret_key, "SECRET");
        assert_eq!(config.ca_file, None);
        assert!(!config.insecure);
        assert_eq!(config.request_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_load_requires_credentials() {
        let runtime = env_runtime(&[(ENV_ENDPOINT, "https://rgw.example.com")]);
        let err = ProviderConfig::load(&runtime, &ConfigOverrides::default()).unwrap_err();
        assert_eq!(err.to_string(), "--access-key or RGW_ACCESS_KEY is required");
    }

    #[test]
    fn test_validate() {
        assert!(config().validate().is_ok());

        let mut bad = config();
        bad.endpoint = "ftp://rgw.local".into();
        assert!(bad.validate().is_err());

        let mut bad = config();
        bad.secret_key = "  ".into();
        assert!(bad.validate().is_err());

        let mut bad = config();
        bad.request_timeout = Some(Duration::ZERO);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_parse_flag() {
        for value in ["1", "true", "TRUE", "yes", "on"] {
            assert!(parse_flag(value), "{}", value);
        }
        for value in ["0", "false", "no", ""] {
            assert!(!parse_flag(value), "{}", value);
        }
    }

    #[test]
    fn test_debug_redacts_secret() {
        let debug = format!("{:?}", config());
        assert!(!debug.contains("SECRET"));
        assert_eq!(config().masked_access_key(), "AKIA****EKEY");
    }

    #[tokio::test]
    async fn test_configure_without_ca() {
        let runtime = MockRuntime::new();
        let provider = Provider::configure(&runtime, config()).unwrap();
        assert_eq!(provider.client().endpoint().as_str(), "http://rgw.local:8000/");
        assert!(provider.key_locks().is_empty());
    }

    #[tokio::test]
    async fn test_configure_reads_ca_through_runtime() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_read()
            .with(eq(Path::new("/etc/ssl/rgw.pem")))
            .times(1)
            .returning(|_| Ok(b"not a certificate".to_vec()));

        let mut config = config();
        config.ca_file = Some(PathBuf::from("/etc/ssl/rgw.pem"));
        assert!(Provider::configure(&runtime, config).is_err());
    }

    #[tokio::test]
    async fn test_configure_missing_ca_file() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_read()
            .returning(|_| Err(anyhow::anyhow!("No such file or directory")));

        let mut config = config();
        config.ca_file = Some(PathBuf::from("/missing.pem"));
        let err = Provider::configure(&runtime, config).unwrap_err();
        assert!(err.to_string().contains("Failed to load CA file /missing.pem"));
    }

    #[tokio::test]
    async fn test_clones_share_key_locks() {
        let provider = Provider::configure(&MockRuntime::new(), config()).unwrap();
        let clone = provider.clone();

        let _guard = provider.key_locks().acquire("alice").await;
        assert_eq!(clone.key_locks().len(), 1);
    }
}
