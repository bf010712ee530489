use std::fmt;
use std::path::Path;
use std::time::Duration;

use helper::{env_load_opt, env_var};
use nutype::nutype;
use ron::extensions::Extensions;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

env_var!(CONFIG);
env_var!(COGNIT_FRONTEND_ENDPOINT);
env_var!(COGNIT_CREDENTIALS);

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to read the configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Error looking for the env variable: {0}")]
    Var(#[from] std::env::VarError),
    #[error("The configuration is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("The configuration is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("Failed to parse the configuration: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("Invalid frontend endpoint: {0:?}")]
    Endpoint(#[from] FrontendEndpointError),
    #[error("Invalid credentials, expected user:password: {0:?}")]
    Credentials(#[from] CredentialsError),
}

#[nutype(
    sanitize(trim),
    validate(
        not_empty,
        predicate = |endpoint| endpoint.starts_with("http://")
            || endpoint.starts_with("https://")
    ),
    derive(Debug, Clone, PartialEq, AsRef, Serialize, Deserialize)
)]
pub struct FrontendEndpoint(String);

/// `user:password`, the password itself may contain colons.
#[nutype(
    validate(predicate = |credentials| credentials
        .split_once(':')
        .map(|(user, _)| !user.is_empty())
        .unwrap_or(false)),
    derive(Clone, PartialEq, AsRef, Serialize, Deserialize)
)]
pub struct Credentials(String);

impl Credentials {
    pub fn username(&self) -> &str {
        self.as_ref().split_once(':').map(|(user, _)| user).unwrap_or_default()
    }

    pub fn password(&self) -> &str {
        self.as_ref()
            .split_once(':')
            .map(|(_, password)| password)
            .unwrap_or_default()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credentials({}:<redacted>)", self.username())
    }
}

fn default_request_timeout() -> u64 { 60 }

fn default_max_offload_rounds() -> usize { 16 }

/// How to reach the frontend scheduling service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub frontend_endpoint:  FrontendEndpoint,
    pub credentials:        Credentials,
    /// Seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout:    u64,
    /// Recovery rounds a single offload may spend before giving up
    #[serde(default = "default_max_offload_rounds")]
    pub max_offload_rounds: usize,
}

impl RuntimeConfig {
    pub fn new(
        frontend_endpoint: FrontendEndpoint,
        credentials: Credentials,
    ) -> Self {
        Self {
            frontend_endpoint,
            credentials,
            request_timeout: default_request_timeout(),
            max_offload_rounds: default_max_offload_rounds(),
        }
    }

    /// Validated fields are written as plain strings, not as
    /// `FrontendEndpoint("...")`.
    pub fn from_ron(config: &str) -> Result<Self, Error> {
        Ok(ron::Options::default()
            .with_default_extension(Extensions::UNWRAP_NEWTYPES)
            .from_str(config)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        debug!("Loading configuration from {}", path.display());
        let config = Self::from_ron(&std::fs::read_to_string(path)?)?;
        config.with_env_overrides()
    }

    /// Load the base64 encoded CONFIG env variable.
    pub fn from_env() -> Result<Self, Error> {
        let config = std::env::var(CONFIG)?;
        let config = base64::decode_config(
            config.trim(),
            base64::STANDARD.decode_allow_trailing_bits(true),
        )?;
        let config = Self::from_ron(&String::from_utf8(config)?)?;
        info!("Loaded config from CONFIG env variable.");
        config.with_env_overrides()
    }

    /// Let single fields be replaced without rewriting the whole file.
    pub fn with_env_overrides(mut self) -> Result<Self, Error> {
        if let Some(endpoint) =
            env_load_opt!(FrontendEndpoint, COGNIT_FRONTEND_ENDPOINT)
        {
            debug!("Frontend endpoint overridden by the environment");
            self.frontend_endpoint = endpoint;
        }
        if let Some(credentials) =
            env_load_opt!(Credentials, COGNIT_CREDENTIALS)
        {
            debug!("Credentials overridden by the environment");
            self.credentials = credentials;
        }
        Ok(self)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Mutex, MutexGuard};

    use anyhow::Result;
    use yare::parameterized;

    use super::*;

    static ENV: Mutex<()> = Mutex::new(());

    /// Held by every test going through `with_env_overrides`.
    fn env_lock() -> MutexGuard<'static, ()> {
        ENV.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    const CONFIG_RON: &str = r#"
        RuntimeConfig(
            frontend_endpoint: "https://cognit-lab-frontend.sovereignedge.eu",
            credentials: "device:pass:word",
        )
    "#;

    #[test]
    fn test_defaults() -> Result<()> {
        let config = RuntimeConfig::from_ron(CONFIG_RON)?;
        assert_eq!(
            config.frontend_endpoint.as_ref(),
            "https://cognit-lab-frontend.sovereignedge.eu"
        );
        assert_eq!(config.credentials.username(), "device");
        assert_eq!(config.credentials.password(), "pass:word");
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
        assert_eq!(config.max_offload_rounds, 16);
        Ok(())
    }

    #[parameterized(
        http = {"http://localhost:1338", true},
        https = {"  https://frontend.example  ", true},
        no_scheme = {"frontend.example:1338", false},
        empty = {"", false},
    )]
    fn test_frontend_endpoint(endpoint: &str, valid: bool) {
        assert_eq!(FrontendEndpoint::new(endpoint.to_string()).is_ok(), valid);
    }

    #[parameterized(
        regular = {"device:secret", true},
        empty_password = {"device:", true},
        no_separator = {"device", false},
        no_user = {":secret", false},
    )]
    fn test_credentials(credentials: &str, valid: bool) {
        assert_eq!(Credentials::new(credentials.to_string()).is_ok(), valid);
    }

    #[test]
    fn test_debug_hides_the_password() -> Result<()> {
        let credentials = Credentials::new("device:secret".to_string())?;
        assert_eq!(
            format!("{:?}", credentials),
            "Credentials(device:<redacted>)"
        );
        Ok(())
    }

    #[test]
    fn test_invalid_endpoint_in_file() {
        let res = RuntimeConfig::from_ron(
            r#"(frontend_endpoint: "ftp://nope", credentials: "a:b")"#,
        );
        assert!(res.is_err());
    }

    #[test]
    fn test_from_file() -> Result<()> {
        let _env = env_lock();
        let path = std::env::temp_dir()
            .join(format!("device_runtime_{}.ron", std::process::id()));
        std::fs::write(&path, CONFIG_RON)?;
        let config = RuntimeConfig::from_file(&path);
        std::fs::remove_file(&path)?;

        let config = config?;
        assert_eq!(config.max_offload_rounds, 16);
        assert_eq!(config.credentials.username(), "device");
        Ok(())
    }

    #[test]
    fn test_plain_strings_in_ron() -> Result<()> {
        let config = RuntimeConfig::from_ron(
            r#"(
                frontend_endpoint: "http://localhost:1338",
                credentials: "a:b",
                request_timeout: 5,
            )"#,
        )?;
        assert_eq!(config.frontend_endpoint.as_ref(), "http://localhost:1338");
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        Ok(())
    }

    #[test]
    fn test_from_env_with_overrides() -> Result<()> {
        let _env = env_lock();
        std::env::set_var(CONFIG, base64::encode(CONFIG_RON));
        std::env::set_var(COGNIT_CREDENTIALS, "other:secret");
        let config = RuntimeConfig::from_env();
        std::env::remove_var(CONFIG);
        std::env::remove_var(COGNIT_CREDENTIALS);

        let config = config?;
        assert_eq!(config.credentials.username(), "other");
        assert_eq!(
            config.frontend_endpoint.as_ref(),
            "https://cognit-lab-frontend.sovereignedge.eu"
        );
        Ok(())
    }
}
