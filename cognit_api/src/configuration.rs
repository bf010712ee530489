use std::time::Duration;

use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
#[cfg(feature = "jaeger")]
use reqwest_tracing::TracingMiddleware;

pub type HttpClient = ClientWithMiddleware;

pub type BasicAuth = (String, Option<String>);

/// Where the frontend lives and who the device is to it.
#[derive(Clone, Debug)]
pub struct Configuration {
    pub base_path:  String,
    pub basic_auth: Option<BasicAuth>,
}

impl Configuration {
    pub fn new(base_path: impl Into<String>) -> Self {
        Self {
            base_path:  base_path.into().trim_end_matches('/').to_string(),
            basic_auth: None,
        }
    }

    pub fn with_basic_auth(
        mut self,
        username: impl Into<String>,
        password: Option<String>,
    ) -> Self {
        self.basic_auth = Some((username.into(), password));
        self
    }
}

/// Build the client shared by every handle of a session.
///
/// `accept_invalid_certs` is only meant for the fallback towards edge
/// clusters serving self-signed certificates.
pub fn build_http_client(
    timeout: Duration,
    accept_invalid_certs: bool,
) -> Result<HttpClient, reqwest::Error> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .danger_accept_invalid_certs(accept_invalid_certs)
        .build()?;

    #[cfg(feature = "jaeger")]
    let client =
        ClientBuilder::new(client).with(TracingMiddleware::default()).build();

    #[cfg(not(feature = "jaeger"))]
    let client = ClientBuilder::new(client).build();

    Ok(client)
}
