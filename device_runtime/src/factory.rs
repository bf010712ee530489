use std::fmt::Debug;
use std::sync::Arc;

use cognit_api::configuration::{build_http_client, Configuration, HttpClient};
use cognit_api::edge_cluster::{EdgeClusterClient, EdgeClusterClientImpl};
use cognit_api::frontend::{FrontendClient, FrontendClientImpl};
use model::Token;

use crate::config::RuntimeConfig;
use crate::Error;

/// Hands out new client handles each time the session starts over.
pub trait ClientFactory: Debug + Sync + Send {
    fn frontend(&self) -> Box<dyn FrontendClient>;

    fn edge(
        &self,
        token: Option<Token>,
        address: Option<String>,
    ) -> Box<dyn EdgeClusterClient>;
}

/// Every handle shares the same connection pools.
#[derive(Debug)]
pub struct HttpClientFactory {
    configuration:   Configuration,
    client:          Arc<HttpClient>,
    insecure_client: Arc<HttpClient>,
}

impl HttpClientFactory {
    pub fn new(config: &RuntimeConfig) -> Result<Self, Error> {
        let configuration =
            Configuration::new(config.frontend_endpoint.as_ref())
                .with_basic_auth(
                    config.credentials.username(),
                    Some(config.credentials.password().to_string()),
                );
        let timeout = config.request_timeout();

        Ok(Self {
            configuration,
            client: Arc::new(build_http_client(timeout, false)?),
            insecure_client: Arc::new(build_http_client(timeout, true)?),
        })
    }
}

impl ClientFactory for HttpClientFactory {
    fn frontend(&self) -> Box<dyn FrontendClient> {
        Box::new(FrontendClientImpl::new(
            self.configuration.clone(),
            self.client.clone(),
        ))
    }

    fn edge(
        &self,
        token: Option<Token>,
        address: Option<String>,
    ) -> Box<dyn EdgeClusterClient> {
        Box::new(EdgeClusterClientImpl::new(
            token,
            address,
            self.client.clone(),
            self.insecure_client.clone(),
        ))
    }
}
