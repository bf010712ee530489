use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use helper::reqwest_helper::deserialize_response;
use model::codec::SerializedFunction;
use model::domain::requirements::SchedulingRequirements;
use model::dto::frontend::{EdgeClusterFrontendResponse, UploadFunctionDaaS};
use model::{AppRequirementsId, FunctionId, Token};
use reqwest::StatusCode;
use tracing::{debug, error, instrument, trace, warn};

use crate::configuration::{Configuration, HttpClient};
use crate::Error;

/// Session with the frontend scheduling service.
///
/// A handle starts disconnected and only becomes connected once it has
/// authenticated. Every operation that reaches the network records whether
/// the frontend answered positively.
#[async_trait]
pub trait FrontendClient: Debug + Sync + Send {
    /// Exchange the configured credentials for a token.
    async fn authenticate(&mut self) -> Option<Token>;

    fn set_token(&mut self, token: Token);

    /// Create the requirements document, or replace it when this handle
    /// already created one.
    async fn submit_requirements(
        &mut self,
        token: &Token,
        requirements: &SchedulingRequirements,
    ) -> bool;

    async fn read_requirements(&mut self) -> Option<SchedulingRequirements>;

    async fn update_requirements(
        &mut self,
        requirements: &SchedulingRequirements,
    ) -> bool;

    async fn delete_requirements(&mut self) -> bool;

    /// Address of the edge cluster the frontend assigned to the device.
    async fn resolve_cluster_address(&mut self) -> Option<String>;

    /// Upload a function, or return the id it got on a previous upload
    /// through this handle.
    async fn upload_function(
        &mut self,
        function: &SerializedFunction,
    ) -> Option<FunctionId>;

    fn app_requirements_id(&self) -> Option<AppRequirementsId>;

    fn has_connection(&self) -> bool;
}

#[derive(Debug)]
pub struct FrontendClientImpl {
    configuration: Configuration,
    client:        Arc<HttpClient>,
    token:         Option<Token>,
    app_req_id:    Option<AppRequirementsId>,
    uploaded:      HashMap<String, FunctionId>,
    connected:     bool,
}

impl FrontendClientImpl {
    pub fn new(configuration: Configuration, client: Arc<HttpClient>) -> Self {
        Self {
            configuration,
            client,
            token: None,
            app_req_id: None,
            uploaded: HashMap::new(),
            connected: false,
        }
    }

    /// Number of functions whose remote id is memoized.
    pub fn uploaded_count(&self) -> usize { self.uploaded.len() }

    fn token(&self) -> Result<&Token, Error> {
        self.token.as_ref().ok_or(Error::MissingToken)
    }

    fn requirements_uri(&self) -> Result<String, Error> {
        let id = self.app_req_id.ok_or(Error::MissingRequirementsId)?;
        Ok(format!(
            "{}/v1/app_requirements/{}",
            self.configuration.base_path, id
        ))
    }

    /// Keep the value of a request and note whether the frontend could be
    /// reached; errors raised before sending anything leave the flag alone.
    fn record<T>(
        &mut self,
        operation: &str,
        res: Result<T, Error>,
    ) -> Option<T> {
        match res {
            Ok(value) => {
                self.connected = true;
                Some(value)
            }
            Err(err) => {
                if err.is_connectivity() {
                    self.connected = false;
                }
                warn!("Frontend {} failed: {}", operation, err);
                None
            }
        }
    }

    async fn try_authenticate(&self) -> Result<Token, Error> {
        let uri = format!("{}/v1/authenticate", self.configuration.base_path);
        trace!("Requesting {}", uri);

        let mut builder = self.client.post(&uri);
        if let Some((username, password)) = &self.configuration.basic_auth {
            debug!("Requesting token for {}", username);
            builder = builder.basic_auth(username, password.as_ref());
        }

        let response = builder.send().await?;
        match response.status() {
            StatusCode::OK | StatusCode::CREATED => {
                Ok(deserialize_response(response).await?)
            }
            _ => Err(Error::from_response(response).await),
        }
    }

    async fn try_create_requirements(
        &self,
        requirements: &SchedulingRequirements,
    ) -> Result<AppRequirementsId, Error> {
        let uri =
            format!("{}/v1/app_requirements", self.configuration.base_path);
        trace!("Requesting {}", uri);

        let response = self
            .client
            .post(&uri)
            .header("token", self.token()?.as_str())
            .json(requirements)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(Error::from_response(response).await);
        }
        Ok(deserialize_response(response).await?)
    }

    async fn try_update_requirements(
        &self,
        requirements: &SchedulingRequirements,
    ) -> Result<(), Error> {
        let uri = self.requirements_uri()?;
        trace!("Requesting {}", uri);

        let response = self
            .client
            .put(&uri)
            .header("token", self.token()?.as_str())
            .json(requirements)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(Error::from_response(response).await);
        }
        Ok(())
    }

    async fn try_read_requirements(
        &self,
    ) -> Result<SchedulingRequirements, Error> {
        let uri = self.requirements_uri()?;
        trace!("Requesting {}", uri);

        let response = self
            .client
            .get(&uri)
            .header("token", self.token()?.as_str())
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(Error::from_response(response).await);
        }
        Ok(deserialize_response(response).await?)
    }

    async fn try_delete_requirements(&self) -> Result<(), Error> {
        let uri = self.requirements_uri()?;
        trace!("Requesting {}", uri);

        let response = self
            .client
            .delete(&uri)
            .header("token", self.token()?.as_str())
            .send()
            .await?;

        if response.status() != StatusCode::NO_CONTENT {
            return Err(Error::from_response(response).await);
        }
        Ok(())
    }

    async fn try_resolve_cluster_address(&self) -> Result<String, Error> {
        let uri = format!("{}/ec_fe", self.requirements_uri()?);
        trace!("Requesting {}", uri);

        let response = self
            .client
            .get(&uri)
            .header("token", self.token()?.as_str())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::from_response(response).await);
        }
        let clusters: Vec<EdgeClusterFrontendResponse> =
            deserialize_response(response).await?;

        // The frontend ranks the clusters, the first one is the best fit
        let cluster = clusters.first().ok_or(Error::NoEdgeCluster)?;
        cluster
            .edge_cluster_address()
            .map(|address| address.trim_end_matches('/').to_string())
            .ok_or(Error::NoEdgeClusterAddress)
    }

    async fn try_upload_function(
        &self,
        function: &SerializedFunction,
    ) -> Result<FunctionId, Error> {
        let uri = format!("{}/v1/daas/upload", self.configuration.base_path);
        trace!("Requesting {}", uri);

        let body = UploadFunctionDaaS {
            lang:    function.language,
            fc:      function.blob.clone(),
            fc_hash: function.hash.clone(),
        };
        let response = self
            .client
            .post(&uri)
            .header("token", self.token()?.as_str())
            .json(&body)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(Error::from_response(response).await);
        }
        Ok(deserialize_response(response).await?)
    }
}

#[async_trait]
impl FrontendClient for FrontendClientImpl {
    #[instrument(level = "trace", skip(self))]
    async fn authenticate(&mut self) -> Option<Token> {
        let res = self.try_authenticate().await;
        let token = self.record("authentication", res)?;
        self.token = Some(token.clone());
        Some(token)
    }

    fn set_token(&mut self, token: Token) { self.token = Some(token); }

    #[instrument(level = "trace", skip(self))]
    async fn submit_requirements(
        &mut self,
        token: &Token,
        requirements: &SchedulingRequirements,
    ) -> bool {
        self.token = Some(token.clone());
        if let Err(err) = requirements.validate() {
            error!("Refusing to submit the requirements: {}", err);
            return false;
        }

        if self.app_req_id.is_some() {
            let res = self.try_update_requirements(requirements).await;
            return self.record("requirements update", res).is_some();
        }

        let res = self.try_create_requirements(requirements).await;
        match self.record("requirements creation", res) {
            Some(id) => {
                debug!("Requirements document {} created", id);
                self.app_req_id = Some(id);
                true
            }
            None => false,
        }
    }

    #[instrument(level = "trace", skip(self))]
    async fn read_requirements(&mut self) -> Option<SchedulingRequirements> {
        let res = self.try_read_requirements().await;
        self.record("requirements read", res)
    }

    #[instrument(level = "trace", skip(self))]
    async fn update_requirements(
        &mut self,
        requirements: &SchedulingRequirements,
    ) -> bool {
        if let Err(err) = requirements.validate() {
            error!("Refusing to update the requirements: {}", err);
            return false;
        }
        let res = self.try_update_requirements(requirements).await;
        self.record("requirements update", res).is_some()
    }

    #[instrument(level = "trace", skip(self))]
    async fn delete_requirements(&mut self) -> bool {
        let res = self.try_delete_requirements().await;
        if self.record("requirements deletion", res).is_none() {
            return false;
        }
        self.app_req_id = None;
        true
    }

    #[instrument(level = "trace", skip(self))]
    async fn resolve_cluster_address(&mut self) -> Option<String> {
        let res = self.try_resolve_cluster_address().await;
        self.record("edge cluster resolution", res)
    }

    #[instrument(
        level = "trace",
        skip(self, function),
        fields(hash = %function.hash)
    )]
    async fn upload_function(
        &mut self,
        function: &SerializedFunction,
    ) -> Option<FunctionId> {
        if let Some(id) = self.uploaded.get(&function.hash) {
            debug!("Function already uploaded as {}", id);
            return Some(*id);
        }

        let res = self.try_upload_function(function).await;
        let id = self.record("function upload", res)?;
        self.uploaded.insert(function.hash.clone(), id);
        Some(id)
    }

    fn app_requirements_id(&self) -> Option<AppRequirementsId> {
        self.app_req_id
    }

    fn has_connection(&self) -> bool { self.connected }
}
