use std::error::Error as StdError;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use helper::reqwest_helper::deserialize_response;
use model::codec;
use model::domain::execution::ExecutionResult;
use model::dto::edge::{DeviceMetrics, ExecResponse, ExecutionMode};
use model::{AppRequirementsId, FunctionId, Token};
use reqwest::Response;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, instrument, trace, warn};

use crate::configuration::HttpClient;
use crate::Error;

/// Runs uploaded functions on the edge cluster assigned to the device.
#[async_trait]
pub trait EdgeClusterClient: Debug + Sync + Send {
    /// Execute a function previously uploaded to the frontend. Each
    /// argument is serialized on its own.
    async fn execute_function(
        &mut self,
        function_id: FunctionId,
        app_req_id: AppRequirementsId,
        mode: ExecutionMode,
        args: &[Value],
    ) -> ExecutionResult;

    /// Push device telemetry, best effort.
    async fn send_metrics(&mut self, metrics: &DeviceMetrics) -> bool;

    fn address(&self) -> Option<&str>;

    fn has_connection(&self) -> bool;
}

#[derive(Debug)]
pub struct EdgeClusterClientImpl {
    token:           Option<Token>,
    address:         Option<String>,
    client:          Arc<HttpClient>,
    /// Skips certificate verification, edge clusters may serve self-signed
    /// certificates
    insecure_client: Arc<HttpClient>,
    connected:       bool,
}

/// Whether a transport error comes from the verification of the server
/// certificate.
pub fn is_certificate_error(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(err) = current {
        if err.to_string().to_lowercase().contains("certificate") {
            return true;
        }
        current = err.source();
    }
    false
}

impl EdgeClusterClientImpl {
    /// A handle missing either the token or the address is disconnected
    /// from the start.
    pub fn new(
        token: Option<Token>,
        address: Option<String>,
        client: Arc<HttpClient>,
        insecure_client: Arc<HttpClient>,
    ) -> Self {
        if token.is_none() {
            debug!("No token for the edge cluster client");
        }
        if address.is_none() {
            debug!("No address for the edge cluster client");
        }
        let connected = token.is_some() && address.is_some();
        Self { token, address, client, insecure_client, connected }
    }

    fn target(&self, path: &str) -> Result<(String, &Token), Error> {
        let address = self.address.as_ref().ok_or(Error::MissingAddress)?;
        let token = self.token.as_ref().ok_or(Error::MissingToken)?;
        Ok((format!("{}{}", address, path), token))
    }

    async fn post<T: Serialize + ?Sized>(
        client: &HttpClient,
        uri: &str,
        token: &Token,
        query: &[(&str, String)],
        body: &T,
    ) -> Result<Response, reqwest_middleware::Error> {
        client
            .post(uri)
            .header("token", token.as_str())
            .query(query)
            .json(body)
            .send()
            .await
    }

    /// Send, then retry once without verifying the certificate if that is
    /// what failed.
    async fn post_with_fallback<T: Serialize + ?Sized>(
        &self,
        path: &str,
        query: &[(&str, String)],
        body: &T,
    ) -> Result<Response, Error> {
        let (uri, token) = self.target(path)?;
        trace!("Requesting {}", uri);

        match Self::post(&self.client, &uri, token, query, body).await {
            Err(err) if is_certificate_error(&err) => {
                warn!(
                    "Certificate verification failed for {}, retrying \
                     without verification",
                    uri
                );
                Ok(Self::post(&self.insecure_client, &uri, token, query, body)
                    .await?)
            }
            res => Ok(res?),
        }
    }

    async fn try_execute(
        &self,
        function_id: FunctionId,
        app_req_id: AppRequirementsId,
        mode: ExecutionMode,
        args: &[Value],
    ) -> Result<ExecResponse, Error> {
        let params = args
            .iter()
            .map(|arg| codec::serialize(arg))
            .collect::<Result<Vec<_>, _>>()?;
        let query = [
            ("app_req_id", app_req_id.to_string()),
            ("mode", mode.as_str().to_string()),
        ];

        let response = self
            .post_with_fallback(
                &format!("/v1/functions/{}/execute", function_id),
                &query,
                &params,
            )
            .await?;

        if !response.status().is_success() {
            return Err(Error::from_response(response).await);
        }
        Ok(deserialize_response(response).await?)
    }

    fn record(&mut self, operation: &str, err: &Error) {
        if err.is_connectivity() || matches!(err, Error::MissingAddress) {
            self.connected = false;
        }
        error!("Edge cluster {} failed: {}", operation, err);
    }
}

#[async_trait]
impl EdgeClusterClient for EdgeClusterClientImpl {
    #[instrument(level = "trace", skip(self, args))]
    async fn execute_function(
        &mut self,
        function_id: FunctionId,
        app_req_id: AppRequirementsId,
        mode: ExecutionMode,
        args: &[Value],
    ) -> ExecutionResult {
        debug!("Executing function {}", function_id);
        match self.try_execute(function_id, app_req_id, mode, args).await {
            Ok(response) => {
                self.connected = true;
                debug!("Result obtained for function {}", function_id);
                ExecutionResult::from(response)
            }
            Err(err) => {
                self.record("execution", &err);
                ExecutionResult::Failure(err.to_string())
            }
        }
    }

    #[instrument(level = "trace", skip(self))]
    async fn send_metrics(&mut self, metrics: &DeviceMetrics) -> bool {
        let res = match self
            .post_with_fallback("/v1/device_metrics", &[], metrics)
            .await
        {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => Err(Error::from_response(response).await),
            Err(err) => Err(err),
        };

        match res {
            Ok(()) => {
                self.connected = true;
                true
            }
            Err(err) => {
                self.record("metrics push", &err);
                false
            }
        }
    }

    fn address(&self) -> Option<&str> { self.address.as_deref() }

    fn has_connection(&self) -> bool { self.connected }
}

#[cfg(test)]
mod tests {
    use std::fmt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use anyhow::Result;
    use emulation::{Counters, Emulator};
    use http::Extensions;
    use model::domain::function::OffloadFunction;
    use model::domain::requirements::SchedulingRequirements;
    use reqwest::Request;
    use reqwest_middleware::{ClientBuilder, Middleware, Next};
    use serde_json::json;
    use yare::parameterized;

    use super::*;
    use crate::configuration::{build_http_client, Configuration};
    use crate::frontend::{FrontendClient, FrontendClientImpl};

    #[derive(Debug)]
    struct Layer {
        message: &'static str,
        source:  Option<Box<Layer>>,
    }

    impl fmt::Display for Layer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.message)
        }
    }

    impl StdError for Layer {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            self.source.as_deref().map(|source| source as _)
        }
    }

    fn chain(messages: &[&'static str]) -> Option<Box<Layer>> {
        messages.iter().rev().fold(None, |source, &message| {
            Some(Box::new(Layer { message, source }))
        })
    }

    #[parameterized(
        outermost = {&["invalid peer certificate: UnknownIssuer"], true},
        nested = {&["error sending request", "client error (Connect)", "certificate verify failed"], true},
        refused = {&["error sending request", "Connection refused (os error 111)"], false},
        timeout = {&["operation timed out"], false},
    )]
    fn test_certificate_error_detection(
        messages: &[&'static str],
        expected: bool,
    ) {
        let err = chain(messages).expect("at least one layer");
        assert_eq!(is_certificate_error(&*err), expected);
    }

    struct Session {
        emulator:   Emulator,
        token:      Token,
        app_req_id: AppRequirementsId,
        mult:       FunctionId,
        http:       Arc<HttpClient>,
    }

    async fn session() -> Result<Session> {
        let emulator = Emulator::builder()
            .with_function("mult", |args| {
                match (args[0].as_i64(), args[1].as_i64()) {
                    (Some(a), Some(b)) => Ok(json!(a * b)),
                    _ => Err("can't multiply sequence by non-int".to_string()),
                }
            })
            .start()
            .await?;
        let http = Arc::new(build_http_client(Duration::from_secs(5), false)?);

        let configuration = Configuration::new(emulator.base_url())
            .with_basic_auth(
                emulator.username(),
                Some(emulator.password().to_string()),
            );
        let mut frontend = FrontendClientImpl::new(configuration, http.clone());
        let token = frontend.authenticate().await.expect("token");
        assert!(
            frontend
                .submit_requirements(&token, &SchedulingRequirements::default())
                .await
        );
        let app_req_id = frontend.app_requirements_id().expect("document");
        let mult = frontend
            .upload_function(&codec::serialize_function(
                &OffloadFunction::python("mult", &["a", "b"], "return a * b"),
            )?)
            .await
            .expect("function id");

        Ok(Session { emulator, token, app_req_id, mult, http })
    }

    fn edge(
        session: &Session,
        address: Option<String>,
    ) -> EdgeClusterClientImpl {
        EdgeClusterClientImpl::new(
            Some(session.token.clone()),
            address,
            session.http.clone(),
            session.http.clone(),
        )
    }

    #[tokio::test]
    async fn test_execute_function() -> Result<()> {
        let session = session().await?;
        let mut client =
            edge(&session, Some(session.emulator.base_url().to_string()));
        assert!(client.has_connection());

        let res = client
            .execute_function(
                session.mult,
                session.app_req_id,
                ExecutionMode::Sync,
                &[json!(2), json!(3)],
            )
            .await;

        let ExecutionResult::Success(blob) = &res else {
            panic!("unexpected result {:?}", res);
        };
        assert_eq!(codec::deserialize::<i64>(blob)?, 6);
        assert!(client.has_connection());
        session.emulator.stop().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_argument_is_a_failure() -> Result<()> {
        let session = session().await?;
        let mut client =
            edge(&session, Some(session.emulator.base_url().to_string()));

        let res = client
            .execute_function(
                session.mult,
                session.app_req_id,
                ExecutionMode::Sync,
                &[json!("x")],
            )
            .await;

        assert_eq!(
            res,
            ExecutionResult::failure(
                "mult() missing 1 required positional argument: 'b'"
            )
        );
        // The cluster answered, the session is still sound
        assert!(client.has_connection());
        session.emulator.stop().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_unauthorized_disconnects() -> Result<()> {
        let session = session().await?;
        let mut client =
            edge(&session, Some(session.emulator.base_url().to_string()));
        session.emulator.faults().executions.store(1, Ordering::SeqCst);

        let res = client
            .execute_function(
                session.mult,
                session.app_req_id,
                ExecutionMode::Sync,
                &[json!(2), json!(3)],
            )
            .await;

        assert!(!res.is_success());
        assert!(!client.has_connection());
        session.emulator.stop().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_without_address() -> Result<()> {
        let session = session().await?;
        let mut client = edge(&session, None);
        assert!(!client.has_connection());

        let res = client
            .execute_function(
                session.mult,
                session.app_req_id,
                ExecutionMode::Sync,
                &[json!(2), json!(3)],
            )
            .await;

        assert!(!res.is_success());
        assert!(!client.has_connection());
        assert_eq!(Counters::get(&session.emulator.counters().execute), 0);
        session.emulator.stop().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_unreachable_cluster() -> Result<()> {
        let session = session().await?;
        let mut client = edge(&session, Some("http://127.0.0.1:1".to_string()));

        let res = client
            .execute_function(
                session.mult,
                session.app_req_id,
                ExecutionMode::Sync,
                &[json!(2), json!(3)],
            )
            .await;

        assert!(!res.is_success());
        assert!(!client.has_connection());
        session.emulator.stop().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_send_metrics() -> Result<()> {
        let session = session().await?;
        let mut client =
            edge(&session, Some(session.emulator.base_url().to_string()));

        let metrics = DeviceMetrics {
            geolocation: Some("IKERLAN ARRASATE/MONDRAGON 20500".to_string()),
            latency:     Some(12.5),
        };
        assert!(client.send_metrics(&metrics).await);
        assert_eq!(
            Counters::get(&session.emulator.counters().device_metrics),
            1
        );
        session.emulator.stop().await;
        Ok(())
    }

    /// Fails every request with `message`.
    struct Refuse {
        message: &'static str,
        calls:   Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Middleware for Refuse {
        async fn handle(
            &self,
            _req: Request,
            _extensions: &mut Extensions,
            _next: Next<'_>,
        ) -> reqwest_middleware::Result<Response> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(reqwest_middleware::Error::middleware(Layer {
                message: self.message,
                source:  None,
            }))
        }
    }

    struct Count(Arc<AtomicUsize>);

    #[async_trait]
    impl Middleware for Count {
        async fn handle(
            &self,
            req: Request,
            extensions: &mut Extensions,
            next: Next<'_>,
        ) -> reqwest_middleware::Result<Response> {
            self.0.fetch_add(1, Ordering::SeqCst);
            next.run(req, extensions).await
        }
    }

    fn with_middleware(middleware: impl Middleware) -> Arc<HttpClient> {
        Arc::new(
            ClientBuilder::new(reqwest::Client::new())
                .with(middleware)
                .build(),
        )
    }

    /// Returns the verified and the insecure request counts.
    async fn execute_through(
        session: &Session,
        verified_error: &'static str,
    ) -> (EdgeClusterClientImpl, ExecutionResult, usize, usize) {
        let verified = Arc::new(AtomicUsize::new(0));
        let insecure = Arc::new(AtomicUsize::new(0));
        let mut client = EdgeClusterClientImpl::new(
            Some(session.token.clone()),
            Some(session.emulator.base_url().to_string()),
            with_middleware(Refuse {
                message: verified_error,
                calls:   verified.clone(),
            }),
            with_middleware(Count(insecure.clone())),
        );

        let res = client
            .execute_function(
                session.mult,
                session.app_req_id,
                ExecutionMode::Sync,
                &[json!(2), json!(3)],
            )
            .await;
        let verified = verified.load(Ordering::SeqCst);
        let insecure = insecure.load(Ordering::SeqCst);
        (client, res, verified, insecure)
    }

    #[tokio::test]
    async fn test_certificate_failure_retried_once_insecurely() -> Result<()> {
        let session = session().await?;

        let (client, res, verified, insecure) = execute_through(
            &session,
            "invalid peer certificate: UnknownIssuer",
        )
        .await;

        let ExecutionResult::Success(blob) = &res else {
            panic!("unexpected result {:?}", res);
        };
        assert_eq!(codec::deserialize::<i64>(blob)?, 6);
        assert_eq!(verified, 1);
        assert_eq!(insecure, 1);
        assert_eq!(Counters::get(&session.emulator.counters().execute), 1);
        assert!(client.has_connection());
        session.emulator.stop().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_refused_connection_is_not_retried() -> Result<()> {
        let session = session().await?;

        let (client, res, verified, insecure) = execute_through(
            &session,
            "Connection refused (os error 111)",
        )
        .await;

        assert!(!res.is_success());
        assert_eq!(verified, 1);
        assert_eq!(insecure, 0);
        assert_eq!(Counters::get(&session.emulator.counters().execute), 0);
        assert!(!client.has_connection());
        session.emulator.stop().await;
        Ok(())
    }
}
