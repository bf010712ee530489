//! HTTP clients of the two services a device talks to: the frontend that
//! schedules it and the edge cluster that runs its functions.
//!
//! Neither client reports failures as errors to its caller. Every request
//! updates a connectivity flag instead, read back with `has_connection`.

use helper::reqwest_helper::ResponseError;
use model::domain::requirements::RequirementsError;

pub mod configuration;
pub mod edge_cluster;
pub mod frontend;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error(transparent)]
    ReqwestMiddleware(#[from] reqwest_middleware::Error),
    #[error(transparent)]
    Response(#[from] ResponseError),
    #[error("The request failed with {0}")]
    RequestStatus(String),
    #[error("No token, authenticate first")]
    MissingToken,
    #[error("No requirements document has been created yet")]
    MissingRequirementsId,
    #[error(transparent)]
    Requirements(#[from] RequirementsError),
    #[error("The frontend did not assign any edge cluster")]
    NoEdgeCluster,
    #[error("The assigned edge cluster has no frontend address")]
    NoEdgeClusterAddress,
    #[error("No edge cluster address to send the request to")]
    MissingAddress,
    #[error(transparent)]
    Codec(#[from] model::codec::Error),
}

impl Error {
    /// Whether the error says something about the reachability of the
    /// remote service, as opposed to a request refused before being sent.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            Error::Reqwest(_)
                | Error::ReqwestMiddleware(_)
                | Error::RequestStatus(_)
                | Error::Response(ResponseError::Body(_))
        )
    }

    /// Turn an unsuccessful response into an error, keeping what the server
    /// had to say about it.
    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        Error::RequestStatus(
            helper::reqwest_helper::describe_response(response).await,
        )
    }
}
