use model::codec;
use model::domain::requirements::RequirementsError;

use crate::config;
use crate::state_machine::{State, Transition};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(
        "call() cannot be executed, the device runtime has not been \
         initialised"
    )]
    NotInitialised,
    #[error("Invalid requirements: {0}")]
    Requirements(#[from] RequirementsError),
    #[error("Failed to decode the result: {0}")]
    Codec(#[from] codec::Error),
    #[error(transparent)]
    Config(#[from] config::Error),
    #[error("Failed to build the HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("Transition {transition:?} is not allowed from {state:?}")]
    TransitionRefused { transition: Transition, state: State },
}
