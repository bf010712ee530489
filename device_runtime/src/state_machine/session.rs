use std::sync::Arc;

use cognit_api::edge_cluster::EdgeClusterClient;
use cognit_api::frontend::FrontendClient;
use model::codec::{self, SerializedFunction};
use model::domain::execution::ExecutionResult;
use model::domain::function::OffloadFunction;
use model::domain::requirements::SchedulingRequirements;
use model::dto::edge::{DeviceMetrics, ExecutionMode};
use model::Token;
use serde_json::Value;
use tracing::{debug, error, info, instrument, trace, warn};

use super::{select, Guards, State, Transition};
use crate::factory::ClientFactory;
use crate::Error;

/// Attempts allowed for each of the upload and address resolution steps.
pub const ATTEMPT_LIMIT: u32 = 3;

#[derive(Debug)]
pub struct DeviceRuntimeStateMachine {
    factory:               Arc<dyn ClientFactory>,
    state:                 State,
    token:                 Option<Token>,
    requirements:          Option<SchedulingRequirements>,
    requirements_changed:  bool,
    requirements_uploaded: bool,
    upload_attempts:       u32,
    address_attempts:      u32,
    cluster_address:       Option<String>,
    frontend:              Box<dyn FrontendClient>,
    edge:                  Box<dyn EdgeClusterClient>,
    max_offload_rounds:    usize,
}

impl DeviceRuntimeStateMachine {
    /// Build the session in [`State::Init`] and authenticate.
    pub async fn start(
        factory: Arc<dyn ClientFactory>,
        max_offload_rounds: usize,
    ) -> Self {
        debug!("Entering INIT state");
        let frontend = factory.frontend();
        let edge = factory.edge(None, None);
        let mut state_machine = Self {
            factory,
            state: State::Init,
            token: None,
            requirements: None,
            requirements_changed: false,
            requirements_uploaded: false,
            upload_attempts: 0,
            address_attempts: 0,
            cluster_address: None,
            frontend,
            edge,
            max_offload_rounds,
        };
        state_machine.authenticate().await;
        state_machine
    }

    pub fn state(&self) -> State { self.state }

    pub fn requirements(&self) -> Option<&SchedulingRequirements> {
        self.requirements.as_ref()
    }

    pub fn are_requirements_uploaded(&self) -> bool {
        self.requirements_uploaded
    }

    pub fn have_requirements_changed(&self) -> bool {
        self.requirements_changed
    }

    pub fn upload_attempts(&self) -> u32 { self.upload_attempts }

    pub fn address_attempts(&self) -> u32 { self.address_attempts }

    pub fn cluster_address(&self) -> Option<&str> {
        self.cluster_address.as_deref()
    }

    pub fn guards(&self) -> Guards {
        Guards {
            token_present:         self.token.is_some(),
            frontend_connected:    self.frontend.has_connection(),
            edge_connected:        self.edge.has_connection(),
            requirements_uploaded: self.requirements_uploaded,
            requirements_changed:  self.requirements_changed,
            upload_limit_reached:  self.upload_attempts == ATTEMPT_LIMIT,
            address_limit_reached: self.address_attempts == ATTEMPT_LIMIT,
        }
    }

    /// Take `transition` if its guard holds, running the entry action of
    /// the target state even when it is the current one.
    #[instrument(level = "trace", skip(self))]
    pub async fn fire(&mut self, transition: Transition) -> Result<(), Error> {
        let guards = self.guards();
        trace!("Guards: {:?}", guards);
        if transition.source() != self.state || !transition.allowed(&guards) {
            return Err(Error::TransitionRefused {
                transition,
                state: self.state,
            });
        }

        if transition.is_limit() {
            warn!("{:?}: too many attempts, starting over", transition);
            self.requirements = None;
        }
        debug!(
            "{:?}: {:?} -> {:?}",
            transition,
            self.state,
            transition.target()
        );
        self.enter(transition.target()).await;
        Ok(())
    }

    /// Fire a transition chosen by the caller, a refusal is only logged.
    async fn dispatch(&mut self, transition: Transition) {
        if let Err(err) = self.fire(transition).await {
            warn!("{}", err);
        }
    }

    async fn enter(&mut self, state: State) {
        self.state = state;
        match state {
            State::Init => self.on_enter_init().await,
            State::RequirementsPending => {
                self.on_enter_requirements_pending().await
            }
            State::ResolvingCluster => self.on_enter_resolving_cluster().await,
            State::Ready => self.on_enter_ready(),
        }
    }

    async fn on_enter_init(&mut self) {
        debug!("Entering INIT state");
        self.upload_attempts = 0;
        self.address_attempts = 0;
        self.cluster_address = None;
        self.frontend = self.factory.frontend();
        self.edge = self.factory.edge(None, None);
        self.authenticate().await;
    }

    async fn authenticate(&mut self) {
        self.token = self.frontend.authenticate().await;
        debug!("Token obtained: {}", self.token.is_some());
    }

    async fn on_enter_requirements_pending(&mut self) {
        debug!("Entering REQUIREMENTS_PENDING state");
        self.requirements_uploaded =
            match (self.token.clone(), self.requirements.as_ref()) {
                (Some(token), Some(requirements)) => {
                    debug!("Uploading requirements: {:?}", requirements);
                    self.frontend.set_token(token.clone());
                    self.frontend
                        .submit_requirements(&token, requirements)
                        .await
                }
                (None, _) => {
                    error!("No token to upload the requirements with");
                    false
                }
                (_, None) => {
                    error!("No requirements to upload");
                    false
                }
            };
        if self.requirements_uploaded {
            self.requirements_changed = false;
        }
        self.upload_attempts += 1;
    }

    async fn on_enter_resolving_cluster(&mut self) {
        debug!("Entering RESOLVING_CLUSTER state");
        self.upload_attempts = 0;
        self.cluster_address = self.frontend.resolve_cluster_address().await;
        self.edge = self
            .factory
            .edge(self.token.clone(), self.cluster_address.clone());
        self.address_attempts += 1;
    }

    fn on_enter_ready(&mut self) {
        debug!("Entering READY state");
        self.address_attempts = 0;
    }

    /// Apply new requirements, uploading them right away when the frontend
    /// can be reached.
    #[instrument(level = "trace", skip(self))]
    pub async fn update_requirements(
        &mut self,
        requirements: SchedulingRequirements,
    ) {
        if self.requirements.as_ref() == Some(&requirements) {
            self.requirements_changed = false;
            info!("Requirements have not changed, clients are kept.");
            return;
        }

        self.requirements_changed = true;
        self.requirements = Some(requirements);
        self.requirements_uploaded = false;
        info!("Requirements have changed! Applying...");

        if self.state == State::Init && self.token.is_none() {
            info!("Not authenticated yet, trying again");
            self.dispatch(Transition::RepeatAuth).await;
        }

        if !self.frontend.has_connection() {
            error!(
                "Frontend client is not connected: requirements could not be \
                 uploaded."
            );
            self.requirements = None;
            match self.state {
                State::Ready => {
                    self.dispatch(Transition::TokenNotValidReady).await
                }
                State::ResolvingCluster => {
                    self.dispatch(Transition::TokenNotValidAddress).await
                }
                State::RequirementsPending => {
                    self.dispatch(Transition::TokenNotValidRequirements).await
                }
                State::Init => {}
            }
            return;
        }

        match self.state {
            State::RequirementsPending => {
                self.dispatch(Transition::SendUpdatedRequirements).await
            }
            State::Init => self.dispatch(Transition::SuccessAuth).await,
            State::Ready => {
                self.upload_attempts = 0;
                self.dispatch(Transition::ReadyUpdateRequirements).await
            }
            State::ResolvingCluster => {
                self.dispatch(Transition::AddressUpdateRequirements).await
            }
        }

        while !self.requirements_uploaded {
            if self.state != State::RequirementsPending {
                warn!(
                    "Requirements not uploaded, left in {:?} until the next \
                     offload",
                    self.state
                );
                return;
            }
            if self.upload_attempts == ATTEMPT_LIMIT {
                error!(
                    "Number of attempts reached: unable to upload \
                     requirements. State machine is now in INIT state."
                );
                self.requirements = None;
                self.dispatch(Transition::LimitRequirementsUpload).await;
                self.requirements_changed = false;
                return;
            }

            warn!(
                "Requirements upload failed ({} attempts). Retrying...",
                self.upload_attempts
            );
            if self.fire(Transition::RetryRequirementsUpload).await.is_err() {
                self.dispatch(Transition::TokenNotValidRequirements).await;
                return;
            }
        }

        info!("Requirements successfully uploaded!");
        self.requirements_changed = false;
        self.dispatch(Transition::RequirementsUploaded).await;
    }

    /// Run `function` on the edge cluster, walking the session back to
    /// [`State::Ready`] first if needed.
    #[instrument(
        level = "trace",
        skip(self, function, args),
        fields(function = function.name())
    )]
    pub async fn offload(
        &mut self,
        function: &OffloadFunction,
        args: &[Value],
    ) -> ExecutionResult {
        let serialized = match codec::serialize_function(function) {
            Ok(serialized) => serialized,
            Err(err) => return ExecutionResult::Failure(err.to_string()),
        };

        for round in 0..self.max_offload_rounds {
            let guards = self.guards();
            if self.state == State::Ready
                && Transition::ResultGiven.allowed(&guards)
            {
                return self.execute(&serialized, args).await;
            }
            if self.requirements.is_none() {
                return ExecutionResult::failure(
                    "No requirements are registered, resubmit them with \
                     init() before offloading",
                );
            }

            let Some(transition) = select(self.state, &guards) else {
                return ExecutionResult::Failure(format!(
                    "No transition out of {:?} with {:?}",
                    self.state, guards
                ));
            };
            debug!(
                "State is not READY (round {}), handling {:?}",
                round, transition
            );
            if let Err(err) = self.fire(transition).await {
                return ExecutionResult::Failure(err.to_string());
            }
        }

        error!(
            "Could not reach READY after {} rounds, last state {:?}",
            self.max_offload_rounds, self.state
        );
        ExecutionResult::Failure(format!(
            "The device runtime could not reach the edge cluster after {} \
             attempts",
            self.max_offload_rounds
        ))
    }

    async fn execute(
        &mut self,
        function: &SerializedFunction,
        args: &[Value],
    ) -> ExecutionResult {
        let Some(function_id) = self.frontend.upload_function(function).await
        else {
            return ExecutionResult::failure("Failed to upload the function");
        };
        let Some(app_req_id) = self.frontend.app_requirements_id() else {
            return ExecutionResult::failure(
                "No requirements document to execute the function against",
            );
        };

        debug!("Waiting for result...");
        let res = self
            .edge
            .execute_function(
                function_id,
                app_req_id,
                ExecutionMode::Sync,
                args,
            )
            .await;
        match &res {
            ExecutionResult::Success(_) => info!("Result obtained"),
            ExecutionResult::Failure(err) => info!("Result not given: {}", err),
        }
        res
    }

    /// Push device telemetry when the session is ready, best effort.
    pub async fn send_metrics(&mut self, metrics: &DeviceMetrics) -> bool {
        if self.state != State::Ready {
            debug!("Not READY, metrics are dropped");
            return false;
        }
        self.edge.send_metrics(metrics).await
    }
}
