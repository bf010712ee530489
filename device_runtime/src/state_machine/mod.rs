//! Session life cycle of the device runtime.
//!
//! The transition table is kept free of any I/O: given the current state and
//! a snapshot of the guards, [`select`] tells which transition applies. The
//! session in [`session`] evaluates the guards and runs the entry actions.

pub mod session;

pub use session::DeviceRuntimeStateMachine;

/// Client-side progress of one session, from authentication to offloading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Init,
    /// Requirements are being uploaded to the frontend
    RequirementsPending,
    /// Waiting for the frontend to tell which edge cluster to use
    ResolvingCluster,
    /// Functions can be offloaded
    Ready,
}

/// Snapshot of the conditions driving the transitions, evaluated fresh
/// every time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Guards {
    pub token_present:         bool,
    pub frontend_connected:    bool,
    pub edge_connected:        bool,
    pub requirements_uploaded: bool,
    pub requirements_changed:  bool,
    pub upload_limit_reached:  bool,
    pub address_limit_reached: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    SuccessAuth,
    RepeatAuth,
    TokenNotValidRequirements,
    RequirementsUploaded,
    RetryRequirementsUpload,
    LimitRequirementsUpload,
    SendUpdatedRequirements,
    RecoverRequirementsUpload,
    TokenNotValidAddress,
    AddressObtained,
    RetryGetAddress,
    LimitGetAddress,
    AddressUpdateRequirements,
    TokenNotValidReady,
    ReadyUpdateRequirements,
    ResultGiven,
}

/// Every transition, grouped by source state, in priority order.
pub const TRANSITIONS: [Transition; 16] = [
    Transition::SuccessAuth,
    Transition::RepeatAuth,
    Transition::TokenNotValidRequirements,
    Transition::RequirementsUploaded,
    Transition::RetryRequirementsUpload,
    Transition::LimitRequirementsUpload,
    Transition::SendUpdatedRequirements,
    Transition::RecoverRequirementsUpload,
    Transition::TokenNotValidAddress,
    Transition::AddressObtained,
    Transition::RetryGetAddress,
    Transition::LimitGetAddress,
    Transition::AddressUpdateRequirements,
    Transition::TokenNotValidReady,
    Transition::ReadyUpdateRequirements,
    Transition::ResultGiven,
];

impl Transition {
    pub fn source(self) -> State {
        use Transition::*;
        match self {
            SuccessAuth | RepeatAuth => State::Init,
            TokenNotValidRequirements
            | RequirementsUploaded
            | RetryRequirementsUpload
            | LimitRequirementsUpload
            | SendUpdatedRequirements
            | RecoverRequirementsUpload => State::RequirementsPending,
            TokenNotValidAddress
            | AddressObtained
            | RetryGetAddress
            | LimitGetAddress
            | AddressUpdateRequirements => State::ResolvingCluster,
            TokenNotValidReady | ReadyUpdateRequirements | ResultGiven => {
                State::Ready
            }
        }
    }

    pub fn target(self) -> State {
        use Transition::*;
        match self {
            RepeatAuth
            | TokenNotValidRequirements
            | LimitRequirementsUpload
            | TokenNotValidAddress
            | LimitGetAddress
            | TokenNotValidReady => State::Init,
            SuccessAuth
            | RetryRequirementsUpload
            | SendUpdatedRequirements
            | RecoverRequirementsUpload
            | AddressUpdateRequirements
            | ReadyUpdateRequirements => State::RequirementsPending,
            RequirementsUploaded | RetryGetAddress => State::ResolvingCluster,
            AddressObtained | ResultGiven => State::Ready,
        }
    }

    /// Whether the guard of the transition holds.
    pub fn allowed(self, g: &Guards) -> bool {
        use Transition::*;
        let fc = g.frontend_connected;
        let ec = g.edge_connected;
        let uploaded = g.requirements_uploaded;
        let changed = g.requirements_changed;

        match self {
            SuccessAuth => g.token_present,
            RepeatAuth => !g.token_present,

            TokenNotValidRequirements => !fc,
            RequirementsUploaded => fc && uploaded && !changed,
            RetryRequirementsUpload => {
                fc && changed && !uploaded && !g.upload_limit_reached
            }
            LimitRequirementsUpload => {
                fc && g.upload_limit_reached && !uploaded
            }
            SendUpdatedRequirements => fc && changed,
            RecoverRequirementsUpload => {
                fc && !uploaded && !g.upload_limit_reached
            }

            TokenNotValidAddress => !fc,
            AddressObtained => ec && fc && !changed,
            RetryGetAddress => fc && !ec && !g.address_limit_reached,
            LimitGetAddress => g.address_limit_reached && fc && !ec,
            AddressUpdateRequirements => changed && fc,

            TokenNotValidReady => !fc || !ec,
            ReadyUpdateRequirements => changed && fc && ec,
            ResultGiven => fc && ec && !changed,
        }
    }

    /// Giving up after too many attempts.
    pub fn is_limit(self) -> bool {
        matches!(
            self,
            Transition::LimitRequirementsUpload | Transition::LimitGetAddress
        )
    }
}

/// First transition out of `state` whose guard holds.
pub fn select(state: State, guards: &Guards) -> Option<Transition> {
    TRANSITIONS
        .iter()
        .copied()
        .find(|transition| {
            transition.source() == state && transition.allowed(guards)
        })
}

pub fn next_state(state: State, guards: &Guards) -> Option<State> {
    select(state, guards).map(Transition::target)
}
