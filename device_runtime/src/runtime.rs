use std::future::Future;
use std::sync::Arc;

use model::codec;
use model::domain::execution::ExecutionResult;
use model::domain::function::OffloadFunction;
use model::domain::requirements::SchedulingRequirements;
use model::dto::edge::{DeviceMetrics, ExecReturnCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::instrument::WithSubscriber;
use tracing::{debug, Dispatch};

use crate::config::RuntimeConfig;
use crate::factory::{ClientFactory, HttpClientFactory};
use crate::state_machine::DeviceRuntimeStateMachine;
use crate::Error;

/// What came back from an offloaded call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallResult<T> {
    Success(T),
    /// The message reported by the edge cluster
    Error(String),
}

impl<T> CallResult<T> {
    pub fn ret_code(&self) -> ExecReturnCode {
        match self {
            CallResult::Success(_) => ExecReturnCode::Success,
            CallResult::Error(_) => ExecReturnCode::Error,
        }
    }

    pub fn into_result(self) -> Result<T, String> {
        match self {
            CallResult::Success(value) => Ok(value),
            CallResult::Error(err) => Err(err),
        }
    }
}

/// Entry point of the library: offload functions to the continuum.
///
/// Calls are serialized, a single session is driven at a time.
#[derive(Debug)]
pub struct DeviceRuntime {
    factory:            Arc<dyn ClientFactory>,
    max_offload_rounds: usize,
    state_machine:      Mutex<Option<DeviceRuntimeStateMachine>>,
    dispatch:           Option<Dispatch>,
}

impl DeviceRuntime {
    pub fn new(config: &RuntimeConfig) -> Result<Self, Error> {
        let factory = Arc::new(HttpClientFactory::new(config)?);
        Ok(Self::with_factory(factory, config.max_offload_rounds))
    }

    pub fn with_factory(
        factory: Arc<dyn ClientFactory>,
        max_offload_rounds: usize,
    ) -> Self {
        Self {
            factory,
            max_offload_rounds,
            state_machine: Mutex::new(None),
            dispatch: None,
        }
    }

    /// Send the logs of every operation to `dispatch` instead of the global
    /// subscriber.
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    async fn scoped<F: Future>(&self, fut: F) -> F::Output {
        match &self.dispatch {
            Some(dispatch) => fut.with_subscriber(dispatch.clone()).await,
            None => fut.await,
        }
    }

    /// Start the session if needed and upload `requirements`.
    ///
    /// Returns whether the frontend accepted them.
    pub async fn init(&self, requirements: Value) -> Result<bool, Error> {
        self.scoped(async {
            let requirements =
                SchedulingRequirements::from_value(requirements)?;
            let mut guard = self.state_machine.lock().await;
            if guard.is_none() {
                debug!("Starting the session");
                *guard = Some(
                    DeviceRuntimeStateMachine::start(
                        self.factory.clone(),
                        self.max_offload_rounds,
                    )
                    .await,
                );
            }
            let state_machine = guard.as_mut().ok_or(Error::NotInitialised)?;
            state_machine.update_requirements(requirements).await;
            Ok(state_machine.are_requirements_uploaded())
        })
        .await
    }

    /// Offload `function` with `args`, after switching to `new_requirements`
    /// when given.
    pub async fn call<T: DeserializeOwned>(
        &self,
        function: &OffloadFunction,
        args: &[Value],
        new_requirements: Option<Value>,
    ) -> Result<CallResult<T>, Error> {
        self.scoped(async {
            let new_requirements = new_requirements
                .map(SchedulingRequirements::from_value)
                .transpose()?;

            let mut guard = self.state_machine.lock().await;
            let state_machine = guard.as_mut().ok_or(Error::NotInitialised)?;
            if let Some(requirements) = new_requirements {
                debug!("Requirements provided, updating them if they changed");
                state_machine.update_requirements(requirements).await;
            }

            match state_machine.offload(function, args).await {
                ExecutionResult::Success(blob) => {
                    Ok(CallResult::Success(codec::deserialize(&blob)?))
                }
                ExecutionResult::Failure(err) => Ok(CallResult::Error(err)),
            }
        })
        .await
    }

    /// Push device telemetry to the edge cluster, if there is one yet.
    pub async fn send_metrics(
        &self,
        metrics: &DeviceMetrics,
    ) -> Result<bool, Error> {
        self.scoped(async {
            let mut guard = self.state_machine.lock().await;
            let state_machine = guard.as_mut().ok_or(Error::NotInitialised)?;
            Ok(state_machine.send_metrics(metrics).await)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use emulation::{Counters, Emulator};
    use serde_json::json;

    use super::*;
    use crate::config::{Credentials, FrontendEndpoint};

    async fn emulator() -> Result<Emulator> {
        Ok(Emulator::builder()
            .with_function("mult", |args| {
                match (args[0].as_i64(), args[1].as_i64()) {
                    (Some(a), Some(b)) => Ok(json!(a * b)),
                    _ => Err("can't multiply sequence by non-int".to_string()),
                }
            })
            .start()
            .await?)
    }

    fn runtime(emulator: &Emulator) -> Result<DeviceRuntime> {
        let mut config = RuntimeConfig::new(
            FrontendEndpoint::new(emulator.base_url().to_string())?,
            Credentials::new(format!(
                "{}:{}",
                emulator.username(),
                emulator.password()
            ))?,
        );
        config.request_timeout = 5;
        Ok(DeviceRuntime::new(&config)?)
    }

    fn mult() -> OffloadFunction {
        OffloadFunction::python("mult", &["a", "b"], "return a * b")
    }

    fn two_and_three() -> [Value; 2] { [json!(2), json!(3)] }

    const REQUIREMENTS: &str = r#"{
        "FLAVOUR": "Energy",
        "MAX_FUNCTION_EXECUTION_TIME": 2.0,
        "MAX_LATENCY": 25,
        "MIN_ENERGY_RENEWABLE_USAGE": 85,
        "GEOLOCATION": "IKERLAN ARRASATE/MONDRAGON 20500"
    }"#;

    #[tokio::test]
    async fn test_call_before_init() -> Result<()> {
        let emulator = emulator().await?;
        let runtime = runtime(&emulator)?;

        let res = runtime.call::<i64>(&mult(), &two_and_three(), None).await;
        assert!(matches!(res, Err(Error::NotInitialised)));
        assert_eq!(Counters::get(&emulator.counters().authenticate), 0);
        emulator.stop().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_init_refuses_bad_input() -> Result<()> {
        let emulator = emulator().await?;
        let runtime = runtime(&emulator)?;

        assert!(matches!(
            runtime.init(Value::Null).await,
            Err(Error::Requirements(_))
        ));
        assert!(matches!(
            runtime.init(json!({"FLAVOUR": "Energy", "COLOUR": "blue"})).await,
            Err(Error::Requirements(_))
        ));
        assert!(matches!(
            runtime.init(json!({"MAX_LATENCY": "fast"})).await,
            Err(Error::Requirements(_))
        ));
        emulator.stop().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_mult() -> Result<()> {
        let emulator = emulator().await?;
        let runtime = runtime(&emulator)?;

        assert!(runtime.init(serde_json::from_str(REQUIREMENTS)?).await?);
        let res = runtime.call::<i64>(&mult(), &two_and_three(), None).await?;

        assert_eq!(res, CallResult::Success(6));
        assert_eq!(res.ret_code(), ExecReturnCode::Success);
        emulator.stop().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_argument() -> Result<()> {
        let emulator = emulator().await?;
        let runtime = runtime(&emulator)?;

        assert!(runtime.init(serde_json::from_str(REQUIREMENTS)?).await?);
        let res = runtime.call::<i64>(&mult(), &[json!("x")], None).await?;

        assert_eq!(
            res,
            CallResult::Error(
                "mult() missing 1 required positional argument: 'b'"
                    .to_string()
            )
        );
        assert_eq!(res.ret_code(), ExecReturnCode::Error);
        emulator.stop().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_requirements_are_not_uploaded() -> Result<()> {
        let emulator = emulator().await?;
        let runtime = runtime(&emulator)?;

        assert!(!runtime.init(json!({"MAX_LATENCY": 25})).await?);
        assert_eq!(emulator.counters().requirements_total(), 0);

        let res = runtime.call::<i64>(&mult(), &two_and_three(), None).await?;
        assert!(
            matches!(res, CallResult::Error(err) if err.contains("resubmit"))
        );
        emulator.stop().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_new_requirements_on_call() -> Result<()> {
        let emulator = emulator().await?;
        let runtime = runtime(&emulator)?;
        assert!(runtime.init(serde_json::from_str(REQUIREMENTS)?).await?);

        let res = runtime
            .call::<i64>(
                &mult(),
                &[json!(4), json!(5)],
                Some(json!({"FLAVOUR": "SmartCity", "MAX_LATENCY": 0})),
            )
            .await?;

        assert_eq!(res, CallResult::Success(20));
        let counters = emulator.counters();
        assert_eq!(Counters::get(&counters.requirements_create), 1);
        assert_eq!(Counters::get(&counters.requirements_update), 1);
        let stored = emulator.state().document(1).expect("document");
        assert_eq!(stored.flavour, "SmartCity");
        emulator.stop().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_recovers_from_a_lost_cluster() -> Result<()> {
        let emulator = emulator().await?;
        let runtime = runtime(&emulator)?;
        assert!(runtime.init(serde_json::from_str(REQUIREMENTS)?).await?);
        assert_eq!(
            runtime.call::<i64>(&mult(), &two_and_three(), None).await?,
            CallResult::Success(6)
        );

        emulator
            .faults()
            .executions
            .store(1, std::sync::atomic::Ordering::SeqCst);
        let res = runtime.call::<i64>(&mult(), &two_and_three(), None).await?;
        assert_eq!(res.ret_code(), ExecReturnCode::Error);

        let res = runtime.call::<i64>(&mult(), &two_and_three(), None).await?;
        assert_eq!(res, CallResult::Success(6));
        assert_eq!(Counters::get(&emulator.counters().authenticate), 2);
        emulator.stop().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_init_authenticates_again_after_a_failure() -> Result<()> {
        let emulator = emulator().await?;
        emulator
            .faults()
            .authentications
            .store(1, std::sync::atomic::Ordering::SeqCst);
        let runtime = runtime(&emulator)?;

        assert!(runtime.init(serde_json::from_str(REQUIREMENTS)?).await?);
        assert_eq!(Counters::get(&emulator.counters().authenticate), 2);

        let res = runtime.call::<i64>(&mult(), &two_and_three(), None).await?;
        assert_eq!(res, CallResult::Success(6));
        emulator.stop().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_logs_go_to_the_injected_dispatch() -> Result<()> {
        let emulator = emulator().await?;
        let (subscriber, _guard) =
            helper::init::get_subscriber("device_runtime_test", "debug");
        let runtime =
            runtime(&emulator)?.with_dispatch(Dispatch::new(subscriber));

        assert!(runtime.init(serde_json::from_str(REQUIREMENTS)?).await?);
        // Still resolving the cluster, nothing to send them to
        assert!(!runtime.send_metrics(&DeviceMetrics::default()).await?);
        runtime.call::<i64>(&mult(), &two_and_three(), None).await?;
        assert!(runtime.send_metrics(&DeviceMetrics::default()).await?);
        assert_eq!(Counters::get(&emulator.counters().device_metrics), 1);
        emulator.stop().await;
        Ok(())
    }
}
