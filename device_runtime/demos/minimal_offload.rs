use anyhow::{Context, Result};
use device_runtime::config::RuntimeConfig;
use device_runtime::{CallResult, DeviceRuntime};
use helper::env_var;
use model::domain::function::OffloadFunction;
use serde_json::json;
use tracing::info;

env_var!(CONFIG_PATH);

#[tokio::main]
async fn main() -> Result<()> {
    let (subscriber, _guard) =
        helper::init::get_subscriber("minimal_offload", "info");
    helper::init::init_subscriber(subscriber)?;

    let config = match std::env::var(CONFIG_PATH) {
        Ok(path) => RuntimeConfig::from_file(path),
        Err(_) => RuntimeConfig::from_env(),
    }
    .context("Loading the configuration, set CONFIG_PATH or CONFIG")?;
    let runtime = DeviceRuntime::new(&config)?;

    let uploaded = runtime
        .init(json!({
            "FLAVOUR": "Energy",
            "MAX_FUNCTION_EXECUTION_TIME": 2.0,
            "MAX_LATENCY": 25,
            "MIN_ENERGY_RENEWABLE_USAGE": 85,
            "GEOLOCATION": "IKERLAN ARRASATE/MONDRAGON 20500"
        }))
        .await?;
    info!("Requirements uploaded: {}", uploaded);

    let mult = OffloadFunction::python("mult", &["a", "b"], "return a * b");
    match runtime.call::<i64>(&mult, &[json!(2), json!(3)], None).await? {
        CallResult::Success(res) => info!("mult(2, 3) = {}", res),
        CallResult::Error(err) => info!("Offloading failed: {}", err),
    }

    Ok(())
}
