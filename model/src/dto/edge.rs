use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Sync,
    /// Not driven by the device runtime yet
    Async,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Sync => "sync",
            ExecutionMode::Async => "async",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum ExecReturnCode {
    Success,
    Error,
}

impl From<ExecReturnCode> for i32 {
    fn from(code: ExecReturnCode) -> i32 {
        match code {
            ExecReturnCode::Success => 0,
            ExecReturnCode::Error => -1,
        }
    }
}

impl TryFrom<i32> for ExecReturnCode {
    type Error = String;

    fn try_from(code: i32) -> Result<Self, <Self as TryFrom<i32>>::Error> {
        match code {
            0 => Ok(ExecReturnCode::Success),
            -1 => Ok(ExecReturnCode::Error),
            other => Err(format!("Unknown execution return code {}", other)),
        }
    }
}

/// Body answered by `POST /v1/functions/{id}/execute`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecResponse {
    #[serde(default = "default_ret_code")]
    pub ret_code: ExecReturnCode,
    /// Serialized result, base64
    #[serde(default)]
    pub res:      Option<String>,
    #[serde(default)]
    pub err:      Option<String>,
}

fn default_ret_code() -> ExecReturnCode { ExecReturnCode::Success }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AsyncExecStatus {
    Working,
    Ready,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsyncExecId {
    pub faas_task_uuid: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsyncExecResponse {
    pub status:  AsyncExecStatus,
    pub res:     Option<ExecResponse>,
    pub exec_id: AsyncExecId,
}

/// Body of `POST /v1/device_metrics`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geolocation: Option<String>,
    /// Milliseconds, as last measured by the device
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency:     Option<f64>,
}
