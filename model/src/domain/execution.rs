use crate::dto::edge::{ExecResponse, ExecReturnCode};

/// Outcome of one offloaded execution, as seen by the device.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    /// Encoded result, to be decoded with [`crate::codec::deserialize`]
    Success(String),
    Failure(String),
}

impl ExecutionResult {
    pub fn failure(message: impl Into<String>) -> Self {
        ExecutionResult::Failure(message.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Success(_))
    }

    pub fn ret_code(&self) -> ExecReturnCode {
        match self {
            ExecutionResult::Success(_) => ExecReturnCode::Success,
            ExecutionResult::Failure(_) => ExecReturnCode::Error,
        }
    }
}

impl From<ExecResponse> for ExecutionResult {
    fn from(response: ExecResponse) -> Self {
        match (response.ret_code, response.res, response.err) {
            (ExecReturnCode::Success, Some(res), _) => {
                ExecutionResult::Success(res)
            }
            (ExecReturnCode::Success, None, _) => {
                ExecutionResult::failure("Result not given")
            }
            (ExecReturnCode::Error, _, Some(err)) => {
                ExecutionResult::Failure(err)
            }
            (ExecReturnCode::Error, _, None) => ExecutionResult::failure(
                "The function failed without an error description",
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_without_result_is_a_failure() {
        let res = ExecutionResult::from(ExecResponse {
            ret_code: ExecReturnCode::Success,
            res:      None,
            err:      None,
        });
        assert_eq!(res, ExecutionResult::failure("Result not given"));
        assert_eq!(res.ret_code(), ExecReturnCode::Error);
    }

    #[test]
    fn test_error_keeps_the_remote_message() {
        let res = ExecutionResult::from(ExecResponse {
            ret_code: ExecReturnCode::Error,
            res:      Some("ignored".to_string()),
            err:      Some("division by zero".to_string()),
        });
        assert_eq!(res, ExecutionResult::failure("division by zero"));
    }
}
