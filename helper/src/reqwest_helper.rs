use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;

#[derive(Debug, thiserror::Error)]
pub enum ResponseError {
    #[error("Failed to get bytes from the body of the message: {0}")]
    Body(#[from] reqwest::Error),
    #[error(
        "Failed to deserialize (supposedly JSON) to the specified type, the \
         text message is {text:?}: {source}"
    )]
    Deserialize {
        text:   String,
        #[source]
        source: serde_json::Error,
    },
}

pub async fn deserialize_response<T>(
    response: Response,
) -> Result<T, ResponseError>
where
    T: DeserializeOwned,
{
    let full = response.bytes().await?;

    serde_json::from_slice(&full).map_err(|source| {
        ResponseError::Deserialize {
            text: String::from_utf8_lossy(&full).into_owned(),
            source,
        }
    })
}

/// Render an unexpected answer for the logs, consuming it.
pub async fn describe_response(response: Response) -> String {
    let status = response.status();
    if status == StatusCode::NO_CONTENT {
        return format!("status {}", status);
    }

    match response.text().await {
        Ok(text) if !text.is_empty() => {
            format!("status {}, body {:?}", status, text)
        }
        _ => format!("status {}", status),
    }
}
