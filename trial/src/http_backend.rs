//! Story backend that talks to a running `trial serve`.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use trial_core::{Action, BackendError, EndingQuery, Segment, SessionId, StoryBackend};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StoryRequest<'a> {
    session_id: &'a str,
    action: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Deserialize)]
struct EndingBody {
    success: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionBody {
    session_id: SessionId,
}

pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| BackendError::Failed(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Ask the server for a fresh session id.
    pub async fn new_session(&self) -> Result<SessionId, BackendError> {
        let response = self
            .client
            .post(format!("{}/api/session", self.base_url))
            .send()
            .await
            .map_err(transport)?;
        let body: SessionBody = read(response).await?;
        Ok(body.session_id)
    }
}

fn transport(err: reqwest::Error) -> BackendError {
    BackendError::Failed(err.to_string())
}

/// Decode a success body, or turn an error body into a `BackendError`.
async fn read<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, BackendError> {
    let status = response.status();
    if status.is_success() {
        return response.json().await.map_err(transport);
    }

    let message = match response.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => status.to_string(),
    };
    if status.is_client_error() && status != StatusCode::REQUEST_TIMEOUT {
        Err(BackendError::Rejected(message))
    } else {
        Err(BackendError::Failed(message))
    }
}

#[async_trait]
impl StoryBackend for HttpBackend {
    async fn send(&self, session_id: &SessionId, action: Action) -> Result<Segment, BackendError> {
        let response = self
            .client
            .post(format!("{}/api/story", self.base_url))
            .json(&StoryRequest {
                session_id: session_id.as_str(),
                action: action.to_string(),
            })
            .send()
            .await
            .map_err(transport)?;
        read(response).await
    }

    async fn check_ending(&self, query: &EndingQuery) -> Result<bool, BackendError> {
        let param = match query {
            EndingQuery::Outcome(_) => "outcome",
            EndingQuery::Situation(_) => "situation",
        };
        let response = self
            .client
            .get(format!("{}/api/story", self.base_url))
            .query(&[(param, query.text())])
            .send()
            .await
            .map_err(transport)?;
        let body: EndingBody = read(response).await?;
        Ok(body.success)
    }
}
