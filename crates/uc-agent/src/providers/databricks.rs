use async_stream::try_stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::{header::CONTENT_TYPE, Client, Response, StatusCode};
use serde_json::{json, Map, Value};
use std::time::Duration;

use super::base::{ChatCompletionChunk, ChunkStream, Provider};
use super::configs::DatabricksProviderConfig;
use super::retry::with_backoff;
use super::utils::{
    completion_to_chunk, endpoint_error_from_body, error_payload, messages_to_openai_spec,
    parse_chunk, tools_to_openai_spec, with_optional, SseDecoder, STREAM_DONE,
};
use crate::errors::EndpointError;
use crate::models::message::Message;
use crate::models::tool::ToolSpec;

pub struct DatabricksProvider {
    client: Client,
    config: DatabricksProviderConfig,
}

impl DatabricksProvider {
    pub fn new(config: DatabricksProviderConfig) -> Result<Self, EndpointError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &DatabricksProviderConfig {
        &self.config
    }

    fn payload(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<Value, EndpointError> {
        let tools_spec = if !tools.is_empty() {
            json!(tools_to_openai_spec(tools)?)
        } else {
            Value::Null
        };

        let mut payload = Map::new();
        payload.insert("messages".to_string(), json!(messages_to_openai_spec(messages)));
        payload.insert("stream".to_string(), json!(true));

        Ok(with_optional(
            payload,
            &[
                ("tools", tools_spec),
                ("temperature", json!(self.config.temperature)),
                ("max_tokens", json!(self.config.max_tokens)),
            ],
        ))
    }

    /// One attempt at establishing the request, classifying failures
    async fn send(&self, payload: &Value) -> Result<Response, EndpointError> {
        let response = self
            .client
            .post(self.config.invocations_url())
            .bearer_auth(&self.config.token)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::TOO_MANY_REQUESTS => EndpointError::RateLimited(body),
            status if status.is_server_error() => EndpointError::Server { status, body },
            status => {
                let error = serde_json::from_str::<Value>(&body)
                    .ok()
                    .and_then(|value| error_payload(&value));
                match error.map(|error| endpoint_error_from_body(&error)) {
                    Some(EndpointError::ContextLengthExceeded(message)) => {
                        EndpointError::ContextLengthExceeded(message)
                    }
                    _ => EndpointError::Request { status, body },
                }
            }
        })
    }
}

/// Decode a `text/event-stream` body into completion chunks, stopping at `[DONE]`
fn sse_chunks(
    response: Response,
) -> impl Stream<Item = Result<ChatCompletionChunk, EndpointError>> + Send + 'static {
    try_stream! {
        let mut bytes = response.bytes_stream();
        let mut decoder = SseDecoder::default();
        let mut done = false;

        'read: while let Some(piece) = bytes.next().await {
            let piece = piece?;
            for data in decoder.push(&piece)? {
                if data == STREAM_DONE {
                    done = true;
                    break 'read;
                }
                yield parse_chunk(&data)?;
            }
        }

        if !done {
            if let Some(data) = decoder.finish()? {
                if data != STREAM_DONE {
                    yield parse_chunk(&data)?;
                }
            }
        }
    }
}

/// Endpoints that ignore `stream` answer with a single completion document
async fn json_chunks(response: Response) -> Result<ChunkStream, EndpointError> {
    let value: Value = response.json().await?;
    if let Some(error) = error_payload(&value) {
        return Err(endpoint_error_from_body(&error));
    }
    let chunk = completion_to_chunk(&value)?;
    Ok(Box::pin(futures::stream::iter(vec![Ok(chunk)])))
}

#[async_trait]
impl Provider for DatabricksProvider {
    async fn stream(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<ChunkStream, EndpointError> {
        let payload = self.payload(messages, tools)?;
        tracing::debug!(
            endpoint = %self.config.endpoint,
            messages = messages.len(),
            tools = tools.len(),
            "requesting completion"
        );

        let payload = &payload;
        let response = with_backoff(&self.config.retry, move || self.send(payload)).await?;

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.starts_with("application/json"))
            .unwrap_or(false);

        if is_json {
            json_chunks(response).await
        } else {
            Ok(Box::pin(sse_chunks(response)))
        }
    }
}
