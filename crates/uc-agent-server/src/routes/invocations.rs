use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use futures::{stream::StreamExt, Stream};
use serde_json::json;
use std::{
    convert::Infallible,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;
use uc_agent::models::responses::{ResponsesRequest, StreamEvent};

// Server-sent events, one `data:` frame per agent event
pub struct SseResponse {
    rx: ReceiverStream<String>,
}

impl SseResponse {
    fn new(rx: ReceiverStream<String>) -> Self {
        Self { rx }
    }
}

impl Stream for SseResponse {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx)
            .poll_next(cx)
            .map(|opt| opt.map(|s| Ok(Bytes::from(s))))
    }
}

impl IntoResponse for SseResponse {
    fn into_response(self) -> Response {
        (
            [
                (header::CONTENT_TYPE, "text/event-stream"),
                (header::CACHE_CONTROL, "no-cache"),
                (header::CONNECTION, "keep-alive"),
            ],
            Body::from_stream(self),
        )
            .into_response()
    }
}

struct EventFormatter;

impl EventFormatter {
    fn format_event(event: &StreamEvent) -> Option<String> {
        match serde_json::to_string(event) {
            Ok(data) => Some(format!("data: {}\n\n", data)),
            Err(e) => {
                tracing::error!("Could not serialize event: {}", e);
                None
            }
        }
    }

    fn format_error(message: &str) -> String {
        let error = json!({
            "type": "error",
            "message": message,
        });
        format!("data: {}\n\n", error)
    }
}

fn stream_events(state: AppState, request: ResponsesRequest) -> SseResponse {
    let (tx, rx) = mpsc::channel(100);
    let response = SseResponse::new(ReceiverStream::new(rx));

    tokio::spawn(async move {
        let mut stream = state.agent.predict_stream(request);

        loop {
            match timeout(Duration::from_millis(500), stream.next()).await {
                Ok(Some(Ok(event))) => {
                    let Some(frame) = EventFormatter::format_event(&event) else {
                        continue;
                    };
                    if let Err(e) = tx.send(frame).await {
                        tracing::error!("Error sending event through channel: {}", e);
                        break;
                    }
                }
                Ok(Some(Err(e))) => {
                    tracing::error!("Error processing conversation: {}", e);
                    let _ = tx.send(EventFormatter::format_error(&e.to_string())).await;
                    break;
                }
                Ok(None) => break,
                Err(_) => {
                    // Heartbeat, used to detect disconnected clients and then stop the loop
                    if tx.is_closed() {
                        tracing::info!("client disconnected, stopping conversation");
                        break;
                    }
                }
            }
        }
    });

    response
}

async fn handler(
    State(state): State<AppState>,
    Json(request): Json<ResponsesRequest>,
) -> Result<Response, ApiError> {
    if request.stream {
        return Ok(stream_events(state, request).into_response());
    }

    let response = state.agent.predict(request).await?;
    Ok(Json(response).into_response())
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/invocations", post(handler))
        .with_state(state)
}
