use crate::state::AppState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use chrono::Utc;
use futures::{stream::StreamExt, Stream};
use orbit::context::new_request_id;
use orbit::handler::GenerationRequest;
use serde::{Deserialize, Serialize};
use std::{
    convert::Infallible,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Frames buffered ahead of a slow client before the agent is paused
const FRAME_BUFFER: usize = 100;

/// Server-Sent-Events body fed from the frame channel
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
    fn into_response(self) -> axum::response::Response {
        let body = axum::body::Body::from_stream(self);
        (
            [
                (header::CONTENT_TYPE, "text/event-stream"),
                (header::CACHE_CONTROL, "no-cache"),
                (header::CONNECTION, "keep-alive"),
            ],
            body,
        )
            .into_response()
    }
}

async fn handler(
    State(state): State<AppState>,
    Json(request): Json<GenerationRequest>,
) -> SseResponse {
    let (tx, rx) = mpsc::channel(FRAME_BUFFER);
    let mut frames = state.handler.generate(request);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                frame = frames.next() => match frame {
                    Some(frame) => {
                        if tx.send(frame.to_sse()).await.is_err() {
                            tracing::info!("client disconnected, cancelling generation");
                            break;
                        }
                    }
                    None => break,
                },
                // Notices a vanished client even while a long tool call produces no frames
                _ = tx.closed() => {
                    tracing::info!("client disconnected, cancelling generation");
                    break;
                }
            }
        }
    });

    SseResponse::new(ReceiverStream::new(rx))
}

#[derive(Debug, Deserialize)]
struct AskRequest {
    prompt: String,
}

#[derive(Debug, Serialize)]
struct AskResponse {
    model: String,
    generation_id: String,
    timestamp: i64,
    response: String,
}

// simple ask an AI for a response, non streaming
async fn ask_handler(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>, StatusCode> {
    let generation_id = new_request_id();
    let response = state.handler.ask(request.prompt).await.map_err(|e| {
        tracing::error!(%generation_id, error = %e, "ask failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(AskResponse {
        model: state.handler.agent().model_info().name,
        generation_id,
        timestamp: Utc::now().timestamp(),
        response,
    }))
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/generation", post(handler))
        .route("/ask", post(ask_handler))
        .with_state(state)
}
