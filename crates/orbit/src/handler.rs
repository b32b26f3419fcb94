//! Owns one request's lifecycle: builds the conversation, runs the graph and frames its output.
use async_stream::stream;
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::agent::{Agent, AgentMode};
use crate::attachments::{process_attachments, Attachment};
use crate::context::{new_request_id, RequestContext};
use crate::conversation::ConversationState;
use crate::errors::AgentResult;
use crate::events::AgentEvent;
use crate::models::message::Message;
use crate::protocol::Frame;
use crate::storage::ObjectStore;
use crate::translator::translate;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryRole {
    User,
    Assistant,
    #[default]
    System,
}

/// A prior turn supplied by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryItem {
    #[serde(default)]
    pub role: HistoryRole,
    pub content: String,
}

impl From<HistoryItem> for Message {
    fn from(item: HistoryItem) -> Self {
        let message = match item.role {
            HistoryRole::User => Message::user(),
            HistoryRole::Assistant => Message::assistant(),
            HistoryRole::System => Message::system(),
        };
        message.with_text(item.content)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default)]
    pub history: Vec<HistoryItem>,
    #[serde(default)]
    pub files: Option<Vec<Attachment>>,
    #[serde(default)]
    pub mode: AgentMode,
}

impl GenerationRequest {
    pub fn new<S: Into<String>>(prompt: S) -> Self {
        Self {
            prompt: prompt.into(),
            history: Vec::new(),
            files: None,
            mode: AgentMode::default(),
        }
    }
}

/// Everything the graph needs to start, plus the accounting it will fill in
pub struct PreparedRequest {
    pub context: RequestContext,
    pub state: ConversationState,
    pub mode: AgentMode,
}

#[derive(Clone)]
pub struct RequestHandler {
    agent: Arc<Agent>,
    store: Arc<dyn ObjectStore>,
}

impl RequestHandler {
    pub fn new(agent: Arc<Agent>, store: Arc<dyn ObjectStore>) -> Self {
        Self { agent, store }
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    /// Build the initial conversation: history, then the new user turn with its attachments
    pub async fn prepare(&self, request_id: String, request: GenerationRequest) -> PreparedRequest {
        let attachments = request.files.unwrap_or_default();
        let processed = process_attachments(&attachments, self.store.as_ref()).await;

        let mut messages: Vec<Message> = request.history.into_iter().map(Message::from).collect();
        let turn = processed.parts.into_iter().fold(
            Message::user().with_text(request.prompt),
            Message::with_content,
        );
        messages.push(turn);

        tracing::debug!(
            %request_id,
            history = messages.len() - 1,
            attachments = attachments.len(),
            stored = processed.files.len(),
            "prepared request"
        );

        PreparedRequest {
            context: RequestContext::new(request_id, processed.files),
            state: ConversationState::new(messages),
            mode: request.mode,
        }
    }

    /// Run one request and produce its complete frame sequence.
    ///
    /// Dropping the returned stream cancels the run.
    pub fn generate(&self, request: GenerationRequest) -> BoxStream<'static, Frame> {
        let handler = self.clone();
        Box::pin(stream! {
            let request_id = new_request_id();
            tracing::info!(%request_id, mode = ?request.mode, "generation started");

            let prepared = handler.prepare(request_id, request).await;
            let events = handler.agent.reply(prepared.state, prepared.mode);
            let mut frames = translate(events, prepared.context);
            while let Some(frame) = frames.next().await {
                yield frame;
            }
        })
    }

    /// Run a single prompt to completion and return the final answer text
    pub async fn ask(&self, prompt: String) -> AgentResult<String> {
        let state = ConversationState::new(vec![Message::user().with_text(prompt)]);
        let mut events = self.agent.reply(state, AgentMode::Generation);

        let mut answer = None;
        while let Some(event) = events.next().await {
            if let AgentEvent::ModelEnd { message, .. } = event? {
                answer = Some(message);
            }
        }
        Ok(answer.map(|message| message.text()).unwrap_or_default())
    }
}
