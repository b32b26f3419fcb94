//! These models represent the objects passed around by the agent
//!
//! There are several different related formats we need to interact with:
//! - generation requests, sent from the client to the gateway
//! - the framed event stream, sent from the gateway to the client
//! - openai-compatible messages/tools, sent from the agent to the LLM
//! - tool calls, sent from the agent to the tool registry
//!
//! We always immediately convert those data models into the internal structs
//! using to/from helpers. Because of the need for compatibility, the internal
//! models are not an exact match to any of these formats.
pub mod content;
pub mod message;
pub mod role;
pub mod tool;
