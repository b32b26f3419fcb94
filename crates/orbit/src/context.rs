use std::collections::BTreeSet;
use std::time::Instant;
use uuid::Uuid;

use crate::attachments::FileDescriptor;
use crate::providers::base::Usage;

/// Fresh request identifier in the `req-<uuid>` form
pub fn new_request_id() -> String {
    format!("req-{}", Uuid::new_v4())
}

/// Per-request accounting, accumulated while frames are produced and read once
/// for the summary.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    started: Instant,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub tools: BTreeSet<String>,
    pub response: String,
    pub files: Vec<FileDescriptor>,
}

impl RequestContext {
    pub fn new<S: Into<String>>(request_id: S, files: Vec<FileDescriptor>) -> Self {
        Self {
            request_id: request_id.into(),
            started: Instant::now(),
            input_tokens: 0,
            output_tokens: 0,
            tools: BTreeSet::new(),
            response: String::new(),
            files,
        }
    }

    pub fn add_usage(&mut self, usage: &Usage) {
        self.input_tokens += i64::from(usage.input_tokens.unwrap_or(0));
        self.output_tokens += i64::from(usage.output_tokens.unwrap_or(0));
    }

    pub fn add_text(&mut self, text: &str) {
        self.response.push_str(text);
    }

    pub fn add_tool<S: Into<String>>(&mut self, name: S) {
        self.tools.insert(name.into());
    }

    /// Seconds since the request was accepted
    pub fn elapsed(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}
