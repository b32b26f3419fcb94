use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextContent {
    pub text: String,
}

/// An image the model should see, either a remote URL or a `data:` URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageContent {
    pub url: String,
}

impl ImageContent {
    pub fn is_inline(&self) -> bool {
        self.url.starts_with("data:")
    }
}
