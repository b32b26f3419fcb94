//! Inbound file attachments: decoding, upload and embedding into the user turn.
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::errors::AttachmentError;
use crate::models::message::MessageContent;
use crate::storage::ObjectStore;

/// A file sent inline with a generation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    pub mime_type: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Data URL: `data:<mime>;base64,<payload>`
    pub base64: String,
}

impl Attachment {
    fn expected_prefix(&self) -> String {
        format!("data:{};base64,", self.mime_type)
    }

    /// Strip the data URL header and decode the payload
    pub fn decode(&self) -> Result<Vec<u8>, AttachmentError> {
        let expected = self.expected_prefix();
        let payload =
            self.base64
                .strip_prefix(&expected)
                .ok_or_else(|| AttachmentError::MissingPrefix {
                    name: self.name.clone(),
                    expected: expected.clone(),
                })?;
        STANDARD
            .decode(payload.trim())
            .map_err(|e| AttachmentError::Decode {
                name: self.name.clone(),
                reason: e.to_string(),
            })
    }
}

/// An uploaded file as reported in the summary frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub name: String,
    pub size: u64,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub key: String,
}

/// Content parts for the new user turn plus descriptors of the files that were stored
#[derive(Debug, Default)]
pub struct ProcessedAttachments {
    pub parts: Vec<MessageContent>,
    pub files: Vec<FileDescriptor>,
}

/// Decode, upload and embed every attachment.
///
/// A malformed attachment is skipped entirely. A failed upload only drops the
/// descriptor; the model still sees the file.
pub async fn process_attachments(
    attachments: &[Attachment],
    store: &dyn ObjectStore,
) -> ProcessedAttachments {
    let mut processed = ProcessedAttachments::default();

    for attachment in attachments {
        let bytes = match attachment.decode() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "skipping attachment");
                continue;
            }
        };

        if !bytes.is_empty() {
            let outcome = store
                .upload(Bytes::from(bytes), &attachment.name, &attachment.mime_type)
                .await;
            if let Some(key) = outcome.key() {
                processed.files.push(FileDescriptor {
                    name: attachment.name.clone(),
                    size: attachment.size,
                    mime_type: attachment.mime_type.clone(),
                    kind: attachment.kind.clone(),
                    key: key.to_string(),
                });
            }
        }

        processed
            .parts
            .push(MessageContent::image(attachment.base64.clone()));
    }

    processed
}
