//! Photo attachments: validate on attach, base64-wrap for the model call.
//!
//! The photo is decoded once when it is attached so a corrupt or unsupported
//! file is rejected before it is bound to a turn. The original bytes are sent
//! to the model untouched; the remote API's own size limits apply.

use crate::error::AgentError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::ImageFormat;
use serde::Serialize;
use tracing::debug;

/// A decoded JPEG or PNG photo attached to one user turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageAttachment {
    #[serde(skip)]
    bytes: Vec<u8>,
    mime_type: &'static str,
    width: u32,
    height: u32,
}

impl ImageAttachment {
    /// Validate `bytes` as a JPEG or PNG photo.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, AgentError> {
        let format = image::guess_format(&bytes).map_err(|e| AgentError::UnsupportedImage {
            detail: e.to_string(),
        })?;

        let mime_type = match format {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            other => {
                return Err(AgentError::UnsupportedImage {
                    detail: format!("{other:?} photos are not supported"),
                })
            }
        };

        let decoded = image::load_from_memory_with_format(&bytes, format).map_err(|e| {
            AgentError::UnsupportedImage {
                detail: e.to_string(),
            }
        })?;

        debug!(
            "Attached {} photo {}x{} ({} bytes)",
            mime_type,
            decoded.width(),
            decoded.height(),
            bytes.len()
        );

        Ok(Self {
            bytes,
            mime_type,
            width: decoded.width(),
            height: decoded.height(),
        })
    }

    pub fn mime_type(&self) -> &'static str {
        self.mime_type
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Wrap the original bytes as a multimodal part for the model call.
    pub fn to_image_data(&self) -> ImageData {
        let b64 = STANDARD.encode(&self.bytes);
        debug!("Encoded photo → {} bytes base64", b64.len());
        ImageData::new(b64, self.mime_type)
    }
}
