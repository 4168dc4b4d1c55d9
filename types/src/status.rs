//! Streaming status of a device.

use serde::{Deserialize, Serialize};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Live streaming state of one device, including the options the transcoder
/// was last started with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "PascalCase")]
pub struct StreamingStatus {
    pub is_streaming: bool,
    /// Diagnostic message of the last failed run, empty on success.
    #[serde(default)]
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_frames: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_fps: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_fps: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_image_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_image_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_aspect: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_video_quality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_video_codec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_pixel_format: Option<String>,
}

impl StreamingStatus {
    /// Clear the telemetry fields, keeping the streaming flag and error.
    pub fn clear_options(&mut self) {
        *self = Self {
            is_streaming: self.is_streaming,
            error: std::mem::take(&mut self.error),
            ..Self::default()
        };
    }
}
