//! Transcoder command line options.
//!
//! Options come from the start-streaming request body and from `default*`
//! attributes of the resource. Request values win over defaults.

use crate::error::{DriverError, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use usbcam_types::command::{COMMAND_ATTRIBUTE, URL_RAW_QUERY};
use usbcam_types::StreamingStatus;

const DEFAULT_PREFIX: &str = "default";

/// Pixel format names accepted for `InputPixelFormat`, and the transcoder token
/// each maps to. Columns: FourCC, V4L2 description, transcoder token.
const PIXEL_FORMATS: &[(&str, &str, &str)] = &[
    ("RGB3", "24-bit RGB 8-8-8", "rgb24"),
    ("GREY", "8-bit Greyscale", "gray"),
    ("YUYV", "YUYV 4:2:2", "yuyv422"),
    ("MJPG", "Motion-JPEG", "mjpeg"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Input,
    Output,
}

/// A transcoder option that can be set per stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TranscodeOption {
    InputFps,
    InputImageSize,
    InputPixelFormat,
    OutputFrames,
    OutputFps,
    OutputImageSize,
    OutputAspect,
    OutputVideoQuality,
    OutputVideoCodec,
}

impl TranscodeOption {
    pub const ALL: [TranscodeOption; 9] = [
        Self::InputFps,
        Self::InputImageSize,
        Self::InputPixelFormat,
        Self::OutputFrames,
        Self::OutputFps,
        Self::OutputImageSize,
        Self::OutputAspect,
        Self::OutputVideoQuality,
        Self::OutputVideoCodec,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::InputFps => "InputFps",
            Self::InputImageSize => "InputImageSize",
            Self::InputPixelFormat => "InputPixelFormat",
            Self::OutputFrames => "OutputFrames",
            Self::OutputFps => "OutputFps",
            Self::OutputImageSize => "OutputImageSize",
            Self::OutputAspect => "OutputAspect",
            Self::OutputVideoQuality => "OutputVideoQuality",
            Self::OutputVideoCodec => "OutputVideoCodec",
        }
    }

    pub fn flag(self) -> &'static str {
        match self {
            Self::OutputFrames => "-frames:d",
            Self::InputFps | Self::OutputFps => "-r",
            Self::InputImageSize | Self::OutputImageSize => "-s",
            Self::OutputAspect => "-aspect",
            Self::OutputVideoQuality => "-qscale",
            Self::OutputVideoCodec => "-vcodec",
            Self::InputPixelFormat => "-input_format",
        }
    }

    pub fn scope(self) -> Scope {
        match self {
            Self::InputFps | Self::InputImageSize | Self::InputPixelFormat => Scope::Input,
            _ => Scope::Output,
        }
    }

    /// Normalize a raw value; only pixel formats are translated.
    fn normalize(self, value: &str) -> Result<String> {
        if self != Self::InputPixelFormat {
            return Ok(value.to_string());
        }
        PIXEL_FORMATS
            .iter()
            .find(|(fourcc, desc, token)| value == *fourcc || value == *desc || value == *token)
            .map(|(_, _, token)| token.to_string())
            .ok_or_else(|| {
                DriverError::contract(format!(
                    "invalid value \"{}\" for {} option",
                    value,
                    self.name()
                ))
            })
    }

    /// Record `value` in the matching telemetry field of `status`.
    fn record(self, status: &mut StreamingStatus, value: &str) {
        let field = match self {
            Self::InputFps => &mut status.input_fps,
            Self::InputImageSize => &mut status.input_image_size,
            Self::InputPixelFormat => &mut status.input_pixel_format,
            Self::OutputFrames => &mut status.output_frames,
            Self::OutputFps => &mut status.output_fps,
            Self::OutputImageSize => &mut status.output_image_size,
            Self::OutputAspect => &mut status.output_aspect,
            Self::OutputVideoQuality => &mut status.output_video_quality,
            Self::OutputVideoCodec => &mut status.output_video_codec,
        };
        *field = Some(value.to_string());
    }
}

impl fmt::Display for TranscodeOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TranscodeOption {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|opt| opt.name() == s)
            .ok_or_else(|| DriverError::contract(format!("unsupported option: {}", s)))
    }
}

/// Validated set of transcoder options for one stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscodeOptions {
    values: BTreeMap<TranscodeOption, String>,
}

impl TranscodeOptions {
    /// Merge request options with resource attribute defaults.
    pub fn from_request(request: &Map<String, Value>, attributes: &Map<String, Value>) -> Result<Self> {
        let mut options = Self::default();

        for (name, value) in request {
            let option: TranscodeOption = name.parse()?;
            options.set(option, value)?;
        }

        for (name, value) in attributes {
            if name == COMMAND_ATTRIBUTE || name == URL_RAW_QUERY {
                continue;
            }
            let option_name = name.strip_prefix(DEFAULT_PREFIX).unwrap_or(name);
            let option: TranscodeOption = option_name.parse()?;
            if options.values.contains_key(&option) {
                continue;
            }
            options.set(option, value)?;
        }

        Ok(options)
    }

    pub fn set(&mut self, option: TranscodeOption, value: &Value) -> Result<()> {
        let raw = value.as_str().ok_or_else(|| {
            DriverError::contract(format!("value of option {} should be a string", option))
        })?;
        if raw.is_empty() {
            return Ok(());
        }
        self.values.insert(option, option.normalize(raw)?);
        Ok(())
    }

    pub fn get(&self, option: TranscodeOption) -> Option<&str> {
        self.values.get(&option).map(String::as_str)
    }

    fn args(&self, scope: Scope) -> Vec<String> {
        self.values
            .iter()
            .filter(|(opt, _)| opt.scope() == scope)
            .flat_map(|(opt, value)| [opt.flag().to_string(), value.clone()])
            .collect()
    }

    pub fn input_args(&self) -> Vec<String> {
        self.args(Scope::Input)
    }

    pub fn output_args(&self) -> Vec<String> {
        self.args(Scope::Output)
    }

    /// Replace the telemetry fields of `status` with these options.
    pub fn apply_to(&self, status: &mut StreamingStatus) {
        status.clear_options();
        for (opt, value) in &self.values {
            opt.record(status, value);
        }
    }
}
