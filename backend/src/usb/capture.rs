//! Capture device handle abstraction.

use std::io;
use std::str::FromStr;
use usbcam_types::metadata::{
    Capability, CropCapability, DataFormat, Fraction, FrameRateFormat, ImageFormat,
    StreamingParameters,
};

/// An open video capture device. Handles are short lived: one is opened per
/// command batch and dropped afterwards.
pub trait CaptureDevice: Send {
    fn capability(&self) -> io::Result<Capability>;

    /// Whether the device reports both video capture and streaming support.
    fn is_capture_capable(&self) -> io::Result<bool>;

    /// Description of the pixel format currently configured, e.g. `YUYV 4:2:2`.
    fn format_description(&self) -> io::Result<String>;

    fn current_input(&self) -> io::Result<i32>;

    /// Status bits of video input `index`.
    fn input_status(&self, index: u32) -> io::Result<u32>;

    fn image_formats(&self) -> io::Result<Vec<ImageFormat>>;

    fn data_format(&self) -> io::Result<DataFormat>;

    fn crop_capability(&self) -> io::Result<CropCapability>;

    fn streaming_parameters(&self) -> io::Result<StreamingParameters>;

    fn frame_rate_formats(&self) -> io::Result<Vec<FrameRateFormat>>;

    /// Current frame rate in frames per second.
    fn frame_rate(&self) -> io::Result<Fraction>;

    /// Apply a frame rate, returning the rate the driver settled on.
    fn set_frame_rate(&mut self, fps: Fraction) -> io::Result<Fraction>;

    /// Apply a frame size and pixel format, returning the resulting format.
    fn set_pixel_format(&mut self, width: u32, height: u32, fourcc: [u8; 4])
        -> io::Result<DataFormat>;
}

/// Opens capture devices by path.
pub trait CaptureBackend: Send + Sync {
    fn open(&self, path: &str) -> io::Result<Box<dyn CaptureDevice>>;

    /// Open failures count as not capable.
    fn is_capture_capable(&self, path: &str) -> bool {
        self.open(path)
            .and_then(|device| device.is_capture_capable())
            .unwrap_or(false)
    }
}

/// Coarse classification of what a device path streams, used to pick one
/// path of a multi-path camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFormat {
    Rgb,
    Greyscale,
    Depth,
}

impl StreamFormat {
    /// Classify a pixel format description or FourCC code.
    pub fn classify(description: &str) -> Self {
        let upper = description.to_ascii_uppercase();
        if upper.contains("Z16") || upper.contains("DEPTH") {
            return Self::Depth;
        }
        let greyscale_markers = ["GREY", "GRAY", "Y8", "Y10", "Y12", "Y16", "INFRARED"];
        if greyscale_markers.iter().any(|m| upper.contains(m)) {
            return Self::Greyscale;
        }
        Self::Rgb
    }
}

impl FromStr for StreamFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rgb" => Ok(Self::Rgb),
            "greyscale" | "grayscale" => Ok(Self::Greyscale),
            "depth" => Ok(Self::Depth),
            other => Err(format!(
                "unknown stream format {:?}, expected RGB, Greyscale or Depth",
                other
            )),
        }
    }
}

/// Parse a four character pixel format code.
pub fn parse_fourcc(code: &str) -> Option<[u8; 4]> {
    code.as_bytes().try_into().ok()
}
