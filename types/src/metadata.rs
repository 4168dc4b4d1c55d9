//! Capture device metadata returned by read commands.

use serde::{Deserialize, Serialize};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Driver and device capabilities of a capture device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "PascalCase")]
pub struct Capability {
    pub driver: String,
    pub card: String,
    pub bus_info: String,
    /// Kernel driver version as `major.minor.patch`.
    pub version: String,
    pub driver_caps: Vec<String>,
    pub device_caps: Vec<String>,
}

impl Capability {
    pub fn format_version(raw: u32) -> String {
        format!("{}.{}.{}", raw >> 16, (raw >> 8) & 0xff, raw & 0xff)
    }
}

/// Current pixel format of a capture device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "PascalCase")]
pub struct DataFormat {
    pub width: u32,
    pub height: u32,
    pub pixel_format: String,
    pub field: String,
    pub bytes_per_line: u32,
    pub size_image: u32,
    pub colorspace: String,
    pub xfer_func: String,
    pub quantization: String,
}

/// A rational number, used for frame rates and pixel aspect ratios.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "PascalCase")]
pub struct Fraction {
    pub numerator: u32,
    pub denominator: u32,
}

impl Fraction {
    pub fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Swap numerator and denominator, converting a frame interval to a rate.
    pub fn inverse(self) -> Self {
        Self::new(self.denominator, self.numerator)
    }

    pub fn as_f64(self) -> Option<f64> {
        (self.denominator != 0).then(|| self.numerator as f64 / self.denominator as f64)
    }
}

/// Frame sizes supported for a pixel format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(tag = "Type")]
pub enum FrameSize {
    Discrete {
        #[serde(rename = "Width")]
        width: u32,
        #[serde(rename = "Height")]
        height: u32,
    },
    Stepwise {
        #[serde(rename = "MinWidth")]
        min_width: u32,
        #[serde(rename = "MaxWidth")]
        max_width: u32,
        #[serde(rename = "StepWidth")]
        step_width: u32,
        #[serde(rename = "MinHeight")]
        min_height: u32,
        #[serde(rename = "MaxHeight")]
        max_height: u32,
        #[serde(rename = "StepHeight")]
        step_height: u32,
    },
}

/// One pixel format a capture device can produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "PascalCase")]
pub struct ImageFormat {
    pub index: u32,
    pub description: String,
    /// FourCC code, e.g. `YUYV`.
    pub pixel_format: String,
    pub flags: Vec<String>,
    pub frame_sizes: Vec<FrameSize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "PascalCase")]
pub struct ImageFormats {
    pub image_formats: Vec<ImageFormat>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "PascalCase")]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

/// Cropping limits of a capture device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "PascalCase")]
pub struct CropCapability {
    pub bounds: Rect,
    pub default_rect: Rect,
    pub pixel_aspect: Fraction,
}

/// A flag value with its human readable description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "PascalCase")]
pub struct DescribedFlag {
    pub desc: String,
    pub value: u32,
}

/// Capture streaming parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "PascalCase")]
pub struct StreamingParameters {
    pub capability: DescribedFlag,
    pub capture_mode: DescribedFlag,
    pub time_per_frame: Fraction,
}

/// Frame rates available for one frame size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "PascalCase")]
pub struct FrameSizeRates {
    pub width: u32,
    pub height: u32,
    /// Frames per second as fractions, e.g. `30/1`.
    pub frame_rates: Vec<Fraction>,
}

/// Frame rates available for one pixel format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "PascalCase")]
pub struct FrameRateFormat {
    pub description: String,
    pub pixel_format: String,
    pub frame_sizes: Vec<FrameSizeRates>,
}

impl FrameRateFormat {
    /// Whether `rate` is offered for any frame size of this format.
    pub fn supports(&self, rate: Fraction) -> bool {
        let Some(wanted) = rate.as_f64() else {
            return false;
        };
        self.frame_sizes.iter().any(|size| {
            size.frame_rates
                .iter()
                .filter_map(|r| r.as_f64())
                .any(|r| (r - wanted).abs() < 1e-6)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_formatting() {
        assert_eq!(Capability::format_version(0x0005_0f02), "5.15.2");
    }

    #[test]
    fn test_frame_rate_support_compares_values() {
        let format = FrameRateFormat {
            description: "YUYV 4:2:2".to_string(),
            pixel_format: "YUYV".to_string(),
            frame_sizes: vec![FrameSizeRates {
                width: 640,
                height: 480,
                frame_rates: vec![Fraction::new(30, 1), Fraction::new(15, 1)],
            }],
        };
        assert!(format.supports(Fraction::new(60, 2)));
        assert!(!format.supports(Fraction::new(25, 1)));
        assert!(!format.supports(Fraction::new(30, 0)));
    }
}
