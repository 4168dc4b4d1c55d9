//! Capture devices backed by the `v4l` crate.
//!
//! Format, frame size and streaming parameter queries use the crate's
//! `Capture` API. Capabilities, inputs and cropping are not covered by it and
//! go through raw V4L2 ioctls on the same file descriptor.

use super::capture::{CaptureBackend, CaptureDevice};
use std::io;
use std::os::raw::{c_int, c_void};
use usbcam_types::metadata::{
    Capability, CropCapability, DataFormat, DescribedFlag, Fraction, FrameRateFormat, FrameSize,
    FrameSizeRates, ImageFormat, Rect, StreamingParameters,
};
use v4l::capability::Flags as CapFlags;
use v4l::format::description::Flags as FormatFlags;
use v4l::frameinterval::FrameIntervalEnum;
use v4l::framesize::FrameSizeEnum;
use v4l::parameters::{Capabilities as ParamCapabilities, Modes};
use v4l::v4l2::{self, vidioc};
use v4l::v4l_sys;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::{Device, FourCC};

const CAP_DESCRIPTIONS: &[(CapFlags, &str)] = &[
    (CapFlags::VIDEO_CAPTURE, "Video Capture"),
    (CapFlags::VIDEO_OUTPUT, "Video Output"),
    (CapFlags::VIDEO_OVERLAY, "Video Overlay"),
    (CapFlags::VIDEO_CAPTURE_MPLANE, "Video Capture Multiplanar"),
    (CapFlags::META_CAPTURE, "Metadata Capture"),
    (CapFlags::EXT_PIX_FORMAT, "Extended Pix Format"),
    (CapFlags::READ_WRITE, "Read/Write"),
    (CapFlags::STREAMING, "Streaming"),
    (CapFlags::DEVICE_CAPS, "Device Capabilities"),
];

const DESC_NOT_SPECIFIED: &str = "not specified";
const DESC_TIME_PER_FRAME: &str = "time per frame";
const DESC_HIGH_QUALITY: &str = "high quality";

/// Opens `/dev/video*` nodes through V4L2.
#[derive(Debug, Clone, Copy, Default)]
pub struct V4lBackend;

impl CaptureBackend for V4lBackend {
    fn open(&self, path: &str) -> io::Result<Box<dyn CaptureDevice>> {
        let device = Device::with_path(path)?;
        Ok(Box::new(V4lDevice { device }))
    }
}

pub struct V4lDevice {
    device: Device,
}

impl V4lDevice {
    /// Run a read-style ioctl that fills `value`.
    fn ioctl<T>(&self, request: vidioc::_IOC_TYPE, value: &mut T) -> io::Result<()> {
        unsafe {
            v4l2::ioctl(
                self.device.handle().fd(),
                request,
                value as *mut T as *mut c_void,
            )
        }
    }

    fn query_capability(&self) -> io::Result<v4l_sys::v4l2_capability> {
        let mut caps: v4l_sys::v4l2_capability = unsafe { std::mem::zeroed() };
        self.ioctl(vidioc::VIDIOC_QUERYCAP, &mut caps)?;
        Ok(caps)
    }

    /// Capabilities of this node, falling back to the driver-wide set on old kernels.
    fn device_flags(caps: &v4l_sys::v4l2_capability) -> CapFlags {
        let driver = CapFlags::from(caps.capabilities);
        if driver.contains(CapFlags::DEVICE_CAPS) {
            CapFlags::from(caps.device_caps)
        } else {
            driver
        }
    }

    fn frame_rates_for(&self, fourcc: FourCC, width: u32, height: u32) -> io::Result<Vec<Fraction>> {
        let intervals = self.device.enum_frameintervals(fourcc, width, height)?;
        let mut rates = Vec::new();
        for interval in intervals {
            match interval.interval {
                FrameIntervalEnum::Discrete(frac) => {
                    rates.push(Fraction::new(frac.denominator, frac.numerator));
                }
                FrameIntervalEnum::Stepwise(step) => {
                    // Report the bounds of a continuous range.
                    rates.push(Fraction::new(step.min.denominator, step.min.numerator));
                    rates.push(Fraction::new(step.max.denominator, step.max.numerator));
                }
            }
        }
        Ok(rates)
    }
}

fn describe_caps(flags: CapFlags) -> Vec<String> {
    CAP_DESCRIPTIONS
        .iter()
        .filter(|(flag, _)| flags.contains(*flag))
        .map(|(_, desc)| desc.to_string())
        .collect()
}

fn c_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim().to_string()
}

fn rect(r: &v4l_sys::v4l2_rect) -> Rect {
    Rect {
        left: r.left,
        top: r.top,
        width: r.width,
        height: r.height,
    }
}

fn describe_flag(value: u32, set: bool, desc: &str) -> DescribedFlag {
    DescribedFlag {
        desc: if set { desc } else { DESC_NOT_SPECIFIED }.to_string(),
        value,
    }
}

impl CaptureDevice for V4lDevice {
    fn capability(&self) -> io::Result<Capability> {
        let caps = self.query_capability()?;
        Ok(Capability {
            driver: c_string(&caps.driver),
            card: c_string(&caps.card),
            bus_info: c_string(&caps.bus_info),
            version: Capability::format_version(caps.version),
            driver_caps: describe_caps(CapFlags::from(caps.capabilities)),
            device_caps: describe_caps(Self::device_flags(&caps)),
        })
    }

    fn is_capture_capable(&self) -> io::Result<bool> {
        let caps = self.query_capability()?;
        let flags = Self::device_flags(&caps);
        Ok(flags.contains(CapFlags::VIDEO_CAPTURE) && flags.contains(CapFlags::STREAMING))
    }

    fn format_description(&self) -> io::Result<String> {
        let current = self.device.format()?.fourcc;
        let description = self
            .device
            .enum_formats()?
            .into_iter()
            .find(|desc| desc.fourcc == current)
            .map(|desc| desc.description);
        Ok(description.unwrap_or_else(|| current.to_string()))
    }

    fn current_input(&self) -> io::Result<i32> {
        let mut index: c_int = 0;
        self.ioctl(vidioc::VIDIOC_G_INPUT, &mut index)?;
        Ok(index)
    }

    fn input_status(&self, index: u32) -> io::Result<u32> {
        let mut input: v4l_sys::v4l2_input = unsafe { std::mem::zeroed() };
        input.index = index;
        self.ioctl(vidioc::VIDIOC_ENUMINPUT, &mut input)?;
        Ok(input.status)
    }

    fn image_formats(&self) -> io::Result<Vec<ImageFormat>> {
        let mut formats = Vec::new();
        for desc in self.device.enum_formats()? {
            let frame_sizes = self
                .device
                .enum_framesizes(desc.fourcc)?
                .into_iter()
                .map(|size| match size.size {
                    FrameSizeEnum::Discrete(d) => FrameSize::Discrete {
                        width: d.width,
                        height: d.height,
                    },
                    FrameSizeEnum::Stepwise(s) => FrameSize::Stepwise {
                        min_width: s.min_width,
                        max_width: s.max_width,
                        step_width: s.step_width,
                        min_height: s.min_height,
                        max_height: s.max_height,
                        step_height: s.step_height,
                    },
                })
                .collect();

            let mut flags = Vec::new();
            if desc.flags.contains(FormatFlags::COMPRESSED) {
                flags.push("compressed".to_string());
            }
            if desc.flags.contains(FormatFlags::EMULATED) {
                flags.push("emulated".to_string());
            }

            formats.push(ImageFormat {
                index: desc.index,
                description: desc.description,
                pixel_format: desc.fourcc.to_string(),
                flags,
                frame_sizes,
            });
        }
        Ok(formats)
    }

    fn data_format(&self) -> io::Result<DataFormat> {
        let format = self.device.format()?;
        Ok(DataFormat {
            width: format.width,
            height: format.height,
            pixel_format: format.fourcc.to_string(),
            field: format.field_order.to_string(),
            bytes_per_line: format.stride,
            size_image: format.size,
            colorspace: format.colorspace.to_string(),
            xfer_func: format.transfer.to_string(),
            quantization: format.quantization.to_string(),
        })
    }

    fn crop_capability(&self) -> io::Result<CropCapability> {
        let mut cropcap: v4l_sys::v4l2_cropcap = unsafe { std::mem::zeroed() };
        cropcap.type_ = v4l_sys::v4l2_buf_type_V4L2_BUF_TYPE_VIDEO_CAPTURE;
        self.ioctl(vidioc::VIDIOC_CROPCAP, &mut cropcap)?;
        Ok(CropCapability {
            bounds: rect(&cropcap.bounds),
            default_rect: rect(&cropcap.defrect),
            pixel_aspect: Fraction::new(
                cropcap.pixelaspect.numerator,
                cropcap.pixelaspect.denominator,
            ),
        })
    }

    fn streaming_parameters(&self) -> io::Result<StreamingParameters> {
        let params = self.device.params()?;
        Ok(StreamingParameters {
            capability: describe_flag(
                params.capabilities.bits(),
                params.capabilities.contains(ParamCapabilities::TIME_PER_FRAME),
                DESC_TIME_PER_FRAME,
            ),
            capture_mode: describe_flag(
                params.modes.bits(),
                params.modes.contains(Modes::HIGH_QUALITY),
                DESC_HIGH_QUALITY,
            ),
            time_per_frame: Fraction::new(params.interval.numerator, params.interval.denominator),
        })
    }

    fn frame_rate_formats(&self) -> io::Result<Vec<FrameRateFormat>> {
        let mut formats = Vec::new();
        for desc in self.device.enum_formats()? {
            let mut frame_sizes = Vec::new();
            for size in self.device.enum_framesizes(desc.fourcc)? {
                let (width, height) = match size.size {
                    FrameSizeEnum::Discrete(d) => (d.width, d.height),
                    // Continuous sizes are summarized by their largest frame.
                    FrameSizeEnum::Stepwise(s) => (s.max_width, s.max_height),
                };
                frame_sizes.push(FrameSizeRates {
                    width,
                    height,
                    frame_rates: self.frame_rates_for(desc.fourcc, width, height)?,
                });
            }
            formats.push(FrameRateFormat {
                description: desc.description,
                pixel_format: desc.fourcc.to_string(),
                frame_sizes,
            });
        }
        Ok(formats)
    }

    fn frame_rate(&self) -> io::Result<Fraction> {
        let interval = self.device.params()?.interval;
        Ok(Fraction::new(interval.denominator, interval.numerator))
    }

    fn set_frame_rate(&mut self, fps: Fraction) -> io::Result<Fraction> {
        let requested = Parameters::new(v4l::Fraction::new(fps.denominator, fps.numerator));
        let applied = self.device.set_params(&requested)?;
        Ok(Fraction::new(
            applied.interval.denominator,
            applied.interval.numerator,
        ))
    }

    fn set_pixel_format(
        &mut self,
        width: u32,
        height: u32,
        fourcc: [u8; 4],
    ) -> io::Result<DataFormat> {
        let mut format = self.device.format()?;
        format.width = width;
        format.height = height;
        format.fourcc = FourCC::new(&fourcc);
        self.device.set_format(&format)?;
        self.data_format()
    }
}
