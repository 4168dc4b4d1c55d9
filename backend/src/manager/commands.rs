//! Read and write command dispatch.

use super::query::CommandQuery;
use super::DeviceManager;
use crate::device::Device;
use crate::error::{DriverError, Result};
use crate::transcoder::options::TranscodeOptions;
use crate::usb::capture::parse_fourcc;
use crate::usb::{CaptureBackend, CaptureDevice};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;
use usbcam_types::command::URL_RAW_QUERY;
use usbcam_types::metadata::{Fraction, ImageFormats};
use usbcam_types::registry::commands::*;
use usbcam_types::{CommandRequest, CommandValue, ValueType};

/// Parameters of the set-frame-rate command.
const FRAME_RATE_NUMERATOR: &str = "FrameRateValueNumerator";
const FRAME_RATE_DENOMINATOR: &str = "FrameRateValueDenominator";
/// Parameters of the set-pixel-format command.
const WIDTH: &str = "Width";
const HEIGHT: &str = "Height";
const PIXEL_FORMAT: &str = "PixelFormat";

/// Lazily opened capture handle shared by one command batch.
struct CaptureSession<'a> {
    backend: &'a dyn CaptureBackend,
    path: &'a str,
    handle: Option<Box<dyn CaptureDevice>>,
}

impl<'a> CaptureSession<'a> {
    fn new(backend: &'a dyn CaptureBackend, path: &'a str) -> Self {
        Self {
            backend,
            path,
            handle: None,
        }
    }

    fn device(&mut self) -> Result<&mut dyn CaptureDevice> {
        if self.handle.is_none() {
            let opened = self.backend.open(self.path).map_err(|e| {
                DriverError::server_with(
                    format!(
                        "failed to open the underlying device at specified path {}",
                        self.path
                    ),
                    e,
                )
            })?;
            self.handle = Some(opened);
        }
        self.handle
            .as_deref_mut()
            .ok_or_else(|| DriverError::server(format!("no capture handle for {}", self.path)))
    }
}

fn command_of(request: &CommandRequest) -> Result<&str> {
    request.command().ok_or_else(|| {
        DriverError::contract(format!(
            "command for USB camera resource {} is not specified, please check device profile",
            request.resource_name
        ))
    })
}

fn unsupported(command: &str) -> DriverError {
    DriverError::contract(format!("unsupported command {}", command))
}

fn reading(request: &CommandRequest, value_type: ValueType, value: impl Serialize) -> Result<CommandValue> {
    CommandValue::new(&request.resource_name, value_type, value)
        .map_err(|e| DriverError::server_with("failed to create CommandValue", e))
}

/// Snapshot of device state the blocking part of a read batch needs.
struct ReadContext {
    status: usbcam_types::StreamingStatus,
    stream_uri: String,
}

fn read_one(
    session: &mut CaptureSession<'_>,
    request: &CommandRequest,
    query: &CommandQuery,
    ctx: &ReadContext,
) -> Result<CommandValue> {
    let command = command_of(request)?;
    let failed = |e: std::io::Error| DriverError::command(command, e);

    match command {
        METADATA_DEVICE_CAPABILITY => {
            let capability = session.device()?.capability().map_err(failed)?;
            reading(request, ValueType::Object, capability)
        }
        METADATA_CURRENT_VIDEO_INPUT => {
            let input = session.device()?.current_input().map_err(failed)?;
            reading(request, ValueType::Int32, input)
        }
        METADATA_CAMERA_STATUS => {
            let index = query.input_index()?;
            let status = session.device()?.input_status(index).map_err(failed)?;
            reading(request, ValueType::Uint32, status)
        }
        METADATA_IMAGE_FORMATS => {
            let image_formats = session.device()?.image_formats().map_err(failed)?;
            reading(request, ValueType::Object, ImageFormats { image_formats })
        }
        METADATA_DATA_FORMAT | VIDEO_GET_PIXEL_FORMAT => {
            let format = session.device()?.data_format().map_err(failed)?;
            reading(request, ValueType::Object, format)
        }
        METADATA_CROPPING_ABILITY => {
            let crop = session.device()?.crop_capability().map_err(failed)?;
            reading(request, ValueType::Object, crop)
        }
        METADATA_STREAMING_PARAMETERS => {
            let params = session.device()?.streaming_parameters().map_err(failed)?;
            reading(request, ValueType::Object, params)
        }
        METADATA_FRAME_RATE_FORMATS => {
            let formats = session.device()?.frame_rate_formats().map_err(failed)?;
            reading(request, ValueType::Object, formats)
        }
        VIDEO_GET_FRAME_RATE => {
            let rate = session.device()?.frame_rate().map_err(failed)?;
            reading(request, ValueType::Object, rate)
        }
        VIDEO_STREAM_URI => Ok(CommandValue::string(&request.resource_name, &ctx.stream_uri)),
        VIDEO_STREAMING_STATUS => reading(request, ValueType::Object, &ctx.status),
        other => Err(unsupported(other)),
    }
}

fn string_param<'p>(params: &'p Map<String, Value>, key: &str) -> Result<&'p str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| DriverError::contract(format!("parameter {} should be a string", key)))
}

fn number_param(params: &Map<String, Value>, key: &str) -> Result<u32> {
    let raw = string_param(params, key)?;
    raw.trim()
        .parse()
        .map_err(|_| DriverError::contract(format!("invalid value {:?} for parameter {}", raw, key)))
}

fn same_rate(a: Fraction, b: Fraction) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => (a - b).abs() < 1e-6,
        _ => false,
    }
}

fn set_frame_rate(session: &mut CaptureSession<'_>, params: &Map<String, Value>) -> Result<Fraction> {
    let rate = Fraction::new(
        number_param(params, FRAME_RATE_NUMERATOR)?,
        number_param(params, FRAME_RATE_DENOMINATOR)?,
    );
    if rate.as_f64().is_none() {
        return Err(DriverError::contract("frame rate denominator must not be zero"));
    }

    let failed = |e: std::io::Error| DriverError::command(VIDEO_SET_FRAME_RATE, e);
    let device = session.device()?;
    let format = device.data_format().map_err(failed)?;
    let supported = device
        .frame_rate_formats()
        .map_err(failed)?
        .into_iter()
        .filter(|f| f.pixel_format == format.pixel_format)
        .any(|f| {
            let sized = f
                .frame_sizes
                .iter()
                .find(|s| s.width == format.width && s.height == format.height);
            match sized {
                Some(size) => size.frame_rates.iter().any(|r| same_rate(*r, rate)),
                None => f.supports(rate),
            }
        });
    if !supported {
        return Err(DriverError::Communication(format!(
            "frame rate {}/{} is not supported for {} {}x{}",
            rate.numerator, rate.denominator, format.pixel_format, format.width, format.height
        )));
    }

    device.set_frame_rate(rate).map_err(failed)
}

fn set_pixel_format(session: &mut CaptureSession<'_>, params: &Map<String, Value>) -> Result<()> {
    let width = number_param(params, WIDTH)?;
    let height = number_param(params, HEIGHT)?;
    let code = string_param(params, PIXEL_FORMAT)?;
    let fourcc = parse_fourcc(code).ok_or_else(|| {
        DriverError::contract(format!("invalid pixel format {:?}, expected a FourCC code", code))
    })?;

    let applied = session
        .device()?
        .set_pixel_format(width, height, fourcc)
        .map_err(|e| DriverError::command(VIDEO_SET_PIXEL_FORMAT, e))?;
    if applied.width != width || applied.height != height || applied.pixel_format != code {
        return Err(DriverError::Communication(format!(
            "pixel format {} {}x{} is not supported, device uses {} {}x{}",
            code, width, height, applied.pixel_format, applied.width, applied.height
        )));
    }
    Ok(())
}

impl DeviceManager {
    /// Build a command request for `resource_name` from the device's profile.
    pub async fn command_request(
        &self,
        device_name: &str,
        resource_name: &str,
        raw_query: Option<&str>,
    ) -> Result<CommandRequest> {
        let registered = self.registry().device(device_name).await?;
        let profile = self.registry().profile(&registered.profile_name).await?;
        let resource = profile.resource(resource_name).ok_or_else(|| {
            DriverError::not_found(format!(
                "resource {} not found in profile {}",
                resource_name, profile.name
            ))
        })?;

        let mut request = CommandRequest::new(&resource.name, resource.value_type);
        request.attributes = resource.attributes.clone();
        if let Some(raw) = raw_query.filter(|q| !q.is_empty()) {
            request
                .attributes
                .insert(URL_RAW_QUERY.to_string(), Value::String(raw.to_string()));
        }
        Ok(request)
    }

    /// Path a command batch targets, from the query of its first request.
    async fn command_path(&self, device: &Arc<Device>, query: &CommandQuery) -> Result<String> {
        let selector = query.path_selector()?;
        let paths = device.paths().await;
        match selector.select(&paths) {
            Some(path) => Ok(path.path.clone()),
            None => {
                self.refresh_in_background(device.clone());
                Err(DriverError::not_found(format!(
                    "no path matching {:?} for device {}",
                    selector,
                    device.name()
                )))
            }
        }
    }

    /// Execute a batch of read commands against one device.
    pub async fn handle_read_commands(
        &self,
        device_name: &str,
        mut requests: Vec<CommandRequest>,
    ) -> Result<Vec<CommandValue>> {
        let device = self.device(device_name).await?;
        let queries = requests
            .iter_mut()
            .map(|r| CommandQuery::take(&mut r.attributes))
            .collect::<Result<Vec<_>>>()?;
        let Some(first) = queries.first() else {
            return Ok(Vec::new());
        };

        let path = self.command_path(&device, first).await?;
        let ctx = ReadContext {
            status: device.status().await,
            stream_uri: device.stream_uris().await.public,
        };
        debug!(
            "Reading {} command(s) from device {} at {}",
            requests.len(),
            device_name,
            path
        );

        let backend = self.inner.capture.clone();
        tokio::task::spawn_blocking(move || {
            let mut session = CaptureSession::new(backend.as_ref(), &path);
            requests
                .iter()
                .zip(&queries)
                .map(|(request, query)| read_one(&mut session, request, query, &ctx))
                .collect()
        })
        .await
        .map_err(|e| DriverError::server_with("command execution was interrupted", e))?
    }

    /// Execute a batch of write commands against one device. `params` holds
    /// one value per request.
    pub async fn handle_write_commands(
        &self,
        device_name: &str,
        mut requests: Vec<CommandRequest>,
        params: Vec<CommandValue>,
    ) -> Result<()> {
        if requests.len() != params.len() {
            return Err(DriverError::contract(format!(
                "{} command(s) but {} parameter(s)",
                requests.len(),
                params.len()
            )));
        }
        let device = self.device(device_name).await?;

        for (request, param) in requests.iter_mut().zip(params) {
            let query = CommandQuery::take(&mut request.attributes)?;
            let command = command_of(request)?.to_string();

            match command.as_str() {
                VIDEO_START_STREAMING => {
                    let body = param
                        .object()
                        .ok_or_else(|| DriverError::contract("failed to parse request body"))?;
                    let options = TranscodeOptions::from_request(body, &request.attributes)?;
                    let input = self.command_path(&device, &query).await?;
                    self.start_streaming(&device, &input, Some(options)).await?;
                }
                VIDEO_STOP_STREAMING => {
                    self.stop_device(&device).await;
                    device.publish_status(self.publisher()).await;
                }
                VIDEO_SET_FRAME_RATE | VIDEO_SET_PIXEL_FORMAT => {
                    let body = param.object().cloned().ok_or_else(|| {
                        DriverError::contract(format!("parameter of {} should be an object", command))
                    })?;
                    let path = self.command_path(&device, &query).await?;
                    let backend = self.inner.capture.clone();
                    let setting = command.clone();
                    tokio::task::spawn_blocking(move || {
                        let mut session = CaptureSession::new(backend.as_ref(), &path);
                        if setting == VIDEO_SET_FRAME_RATE {
                            let applied = set_frame_rate(&mut session, &body)?;
                            debug!("Frame rate of {} set to {:?}", path, applied);
                            Ok(())
                        } else {
                            set_pixel_format(&mut session, &body)
                        }
                    })
                    .await
                    .map_err(|e| DriverError::server_with("command execution was interrupted", e))??;
                }
                other => return Err(unsupported(other)),
            }
        }
        Ok(())
    }
}
