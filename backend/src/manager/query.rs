//! Query parameters attached to command requests.

use crate::error::{DriverError, Result};
use crate::usb::StreamFormat;
use serde_json::{Map, Value};
use usbcam_types::command::URL_RAW_QUERY;
use usbcam_types::DevicePath;

/// Index into the device's path list.
pub const PATH_INDEX: &str = "PathIndex";
/// Stream format classification (`RGB`, `Greyscale`, `Depth`) a path must produce.
pub const STREAM_FORMAT: &str = "StreamFormat";
/// Video input whose status is queried.
pub const INPUT_INDEX: &str = "InputIndex";

/// Decoded query string of one command request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandQuery {
    params: Vec<(String, String)>,
}

impl CommandQuery {
    /// Remove the raw query from `attributes` and decode it.
    pub fn take(attributes: &mut Map<String, Value>) -> Result<Self> {
        match attributes.remove(URL_RAW_QUERY) {
            None | Some(Value::Null) => Ok(Self::default()),
            Some(Value::String(raw)) => Self::parse(&raw),
            Some(other) => Err(DriverError::contract(format!(
                "invalid query parameters: {}",
                other
            ))),
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim_start_matches('?');
        let mut params = Vec::new();
        for pair in raw.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            params.push((decode(key, raw)?, decode(value, raw)?));
        }
        Ok(Self { params })
    }

    /// First value of `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn path_selector(&self) -> Result<PathSelector> {
        match (self.get(PATH_INDEX), self.get(STREAM_FORMAT)) {
            (Some(_), Some(_)) => Err(DriverError::contract(format!(
                "query parameters {} and {} are mutually exclusive",
                PATH_INDEX, STREAM_FORMAT
            ))),
            (Some(index), None) => index.parse().map(PathSelector::Index).map_err(|_| {
                DriverError::contract(format!("invalid {} {:?}", PATH_INDEX, index))
            }),
            (None, Some(format)) => format
                .parse()
                .map(PathSelector::Format)
                .map_err(DriverError::contract),
            (None, None) => Ok(PathSelector::First),
        }
    }

    /// Required video input index.
    pub fn input_index(&self) -> Result<u32> {
        let index = self.get(INPUT_INDEX).ok_or_else(|| {
            DriverError::contract(format!("mandatory query parameter {} not found", INPUT_INDEX))
        })?;
        index.parse().map_err(|_| {
            DriverError::contract(format!(
                "could not convert the given {} {} to Uint32",
                INPUT_INDEX, index
            ))
        })
    }
}

fn decode(component: &str, raw: &str) -> Result<String> {
    urlencoding::decode(&component.replace('+', " "))
        .map(|s| s.into_owned())
        .map_err(|_| DriverError::contract(format!("invalid query parameters: {}", raw)))
}

/// Which of a device's paths a command targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathSelector {
    First,
    Index(usize),
    Format(StreamFormat),
}

impl PathSelector {
    pub fn select<'a>(&self, paths: &'a [DevicePath]) -> Option<&'a DevicePath> {
        match self {
            Self::First => paths.first(),
            Self::Index(index) => paths.get(*index),
            Self::Format(format) => paths.iter().find(|p| {
                p.format_description
                    .as_deref()
                    .is_some_and(|desc| StreamFormat::classify(desc) == *format)
            }),
        }
    }
}
