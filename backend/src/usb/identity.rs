//! Camera identity and device naming.

use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

/// Anything outside the unreserved URI characters, minus `.` and `~`.
static RESERVED_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9_-]+").expect("reserved chars pattern"));

pub const UDEV_V4L_PRODUCT: &str = "ID_V4L_PRODUCT";
pub const UDEV_SERIAL_SHORT: &str = "ID_SERIAL_SHORT";
pub const UDEV_SERIAL: &str = "ID_SERIAL";

/// Card name and serial number of a physical camera.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceIdentity {
    pub card_name: String,
    pub serial_number: String,
}

impl DeviceIdentity {
    pub fn new(card_name: impl Into<String>, serial_number: impl Into<String>) -> Self {
        Self {
            card_name: card_name.into(),
            serial_number: serial_number.into(),
        }
    }

    /// Logical device name derived from this identity.
    pub fn device_name(&self) -> String {
        build_device_name(&self.card_name, &self.serial_number)
    }

    /// Extract an identity from `udevadm info --query=property` output.
    ///
    /// The serial number prefers `ID_SERIAL_SHORT` and falls back to `ID_SERIAL`.
    pub fn from_udev_properties(output: &str) -> Option<Self> {
        let props = parse_udev_properties(output);
        let card_name = props.get(UDEV_V4L_PRODUCT).filter(|v| !v.is_empty())?;
        let serial_number = props
            .get(UDEV_SERIAL_SHORT)
            .filter(|v| !v.is_empty())
            .or_else(|| props.get(UDEV_SERIAL).filter(|v| !v.is_empty()))?;
        Some(Self::new(card_name.clone(), serial_number.clone()))
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.card_name, self.serial_number)
    }
}

/// Build a device name containing only alphanumerics, `-` and `_`.
pub fn build_device_name(card_name: &str, serial_number: &str) -> String {
    format!("{}-{}", sanitize(card_name), sanitize(serial_number))
}

fn sanitize(value: &str) -> String {
    RESERVED_CHARS
        .replace_all(value, "_")
        .trim_matches('_')
        .to_string()
}

fn parse_udev_properties(output: &str) -> HashMap<&str, String> {
    output
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim(), value.trim().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_device_name() {
        assert_eq!(
            build_device_name("UVC Camera (046d:0825)", "61C0AE50"),
            "UVC_Camera_046d_0825-61C0AE50"
        );
        assert_eq!(
            build_device_name("Intel(R) RealSense(TM) Depth Camera 435", "__001~2.3 "),
            "Intel_R_RealSense_TM_Depth_Camera_435-001_2_3"
        );
    }

    #[test]
    fn test_device_name_only_allowed_chars() {
        let name = build_device_name("  ~Cam/é:\"weird\"!  ", "S/N:12.34");
        assert!(name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert!(!name.starts_with('_'));
    }

    #[test]
    fn test_identity_from_udev() {
        let output = "\
DEVNAME=/dev/video0
ID_V4L_PRODUCT=UVC Camera (046d:0825)
ID_SERIAL=046d_0825_61C0AE50
ID_SERIAL_SHORT=61C0AE50
";
        let identity = DeviceIdentity::from_udev_properties(output).unwrap();
        assert_eq!(identity, DeviceIdentity::new("UVC Camera (046d:0825)", "61C0AE50"));
        assert_eq!(identity.device_name(), "UVC_Camera_046d_0825-61C0AE50");
    }

    #[test]
    fn test_identity_falls_back_to_long_serial() {
        let output = "ID_V4L_PRODUCT=HD Webcam\nID_SERIAL=Generic_HD_Webcam\n";
        let identity = DeviceIdentity::from_udev_properties(output).unwrap();
        assert_eq!(identity.serial_number, "Generic_HD_Webcam");
    }

    #[test]
    fn test_identity_requires_card_and_serial() {
        assert!(DeviceIdentity::from_udev_properties("ID_SERIAL_SHORT=1234\n").is_none());
        assert!(DeviceIdentity::from_udev_properties("ID_V4L_PRODUCT=Cam\n").is_none());
    }
}
