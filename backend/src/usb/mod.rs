//! USB camera access: identities, host probing, path resolution and capture handles.

pub mod capture;
pub mod identity;
pub mod probe;
pub mod resolver;
pub mod v4l_backend;

pub use capture::{CaptureBackend, CaptureDevice, StreamFormat};
pub use identity::{build_device_name, DeviceIdentity};
pub use probe::{HostProbe, UdevProbe};
pub use resolver::{HostCamera, PathResolver};
pub use v4l_backend::V4lBackend;
