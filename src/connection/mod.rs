// Port health tracking

pub mod status;

pub use status::{AtomicDeviceStatus, DeviceStatus};
