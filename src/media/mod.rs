//! Local media module
//!
//! Capture providers open devices and hand out [`LocalTrack`]s; the
//! [`MediaDeviceController`] owns those tracks for the lifetime of a call.
//!
//! Providers:
//! - [`SyntheticCaptureProvider`]: no hardware, for headless clients and tests
//! - `HostCaptureProvider`: V4L2 cameras and ALSA devices (`host-capture` feature)

pub mod controller;
pub mod device;
#[cfg(feature = "host-capture")]
pub mod host;
pub mod synthetic;
pub mod track;

pub use controller::MediaDeviceController;
pub use device::{CaptureProvider, DeviceKind, MediaConstraints, MediaDeviceInfo};
#[cfg(feature = "host-capture")]
pub use host::HostCaptureProvider;
pub use synthetic::SyntheticCaptureProvider;
pub use track::{LocalStream, LocalTrack, MediaKind};
