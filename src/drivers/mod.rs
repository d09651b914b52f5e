//! Transport drivers for the controller bus.
//!
//! A [`Transport`] moves opaque frames to and from a device port. It never
//! interprets payloads; encoding lives in [`protocol`] and is driven by the
//! device handles.

pub mod hidraw;
pub mod protocol;

#[cfg(feature = "hid")]
pub mod hid;

use std::sync::Arc;

use crate::{config::TransportCfg, devices::DeviceId, error::Result};

/// Raw I/O capability shared by every device handle.
///
/// Implementations must be safe to call from several workers at once.
#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send + Sync + core::fmt::Debug {
    /// Sends one encoded frame to `device`.
    fn send(&self, device: DeviceId, frame: &[u8]) -> Result<()>;

    /// Reads the next status frame produced by `device`.
    fn receive(&self, device: DeviceId) -> Result<Vec<u8>>;

    /// Sends `frame` and reads its reply as one exchange. The controller
    /// answers in send order, so no other exchange may run in between.
    fn request(&self, device: DeviceId, frame: &[u8]) -> Result<Vec<u8>>;
}

/// Opens the transport described by the configuration.
pub fn open(cfg: &TransportCfg) -> anyhow::Result<Arc<dyn Transport>> {
    match cfg {
        TransportCfg::Hidraw { path } => Ok(Arc::new(hidraw::HidrawTransport::open(path)?)),
        #[cfg(feature = "hid")]
        TransportCfg::Hidapi { vid, pid } => Ok(Arc::new(hid::HidTransport::open(*vid, *pid)?)),
        #[cfg(not(feature = "hid"))]
        TransportCfg::Hidapi { .. } => {
            anyhow::bail!("hidapi transport requested but tt_rgbd was built without the `hid` feature")
        }
    }
}
