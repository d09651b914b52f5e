//! Transport backed by `hidapi`.

use std::sync::Mutex;

use anyhow::{Context, anyhow};
use hidapi::{HidApi, HidDevice};
use log::info;

use super::{
    Transport,
    protocol::{Command, RESPONSE_LEN},
};
use crate::{
    devices::DeviceId,
    error::{DaemonError, Result},
};

pub const READ_TIMEOUT: i32 = 250;

pub struct HidTransport {
    dev: Mutex<HidDevice>,
}

impl core::fmt::Debug for HidTransport {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HidTransport").finish_non_exhaustive()
    }
}

impl HidTransport {
    pub fn open(vid: u16, pid: u16) -> anyhow::Result<Self> {
        let api = HidApi::new().context("hidapi init")?;
        let dev = api
            .open(vid, pid)
            .map_err(|e| anyhow!("{e}"))
            .with_context(|| format!("Failed to open controller {vid:04X}:{pid:04X}"))?;
        info!(
            "{:?} controller PID={pid:04X}",
            dev.get_product_string().ok().flatten()
        );
        for packet in Command::Init.to_packets() {
            dev.write(&packet)
                .map_err(|e| anyhow!("{e}"))
                .context("Failed to send init packet")?;
        }

        Ok(Self {
            dev: Mutex::new(dev),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HidDevice>> {
        self.dev
            .lock()
            .map_err(|_| DaemonError::Transport("hid lock poisoned".into()))
    }
}

impl Transport for HidTransport {
    fn send(&self, _device: DeviceId, frame: &[u8]) -> Result<()> {
        write_frame(&self.lock()?, frame)
    }

    fn receive(&self, _device: DeviceId) -> Result<Vec<u8>> {
        read_frame(&self.lock()?)
    }

    fn request(&self, _device: DeviceId, frame: &[u8]) -> Result<Vec<u8>> {
        let dev = self.lock()?;
        write_frame(&dev, frame)?;
        read_frame(&dev)
    }
}

fn write_frame(dev: &HidDevice, frame: &[u8]) -> Result<()> {
    dev.write(frame)
        .map(|_| ())
        .map_err(|e| DaemonError::Transport(e.to_string()))
}

fn read_frame(dev: &HidDevice) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; RESPONSE_LEN];
    let n = dev
        .read_timeout(&mut buf, READ_TIMEOUT)
        .map_err(|e| DaemonError::Transport(e.to_string()))?;
    if n == 0 {
        return Err(DaemonError::Transport(format!(
            "no reply within {READ_TIMEOUT}ms"
        )));
    }
    buf.truncate(n);
    Ok(buf)
}
