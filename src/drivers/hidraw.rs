//! Transport over a Linux `/dev/hidrawN` character device.

use std::{
    fs::{File, OpenOptions},
    io::{Read, Write},
    os::fd::AsRawFd,
    path::Path,
    sync::{Mutex, MutexGuard},
};

use anyhow::Context;
use log::info;

use super::{
    Transport,
    protocol::{Command, REPORT_LEN, RESPONSE_LEN},
};
use crate::{
    devices::DeviceId,
    error::{DaemonError, Result},
};

/// How long a read waits for the controller before giving up, in ms.
pub const READ_TIMEOUT: i32 = 250;

/// One controller node. The lock covers a whole request/response exchange.
#[derive(Debug)]
pub struct HidrawTransport {
    dev: Mutex<File>,
}

impl HidrawTransport {
    /// Opens the node and sends the controller init packet.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let dev = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        info!("Opened hidraw controller at {}", path.display());

        let transport = Self::from_file(dev);
        {
            let mut dev = transport.lock()?;
            for packet in Command::Init.to_packets() {
                write_report(&mut dev, &packet).context("Failed to send init packet")?;
            }
        }
        Ok(transport)
    }

    fn from_file(dev: File) -> Self {
        Self {
            dev: Mutex::new(dev),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, File>> {
        self.dev
            .lock()
            .map_err(|_| DaemonError::Transport("hidraw lock poisoned".into()))
    }
}

fn write_report(dev: &mut File, frame: &[u8]) -> Result<()> {
    if frame.len() > REPORT_LEN {
        return Err(DaemonError::Transport(format!(
            "frame of {} bytes exceeds report size",
            frame.len()
        )));
    }
    let mut report = [0u8; REPORT_LEN];
    report[..frame.len()].copy_from_slice(frame);

    dev.write_all(&report)
        .map_err(|e| DaemonError::Transport(e.to_string()))
}

/// Reads one report, waiting at most [`READ_TIMEOUT`] for it to arrive.
fn read_report(dev: &mut File) -> Result<Vec<u8>> {
    let mut pfd = libc::pollfd {
        fd: dev.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    };
    // SAFETY: `pfd` points to one valid pollfd for the duration of the call.
    let ready = unsafe { libc::poll(&mut pfd, 1, READ_TIMEOUT) };
    match ready {
        0 => {
            return Err(DaemonError::Transport(format!(
                "no reply within {READ_TIMEOUT}ms"
            )));
        }
        n if n < 0 => {
            return Err(DaemonError::Transport(
                std::io::Error::last_os_error().to_string(),
            ));
        }
        _ => {}
    }

    let mut buf = vec![0u8; RESPONSE_LEN];
    let n = dev
        .read(&mut buf)
        .map_err(|e| DaemonError::Transport(e.to_string()))?;
    if n == 0 {
        return Err(DaemonError::Transport("IncompleteRead".into()));
    }
    buf.truncate(n);
    Ok(buf)
}

impl Transport for HidrawTransport {
    fn send(&self, _device: DeviceId, frame: &[u8]) -> Result<()> {
        write_report(&mut *self.lock()?, frame)
    }

    fn receive(&self, _device: DeviceId) -> Result<Vec<u8>> {
        read_report(&mut *self.lock()?)
    }

    fn request(&self, _device: DeviceId, frame: &[u8]) -> Result<Vec<u8>> {
        let mut dev = self.lock()?;
        write_report(&mut dev, frame)?;
        read_report(&mut dev)
    }
}
