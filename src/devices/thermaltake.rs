//! Concrete Thermaltake device handles.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
#[cfg(debug_assertions)]
use log::debug;
use tokio::{sync::Mutex, task, time::timeout};

use super::{Device, DeviceId, DeviceKind, FanControl, FanStatus, LightingControl};
use crate::{
    drivers::{
        Transport,
        protocol::{Command, Response, STATUS_OK},
    },
    error::{DaemonError, Result},
    lighting::LightingFrame,
};

/// Upper bound on one command, all of its packets included.
const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(2);

/// One controller port. Commands on a port never interleave, so a
/// multi-packet lighting frame is not split by a speed update.
///
/// Transport calls block, so they run on the blocking pool and the runtime
/// thread stays free for the other manager.
#[derive(Debug)]
struct Port {
    id: DeviceId,
    kind: DeviceKind,
    transport: Arc<dyn Transport>,
    io: Mutex<()>,
}

impl Port {
    fn new(transport: Arc<dyn Transport>, id: DeviceId, kind: DeviceKind) -> Self {
        Self {
            id,
            kind,
            transport,
            io: Mutex::new(()),
        }
    }

    /// Sends every packet of `cmd` and returns the last reply, or the first
    /// one that is not an acknowledgement.
    async fn request(&self, cmd: Command) -> Result<Response> {
        let _guard = self.io.lock().await;

        let id = self.id;
        let transport = self.transport.clone();
        let packets = cmd.to_packets();
        let exchange = task::spawn_blocking(move || -> Result<Vec<Vec<u8>>> {
            let mut replies = Vec::with_capacity(packets.len());
            for packet in &packets {
                let reply = transport.request(id, packet)?;
                let rejected = packets.len() > 1 && reply.get(2) != Some(&STATUS_OK);
                replies.push(reply);
                if rejected {
                    break;
                }
            }
            Ok(replies)
        });

        let replies = timeout(EXCHANGE_TIMEOUT, exchange)
            .await
            .map_err(|_| DaemonError::device_write(id, "controller did not answer in time"))?
            .map_err(|e| DaemonError::device_write(id, e))?
            .map_err(|e| DaemonError::device_write(id, e))?;

        let mut last = None;
        for reply in &replies {
            let response = Response::parse(&cmd, reply).map_err(|e| DaemonError::device_write(id, e))?;
            if matches!(response, Response::Status(code) if code != STATUS_OK) {
                return Ok(response);
            }
            last = Some(response);
        }
        last.ok_or_else(|| DaemonError::device_write(id, "no reply"))
    }

    async fn set_speed(&self, percent: u8) -> Result<()> {
        let speed = percent.min(100);
        #[cfg(debug_assertions)]
        debug!("device {} ({}): speed {speed}%", self.id, self.kind);
        self.request(Command::SetSpeed {
            port: self.id.port(),
            speed,
        })
        .await?
        .expect_ok()
        .map_err(|reason| DaemonError::device_write(self.id, reason))
    }

    async fn read_status(&self) -> Result<FanStatus> {
        match self
            .request(Command::GetData {
                port: self.id.port(),
            })
            .await?
        {
            Response::Data { speed, rpm } => Ok(FanStatus { speed, rpm }),
            other => Err(DaemonError::device_write(
                self.id,
                format!("unexpected response {other:?}"),
            )),
        }
    }

    async fn set_lighting(&self, frame: &LightingFrame) -> Result<()> {
        self.request(Command::SetRgb {
            port: self.id.port(),
            mode: frame.mode.code(),
            colors: frame.colors.clone(),
        })
        .await?
        .expect_ok()
        .map_err(|reason| DaemonError::device_write(self.id, reason))
    }
}

/// Fan without addressable lighting.
#[derive(Debug)]
pub struct FanDevice(Port);

impl FanDevice {
    pub fn new(transport: Arc<dyn Transport>, id: DeviceId, kind: DeviceKind) -> Self {
        Self(Port::new(transport, id, kind))
    }
}

impl Device for FanDevice {
    fn id(&self) -> DeviceId {
        self.0.id
    }

    fn kind(&self) -> DeviceKind {
        self.0.kind
    }

    fn fan(self: Arc<Self>) -> Option<Arc<dyn FanControl>> {
        Some(self)
    }
}

#[async_trait]
impl FanControl for FanDevice {
    async fn set_speed(&self, percent: u8) -> Result<()> {
        self.0.set_speed(percent).await
    }

    async fn read_status(&self) -> Result<FanStatus> {
        self.0.read_status().await
    }
}

/// LED strip without a fan.
#[derive(Debug)]
pub struct LightingDevice(Port);

impl LightingDevice {
    pub fn new(transport: Arc<dyn Transport>, id: DeviceId, kind: DeviceKind) -> Self {
        Self(Port::new(transport, id, kind))
    }
}

impl Device for LightingDevice {
    fn id(&self) -> DeviceId {
        self.0.id
    }

    fn kind(&self) -> DeviceKind {
        self.0.kind
    }

    fn lighting(self: Arc<Self>) -> Option<Arc<dyn LightingControl>> {
        Some(self)
    }
}

#[async_trait]
impl LightingControl for LightingDevice {
    fn led_count(&self) -> usize {
        self.0.kind.led_count()
    }

    async fn set_lighting(&self, frame: &LightingFrame) -> Result<()> {
        self.0.set_lighting(frame).await
    }
}

/// RGB fan: both capabilities on one port.
#[derive(Debug)]
pub struct RgbFanDevice(Port);

impl RgbFanDevice {
    pub fn new(transport: Arc<dyn Transport>, id: DeviceId, kind: DeviceKind) -> Self {
        Self(Port::new(transport, id, kind))
    }
}

impl Device for RgbFanDevice {
    fn id(&self) -> DeviceId {
        self.0.id
    }

    fn kind(&self) -> DeviceKind {
        self.0.kind
    }

    fn fan(self: Arc<Self>) -> Option<Arc<dyn FanControl>> {
        Some(self)
    }

    fn lighting(self: Arc<Self>) -> Option<Arc<dyn LightingControl>> {
        Some(self)
    }
}

#[async_trait]
impl FanControl for RgbFanDevice {
    async fn set_speed(&self, percent: u8) -> Result<()> {
        self.0.set_speed(percent).await
    }

    async fn read_status(&self) -> Result<FanStatus> {
        self.0.read_status().await
    }
}

#[async_trait]
impl LightingControl for RgbFanDevice {
    fn led_count(&self) -> usize {
        self.0.kind.led_count()
    }

    async fn set_lighting(&self, frame: &LightingFrame) -> Result<()> {
        self.0.set_lighting(frame).await
    }
}
