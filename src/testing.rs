//! In-memory transport shared by the manager and daemon tests.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Arc, Mutex},
};

use tokio::{
    sync::broadcast,
    time::{Duration, timeout},
};

use crate::{
    devices::DeviceId,
    drivers::{Transport, protocol::STATUS_OK},
    error::{DaemonError, Result},
    event::Event,
};

/// Behaves like one controller bus: every frame sent queues exactly one
/// reply, and replies come back in send order whoever reads them.
///
/// Devices can be marked as failing (sends refused), rejecting (replies
/// carry a non-OK status) or slow (reading their reply blocks).
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(DeviceId, Vec<u8>)>>,
    pending: Mutex<VecDeque<Vec<u8>>>,
    failing: Mutex<HashSet<DeviceId>>,
    rejecting: Mutex<HashSet<DeviceId>>,
    latency: Mutex<HashMap<DeviceId, Duration>>,
    bus: Mutex<()>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, device: DeviceId) {
        self.failing.lock().unwrap().insert(device);
    }

    pub fn reject(&self, device: DeviceId) {
        self.rejecting.lock().unwrap().insert(device);
    }

    pub fn delay(&self, device: DeviceId, latency: Duration) {
        self.latency.lock().unwrap().insert(device, latency);
    }

    pub fn sent(&self) -> Vec<(DeviceId, Vec<u8>)> {
        self.sent.lock().unwrap().clone()
    }

    /// `SetSpeed` commands in send order.
    pub fn speeds(&self) -> Vec<(DeviceId, u8)> {
        self.sent()
            .into_iter()
            .filter(|(_, frame)| frame.len() == 6 && frame[..3] == [0x00, 0x32, 0x51])
            .map(|(dev, frame)| (dev, frame[5]))
            .collect()
    }

    /// `SetRgb` payloads (mode byte, GRB bytes) in send order, with
    /// continuation packets folded into the frame they belong to.
    pub fn rgb_frames(&self) -> Vec<(DeviceId, u8, Vec<u8>)> {
        let mut frames: Vec<(DeviceId, u8, Vec<u8>)> = Vec::new();
        for (dev, packet) in self.sent() {
            if packet.len() < 5 || packet[..2] != [0x00, 0x32] {
                continue;
            }
            match packet[2] {
                0x52 => frames.push((dev, packet[4], packet[5..].to_vec())),
                0x53 => {
                    if let Some(frame) = frames.iter_mut().rev().find(|(d, _, _)| *d == dev) {
                        frame.2.extend_from_slice(&packet[5..]);
                    }
                }
                _ => {}
            }
        }
        frames
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

impl Transport for RecordingTransport {
    fn send(&self, device: DeviceId, frame: &[u8]) -> Result<()> {
        if self.failing.lock().unwrap().contains(&device) {
            return Err(DaemonError::Transport("unplugged".into()));
        }
        let code = if self.rejecting.lock().unwrap().contains(&device) {
            0x01
        } else {
            STATUS_OK
        };
        self.sent.lock().unwrap().push((device, frame.to_vec()));
        self.pending
            .lock()
            .unwrap()
            .push_back(vec![0x00, 0x00, code, 0x00, 0x00]);
        Ok(())
    }

    fn receive(&self, device: DeviceId) -> Result<Vec<u8>> {
        let latency = self.latency.lock().unwrap().get(&device).copied();
        if let Some(latency) = latency {
            std::thread::sleep(latency);
        }
        self.pending
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| DaemonError::Transport("no reply pending".into()))
    }

    fn request(&self, device: DeviceId, frame: &[u8]) -> Result<Vec<u8>> {
        let _bus = self.bus.lock().unwrap();
        self.send(device, frame)?;
        self.receive(device)
    }
}

/// Waits (bounded) for the first event matching `pred`, skipping the rest.
pub async fn next_matching(rx: &mut broadcast::Receiver<Event>, pred: impl Fn(&Event) -> bool) -> Event {
    timeout(Duration::from_secs(2), async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => panic!("event bus closed: {e}"),
            }
        }
    })
    .await
    .expect("no matching event within 2s")
}
