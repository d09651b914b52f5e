//! Lighting manager and the frame type shared by strategies and devices.

pub mod color;
pub mod strategy;

use std::{sync::Arc, time::Duration};

use log::{debug, error, info};
use tokio::{
    sync::RwLock,
    time::{MissedTickBehavior, interval},
};
use tokio_util::sync::CancellationToken;

use crate::{
    devices::{DeviceId, LightingControl},
    error::{DaemonError, Result},
    event::{Event, EventBus, Loop},
    worker::Worker,
};
use color::Rgb;
pub use strategy::{LightingStrategy, lighting_strategy_factory};

/// How the controller applies the color list of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightingMode {
    /// One color per LED.
    PerLed,
    /// Whole device in the first color.
    Full,
}

impl LightingMode {
    pub const fn code(self) -> u8 {
        match self {
            LightingMode::PerLed => 0x24,
            LightingMode::Full => 0x19,
        }
    }
}

/// One lighting command: a mode plus the colors to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightingFrame {
    pub mode: LightingMode,
    pub colors: Vec<Rgb>,
}

impl LightingFrame {
    pub fn new(mode: LightingMode, colors: Vec<Rgb>) -> Self {
        Self { mode, colors }
    }

    /// `count` LEDs in a single color.
    pub fn uniform(mode: LightingMode, color: Rgb, count: usize) -> Self {
        Self::new(mode, vec![color; count])
    }
}

type LightingList = Arc<RwLock<Vec<Arc<dyn LightingControl>>>>;

/// Owns the lighting-capable devices and drives them with one strategy,
/// on its own cadence and independently of the fan loop.
#[derive(Debug)]
pub struct LightingManager {
    strategy: Arc<dyn LightingStrategy>,
    tick: Duration,
    devices: LightingList,
    worker: Option<Worker>,
}

impl LightingManager {
    pub fn new(strategy: Arc<dyn LightingStrategy>, tick: Duration) -> Self {
        Self {
            strategy,
            tick,
            devices: Arc::new(RwLock::new(Vec::new())),
            worker: None,
        }
    }

    pub async fn attach_device(&self, device: Arc<dyn LightingControl>) {
        info!(
            "Lighting manager: attached device {} ({}, {} LEDs)",
            device.id(),
            device.kind(),
            device.led_count()
        );
        self.devices.write().await.push(device);
    }

    pub async fn attached_ids(&self) -> Vec<DeviceId> {
        self.devices.read().await.iter().map(|d| d.id()).collect()
    }

    pub fn strategy(&self) -> &Arc<dyn LightingStrategy> {
        &self.strategy
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(Worker::is_running)
    }

    /// Spawns the lighting loop. The tick counter restarts at 0.
    pub fn start(&mut self, events: EventBus) -> Result<()> {
        if self.is_running() {
            return Err(DaemonError::LifecycleViolation {
                operation: "start lighting manager",
                state: "running",
            });
        }

        let devices = self.devices.clone();
        let strategy = self.strategy.clone();
        let tick = self.tick;
        self.worker = Some(Worker::spawn("lighting-manager", move |token| {
            run_lighting_loop(devices, strategy, events, tick, token)
        }));
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        let worker = self.worker.take().ok_or(DaemonError::LifecycleViolation {
            operation: "stop lighting manager",
            state: "stopped",
        })?;
        worker.stop().await;
        Ok(())
    }
}

async fn run_lighting_loop(
    devices: LightingList,
    strategy: Arc<dyn LightingStrategy>,
    events: EventBus,
    tick: Duration,
    cancel_token: CancellationToken,
) {
    let mut interval = interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut count = 0u64;

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("Lighting loop cancelled after {count} ticks");
                break;
            }
            _instant = interval.tick() => {
                let failures = apply_frames(&devices, strategy.as_ref(), &events, count).await;
                events.publish(Event::TickCompleted {
                    source: Loop::Lighting,
                    tick: count,
                    failures,
                });
                count = count.wrapping_add(1);
            }
        }
    }
}

async fn apply_frames(
    devices: &LightingList,
    strategy: &dyn LightingStrategy,
    events: &EventBus,
    tick: u64,
) -> usize {
    let snapshot = devices.read().await.clone();
    let mut failures = 0;

    for device in snapshot {
        let id = device.id();
        let frame = match strategy.frame_for(tick, id, device.led_count()).await {
            Ok(frame) => frame,
            Err(e) => {
                error!("Lighting strategy '{}' failed for device {id}: {e}", strategy.name());
                events.publish(Event::StrategyFailed {
                    source: Loop::Lighting,
                    device: id,
                    reason: e.to_string(),
                });
                failures += 1;
                continue;
            }
        };

        if let Err(e) = device.set_lighting(&frame).await {
            error!("Failed to update lighting of device {id}: {e}");
            events.publish(Event::DeviceWriteFailed {
                source: Loop::Lighting,
                device: id,
                reason: e.to_string(),
            });
            failures += 1;
        } else {
            debug!("Device {id}: {:?} frame, {} colors", frame.mode, frame.colors.len());
        }
    }
    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::strategy::{Alternating, StaticColor};
    use crate::{devices, testing::RecordingTransport};
    use pretty_assertions::assert_eq;
    use tokio::time::sleep;

    const TICK: Duration = Duration::from_millis(10);

    fn strip(transport: &Arc<RecordingTransport>, id: u8, tag: &str) -> Arc<dyn LightingControl> {
        devices::create(transport.clone(), DeviceId::new(id), tag)
            .unwrap()
            .lighting()
            .unwrap()
    }

    #[test]
    fn uniform_frame_repeats_color() {
        let frame = LightingFrame::uniform(LightingMode::Full, Rgb::GREEN, 3);
        assert_eq!(frame.colors, vec![Rgb::GREEN; 3]);
        assert_eq!(frame.mode.code(), 0x19);
    }

    #[tokio::test]
    async fn static_color_sized_per_device() {
        let transport = RecordingTransport::new();
        let mut manager = LightingManager::new(Arc::new(StaticColor::new(Rgb::BLUE)), TICK);
        manager.attach_device(strip(&transport, 2, "lumi-plus")).await;
        manager.attach_device(strip(&transport, 3, "pure-plus")).await;

        manager.start(EventBus::new()).unwrap();
        sleep(TICK * 3).await;
        manager.stop().await.unwrap();

        let frames = transport.rgb_frames();
        let lumi = frames.iter().find(|(dev, ..)| *dev == DeviceId::new(2)).unwrap();
        let pure = frames.iter().find(|(dev, ..)| *dev == DeviceId::new(3)).unwrap();
        assert_eq!(lumi.2.len(), 3 * 10);
        assert_eq!(pure.2.len(), 3 * 9);
        // GRB on the wire
        assert_eq!(lumi.2[..3].to_vec(), vec![0, 0, 255]);
    }

    #[tokio::test]
    async fn tick_counter_drives_animation() {
        let transport = RecordingTransport::new();
        let strategy = Alternating::new(Rgb::RED, Rgb::GREEN);
        let mut manager = LightingManager::new(Arc::new(strategy), TICK);
        manager.attach_device(strip(&transport, 1, "riing-plus")).await;

        manager.start(EventBus::new()).unwrap();
        sleep(TICK * 4).await;
        manager.stop().await.unwrap();

        let frames = transport.rgb_frames();
        assert!(frames.len() >= 2);
        // first LED alternates between ticks: red then green (GRB bytes)
        assert_eq!(frames[0].2[..3].to_vec(), vec![0, 255, 0]);
        assert_eq!(frames[1].2[..3].to_vec(), vec![255, 0, 0]);
    }

    #[tokio::test]
    async fn failure_is_published_and_next_device_served() {
        let transport = RecordingTransport::new();
        transport.fail(DeviceId::new(1));
        let events = EventBus::new();
        let mut rx = events.subscribe();

        let mut manager = LightingManager::new(Arc::new(StaticColor::new(Rgb::RED)), TICK);
        manager.attach_device(strip(&transport, 1, "lumi-plus")).await;
        manager.attach_device(strip(&transport, 2, "lumi-plus")).await;
        manager.start(events).unwrap();

        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        manager.stop().await.unwrap();

        assert!(matches!(
            first,
            Event::DeviceWriteFailed { source: Loop::Lighting, device, .. } if device == DeviceId::new(1)
        ));
        assert!(
            transport
                .rgb_frames()
                .iter()
                .any(|(dev, ..)| *dev == DeviceId::new(2))
        );
    }

    #[tokio::test]
    async fn stop_twice_is_a_violation() {
        let mut manager = LightingManager::new(Arc::new(StaticColor::new(Rgb::RED)), TICK);
        manager.start(EventBus::new()).unwrap();
        manager.stop().await.unwrap();
        assert!(matches!(
            manager.stop().await,
            Err(DaemonError::LifecycleViolation { .. })
        ));
        assert!(!manager.is_running());
    }
}
