//! Fan manager: periodic speed control over every attached fan.

pub mod curve;
pub mod strategy;

use std::{sync::Arc, time::Duration};

use log::{debug, error, info};
use tokio::{
    sync::RwLock,
    time::{MissedTickBehavior, interval},
};
use tokio_util::sync::CancellationToken;

use crate::{
    devices::{DeviceId, FanControl},
    error::{DaemonError, Result},
    event::{Event, EventBus, Loop},
    worker::Worker,
};
pub use strategy::{FanStrategy, fan_strategy_factory};

type FanList = Arc<RwLock<Vec<Arc<dyn FanControl>>>>;

/// Owns the fan-capable devices and drives them with one strategy.
///
/// Devices are visited in attachment order on every tick. A failure on one
/// device is logged and published, then the tick moves on to the next one.
#[derive(Debug)]
pub struct FanManager {
    strategy: Arc<dyn FanStrategy>,
    tick: Duration,
    devices: FanList,
    worker: Option<Worker>,
}

impl FanManager {
    pub fn new(strategy: Arc<dyn FanStrategy>, tick: Duration) -> Self {
        Self {
            strategy,
            tick,
            devices: Arc::new(RwLock::new(Vec::new())),
            worker: None,
        }
    }

    /// Appends a device; it is picked up from the next tick on.
    pub async fn attach_device(&self, device: Arc<dyn FanControl>) {
        info!("Fan manager: attached device {} ({})", device.id(), device.kind());
        self.devices.write().await.push(device);
    }

    pub async fn attached_ids(&self) -> Vec<DeviceId> {
        self.devices.read().await.iter().map(|d| d.id()).collect()
    }

    pub fn strategy(&self) -> &Arc<dyn FanStrategy> {
        &self.strategy
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(Worker::is_running)
    }

    pub fn start(&mut self, events: EventBus) -> Result<()> {
        if self.is_running() {
            return Err(DaemonError::LifecycleViolation {
                operation: "start fan manager",
                state: "running",
            });
        }

        let devices = self.devices.clone();
        let strategy = self.strategy.clone();
        let tick = self.tick;
        self.worker = Some(Worker::spawn("fan-manager", move |token| {
            run_fan_loop(devices, strategy, events, tick, token)
        }));
        Ok(())
    }

    /// Stops the worker after its in-flight tick. No command is sent once
    /// this returns.
    pub async fn stop(&mut self) -> Result<()> {
        let worker = self.worker.take().ok_or(DaemonError::LifecycleViolation {
            operation: "stop fan manager",
            state: "stopped",
        })?;
        worker.stop().await;
        Ok(())
    }
}

async fn run_fan_loop(
    devices: FanList,
    strategy: Arc<dyn FanStrategy>,
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
                info!("Fan loop cancelled after {count} ticks");
                break;
            }
            _instant = interval.tick() => {
                let failures = apply_speeds(&devices, strategy.as_ref(), &events).await;
                events.publish(Event::TickCompleted {
                    source: Loop::Fan,
                    tick: count,
                    failures,
                });
                count += 1;
            }
        }
    }
}

/// One pass over the current device list; returns the number of failed devices.
async fn apply_speeds(devices: &FanList, strategy: &dyn FanStrategy, events: &EventBus) -> usize {
    let snapshot = devices.read().await.clone();
    let mut failures = 0;

    for device in snapshot {
        let id = device.id();
        let speed = match strategy.speed_for(id).await {
            Ok(speed) => speed,
            Err(e) => {
                error!("Fan strategy '{}' failed for device {id}: {e}", strategy.name());
                events.publish(Event::StrategyFailed {
                    source: Loop::Fan,
                    device: id,
                    reason: e.to_string(),
                });
                failures += 1;
                continue;
            }
        };

        match device.set_speed(speed).await {
            Ok(()) => debug!("Device {id}: speed {speed}%"),
            Err(e) => {
                error!("Failed to set speed of device {id}: {e}");
                events.publish(Event::DeviceWriteFailed {
                    source: Loop::Fan,
                    device: id,
                    reason: e.to_string(),
                });
                failures += 1;
            }
        }
    }
    failures
}
