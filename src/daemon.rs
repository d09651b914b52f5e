//! The daemon: device registry, both managers and the supervisory heartbeat.

use std::{fmt, sync::Arc, time::Duration};

use anyhow::{Context, anyhow};
use dashmap::{DashMap, mapref::entry::Entry};
use log::{debug, info, warn};
use tokio::{sync::broadcast, time::interval};
use tokio_stream::{StreamExt, wrappers::IntervalStream};
use tokio_util::sync::CancellationToken;

use crate::{
    config::Config,
    devices::{self, Capability, Device, DeviceId},
    drivers::{self, Transport},
    error::{DaemonError, Result},
    event::{Event, EventBus},
    fan::{FanManager, fan_strategy_factory},
    lighting::{LightingManager, lighting_strategy_factory},
    sensors::SensorSet,
    worker::Worker,
};

type Registry = Arc<DashMap<DeviceId, Arc<dyn Device>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    Created,
    Running,
    Stopped,
}

impl DaemonState {
    pub const fn as_str(self) -> &'static str {
        match self {
            DaemonState::Created => "created",
            DaemonState::Running => "running",
            DaemonState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for DaemonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owns every registered device and runs the fan loop, the lighting loop and
/// a heartbeat supervisor between [`run`](Daemon::run) and [`stop`](Daemon::stop).
///
/// # Example
///
/// ```no_run
/// use tt_rgbd::{config::Config, daemon::Daemon, devices::DeviceId};
///
/// # async fn example() -> anyhow::Result<()> {
/// let mut daemon = Daemon::builder()
///     .with_config(Config::load(None)?)
///     .build()
///     .await?;
///
/// daemon.register_attached_device(DeviceId::new(3), "riing-quad").await?;
/// daemon.run().await?;
/// // ...
/// daemon.stop().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Daemon {
    state: DaemonState,
    transport: Arc<dyn Transport>,
    registry: Registry,
    fan: FanManager,
    lighting: LightingManager,
    events: EventBus,
    heartbeat: Duration,
    supervisor: Option<Worker>,
}

impl Daemon {
    pub fn builder() -> DaemonBuilder {
        DaemonBuilder::new()
    }

    /// Builds the handle for `id` and hands it to every manager whose
    /// capability it supports.
    ///
    /// The handle is constructed once and shared by both managers. An id that
    /// is already registered is rejected and the registry is left untouched.
    pub async fn register_attached_device(&self, id: DeviceId, type_tag: &str) -> Result<()> {
        let device = match self.registry.entry(id) {
            Entry::Occupied(_) => return Err(DaemonError::DuplicateDevice(id)),
            Entry::Vacant(slot) => {
                let device = devices::create(self.transport.clone(), id, type_tag)?;
                slot.insert(device.clone());
                device
            }
        };
        info!("Registered device {id} as {}", device.kind());

        if device.supports(Capability::Fan) {
            match device.clone().fan() {
                Some(fan) => self.fan.attach_device(fan).await,
                None => warn!("Device {id} reports fan support but exposes no fan control"),
            }
        }
        if device.supports(Capability::Lighting) {
            match device.clone().lighting() {
                Some(lighting) => self.lighting.attach_device(lighting).await,
                None => warn!("Device {id} reports lighting support but exposes no lighting control"),
            }
        }
        Ok(())
    }

    /// Starts the supervisor, then the lighting loop, then the fan loop.
    ///
    /// If one of them cannot start, the ones already started are stopped
    /// again before the error is returned and the state is left unchanged.
    pub async fn run(&mut self) -> Result<()> {
        if self.state == DaemonState::Running || self.fan.is_running() || self.lighting.is_running() {
            return Err(DaemonError::LifecycleViolation {
                operation: "run",
                state: DaemonState::Running.as_str(),
            });
        }

        let registry = self.registry.clone();
        let events = self.events.clone();
        let period = self.heartbeat;
        let supervisor = Worker::spawn("supervisor", move |token| {
            run_supervisor(registry, events, period, token)
        });

        if let Err(e) = self.lighting.start(self.events.clone()) {
            supervisor.stop().await;
            return Err(e);
        }
        if let Err(e) = self.fan.start(self.events.clone()) {
            if let Err(stop_err) = self.lighting.stop().await {
                warn!("Lighting manager: {stop_err}");
            }
            supervisor.stop().await;
            return Err(e);
        }

        self.supervisor = Some(supervisor);
        self.state = DaemonState::Running;
        info!("Daemon running with {} devices", self.registry.len());
        Ok(())
    }

    /// Cancels the supervisor, stops lighting and fan loops, then joins the
    /// supervisor. Once this returns no device command is in flight.
    pub async fn stop(&mut self) -> Result<()> {
        if self.state != DaemonState::Running {
            return Err(DaemonError::LifecycleViolation {
                operation: "stop",
                state: self.state.as_str(),
            });
        }

        let supervisor = self.supervisor.take();
        if let Some(supervisor) = &supervisor {
            supervisor.cancel();
        }
        if let Err(e) = self.lighting.stop().await {
            warn!("Lighting manager: {e}");
        }
        if let Err(e) = self.fan.stop().await {
            warn!("Fan manager: {e}");
        }
        if let Some(supervisor) = supervisor {
            supervisor.stop().await;
        }

        self.state = DaemonState::Stopped;
        info!("Daemon stopped");
        Ok(())
    }

    pub fn state(&self) -> DaemonState {
        self.state
    }

    pub fn device(&self, id: DeviceId) -> Option<Arc<dyn Device>> {
        self.registry.get(&id).map(|d| d.value().clone())
    }

    pub fn device_count(&self) -> usize {
        self.registry.len()
    }

    pub fn fan_manager(&self) -> &FanManager {
        &self.fan
    }

    pub fn lighting_manager(&self) -> &LightingManager {
        &self.lighting
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn is_supervisor_running(&self) -> bool {
        self.supervisor.as_ref().is_some_and(Worker::is_running)
    }
}

async fn run_supervisor(
    registry: Registry,
    events: EventBus,
    period: Duration,
    cancel_token: CancellationToken,
) {
    let mut beats = IntervalStream::new(interval(period));

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("Supervisor cancelled");
                break;
            }
            Some(_) = beats.next() => {
                let devices = registry.len();
                debug!("Heartbeat: {devices} devices registered");
                events.publish(Event::Heartbeat { devices });
            }
        }
    }
}

/// Builder for [`Daemon`].
///
/// Transport and sensors default to what the configuration describes; tests
/// and embedders can inject their own.
#[derive(Default)]
pub struct DaemonBuilder {
    config: Option<Config>,
    transport: Option<Arc<dyn Transport>>,
    sensors: Option<SensorSet>,
}

impl DaemonBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_sensors(mut self, sensors: SensorSet) -> Self {
        self.sensors = Some(sensors);
        self
    }

    /// Selects both strategies, creates the managers and registers every
    /// device listed in the configuration.
    pub async fn build(self) -> anyhow::Result<Daemon> {
        let config = self
            .config
            .ok_or_else(|| anyhow!("Configuration is required"))?;
        config.validate()?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => drivers::open(&config.transport).context("Failed to open transport")?,
        };
        let sensors = match self.sensors {
            Some(sensors) => sensors,
            None => SensorSet::from_config(&config.sensors).context("Failed to open sensors")?,
        };

        let fan_strategy = fan_strategy_factory(&config.fan_controller, &sensors)
            .context("Invalid fan_controller")?;
        let lighting_strategy = lighting_strategy_factory(&config.lighting_controller, &sensors)
            .context("Invalid lighting_controller")?;
        info!(
            "Strategies: fan '{}', lighting '{}'",
            fan_strategy.name(),
            lighting_strategy.name()
        );

        let daemon = Daemon {
            state: DaemonState::Created,
            transport,
            registry: Arc::new(DashMap::new()),
            fan: FanManager::new(fan_strategy, config.fan_tick()),
            lighting: LightingManager::new(lighting_strategy, config.lighting_tick()),
            events: EventBus::new(),
            heartbeat: config.heartbeat(),
            supervisor: None,
        };

        for (id, tag) in &config.devices {
            daemon
                .register_attached_device(*id, tag)
                .await
                .with_context(|| format!("Failed to register device {id}"))?;
        }

        Ok(daemon)
    }
}
