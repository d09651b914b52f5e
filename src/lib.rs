//! # tt_rgbd
//!
//! A Linux daemon driving Thermaltake fans and RGB devices through one
//! controller bus.
//!
//! ## Architecture
//!
//! - [`Daemon`](daemon::Daemon) - device registry, lifecycle, heartbeat
//! - [`FanManager`](fan::FanManager) and [`LightingManager`](lighting::LightingManager) -
//!   independent periodic loops, each driven by one strategy
//! - [`devices::create`] - builds typed handles from a type tag
//! - [`Transport`](drivers::Transport) - raw frame I/O shared by every handle
//! - [`EventBus`](event::EventBus) - per-device failures and heartbeats
//!
//! Devices are routed by capability: a handle that supports fan control is
//! attached to the fan manager, one that supports lighting to the lighting
//! manager, and dual-capability fans to both.
//!
//! ## Example
//!
//! ```no_run
//! use tt_rgbd::{config::Config, daemon::Daemon};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut daemon = Daemon::builder()
//!         .with_config(Config::load(None)?)
//!         .build()
//!         .await?;
//!     daemon.run().await?;
//!     tokio::signal::ctrl_c().await?;
//!     daemon.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod daemon;
pub mod devices;
pub mod drivers;
pub mod error;
pub mod event;
pub mod fan;
pub mod lighting;
pub mod sensors;
pub mod worker;

#[cfg(test)]
mod testing;
