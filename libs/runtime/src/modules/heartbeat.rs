//! Heartbeat module
//!
//! Publishes an increasing `uint64` counter on a channel at a fixed interval
//! and serves the current count through the `beat_count` remote function.
//!
//! Properties:
//! - `interval_ms` (default 1000)
//! - `channel` (default `heartbeat`)

use crate::channel::Channel;
use crate::module::{Module, ModuleContext};
use crate::properties::Properties;
use anyhow::{ensure, Context};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct HeartbeatModule {
    beats: u64,
    channel: Option<Channel<u64>>,
}

impl HeartbeatModule {
    pub const CLASS: &'static str = "HeartbeatModule";

    fn beat(&mut self, ctx: &ModuleContext<Self>) {
        self.beats += 1;
        if let Some(channel) = &self.channel {
            if let Err(e) = channel.post(&self.beats) {
                warn!(module_id = %ctx.id(), error = %e, "Failed to post heartbeat");
            }
        }
    }
}

impl Module for HeartbeatModule {
    fn initialize(&mut self, ctx: &ModuleContext<Self>, properties: &Properties) -> anyhow::Result<()> {
        let interval_ms = properties.number_or::<u64>("interval_ms", 1_000);
        ensure!(interval_ms > 0, "interval_ms must be greater than zero");
        let channel = properties.string_or("channel", "heartbeat");

        self.channel = Some(ctx.publish(&channel, &0u64).context("publishing heartbeat channel")?);
        ctx.register_remote_function("beat_count", |module: &mut Self, (): ()| module.beats)?;
        ctx.register_periodic_function("heartbeat", Duration::from_millis(interval_ms), Self::beat)?;

        info!(module_id = %ctx.id(), channel = %channel, interval_ms, "Heartbeat configured");
        Ok(())
    }

    fn terminate(&mut self, ctx: &ModuleContext<Self>) {
        info!(module_id = %ctx.id(), beats = self.beats, "Heartbeat stopped");
    }

    fn on_connected_to_remote_server(&mut self, ctx: &ModuleContext<Self>) {
        info!(module_id = %ctx.id(), "Middleware reached its remote server");
    }

    fn on_disconnected_from_remote_server(&mut self, ctx: &ModuleContext<Self>) {
        warn!(module_id = %ctx.id(), "Middleware lost its remote server");
    }
}
