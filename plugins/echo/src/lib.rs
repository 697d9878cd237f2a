//! Demo component library.
//!
//! Registers an `Echo` component for [`PING`] and [`PONG`]. Every ping is
//! answered with a pong carrying the same payload.

use std::sync::atomic::{AtomicU64, Ordering};

use microkernel::harness::StandalonePlugin;
use microkernel::{
    export_plugin, export_standalone_plugin, Component, ComponentContext, Kernel, Message,
    Publisher,
};
use tracing::{info, warn};

pub const PING: u32 = 1;
pub const PONG: u32 = 2;

#[derive(Default)]
pub struct Echo {
    publisher: Option<Publisher>,
    received: AtomicU64,
}

impl Echo {
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }
}

impl Component for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    fn init(&mut self, ctx: &ComponentContext) {
        self.publisher = Some(ctx.publisher());
    }

    fn handle_message(&self, msg: &Message) {
        self.received.fetch_add(1, Ordering::Relaxed);
        if msg.msg_type != PING {
            return;
        }
        let Some(publisher) = &self.publisher else {
            return;
        };
        let reply = match Message::with_payload(PONG, msg.payload()) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "cannot build pong");
                return;
            }
        };
        if let Err(e) = publisher.publish(reply) {
            warn!(error = %e, "pong dropped");
        }
    }

    fn stop(&self) {
        info!(received = self.received(), "echo stopped");
    }
}

fn register(kernel: &mut Kernel) {
    if let Err(e) = kernel.register(Echo::default(), &[PING, PONG]) {
        warn!(error = %e, "echo registration failed");
    }
}

export_plugin!(register);

/// The same library run through the standalone harness.
#[derive(Default)]
pub struct EchoOnce {
    runs: u32,
}

impl StandalonePlugin for EchoOnce {
    fn name(&self) -> &str {
        "echo"
    }

    fn execute(&mut self) {
        self.runs += 1;
        info!(runs = self.runs, "echo executed");
    }
}

export_standalone_plugin!(EchoOnce);
