// src/core/events.rs

use crate::core::context::Context;
use std::collections::HashMap;

/// What a listener learns about the event it is handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPayload {
    pub event: String,
    pub class_name: String,
    /// Set for the per-method events.
    pub method: Option<String>,
}

pub type Listener = Box<dyn Fn(&mut Context, &EventPayload) -> anyhow::Result<()> + Send + Sync>;

/// Named-event pub/sub. Listeners run in registration order, and the first
/// error stops the emission.
#[derive(Default)]
pub struct EventBus {
    listeners: HashMap<String, Vec<Listener>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listen<F>(&mut self, event: impl Into<String>, listener: F)
    where
        F: Fn(&mut Context, &EventPayload) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.listeners
            .entry(event.into())
            .or_default()
            .push(Box::new(listener));
    }

    pub fn emit(&self, ctx: &mut Context, payload: &EventPayload) -> anyhow::Result<()> {
        let Some(listeners) = self.listeners.get(&payload.event) else {
            return Ok(());
        };
        log::trace!("Emitting '{}' to {} listener(s).", payload.event, listeners.len());
        for listener in listeners {
            listener(ctx, payload)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut events: Vec<_> = self.listeners.keys().collect();
        events.sort();
        f.debug_struct("EventBus").field("events", &events).finish()
    }
}
