use std::sync::Arc;

use crate::call_state::CallState;
use crate::codec::SfuDataEvent;
use crate::connection::ConnectionState;
use crate::listeners::{DispatchError, ListenerRegistry};
use crate::types::captions::ClosedCaption;

/// Everything the client reports to the application.
#[derive(Debug, Clone)]
pub enum Event {
    ConnectionStateChanged(ConnectionState),
    /// An inbound SFU event, delivered after any state change it caused.
    Sfu(Arc<SfuDataEvent>),
    CallStateChanged(CallState),
    ClosedCaptionsUpdated(Vec<ClosedCaption>),
}

pub trait EventHandler: Send + Sync {
    fn handle_event(&self, event: &Event) -> anyhow::Result<()>;
}

impl<F> EventHandler for F
where
    F: Fn(&Event) -> anyhow::Result<()> + Send + Sync,
{
    fn handle_event(&self, event: &Event) -> anyhow::Result<()> {
        self(event)
    }
}

pub type EventBus = ListenerRegistry<dyn EventHandler>;

impl ListenerRegistry<dyn EventHandler> {
    pub fn dispatch(&self, event: &Event) -> Result<usize, DispatchError> {
        self.for_each(|handler| handler.handle_event(event))
    }
}
