//! Push transport
//!
//! A [`Transport`] opens one duplex [`Link`] of STOMP frames per handshake.
//! The connection manager owns the link and decides when to open another one.

mod frame;
pub mod memory;
mod ws;

use async_trait::async_trait;
use tokio::sync::mpsc;

pub use frame::{Command, Frame};
pub use memory::MemoryBroker;
pub use ws::WsTransport;

use crate::error::ConnectionError;

/// One open socket, as two frame channels
///
/// Dropping `outgoing` closes the socket. `incoming` yields `None` once the
/// remote side is gone.
#[derive(Debug)]
pub struct Link {
    pub outgoing: mpsc::UnboundedSender<Frame>,
    pub incoming: mpsc::UnboundedReceiver<Frame>,
}

impl Link {
    /// Queue a frame; false when the socket is already gone
    pub fn send(&self, frame: Frame) -> bool {
        self.outgoing.send(frame).is_ok()
    }
}

/// Opens raw links to a broker endpoint
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, endpoint: &str) -> Result<Link, ConnectionError>;
}
