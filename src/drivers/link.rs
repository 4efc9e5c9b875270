//! A live transport link: a writer channel plus the I/O tasks behind it
//!
//! Transports spawn their reader/writer tasks when they open a link and
//! report back through a [`LinkListener`]. Dropping the `Link` aborts the
//! tasks, which is how `disconnect()` tears a socket down.

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::error::DriverError;
use crate::command::Command;

/// Callbacks from a link's I/O tasks to the owning driver
pub trait LinkListener: Send + Sync {
    /// A command decoded from device traffic
    fn on_inbound(&self, command: Command);

    /// The link failed or was closed by the peer
    fn on_lost(&self, reason: String);
}

/// Open link to a device
pub struct Link {
    tx: mpsc::UnboundedSender<Bytes>,
    tasks: Vec<JoinHandle<()>>,
}

impl Link {
    /// Wrap a writer channel and the tasks serving it
    pub fn new(tx: mpsc::UnboundedSender<Bytes>, tasks: Vec<JoinHandle<()>>) -> Self {
        Self { tx, tasks }
    }

    /// Queue one encoded frame for the writer task. Never blocks.
    pub fn send(&self, frame: Bytes) -> Result<(), DriverError> {
        self.tx.send(frame).map_err(|_| DriverError::LinkClosed)
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
