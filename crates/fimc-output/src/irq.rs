//! Frame-completion handler
//!
//! The board layer forwards the FIMC frame-end interrupt as an [`IrqEvent`]
//! over a tokio channel; a spawned task turns each event into
//! [`OutputDevice::complete_frame`].
//!
//! # Example
//!
//! ```rust,ignore
//! let (tx, rx) = tokio::sync::mpsc::channel(16);
//! let handler = irq::spawn_completion_handler(device.clone(), rx);
//!
//! // From the interrupt bottom half
//! tx.send(IrqEvent::FrameDone).await?;
//!
//! tx.send(IrqEvent::Shutdown).await?;
//! let handled = handler.await?;
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::device::OutputDevice;

/// Event delivered by the interrupt source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqEvent {
    /// The hardware finished reading the active frame
    FrameDone,
    /// Stop the handler task
    Shutdown,
}

/// Spawn the task that feeds frame-end events into `device`
///
/// The task ends on [`IrqEvent::Shutdown`] or when every sender is dropped,
/// and resolves to the number of frame-end events it processed. Failed
/// completions are logged and do not stop the task.
pub fn spawn_completion_handler(
    device: Arc<OutputDevice>,
    mut rx: mpsc::Receiver<IrqEvent>,
) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut handled = 0;
        debug!("FIMC{} completion handler started", device.config().id);

        while let Some(event) = rx.recv().await {
            match event {
                IrqEvent::FrameDone => {
                    handled += 1;
                    if let Err(e) = device.complete_frame() {
                        warn!("FIMC{}: frame completion failed: {}", device.config().id, e);
                    }
                }
                IrqEvent::Shutdown => break,
            }
        }

        info!(
            "FIMC{} completion handler stopped after {} frames",
            device.config().id,
            handled
        );
        handled
    })
}
