use crossbeam_channel::{Receiver, Sender};
use glq_protocol::handle::{NativeHandle, SurfaceSize, VirtualHandle};
use tracing::trace;

/// Events pushed from the execution plane to the control plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// A finalized frame is available for display.
    TextureReady {
        texture: NativeHandle,
        size: SurfaceSize,
    },
    FpsChanged(u32),
    ContextLost,
    /// The execution plane completed its first dispatch cycle on a fresh
    /// context (sent for the initial context as well).
    ContextRestored,
    /// A host texture binding now points at a new native texture.
    ResourceResolved(VirtualHandle),
}

/// Sending half of the notification queue. Delivery is always queued, never
/// inline, so it is safe from any thread.
#[derive(Clone)]
pub struct Notifier {
    sender: Sender<Notification>,
}

impl Notifier {
    pub fn notify(&self, notification: Notification) {
        trace!("notify {:?}", notification);
        if self.sender.send(notification).is_err() {
            trace!("notification receiver dropped");
        }
    }
}

pub fn channel() -> (Notifier, Receiver<Notification>) {
    let (sender, receiver) = crossbeam_channel::unbounded();
    (Notifier { sender }, receiver)
}
