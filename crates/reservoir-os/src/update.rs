use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use flume::{Receiver, Sender, TryRecvError};

use tracing::{info, warn};

use reservoir::update::{UpdateEndpoint, UpdateEvent};

/// Creates a connected pair of update notifier and receiver.
///
/// The notifier is handed to whatever writes firmware images, possibly on
/// another thread, while the receiver is given to the node.
#[must_use]
pub fn channel() -> (UpdateNotifier, UpdateReceiver) {
    let (sender, receiver) = flume::unbounded();
    let busy = Arc::new(AtomicBool::new(false));

    (
        UpdateNotifier {
            sender,
            busy: Arc::clone(&busy),
        },
        UpdateReceiver { receiver, busy },
    )
}

/// Announces the start and the end of an image upload.
#[derive(Debug, Clone)]
pub struct UpdateNotifier {
    sender: Sender<UpdateEvent>,
    busy: Arc<AtomicBool>,
}

impl UpdateNotifier {
    /// Notifies that an image upload has started.
    pub fn started(&self) {
        self.busy.store(true, Ordering::SeqCst);
        self.send(UpdateEvent::Started);
    }

    /// Notifies that an image upload has ended.
    pub fn ended(&self, success: bool) {
        // The event is queued before the node may see the upload as over.
        self.send(UpdateEvent::Ended { success });
        self.busy.store(false, Ordering::SeqCst);
    }

    fn send(&self, event: UpdateEvent) {
        if self.sender.send(event).is_err() {
            warn!("Update event {event:?} dropped, the node is gone");
        }
    }
}

/// The [`UpdateEndpoint`] of a hosted node.
///
/// When every notifier is dropped in the middle of an upload, the upload
/// ends as failed.
#[derive(Debug)]
pub struct UpdateReceiver {
    receiver: Receiver<UpdateEvent>,
    busy: Arc<AtomicBool>,
}

impl UpdateEndpoint for UpdateReceiver {
    fn poll(&mut self) -> Option<UpdateEvent> {
        match self.receiver.try_recv() {
            Ok(event) => {
                info!("Update event: {event:?}");
                Some(event)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                if self.busy.swap(false, Ordering::SeqCst) {
                    warn!("Update notifiers gone during an upload");
                    Some(UpdateEvent::Ended { success: false })
                } else {
                    None
                }
            }
        }
    }

    fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }
}
