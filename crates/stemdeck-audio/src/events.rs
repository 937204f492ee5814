//! Track-finished notifications.

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use tracing::trace;
use uuid::Uuid;

/// Identifier of a listener registration.
pub type ListenerId = Uuid;

/// Sent when a track reaches its natural end. Never sent on an explicit stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackFinished {
    /// Description of the finished track, e.g. `Music Track: Forest`.
    pub info: String,
}

/// Receiving end of a track-finished registration.
///
/// Once the engine drops the registration (on stop or shutdown), the receiver
/// still yields what was already sent and then reports disconnection.
#[derive(Debug)]
pub struct TrackFinishedSubscription {
    id: ListenerId,
    receiver: Receiver<TrackFinished>,
}

impl TrackFinishedSubscription {
    pub const fn id(&self) -> ListenerId {
        self.id
    }

    /// Try to receive a notification without blocking.
    pub fn try_recv(&self) -> Option<TrackFinished> {
        self.receiver.try_recv().ok()
    }

    /// Check whether the engine has dropped this registration and nothing is pending.
    pub fn is_disconnected(&self) -> bool {
        self.receiver.is_empty()
            && matches!(self.receiver.try_recv(), Err(TryRecvError::Disconnected))
    }

    pub const fn receiver(&self) -> &Receiver<TrackFinished> {
        &self.receiver
    }
}

/// Registry of track-finished listeners owned by the engine.
#[derive(Debug, Default)]
pub struct Listeners {
    senders: Vec<(ListenerId, Sender<TrackFinished>)>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> TrackFinishedSubscription {
        let (tx, rx) = unbounded();
        let id = Uuid::new_v4();
        self.senders.push((id, tx));
        TrackFinishedSubscription { id, receiver: rx }
    }

    /// Remove a registration. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.senders.len();
        self.senders.retain(|(listener, _)| *listener != id);
        before != self.senders.len()
    }

    /// Deliver `event` to every listener, forgetting those whose receiver is gone.
    pub fn notify(&mut self, event: &TrackFinished) {
        self.senders.retain(|(id, tx)| {
            let delivered = tx.send(event.clone()).is_ok();
            if !delivered {
                trace!("Dropping listener {id}: receiver gone");
            }
            delivered
        });
    }

    pub fn clear(&mut self) {
        self.senders.clear();
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}
