//! Ordered subscriber lists for send notifications.
//!
//! Each notification kind has its own list.  Callbacks are invoked in
//! registration order and can be removed individually by the
//! [`SubscriptionId`] returned when they were added.
//!
//! The list lock is only held while the list is copied, never while callbacks
//! run, so a callback may add or remove subscriptions without deadlocking.

use std::sync::{Arc, Mutex, PoisonError};

use smsgate_core::{SendEvent, SendEventKind};

/// Callback invoked for each relayed [`SendEvent`].
pub type SendCallback = Arc<dyn Fn(&SendEvent) + Send + Sync>;

/// Handle identifying one registered callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Which notification list a callback is registered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    SendStarting,
    SendComplete,
    SendFailed,
}

impl NotificationKind {
    pub const ALL: [NotificationKind; 3] = [
        NotificationKind::SendStarting,
        NotificationKind::SendComplete,
        NotificationKind::SendFailed,
    ];

    /// The list an event of the given kind is delivered to.
    pub fn of(kind: &SendEventKind) -> Self {
        match kind {
            SendEventKind::Starting => Self::SendStarting,
            SendEventKind::Complete => Self::SendComplete,
            SendEventKind::Failed { .. } => Self::SendFailed,
        }
    }
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    callbacks: Vec<(SubscriptionId, SendCallback)>,
}

/// One ordered list of callbacks.
#[derive(Default)]
pub struct Subscribers {
    inner: Mutex<Inner>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, callback: SendCallback) -> SubscriptionId {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.next_id += 1;
        let id = SubscriptionId(inner.next_id);
        inner.callbacks.push((id, callback));
        id
    }

    /// Removes a callback.  Returns `false` if `id` was not registered here.
    pub fn remove(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let before = inner.callbacks.len();
        inner.callbacks.retain(|(sub, _)| *sub != id);
        inner.callbacks.len() != before
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .callbacks
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invokes every callback with `event`, in registration order.
    pub fn emit(&self, event: &SendEvent) {
        let callbacks: Vec<SendCallback> = {
            let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.callbacks.iter().map(|(_, cb)| Arc::clone(cb)).collect()
        };
        for callback in callbacks {
            callback(event);
        }
    }
}

/// The three notification lists of a send relay.
#[derive(Default)]
pub struct SendNotifications {
    starting: Subscribers,
    complete: Subscribers,
    failed: Subscribers,
}

impl SendNotifications {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(&self, kind: NotificationKind) -> &Subscribers {
        match kind {
            NotificationKind::SendStarting => &self.starting,
            NotificationKind::SendComplete => &self.complete,
            NotificationKind::SendFailed => &self.failed,
        }
    }

    pub fn subscribe(&self, kind: NotificationKind, callback: SendCallback) -> SubscriptionId {
        self.list(kind).add(callback)
    }

    pub fn unsubscribe(&self, kind: NotificationKind, id: SubscriptionId) -> bool {
        self.list(kind).remove(id)
    }

    /// Total number of callbacks across all three lists.
    pub fn subscriber_count(&self) -> usize {
        NotificationKind::ALL
            .iter()
            .map(|kind| self.list(*kind).len())
            .sum()
    }

    /// Delivers `event` to the list matching its kind.
    pub fn emit(&self, event: &SendEvent) {
        self.list(NotificationKind::of(&event.kind)).emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smsgate_core::CallerIdentity;
    use uuid::Uuid;

    fn event(kind: SendEventKind) -> SendEvent {
        SendEvent {
            kind,
            call_id: Uuid::new_v4(),
            message: "hi".to_string(),
            destination: "+491701234567".to_string(),
            caller: CallerIdentity::Anonymous,
        }
    }

    #[test]
    fn test_emit_invokes_callbacks_in_registration_order() {
        // Arrange
        let order = Arc::new(Mutex::new(Vec::new()));
        let subs = Subscribers::new();
        for n in 1..=3 {
            let order = Arc::clone(&order);
            subs.add(Arc::new(move |_: &SendEvent| order.lock().unwrap().push(n)));
        }

        // Act
        subs.emit(&event(SendEventKind::Starting));

        // Assert
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_removed_callback_is_not_invoked() {
        let hits = Arc::new(Mutex::new(0));
        let subs = Subscribers::new();
        let hits_cb = Arc::clone(&hits);
        let id = subs.add(Arc::new(move |_: &SendEvent| *hits_cb.lock().unwrap() += 1));

        assert!(subs.remove(id));
        subs.emit(&event(SendEventKind::Complete));

        assert_eq!(*hits.lock().unwrap(), 0);
        assert!(subs.is_empty());
    }

    #[test]
    fn test_remove_unknown_id_returns_false() {
        let a = Subscribers::new();
        let b = Subscribers::new();
        let id = a.add(Arc::new(|_: &SendEvent| {}));
        assert!(!b.remove(id));
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn test_events_are_routed_by_kind() {
        // Arrange
        let notifications = SendNotifications::new();
        let failed = Arc::new(Mutex::new(Vec::new()));
        let failed_cb = Arc::clone(&failed);
        notifications.subscribe(
            NotificationKind::SendFailed,
            Arc::new(move |e: &SendEvent| failed_cb.lock().unwrap().push(e.clone())),
        );

        // Act
        notifications.emit(&event(SendEventKind::Starting));
        notifications.emit(&event(SendEventKind::Failed {
            cause: "no carrier".to_string(),
        }));

        // Assert
        let failed = failed.lock().unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].failure_cause(), Some("no carrier"));
    }

    #[test]
    fn test_callback_may_unsubscribe_itself_during_emit() {
        let subs = Arc::new(Subscribers::new());
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));
        let subs_cb = Arc::clone(&subs);
        let slot_cb = Arc::clone(&slot);
        let id = subs.add(Arc::new(move |_: &SendEvent| {
            if let Some(id) = *slot_cb.lock().unwrap() {
                subs_cb.remove(id);
            }
        }));
        *slot.lock().unwrap() = Some(id);

        subs.emit(&event(SendEventKind::Starting));

        assert!(subs.is_empty());
    }

    #[test]
    fn test_subscriber_count_sums_all_lists() {
        let notifications = SendNotifications::new();
        for kind in NotificationKind::ALL {
            notifications.subscribe(kind, Arc::new(|_: &SendEvent| {}));
        }
        assert_eq!(notifications.subscriber_count(), 3);
    }
}
