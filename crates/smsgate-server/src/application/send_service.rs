//! `RemoteSendService`: exclusive access to the one modem.
//!
//! Every send takes the service mutex for its whole duration: encoding, the
//! synchronous driver call, and delivery of the resulting notifications to
//! subscribers.  Call N's `Starting` → `Complete`/`Failed` sequence therefore
//! finishes, subscriber callbacks included, before call N+1 touches the modem.
//!
//! The caller identity is captured when `send_message` is entered and stored
//! next to the PDU reference in the in-flight slot.  Driver notifications,
//! which may arrive on a driver-owned thread, are matched against that slot by
//! reference and re-emitted with the captured identity.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use smsgate_core::{
    CallerIdentity, EncodeError, PduEncoder, SendEvent, SendEventKind, SendRequest,
};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::driver::{
    DriverError, DriverNotification, DriverSubscription, ModemDriver, PortSettings,
};
use super::subscribers::{NotificationKind, SendCallback, SendNotifications, SubscriptionId};

/// Errors returned by [`RemoteSendService`].
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("the send service has been shut down")]
    ResourceDisposed,

    #[error("failed to open modem on {port}")]
    ResourceOpenFailure {
        port: String,
        #[source]
        source: DriverError,
    },

    #[error("failed to close modem")]
    ResourceCloseFailure(#[source] DriverError),

    #[error("send failed: {0}")]
    SendFailure(#[source] DriverError),

    #[error("cannot encode message: {0}")]
    Encode(#[from] EncodeError),
}

/// Context of the call currently occupying the modem.
struct InFlight {
    reference: Uuid,
    call_id: Uuid,
    caller: CallerIdentity,
    message: String,
    destination: String,
    started: bool,
    outcome_relayed: bool,
}

impl InFlight {
    fn event(&self, kind: SendEventKind) -> SendEvent {
        SendEvent {
            kind,
            call_id: self.call_id,
            message: self.message.clone(),
            destination: self.destination.clone(),
            caller: self.caller.clone(),
        }
    }
}

type InFlightSlot = Arc<Mutex<Option<InFlight>>>;

struct ServiceInner {
    driver: Box<dyn ModemDriver>,
    subscription: Option<DriverSubscription>,
    disposed: bool,
}

/// Serialises sends onto one modem and relays its notifications.
pub struct RemoteSendService {
    inner: Mutex<ServiceInner>,
    encoder: Arc<dyn PduEncoder>,
    notifications: Arc<SendNotifications>,
    in_flight: InFlightSlot,
}

impl RemoteSendService {
    /// Subscribes to `driver` and opens it with `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::ResourceOpenFailure`] if the driver cannot be
    /// opened.  The driver subscription is removed before returning.
    pub fn open(
        mut driver: Box<dyn ModemDriver>,
        encoder: Arc<dyn PduEncoder>,
        settings: &PortSettings,
    ) -> Result<Self, ServiceError> {
        let notifications = Arc::new(SendNotifications::new());
        let in_flight: InFlightSlot = Arc::new(Mutex::new(None));

        let handler = {
            let notifications = Arc::clone(&notifications);
            let in_flight = Arc::clone(&in_flight);
            Arc::new(move |n: &DriverNotification| relay(&in_flight, &notifications, n))
        };
        let subscription = driver.subscribe(handler);

        if let Err(source) = driver.open(settings) {
            driver.unsubscribe(subscription);
            warn!(port = %settings.port, error = %source, "modem open failed");
            return Err(ServiceError::ResourceOpenFailure {
                port: settings.port.clone(),
                source,
            });
        }

        info!(
            port = %settings.port,
            baud = settings.baud_rate,
            timeout_ms = settings.timeout.as_millis() as u64,
            "modem opened"
        );

        Ok(Self {
            inner: Mutex::new(ServiceInner {
                driver,
                subscription: Some(subscription),
                disposed: false,
            }),
            encoder,
            notifications,
            in_flight,
        })
    }

    /// Transmits one message on behalf of `caller`.
    ///
    /// Blocks until any send already in progress has finished.  Before this
    /// returns, subscribers have seen `Starting` followed by one of
    /// `Complete`/`Failed` for this call.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::ResourceDisposed`] after [`Self::shutdown`]; no device
    ///   I/O happens and no events are emitted.
    /// - [`ServiceError::Encode`] if the request cannot be encoded; no events.
    /// - [`ServiceError::SendFailure`] if the driver reports an error.  A
    ///   `Failed` event has been emitted as well.
    pub fn send_message(
        &self,
        caller: &CallerIdentity,
        request: SendRequest,
    ) -> Result<(), ServiceError> {
        let mut inner = self.lock_inner();
        if inner.disposed {
            debug!(caller = %caller, "send rejected: service disposed");
            return Err(ServiceError::ResourceDisposed);
        }

        let pdu = self.encoder.encode(&request)?;
        let call_id = Uuid::new_v4();
        debug!(
            %call_id,
            caller = %caller,
            destination = %request.destination,
            dcs = pdu.data_coding_scheme(),
            "sending"
        );

        *self.lock_in_flight() = Some(InFlight {
            reference: pdu.reference,
            call_id,
            caller: caller.clone(),
            message: request.message,
            destination: request.destination,
            started: false,
            outcome_relayed: false,
        });

        let result = inner.driver.send(&pdu);
        let finished = self.lock_in_flight().take();

        match result {
            Ok(()) => {
                if let Some(ctx) = finished {
                    self.complete_sequence(ctx, SendEventKind::Complete);
                }
                Ok(())
            }
            Err(e) => {
                warn!(%call_id, error = %e, "send failed");
                if let Some(ctx) = finished {
                    let cause = e.to_string();
                    self.complete_sequence(ctx, SendEventKind::Failed { cause });
                }
                Err(ServiceError::SendFailure(e))
            }
        }
    }

    /// Emits whatever part of the `Starting` + outcome pair the driver did
    /// not raise itself.
    fn complete_sequence(&self, ctx: InFlight, outcome: SendEventKind) {
        if ctx.outcome_relayed {
            return;
        }
        warn!(
            call_id = %ctx.call_id,
            started = ctx.started,
            outcome = outcome.label(),
            "driver returned without an outcome notification"
        );
        if !ctx.started {
            self.notifications.emit(&ctx.event(SendEventKind::Starting));
        }
        self.notifications.emit(&ctx.event(outcome));
    }

    /// Closes the modem and marks the service disposed.  Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::ResourceCloseFailure`] if the driver fails to
    /// close.  The service is disposed regardless.
    pub fn shutdown(&self) -> Result<(), ServiceError> {
        let mut inner = self.lock_inner();
        if inner.disposed {
            return Ok(());
        }
        inner.disposed = true;

        let closed = inner.driver.close();
        if let Some(subscription) = inner.subscription.take() {
            inner.driver.unsubscribe(subscription);
        }

        match closed {
            Ok(()) => {
                info!("send service shut down");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "modem close failed during shutdown");
                Err(ServiceError::ResourceCloseFailure(e))
            }
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.lock_inner().disposed
    }

    /// The notification lists this service emits to.
    pub fn notifications(&self) -> &Arc<SendNotifications> {
        &self.notifications
    }

    pub fn subscribe(&self, kind: NotificationKind, callback: SendCallback) -> SubscriptionId {
        self.notifications.subscribe(kind, callback)
    }

    pub fn unsubscribe(&self, kind: NotificationKind, id: SubscriptionId) -> bool {
        self.notifications.unsubscribe(kind, id)
    }

    fn lock_inner(&self) -> MutexGuard<'_, ServiceInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, Option<InFlight>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Driver notification handler: attributes `n` to the in-flight call.
fn relay(in_flight: &Mutex<Option<InFlight>>, notifications: &SendNotifications, n: &DriverNotification) {
    let event = {
        let mut slot = in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(ctx) = slot.as_mut().filter(|ctx| ctx.reference == n.reference()) else {
            warn!(reference = %n.reference(), "dropping notification for unknown unit");
            return;
        };
        let kind = match n {
            DriverNotification::Starting { .. } => SendEventKind::Starting,
            DriverNotification::Complete { .. } => SendEventKind::Complete,
            DriverNotification::Failed { cause, .. } => SendEventKind::Failed {
                cause: cause.clone(),
            },
        };
        match kind {
            SendEventKind::Starting => ctx.started = true,
            _ => ctx.outcome_relayed = true,
        }
        ctx.event(kind)
    };
    debug!(call_id = %event.call_id, kind = event.kind.label(), "relaying notification");
    notifications.emit(&event);
}

// ── Tests ─────────────────────────────────────────────────────────────────────
