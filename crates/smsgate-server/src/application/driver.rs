//! The modem driver port.
//!
//! A driver owns the physical connection to the modem.  It transmits one
//! encoded unit per [`ModemDriver::send`] call and, synchronously within that
//! call, raises a `Starting` notification followed by exactly one `Complete`
//! or `Failed` notification for the unit.  Notifications may be raised from a
//! thread owned by the driver; handlers must not assume they run on the
//! caller's thread.
//!
//! The production implementations live in `infrastructure::modem`; tests use
//! [`crate::infrastructure::modem::simulated::SimulatedModem`].

use std::sync::Arc;
use std::time::Duration;

use smsgate_core::OutgoingPdu;
use thiserror::Error;
use uuid::Uuid;

/// Settings used to open the modem connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSettings {
    /// Device address, e.g. `COM1` or `/dev/ttyUSB0`.
    pub port: String,
    /// Line speed in baud.
    pub baud_rate: u32,
    /// Per-command response timeout.
    pub timeout: Duration,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            port: "COM1".to_string(),
            baud_rate: 19200,
            timeout: Duration::from_millis(300),
        }
    }
}

/// Errors reported by a modem driver.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("failed to open {port}: {reason}")]
    Open { port: String, reason: String },

    #[error("modem is not open")]
    NotOpen,

    #[error("timed out waiting for {expected}")]
    Timeout { expected: String },

    #[error("modem rejected the command: {0}")]
    Rejected(String),

    #[error("modem I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A notification raised by the driver for one outbound unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverNotification {
    Starting { reference: Uuid },
    Complete { reference: Uuid },
    Failed { reference: Uuid, cause: String },
}

impl DriverNotification {
    /// The [`OutgoingPdu::reference`] this notification refers to.
    pub fn reference(&self) -> Uuid {
        match self {
            Self::Starting { reference }
            | Self::Complete { reference }
            | Self::Failed { reference, .. } => *reference,
        }
    }
}

/// Callback registered with a driver.
pub type NotificationHandler = Arc<dyn Fn(&DriverNotification) + Send + Sync>;

/// Handle returned by [`ModemDriver::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DriverSubscription(pub u64);

/// Abstraction over the physical modem.
pub trait ModemDriver: Send {
    /// Registers a notification handler.
    fn subscribe(&mut self, handler: NotificationHandler) -> DriverSubscription;

    /// Removes a handler.  Returns `false` if the handle was unknown.
    fn unsubscribe(&mut self, subscription: DriverSubscription) -> bool;

    /// Opens the connection to the modem.
    fn open(&mut self, settings: &PortSettings) -> Result<(), DriverError>;

    /// Returns `true` while the connection is open.
    fn is_open(&self) -> bool;

    /// Closes the connection.  Closing a closed driver is a no-op.
    fn close(&mut self) -> Result<(), DriverError>;

    /// Transmits `pdu`, raising notifications before returning.
    fn send(&mut self, pdu: &OutgoingPdu) -> Result<(), DriverError>;
}

/// Creates a fresh, unopened driver for each start of the gateway.
pub trait DriverFactory: Send + Sync {
    fn create(&self) -> Box<dyn ModemDriver>;
}

impl<F> DriverFactory for F
where
    F: Fn() -> Box<dyn ModemDriver> + Send + Sync,
{
    fn create(&self) -> Box<dyn ModemDriver> {
        self()
    }
}

/// Ordered handler list shared by driver implementations.
#[derive(Default)]
pub struct HandlerList {
    next_id: u64,
    handlers: Vec<(DriverSubscription, NotificationHandler)>,
}

impl HandlerList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, handler: NotificationHandler) -> DriverSubscription {
        self.next_id += 1;
        let id = DriverSubscription(self.next_id);
        self.handlers.push((id, handler));
        id
    }

    pub fn remove(&mut self, id: DriverSubscription) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(sub, _)| *sub != id);
        self.handlers.len() != before
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Clones the handlers so they can be invoked from another thread.
    pub fn snapshot(&self) -> Vec<NotificationHandler> {
        self.handlers.iter().map(|(_, h)| Arc::clone(h)).collect()
    }

    pub fn raise(&self, notification: &DriverNotification) {
        for (_, handler) in &self.handlers {
            handler(notification);
        }
    }
}
