//! Simulated modem.
//!
//! Behaves like a real driver from the send service's point of view: each
//! `send` raises `Starting` and then `Complete` or `Failed` from a thread the
//! driver owns, and joins that thread before returning.  Used by the test
//! suites and by `driver = "simulated"` for running the gateway without
//! hardware.
//!
//! [`ModemProbe`] shares the modem's state so tests can inspect what reached
//! the "device" after the modem itself has been boxed and handed away.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use smsgate_core::OutgoingPdu;
use tracing::debug;

use crate::application::driver::{
    DriverError, DriverFactory, DriverNotification, DriverSubscription, HandlerList, ModemDriver,
    NotificationHandler, PortSettings,
};

/// How a simulated modem responds.
#[derive(Debug, Clone, Default)]
pub struct SimulatedBehaviour {
    /// Refuse to open.
    pub fail_open: bool,
    /// Report an error from `close`.  The device is released anyway.
    pub fail_close: bool,
    /// Fail every send with this cause.
    pub fail_sends: Option<String>,
    /// Time the "transmission" takes between `Starting` and the outcome.
    pub send_delay: Duration,
}

#[derive(Default)]
struct Shared {
    behaviour: Mutex<SimulatedBehaviour>,
    handlers: Mutex<HandlerList>,
    open: AtomicBool,
    opened: AtomicUsize,
    sent: Mutex<Vec<OutgoingPdu>>,
    in_send: AtomicBool,
    overlaps: AtomicUsize,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory [`ModemDriver`].
pub struct SimulatedModem {
    shared: Arc<Shared>,
}

impl SimulatedModem {
    /// A modem that opens and delivers every message.
    pub fn new() -> Self {
        Self::with_behaviour(SimulatedBehaviour::default())
    }

    pub fn with_behaviour(behaviour: SimulatedBehaviour) -> Self {
        let shared = Shared {
            behaviour: Mutex::new(behaviour),
            ..Shared::default()
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Returns a handle that observes this modem.
    pub fn probe(&self) -> ModemProbe {
        ModemProbe {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Default for SimulatedModem {
    fn default() -> Self {
        Self::new()
    }
}

impl ModemDriver for SimulatedModem {
    fn subscribe(&mut self, handler: NotificationHandler) -> DriverSubscription {
        lock(&self.shared.handlers).add(handler)
    }

    fn unsubscribe(&mut self, subscription: DriverSubscription) -> bool {
        lock(&self.shared.handlers).remove(subscription)
    }

    fn open(&mut self, settings: &PortSettings) -> Result<(), DriverError> {
        if lock(&self.shared.behaviour).fail_open {
            return Err(DriverError::Open {
                port: settings.port.clone(),
                reason: "simulated open failure".to_string(),
            });
        }
        self.shared.open.store(true, Ordering::SeqCst);
        self.shared.opened.fetch_add(1, Ordering::SeqCst);
        debug!(port = %settings.port, "simulated modem opened");
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::SeqCst)
    }

    fn close(&mut self) -> Result<(), DriverError> {
        self.shared.open.store(false, Ordering::SeqCst);
        if lock(&self.shared.behaviour).fail_close {
            return Err(DriverError::Rejected("simulated close failure".to_string()));
        }
        Ok(())
    }

    fn send(&mut self, pdu: &OutgoingPdu) -> Result<(), DriverError> {
        if !self.is_open() {
            return Err(DriverError::NotOpen);
        }
        if self.shared.in_send.swap(true, Ordering::SeqCst) {
            self.shared.overlaps.fetch_add(1, Ordering::SeqCst);
        }

        lock(&self.shared.sent).push(pdu.clone());
        let behaviour = lock(&self.shared.behaviour).clone();
        let failure = behaviour.fail_sends.clone();
        let handlers = lock(&self.shared.handlers).snapshot();
        let reference = pdu.reference;

        let worker = std::thread::Builder::new()
            .name("smsgate-sim-modem".to_string())
            .spawn(move || {
                let raise = |n: DriverNotification| {
                    for handler in &handlers {
                        handler(&n);
                    }
                };
                raise(DriverNotification::Starting { reference });
                if !behaviour.send_delay.is_zero() {
                    std::thread::sleep(behaviour.send_delay);
                }
                match behaviour.fail_sends {
                    Some(cause) => raise(DriverNotification::Failed { reference, cause }),
                    None => raise(DriverNotification::Complete { reference }),
                }
            });

        let joined = match worker {
            Ok(handle) => handle
                .join()
                .map_err(|_| DriverError::Rejected("simulated modem thread panicked".to_string())),
            Err(e) => Err(DriverError::Io(e)),
        };
        self.shared.in_send.store(false, Ordering::SeqCst);
        joined?;

        match failure {
            Some(cause) => Err(DriverError::Rejected(cause)),
            None => Ok(()),
        }
    }
}

/// Observation handle for a [`SimulatedModem`].
#[derive(Clone)]
pub struct ModemProbe {
    shared: Arc<Shared>,
}

impl ModemProbe {
    /// Every unit handed to `send`, in order.
    pub fn sent(&self) -> Vec<OutgoingPdu> {
        lock(&self.shared.sent).clone()
    }

    pub fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::SeqCst)
    }

    /// How many times the modem has been opened successfully.
    pub fn open_count(&self) -> usize {
        self.shared.opened.load(Ordering::SeqCst)
    }

    pub fn handler_count(&self) -> usize {
        lock(&self.shared.handlers).len()
    }

    /// Number of `send` calls that began while another was still running.
    pub fn overlapping_sends(&self) -> usize {
        self.shared.overlaps.load(Ordering::SeqCst)
    }

    pub fn set_behaviour(&self, behaviour: SimulatedBehaviour) {
        *lock(&self.shared.behaviour) = behaviour;
    }
}

/// Factory producing simulated modems that all report to one probe.
///
/// Every driver it creates is a view of the same simulated device, so a
/// subscription leaked by one gateway run is still visible through the probe
/// after a restart.
pub struct SimulatedModemFactory {
    shared: Arc<Shared>,
}

impl SimulatedModemFactory {
    pub fn new(behaviour: SimulatedBehaviour) -> Self {
        Self {
            shared: SimulatedModem::with_behaviour(behaviour).shared,
        }
    }

    pub fn probe(&self) -> ModemProbe {
        ModemProbe {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Default for SimulatedModemFactory {
    fn default() -> Self {
        Self::new(SimulatedBehaviour::default())
    }
}

impl DriverFactory for SimulatedModemFactory {
    fn create(&self) -> Box<dyn ModemDriver> {
        Box::new(SimulatedModem {
            shared: Arc::clone(&self.shared),
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
