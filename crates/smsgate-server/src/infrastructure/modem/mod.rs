//! Modem drivers.
//!
//! - **`at`** – Talks GSM 07.05 AT commands in PDU mode to a serial modem.
//! - **`simulated`** – In-memory modem for tests and hardware-free runs.

use std::sync::Arc;

use crate::application::driver::{DriverFactory, ModemDriver};
use crate::infrastructure::storage::config::DriverKind;

pub mod at;
pub mod simulated;

/// Returns the factory for the configured driver kind.
pub fn factory_for(kind: DriverKind) -> Arc<dyn DriverFactory> {
    match kind {
        DriverKind::At => Arc::new(|| -> Box<dyn ModemDriver> { Box::new(at::AtModem::new()) }),
        DriverKind::Simulated => Arc::new(simulated::SimulatedModemFactory::default()),
    }
}
