//! Domain values shared by the gateway server and its callers.
//!
//! Nothing in here performs I/O.  The types describe *who* is calling
//! (`identity`), *what* they asked for (`request`), and *what happened* to the
//! request on the modem (`events`).

pub mod events;
pub mod identity;
pub mod request;
