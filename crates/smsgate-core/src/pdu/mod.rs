//! SMS-SUBMIT protocol data unit encoding.
//!
//! - **`gsm7`** – GSM 03.38 default alphabet lookup and septet packing.
//! - **`encoder`** – The [`PduEncoder`](encoder::PduEncoder) seam and the
//!   standard GSM 03.40 SMS-SUBMIT implementation.

pub mod encoder;
pub mod gsm7;
