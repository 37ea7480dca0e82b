//! simex-protocol
//!
//! Line-oriented encoding for the simulator.
//!
//! - [`csv_codec`] : market data and command records in, execution events out
//!   (used for replay files, scripted strategies and regression scenarios).

pub mod error;
pub mod csv_codec;

pub use csv_codec::{format_event, parse_line, parse_records, Record};
pub use error::ProtocolError;
