pub mod bus;
mod db;
pub mod error;

pub use bus::{keys, SqliteBus};
pub use error::{BusError, Result};
