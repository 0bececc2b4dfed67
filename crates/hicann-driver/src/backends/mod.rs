//! Link transport implementations.

pub mod sim;

pub use sim::{SimConnector, SimLink};
