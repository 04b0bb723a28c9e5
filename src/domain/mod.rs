//! Domain layer: value types of the loyalty ledger and the ports the
//! application layer talks through.

pub mod ledger;
pub mod order;
pub mod ports;
pub mod user;
