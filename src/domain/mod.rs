//! Domain layer: the payment session state and the contracts of the services
//! it depends on.

pub mod amount;
pub mod ports;
pub mod session;
