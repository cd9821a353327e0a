#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

mod error;
pub use error::{RegistrationError, RegistrationStatus};

/// Flat buffer entry points returning integer status codes.
pub mod flat;

mod global;
pub use global::*;

mod icp;
pub use icp::*;

mod ops;
