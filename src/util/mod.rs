//! Utility modules.

pub mod panic;
pub mod timeout;

pub use panic::catch_panic;
pub use timeout::with_timeout;
