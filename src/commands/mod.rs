pub mod general;
pub mod verification;

pub use general::{help, ping, status};
pub use verification::verify;
