//! API handlers

mod health;
mod loan;

pub use health::health_check;
pub use loan::*;
