pub mod backends;
pub mod error;
pub mod nn;

pub use error::{NnError, Result};
