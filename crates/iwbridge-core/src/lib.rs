//! iwbridge Core Library
//!
//! This crate provides the error taxonomy and the identifier, hash and
//! math types shared across all iwbridge components.

pub mod error;
pub mod types;

pub use error::{Error, ErrorKind, Result, ResultExt};
pub use types::*;

/// Re-export commonly used items
pub mod prelude {
    pub use crate::error::{Error, ErrorKind, Result, ResultExt};
    pub use crate::types::*;
}
