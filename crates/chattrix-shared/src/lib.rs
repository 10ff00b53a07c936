//! # chattrix-shared
//!
//! Identifiers, enumerations and constants shared by the Chattrix store and
//! server crates.

pub mod constants;
pub mod error;
pub mod types;

pub use error::SharedError;
pub use types::*;
