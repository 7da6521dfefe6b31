//! # chiffre-shared
//!
//! Domain types shared across the chiffre client core: ledger identifiers,
//! ciphertext handles, the per-message lifecycle states, and the error
//! taxonomy. Everything here is plain data; the state machine and the
//! stores that operate on these types live in `chiffre-client` and
//! `chiffre-store`.

pub mod constants;
pub mod error;
pub mod types;

pub use error::{BoardError, Result, ValidationError};
pub use types::*;
