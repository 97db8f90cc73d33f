//! # convo-shared
//!
//! Leaf crate shared by every other Convo crate: entity handles, the error
//! model, pagination, reply-address synthesis and signed magic links.

pub mod address;
pub mod constants;
pub mod error;
pub mod key;
pub mod magic;
pub mod pagination;

pub use error::{ConvoError, ErrorKind, FieldErrors, OpContext, Result};
pub use key::{Key, Kind};
pub use pagination::Pagination;
