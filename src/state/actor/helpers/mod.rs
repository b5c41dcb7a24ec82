//! Channel actor helper utilities.
//!
//! Internal helpers for member management, mode handling, and list operations.

pub mod lists;
pub mod members;
pub mod modes;

pub use modes::{modes_from_string, modes_to_string};
