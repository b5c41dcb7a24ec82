//! IRC message prefix types.

mod serialize;
mod types;

pub use self::types::{Prefix, PrefixRef};
