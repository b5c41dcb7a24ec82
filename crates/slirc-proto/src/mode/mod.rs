//! IRC user and channel mode types.

mod parse;
mod types;

pub use self::types::{ChannelMode, Mode, ModeType, UserMode};
