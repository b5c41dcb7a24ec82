//! Channel command handlers.
//!
//! Handles JOIN, PART, TOPIC, NAMES, KICK, INVITE, KNOCK, CYCLE commands.

mod cycle;
mod invite;
mod join;
mod kick;
mod knock;
mod list;
mod names;
mod ops;
mod part;
mod topic;

pub use cycle::CycleHandler;
pub use invite::InviteHandler;
pub use join::JoinHandler;
pub use kick::KickHandler;
pub use knock::KnockHandler;
pub use list::ListHandler;
pub use names::NamesHandler;
pub use ops::{TargetUser, force_join_channel, force_part_channel};
pub use part::PartHandler;
pub use topic::TopicHandler;
