//! Server query handlers: VERSION, TIME, ADMIN, INFO, LUSERS, STATS, MOTD
//!
//! RFC 2812 §3.4 - Server queries and commands

mod motd;
mod stats;

pub use motd::{AdminHandler, InfoHandler, ListHandler, LusersHandler, MotdHandler, TimeHandler, VersionHandler};
pub use stats::StatsHandler;
