//! Core infrastructure shared by every component
//!
//! - **time**: wall clocks driving checkpoint and heartbeat triggers

pub mod time;

pub use time::{ManualClock, SystemClock, WallClock};
