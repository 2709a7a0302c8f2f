//! # Game Module
//!
//! The turn state of one game: who plays next, which rows are on the mat, and
//! what was announced last.
//!
//! ## Key Components:
//! - **Turn State**: Player rotation and random limb/row selection
//! - **Move History**: The few most recent previous announcements

pub mod history; // Recent announcements, newest first
pub mod turn; // Player rotation and move selection

pub use history::{HistoryEntry, MoveHistory};
pub use turn::{Announcement, TurnState};
