//! # Voice Module
//!
//! Hands-free control: a continuous recognizer listens for "next" and a speech
//! announcer reads each move aloud.
//!
//! ## Key Components:
//! - **Recognizer**: The platform recognizer behind a factory/handle trait pair
//! - **Commands**: Finds command phrases in recognition results
//! - **Priming**: The microphone permission prompt some platforms need first
//! - **Announcer**: Text-to-speech output
//! - **Session**: The controller that keeps the recognizer alive and reports status

pub mod announcer; // Text-to-speech output
pub mod commands; // Command phrase matching
pub mod priming; // Microphone permission priming
pub mod recognizer; // Recognizer traits and result types
pub mod session; // Voice session state machine
