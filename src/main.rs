//! # Blind Twister - Main Application Entry Point
//!
//! A hands-free caller for Twister: it picks a random limb and mat row for each
//! player in turn, reads the move aloud, and listens for "next" so nobody has
//! to leave the mat to touch a button.
//!
//! ## Key Rust Concepts Used:
//! - **async/await**: One event loop waits on the keyboard, the voice session and signals at once
//! - **modules**: Code is organized into separate modules (mod statements)
//! - **Result<T, E>**: Error handling using Rust's Result type
//! - **tokio::select!**: Reacts to whichever input is ready first
//!
//! ## Application Architecture:
//! - **config**: Handles application configuration (TOML files + environment variables)
//! - **game**: Turn rotation, random moves and the recent-move history
//! - **voice**: Recognizer, announcer and the voice session controller
//! - **state**: Ties the game and the voice session together
//! - **console**: Terminal stand-ins for the microphone and the speaker
//! - **i18n / preferences**: Russian and English strings, remembered language choice
//! - **error**: Custom error types

// Module declarations - These tell Rust about our other source files
mod config; // Configuration management (config.rs)
mod console; // Terminal recognizer and announcer (console.rs)
mod error; // Error handling types (error.rs)
mod game; // Turn state and history (game/ directory)
mod i18n; // Localization tables (i18n.rs)
mod preferences; // Persisted language choice (preferences.rs)
mod state; // Application state (state.rs)
mod voice; // Voice session (voice/ directory)

use anyhow::Result;
use config::AppConfig;
use console::{render_status, ConsoleAnnouncer, ConsoleMicrophone, ConsoleRecognizerFactory};
use i18n::Localization;
use rand::rngs::StdRng;
use rand::SeedableRng;
use state::{AdvanceSource, AppState, Collaborators};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voice::announcer::{SilentAnnouncer, SpeechAnnouncer};
use voice::priming::StaticPrimer;
use voice::session::StartOutcome;

/// How often the console microphone checks for silence.
const SILENCE_CHECK_INTERVAL: Duration = Duration::from_millis(250);

/// What the main loop should do after a line of input.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// The main application entry point.
///
/// ## What this function does:
/// 1. **Loads configuration** from files and environment variables
/// 2. **Sets up logging** (to stderr, so it never mixes with the game on stdout)
/// 3. **Creates the application state** wired to the console collaborators
/// 4. **Runs the event loop** until `:quit`, end of input, or a shutdown signal
///
/// ## Key Rust Concepts:
/// - `#[tokio::main(flavor = "current_thread")]`: All events are handled on one
///   thread, so the voice session never sees two callbacks at the same time
/// - `?`: The question mark operator automatically returns early if there's an error
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting blind-twister v{}", env!("CARGO_PKG_VERSION"));

    let localization = Arc::new(Localization::builtin()?);
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();

    let microphone = ConsoleMicrophone::new(config.silence_timeout());
    let announcer: Box<dyn SpeechAnnouncer> = if config.speech.enabled {
        Box::new(ConsoleAnnouncer)
    } else {
        Box::new(SilentAnnouncer)
    };
    let collaborators = Collaborators {
        recognizer: Box::new(ConsoleRecognizerFactory::new(
            microphone.clone(),
            config.voice.enabled,
            config.voice.secure_context,
        )),
        primer: Arc::new(StaticPrimer::granting()),
        announcer,
    };

    let mut state = AppState::new(config, localization, collaborators, events_tx, StdRng::from_os_rng())?;
    print_banner(&state);

    let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
    let mut silence_check = tokio::time::interval(SILENCE_CHECK_INTERVAL);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next() => match line {
                Some(Ok(line)) => {
                    if handle_line(&mut state, &microphone, &line)? == Flow::Quit {
                        break;
                    }
                }
                Some(Err(e)) => {
                    error!("Failed to read input: {}", e);
                    break;
                }
                None => {
                    info!("Input closed");
                    break;
                }
            },
            Some(event) = events_rx.recv() => {
                let before = state.voice().status_line();
                if state.handle_session_event(event).is_some() {
                    print_history(&state);
                }
                let after = state.voice().status_line();
                if after != before {
                    println!("{}", render_status(&after));
                }
            }
            now = silence_check.tick() => microphone.check_silence(now),
            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping...");
                break;
            }
        }
    }

    state.shutdown();
    info!("Stopped gracefully");
    Ok(())
}

/// Initialize the tracing (logging) system for the application.
///
/// ## Environment Variables:
/// - `RUST_LOG`: Controls what gets logged (e.g., "debug", "blind_twister=debug")
/// - If not set, defaults to "blind_twister=info"
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "blind_twister=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Received SIGINT");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }
}

/// React to one line of keyboard input.
///
/// Lines starting with `:` are controls. An empty line is the "next" button.
/// Anything else is speech: it goes to the console microphone when a
/// recognizer session is open.
fn handle_line(state: &mut AppState, microphone: &ConsoleMicrophone, line: &str) -> Result<Flow> {
    match line.trim() {
        "" | ":next" | ":n" => {
            state.next_turn(AdvanceSource::Manual);
            print_history(state);
        }
        ":mic" | ":m" => {
            if let Some(StartOutcome::Failed(e)) = state.toggle_voice() {
                warn!("Voice start failed: {}", e);
            }
            println!("{}", render_status(&state.voice().status_line()));
        }
        ":lang" | ":l" => {
            let language = state.toggle_language();
            info!(language = %language, "Language switched");
            println!("{}", state.text("title"));
            println!("{}", state.current_prompt());
            println!("{}", render_status(&state.voice().status_line()));
        }
        ":restart" | ":r" => {
            state.restart_game()?;
            print_banner(state);
        }
        ":status" | ":s" => println!("{}", state.snapshot_json()?),
        ":quit" | ":q" => return Ok(Flow::Quit),
        ":help" | ":h" => print_help(),
        command if command.starts_with(':') => {
            println!("Unknown command: {} (:help lists the controls)", command);
        }
        heard => {
            if !microphone.hear(heard) {
                println!("{}", render_status(&state.voice().status_line()));
            }
        }
    }
    Ok(Flow::Continue)
}

fn print_banner(state: &AppState) {
    println!("{} - {}", state.text("title"), state.text("subtitle"));
    println!(
        "{}: {}",
        state.text("playerLabel"),
        state.turns().players().join(", ")
    );
    println!("{}", state.turns().rows().join(" / "));
    println!("{}", state.current_prompt());
    println!("{}", render_status(&state.voice().status_line()));
    print_help();
}

fn print_help() {
    println!("Enter/:next  next move    :mic     toggle listening");
    println!(":lang        language     :restart new game");
    println!(":status      status JSON  :quit    exit");
}

/// Previous moves under the current one, newest first.
fn print_history(state: &AppState) {
    if state.history().is_empty() {
        return;
    }
    println!("   ---");
    for entry in state.history().iter() {
        let announcement = &entry.announcement;
        println!(
            "   {} {}: {}, {}",
            entry.announced_at.format("%H:%M:%S"),
            announcement.player,
            announcement.limb.label(state.localization(), state.language()),
            announcement.row
        );
    }
}
