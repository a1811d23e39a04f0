use anyhow::{Context, Result};
use parley::console::{ConsoleCommand, ConsoleFeed, ConsoleRecognizer, ConsoleSynthesizer};
use parley::controller::TurnNotification;
use parley::{ParleyConfig, SessionHandle, VoiceSession};
use std::io::BufRead;
use std::thread;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting Parley voice chat");

    let config = match std::env::args().nth(1) {
        Some(path) => ParleyConfig::load(&path).with_context(|| format!("loading {}", path))?,
        None => ParleyConfig::default(),
    };

    let (recognizer, feed) = ConsoleRecognizer::new();
    let synthesizer = ConsoleSynthesizer::default();

    let (session, handle) =
        VoiceSession::new(config, Some(Box::new(recognizer)), Some(Box::new(synthesizer)))?;
    let workers = session.start()?;

    spawn_notification_printer(&handle);

    println!("Commands: :mic (toggle listening), :hush (stop speaking), :reset, :quit");
    println!("{}", handle.controls().status);

    run_console(&handle, &feed)?;

    handle.shutdown()?;
    for worker in workers {
        if worker.join().is_err() {
            warn!("Worker thread panicked");
        }
    }

    println!("{}", handle.transcript().to_json()?);
    Ok(())
}

fn run_console(handle: &SessionHandle, feed: &ConsoleFeed) -> Result<()> {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        match ConsoleCommand::parse(&line?) {
            ConsoleCommand::Mic => handle.toggle_listening()?,
            ConsoleCommand::Hush => handle.toggle_speaking()?,
            ConsoleCommand::Reset => handle.reset()?,
            ConsoleCommand::Quit => break,
            ConsoleCommand::Speech(text) if text.is_empty() => {}
            ConsoleCommand::Speech(text) => {
                if !feed.deliver(&text)? {
                    println!("(not listening - type :mic first)");
                }
            }
        }
    }
    Ok(())
}

fn spawn_notification_printer(handle: &SessionHandle) {
    let notifications = handle.notifications();
    thread::spawn(move || {
        for notification in notifications.iter() {
            match notification {
                TurnNotification::StateChanged { to, .. } => println!("[{}]", to.status_text()),
                TurnNotification::MessageAdded(message) if message.is_user() => {
                    println!("you> {}", message.content())
                }
                TurnNotification::ListeningEnded(reason) => {
                    println!("(listening ended: {})", reason)
                }
                TurnNotification::Error(e) => println!("! {}", e.user_message()),
                TurnNotification::ControlsChanged(controls) if !controls.mic_enabled => {
                    println!("(microphone disabled)")
                }
                _ => {}
            }
        }
    });
}
