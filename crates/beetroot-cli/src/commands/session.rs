//! Interactive session command.
//!
//! Reads commands from stdin, forwards them to a [`SessionDriver`], and
//! prints session events as they happen. Pasted JSON is treated as signal
//! text from the peer.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

use beetroot_core::config::NotificationPermission;
use beetroot_core::driver::{Notifier, SessionDriver, SessionHandle};
use beetroot_core::{SdpKind, SessionEvent};

use super::SessionArgs;
use crate::ui::{self, SignalBuffer};

const HELP: &str = "\
  offer              Create an offer to send to your peer
  {...}              Paste the offer or answer your peer sent you
  send <paths...>    Queue files to send
  start              Start sending the queued files
  cancel             Cancel the current send
  status             Show connection status
  cleanup            Close the connection and start over
  help               Show this help
  quit               Leave";

/// A line typed at the prompt.
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Empty,
    Offer,
    Signal(String),
    Send(Vec<PathBuf>),
    Start,
    Cancel,
    Status,
    Cleanup,
    Help,
    Quit,
    Unknown(String),
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    if line.starts_with('{') {
        return Input::Signal(line.to_string());
    }

    let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    match word.to_lowercase().as_str() {
        "offer" | "connect" => Input::Offer,
        "send" | "add" => Input::Send(ui::parse_paths(rest)),
        "start" => Input::Start,
        "cancel" => Input::Cancel,
        "status" => Input::Status,
        "cleanup" | "reset" => Input::Cleanup,
        "help" | "?" => Input::Help,
        "quit" | "exit" | "q" => Input::Quit,
        _ => Input::Unknown(word.to_string()),
    }
}

/// Rings the terminal bell and prints the notification.
struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn notify(&self, title: &str, body: &str) {
        print!("\x07");
        println!("  [{title}] {body}");
    }
}

/// Run the session command.
pub async fn run(args: SessionArgs, config_path: Option<&Path>) -> Result<()> {
    let mut config = super::load_config(config_path)?;
    if let Some(name) = args.name {
        config.general.device_name = name;
    }
    if let Some(bind) = args.bind {
        config.connection.bind_address = bind;
    }
    if args.notify {
        config.notifications.permission = NotificationPermission::Granted;
    }

    let output_dir = args
        .output
        .or_else(|| config.general.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));

    let (driver, handle) = SessionDriver::new(&config, output_dir.clone())?;
    let driver_task = tokio::spawn(driver.with_notifier(TerminalNotifier).run());
    let printer = tokio::spawn(print_events(handle.subscribe()));

    println!();
    println!("Beetroot v{}", beetroot_core::VERSION);
    println!("{}", "-".repeat(37));
    println!();
    println!("  Device:  {}", config.general.device_name);
    println!("  Saving:  {}", output_dir.display());
    println!();
    println!("  Type 'offer' to start, or paste an offer from your peer.");
    println!("  Type 'help' for all commands.");
    println!();

    let result = repl(&handle).await;

    handle.shutdown().await;
    let _ = driver_task.await;
    printer.abort();
    result
}

async fn repl(handle: &SessionHandle) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut paste = SignalBuffer::default();

    loop {
        if !paste.is_collecting() {
            prompt();
        }
        let Some(line) = lines.next_line().await? else {
            break;
        };

        for input in read_line(&mut paste, &line) {
            if !dispatch(handle, input).await? {
                return Ok(());
            }
        }
    }

    Ok(())
}

/// Turn a typed line into inputs, feeding the paste buffer as needed.
///
/// A blank line, a command or a new `{` ends an unfinished paste. The partial
/// text is passed on as a signal so the user sees why it was refused.
fn read_line(paste: &mut SignalBuffer, line: &str) -> Vec<Input> {
    let mut inputs = Vec::new();

    if paste.is_collecting() && !matches!(parse_input(line), Input::Unknown(_)) {
        if let Some(partial) = paste.take() {
            println!("  Paste was incomplete.");
            inputs.push(Input::Signal(partial));
        }
    }

    if paste.is_collecting() || line.trim_start().starts_with('{') {
        if let Some(text) = paste.push_line(line) {
            inputs.push(Input::Signal(text));
        }
    } else {
        inputs.push(parse_input(line));
    }

    inputs
}

/// Returns false when the user wants to leave.
async fn dispatch(handle: &SessionHandle, input: Input) -> Result<bool> {
    // Failures are reported through session events; only a stopped driver
    // ends the loop.
    let outcome = match input {
        Input::Empty => Ok(()),
        Input::Offer => handle.start_connection().await,
        Input::Signal(text) => handle.connect_peer(text).await,
        Input::Send(paths) if paths.is_empty() => {
            println!("  Usage: send <paths...>");
            Ok(())
        }
        Input::Send(paths) => handle.queue_files(paths).await,
        Input::Start => handle.start_transfer().await,
        Input::Cancel => handle.cancel_transfer().await.map(|cancelled| {
            if !cancelled {
                println!("  Nothing to cancel.");
            }
        }),
        Input::Status => handle.check_status().await.map(|_| ()),
        Input::Cleanup => handle.cleanup().await,
        Input::Help => {
            println!("{HELP}");
            Ok(())
        }
        Input::Quit => return Ok(false),
        Input::Unknown(word) => {
            println!("  Unknown command '{word}'. Type 'help' for a list.");
            Ok(())
        }
    };

    match outcome {
        Err(beetroot_core::Error::Internal(e)) => Err(anyhow::anyhow!(e)),
        Err(e) => {
            tracing::debug!("Command failed: {e}");
            if let Some(suggestion) = e.suggestion() {
                println!("  Suggestion: {suggestion}");
            }
            Ok(true)
        }
        Ok(()) => Ok(true),
    }
}

fn prompt() {
    print!("> ");
    let _ = io::stdout().flush();
}

async fn print_events(mut events: broadcast::Receiver<SessionEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => print_event(&event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!("Skipped {skipped} session events");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::Status(text) => println!("  {text}"),
        SessionEvent::Error { code, message } => match code {
            Some(code) => eprintln!("  Error [{code}]: {message}"),
            None => eprintln!("  Error: {message}"),
        },
        SessionEvent::SignalReady { kind, text } => {
            let heading = match kind {
                SdpKind::Offer => "Your offer (copy the whole line):",
                SdpKind::Answer => "Your answer (copy the whole line):",
            };
            ui::print_signal(heading, text);
        }
        SessionEvent::StateChanged(state) => tracing::debug!("Session is now {state}"),
        _ => {}
    }
}
