//! Live editing session
//!
//! Lines read from stdin are appended to the document; remote changes are
//! printed as they arrive. Commands start with a colon.

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

use conspektor_core::sync::SessionConfig;
use conspektor_core::{
    spawn_session, AutomergeReplica, Config, DocumentIdentity, GatewayClient, SessionEvent,
};

use crate::output::Output;

/// One line of editor input
#[derive(Debug, PartialEq, Eq)]
enum EditorInput {
    /// Text to append as a new line
    Text(String),
    Title(String),
    /// Print the current content
    Show,
    /// Save and exit
    Quit,
    /// Exit without saving
    Discard,
    Unknown(String),
}

impl EditorInput {
    fn parse(line: &str) -> Self {
        let Some(command) = line.strip_prefix(':') else {
            return EditorInput::Text(line.to_string());
        };

        let (name, arg) = command
            .split_once(char::is_whitespace)
            .map(|(n, a)| (n, a.trim()))
            .unwrap_or((command.trim(), ""));

        match name {
            "q" | "wq" | "quit" => EditorInput::Quit,
            "q!" | "quit!" => EditorInput::Discard,
            "show" => EditorInput::Show,
            "title" if !arg.is_empty() => EditorInput::Title(arg.to_string()),
            // `::text` types a literal leading colon
            _ if command.starts_with(':') => EditorInput::Text(command.to_string()),
            _ => EditorInput::Unknown(line.to_string()),
        }
    }
}

fn append_line(buffer: &mut String, line: &str) {
    if !buffer.is_empty() {
        buffer.push('\n');
    }
    buffer.push_str(line);
}

/// Open a live session and edit until `:q` or end of input
pub async fn run(config: &Config, identity: DocumentIdentity, output: &Output) -> Result<()> {
    let gateway = GatewayClient::new(&config.gateway_url).context("Invalid gateway URL")?;
    let mut handle = spawn_session(
        SessionConfig::from(config),
        identity.clone(),
        AutomergeReplica::new(),
        gateway,
    );

    output.message(&format!(
        "Editing {} - type to append lines, :title <text>, :show, :q to save and exit, :q! to discard",
        identity
    ));

    let mut buffer = String::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read input")? else {
                    // End of input: a failed save cannot be retried here
                    handle
                        .exit()
                        .await
                        .context("Changes may not be stored; not exiting cleanly")?;
                    break;
                };
                match EditorInput::parse(&line) {
                    // Hold the exit until the store has the final copy
                    EditorInput::Quit => match handle.exit().await {
                        Ok(()) => break,
                        Err(e) => output.warning(&format!(
                            "{:#}. Type :q to retry or :q! to quit without saving",
                            e
                        )),
                    },
                    EditorInput::Discard => {
                        handle.shutdown().await;
                        output.warning("Quit without saving; unsaved changes may be lost");
                        return Ok(());
                    }
                    EditorInput::Show => output.print_content(&buffer),
                    EditorInput::Title(title) => handle.set_title(title).await?,
                    EditorInput::Text(text) => {
                        append_line(&mut buffer, &text);
                        handle.edit(buffer.clone()).await?;
                    }
                    EditorInput::Unknown(input) => {
                        output.warning(&format!("Unknown command: {}", input));
                    }
                }
            }

            event = handle.event_rx.recv() => {
                let Some(event) = event else {
                    bail!("Session ended unexpectedly");
                };
                if let SessionEvent::Repaint(ref content) = event {
                    buffer = content.clone();
                }
                output.print_event(&event);
            }
        }
    }

    while let Ok(event) = handle.event_rx.try_recv() {
        output.print_event(&event);
    }
    output.success(&format!("Saved document {}", identity.document_id()));

    Ok(())
}
