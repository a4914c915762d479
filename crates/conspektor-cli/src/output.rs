//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use serde::Serialize;
use serde_json::json;

use conspektor_core::persistence::DocumentSummary;
use conspektor_core::view::PLACEHOLDER;
use conspektor_core::SessionEvent;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    /// Print a single document
    pub fn print_document(&self, doc: &DocumentSummary) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:       {}", doc.id);
                println!("Title:    {}", doc.title);
                if let Some(ref created) = doc.created_at {
                    println!("Created:  {}", created);
                }
                if let Some(ref updated) = doc.updated_at {
                    println!("Updated:  {}", updated);
                }
                if !doc.content.is_empty() {
                    println!();
                    println!("{}", truncate_line(&doc.content, 70));
                }
            }
            OutputFormat::Json => print_json(doc),
            OutputFormat::Quiet => println!("{}", doc.id),
        }
    }

    /// Print a list of documents
    pub fn print_documents(&self, docs: &[DocumentSummary]) {
        match self.format {
            OutputFormat::Human => {
                if docs.is_empty() {
                    println!("No documents found.");
                    return;
                }
                for doc in docs {
                    println!(
                        "{:>6} | {} | {}",
                        doc.id,
                        truncate(&doc.title, 40),
                        doc.updated_at.as_deref().unwrap_or("-")
                    );
                }
                println!("\n{} document(s)", docs.len());
            }
            OutputFormat::Json => print_json(&docs),
            OutputFormat::Quiet => {
                for doc in docs {
                    println!("{}", doc.id);
                }
            }
        }
    }

    /// Print the editor content after a repaint
    pub fn print_content(&self, content: &str) {
        match self.format {
            OutputFormat::Human => {
                println!("──────────────────────────────");
                if content.is_empty() {
                    println!("{}", PLACEHOLDER);
                } else {
                    println!("{}", content);
                }
                println!("──────────────────────────────");
            }
            OutputFormat::Json => println!("{}", json!({"event": "repaint", "content": content})),
            OutputFormat::Quiet => {}
        }
    }

    /// Print a live session event
    pub fn print_event(&self, event: &SessionEvent) {
        match event {
            SessionEvent::Repaint(content) => self.print_content(content),
            SessionEvent::StateChanged(state) => match self.format {
                OutputFormat::Human => println!("[{}]", state),
                OutputFormat::Json => {
                    println!("{}", json!({"event": "state", "state": state.as_str()}))
                }
                OutputFormat::Quiet => {}
            },
            SessionEvent::TitleChanged(title) => match self.format {
                OutputFormat::Human => println!("Title: {}", title),
                OutputFormat::Json => println!("{}", json!({"event": "title", "title": title})),
                OutputFormat::Quiet => {}
            },
            SessionEvent::Info(message) => self.message(message),
            SessionEvent::ServerError(message) => self.warning(&format!("Hub error: {}", message)),
            SessionEvent::LoadFailed(reason) => {
                self.warning(&format!("Could not load stored copy: {}", reason))
            }
            SessionEvent::SaveFailed(reason) => self.warning(&format!("Save failed: {}", reason)),
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!("{}", json!({"status": "success", "message": message}));
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print a warning to stderr; shown even in quiet mode
    pub fn warning(&self, message: &str) {
        match self.format {
            OutputFormat::Json => {
                eprintln!("{}", json!({"status": "warning", "message": message}));
            }
            _ => eprintln!("⚠ {}", message),
        }
    }

    /// Check if we should prompt for confirmation
    pub fn should_prompt(&self) -> bool {
        self.format == OutputFormat::Human
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("Failed to serialize output: {}", e),
    }
}

/// Truncate a string to max characters, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Truncate to first line and max length
fn truncate_line(s: &str, max_len: usize) -> String {
    let first_line = s.lines().next().unwrap_or("");
    truncate(first_line, max_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_flags() {
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Human);
        assert_eq!(OutputFormat::from_flags(true, false), OutputFormat::Json);
        assert_eq!(OutputFormat::from_flags(false, true), OutputFormat::Quiet);
        // Quiet takes precedence
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Quiet);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long string", 10), "this is...");
    }

    #[test]
    fn test_truncate_multibyte() {
        assert_eq!(truncate("Документ 42", 20), "Документ 42");
        assert_eq!(truncate("Документ номер сорок два", 10), "Докумен...");
    }

    #[test]
    fn test_truncate_line() {
        assert_eq!(truncate_line("single line", 20), "single line");
        assert_eq!(truncate_line("line one\nline two", 20), "line one");
    }
}
