//! Editor view mirror
//!
//! The session keeps its own copy of what the editor shows. Local edits
//! update it, repaints overwrite it, and the persistence fallback saves it.

use serde::{Deserialize, Serialize};

/// Text shown while the document is empty
pub const PLACEHOLDER: &str = "Начните писать...";

/// Plain (title, content) pair stored through the REST gateway
///
/// Best-effort mirror of the view, not a source of truth.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewSnapshot {
    pub title: String,
    pub content: String,
}

/// What the editor currently shows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewState {
    title: String,
    content: String,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Content as displayed, falling back to the placeholder when empty
    pub fn display_text(&self) -> &str {
        if self.content.is_empty() {
            PLACEHOLDER
        } else {
            &self.content
        }
    }

    pub fn set_title(&mut self, title: String) {
        self.title = title;
    }

    /// Replace the content; returns false if nothing changed
    pub fn set_content(&mut self, content: String) -> bool {
        if self.content == content {
            return false;
        }
        self.content = content;
        true
    }

    pub fn paint(&mut self, snapshot: ViewSnapshot) {
        self.title = snapshot.title;
        self.content = snapshot.content;
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        ViewSnapshot {
            title: self.title.clone(),
            content: self.content.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_when_empty() {
        let mut view = ViewState::new();
        assert_eq!(view.display_text(), PLACEHOLDER);

        view.set_content("Hello".to_string());
        assert_eq!(view.display_text(), "Hello");
    }

    #[test]
    fn test_set_content_reports_change() {
        let mut view = ViewState::new();
        assert!(view.set_content("a".to_string()));
        assert!(!view.set_content("a".to_string()));
    }

    #[test]
    fn test_paint_and_snapshot() {
        let mut view = ViewState::new();
        view.paint(ViewSnapshot {
            title: "Notes".to_string(),
            content: "body".to_string(),
        });
        assert_eq!(view.title(), "Notes");
        assert_eq!(view.snapshot().content, "body");
    }
}
