//! Locale translation documents.
//!
//! A translation payload is JSON carrying a `locale` and an `entries`
//! mapping from translation keys to strings. The content type of a
//! document is inferred from the shape of its keys.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::DocumentError;

/// Key-pattern families used to infer a document's content type.
const UI_PATTERNS: &[&str] = &["ui.", "button.", "menu.", "dialog.", "window.", "tab.", "label."];
const ERROR_PATTERNS: &[&str] = &["error.", "warning.", "exception.", "fail.", "invalid."];
const GAME_PATTERNS: &[&str] = &["game.", "player.", "item.", "action.", "feature.", "avatar."];

/// Share of keys a pattern family must reach to claim the document.
const MAJORITY_THRESHOLD: f64 = 0.3;

/// Coarse content categories for translation documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    /// Interface chrome strings
    Ui,
    /// Error and warning strings
    Errors,
    /// In-game content strings
    GameContent,
    /// Everything else
    General,
}

impl ContentType {
    /// Folder/file-name form of the category.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ui => "UI",
            Self::Errors => "Errors",
            Self::GameContent => "GameContent",
            Self::General => "General",
        }
    }
}

/// A parsed translation document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationDocument {
    /// Locale tag, e.g. `zh-cn`
    #[serde(default = "default_locale")]
    pub locale: String,
    /// Key-to-string entries
    #[serde(default)]
    pub entries: serde_json::Map<String, Value>,
}

fn default_locale() -> String {
    "unknown".to_string()
}

impl TranslationDocument {
    /// Parse a translation payload, decoding invalid UTF-8 lossily.
    pub fn parse(bytes: &[u8]) -> Result<Self, DocumentError> {
        let text = String::from_utf8_lossy(bytes);
        Ok(serde_json::from_str(&text)?)
    }

    /// Infer the content type from the entry keys.
    ///
    /// Each pattern family is tallied over the lowercased keys; the first
    /// family (UI, then errors, then game content) holding more than 30%
    /// of the keys wins, otherwise the document is `General`.
    pub fn content_type(&self) -> ContentType {
        if self.entries.is_empty() {
            return ContentType::General;
        }

        let total = self.entries.len() as f64;
        let mut ui = 0usize;
        let mut errors = 0usize;
        let mut game = 0usize;
        for key in self.entries.keys() {
            let key = key.to_lowercase();
            if UI_PATTERNS.iter().any(|p| key.contains(p)) {
                ui += 1;
            }
            if ERROR_PATTERNS.iter().any(|p| key.contains(p)) {
                errors += 1;
            }
            if GAME_PATTERNS.iter().any(|p| key.contains(p)) {
                game += 1;
            }
        }

        if ui as f64 / total > MAJORITY_THRESHOLD {
            ContentType::Ui
        } else if errors as f64 / total > MAJORITY_THRESHOLD {
            ContentType::Errors
        } else if game as f64 / total > MAJORITY_THRESHOLD {
            ContentType::GameContent
        } else {
            ContentType::General
        }
    }
}
