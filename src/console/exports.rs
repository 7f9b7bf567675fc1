//! Export artifacts: the (session, kind) cache and artifact previews.
//!
//! Before an expensive export runs, the console asks whether an artifact for
//! the same session and kind already exists (locally first, then via the
//! remote `last-exports` listing) and short-circuits to it. There is no
//! invalidation: the remote system is authoritative for freshness.

use std::collections::HashMap;

use crate::api::types::{ArtifactFile, ExportFiles};

/// Kinds of export artifacts the console can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportKind {
    Contacts,
    Chats,
    SavedMessages,
    Dialog,
    ContactPhotos,
}

impl ExportKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Contacts => "contacts",
            Self::Chats => "chats",
            Self::SavedMessages => "saved messages",
            Self::Dialog => "dialog",
            Self::ContactPhotos => "contacts with photos",
        }
    }

    /// The remote `last-exports` slot for this kind. Dialog and photo
    /// exports are always recomputed, so they have none.
    pub fn remote_slot<'a>(&self, files: &'a ExportFiles) -> Option<&'a str> {
        match self {
            Self::Contacts => files.contacts.as_deref(),
            Self::Chats => files.chats.as_deref(),
            Self::SavedMessages => files.saved_messages.as_deref(),
            Self::Dialog | Self::ContactPhotos => None,
        }
    }

    /// Whether the artifact cache applies to this kind at all.
    pub fn cacheable(&self) -> bool {
        !matches!(self, Self::Dialog | Self::ContactPhotos)
    }
}

/// Local memo of known artifact file names, keyed by (session, kind).
#[derive(Debug, Default)]
pub struct ExportCache {
    known: HashMap<(i64, ExportKind), String>,
}

impl ExportCache {
    pub fn lookup(&self, session_id: i64, kind: ExportKind) -> Option<&str> {
        self.known.get(&(session_id, kind)).map(String::as_str)
    }

    pub fn remember(&mut self, session_id: i64, kind: ExportKind, file_name: impl Into<String>) {
        self.known.insert((session_id, kind), file_name.into());
    }
}

/// A download affordance remembered per session after a successful export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRecord {
    pub label: String,
    pub session_id: i64,
    pub file_name: String,
}

/// How to present a downloaded artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFormat {
    /// Comma-delimited rows.
    Delimited,
    /// Structured JSON.
    Structured,
    /// Plain conversation transcript.
    Transcript,
}

/// Parsed artifact preview; exactly one representation per artifact.
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactPreview {
    Rows(Vec<Vec<String>>),
    Data(serde_json::Value),
    Transcript(Vec<TranscriptMessage>),
    /// Fallback when a structured artifact fails to parse.
    Raw(String),
}

/// One `[timestamp] sender: body` block of a transcript artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptMessage {
    pub timestamp: String,
    pub sender: String,
    pub body: String,
}

/// Decide the artifact format from its file name and served content type.
pub fn classify_artifact(file_name: &str, content_type: &str) -> ArtifactFormat {
    let name = file_name.to_ascii_lowercase();
    if name.ends_with(".csv") || content_type.contains("text/csv") {
        return ArtifactFormat::Delimited;
    }
    if name.ends_with(".json") || content_type.contains("application/json") {
        return ArtifactFormat::Structured;
    }

    match mime_guess::from_path(file_name).first() {
        Some(mime) if mime.subtype() == "csv" => ArtifactFormat::Delimited,
        Some(mime) if mime.subtype() == "json" => ArtifactFormat::Structured,
        _ => ArtifactFormat::Transcript,
    }
}

/// Build the preview model for a downloaded artifact.
pub fn preview_artifact(file_name: &str, file: &ArtifactFile) -> ArtifactPreview {
    match classify_artifact(file_name, &file.content_type) {
        ArtifactFormat::Delimited => ArtifactPreview::Rows(parse_delimited(&file.content)),
        ArtifactFormat::Structured => match serde_json::from_str(&file.content) {
            Ok(value) => ArtifactPreview::Data(value),
            Err(_) => ArtifactPreview::Raw(file.content.clone()),
        },
        ArtifactFormat::Transcript => ArtifactPreview::Transcript(parse_transcript(&file.content)),
    }
}

/// Naive delimited parse: rows split on newlines, cells on commas. Matches
/// what the backend writes; quoting/escaping is not in the format.
pub fn parse_delimited(text: &str) -> Vec<Vec<String>> {
    text.lines()
        .filter(|line| !line.is_empty())
        .map(|line| line.split(',').map(str::to_string).collect())
        .collect()
}

/// Parse transcript blocks of the form `[YYYY-MM-DD HH:MM:SS] Sender: text`,
/// separated by blank lines. Unrecognized blocks keep their full text as the
/// body.
pub fn parse_transcript(text: &str) -> Vec<TranscriptMessage> {
    use std::sync::OnceLock;
    static BLOCK: OnceLock<regex::Regex> = OnceLock::new();
    let block = BLOCK.get_or_init(|| {
        regex::Regex::new(r"(?s)^\[(.*?)\]\s*(.*?):\s*(.*)$").expect("static regex")
    });

    text.split("\n\n")
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| match block.captures(chunk) {
            Some(caps) => TranscriptMessage {
                timestamp: caps[1].to_string(),
                sender: caps[2].to_string(),
                body: caps[3].to_string(),
            },
            None => TranscriptMessage {
                timestamp: String::new(),
                sender: String::new(),
                body: chunk.to_string(),
            },
        })
        .collect()
}
