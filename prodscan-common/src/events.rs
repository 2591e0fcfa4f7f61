//! Pipeline event types
//!
//! One upload produces a stream of [`PipelineEvent`]s, written to the client as
//! newline-delimited JSON. A well-formed stream is exactly one `count`, then
//! `product`/`error` events in ascending index order, then exactly one `done`.

use serde::{Deserialize, Serialize};

/// Which catalog lookup tier produced a product entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionMethod {
    /// Exact barcode match
    Barcode,
    /// Free-text search on the resolved term
    Search,
    /// No tier matched
    #[serde(rename = "none")]
    Unresolved,
}

impl ResolutionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionMethod::Barcode => "barcode",
            ResolutionMethod::Search => "search",
            ResolutionMethod::Unresolved => "none",
        }
    }
}

/// Event emitted on the upload response stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PipelineEvent {
    /// Number of regions that will be reported
    Count { total: usize },

    /// Result for one region (possibly unresolved)
    Product {
        index: usize,
        /// Normalized search term; null when term generation failed
        term: Option<String>,
        title: String,
        image: Option<String>,
        link: Option<String>,
        method: ResolutionMethod,
    },

    /// Region could not be analyzed
    Error { index: usize, message: String },

    /// End of stream
    Done,
}

impl PipelineEvent {
    /// Get event type as string (the `kind` tag)
    pub fn event_type(&self) -> &'static str {
        match self {
            PipelineEvent::Count { .. } => "count",
            PipelineEvent::Product { .. } => "product",
            PipelineEvent::Error { .. } => "error",
            PipelineEvent::Done => "done",
        }
    }

    /// Region index for per-region events
    pub fn index(&self) -> Option<usize> {
        match self {
            PipelineEvent::Product { index, .. } | PipelineEvent::Error { index, .. } => {
                Some(*index)
            }
            PipelineEvent::Count { .. } | PipelineEvent::Done => None,
        }
    }

    /// Serialize as a single NDJSON line (trailing newline included)
    pub fn to_ndjson_line(&self) -> crate::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}
