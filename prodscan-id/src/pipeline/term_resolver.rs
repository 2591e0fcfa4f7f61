//! Search term resolution
//!
//! The naming rules (OCR text first, brand only when a logo confirms it,
//! singular and without variants, translated to the target language, no
//! fabrication) are delivered to the term oracle as one instruction. This
//! module builds that instruction deterministically from the signal bundle
//! and normalizes whatever line comes back.

use crate::types::{OracleError, SignalBundle, TermOracle, TermRequest};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Term resolution errors
#[derive(Debug, Error)]
pub enum TermError {
    #[error("Failed to encode signal bundle: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Term generation failed: {0}")]
    Oracle(#[from] OracleError),

    #[error("Term generation returned an empty term")]
    Empty,
}

/// Label prefixes the oracle sometimes puts in front of the answer
const ANSWER_LABELS: [&str; 5] = ["term", "search term", "answer", "término", "respuesta"];

/// Opening/closing pairs stripped from around the answer
const WRAPPERS: [(char, char); 6] = [
    ('"', '"'),
    ('\'', '\''),
    ('`', '`'),
    ('“', '”'),
    ('‘', '’'),
    ('«', '»'),
];

const TRAILING_PUNCTUATION: [char; 5] = ['.', ',', ';', ':', '!'];

/// Builds term requests and normalizes replies
pub struct TermResolver {
    oracle: Arc<dyn TermOracle>,
    target_language: String,
}

impl TermResolver {
    pub fn new(oracle: Arc<dyn TermOracle>, target_language: impl Into<String>) -> Self {
        Self {
            oracle,
            target_language: target_language.into(),
        }
    }

    /// Build the oracle request for `bundle`
    ///
    /// Same bundle and language always give a byte-identical request.
    pub fn build_request(&self, bundle: &SignalBundle) -> Result<TermRequest, TermError> {
        let signals = serde_json::to_string_pretty(bundle)?;
        let language = &self.target_language;

        let system = format!(
            "You generate search terms for a packaged-food product catalog. \
             Answer in {language} and use only real brand names."
        );

        let prompt = format!(
            "You receive JSON with visual annotations of one product package. \
Return ONLY the shortest useful search term for finding this product in the catalog.

RULES:
1. Use the OCR text (`text`) as the PRIMARY source for the product name.
   - If there are several lines, pick the most descriptive line in {language} that says what the product is.
   - Skip marketing phrases, ingredient lists and instructions.
2. Include the brand only if it appears in `logos`.
3. The result must be SINGULAR, with no flavors, variants or quantities.
4. If the product name is in another language, TRANSLATE it to {language}.
5. Use `webEntities` and `labels` only to CONFIRM the OCR reading, NEVER as a replacement.
6. Do not invent data. If something is unclear, leave that part out.
7. Return ONLY the clean term, without quotes or explanations.

EXAMPLES:
- \"Barritas Íntegra de Proteína con Arándanos y Semillas\" -> Barrita Íntegra
- \"Font Vella Agua Mineral Natural\" (with logo Font Vella) -> Font Vella Agua Mineral
- \"Nestlé Chocolate KitKat 4 barras\" (with logo KitKat) -> KitKat

Now process this JSON and return ONLY the line with the final term:

```json
{signals}
```"
        );

        Ok(TermRequest { system, prompt })
    }

    /// Resolve `bundle` to a normalized, non-empty search term
    pub async fn resolve(&self, bundle: &SignalBundle) -> Result<String, TermError> {
        let request = self.build_request(bundle)?;
        let reply = self.oracle.generate(&request).await?;

        let term = normalize_term(&reply).ok_or(TermError::Empty)?;
        debug!(reply = %reply.trim(), term = %term, "Search term resolved");
        Ok(term)
    }
}

/// Reduce an oracle reply to a bare term
///
/// Takes the first non-empty line outside any code fence, drops an answer
/// label, wrapping quotes and trailing punctuation, and collapses whitespace.
/// Returns `None` when nothing is left.
pub fn normalize_term(reply: &str) -> Option<String> {
    let line = reply
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with("```"))?;

    let mut term = strip_answer_label(line);
    loop {
        let before = term;
        term = term.trim().trim_end_matches(TRAILING_PUNCTUATION);
        for (open, close) in WRAPPERS {
            if let Some(inner) = term
                .strip_prefix(open)
                .and_then(|rest| rest.strip_suffix(close))
            {
                term = inner;
            }
        }
        if term == before {
            break;
        }
    }

    let term = term.split_whitespace().collect::<Vec<_>>().join(" ");
    if term.is_empty() {
        None
    } else {
        Some(term)
    }
}

fn strip_answer_label(line: &str) -> &str {
    if let Some((label, rest)) = line.split_once(':') {
        let label = label.trim().to_lowercase();
        if ANSWER_LABELS.contains(&label.as_str()) {
            return rest;
        }
    }
    line
}
