//! Catalog resolution
//!
//! Tiers run in a fixed order and the first match wins:
//! 1. **ExactCode** - barcode lookups, in detection order
//! 2. **TermSearch** - free-text search on the resolved term
//!
//! Lookup failures are logged and count as "no match" for that tier.

use crate::types::{CatalogEntry, CatalogRecord, CatalogService};
use prodscan_common::ResolutionMethod;
use std::sync::Arc;
use tracing::{debug, warn};

/// One step of the fallback chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogTier {
    ExactCode,
    TermSearch,
}

impl CatalogTier {
    /// Evaluation order
    pub const ORDER: [CatalogTier; 2] = [CatalogTier::ExactCode, CatalogTier::TermSearch];

    pub fn method(self) -> ResolutionMethod {
        match self {
            CatalogTier::ExactCode => ResolutionMethod::Barcode,
            CatalogTier::TermSearch => ResolutionMethod::Search,
        }
    }
}

/// Result of running a single tier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TierOutcome {
    Matched(CatalogRecord),
    NoMatch,
}

/// Resolves a region to a catalog entry
pub struct CatalogResolver {
    catalog: Arc<dyn CatalogService>,
}

impl CatalogResolver {
    pub fn new(catalog: Arc<dyn CatalogService>) -> Self {
        Self { catalog }
    }

    /// Walk the tiers until one matches; unresolved is a normal outcome
    pub async fn resolve(&self, barcodes: &[String], term: &str) -> CatalogEntry {
        for tier in CatalogTier::ORDER {
            if let TierOutcome::Matched(record) = self.run_tier(tier, barcodes, term).await {
                debug!(method = tier.method().as_str(), "Catalog match");
                return CatalogEntry::from_record(record, tier.method());
            }
        }

        debug!(term = %term, "No catalog match");
        CatalogEntry::unresolved()
    }

    pub async fn run_tier(&self, tier: CatalogTier, barcodes: &[String], term: &str) -> TierOutcome {
        match tier {
            CatalogTier::ExactCode => self.match_code(barcodes).await,
            CatalogTier::TermSearch => self.search_term(term).await,
        }
    }

    async fn match_code(&self, barcodes: &[String]) -> TierOutcome {
        for code in barcodes.iter().map(|c| c.trim()).filter(|c| !c.is_empty()) {
            match self.catalog.get_by_code(code).await {
                Ok(Some(record)) => return TierOutcome::Matched(record),
                Ok(None) => debug!(code = %code, "Barcode not in catalog"),
                Err(e) => warn!(
                    code = %code,
                    error = %e,
                    "Catalog code lookup failed, treating as no match"
                ),
            }
        }
        TierOutcome::NoMatch
    }

    async fn search_term(&self, term: &str) -> TierOutcome {
        let term = term.trim();
        if term.is_empty() {
            return TierOutcome::NoMatch;
        }

        match self.catalog.search_by_term(term).await {
            Ok(records) => records
                .into_iter()
                .next()
                .map_or(TierOutcome::NoMatch, TierOutcome::Matched),
            Err(e) => {
                warn!(term = %term, error = %e, "Catalog search failed, treating as no match");
                TierOutcome::NoMatch
            }
        }
    }
}
