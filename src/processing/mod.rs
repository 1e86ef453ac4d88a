use std::sync::Arc;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicBool, Ordering};

use regex::Regex;
use thiserror::Error;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::crawlers::{CrawlerError, ProcurementCatalog, RetailStore};
use crate::domain::attribute::{AttributeMatch, SourceAttributes, TargetAttribute};
use crate::processing::disambiguate::{SubEntry, disambiguate, extract_sub_entries};
use crate::processing::embedding::{Embedder, embed_labels, nearest};
use crate::processing::linker::link_matches;
use crate::processing::reconcile::reconcile;

pub mod disambiguate;
pub mod embedding;
pub mod linker;
pub mod reconcile;

/// Errors of the matching core.
#[derive(Debug, Error)]
pub enum MatchError {
    /// The embedding model could not be loaded or invoked. Nothing that
    /// depends on it can proceed.
    #[error("embedding model unavailable: {0}")]
    EmbeddingUnavailable(String),
    /// A nearest-neighbor query was issued with nothing to rank against.
    #[error("no candidates to rank")]
    NoCandidates,
    /// No sub-entry could be chosen automatically; a human has to pick one.
    #[error("ambiguous category: {0}")]
    AmbiguousCategory(String),
}

/// Errors that terminate a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error(transparent)]
    Crawler(#[from] CrawlerError),
    #[error("retail attribute {0} is missing from the source set")]
    MissingAttribute(String),
}

/// Shared stop flag, set by the presentation layer and polled by the
/// session before each phase and between catalog rows.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The four pipeline phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    RetailSearch,
    RetailParse,
    CatalogSearch,
    CatalogParse,
}

/// Phase-specific payload of a successful outcome.
#[derive(Debug, Clone)]
pub enum PhasePayload {
    RetailUrl(String),
    RetailProduct {
        name: String,
        price: String,
        attributes: SourceAttributes,
    },
    CatalogEntry {
        url: String,
        name: String,
    },
    CatalogAttributes {
        records: Vec<TargetAttribute>,
        matches: Vec<AttributeMatch>,
    },
}

/// Everything the presentation layer needs to let a human pick the
/// sub-entry when automatic disambiguation declines.
#[derive(Debug, Clone)]
pub struct Disambiguation {
    pub category: String,
    pub entries: Vec<SubEntry>,
}

/// Terminal outcome of one phase.
#[derive(Debug, Clone)]
pub enum Outcome {
    Success(PhasePayload),
    Fail(Disambiguation),
    Stopped,
}

#[derive(Debug, Clone)]
pub struct PhaseReport {
    pub phase: Phase,
    pub outcome: Outcome,
}

/// How a session ended when it did not error out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Completed,
    Stopped,
}

static CYRILLIC_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new("[а-я ]+").unwrap());

/// Derives the procurement search query from a retail product name: the
/// first run of Cyrillic letters and spaces in the lowercased name, trimmed.
/// "Ноутбук HUAWEI MateBook D15" becomes "ноутбук".
pub fn procurement_query(product_name: &str) -> Option<String> {
    let lowered = product_name.to_lowercase();
    CYRILLIC_RUN_RE
        .find(&lowered)
        .map(|m| m.as_str().trim().to_string())
        .filter(|query| !query.is_empty())
}

/// Per-product matching session.
///
/// Owns the two site adapters and the embedder for the duration of one
/// lookup; constructed fresh per product and discarded afterwards. Each
/// phase pushes exactly one terminal [`PhaseReport`] into the event channel
/// (the disambiguation fallback adds a follow-up report once a human has
/// chosen). The selection channel carries the chosen sub-entry href back
/// from the presentation layer; a closed selection channel counts as a stop
/// request.
pub struct Session<R, P, E> {
    retail: R,
    catalog: P,
    embedder: E,
    events: UnboundedSender<PhaseReport>,
    selections: UnboundedReceiver<String>,
    cancel: CancelToken,
}

impl<R, P, E> Session<R, P, E>
where
    R: RetailStore,
    P: ProcurementCatalog,
    E: Embedder,
{
    pub fn new(
        retail: R,
        catalog: P,
        embedder: E,
        events: UnboundedSender<PhaseReport>,
        selections: UnboundedReceiver<String>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            retail,
            catalog,
            embedder,
            events,
            selections,
            cancel,
        }
    }

    fn send(&self, phase: Phase, outcome: Outcome) {
        if self.events.send(PhaseReport { phase, outcome }).is_err() {
            log::warn!("Phase report for {phase:?} dropped: receiver is gone");
        }
    }

    /// True when a stop was requested; reports the stopped outcome for the
    /// phase that was about to run.
    fn stop_requested(&self, phase: Phase) -> bool {
        if self.cancel.is_cancelled() {
            self.send(phase, Outcome::Stopped);
            true
        } else {
            false
        }
    }

    /// Runs the whole pipeline for one product name.
    pub async fn run(&mut self, product_name: &str) -> Result<SessionEnd, SessionError> {
        if self.stop_requested(Phase::RetailSearch) {
            return Ok(SessionEnd::Stopped);
        }
        log::info!("Searching the retail site for: {product_name}");
        let product_url = self.retail.search_product_url(product_name).await?;
        self.send(
            Phase::RetailSearch,
            Outcome::Success(PhasePayload::RetailUrl(product_url.clone())),
        );

        if self.stop_requested(Phase::RetailParse) {
            return Ok(SessionEnd::Stopped);
        }
        log::info!("Collecting characteristics from {product_url}");
        let product = self.retail.product_details(&product_url).await?;
        let source = product.attributes.clone();
        let query = procurement_query(&product.name).unwrap_or_else(|| product.name.to_lowercase());
        self.send(
            Phase::RetailParse,
            Outcome::Success(PhasePayload::RetailProduct {
                name: product.name,
                price: product.price,
                attributes: product.attributes,
            }),
        );

        let Some(entry_url) = self.catalog_search(&query, &source).await? else {
            return Ok(SessionEnd::Stopped);
        };

        if self.match_rows(&entry_url, &source).await? {
            Ok(SessionEnd::Completed)
        } else {
            Ok(SessionEnd::Stopped)
        }
    }

    /// Finds the specific catalog sub-entry for the product, resolving
    /// umbrella ambiguity automatically where possible and otherwise
    /// waiting for a human choice. `Ok(None)` means the session stopped.
    async fn catalog_search(
        &mut self,
        query: &str,
        source: &SourceAttributes,
    ) -> Result<Option<String>, SessionError> {
        if self.stop_requested(Phase::CatalogSearch) {
            return Ok(None);
        }
        log::info!("Searching the procurement catalog for: {query}");

        let raw_entries = self.catalog.search_entries(query).await?;
        let (category, entries) = extract_sub_entries(&raw_entries)
            .ok_or_else(|| CrawlerError::Parse("no keyed sub-entries found".to_string()))?;

        // Which retail attribute describes the distinguishing category?
        let labels: Vec<String> = source.labels().map(str::to_string).collect();
        let vectors = embed_labels(&mut self.embedder, &labels)?;
        let ranked = nearest(&mut self.embedder, &category, &vectors, 1)?;
        let resolving_label = ranked[0].0.clone();
        let category_value = source
            .get(&resolving_label)
            .ok_or_else(|| SessionError::MissingAttribute(resolving_label.clone()))?;

        match disambiguate(&category, category_value, &entries) {
            Ok(entry) => {
                log::debug!("{category} -> {resolving_label}: chose {}", entry.name);
                self.send(
                    Phase::CatalogSearch,
                    Outcome::Success(PhasePayload::CatalogEntry {
                        url: entry.href.clone(),
                        name: entry.name.clone(),
                    }),
                );
                Ok(Some(entry.href.clone()))
            }
            Err(MatchError::AmbiguousCategory(_)) => {
                self.send(
                    Phase::CatalogSearch,
                    Outcome::Fail(Disambiguation {
                        category,
                        entries: entries.clone(),
                    }),
                );
                match self.selections.recv().await {
                    Some(href) => {
                        if self.stop_requested(Phase::CatalogSearch) {
                            return Ok(None);
                        }
                        let name = entries
                            .iter()
                            .find(|entry| entry.href == href)
                            .map(|entry| entry.name.clone())
                            .unwrap_or_default();
                        self.send(
                            Phase::CatalogSearch,
                            Outcome::Success(PhasePayload::CatalogEntry {
                                url: href.clone(),
                                name,
                            }),
                        );
                        Ok(Some(href))
                    }
                    None => {
                        self.send(Phase::CatalogSearch, Outcome::Stopped);
                        Ok(None)
                    }
                }
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Parses the characteristic rows of the chosen entry and resolves each
    /// one against the retail attributes. Returns false when stopped.
    async fn match_rows(
        &mut self,
        entry_url: &str,
        source: &SourceAttributes,
    ) -> Result<bool, SessionError> {
        if self.stop_requested(Phase::CatalogParse) {
            return Ok(false);
        }
        log::info!("Matching characteristics at {entry_url}");

        let labels: Vec<String> = source.labels().map(str::to_string).collect();
        let vectors = embed_labels(&mut self.embedder, &labels)?;

        let rows = self.catalog.entry_rows(entry_url).await?;
        let mut records = Vec::with_capacity(rows.len());

        for row in rows {
            if self.stop_requested(Phase::CatalogParse) {
                return Ok(false);
            }

            let mut record = TargetAttribute::unresolved(row);

            // Unit suffixes after a comma are noise for the label query.
            let query = record.name.split(',').next().unwrap_or(&record.name);
            let ranked = nearest(&mut self.embedder, query, &vectors, 1)?;
            let (best_label, distance) = &ranked[0];

            if let Some(source_value) = source.get(best_label)
                && let Some(index) = reconcile(&record.values, source_value, source)
            {
                log::debug!("{} -> {best_label} \t {distance:.4}", record.name);
                record.default_value = record.values[index].clone();
                record.description = best_label.clone();
                // The decision stands even when the click does not land;
                // one bad row must not abort the session.
                if let Err(error) = self.catalog.activate(&record.refs[index]).await {
                    log::warn!(
                        "Failed to activate value {} for {}: {error}",
                        record.default_value,
                        record.name
                    );
                }
            }

            records.push(record);
        }

        let matches = link_matches(source, &records);
        self.send(
            Phase::CatalogParse,
            Outcome::Success(PhasePayload::CatalogAttributes { records, matches }),
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::{CancelToken, procurement_query};

    #[test]
    fn query_is_the_first_cyrillic_run_of_the_name() {
        assert_eq!(
            procurement_query("Ноутбук HUAWEI MateBook D15"),
            Some("ноутбук".to_string())
        );
    }

    #[test]
    fn leading_latin_words_are_skipped() {
        assert_eq!(
            procurement_query("HP картридж лазерный 305A"),
            Some("картридж лазерный".to_string())
        );
    }

    #[test]
    fn names_without_cyrillic_yield_nothing() {
        assert_eq!(procurement_query("ThinkPad X1 Carbon"), None);
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();

        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
