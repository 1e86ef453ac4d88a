//! Shared fakes for integration tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use zakupki_matcher::crawlers::{CrawlerError, CrawlerResult, ProcurementCatalog, RetailStore};
use zakupki_matcher::domain::attribute::{CatalogRow, SourceAttributes, ValueHandle};
use zakupki_matcher::domain::product::RetailProduct;
use zakupki_matcher::processing::embedding::Embedder;
use zakupki_matcher::processing::{CancelToken, MatchError};

/// Embeds known strings into one-hot vectors by synonym group; strings
/// outside every group share a distant extra axis, so ranking is fully
/// deterministic.
pub struct StubEmbedder {
    groups: Vec<Vec<String>>,
    pub fail: bool,
}

impl StubEmbedder {
    pub fn new(groups: &[&[&str]]) -> Self {
        Self {
            groups: groups
                .iter()
                .map(|group| group.iter().map(|s| s.to_string()).collect())
                .collect(),
            fail: false,
        }
    }
}

impl Embedder for StubEmbedder {
    fn embed(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>, MatchError> {
        if self.fail {
            return Err(MatchError::EmbeddingUnavailable("stub failure".to_string()));
        }
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0_f32; self.groups.len() + 1];
                match self
                    .groups
                    .iter()
                    .position(|group| group.iter().any(|s| s == text))
                {
                    Some(axis) => vector[axis] = 1.0,
                    None => vector[self.groups.len()] = 1.0,
                }
                vector
            })
            .collect())
    }
}

pub struct FakeRetail {
    pub url: String,
    pub product: RetailProduct,
}

#[async_trait]
impl RetailStore for FakeRetail {
    async fn search_product_url(&self, _query: &str) -> CrawlerResult<String> {
        Ok(self.url.clone())
    }

    async fn product_details(&self, _url: &str) -> CrawlerResult<RetailProduct> {
        Ok(self.product.clone())
    }
}

pub struct FakeCatalog {
    pub entries: Vec<(String, String)>,
    pub rows: Vec<CatalogRow>,
    pub fail_activation: bool,
    /// When set, the first activation requests a stop, simulating the user
    /// pressing the stop button mid-phase.
    pub cancel_on_activate: Option<CancelToken>,
    pub activated: Arc<Mutex<Vec<ValueHandle>>>,
}

impl FakeCatalog {
    pub fn new(entries: Vec<(String, String)>, rows: Vec<CatalogRow>) -> Self {
        Self {
            entries,
            rows,
            fail_activation: false,
            cancel_on_activate: None,
            activated: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl ProcurementCatalog for FakeCatalog {
    async fn search_entries(&self, _query: &str) -> CrawlerResult<Vec<(String, String)>> {
        Ok(self.entries.clone())
    }

    async fn entry_rows(&self, _url: &str) -> CrawlerResult<Vec<CatalogRow>> {
        Ok(self.rows.clone())
    }

    async fn activate(&self, handle: &ValueHandle) -> CrawlerResult<()> {
        if let Some(token) = &self.cancel_on_activate {
            token.cancel();
        }
        if self.fail_activation {
            return Err(CrawlerError::Activation(
                "stub activation failure".to_string(),
            ));
        }
        self.activated
            .lock()
            .expect("activated mutex poisoned")
            .push(handle.clone());
        Ok(())
    }
}

pub fn source_attributes(pairs: &[(&str, &str)]) -> SourceAttributes {
    pairs
        .iter()
        .map(|(label, value)| (label.to_string(), value.to_string()))
        .collect()
}

pub fn retail_product(name: &str, price: &str, pairs: &[(&str, &str)]) -> RetailProduct {
    RetailProduct {
        name: name.to_string(),
        price: price.to_string(),
        attributes: source_attributes(pairs),
    }
}

pub fn catalog_row(row: usize, name: &str, values: &[(&str, &str)]) -> CatalogRow {
    CatalogRow {
        name: name.to_string(),
        values: values.iter().map(|(value, _)| value.to_string()).collect(),
        handles: values
            .iter()
            .map(|(_, token)| ValueHandle {
                row,
                token: token.to_string(),
            })
            .collect(),
    }
}
