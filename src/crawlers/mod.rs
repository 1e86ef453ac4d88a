use async_trait::async_trait;
use thiserror::Error;

use crate::domain::attribute::{CatalogRow, ValueHandle};
use crate::domain::product::RetailProduct;

pub mod citilink;
pub mod zakupki;

/// Desktop user agent; both sites serve full markup to it.
pub(crate) const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 11.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

#[derive(Debug, Error)]
pub enum CrawlerError {
    #[error("failed to build crawler: {0}")]
    Build(String),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to parse page: {0}")]
    Parse(String),
    #[error("failed to activate value: {0}")]
    Activation(String),
}

pub type CrawlerResult<T> = Result<T, CrawlerError>;

pub(crate) fn build_reqwest_client() -> CrawlerResult<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .map_err(CrawlerError::from)
}

/// Retail-site collaborator: product lookup and specification parsing.
#[async_trait]
pub trait RetailStore: Send + Sync {
    /// URL of the first product matching `query` in site search.
    async fn search_product_url(&self, query: &str) -> CrawlerResult<String>;

    /// Name, price and the specification list of a product page.
    async fn product_details(&self, url: &str) -> CrawlerResult<RetailProduct>;
}

/// Procurement-site collaborator: catalog lookup, characteristic rows and
/// value activation.
#[async_trait]
pub trait ProcurementCatalog: Send + Sync {
    /// Raw `(href, display name)` sub-entry pairs found under the umbrella
    /// entry matching `query`.
    async fn search_entries(&self, query: &str) -> CrawlerResult<Vec<(String, String)>>;

    /// Characteristic table rows of a specific catalog entry.
    async fn entry_rows(&self, url: &str) -> CrawlerResult<Vec<CatalogRow>>;

    /// Click-equivalent on a value ref. Failures are reported to the caller,
    /// never fatal to the session.
    async fn activate(&self, handle: &ValueHandle) -> CrawlerResult<()>;
}
