use std::sync::Arc;

use async_trait::async_trait;
use scraper::{Html, Selector};
use tokio::sync::Semaphore;
use url::Url;

use crate::crawlers::{CrawlerError, CrawlerResult, RetailStore, build_reqwest_client};
use crate::domain::attribute::SourceAttributes;
use crate::domain::product::RetailProduct;

/// Crawler for `citilink.ru` which limits concurrent HTTP requests
/// using a [`Semaphore`].
pub struct CitilinkStore {
    base_url: Url,
    client: reqwest::Client,
    semaphore: Arc<Semaphore>,
}

impl CitilinkStore {
    /// Creates a new crawler with the given concurrency limit.
    pub fn new(base_url: &str, concurrency: usize) -> CrawlerResult<Self> {
        Ok(Self {
            base_url: Url::parse(base_url).map_err(|e| CrawlerError::Build(e.to_string()))?,
            client: build_reqwest_client()?,
            semaphore: Arc::new(Semaphore::new(concurrency)),
        })
    }

    /// Fetches a URL as text, holding a [`Semaphore`] permit for the
    /// duration of the request.
    async fn fetch_text(&self, url: &str) -> CrawlerResult<String> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| CrawlerError::Build(e.to_string()))?;
        let res = self.client.get(url).send().await?;
        if !res.status().is_success() {
            return Err(CrawlerError::Parse(format!(
                "{url} returned {}",
                res.status()
            )));
        }
        Ok(res.text().await?)
    }
}

fn element_text(element: &scraper::ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// First product snippet link on a search results page.
fn parse_search_results(document: &Html, base_url: &Url) -> CrawlerResult<String> {
    let selector = Selector::parse(r#"div[data-meta-name="SnippetProductVerticalLayout"] a"#)
        .unwrap();
    let link = document
        .select(&selector)
        .next()
        .ok_or_else(|| CrawlerError::Parse("no product snippet in search results".to_string()))?;
    let href = link
        .value()
        .attr("href")
        .ok_or_else(|| CrawlerError::Parse("product snippet without href".to_string()))?;
    base_url
        .join(href)
        .map(|url| url.to_string())
        .map_err(|e| CrawlerError::Parse(e.to_string()))
}

/// Name, price and the full specification list of a product page.
///
/// Specification rows live in `ul`/`li` blocks: the attribute name sits in
/// a nested `div`, the value in a `span` under the same item; names and
/// values are collected in page order and zipped.
fn parse_product_page(document: &Html) -> CrawlerResult<RetailProduct> {
    let name_selector = Selector::parse("h1").unwrap();
    let name = document
        .select(&name_selector)
        .next()
        .map(|el| element_text(&el))
        .ok_or_else(|| CrawlerError::Parse("product page without a name".to_string()))?;

    let price_selector =
        Selector::parse(r#"div[data-meta-name="PriceBlock__price"]"#).unwrap();
    let price = document
        .select(&price_selector)
        .next()
        .map(|el| element_text(&el))
        .unwrap_or_default();

    let item_selector = Selector::parse("ul > li").unwrap();
    let label_selector = Selector::parse("div > div").unwrap();
    let value_selector = Selector::parse("div > span").unwrap();

    let mut labels = Vec::new();
    let mut values = Vec::new();
    for item in document.select(&item_selector) {
        for div in item.select(&label_selector) {
            let text = element_text(&div);
            if !text.is_empty() {
                labels.push(text);
            }
        }
        for span in item.select(&value_selector) {
            let text = element_text(&span);
            if !text.is_empty() {
                values.push(text);
            }
        }
    }

    let attributes: SourceAttributes = labels.into_iter().zip(values).collect();

    Ok(RetailProduct {
        name,
        price,
        attributes,
    })
}

#[async_trait]
impl RetailStore for CitilinkStore {
    async fn search_product_url(&self, query: &str) -> CrawlerResult<String> {
        let mut search_url = self
            .base_url
            .join("search/")
            .map_err(|e| CrawlerError::Parse(e.to_string()))?;
        search_url.query_pairs_mut().append_pair("text", query);

        let text = self.fetch_text(search_url.as_str()).await?;
        parse_search_results(&Html::parse_document(&text), &self.base_url)
    }

    async fn product_details(&self, url: &str) -> CrawlerResult<RetailProduct> {
        let text = self.fetch_text(url).await?;
        parse_product_page(&Html::parse_document(&text))
    }
}
