use std::sync::Arc;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use tokio::sync::Semaphore;
use url::Url;

use crate::crawlers::{
    CrawlerError, CrawlerResult, ProcurementCatalog, build_reqwest_client,
};
use crate::domain::attribute::{CatalogRow, ValueHandle};

/// Crawler for the `moy-zakupki.ru` procurement catalog.
pub struct ZakupkiCatalog {
    base_url: Url,
    client: reqwest::Client,
    semaphore: Arc<Semaphore>,
}

impl ZakupkiCatalog {
    /// Creates a new crawler with the given concurrency limit.
    pub fn new(base_url: &str, concurrency: usize) -> CrawlerResult<Self> {
        Ok(Self {
            base_url: Url::parse(base_url).map_err(|e| CrawlerError::Build(e.to_string()))?,
            client: build_reqwest_client()?,
            semaphore: Arc::new(Semaphore::new(concurrency)),
        })
    }

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

fn absolute(base_url: &Url, href: &str) -> CrawlerResult<String> {
    base_url
        .join(href)
        .map(|url| url.to_string())
        .map_err(|e| CrawlerError::Parse(e.to_string()))
}

/// Link to the umbrella entry on a search results page: the first anchor
/// inside the result block marked with the `sm:flex justify-between` header.
fn parse_umbrella_link(document: &Html, base_url: &Url) -> CrawlerResult<String> {
    let marker = Selector::parse(r#"div[class="sm:flex justify-between"]"#).unwrap();
    let anchor = Selector::parse("a").unwrap();

    for header in document.select(&marker) {
        let Some(block) = header.parent().and_then(ElementRef::wrap) else {
            continue;
        };
        if let Some(link) = block.select(&anchor).next()
            && let Some(href) = link.value().attr("href")
        {
            return absolute(base_url, href);
        }
    }
    Err(CrawlerError::Parse(
        "no umbrella entry in search results".to_string(),
    ))
}

/// Sub-entry anchors of the KTRU refinement list.
///
/// The list nests levels by inline indent style; the last item's style marks
/// the deepest level, and every item at that level is a specific sub-entry.
/// The first of them is the umbrella itself and is skipped.
fn parse_sub_entries(document: &Html, base_url: &Url) -> CrawlerResult<Vec<(String, String)>> {
    let item = Selector::parse(r#"li[class="hover:text-sky-500 mb-2"]"#).unwrap();
    let anchor = Selector::parse("a").unwrap();

    let deepest = document
        .select(&item)
        .last()
        .ok_or_else(|| CrawlerError::Parse("no KTRU refinement list".to_string()))?;
    let margin = deepest
        .value()
        .attr("style")
        .unwrap_or("")
        .trim_end_matches(';')
        .to_string();

    let any_item = Selector::parse("li").unwrap();
    let mut entries = Vec::new();
    for li in document.select(&any_item) {
        let style = li.value().attr("style").unwrap_or("").trim_end_matches(';');
        if style != margin {
            continue;
        }
        if let Some(link) = li.select(&anchor).next()
            && let Some(href) = link.value().attr("href")
        {
            let name = link.text().collect::<String>().trim().to_string();
            entries.push((absolute(base_url, href)?, name));
        }
    }

    Ok(entries.into_iter().skip(1).collect())
}

/// Characteristic rows: table rows with exactly two cells, the name in the
/// first, the selectable value spans in the second. Values are lowercased
/// at parse time; each value's handle carries the span's action ref.
fn parse_entry_rows(document: &Html) -> Vec<CatalogRow> {
    let row_selector = Selector::parse("tr").unwrap();
    let span_selector = Selector::parse("span").unwrap();

    let mut rows = Vec::new();
    for tr in document.select(&row_selector) {
        let cells: Vec<ElementRef> = tr.children().filter_map(ElementRef::wrap).collect();
        if cells.len() != 2 || cells.iter().any(|cell| cell.value().name() != "td") {
            continue;
        }

        let name = cells[0].text().collect::<String>().trim().to_string();

        let mut values = Vec::new();
        let mut handles = Vec::new();
        for span in cells[1].select(&span_selector) {
            let value = span.text().collect::<String>().trim().to_lowercase();
            if value.is_empty() {
                continue;
            }
            let token = span.value().attr("data-action").unwrap_or("").to_string();
            values.push(value);
            handles.push(ValueHandle {
                row: rows.len(),
                token,
            });
        }

        if name.is_empty() || values.is_empty() {
            continue;
        }
        rows.push(CatalogRow {
            name,
            values,
            handles,
        });
    }
    rows
}

#[async_trait]
impl ProcurementCatalog for ZakupkiCatalog {
    async fn search_entries(&self, query: &str) -> CrawlerResult<Vec<(String, String)>> {
        let mut search_url = self.base_url.clone();
        search_url.query_pairs_mut().append_pair("search", query);

        let text = self.fetch_text(search_url.as_str()).await?;
        let umbrella_url = parse_umbrella_link(&Html::parse_document(&text), &self.base_url)?;

        let text = self.fetch_text(&umbrella_url).await?;
        parse_sub_entries(&Html::parse_document(&text), &self.base_url)
    }

    async fn entry_rows(&self, url: &str) -> CrawlerResult<Vec<CatalogRow>> {
        let text = self.fetch_text(url).await?;
        Ok(parse_entry_rows(&Html::parse_document(&text)))
    }

    async fn activate(&self, handle: &ValueHandle) -> CrawlerResult<()> {
        if handle.token.is_empty() {
            return Err(CrawlerError::Activation(format!(
                "value in row {} has no action ref",
                handle.row
            )));
        }
        let url = self
            .base_url
            .join(&handle.token)
            .map_err(|e| CrawlerError::Activation(e.to_string()))?;
        let res = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| CrawlerError::Activation(e.to_string()))?;
        if !res.status().is_success() {
            return Err(CrawlerError::Activation(format!(
                "{url} returned {}",
                res.status()
            )));
        }
        Ok(())
    }
}
