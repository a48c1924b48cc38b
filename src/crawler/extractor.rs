//! Record extraction
//!
//! Extraction rules are CSS selectors from the `[extract]` config section.
//! Each element matching the item selector yields at most one record: its
//! identifier is the first non-empty value among the id selectors, its
//! description the first non-empty value among the description selectors.
//! A value is read from the `content` attribute, then `value`, then the
//! element's trimmed text.

use crate::config::ExtractStageConfig;
use crate::crawler::fetch_worker::FetchedDocument;
use crate::crawler::stage::StageWorker;
use crate::ConfigError;
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

/// A structured unit of information taken from a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedRecord {
    /// Unique identifier; never empty once a record leaves extraction
    pub identifier: String,

    pub description: Option<String>,

    /// URL of the page the record came from
    pub source_url: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("document body is empty")]
    EmptyDocument,

    #[error("document has no markup: {0}")]
    Malformed(String),
}

/// Turns a fetched document into records
pub trait Extractor: Send + Sync {
    fn extract(&self, document: &FetchedDocument) -> Result<Vec<ExtractedRecord>, ExtractionError>;
}

/// `Extractor` driven by CSS selectors
#[derive(Debug)]
pub struct SelectorExtractor {
    item: Selector,
    ids: Vec<Selector>,
    descriptions: Vec<Selector>,
}

impl SelectorExtractor {
    pub fn new(config: &ExtractStageConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            item: compile(&config.item_selector)?,
            ids: config
                .id_selectors
                .iter()
                .map(|s| compile(s))
                .collect::<Result<_, _>>()?,
            descriptions: config
                .description_selectors
                .iter()
                .map(|s| compile(s))
                .collect::<Result<_, _>>()?,
        })
    }

    fn record_from(&self, item: ElementRef<'_>, source_url: &str) -> ExtractedRecord {
        ExtractedRecord {
            identifier: first_value(item, &self.ids).unwrap_or_default(),
            description: first_value(item, &self.descriptions),
            source_url: source_url.to_string(),
        }
    }
}

fn compile(css: &str) -> Result<Selector, ConfigError> {
    Selector::parse(css).map_err(|e| ConfigError::InvalidSelector(format!("'{}': {:?}", css, e)))
}

/// First non-empty value found by any of `selectors`, in selector order
fn first_value(item: ElementRef<'_>, selectors: &[Selector]) -> Option<String> {
    selectors
        .iter()
        .flat_map(|selector| item.select(selector))
        .find_map(element_value)
}

fn element_value(element: ElementRef<'_>) -> Option<String> {
    let attrs = element.value();
    let raw = attrs
        .attr("content")
        .or_else(|| attrs.attr("value"))
        .map(str::to_string)
        .unwrap_or_else(|| element.text().collect::<String>());

    let value = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    (!value.is_empty()).then_some(value)
}

impl Extractor for SelectorExtractor {
    fn extract(&self, document: &FetchedDocument) -> Result<Vec<ExtractedRecord>, ExtractionError> {
        let body = document.body.trim();
        if body.is_empty() {
            return Err(ExtractionError::EmptyDocument);
        }
        if !body.contains('<') {
            return Err(ExtractionError::Malformed(format!(
                "{} bytes of plain text",
                body.len()
            )));
        }

        let html = Html::parse_document(body);
        let source_url = document.url.as_str();
        Ok(html
            .select(&self.item)
            .map(|item| self.record_from(item, source_url))
            .collect())
    }
}

/// Extraction stage worker
pub struct ExtractWorker {
    extractor: Arc<dyn Extractor>,
}

impl ExtractWorker {
    pub fn new(extractor: Arc<dyn Extractor>) -> Self {
        Self { extractor }
    }
}

#[async_trait]
impl StageWorker for ExtractWorker {
    type Input = FetchedDocument;
    type Output = ExtractedRecord;

    async fn process(&self, document: FetchedDocument) -> Vec<ExtractedRecord> {
        let records = match self.extractor.extract(&document) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(url = %document.url, error = %e, "Extraction failed");
                return Vec::new();
            }
        };

        let mut seen = HashSet::new();
        let mut kept = Vec::with_capacity(records.len());
        for mut record in records {
            record.identifier = record.identifier.trim().to_string();
            if record.identifier.is_empty() {
                tracing::warn!(url = %document.url, "Dropping record without identifier");
                continue;
            }
            if seen.insert(record.identifier.clone()) {
                kept.push(record);
            }
        }

        tracing::debug!(url = %document.url, records = kept.len(), "Extracted records");
        kept
    }
}
