//! Listing endpoint crawler with offset pagination
//!
//! This module retrieves summary records page by page. Collection is
//! fail-soft: a page that cannot be retrieved ends the walk, and whatever
//! was accumulated before it is still returned together with the fault.

use reqwest::Client;
use serde_json::Value;
use std::collections::HashSet;
use url::Url;

use crate::metrics;
use crate::models::{ListingRecord, RecordSchema};
use crate::utils::error::PaginationFault;

/// Raw objects gathered from a listing endpoint
#[derive(Debug, Clone, Default)]
pub struct ObjectCollection {
    pub objects: Vec<Value>,

    /// Number of page requests issued
    pub pages_requested: usize,

    /// Set when a page failed and collection stopped early
    pub fault: Option<PaginationFault>,
}

/// Summary records gathered from a listing endpoint
#[derive(Debug, Clone, Default)]
pub struct PageCollection {
    pub records: Vec<ListingRecord>,

    /// Number of page requests issued
    pub pages_requested: usize,

    /// Listing objects without an id or a detail reference
    pub skipped: usize,

    /// Repeated ids dropped after their first occurrence
    pub duplicates: usize,

    /// Set when a page failed and collection stopped early
    pub fault: Option<PaginationFault>,
}

impl PageCollection {
    pub fn is_partial(&self) -> bool {
        self.fault.is_some()
    }
}

/// Sequential paginated reader for one listing endpoint
pub struct PageCollector {
    client: Client,
    schema: RecordSchema,
}

impl PageCollector {
    /// Create a collector using an already configured client
    #[must_use]
    pub fn new(client: Client, schema: RecordSchema) -> Self {
        Self { client, schema }
    }

    /// Collect summary records from `endpoint`
    ///
    /// Issues `GET endpoint?offset=N&limit=page_size` with `N` starting at
    /// zero and growing by `page_size`, until a page holds fewer than
    /// `page_size` items. Objects missing the id or the reference field are
    /// skipped; repeated ids keep their first occurrence.
    pub async fn collect(&self, endpoint: &Url, page_size: usize) -> PageCollection {
        let raw = self.collect_objects(endpoint, page_size).await;

        let mut seen = HashSet::new();
        let mut records = Vec::with_capacity(raw.objects.len());
        let mut skipped = 0;
        let mut duplicates = 0;

        for object in &raw.objects {
            match ListingRecord::from_value(object, &self.schema) {
                Some(record) => {
                    if seen.insert(record.id.clone()) {
                        records.push(record);
                    } else {
                        duplicates += 1;
                    }
                }
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            tracing::warn!(
                endpoint = %endpoint,
                skipped,
                id_field = %self.schema.id_field,
                reference_field = %self.schema.reference_field,
                "Listing objects without id or detail reference were skipped"
            );
        }
        if duplicates > 0 {
            tracing::warn!(endpoint = %endpoint, duplicates, "Duplicate listing ids dropped");
        }

        PageCollection {
            records,
            pages_requested: raw.pages_requested,
            skipped,
            duplicates,
            fault: raw.fault,
        }
    }

    /// Collect the raw listing objects from `endpoint`
    pub async fn collect_objects(&self, endpoint: &Url, page_size: usize) -> ObjectCollection {
        let page_size = page_size.max(1);
        let mut collection = ObjectCollection::default();
        let mut offset = 0;

        loop {
            collection.pages_requested += 1;
            metrics::record_page_requested();

            let page = match self.fetch_page(endpoint, offset, page_size).await {
                Ok(page) => page,
                Err(fault) => {
                    tracing::warn!(
                        endpoint = %endpoint,
                        offset,
                        collected = collection.objects.len(),
                        error = %fault,
                        "Listing page failed, returning partial summary"
                    );
                    metrics::record_pagination_fault();
                    collection.fault = Some(fault);
                    break;
                }
            };

            let count = page.len();
            collection.objects.extend(page);

            tracing::debug!(
                endpoint = %endpoint,
                offset,
                count,
                total = collection.objects.len(),
                "Processed listing page"
            );

            if count < page_size {
                break;
            }
            offset += page_size;
        }

        tracing::info!(
            endpoint = %endpoint,
            total = collection.objects.len(),
            pages = collection.pages_requested,
            partial = collection.fault.is_some(),
            "Completed listing collection"
        );

        collection
    }

    /// Fetch a single listing page
    async fn fetch_page(
        &self,
        endpoint: &Url,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Value>, PaginationFault> {
        let response = self
            .client
            .get(endpoint.clone())
            .query(&[("offset", offset), ("limit", limit)])
            .send()
            .await
            .map_err(|e| PaginationFault::Transport {
                offset,
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PaginationFault::Status {
                offset,
                status: status.as_u16(),
            });
        }

        let body: Value = response.json().await.map_err(|e| PaginationFault::Decode {
            offset,
            message: e.to_string(),
        })?;

        Ok(extract_page(body))
    }
}

/// Keys that may hold the page array in a listing response
const PAGE_KEYS: &[&str] = &["objects", "results"];

/// Pull the page items out of a listing response body
///
/// Accepts a top-level array, or an object whose first non-empty `objects` /
/// `results` array is the page. Anything else is an empty page.
pub fn extract_page(body: Value) -> Vec<Value> {
    match body {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            for key in PAGE_KEYS {
                if let Some(Value::Array(items)) = map.remove(*key) {
                    if !items.is_empty() {
                        return items;
                    }
                }
            }
            Vec::new()
        }
        _ => Vec::new(),
    }
}
