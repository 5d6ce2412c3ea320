//! Common test utilities

#![allow(dead_code)]

use gather::config::Config;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const LISTING_PATH: &str = "/v1/pedido";

/// Listing object as returned by the order listing endpoint
pub fn listing_object(id: u64) -> Value {
    json!({
        "numero": id,
        "resource_uri": format!("{LISTING_PATH}/{id}"),
        "situacao": {"codigo": "pedido_pago"},
    })
}

/// Detail object as returned by the order detail endpoint
pub fn detail_object(id: u64) -> Value {
    json!({
        "numero": id,
        "valor_total": format!("{id}.00"),
        "itens": [{"sku": format!("SKU-{id}"), "quantidade": 1}],
    })
}

/// Mount one mock per listing page; each page must be requested exactly once
pub async fn mount_listing(server: &MockServer, ids: &[u64], page_size: usize) {
    let mut pages: Vec<Vec<Value>> = ids
        .chunks(page_size)
        .map(|chunk| chunk.iter().copied().map(listing_object).collect())
        .collect();

    // A full last page makes the collector ask for one more
    if ids.len() % page_size == 0 {
        pages.push(Vec::new());
    }

    for (i, objects) in pages.into_iter().enumerate() {
        let offset = i * page_size;
        Mock::given(method("GET"))
            .and(path(LISTING_PATH))
            .and(query_param("offset", offset.to_string()))
            .and(query_param("limit", page_size.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "meta": {"limit": page_size, "offset": offset, "total_count": ids.len()},
                "objects": objects,
            })))
            .expect(1)
            .mount(server)
            .await;
    }
}

/// Id at the end of a detail request path
pub fn id_of_request(request: &Request) -> String {
    request
        .url
        .path()
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Detail responder that fails each id until its n-th request
///
/// Ids absent from the map always fail with 503.
pub struct FlakyDetails {
    succeed_on: HashMap<String, u32>,
    calls: Mutex<HashMap<String, u32>>,
}

impl FlakyDetails {
    pub fn new(succeed_on: impl IntoIterator<Item = (u64, u32)>) -> Self {
        Self {
            succeed_on: succeed_on
                .into_iter()
                .map(|(id, n)| (id.to_string(), n))
                .collect(),
            calls: Mutex::new(HashMap::new()),
        }
    }
}

impl Respond for FlakyDetails {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let id = id_of_request(request);
        let mut calls = self.calls.lock().unwrap();
        let count = calls.entry(id.clone()).or_insert(0);
        *count += 1;

        match (self.succeed_on.get(&id), id.parse::<u64>()) {
            (Some(&n), Ok(numeric)) if *count >= n => {
                ResponseTemplate::new(200).set_body_json(detail_object(numeric))
            }
            _ => ResponseTemplate::new(503),
        }
    }
}

/// Requests received per detail id
pub async fn detail_requests_by_id(server: &MockServer) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for request in server.received_requests().await.unwrap_or_default() {
        if request.url.path().starts_with(&format!("{LISTING_PATH}/")) {
            *counts.entry(id_of_request(&request)).or_insert(0) += 1;
        }
    }
    counts
}

/// Configuration pointed at a mock server, with millisecond backoff and no round delay
pub fn test_config(server: &MockServer, checkpoint_dir: &Path) -> Config {
    let mut config = Config::default();
    config.api.base_url = server.uri();
    config.api.listing_path = LISTING_PATH.to_string();
    config.api.api_key = "test-key".to_string();
    config.api.application_key = "test-app".to_string();
    config.api.request_timeout_secs = 5;

    config.collection.page_size = 20;
    config.collection.block_size = 500;
    config.collection.concurrency = 10;
    config.collection.max_attempts = 3;
    config.collection.backoff_base_ms = 1;
    config.collection.max_rounds = 5;
    config.collection.round_delay_base_secs = 0;
    config.collection.round_delay_step_secs = 0;

    config.checkpoint.dir = checkpoint_dir.to_path_buf();
    config
}
