//! Integration tests for PageCollector using wiremock

mod common;

use common::{listing_object, mount_listing, LISTING_PATH};
use gather::crawler::list::PageCollector;
use gather::crawler::ClientSettings;
use gather::error::PaginationFault;
use gather::models::{RecordId, RecordSchema};
use serde_json::json;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn collector() -> PageCollector {
    let client = ClientSettings::default().build_client().unwrap();
    PageCollector::new(client, RecordSchema::default())
}

fn endpoint(server: &MockServer) -> Url {
    Url::parse(&format!("{}{LISTING_PATH}", server.uri())).unwrap()
}

/// Pages of 20, 20 and 5 items yield 45 records from 3 requests
#[tokio::test]
async fn test_collect_stops_on_short_page() {
    let server = MockServer::start().await;
    let ids: Vec<u64> = (1..=45).collect();
    mount_listing(&server, &ids, 20).await;

    let collection = collector().collect(&endpoint(&server), 20).await;

    assert_eq!(collection.records.len(), 45);
    assert_eq!(collection.pages_requested, 3);
    assert!(!collection.is_partial());
    assert_eq!(collection.records[0].id, RecordId::from(1u64));
    assert_eq!(collection.records[44].detail_reference, "/v1/pedido/45");
}

/// A full final page is followed by one empty page
#[tokio::test]
async fn test_collect_exact_multiple_needs_empty_page() {
    let server = MockServer::start().await;
    let ids: Vec<u64> = (1..=40).collect();
    mount_listing(&server, &ids, 20).await;

    let collection = collector().collect(&endpoint(&server), 20).await;

    assert_eq!(collection.records.len(), 40);
    assert_eq!(collection.pages_requested, 3);
}

/// A failing page ends collection and keeps earlier pages
#[tokio::test]
async fn test_collect_is_fail_soft() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "objects": (1..=20).map(listing_object).collect::<Vec<_>>(),
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .and(query_param("offset", "20"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let collection = collector().collect(&endpoint(&server), 20).await;

    assert_eq!(collection.records.len(), 20);
    assert_eq!(collection.pages_requested, 2);
    assert_eq!(
        collection.fault,
        Some(PaginationFault::Status {
            offset: 20,
            status: 500
        })
    );
}

/// Undecodable bodies are pagination faults too
#[tokio::test]
async fn test_collect_decode_fault() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let collection = collector().collect(&endpoint(&server), 20).await;

    assert!(collection.records.is_empty());
    assert!(matches!(
        collection.fault,
        Some(PaginationFault::Decode { offset: 0, .. })
    ));
}

/// Objects without id or reference are skipped; repeated ids keep the first
#[tokio::test]
async fn test_collect_skips_and_dedups() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            listing_object(1),
            {"numero": 2},
            {"resource_uri": "/v1/pedido/3"},
            {"numero": "1", "resource_uri": "/v1/pedido/1?again"},
            listing_object(4),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let collection = collector().collect(&endpoint(&server), 20).await;

    let ids: Vec<&str> = collection.records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "4"]);
    assert_eq!(collection.records[0].detail_reference, "/v1/pedido/1");
    assert_eq!(collection.skipped, 2);
    assert_eq!(collection.duplicates, 1);
}

/// Raw objects are returned untouched
#[tokio::test]
async fn test_collect_objects_keeps_raw_values() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/cliente"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"id": 1, "nome": "Ana"}, {"id": 2, "nome": "Bia"}],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let url = Url::parse(&format!("{}/v1/cliente", server.uri())).unwrap();
    let collection = collector().collect_objects(&url, 20).await;

    assert_eq!(collection.objects.len(), 2);
    assert_eq!(collection.objects[1]["nome"], "Bia");
    assert_eq!(collection.pages_requested, 1);
}
