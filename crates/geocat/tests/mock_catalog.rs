//! Catalog operations and search pagination against a mock catalog.

mod common;

use futures_util::{StreamExt, TryStreamExt};
use geocat::catalog::{Asset, CatalogClient, Item};
use geocat::search::{PaginatedSearch, SearchRequest};
use serde_json::{Value, json};
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use common::{service_url, static_client};

fn catalog(server: &MockServer) -> CatalogClient {
    CatalogClient::new(static_client(), service_url(server, "/stac"))
}

fn feature(id: &str) -> Value {
    json!({"type": "Feature", "id": id, "assets": {}})
}

/// Serves two pages: the first links to the second through `cursor=abc`.
struct TwoPages {
    next_href: String,
}

impl Respond for TwoPages {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = request.body_json().unwrap();
        if body.get("cursor").is_none() {
            ResponseTemplate::new(200).set_body_json(json!({
                "features": [feature("a"), feature("b")],
                "links": [
                    {"rel": "self", "href": "ignored"},
                    {"rel": "next", "href": self.next_href}
                ]
            }))
        } else {
            ResponseTemplate::new(200).set_body_json(json!({
                "features": [feature("c")],
                "links": []
            }))
        }
    }
}

/// Always returns exactly `limit` features and a next link.
struct Endless;

impl Respond for Endless {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = request.body_json().unwrap();
        let limit = body["limit"].as_u64().unwrap();
        let features: Vec<Value> = (0..limit).map(|i| feature(&format!("f{i}"))).collect();
        ResponseTemplate::new(200).set_body_json(json!({
            "features": features,
            "links": [{"rel": "next", "href": "/stac/search?cursor=more"}]
        }))
    }
}

async fn received_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| r.body_json::<Value>().unwrap())
        .collect()
}

// ============================================================================
// Pagination
// ============================================================================

#[tokio::test]
async fn test_search_follows_cursor_until_last_page() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/stac/search"))
        .respond_with(TwoPages {
            next_href: format!("{}/stac/search?cursor=abc", server.uri()),
        })
        .expect(2)
        .mount(&server)
        .await;

    let request = SearchRequest::new().collection("sentinel-2");
    let search = catalog(&server).search(&request).unwrap();
    let original = search.body().clone();

    let ids: Vec<String> = search
        .stream()
        .map_ok(|f| f["id"].as_str().unwrap().to_string())
        .try_collect()
        .await
        .unwrap();

    assert_eq!(ids, ["a", "b", "c"]);
    assert_eq!(search.body(), &original);
    assert!(!original.contains_key("cursor"));

    let bodies = received_bodies(&server).await;
    assert_eq!(bodies[0]["collections"], json!(["sentinel-2"]));
    assert_eq!(bodies[0]["limit"], json!(50));
    assert!(bodies[0].get("cursor").is_none());
    assert_eq!(bodies[1]["cursor"], json!("abc"));
    assert_eq!(bodies[1]["collections"], json!(["sentinel-2"]));
}

#[tokio::test]
async fn test_encoded_cursor_is_decoded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/stac/search"))
        .respond_with(TwoPages {
            next_href: "/stac/search?cursor=next%3Acollection%3Aitem123".to_string(),
        })
        .expect(2)
        .mount(&server)
        .await;

    let search = catalog(&server).search(&SearchRequest::new()).unwrap();
    assert_eq!(search.collect_all().await.unwrap().len(), 3);

    let bodies = received_bodies(&server).await;
    assert_eq!(bodies[1]["cursor"], json!("next:collection:item123"));
}

#[tokio::test]
async fn test_next_link_without_cursor_ends_the_search() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/stac/search"))
        .respond_with(TwoPages {
            next_href: format!("{}/stac/search?page=2", server.uri()),
        })
        .expect(1)
        .mount(&server)
        .await;

    let search = catalog(&server).search(&SearchRequest::new()).unwrap();
    assert_eq!(search.collect_all().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_max_items_limits_requests() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/stac/search"))
        .respond_with(Endless)
        .expect(2)
        .mount(&server)
        .await;

    let search = catalog(&server)
        .search(&SearchRequest::new())
        .unwrap()
        .page_size(2)
        .max_items(3);

    assert_eq!(search.collect_all().await.unwrap().len(), 3);

    let limits: Vec<Value> = received_bodies(&server)
        .await
        .into_iter()
        .map(|b| b["limit"].clone())
        .collect();
    assert_eq!(limits, [json!(2), json!(1)]);
}

#[tokio::test]
async fn test_each_stream_starts_from_the_first_page() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/stac/search"))
        .respond_with(TwoPages {
            next_href: "?cursor=abc".to_string(),
        })
        .expect(4)
        .mount(&server)
        .await;

    let search = catalog(&server).search(&SearchRequest::new()).unwrap();
    let first = search.collect_all().await.unwrap();
    let second = search.collect_all().await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_stream_is_lazy() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/stac/search"))
        .respond_with(Endless)
        .expect(1)
        .mount(&server)
        .await;

    let search = catalog(&server).search(&SearchRequest::new()).unwrap().page_size(5);
    let first_two: Vec<Value> = search.stream().take(2).try_collect().await.unwrap();
    assert_eq!(first_two.len(), 2);
}

#[tokio::test]
async fn test_items_decode_into_typed_records() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/stac/search"))
        .respond_with(TwoPages {
            next_href: "?cursor=abc".to_string(),
        })
        .mount(&server)
        .await;

    let search = PaginatedSearch::from_value(
        static_client(),
        format!("{}/stac/search", server.uri()).parse().unwrap(),
        json!({"query": {"platform": {"eq": "sat-1"}}}),
    )
    .unwrap();

    let items: Vec<Item> = search.items::<Item>().try_collect().await.unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[2].id, "c");
}

#[test]
fn test_search_body_must_be_an_object() {
    let result = PaginatedSearch::from_value(
        static_client(),
        "http://localhost/search".parse().unwrap(),
        json!([1, 2]),
    );
    assert!(result.is_err());
}

// ============================================================================
// Items and collections
// ============================================================================

#[tokio::test]
async fn test_fetch_item() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/stac/collections/sentinel-2/items/scene-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "type": "Feature",
            "id": "scene-1",
            "collection": "sentinel-2",
            "assets": {"visual": {"href": "https://cdn.example.com/visual.tif"}}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let item = catalog(&server).fetch_item("sentinel-2", "scene-1").await.unwrap();
    assert_eq!(item.id, "scene-1");
    assert_eq!(item.assets["visual"].file_name(), Some("visual.tif"));
    assert_eq!(item.extra["type"], json!("Feature"));
}

#[tokio::test]
async fn test_missing_item_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/stac/collections/c/items/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = catalog(&server).fetch_item("c", "missing").await.unwrap_err();
    assert_eq!(err.status(), Some(404));
    match err {
        geocat::Error::Http(http) => assert!(http.is_not_found()),
        other => panic!("expected HTTP error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_create_add_update_delete_item() {
    let server = MockServer::start().await;
    let item = Item::new("scene-1")
        .with_collection("c1")
        .with_asset("data", Asset::new("data.tif").with_media_type("image/tiff"));
    let item_json = serde_json::to_value(&item).unwrap();

    Mock::given(method("POST"))
        .and(path("/stac/collections/c1/items"))
        .and(body_json(&item_json))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/stac/collections/c1/items/scene-1"))
        .and(body_json(&item_json))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/stac/collections/c1/items/scene-1"))
        .and(body_json(json!({"properties": {"cloud_cover": 3}})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/stac/collections/c1/items/scene-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let catalog = catalog(&server);
    catalog.create_item(&item).await.unwrap();
    catalog.add_item(&item).await.unwrap();
    catalog
        .update_item("c1", "scene-1", json!({"properties": {"cloud_cover": 3}}))
        .await
        .unwrap();
    catalog.delete_item("c1", "scene-1").await.unwrap();
}

#[tokio::test]
async fn test_item_without_collection_is_rejected() {
    let server = MockServer::start().await;
    let err = catalog(&server).add_item(&Item::new("orphan")).await.unwrap_err();
    assert!(err.to_string().contains("orphan"));
}

#[tokio::test]
async fn test_collection_operations() {
    let server = MockServer::start().await;
    let collection = json!({"type": "Collection", "id": "c1", "description": "test"});

    Mock::given(method("POST"))
        .and(path("/stac/collections"))
        .and(body_json(&collection))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/stac/collections/c1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&collection))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/stac/collections/c1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/stac/collections/c1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let catalog = catalog(&server);
    catalog.create_collection(&collection).await.unwrap();
    assert_eq!(catalog.fetch_collection("c1").await.unwrap(), collection);
    catalog
        .update_collection("c1", json!({"description": "updated"}))
        .await
        .unwrap();
    catalog.delete_collection("c1").await.unwrap();
}

#[tokio::test]
async fn test_collections_listing_follows_cursor() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/stac/collections"))
        .and(query_param("cursor", "page2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"type": "Collection", "id": "c3"}
        ])))
        .expect(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/stac/collections"))
        .and(query_param("limit", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "collections": [
                {"type": "Collection", "id": "c1"},
                {"type": "Catalog", "id": "not-a-collection"},
                {"type": "Collection", "id": "c2"}
            ],
            "links": [{"rel": "next", "href": "/stac/collections?limit=10&cursor=page2"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let ids: Vec<String> = catalog(&server)
        .collections()
        .map_ok(|c| c["id"].as_str().unwrap().to_string())
        .try_collect()
        .await
        .unwrap();

    assert_eq!(ids, ["c1", "c2", "c3"]);
}
