//! IPFS gateway adapter tests against local HTTP endpoints

mod common;

use common::http::StubServer;
use origin_indexer::adapters::IpfsGateway;
use origin_indexer::config::IpfsConfig;
use origin_indexer::core::MetadataPort;
use serde_json::json;

fn config(gateways: Vec<String>) -> IpfsConfig {
    IpfsConfig {
        gateways,
        request_timeout_secs: 5,
        ..IpfsConfig::default()
    }
}

#[tokio::test]
async fn test_falls_back_to_next_gateway() {
    let down = StubServer::start(|_| (404, "{}".to_string())).await;
    let up = StubServer::start(|request| {
        let body = json!({ "title": "Vintage jacket", "path": request.path });
        (200, body.to_string())
    })
    .await;

    let gateway = IpfsGateway::new(&config(vec![down.url.clone(), format!("{}/", up.url)])).unwrap();
    let document = gateway.listing_document("QmListing").await.unwrap();

    assert_eq!(document["title"], "Vintage jacket");
    assert_eq!(document["path"], "/ipfs/QmListing");
    assert_eq!(down.hits("/ipfs/QmListing"), 1);
}

#[tokio::test]
async fn test_every_gateway_failing_is_transient() {
    let down = StubServer::start(|_| (500, "oops".to_string())).await;
    let gateway = IpfsGateway::new(&config(vec![down.url.clone()])).unwrap();

    let err = gateway.listing_document("QmListing").await.unwrap_err();
    assert!(err.is_transient());
}
