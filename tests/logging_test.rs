//! Integration tests for shipping tracing events to the session log.

mod common;

use ats_client::config::Config;
use ats_client::model::{SessionId, Status, WorkItem};
use ats_client::telemetry::AuditLogLayer;
use ats_client::{AutomationServer, Error};
use axum::http::{Method, StatusCode};
use common::{FakeServer, QUEUE, SESSION, TOKEN};
use secrecy::SecretString;
use serde_json::{Value, json};
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

#[tokio::test]
async fn events_are_tagged_with_the_item_being_processed() {
    let server = FakeServer::start().await;
    let client = server.client();
    let (layer, shipper) = AuditLogLayer::for_client(&client, Some(SessionId(SESSION)));
    assert!(layer.is_enabled());
    assert!(shipper.is_some());
    let _default = tracing_subscriber::registry().with(layer).set_default();

    server.seed(QUEUE, json!({}), "order-9");
    let mut item = client.workqueue(QUEUE).next_item().await.unwrap().unwrap();
    let id = item.id;

    tracing::info!("before the scope");
    client
        .process(&mut item, async |item: &mut WorkItem| {
            tracing::info!(reference = %item.reference, "inside the scope");
            Ok::<_, Error>(())
        })
        .await
        .unwrap();
    tracing::warn!("after the scope");

    let before = server.wait_for_log("before the scope").await.expect("shipped");
    assert_eq!(before["workitem_id"], Value::Null);
    assert!(before["message"].as_str().unwrap().starts_with("[INFO] "));

    let inside = server.wait_for_log("inside the scope").await.expect("shipped");
    assert_eq!(inside["workitem_id"], json!(id.0));
    assert!(
        inside["message"]
            .as_str()
            .unwrap()
            .ends_with("inside the scope reference=order-9")
    );

    let after = server.wait_for_log("after the scope").await.expect("shipped");
    assert_eq!(after["workitem_id"], Value::Null);
    assert!(after["message"].as_str().unwrap().starts_with("[WARN] "));

    let posts = server.requests_to(Method::POST, &format!("/sessions/{SESSION}/log"));
    assert!(posts.iter().all(|r| r.authorization.is_some()));
}

#[tokio::test]
async fn records_arrive_in_emission_order() {
    let server = FakeServer::start().await;
    let client = server.client();
    let (layer, _shipper) = AuditLogLayer::for_client(&client, Some(SessionId(SESSION)));
    let _default = tracing_subscriber::registry().with(layer).set_default();

    for i in 0..10 {
        tracing::info!("step {i}");
    }
    server.wait_for_log("step 9").await.expect("shipped");

    let steps: Vec<String> = server
        .logs()
        .iter()
        .filter_map(|l| l["message"].as_str())
        .filter_map(|m| m.split(": ").nth(1))
        .filter(|m| m.starts_with("step "))
        .map(str::to_string)
        .collect();
    let expected: Vec<String> = (0..10).map(|i| format!("step {i}")).collect();
    assert_eq!(steps, expected);
}

#[tokio::test]
async fn failing_log_endpoint_does_not_disturb_processing() {
    let server = FakeServer::start().await;
    let log_path = format!("/sessions/{SESSION}/log");
    server.fail(Method::POST, &log_path, StatusCode::INTERNAL_SERVER_ERROR);

    let client = server.client();
    let (layer, _shipper) = AuditLogLayer::for_client(&client, Some(SessionId(SESSION)));
    let _default = tracing_subscriber::registry().with(layer).set_default();

    server.seed(QUEUE, json!({}), "doomed-logs");
    let mut item = client.workqueue(QUEUE).next_item().await.unwrap().unwrap();
    client
        .process(&mut item, async |_item: &mut WorkItem| {
            tracing::error!("this record will be rejected");
            Ok::<_, Error>(())
        })
        .await
        .unwrap();

    assert_eq!(item.status, Status::Completed);

    // The shipper still tried, and its own warnings were not shipped.
    for _ in 0..200 {
        if !server.requests_to(Method::POST, &log_path).is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(!server.requests_to(Method::POST, &log_path).is_empty());
    assert!(server.logs().is_empty());
}

#[tokio::test]
async fn no_session_means_no_shipping() {
    let server = FakeServer::start().await;
    let client = server.client();
    let (layer, shipper) = AuditLogLayer::for_client(&client, None);
    assert!(!layer.is_enabled());
    assert!(shipper.is_none());

    let _default = tracing_subscriber::registry().with(layer).set_default();
    tracing::info!("goes nowhere");
    tokio::task::yield_now().await;

    assert!(server.requests().is_empty());
}

#[tokio::test]
async fn shutdown_sends_every_queued_record() {
    let server = FakeServer::start().await;
    let client = server.client();
    let (layer, shipper) = AuditLogLayer::for_client(&client, Some(SessionId(SESSION)));
    let shipper = shipper.expect("session configured");
    let _default = tracing_subscriber::registry().with(layer).set_default();

    for i in 0..5 {
        tracing::error!("final words {i}");
    }
    // No waiting: everything emitted so far must be on the server once
    // shutdown returns.
    shipper.shutdown().await;

    let messages: Vec<String> = server
        .logs()
        .iter()
        .filter_map(|l| l["message"].as_str().map(str::to_string))
        .filter(|m| m.contains("final words"))
        .collect();
    assert_eq!(messages.len(), 5);
    assert!(messages[4].ends_with("final words 4"));

    tracing::error!("after shutdown");
    tokio::task::yield_now().await;
    assert!(server.wait_for_log("after shutdown").await.is_none());
}

#[tokio::test]
async fn shutdown_with_nothing_queued_returns() {
    let server = FakeServer::start().await;
    let client = server.client();
    let (layer, shipper) = AuditLogLayer::for_client(&client, Some(SessionId(SESSION)));

    shipper.expect("session configured").shutdown().await;
    assert!(!layer.is_enabled());
    assert!(server.logs().is_empty());
}

#[tokio::test]
async fn connecting_with_an_installed_layer_is_logged() {
    let server = FakeServer::start().await;
    let client = server.client();
    let (layer, shipper) = AuditLogLayer::for_client(&client, Some(SessionId(SESSION)));
    let _default = tracing_subscriber::registry().with(layer).set_default();

    let config = Config {
        url: server.url.clone(),
        token: Some(SecretString::from(TOKEN)),
        session: Some(SessionId(SESSION)),
        resource: None,
        process: None,
        workqueue_override: None,
        otel_endpoint: None,
        log_level: "info".to_string(),
    };
    let ats = AutomationServer::connect_with(client, &config).await.unwrap();
    assert_eq!(ats.workqueue_id(), Some(QUEUE));

    shipper.expect("session configured").shutdown().await;
    let connected = server.wait_for_log("connected to automation server").await;
    assert!(connected.is_some());
}
