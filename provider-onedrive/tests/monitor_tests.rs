mod common;

use bridge_traits::HttpResponse;
use common::{authenticated_consumer, json, ScriptedHttpClient};
use provider_onedrive::models::{AsyncOperationStatus, Item};
use provider_onedrive::{AsyncMonitor, ErrorCode};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const MONITOR_URL: &str = "https://api.onedrive.com/monitor/4A3407B5-88FC-4504-8B21-0AABD3412717";

async fn monitor(http: std::sync::Arc<ScriptedHttpClient>) -> AsyncMonitor<Item> {
    let (client, _) = authenticated_consumer(http).await;
    AsyncMonitor::new(client, MONITOR_URL).with_poll_interval(Duration::from_millis(1))
}

#[tokio::test]
async fn test_reports_progress_then_returns_result() {
    let http = ScriptedHttpClient::new();
    http.push(json(
        202,
        r#"{"operation":"itemCopy","percentageComplete":25.0,"status":"inProgress"}"#,
    ));
    http.push(json(
        202,
        r#"{"operation":"itemCopy","percentageComplete":75.0,"status":"inProgress"}"#,
    ));
    http.push(json(200, r#"{"id":"copied-item","name":"report.docx"}"#));

    let seen = Mutex::new(Vec::new());
    let progress = |status: &AsyncOperationStatus| {
        seen.lock().unwrap().push(status.percentage_complete);
    };

    let item = monitor(http.clone())
        .await
        .poll_for_operation_completion(Some(&progress), &CancellationToken::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(item.id, "copied-item");
    assert_eq!(*seen.lock().unwrap(), vec![Some(25.0), Some(75.0)]);
    assert_eq!(http.call_count(), 3);
    assert!(http
        .requests()
        .iter()
        .all(|r| r.url == MONITOR_URL && r.header_value("Authorization").is_some()));
}

#[tokio::test]
async fn test_cancelled_operation_yields_none() {
    let http = ScriptedHttpClient::new();
    http.push(json(202, r#"{"status":"cancelled"}"#));

    let result = monitor(http)
        .await
        .poll_for_operation_completion(None, &CancellationToken::new())
        .await
        .unwrap();

    assert!(result.is_none());
}

#[tokio::test]
async fn test_failed_operation_carries_service_message() {
    let http = ScriptedHttpClient::new();
    http.push(json(202, r#"{"status":"failed","message":"x"}"#));

    let err = monitor(http)
        .await
        .poll_for_operation_completion(None, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::GeneralException);
    assert_eq!(err.message(), "x");
}

#[tokio::test]
async fn test_delete_failed_without_message_names_the_state() {
    let http = ScriptedHttpClient::new();
    http.push(json(202, r#"{"status":"deleteFailed"}"#));

    let err = monitor(http)
        .await
        .poll_for_operation_completion(None, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.message(), "Operation deleteFailed");
}

#[tokio::test]
async fn test_accepted_without_status_is_an_error() {
    let http = ScriptedHttpClient::new();
    http.push(HttpResponse::new(202).with_body("<html/>"));

    let err = monitor(http)
        .await
        .poll_for_operation_completion(None, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::GeneralException);
    assert_eq!(err.message(), "Error retrieving monitor status.");
}

#[tokio::test]
async fn test_pre_cancelled_token_sends_nothing() {
    let http = ScriptedHttpClient::new();
    let token = CancellationToken::new();
    token.cancel();

    let result = monitor(http.clone())
        .await
        .poll_for_operation_completion(None, &token)
        .await
        .unwrap();

    assert!(result.is_none());
    assert_eq!(http.call_count(), 0);
}

#[tokio::test]
async fn test_cancellation_between_polls_yields_none() {
    let http = ScriptedHttpClient::new();
    http.push(json(202, r#"{"status":"inProgress"}"#));
    let (client, _) = authenticated_consumer(http.clone()).await;
    let monitor: AsyncMonitor<Item> =
        AsyncMonitor::new(client, MONITOR_URL).with_poll_interval(Duration::from_secs(60));

    let token = CancellationToken::new();
    let trigger = token.clone();
    let progress = move |_: &AsyncOperationStatus| trigger.cancel();

    let result = monitor
        .poll_for_operation_completion(Some(&progress), &token)
        .await
        .unwrap();

    assert!(result.is_none());
    assert_eq!(http.call_count(), 1);
}

#[tokio::test]
async fn test_from_response_requires_location() {
    let http = ScriptedHttpClient::new();
    let (client, _) = authenticated_consumer(http).await;

    let accepted = HttpResponse::new(202).with_header("Location", MONITOR_URL);
    let monitor = AsyncMonitor::<Item>::from_response(client.clone(), &accepted).unwrap();
    assert_eq!(monitor.monitor_url(), MONITOR_URL);

    let err = AsyncMonitor::<Item>::from_response(client, &HttpResponse::new(202))
        .err()
        .unwrap();
    assert_eq!(err.code(), ErrorCode::GeneralException);
}
