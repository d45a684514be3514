mod common;

use bridge_traits::HttpMethod;
use bytes::Bytes;
use common::{authenticated_consumer, json, ScriptedHttpClient};
use provider_onedrive::models::UploadSession;
use provider_onedrive::{ChunkedUploadProvider, ErrorCode, UploadChunkRequest};
use std::io::Cursor;

const SESSION_URL: &str = "https://sn3302.up.1drv.com/up/fe6987415ace7X4e1eF866337";
const CHUNK: usize = 320 * 1024;

fn session(ranges: &[&str]) -> UploadSession {
    serde_json::from_value(serde_json::json!({
        "uploadUrl": SESSION_URL,
        "expirationDateTime": "2015-01-29T09:21:55.523Z",
        "nextExpectedRanges": ranges,
    }))
    .unwrap()
}

fn file(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[tokio::test]
async fn test_final_chunk_returns_item() {
    let http = ScriptedHttpClient::new();
    http.push(json(201, r#"{"id":"912310013A123","name":"notes.txt","size":10}"#));
    let (client, _) = authenticated_consumer(http.clone()).await;

    let result = UploadChunkRequest::new(client, SESSION_URL, 5, 9, 10)
        .put(Bytes::from_static(b"world"), None)
        .await
        .unwrap();

    assert!(result.upload_succeeded());
    assert_eq!(result.item_response.unwrap().id, "912310013A123");

    let request = &http.requests()[0];
    assert_eq!(request.method, HttpMethod::Put);
    assert_eq!(request.url, SESSION_URL);
    assert_eq!(request.header_value("Content-Range"), Some("bytes 5-9/10"));
    assert_eq!(request.header_value("Content-Length"), Some("5"));
    assert_eq!(request.body.as_deref(), Some(&b"world"[..]));
}

#[tokio::test]
async fn test_session_body_means_more_ranges_remain() {
    let http = ScriptedHttpClient::new();
    http.push(json(
        200,
        r#"{"expirationDateTime":"2015-01-29T09:21:55.523Z","nextExpectedRanges":["5-9"]}"#,
    ));
    let (client, _) = authenticated_consumer(http).await;

    let result = UploadChunkRequest::new(client, SESSION_URL, 0, 4, 10)
        .put(Bytes::from_static(b"hello"), None)
        .await
        .unwrap();

    assert!(!result.upload_succeeded());
    assert_eq!(
        result.upload_session.unwrap().next_expected_ranges,
        vec!["5-9".to_string()]
    );
}

#[tokio::test]
async fn test_content_must_match_range_length() {
    let http = ScriptedHttpClient::new();
    let (client, _) = authenticated_consumer(http.clone()).await;

    let err = UploadChunkRequest::new(client.clone(), SESSION_URL, 0, 4, 10)
        .put(Bytes::from_static(b"hi"), None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidRequest);

    let err = UploadChunkRequest::new(client, SESSION_URL, 0, 10, 10)
        .put(Bytes::from_static(b"01234567890"), None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidRequest);
    assert_eq!(http.call_count(), 0);
}

#[tokio::test]
async fn test_chunk_size_must_be_multiple_of_320_kib() {
    let http = ScriptedHttpClient::new();
    let (client, _) = authenticated_consumer(http).await;

    let err = ChunkedUploadProvider::new(client.clone(), session(&["0-"]), Cursor::new(file(10)), 10, Some(1000))
        .err()
        .unwrap();
    assert_eq!(err.code(), ErrorCode::InvalidRequest);

    let provider =
        ChunkedUploadProvider::new(client, session(&["0-"]), Cursor::new(file(10)), 10, Some(2 * CHUNK))
            .unwrap();
    assert_eq!(provider.max_chunk_size(), (2 * CHUNK) as u64);
}

#[tokio::test]
async fn test_session_without_upload_url_is_rejected() {
    let http = ScriptedHttpClient::new();
    let (client, _) = authenticated_consumer(http).await;
    let session: UploadSession =
        serde_json::from_value(serde_json::json!({"nextExpectedRanges": ["0-"]})).unwrap();

    let err = ChunkedUploadProvider::new(client, session, Cursor::new(file(10)), 10, Some(CHUNK))
        .err()
        .unwrap();
    assert_eq!(err.code(), ErrorCode::InvalidRequest);
}

#[tokio::test]
async fn test_chunk_requests_split_each_expected_range() {
    let http = ScriptedHttpClient::new();
    let (client, _) = authenticated_consumer(http).await;
    let total = (2 * CHUNK + 100) as u64;

    let provider = ChunkedUploadProvider::new(
        client,
        session(&["0-"]),
        Cursor::new(file(total as usize)),
        total,
        Some(CHUNK),
    )
    .unwrap();

    let ranges: Vec<(u64, u64)> = provider
        .get_upload_chunk_requests()
        .unwrap()
        .iter()
        .map(|r| (r.range_begin(), r.range_end()))
        .collect();
    assert_eq!(
        ranges,
        vec![
            (0, CHUNK as u64 - 1),
            (CHUNK as u64, 2 * CHUNK as u64 - 1),
            (2 * CHUNK as u64, total - 1),
        ]
    );
}

#[tokio::test]
async fn test_upload_walks_the_session_to_completion() {
    let http = ScriptedHttpClient::new();
    let total = 2 * CHUNK + 1000;
    http.push(json(202, &format!(r#"{{"nextExpectedRanges":["{}-"]}}"#, CHUNK)));
    http.push(json(202, &format!(r#"{{"nextExpectedRanges":["{}-"]}}"#, 2 * CHUNK)));
    http.push(json(201, r#"{"id":"uploaded","name":"video.mp4"}"#));
    let (client, _) = authenticated_consumer(http.clone()).await;
    let content = file(total);

    let mut provider = ChunkedUploadProvider::new(
        client,
        session(&["0-"]),
        Cursor::new(content.clone()),
        total as u64,
        Some(CHUNK),
    )
    .unwrap();

    let item = provider.upload(None).await.unwrap();
    assert_eq!(item.id, "uploaded");

    let requests = http.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(
        requests[0].header_value("Content-Range"),
        Some(format!("bytes 0-{}/{}", CHUNK - 1, total).as_str())
    );
    assert_eq!(
        requests[2].header_value("Content-Range"),
        Some(format!("bytes {}-{}/{}", 2 * CHUNK, total - 1, total).as_str())
    );
    assert_eq!(requests[1].body.as_deref(), Some(&content[CHUNK..2 * CHUNK]));
    assert!(requests.iter().all(|r| r.url == SESSION_URL));
}

#[tokio::test]
async fn test_stalled_session_fails() {
    let http = ScriptedHttpClient::new();
    http.push(json(202, r#"{"nextExpectedRanges":["0-"]}"#));
    let (client, _) = authenticated_consumer(http.clone()).await;

    let mut provider =
        ChunkedUploadProvider::new(client, session(&["0-"]), Cursor::new(file(10)), 10, Some(CHUNK))
            .unwrap();

    let err = provider.upload(None).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::GeneralException);
    assert_eq!(http.call_count(), 1);
}

#[tokio::test]
async fn test_short_stream_is_general_exception() {
    let http = ScriptedHttpClient::new();
    let (client, _) = authenticated_consumer(http.clone()).await;

    let mut provider =
        ChunkedUploadProvider::new(client, session(&["0-"]), Cursor::new(file(5)), 10, Some(CHUNK))
            .unwrap();

    let err = provider.upload(None).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::GeneralException);
    assert_eq!(http.call_count(), 0);
}

#[tokio::test]
async fn test_session_status_and_delete() {
    let http = ScriptedHttpClient::new();
    http.push(json(200, r#"{"nextExpectedRanges":["4-"]}"#));
    http.push(json(204, ""));
    let (client, _) = authenticated_consumer(http.clone()).await;

    let mut provider =
        ChunkedUploadProvider::new(client, session(&["0-"]), Cursor::new(file(10)), 10, Some(CHUNK))
            .unwrap();

    let status = provider.get_session_status().await.unwrap();
    assert_eq!(status.next_expected_ranges, vec!["4-".to_string()]);
    assert_eq!(status.upload_url.as_deref(), Some(SESSION_URL));
    assert_eq!(provider.get_upload_chunk_requests().unwrap()[0].range_begin(), 4);

    provider.delete_session().await.unwrap();

    let requests = http.requests();
    assert_eq!(requests[0].method, HttpMethod::Get);
    assert_eq!(requests[1].method, HttpMethod::Delete);
    assert_eq!(requests[1].url, SESSION_URL);
}
