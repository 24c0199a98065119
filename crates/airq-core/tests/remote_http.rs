//! HTTP contract tests for the Breathe London client.
//!
//! Each test starts a throwaway HTTP server on localhost that answers
//! requests from a queue of canned responses, then points the client at it.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use airq_core::{
    BreatheLondon, Error, RemoteConfig, RemoteSource, RetryConfig, Series, SyncEngine,
};
use airq_store::Store;
use airq_types::{Classification, Reading, SiteStatus};
use time::macros::datetime;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

const SITES: &str = r#"[[{
    "SiteCode": "CLDP0001",
    "SiteName": "Royal London University Hospital",
    "OverallStatus": "healthy",
    "Latitude": 51.518775939941406,
    "Longitude": -0.059463899582624435,
    "SiteClassification": "Urban Background",
    "StartDate": "2021-01-22T08:59:25.167Z"
}]]"#;

const READINGS: &str = r#"[
    {"DateTime": "2022-01-01T00:00:00.000Z", "ScaledValue": 28.38500068664551},
    {"DateTime": "2022-01-01T01:00:00.000Z", "ScaledValue": 33.7489998626709},
    {"DateTime": "2022-01-01T02:00:00.000Z", "ScaledValue": null}
]"#;

struct FakeApi {
    base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

/// Serve `responses` in order, one per connection, as `(status, body)`.
async fn serve(responses: Vec<(u16, &'static str)>) -> FakeApi {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&requests);
    let mut queue: VecDeque<_> = responses.into();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut buf = vec![0u8; 8192];
            let mut len = 0;
            while !buf[..len].windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut buf[len..]).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => len += n,
                }
            }
            let head = String::from_utf8_lossy(&buf[..len]);
            if let Some(line) = head.lines().next() {
                log.lock().await.push(line.to_string());
            }

            let (status, body) = queue.pop_front().unwrap_or((404, r#"{"error":"no more responses"}"#));
            let response = format!(
                "HTTP/1.1 {status} Status\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    FakeApi {
        base_url: format!("http://{addr}/api/"),
        requests,
    }
}

fn client(api: &FakeApi) -> BreatheLondon {
    BreatheLondon::new(RemoteConfig {
        base_url: api.base_url.clone(),
        api_key: Some("test-key".to_string()),
        timeout: Duration::from_secs(5),
        retry: RetryConfig::fixed(3, Duration::from_millis(10)),
    })
    .unwrap()
}

#[tokio::test]
async fn test_list_sites_parses_nested_payload() {
    let api = serve(vec![(200, SITES)]).await;
    let sites = client(&api).list_sites().await.unwrap();

    assert_eq!(sites.len(), 1);
    let site = &sites[0];
    assert_eq!(site.site_code, "CLDP0001");
    assert_eq!(site.name, "Royal London University Hospital");
    assert_eq!(site.status, SiteStatus::Healthy);
    assert_eq!(site.classification, Classification::UrbanBackground);
    assert_eq!(site.start_date, Some(datetime!(2021-01-22 8:59:25.167 UTC)));

    let requests = api.requests.lock().await;
    assert_eq!(requests[0], "GET /api/ListSensors?key=test-key HTTP/1.1");
}

#[tokio::test]
async fn test_get_readings_request_path_and_nulls() {
    let api = serve(vec![(200, READINGS)]).await;
    let readings = client(&api)
        .get_readings(
            "CLDP0001",
            Series::Pm25,
            datetime!(2022-01-01 0:00 UTC),
            datetime!(2022-01-02 0:00 UTC),
        )
        .await
        .unwrap();

    assert_eq!(
        readings,
        vec![
            Reading::new(datetime!(2022-01-01 0:00 UTC), 28.38500068664551),
            Reading::new(datetime!(2022-01-01 1:00 UTC), 33.7489998626709),
        ]
    );

    let requests = api.requests.lock().await;
    assert_eq!(
        requests[0],
        "GET /api/getClarityData/CLDP0001/IPM25/2022-01-01T00:00:00Z/2022-01-02T00:00:00Z/Hourly?key=test-key HTTP/1.1"
    );
}

#[tokio::test]
async fn test_empty_object_means_no_data() {
    let api = serve(vec![(200, r#"{"recordsets": [], "output": {}}"#)]).await;
    let readings = client(&api)
        .get_readings(
            "CLDP0001",
            Series::No2,
            datetime!(2022-01-01 0:00 UTC),
            datetime!(2022-01-02 0:00 UTC),
        )
        .await
        .unwrap();
    assert!(readings.is_empty());
}

#[tokio::test]
async fn test_retries_server_errors() {
    let api = serve(vec![
        (503, r#"{"error": "busy"}"#),
        (502, "<html>bad gateway</html>"),
        (200, READINGS),
    ])
    .await;

    let readings = client(&api)
        .get_readings(
            "CLDP0001",
            Series::Pm25,
            datetime!(2022-01-01 0:00 UTC),
            datetime!(2022-01-02 0:00 UTC),
        )
        .await
        .unwrap();
    assert_eq!(readings.len(), 2);
    assert_eq!(api.requests.lock().await.len(), 3);
}

#[tokio::test]
async fn test_gives_up_after_three_retries() {
    let api = serve(vec![(500, r#"{"error": "boom"}"#); 6]).await;

    let err = client(&api).list_sites().await.unwrap_err();
    match err {
        Error::Api { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "boom");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(api.requests.lock().await.len(), 4);
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let api = serve(vec![(403, r#"{"error": "invalid key"}"#), (200, SITES)]).await;

    let err = client(&api).list_sites().await.unwrap_err();
    assert!(matches!(err, Error::Api { status: 403, .. }));
    assert_eq!(api.requests.lock().await.len(), 1);
}

#[tokio::test]
async fn test_contract_violation_is_not_retried() {
    let api = serve(vec![(200, r#"[{"SiteCode": "CLDP0001"}]"#), (200, SITES)]).await;

    let err = client(&api).list_sites().await.unwrap_err();
    assert!(matches!(err, Error::RemoteContract(_)));
    assert_eq!(api.requests.lock().await.len(), 1);
}

#[tokio::test]
async fn test_site_list_error_object_fails_metadata_sync() {
    let api = serve(vec![(200, r#"{"error": "invalid key"}"#), (200, SITES)]).await;
    let store = Arc::new(Mutex::new(Store::open_in_memory().unwrap()));
    let engine = SyncEngine::new(client(&api), Arc::clone(&store));

    let err = engine.sync_site_metadata().await.unwrap_err();
    assert!(matches!(err, Error::RemoteContract(ref message) if message.contains("invalid key")));
    assert_eq!(api.requests.lock().await.len(), 1);
    assert!(store.lock().await.list_sites(None).unwrap().is_empty());
}

#[tokio::test]
async fn test_sync_end_to_end_into_sqlite() {
    let api = serve(vec![(200, SITES), (200, READINGS), (200, "{}")]).await;
    let store = Arc::new(Mutex::new(Store::open_in_memory().unwrap()));
    let engine = SyncEngine::new(client(&api), Arc::clone(&store))
        .with_clock(|| datetime!(2022-01-01 3:00 UTC));

    assert_eq!(engine.sync_site_metadata().await.unwrap(), 1);

    let pm25 = engine.sync_site("CLDP0001", Series::Pm25, false).await.unwrap();
    assert_eq!(pm25.written, 2);
    let no2 = engine.sync_site("CLDP0001", Series::No2, false).await.unwrap();
    assert_eq!(no2.written, 0);

    let store = store.lock().await;
    let site = store.get_site("CLDP0001").unwrap().unwrap();
    assert_eq!(
        store.latest_timestamp(site.site_id, Series::Pm25).unwrap(),
        Some(datetime!(2022-01-01 1:00 UTC))
    );
    assert_eq!(store.count_readings(Some(site.site_id), None).unwrap(), 2);
}
