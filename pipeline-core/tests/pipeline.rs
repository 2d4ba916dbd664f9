//! End-to-end pipeline scenarios against a mock weather provider.

use anyhow::Result;
use async_trait::async_trait;
use pipeline_core::fetch::Fetcher;
use pipeline_core::gcp::gcs::ObjectStore;
use pipeline_core::pipeline::Pipeline;
use pipeline_core::store::LocalStore;
use pipeline_core::WeatherRecord;
use serde_json::json;
use std::sync::Mutex;
use tempfile::tempdir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn paris_payload() -> serde_json::Value {
    json!({
        "coord": {"lat": 48.85, "lon": 2.35},
        "weather": [{"id": 800, "main": "Clear", "description": "clear sky"}],
        "main": {
            "temp": 15.2,
            "feels_like": 14.1,
            "temp_min": 12.0,
            "temp_max": 17.3,
            "humidity": 60,
            "pressure": 1013
        },
        "sys": {"country": "FR", "sunrise": 1700000000, "sunset": 1700030000},
        "name": "Paris"
    })
}

async fn mock_provider(payload: serde_json::Value) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .and(query_param("q", "Paris"))
        .and(query_param("units", "metric"))
        .respond_with(ResponseTemplate::new(200).set_body_json(payload))
        .mount(&server)
        .await;
    server
}

#[derive(Default)]
struct RecordingStore {
    uploads: Mutex<Vec<String>>,
}

#[async_trait]
impl ObjectStore for RecordingStore {
    async fn put_object(&self, object_path: &str, _bytes: Vec<u8>) -> Result<()> {
        self.uploads.lock().unwrap().push(object_path.to_string());
        Ok(())
    }

    fn locator(&self, object_path: &str) -> String {
        format!("gs://test-bucket/{object_path}")
    }
}

#[tokio::test]
async fn local_only_run_persists_record_and_skips_cloud_stages() {
    let server = mock_provider(paris_payload()).await;
    let dir = tempdir().unwrap();

    let pipeline = Pipeline::new(
        Fetcher::new("Paris", "TEST_KEY", server.uri()),
        LocalStore::new(dir.path()),
        None,
        None,
    );

    let report = pipeline.run().await.unwrap();

    let record = report.fetched.success().expect("fetch must succeed");
    assert_eq!(record.city, "Paris");
    assert_eq!(record.country, "FR");
    assert_eq!(record.temperature, 15.2);
    assert_eq!(record.humidity, 60);
    assert_eq!(record.weather, "clear sky");

    let local_path = report.local_path.expect("artifact must exist");
    assert_eq!(
        local_path.file_name().unwrap().to_str().unwrap(),
        record.artifact_basename()
    );

    let persisted: WeatherRecord =
        serde_json::from_str(&std::fs::read_to_string(&local_path).unwrap()).unwrap();
    assert_eq!(persisted, record);

    // without project+bucket nothing is staged and no warehouse load runs
    assert!(report.staged.is_skipped());
    assert!(report.loaded.is_skipped());
}

#[tokio::test]
async fn staged_object_lands_under_the_record_date_partition() {
    let server = mock_provider(paris_payload()).await;
    let dir = tempdir().unwrap();

    let pipeline = Pipeline::new(
        Fetcher::new("Paris", "TEST_KEY", server.uri()),
        LocalStore::new(dir.path()),
        Some(Box::new(RecordingStore::default())),
        None,
    );

    let report = pipeline.run().await.unwrap();

    let record = report.fetched.success().expect("fetch must succeed");
    let locator = report.staged.success().expect("staging must succeed");

    let expected_prefix = format!(
        "gs://test-bucket/raw/{}",
        record.timestamp.format("%Y/%m/%d")
    );
    assert!(
        locator.starts_with(&expected_prefix),
        "locator {locator} should start with {expected_prefix}"
    );
    assert!(locator.ends_with(&record.artifact_basename()));
}

#[tokio::test]
async fn fetch_failure_short_circuits_without_persisting() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let pipeline = Pipeline::new(
        Fetcher::new("Paris", "TEST_KEY", server.uri()),
        LocalStore::new(dir.path()),
        Some(Box::new(RecordingStore::default())),
        None,
    );

    let report = pipeline.run().await.unwrap();

    assert!(report.fetched.is_failed());
    assert!(report.local_path.is_none());
    assert!(report.staged.is_skipped());
    assert!(report.loaded.is_skipped());

    // no artifact was created
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn response_missing_required_section_creates_no_artifact() {
    let mut payload = paris_payload();
    payload.as_object_mut().unwrap().remove("sys");

    let server = mock_provider(payload).await;
    let dir = tempdir().unwrap();

    let pipeline = Pipeline::new(
        Fetcher::new("Paris", "TEST_KEY", server.uri()),
        LocalStore::new(dir.path()),
        None,
        None,
    );

    let report = pipeline.run().await.unwrap();

    assert!(report.fetched.is_failed());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}
