#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::{
    Router,
    extract::State,
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    routing::{get, post},
};
use serde_json::{Value, json};

/// In-process stand-in for the Storage API.
#[derive(Clone)]
pub struct FakeStorage {
    pub mtypes: (StatusCode, String),

    pub sensors: (StatusCode, String),

    pub post_status: StatusCode,

    pub posted: Arc<Mutex<Vec<Value>>>,

    pub content_types: Arc<Mutex<Vec<String>>>,
}

impl Default for FakeStorage {
    fn default() -> Self {
        Self {
            mtypes: (
                StatusCode::OK,
                json!({"mtypes": [
                    {"id": 1, "name": "Temperature"},
                    {"id": 2, "name": "Humidity"},
                ]})
                .to_string(),
            ),
            sensors: (
                StatusCode::OK,
                json!({"sensors": [
                    {"id": 5, "name": "Living room", "location_id": 1, "mtypes": [1]},
                ]})
                .to_string(),
            ),
            post_status: StatusCode::OK,
            posted: Arc::default(),
            content_types: Arc::default(),
        }
    }
}

impl FakeStorage {
    /// Serves the API under `/api` on an ephemeral port and returns its base url.
    pub async fn serve(self) -> String {
        let app = Router::new()
            .route("/api/mtypes/", get(get_mtypes))
            .route("/api/sensors/", get(get_sensors))
            .route("/api/measurements/", post(new_measurement))
            .with_state(self);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        format!("http://{addr}/api")
    }

    pub fn posted(&self) -> Vec<Value> {
        self.posted.lock().unwrap().clone()
    }
}

async fn get_mtypes(State(storage): State<FakeStorage>) -> (StatusCode, String) {
    storage.mtypes.clone()
}

async fn get_sensors(State(storage): State<FakeStorage>) -> (StatusCode, String) {
    storage.sensors.clone()
}

async fn new_measurement(
    State(storage): State<FakeStorage>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    storage.content_types.lock().unwrap().push(content_type);

    if storage.post_status != StatusCode::OK {
        return (
            storage.post_status,
            json!({"error": "Sensor does not support the Humidity type"}).to_string(),
        );
    }

    let mut measurement: Value = serde_json::from_str(&body).unwrap();

    let mut posted = storage.posted.lock().unwrap();
    posted.push(measurement.clone());
    measurement["id"] = json!(posted.len());

    (StatusCode::OK, measurement.to_string())
}
