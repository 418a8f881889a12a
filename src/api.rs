use std::{future::Future, time::Duration};

use anyhow::{Context as _, Result};
use reqwest::{Client, Response, StatusCode, Url};
use serde::{Deserialize, de::DeserializeOwned};
use thiserror::Error;

use crate::model::{Measurement, MeasurementType, NewMeasurement, Sensor};

// Relative to the base API url
const API_URL_MTYPES: &str = "mtypes/";
const API_URL_SENSORS: &str = "sensors/";
const API_URL_MEASUREMENTS: &str = "measurements/";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request to '{url}' failed")]
    Transport {
        url: Url,
        #[source]
        source: reqwest::Error,
    },

    #[error("'{url}' returned HTTP status {status}, not 200: {body}")]
    Status {
        url: Url,
        status: StatusCode,
        body: String,
    },

    #[error("failed to decode the reply from '{url}'")]
    Decode {
        url: Url,
        #[source]
        source: reqwest::Error,
    },
}

impl ApiError {
    /// Whether the same request may succeed if sent again later.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Transport { .. } => true,
            ApiError::Status { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            ApiError::Decode { .. } => false,
        }
    }
}

/// The subset of the Storage API the bridge talks to.
pub trait StorageApi {
    fn get_measurement_types(
        &self,
    ) -> impl Future<Output = Result<Vec<MeasurementType>, ApiError>> + Send;

    fn get_sensors(&self) -> impl Future<Output = Result<Vec<Sensor>, ApiError>> + Send;

    /// Submits one measurement. Never retries.
    fn post_measurement(
        &self,
        measurement: &NewMeasurement,
    ) -> impl Future<Output = Result<Measurement, ApiError>> + Send;
}

#[derive(Debug, Deserialize)]
struct MeasurementTypeList {
    mtypes: Vec<MeasurementType>,
}

#[derive(Debug, Deserialize)]
struct SensorList {
    sensors: Vec<Sensor>,
}

#[derive(Debug, Clone)]
pub struct HttpStorageApi {
    client: Client,

    base_url: Url,

    mtypes_url: Url,

    sensors_url: Url,

    measurements_url: Url,
}

impl HttpStorageApi {
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base_url =
            Url::parse(base_url).with_context(|| format!("invalid API url: {base_url}"))?;

        // Without the trailing slash `join` would replace the last path segment.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mtypes_url = base_url
            .join(API_URL_MTYPES)
            .context("failed to build measurement types url")?;
        let sensors_url = base_url
            .join(API_URL_SENSORS)
            .context("failed to build sensors url")?;
        let measurements_url = base_url
            .join(API_URL_MEASUREMENTS)
            .context("failed to build measurements url")?;

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url,
            mtypes_url,
            sensors_url,
            measurements_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, ApiError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                url: url.clone(),
                source,
            })?;

        let response = ensure_ok(url, response).await?;

        response.json().await.map_err(|source| ApiError::Decode {
            url: url.clone(),
            source,
        })
    }
}

impl StorageApi for HttpStorageApi {
    async fn get_measurement_types(&self) -> Result<Vec<MeasurementType>, ApiError> {
        let list: MeasurementTypeList = self.get_json(&self.mtypes_url).await?;
        Ok(list.mtypes)
    }

    async fn get_sensors(&self) -> Result<Vec<Sensor>, ApiError> {
        let list: SensorList = self.get_json(&self.sensors_url).await?;
        Ok(list.sensors)
    }

    async fn post_measurement(&self, measurement: &NewMeasurement) -> Result<Measurement, ApiError> {
        let url = &self.measurements_url;

        let response = self
            .client
            .post(url.clone())
            .json(measurement)
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                url: url.clone(),
                source,
            })?;

        let response = ensure_ok(url, response).await?;

        response.json().await.map_err(|source| ApiError::Decode {
            url: url.clone(),
            source,
        })
    }
}

async fn ensure_ok(url: &Url, response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status == StatusCode::OK {
        return Ok(response);
    }

    // The body is only diagnostics, an unreadable one must not hide the status.
    let body = response.text().await.unwrap_or_default();

    Err(ApiError::Status {
        url: url.clone(),
        status,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_error(status: StatusCode) -> ApiError {
        ApiError::Status {
            url: Url::parse("http://localhost/api/measurements/").unwrap(),
            status,
            body: String::new(),
        }
    }

    #[test]
    fn server_errors_and_throttling_are_retryable() {
        assert!(status_error(StatusCode::INTERNAL_SERVER_ERROR).is_retryable());
        assert!(status_error(StatusCode::SERVICE_UNAVAILABLE).is_retryable());
        assert!(status_error(StatusCode::TOO_MANY_REQUESTS).is_retryable());
    }

    #[test]
    fn rejections_are_not_retryable() {
        assert!(!status_error(StatusCode::BAD_REQUEST).is_retryable());
        assert!(!status_error(StatusCode::NOT_FOUND).is_retryable());
        assert!(!status_error(StatusCode::CREATED).is_retryable());
    }

    #[test]
    fn endpoints_are_joined_under_the_base_path() {
        let api = HttpStorageApi::new("http://1.2.3.4/api").unwrap();
        assert_eq!(api.base_url().as_str(), "http://1.2.3.4/api/");
        assert_eq!(api.mtypes_url.as_str(), "http://1.2.3.4/api/mtypes/");
        assert_eq!(api.sensors_url.as_str(), "http://1.2.3.4/api/sensors/");
        assert_eq!(
            api.measurements_url.as_str(),
            "http://1.2.3.4/api/measurements/"
        );

        let api = HttpStorageApi::new("http://1.2.3.4/api/").unwrap();
        assert_eq!(api.mtypes_url.as_str(), "http://1.2.3.4/api/mtypes/");
    }

    #[test]
    fn rejects_invalid_base_url() {
        assert!(HttpStorageApi::new("not a url").is_err());
    }
}
