use std::fmt;

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::{
    catalog::Catalog,
    model::{ERROR_MESSAGE_TYPE, NewMeasurement, SensorId},
};

/// A telemetry event as published by the receiver. Vendor fields beyond these
/// are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryMessage {
    pub device_id: SensorId,

    #[serde(default)]
    pub timestamp: Option<i64>,

    #[serde(rename = "type")]
    pub r#type: String,

    #[serde(default)]
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    ErrorMessage,
    MalformedMessage,
    UnknownMeasurementType,
    UnknownSensor,
    UnsupportedTypeForSensor,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::ErrorMessage => "ignored-error-message",
            SkipReason::MalformedMessage => "malformed-message",
            SkipReason::UnknownMeasurementType => "unknown-measurement-type",
            SkipReason::UnknownSensor => "unknown-sensor",
            SkipReason::UnsupportedTypeForSensor => "unsupported-type-for-sensor",
        }
    }

    /// Whether the skip may disappear once the catalog is reloaded.
    pub fn is_catalog_miss(&self) -> bool {
        matches!(
            self,
            SkipReason::UnknownMeasurementType
                | SkipReason::UnknownSensor
                | SkipReason::UnsupportedTypeForSensor
        )
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a message was not turned into a submission.
#[derive(Debug, Clone, Error)]
pub enum Skip {
    #[error("error message")]
    ErrorMessage,

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("API does not support the '{0}' measurement type")]
    UnknownMeasurementType(String),

    #[error("API does not have a sensor with id '{0}'")]
    UnknownSensor(SensorId),

    #[error("sensor '{sensor_id}' is not enrolled in the '{mtype}' measurement type")]
    UnsupportedTypeForSensor { sensor_id: SensorId, mtype: String },
}

impl Skip {
    pub fn reason(&self) -> SkipReason {
        match self {
            Skip::ErrorMessage => SkipReason::ErrorMessage,
            Skip::MalformedMessage(_) => SkipReason::MalformedMessage,
            Skip::UnknownMeasurementType(_) => SkipReason::UnknownMeasurementType,
            Skip::UnknownSensor(_) => SkipReason::UnknownSensor,
            Skip::UnsupportedTypeForSensor { .. } => SkipReason::UnsupportedTypeForSensor,
        }
    }
}

/// Decodes one raw message and validates it against the catalog.
pub fn map_message(catalog: &Catalog, raw: &[u8]) -> Result<NewMeasurement, Skip> {
    let json: Value =
        serde_json::from_slice(raw).map_err(|e| Skip::MalformedMessage(e.to_string()))?;

    // Error messages are ignored whatever else they carry.
    if json.get("type").and_then(Value::as_str) == Some(ERROR_MESSAGE_TYPE) {
        return Err(Skip::ErrorMessage);
    }

    let message: TelemetryMessage =
        serde_json::from_value(json).map_err(|e| Skip::MalformedMessage(e.to_string()))?;

    map_telemetry(catalog, message)
}

pub fn map_telemetry(
    catalog: &Catalog,
    message: TelemetryMessage,
) -> Result<NewMeasurement, Skip> {
    if message.r#type == ERROR_MESSAGE_TYPE {
        return Err(Skip::ErrorMessage);
    }

    let Some(mtype) = catalog.lookup_type(&message.r#type) else {
        return Err(Skip::UnknownMeasurementType(message.r#type));
    };

    let Some(sensor) = catalog.lookup_sensor(message.device_id) else {
        return Err(Skip::UnknownSensor(message.device_id));
    };

    if !sensor.supports(mtype.id) {
        return Err(Skip::UnsupportedTypeForSensor {
            sensor_id: sensor.id,
            mtype: message.r#type,
        });
    }

    let Some(value) = message.value else {
        return Err(Skip::MalformedMessage(format!(
            "'{}' message from device '{}' has no value",
            message.r#type, message.device_id
        )));
    };

    let timestamp = message
        .timestamp
        .unwrap_or_else(|| Utc::now().timestamp());

    Ok(NewMeasurement {
        sensor_id: sensor.id,
        mtype_id: mtype.id,
        timestamp,
        value,
    })
}
