use serde::{Deserialize, Serialize};

use crate::model::{MeasurementTypeId, SensorId};

/// Body of a measurement submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMeasurement {
    pub sensor_id: SensorId,

    pub mtype_id: MeasurementTypeId,

    pub timestamp: i64,

    pub value: f64,
}

/// A measurement as stored by the Storage API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub id: i64,

    pub sensor_id: SensorId,

    pub mtype_id: MeasurementTypeId,

    pub timestamp: i64,

    pub value: f64,
}
