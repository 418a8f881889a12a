use serde::{Deserialize, Serialize};

use crate::model::{LocationId, MeasurementTypeId, SensorId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sensor {
    pub id: SensorId,

    pub name: String,

    pub location_id: LocationId,

    /// Measurement types the sensor is enrolled in.
    pub mtypes: Vec<MeasurementTypeId>,
}

impl Sensor {
    pub fn supports(&self, mtype_id: MeasurementTypeId) -> bool {
        self.mtypes.contains(&mtype_id)
    }
}
