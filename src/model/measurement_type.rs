use serde::{Deserialize, Serialize};

use crate::model::MeasurementTypeId;

/// Name of the control message type devices emit on failure. It never maps to
/// a stored measurement type.
pub const ERROR_MESSAGE_TYPE: &str = "Error";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementType {
    pub id: MeasurementTypeId,

    pub name: String,
}
