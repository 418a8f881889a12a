use anyhow::{Context as _, Result};
use indexmap::IndexMap;

use crate::{
    api::StorageApi,
    model::{MeasurementType, Sensor, SensorId},
};

/// Read-only snapshot of the measurement types and sensors known to the
/// Storage API.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    types_by_name: IndexMap<String, MeasurementType>,

    sensors_by_id: IndexMap<SensorId, Sensor>,
}

impl Catalog {
    pub fn from_parts(
        types: impl IntoIterator<Item = MeasurementType>,
        sensors: impl IntoIterator<Item = Sensor>,
    ) -> Self {
        let types_by_name = types.into_iter().map(|t| (t.name.clone(), t)).collect();
        let sensors_by_id = sensors.into_iter().map(|s| (s.id, s)).collect();

        Self {
            types_by_name,
            sensors_by_id,
        }
    }

    /// Fetches both collections. Either fetch failing fails the whole load.
    pub async fn load<A: StorageApi>(api: &A) -> Result<Self> {
        let types = api
            .get_measurement_types()
            .await
            .context("failed to get measurement types")?;

        let sensors = api.get_sensors().await.context("failed to get sensors")?;

        Ok(Self::from_parts(types, sensors))
    }

    pub fn lookup_type(&self, name: &str) -> Option<&MeasurementType> {
        self.types_by_name.get(name)
    }

    pub fn lookup_sensor(&self, id: SensorId) -> Option<&Sensor> {
        self.sensors_by_id.get(&id)
    }

    pub fn type_count(&self) -> usize {
        self.types_by_name.len()
    }

    pub fn sensor_count(&self) -> usize {
        self.sensors_by_id.len()
    }

    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types_by_name.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
