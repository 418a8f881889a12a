mod ids;
mod measurement;
mod measurement_type;
mod sensor;

pub use ids::*;
pub use measurement::*;
pub use measurement_type::*;
pub use sensor::*;
