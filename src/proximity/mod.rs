/*!
 * Proximity Module
 * Sensor-driven screen gating for proximity screen-control locks
 */

mod gate;
mod sensor;
pub mod traits;

pub use gate::{ProximityGate, ProximityState};
pub use sensor::ManualProximitySensor;
pub use traits::*;
