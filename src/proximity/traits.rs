/*!
 * Proximity Traits
 * Sensor feed abstraction delivering a near/far signal
 */

use crate::core::errors::PowerResult;
use std::sync::Arc;

/// Receives `true` when an object is near, `false` when it moves away
pub type ProximityCallback = Arc<dyn Fn(bool) + Send + Sync>;

/// Proximity sensor feed
pub trait ProximitySensor: Send + Sync {
    /// Start delivering readings to `callback`
    fn subscribe(&self, subscriber: &str, callback: ProximityCallback) -> PowerResult<()>;

    /// Stop delivering readings
    fn unsubscribe(&self, subscriber: &str) -> PowerResult<()>;
}
