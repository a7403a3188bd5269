/*!
 * Manual Proximity Sensor
 * Sensor feed driven by explicit reports, for hosts without hardware
 */

use super::traits::{ProximityCallback, ProximitySensor};
use crate::core::errors::{PowerError, PowerResult};
use ahash::RandomState;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct ManualProximitySensor {
    subscribers: Arc<RwLock<HashMap<String, ProximityCallback, RandomState>>>,
}

impl ManualProximitySensor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a reading to every subscriber
    pub fn report(&self, close: bool) {
        let callbacks: Vec<ProximityCallback> = self.subscribers.read().values().cloned().collect();
        for callback in callbacks {
            callback(close);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl ProximitySensor for ManualProximitySensor {
    fn subscribe(&self, subscriber: &str, callback: ProximityCallback) -> PowerResult<()> {
        self.subscribers.write().insert(subscriber.to_string(), callback);
        Ok(())
    }

    fn unsubscribe(&self, subscriber: &str) -> PowerResult<()> {
        self.subscribers
            .write()
            .remove(subscriber)
            .map(|_| ())
            .ok_or_else(|| PowerError::Sensor(format!("{} is not subscribed", subscriber)))
    }
}
