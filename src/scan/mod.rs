mod lights;
mod sensors;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::bridge::BridgeClient;
use crate::metrics::MetricSink;

pub use lights::project_lights;
pub use sensors::{ButtonEvent, SensorScanner};

/// Boolean device state as exported gauge value.
pub(crate) const fn gauge_value(flag: bool) -> f64 {
    if flag { 1.0 } else { 0.0 }
}

/// The background poll driver. Owns the sensor scanner, so exactly one
/// instance must run per observed sensor set.
pub struct Poller<C, S> {
    client: C,
    sink: Arc<S>,
    interval: Duration,
    sensors: SensorScanner,
}

impl<C: BridgeClient, S: MetricSink> Poller<C, S> {
    pub fn new(client: C, sink: Arc<S>, interval: Duration) -> Self {
        Self {
            client,
            sink,
            interval,
            sensors: SensorScanner::new(),
        }
    }

    /// Run one poll cycle. A failure in one category is reported and does
    /// not suppress the other: light metrics simply keep their previous
    /// values until the next successful cycle.
    pub async fn scan_cycle(&mut self) {
        match self.client.lights().await {
            Ok(lights) => project_lights(&lights, self.sink.as_ref()),
            Err(err) => log::error!("Light scan failed: {err}"),
        }

        match self.client.sensors().await {
            Ok(records) => self.sensors.absorb(&records, self.sink.as_ref()),
            Err(err) => log::error!("Sensor scan failed: {err}"),
        }
    }

    /// Poll until shutdown is signaled. The signal is only checked at the
    /// sleep boundary: an in-flight cycle runs to completion, so the sensor
    /// set never ends up inconsistent with the published metrics.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        loop {
            self.scan_cycle().await;

            tokio::select! {
                () = tokio::time::sleep(self.interval) => {}
                _ = shutdown.changed() => {
                    log::info!("Poll loop stopping");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::bridge::{BridgeClient, LightRecord, SensorRecord};
    use crate::error::{ApiError, ApiResult};
    use crate::metrics::testing::RecordingSink;
    use crate::metrics::{DeviceLabels, GaugeKind};

    use super::Poller;

    struct FixedBridge {
        lights: ApiResult<Vec<LightRecord>>,
        sensors: ApiResult<Vec<SensorRecord>>,
    }

    #[async_trait]
    impl BridgeClient for FixedBridge {
        async fn lights(&self) -> ApiResult<Vec<LightRecord>> {
            match &self.lights {
                Ok(lights) => Ok(lights.clone()),
                Err(_) => Err(ApiError::bridge_error("lights unavailable")),
            }
        }

        async fn sensors(&self) -> ApiResult<Vec<SensorRecord>> {
            match &self.sensors {
                Ok(sensors) => Ok(sensors.clone()),
                Err(_) => Err(ApiError::bridge_error("sensors unavailable")),
            }
        }
    }

    #[tokio::test]
    async fn failing_lights_do_not_suppress_sensors() {
        let sink = Arc::new(RecordingSink::new());
        let bridge = FixedBridge {
            lights: Err(ApiError::bridge_error("down")),
            sensors: Ok(vec![
                serde_json::from_value(json!({
                    "name": "Switch",
                    "uniqueid": "id-s",
                    "state": { "lastupdated": "2024-01-01T12:00:00" },
                    "config": { "on": true, "reachable": true },
                }))
                .unwrap(),
            ]),
        };

        let mut poller = Poller::new(bridge, sink.clone(), Duration::from_millis(10));
        poller.scan_cycle().await;

        let labels = DeviceLabels::new("Switch", "id-s");
        assert!(sink.gauge(GaugeKind::SensorLastUpdated, &labels).is_some());
    }

    #[tokio::test]
    async fn failing_sensors_do_not_suppress_lights() {
        let sink = Arc::new(RecordingSink::new());
        let bridge = FixedBridge {
            lights: Ok(vec![
                serde_json::from_value(json!({
                    "name": "Hallway",
                    "uniqueid": "id-h",
                    "state": { "on": true, "reachable": true },
                }))
                .unwrap(),
            ]),
            sensors: Err(ApiError::bridge_error("down")),
        };

        let mut poller = Poller::new(bridge, sink.clone(), Duration::from_millis(10));
        poller.scan_cycle().await;

        let labels = DeviceLabels::new("Hallway", "id-h");
        assert_eq!(sink.gauge(GaugeKind::LightOn, &labels), Some(1.0));
    }
}
