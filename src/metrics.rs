use prometheus::{Encoder, GaugeVec, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::ApiResult;

/// Label set shared by every exported series: the mutable display name plus
/// the stable device identity. Identity is what keys the series; the name is
/// along for readability.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct DeviceLabels {
    pub name: String,
    pub uniqueid: String,
}

impl DeviceLabels {
    #[must_use]
    pub fn new(name: impl Into<String>, uniqueid: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uniqueid: uniqueid.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum GaugeKind {
    LightOn,
    LightReachable,
    SensorLastUpdated,
    SensorButtonEvent,
    SensorOn,
    SensorReachable,
}

/// Set-or-delete store for the exported series. The scanner only ever talks
/// to this trait, so tests can swap in a recording fake.
pub trait MetricSink: Send + Sync {
    fn set_gauge(&self, kind: GaugeKind, labels: &DeviceLabels, value: f64);
    fn clear_gauge(&self, kind: GaugeKind, labels: &DeviceLabels);
    fn inc_button_release(&self, labels: &DeviceLabels, button_id: i64);
}

/// Production sink, backed by an explicitly constructed prometheus registry.
pub struct PromSink {
    registry: Registry,
    light_on: GaugeVec,
    light_reachable: GaugeVec,
    sensor_lastupdated: GaugeVec,
    sensor_buttonevent: GaugeVec,
    sensor_on: GaugeVec,
    sensor_reachable: GaugeVec,
    sensor_clicks: IntCounterVec,
}

impl PromSink {
    pub fn new() -> ApiResult<Self> {
        const DEVICE_LABELS: &[&str] = &["name", "uniqueid"];

        let registry = Registry::new();

        let gauge = |name: &str, help: &str| -> ApiResult<GaugeVec> {
            let vec = GaugeVec::new(Opts::new(name, help), DEVICE_LABELS)?;
            registry.register(Box::new(vec.clone()))?;
            Ok(vec)
        };

        let light_on = gauge("hue_light_on", "Is the light set to on on the bridge.")?;
        let light_reachable = gauge("hue_light_reachable", "Is the light reachable.")?;
        let sensor_lastupdated = gauge(
            "hue_sensor_lastupdated",
            "Last update of the sensor, in microseconds since epoch.",
        )?;
        let sensor_buttonevent = gauge(
            "hue_sensor_buttonevent",
            "Raw code of the last button event reported by the sensor.",
        )?;
        let sensor_on = gauge("hue_sensor_on", "Is the sensor enabled on the bridge.")?;
        let sensor_reachable = gauge("hue_sensor_reachable", "Is the sensor reachable.")?;

        let sensor_clicks = IntCounterVec::new(
            Opts::new(
                "hue_sensor_clicks_total",
                "Button release events, per sensor and button.",
            ),
            &["name", "uniqueid", "button"],
        )?;
        registry.register(Box::new(sensor_clicks.clone()))?;

        Ok(Self {
            registry,
            light_on,
            light_reachable,
            sensor_lastupdated,
            sensor_buttonevent,
            sensor_on,
            sensor_reachable,
            sensor_clicks,
        })
    }

    const fn vec(&self, kind: GaugeKind) -> &GaugeVec {
        match kind {
            GaugeKind::LightOn => &self.light_on,
            GaugeKind::LightReachable => &self.light_reachable,
            GaugeKind::SensorLastUpdated => &self.sensor_lastupdated,
            GaugeKind::SensorButtonEvent => &self.sensor_buttonevent,
            GaugeKind::SensorOn => &self.sensor_on,
            GaugeKind::SensorReachable => &self.sensor_reachable,
        }
    }

    /// Render the registry in the text exposition format.
    pub fn render(&self) -> ApiResult<String> {
        let mut buf = vec![];
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

impl MetricSink for PromSink {
    fn set_gauge(&self, kind: GaugeKind, labels: &DeviceLabels, value: f64) {
        self.vec(kind)
            .with_label_values(&[&labels.name, &labels.uniqueid])
            .set(value);
    }

    fn clear_gauge(&self, kind: GaugeKind, labels: &DeviceLabels) {
        /* removing a series that was never set is not an error here */
        let _ = self
            .vec(kind)
            .remove_label_values(&[&labels.name, &labels.uniqueid]);
    }

    fn inc_button_release(&self, labels: &DeviceLabels, button_id: i64) {
        self.sensor_clicks
            .with_label_values(&[&labels.name, &labels.uniqueid, &button_id.to_string()])
            .inc();
    }
}

#[cfg(test)]
pub mod testing {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::{DeviceLabels, GaugeKind, MetricSink};

    /// In-memory sink mirroring the set/delete semantics of the registry.
    #[derive(Default)]
    pub struct RecordingSink {
        gauges: Mutex<HashMap<(GaugeKind, DeviceLabels), f64>>,
        clicks: Mutex<HashMap<(DeviceLabels, i64), u64>>,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn gauge(&self, kind: GaugeKind, labels: &DeviceLabels) -> Option<f64> {
            self.gauges
                .lock()
                .unwrap()
                .get(&(kind, labels.clone()))
                .copied()
        }

        pub fn clicks(&self, labels: &DeviceLabels, button_id: i64) -> u64 {
            self.clicks
                .lock()
                .unwrap()
                .get(&(labels.clone(), button_id))
                .copied()
                .unwrap_or(0)
        }

        pub fn total_clicks(&self) -> u64 {
            self.clicks.lock().unwrap().values().sum()
        }
    }

    impl MetricSink for RecordingSink {
        fn set_gauge(&self, kind: GaugeKind, labels: &DeviceLabels, value: f64) {
            self.gauges
                .lock()
                .unwrap()
                .insert((kind, labels.clone()), value);
        }

        fn clear_gauge(&self, kind: GaugeKind, labels: &DeviceLabels) {
            self.gauges.lock().unwrap().remove(&(kind, labels.clone()));
        }

        fn inc_button_release(&self, labels: &DeviceLabels, button_id: i64) {
            *self
                .clicks
                .lock()
                .unwrap()
                .entry((labels.clone(), button_id))
                .or_insert(0) += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DeviceLabels, GaugeKind, MetricSink, PromSink};

    #[test]
    fn set_then_render_then_clear() {
        let sink = PromSink::new().unwrap();
        let labels = DeviceLabels::new("Hallway", "00:17:88:01:02:03:04:05-0b");

        sink.set_gauge(GaugeKind::LightOn, &labels, 1.0);
        let out = sink.render().unwrap();
        assert!(out.contains("hue_light_on"));
        assert!(out.contains("uniqueid=\"00:17:88:01:02:03:04:05-0b\""));

        sink.clear_gauge(GaugeKind::LightOn, &labels);
        let out = sink.render().unwrap();
        assert!(!out.contains("uniqueid=\"00:17:88:01:02:03:04:05-0b\""));
    }

    #[test]
    fn clear_unknown_series_is_harmless() {
        let sink = PromSink::new().unwrap();
        let labels = DeviceLabels::new("ghost", "never-set");

        sink.clear_gauge(GaugeKind::SensorLastUpdated, &labels);
    }

    #[test]
    fn click_counter_accumulates() {
        let sink = PromSink::new().unwrap();
        let labels = DeviceLabels::new("Switch", "aa:bb");

        sink.inc_button_release(&labels, 1000);
        sink.inc_button_release(&labels, 1000);

        let out = sink.render().unwrap();
        assert!(out.contains("hue_sensor_clicks_total"));
        assert!(out.contains("button=\"1000\""));
        assert!(out.contains("} 2"));
    }
}
