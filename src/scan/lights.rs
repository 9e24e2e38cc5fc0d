use crate::bridge::LightRecord;
use crate::metrics::{DeviceLabels, GaugeKind, MetricSink};

use super::gauge_value;

/// Project the current light states as gauges. Lights carry no derived
/// events, so no prior state is consulted: the gauges are idempotent and
/// keyed by identity.
pub fn project_lights(lights: &[LightRecord], sink: &(impl MetricSink + ?Sized)) {
    for light in lights {
        let labels = DeviceLabels::new(&light.name, &light.uniqueid);
        sink.set_gauge(GaugeKind::LightOn, &labels, gauge_value(light.state.on));
        sink.set_gauge(
            GaugeKind::LightReachable,
            &labels,
            gauge_value(light.state.reachable),
        );
    }
}
