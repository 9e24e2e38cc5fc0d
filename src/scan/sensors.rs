use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde_json::{Map, Value};

use crate::bridge::SensorRecord;
use crate::metrics::{DeviceLabels, GaugeKind, MetricSink};

use super::gauge_value;

/// Timestamp format used by the bridge, UTC at second resolution.
const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Sentinel the bridge reports for a sensor that has never updated.
const NO_UPDATE: &str = "none";

/// What we believe about one sensor right now. Rebuilt wholesale from the
/// raw record every cycle; the previous cycle's copy is only consulted for
/// transition detection.
#[derive(Clone, Debug, PartialEq)]
pub struct SensorObservation {
    labels: DeviceLabels,
    last_updated: Option<NaiveDateTime>,
    button_event: Option<i64>,
    on: Option<bool>,
    reachable: Option<bool>,
}

/// A decoded button event code.
///
/// Hue dimmer switches encode the button number in the high bits and the
/// gesture in the two low bits: bit 0 is the long-press flag, bit 1 the
/// release flag.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ButtonEvent {
    pub button_id: i64,
    pub long_press: bool,
    pub released: bool,
}

impl ButtonEvent {
    #[must_use]
    pub const fn decode(code: i64) -> Self {
        Self {
            button_id: code & !3,
            long_press: code & 1 != 0,
            released: code & 2 != 0,
        }
    }
}

fn parse_last_updated(name: &str, state: &Map<String, Value>) -> Option<NaiveDateTime> {
    let raw = state.get("lastupdated")?;
    let Some(raw) = raw.as_str() else {
        log::error!("Sensor {name:?}: unable to read lastupdated {raw} as string");
        return None;
    };

    if raw == NO_UPDATE {
        return None;
    }

    match NaiveDateTime::parse_from_str(raw, TIME_FORMAT) {
        Ok(ts) => Some(ts),
        Err(err) => {
            log::error!("Sensor {name:?}: unable to parse lastupdated {raw:?}: {err}");
            None
        }
    }
}

/// The bridge transports the event code as a json number; narrow it to an
/// integer, rejecting anything that would lose precision. Absence means "no
/// button", never zero: zero is a legitimate code (button 0, short press).
#[allow(clippy::cast_possible_truncation)]
fn parse_button_event(name: &str, state: &Map<String, Value>) -> Option<i64> {
    let raw = state.get("buttonevent")?;

    if let Some(code) = raw.as_i64() {
        return Some(code);
    }
    if let Some(float) = raw.as_f64() {
        if float.fract() == 0.0 && float.abs() < 9_007_199_254_740_992.0 {
            return Some(float as i64);
        }
    }

    log::error!("Sensor {name:?}: unable to read buttonevent {raw} as integer");
    None
}

fn parse_flag(name: &str, key: &str, config: &Map<String, Value>) -> Option<bool> {
    let raw = config.get(key)?;
    let Some(flag) = raw.as_bool() else {
        log::error!("Sensor {name:?}: unable to read config {key} {raw} as bool");
        return None;
    };
    Some(flag)
}

fn set_or_clear(sink: &(impl MetricSink + ?Sized), kind: GaugeKind, obs: &SensorObservation, value: Option<f64>) {
    match value {
        Some(value) => sink.set_gauge(kind, &obs.labels, value),
        None => sink.clear_gauge(kind, &obs.labels),
    }
}

/// Publish the current-value gauges for one sensor. An unknown field clears
/// its gauge: exporting no series beats exporting a wrong value.
#[allow(clippy::cast_precision_loss)]
fn publish(obs: &SensorObservation, sink: &(impl MetricSink + ?Sized)) {
    set_or_clear(
        sink,
        GaugeKind::SensorLastUpdated,
        obs,
        obs.last_updated
            .map(|ts| ts.and_utc().timestamp_micros() as f64),
    );
    set_or_clear(
        sink,
        GaugeKind::SensorButtonEvent,
        obs,
        obs.button_event.map(|code| code as f64),
    );
    set_or_clear(sink, GaugeKind::SensorOn, obs, obs.on.map(gauge_value));
    set_or_clear(
        sink,
        GaugeKind::SensorReachable,
        obs,
        obs.reachable.map(gauge_value),
    );
}

/// Compare one sensor against its previous observation and publish a click
/// if a button was just released. Press and hold transitions are logged but
/// never counted, so a press-then-release pair counts as one click.
fn detect_release(
    old: &SensorObservation,
    new: &SensorObservation,
    sink: &(impl MetricSink + ?Sized),
) {
    if old.last_updated == new.last_updated && old.button_event == new.button_event {
        return;
    }

    log::info!(
        "Sensor {:?} [{}] triggered, button: {:?}",
        new.labels.name,
        new.labels.uniqueid,
        new.button_event
    );

    let Some(code) = new.button_event else {
        return;
    };

    let event = ButtonEvent::decode(code);
    if event.released {
        sink.inc_button_release(&new.labels, event.button_id);
    } else {
        log::debug!(
            "Sensor {:?} [{}] button {} pressed (long: {})",
            new.labels.name,
            new.labels.uniqueid,
            event.button_id,
            event.long_press
        );
    }
}

/// The sensor diff engine. Holds the only state that survives across poll
/// cycles: the map of last-observed sensors, keyed by identity.
#[derive(Default)]
pub struct SensorScanner {
    sensors: HashMap<String, SensorObservation>,
}

impl SensorScanner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb one snapshot: publish gauges for every sensor present, detect
    /// button releases against the previous snapshot, evict everything that
    /// disappeared, then swap in the new map.
    pub fn absorb(&mut self, records: &[SensorRecord], sink: &(impl MetricSink + ?Sized)) {
        let mut next = HashMap::with_capacity(records.len());

        for record in records {
            /* identity is the diff key; a sensor without one cannot be
             * tracked across cycles */
            let Some(uniqueid) = record.uniqueid.as_deref() else {
                log::debug!("Sensor {:?} has no uniqueid, skipping", record.name);
                continue;
            };

            let obs = SensorObservation {
                labels: DeviceLabels::new(&record.name, uniqueid),
                last_updated: parse_last_updated(&record.name, &record.state),
                button_event: parse_button_event(&record.name, &record.state),
                on: parse_flag(&record.name, "on", &record.config),
                reachable: parse_flag(&record.name, "reachable", &record.config),
            };

            publish(&obs, sink);

            if let Some(old) = self.sensors.get(uniqueid) {
                detect_release(old, &obs, sink);
            }

            if next.insert(uniqueid.to_string(), obs).is_some() {
                log::warn!("Duplicate sensor uniqueid [{uniqueid}] in snapshot");
            }
        }

        /* eviction runs after every current sensor has been published, so a
         * sensor can never be momentarily dropped mid-cycle */
        for (uniqueid, old) in &self.sensors {
            if !next.contains_key(uniqueid) {
                log::info!("Sensor {:?} [{uniqueid}] removed", old.labels.name);
                for kind in [
                    GaugeKind::SensorLastUpdated,
                    GaugeKind::SensorButtonEvent,
                    GaugeKind::SensorOn,
                    GaugeKind::SensorReachable,
                ] {
                    sink.clear_gauge(kind, &old.labels);
                }
                /* the click counter is cumulative history and survives
                 * disappearance on purpose */
            }
        }

        self.sensors = next;
    }

    /// Number of sensors currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }
}
