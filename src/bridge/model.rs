use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One entry from the N-UPnP discovery endpoint.
#[derive(Clone, Debug, Deserialize)]
pub struct DiscoveryRecord {
    pub id: String,
    pub internalipaddress: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LightState {
    pub on: bool,
    pub reachable: bool,
}

/// A light as reported by `GET /api/{user}/lights`.
///
/// The v1 api carries many more fields (swversion, modelid, capabilities..);
/// only the ones projected as metrics are kept.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LightRecord {
    pub name: String,
    pub uniqueid: String,
    pub state: LightState,
}

/// A sensor as reported by `GET /api/{user}/sensors`.
///
/// `state` and `config` stay loosely typed on the wire: their contents vary
/// per sensor type, and the interesting fields are extracted once, at the
/// scanner boundary.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SensorRecord {
    pub name: String,
    /// Absent on virtual sensors, e.g. the built-in Daylight sensor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uniqueid: Option<String>,
    #[serde(default)]
    pub state: Map<String, Value>,
    #[serde(default)]
    pub config: Map<String, Value>,
}

/// Reply items for `POST /api` (user creation).
#[derive(Debug, Deserialize)]
pub struct HueError {
    #[serde(rename = "type")]
    pub error_type: u32,
    pub address: String,
    pub description: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HueApiResult<T> {
    Success(T),
    Error(HueError),
}

#[derive(Debug, Deserialize)]
pub struct NewUserReply {
    pub username: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{LightRecord, SensorRecord};

    #[test]
    fn deserialize_light_record() {
        let light: LightRecord = serde_json::from_value(json!({
            "state": {
                "on": true,
                "bri": 254,
                "alert": "select",
                "mode": "homeautomation",
                "reachable": false
            },
            "type": "Dimmable light",
            "name": "Hallway",
            "modelid": "LWB010",
            "uniqueid": "00:17:88:01:02:03:04:05-0b"
        }))
        .unwrap();

        assert_eq!(light.name, "Hallway");
        assert_eq!(light.uniqueid, "00:17:88:01:02:03:04:05-0b");
        assert!(light.state.on);
        assert!(!light.state.reachable);
    }

    #[test]
    fn deserialize_dimmer_switch_sensor() {
        let sensor: SensorRecord = serde_json::from_value(json!({
            "state": {
                "buttonevent": 4002,
                "lastupdated": "2024-01-01T12:00:00"
            },
            "config": {
                "on": true,
                "reachable": true,
                "battery": 100
            },
            "name": "Bedroom switch",
            "type": "ZLLSwitch",
            "modelid": "RWL021",
            "uniqueid": "00:17:88:01:10:20:30:40-02-fc00"
        }))
        .unwrap();

        assert_eq!(sensor.name, "Bedroom switch");
        assert_eq!(
            sensor.uniqueid.as_deref(),
            Some("00:17:88:01:10:20:30:40-02-fc00")
        );
        assert_eq!(sensor.state["buttonevent"], 4002);
        assert_eq!(sensor.state["lastupdated"], "2024-01-01T12:00:00");
        assert_eq!(sensor.config["on"], true);
    }

    #[test]
    fn deserialize_daylight_sensor_without_uniqueid() {
        let sensor: SensorRecord = serde_json::from_value(json!({
            "state": {
                "daylight": null,
                "lastupdated": "none"
            },
            "config": {
                "on": true,
                "configured": false
            },
            "name": "Daylight",
            "type": "Daylight",
            "modelid": "PHDL00"
        }))
        .unwrap();

        assert!(sensor.uniqueid.is_none());
        assert_eq!(sensor.state["lastupdated"], "none");
    }
}
