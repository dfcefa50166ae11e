//! Cloud account credentials (`rriot` object) used to open a device connection.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Region references returned by the cloud login.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RriotReference {
    /// REST API base URL
    pub a: String,
    /// MQTT broker URL, e.g. `ssl://mqtt-eu-3.example.com:8883`
    #[serde(default)]
    pub m: Option<String>,
    /// Region label
    #[serde(default)]
    pub l: Option<String>,
}

/// Per-account secret material.
///
/// Field names follow the JSON the cloud hands out; `Debug` redacts the secrets.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RriotCredentials {
    /// Account identifier, used as the channel realm
    pub u: String,
    /// MQTT secret
    pub s: String,
    /// HMAC key
    pub h: String,
    /// Account key
    pub k: String,
    pub r: RriotReference,
}

/// Broker address parsed from [`RriotReference::m`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttEndpoint {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl RriotCredentials {
    /// Build credentials from a loosely-typed JSON value, naming the first
    /// missing field in the error.
    pub fn from_value(value: &Value) -> Result<Self> {
        if !value.is_object() {
            return Err(Error::credentials("rriot must be an object"));
        }
        if let Some(field) = Self::missing_field(value) {
            return Err(Error::credentials(format!("'{field}'")));
        }
        let creds: Self = serde_json::from_value(value.clone())
            .map_err(|e| Error::credentials(e.to_string()))?;
        creds.validate()?;
        Ok(creds)
    }

    /// First required key absent from a credentials object, if any.
    pub fn missing_field(value: &Value) -> Option<&'static str> {
        ["u", "s", "h", "k", "r"]
            .into_iter()
            .find(|field| value.get(*field).is_none())
            .or_else(|| value["r"].get("a").is_none().then_some("a"))
    }

    /// Reject credentials that can never produce a connection.
    pub fn validate(&self) -> Result<()> {
        if self.u.is_empty() {
            return Err(Error::credentials("'u' is empty"));
        }
        if self.s.is_empty() {
            return Err(Error::credentials("'s' is empty"));
        }
        if self.k.is_empty() {
            return Err(Error::credentials("'k' is empty"));
        }
        self.mqtt_endpoint().map(|_| ())
    }

    /// Parse the broker URL out of the region reference.
    pub fn mqtt_endpoint(&self) -> Result<MqttEndpoint> {
        let url = self
            .r
            .m
            .as_deref()
            .filter(|m| !m.is_empty())
            .ok_or_else(|| Error::credentials("missing MQTT url 'r.m'"))?;

        let (tls, rest) = if let Some(rest) = url.strip_prefix("ssl://") {
            (true, rest)
        } else if let Some(rest) = url.strip_prefix("mqtts://") {
            (true, rest)
        } else if let Some(rest) = url.strip_prefix("tcp://") {
            (false, rest)
        } else if let Some(rest) = url.strip_prefix("mqtt://") {
            (false, rest)
        } else {
            return Err(Error::credentials(format!("unsupported MQTT url: {url}")));
        };

        let rest = rest.trim_end_matches('/');
        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse()
                    .map_err(|_| Error::credentials(format!("bad MQTT port in {url}")))?;
                (host, port)
            }
            None => (rest, if tls { 8883 } else { 1883 }),
        };
        if host.is_empty() {
            return Err(Error::credentials(format!("missing MQTT host in {url}")));
        }

        Ok(MqttEndpoint {
            host: host.to_string(),
            port,
            tls,
        })
    }
}

impl std::fmt::Debug for RriotCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RriotCredentials")
            .field("u", &self.u)
            .field("s", &"<redacted>")
            .field("h", &"<redacted>")
            .field("k", &"<redacted>")
            .field("r", &self.r)
            .finish()
    }
}

impl std::fmt::Debug for RriotReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RriotReference")
            .field("a", &self.a)
            .field("m", &self.m)
            .field("l", &self.l)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "u": "user123",
            "s": "secret",
            "h": "hmac",
            "k": "key",
            "r": { "a": "https://api.example.com", "m": "ssl://mqtt.example.com:8883", "l": "EU" }
        })
    }

    #[test]
    fn test_from_value() {
        let creds = RriotCredentials::from_value(&sample()).unwrap();
        assert_eq!(creds.u, "user123");
        assert_eq!(creds.r.l.as_deref(), Some("EU"));
    }

    #[test]
    fn test_missing_field_is_named() {
        let mut value = sample();
        value.as_object_mut().unwrap().remove("k");
        let err = RriotCredentials::from_value(&value).unwrap_err();
        assert!(err.to_string().contains("'k'"));
        assert_eq!(RriotCredentials::missing_field(&value), Some("k"));

        let mut value = sample();
        value["r"].as_object_mut().unwrap().remove("a");
        assert_eq!(RriotCredentials::missing_field(&value), Some("a"));
        assert_eq!(RriotCredentials::missing_field(&sample()), None);
    }

    #[test]
    fn test_endpoint_parsing() {
        let creds = RriotCredentials::from_value(&sample()).unwrap();
        let ep = creds.mqtt_endpoint().unwrap();
        assert_eq!(ep.host, "mqtt.example.com");
        assert_eq!(ep.port, 8883);
        assert!(ep.tls);

        let mut plain = creds.clone();
        plain.r.m = Some("tcp://localhost".into());
        let ep = plain.mqtt_endpoint().unwrap();
        assert_eq!(ep.port, 1883);
        assert!(!ep.tls);
    }

    #[test]
    fn test_missing_mqtt_url_rejected() {
        let mut value = sample();
        value["r"].as_object_mut().unwrap().remove("m");
        assert!(RriotCredentials::from_value(&value).is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let creds = RriotCredentials::from_value(&sample()).unwrap();
        let text = format!("{:?}", creds);
        assert!(!text.contains("secret"));
        assert!(text.contains("user123"));
    }
}
