use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::parse_node_id;
use crate::wire::lenient::as_u32;

/// Key of the home-region tuple in a config reply.
pub const HOME_REGION_KEY: &str = "region_id";

/// A config-service reply or pushed notice, kept as the raw JSON object.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigReply(pub Map<String, Value>);

/// A sibling metadata node as described by a region tuple
/// `[region_id, ip, port, node_id_hex]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEndpoint {
    pub region_id: u32,
    pub ip: String,
    pub port: u16,
    pub node_id: u32,
}

impl PeerEndpoint {
    pub fn from_tuple(value: &Value) -> Option<Self> {
        let items = value.as_array()?;
        if items.len() < 4 {
            return None;
        }
        let region_id = as_u32(&items[0])?;
        let ip = items[1].as_str()?.to_string();
        let port = u16::try_from(as_u32(&items[2])?).ok()?;
        let node_id = match &items[3] {
            Value::String(s) => parse_node_id(s).ok()?,
            other => as_u32(other)?,
        };
        Some(Self {
            region_id,
            ip,
            port,
            node_id,
        })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

/// Version numbers reported back to a heart-beating client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SiteVersions {
    pub config_version: u32,
    pub client_version: u32,
}

/// Client software package advertised for upgrades.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UpgradePackage {
    pub file_url: String,
    pub file_name: String,
    pub file_md5: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfigQueryBody {
    pub site_id: u32,
}

impl ConfigReply {
    fn text(&self, key: &str) -> String {
        match self.0.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }

    /// Sibling regions that may hold rows for `site_id`.
    pub fn peer_regions(&self, site_id: u32) -> Vec<PeerEndpoint> {
        let Some(Value::Array(keys)) = self.0.get(&site_id.to_string()) else {
            return Vec::new();
        };
        keys.iter()
            .filter_map(|key| {
                let key = match key {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                self.0.get(&key).and_then(PeerEndpoint::from_tuple)
            })
            .collect()
    }

    /// The metadata node currently serving the site.
    pub fn home_region(&self) -> Option<PeerEndpoint> {
        self.0.get(HOME_REGION_KEY).and_then(PeerEndpoint::from_tuple)
    }

    pub fn versions(&self) -> SiteVersions {
        SiteVersions {
            config_version: self.0.get("config_version").and_then(as_u32).unwrap_or(0),
            client_version: self.0.get("client_version").and_then(as_u32).unwrap_or(0),
        }
    }

    pub fn upgrade_package(&self) -> UpgradePackage {
        UpgradePackage {
            file_url: self.text("file_url"),
            file_name: self.text("file_name"),
            file_md5: self.text("file_md5"),
        }
    }
}
