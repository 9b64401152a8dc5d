//! Docker volume plugin protocol payloads.
//!
//! The daemon POSTs one JSON object per call to `/VolumeDriver.<Method>` and
//! expects a JSON object back.  Field names are Pascal-cased on the wire.
//! Every response may carry an `Err` string; an empty or absent `Err` means
//! success.
//!
//! See <https://docs.docker.com/engine/extend/plugins_volume/>.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::{Capabilities, VolumeInfo};

/// Content type used for every plugin response.
pub const PLUGIN_CONTENT_TYPE: &str = "application/vnd.docker.plugins.v1.1+json";

/// `/VolumeDriver.Create` request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateRequest {
    #[serde(rename = "Name")]
    pub name: String,
    /// Options from `docker volume create -o key=value`.  Docker sends
    /// `null` when none were given.
    #[serde(rename = "Opts", default, deserialize_with = "null_as_empty")]
    pub options: HashMap<String, String>,
}

/// Request naming a single volume: Get, Remove and Path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NameRequest {
    #[serde(rename = "Name")]
    pub name: String,
}

/// `/VolumeDriver.Mount` and `/VolumeDriver.Unmount` request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MountRequest {
    #[serde(rename = "Name")]
    pub name: String,
    /// Caller identity.  Only logged: a volume has a single mount slot.
    #[serde(rename = "ID", default)]
    pub id: String,
}

/// Wire form of a volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeEntry {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Mountpoint", default)]
    pub mountpoint: PathBuf,
    #[serde(rename = "Status", default, skip_serializing_if = "Option::is_none")]
    pub status: Option<HashMap<String, String>>,
}

impl From<VolumeInfo> for VolumeEntry {
    fn from(info: VolumeInfo) -> Self {
        Self {
            name: info.name,
            mountpoint: info.mountpoint,
            status: None,
        }
    }
}

/// Top-level response envelope.
///
/// Only the fields relevant to the method are set; the rest are omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(rename = "Implements", default, skip_serializing_if = "Option::is_none")]
    pub implements: Option<Vec<String>>,
    #[serde(rename = "Mountpoint", default, skip_serializing_if = "Option::is_none")]
    pub mountpoint: Option<PathBuf>,
    #[serde(rename = "Volume", default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<VolumeEntry>,
    #[serde(rename = "Volumes", default, skip_serializing_if = "Option::is_none")]
    pub volumes: Option<Vec<VolumeEntry>>,
    #[serde(rename = "Capabilities", default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Capabilities>,
    #[serde(rename = "Err", default, skip_serializing_if = "String::is_empty")]
    pub err: String,
}

impl Response {
    /// `/Plugin.Activate` handshake.
    pub fn activate() -> Self {
        Self {
            implements: Some(vec!["VolumeDriver".to_owned()]),
            ..Default::default()
        }
    }

    pub fn error(err: impl ToString) -> Self {
        Self {
            err: err.to_string(),
            ..Default::default()
        }
    }

    pub fn mountpoint(path: PathBuf) -> Self {
        Self {
            mountpoint: Some(path),
            ..Default::default()
        }
    }

    pub fn volume(info: VolumeInfo) -> Self {
        Self {
            volume: Some(VolumeEntry {
                status: Some(HashMap::new()),
                ..VolumeEntry::from(info)
            }),
            ..Default::default()
        }
    }

    pub fn volumes(infos: Vec<VolumeInfo>) -> Self {
        Self {
            volumes: Some(infos.into_iter().map(VolumeEntry::from).collect()),
            ..Default::default()
        }
    }

    pub fn capabilities(caps: Capabilities) -> Self {
        Self {
            capabilities: Some(caps),
            ..Default::default()
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<HashMap<String, String>>::deserialize(deserializer)?.unwrap_or_default())
}
