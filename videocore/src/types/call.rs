use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifies a call as `type:id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallIdentity {
    #[serde(rename = "type")]
    call_type: String,
    id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallIdentityError {
    #[error("call cid must look like `type:id`, got `{0}`")]
    Malformed(String),
}

impl CallIdentity {
    pub fn new(call_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            call_type: call_type.into(),
            id: id.into(),
        }
    }

    pub fn call_type(&self) -> &str {
        &self.call_type
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn cid(&self) -> String {
        format!("{}:{}", self.call_type, self.id)
    }
}

impl fmt::Display for CallIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.call_type, self.id)
    }
}

impl FromStr for CallIdentity {
    type Err = CallIdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((call_type, id)) if !call_type.is_empty() && !id.is_empty() => {
                Ok(Self::new(call_type, id))
            }
            _ => Err(CallIdentityError::Malformed(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// A member of a call as seen by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CallUser {
    pub user_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CallDetails {
    #[serde(default)]
    pub member_user_ids: Vec<String>,
    #[serde(default)]
    pub members: HashMap<String, CallUser>,
    #[serde(default)]
    pub ring: bool,
    #[serde(default)]
    pub owner_user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Fields shared by every state of an active call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallInfo {
    pub call: CallIdentity,
    pub created_by_user_id: String,
    #[serde(default)]
    pub broadcasting_enabled: bool,
    #[serde(default)]
    pub recording_enabled: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub users: HashMap<String, CallUser>,
    #[serde(default)]
    pub call_details: CallDetails,
    #[serde(default)]
    pub custom: BTreeMap<String, serde_json::Value>,
}

impl CallInfo {
    pub fn new(call: CallIdentity, created_by_user_id: impl Into<String>) -> Self {
        Self {
            call,
            created_by_user_id: created_by_user_id.into(),
            broadcasting_enabled: false,
            recording_enabled: false,
            created_at: None,
            updated_at: None,
            users: HashMap::new(),
            call_details: CallDetails::default(),
            custom: BTreeMap::new(),
        }
    }

    /// Members other than the creator.
    pub fn callees(&self) -> impl Iterator<Item = &str> {
        self.users
            .keys()
            .map(String::as_str)
            .filter(move |id| *id != self.created_by_user_id)
    }
}

/// Partial update of [`CallInfo`]. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallInfoPatch {
    pub broadcasting_enabled: Option<bool>,
    pub recording_enabled: Option<bool>,
    pub updated_at: Option<DateTime<Utc>>,
    pub users: Option<HashMap<String, CallUser>>,
    pub call_details: Option<CallDetails>,
    pub custom: Option<BTreeMap<String, serde_json::Value>>,
}

impl CallInfoPatch {
    pub fn apply_to(&self, info: &CallInfo) -> CallInfo {
        let mut next = info.clone();
        if let Some(v) = self.broadcasting_enabled {
            next.broadcasting_enabled = v;
        }
        if let Some(v) = self.recording_enabled {
            next.recording_enabled = v;
        }
        if let Some(v) = self.updated_at {
            next.updated_at = Some(v);
        }
        if let Some(v) = &self.users {
            next.users = v.clone();
        }
        if let Some(v) = &self.call_details {
            next.call_details = v.clone();
        }
        if let Some(v) = &self.custom {
            next.custom = v.clone();
        }
        next
    }
}
