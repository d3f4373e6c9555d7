// Runtime record of one user session's workload.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Registry key: one workload per (user, session).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey {
    pub user: String,
    pub session: String,
}

impl SessionKey {
    pub fn new(user: impl Into<String>, session: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            session: session.into(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.session.is_empty() {
            write!(f, "{}", self.user)
        } else {
            write!(f, "{}/{}", self.user, self.session)
        }
    }
}

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Idle,
    Creating,
    Polling,
    Ready,
    Failed,
    Stopping,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Creating => "creating",
            Self::Polling => "polling",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::Stopping => "stopping",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown phase {0:?}")]
pub struct UnknownPhase(pub String);

impl FromStr for Phase {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "creating" => Ok(Self::Creating),
            "polling" => Ok(Self::Polling),
            "ready" => Ok(Self::Ready),
            "failed" => Ok(Self::Failed),
            "stopping" => Ok(Self::Stopping),
            other => Err(UnknownPhase(other.to_string())),
        }
    }
}

const FIELD_SERVICE_ID: &str = "service_id";
const FIELD_SERVICE_NAME: &str = "service_name";
const FIELD_USER: &str = "user";
const FIELD_SESSION: &str = "session";
const FIELD_PHASE: &str = "phase";
const FIELD_ENDPOINT: &str = "endpoint";
const FIELD_CREATED_AT: &str = "created_at";
const FIELD_LAST_POLLED_AT: &str = "last_polled_at";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadRecord {
    /// Empty until the orchestrator has assigned an id.
    pub service_id: String,
    pub service_name: String,
    pub user: String,
    pub session: String,
    pub phase: Phase,
    pub endpoint: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_polled_at: Option<DateTime<Utc>>,
}

impl WorkloadRecord {
    pub fn new(key: &SessionKey, service_name: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            service_id: String::new(),
            service_name: service_name.into(),
            user: key.user.clone(),
            session: key.session.clone(),
            phase: Phase::Creating,
            endpoint: None,
            created_at,
            last_polled_at: None,
        }
    }

    /// Id when known, otherwise the service name; both are accepted by the
    /// orchestrator API.
    pub fn service_ref(&self) -> &str {
        if self.service_id.is_empty() {
            &self.service_name
        } else {
            &self.service_id
        }
    }

    /// Flat mapping written to the session store.
    pub fn to_fields(&self) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();
        fields.insert(FIELD_SERVICE_ID.to_string(), self.service_id.clone());
        fields.insert(FIELD_SERVICE_NAME.to_string(), self.service_name.clone());
        fields.insert(FIELD_USER.to_string(), self.user.clone());
        fields.insert(FIELD_SESSION.to_string(), self.session.clone());
        fields.insert(FIELD_PHASE.to_string(), self.phase.to_string());
        if let Some(endpoint) = &self.endpoint {
            fields.insert(FIELD_ENDPOINT.to_string(), endpoint.clone());
        }
        fields.insert(FIELD_CREATED_AT.to_string(), self.created_at.to_rfc3339());
        if let Some(polled) = &self.last_polled_at {
            fields.insert(FIELD_LAST_POLLED_AT.to_string(), polled.to_rfc3339());
        }
        fields
    }

    /// Inverse of [`to_fields`](Self::to_fields). Returns `None` when a
    /// required field is missing or malformed.
    pub fn from_fields(fields: &BTreeMap<String, String>) -> Option<Self> {
        let parse_time = |s: &String| {
            DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|t| t.with_timezone(&Utc))
        };

        Some(Self {
            service_id: fields.get(FIELD_SERVICE_ID).cloned().unwrap_or_default(),
            service_name: fields.get(FIELD_SERVICE_NAME)?.clone(),
            user: fields.get(FIELD_USER)?.clone(),
            session: fields.get(FIELD_SESSION).cloned().unwrap_or_default(),
            phase: fields.get(FIELD_PHASE)?.parse().ok()?,
            endpoint: fields.get(FIELD_ENDPOINT).cloned(),
            created_at: parse_time(fields.get(FIELD_CREATED_AT)?)?,
            last_polled_at: fields.get(FIELD_LAST_POLLED_AT).and_then(parse_time),
        })
    }
}
