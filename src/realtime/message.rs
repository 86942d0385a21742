//! Wire schema for the realtime database protocol.
//!
//! Field names are the abbreviated ones the backend speaks (`t`, `d`, `a`,
//! `r`, `b`, ...). Every body and query field is optional and skipped when
//! absent, so an omitted field never turns into a default value on the wire.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Message type for all request/response and push traffic.
pub const DATA_MESSAGE: &str = "d";

/// Response status for a successful request.
pub const STATUS_OK: &str = "ok";

/// In-band status the backend uses to report that the credential expired.
pub const STATUS_EXPIRED_TOKEN: &str = "expired_token";

/// Outbound and inbound message actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Query a path (`q`).
    Query,
    /// Authenticate the session with a credential (`auth`).
    Auth,
    /// Unsolicited data push overwriting a location (`d`).
    Put,
    /// Unsolicited data push merging into a location (`m`).
    Merge,
}

impl Action {
    /// Wire representation of this action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Query => "q",
            Action::Auth => "auth",
            Action::Put => "d",
            Action::Merge => "m",
        }
    }

    /// Parse a wire action, returning `None` for actions this client ignores.
    pub fn from_wire(action: &str) -> Option<Self> {
        match action {
            "q" => Some(Action::Query),
            "auth" => Some(Action::Auth),
            "d" => Some(Action::Put),
            "m" => Some(Action::Merge),
            _ => None,
        }
    }

    /// Whether this action marks an unsolicited push.
    pub fn is_push(&self) -> bool {
        matches!(self, Action::Put | Action::Merge)
    }
}

/// Top-level envelope: `{"t": <type>, "d": <payload>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "t")]
    pub kind: String,
    #[serde(rename = "d", default, skip_serializing_if = "Option::is_none")]
    pub data: Option<MessageData>,
}

impl Message {
    /// Build an outbound data request.
    pub fn request(request_id: u64, action: Action, body: Body) -> Self {
        Self {
            kind: DATA_MESSAGE.to_string(),
            data: Some(MessageData {
                action: Some(action.as_str().to_string()),
                request_id: Some(request_id),
                body,
            }),
        }
    }

    /// Whether this is request/response or push traffic.
    pub fn is_data(&self) -> bool {
        self.kind == DATA_MESSAGE
    }
}

/// Payload of a data message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageData {
    #[serde(rename = "a", default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Present on request/response traffic, absent on pushes.
    #[serde(rename = "r", default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
    #[serde(rename = "b", default)]
    pub body: Body,
}

/// Sparse message body. Which fields are set depends on the direction and
/// purpose of the message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Body {
    /// Query path.
    #[serde(rename = "p", default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Query parameters.
    #[serde(rename = "q", default, skip_serializing_if = "Option::is_none")]
    pub query: Option<QueryParams>,
    /// Query subtype marker.
    #[serde(rename = "t", default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<i64>,
    /// Credential for auth requests.
    #[serde(rename = "cred", default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
    /// Response status.
    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Opaque response or push payload.
    #[serde(rename = "d", default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Body {
    /// Body of an outbound query.
    pub fn query(path: impl Into<String>, params: QueryParams) -> Self {
        Self {
            path: Some(path.into()),
            query: Some(params),
            subtype: Some(1),
            ..Self::default()
        }
    }

    /// Body of an outbound auth request.
    pub fn auth(credential: impl Into<String>) -> Self {
        Self {
            credential: Some(credential.into()),
            ..Self::default()
        }
    }

    /// Body handed to a caller when a streaming read completes: the
    /// terminator's status plus every buffered push payload, in arrival order.
    pub fn streamed(terminator: Body, pushes: Vec<Body>) -> Self {
        let payloads = pushes
            .into_iter()
            .map(|push| push.data.unwrap_or(Value::Null))
            .collect();

        Self {
            status: terminator.status,
            data: Some(Value::Array(payloads)),
            ..Self::default()
        }
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn is_ok(&self) -> bool {
        self.status() == Some(STATUS_OK)
    }

    pub fn is_expired_token(&self) -> bool {
        self.status() == Some(STATUS_EXPIRED_TOKEN)
    }

    /// Fold the payload into a single keyed object.
    ///
    /// A streamed payload (array of push payloads) is merged left to right,
    /// later keys winning. A plain object is returned as-is. Anything else
    /// yields an empty map.
    pub fn merged_data(&self) -> Map<String, Value> {
        match &self.data {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Array(items)) => {
                let mut merged = Map::new();
                for item in items {
                    if let Value::Object(map) = item {
                        merged.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
                    }
                }
                merged
            }
            _ => Map::new(),
        }
    }

    /// `d.auth.user_id` from an auth response.
    pub fn auth_user_id(&self) -> Option<String> {
        self.data
            .as_ref()?
            .get("auth")?
            .get("user_id")?
            .as_str()
            .map(str::to_string)
    }
}

/// Query parameters. Combination validity is the backend's concern.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParams {
    #[serde(rename = "i", default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    #[serde(rename = "sp", default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(rename = "ep", default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(rename = "sn", default, skip_serializing_if = "Option::is_none")]
    pub start_name: Option<String>,
    #[serde(rename = "en", default, skip_serializing_if = "Option::is_none")]
    pub end_name: Option<String>,
    #[serde(rename = "sin", default, skip_serializing_if = "Option::is_none")]
    pub start_inclusive: Option<String>,
    #[serde(rename = "ein", default, skip_serializing_if = "Option::is_none")]
    pub end_inclusive: Option<String>,
    #[serde(rename = "l", default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(rename = "vf", default, skip_serializing_if = "Option::is_none")]
    pub view_from: Option<String>,
}
