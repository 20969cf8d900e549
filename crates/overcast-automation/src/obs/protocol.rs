//! obs-websocket 5.x wire format.
//!
//! Every frame is `{"op": <opcode>, "d": <payload>}`. Only the opcodes the
//! relay needs are modelled; events (op 5) and batches are ignored.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};

use super::error::ObsError;

/// Server greeting.
pub const OP_HELLO: u8 = 0;
/// Client identification.
pub const OP_IDENTIFY: u8 = 1;
/// Handshake accepted.
pub const OP_IDENTIFIED: u8 = 2;
/// Client request.
pub const OP_REQUEST: u8 = 6;
/// Server response to a request.
pub const OP_REQUEST_RESPONSE: u8 = 7;

/// RPC version negotiated in `Identify`.
pub const RPC_VERSION: u32 = 1;
/// Close code sent by the server when authentication fails.
pub const CLOSE_AUTHENTICATION_FAILED: u16 = 4009;

/// `base64(sha256(base64(sha256(password + salt)) + challenge))`
pub fn auth_string(password: &str, salt: &str, challenge: &str) -> String {
    let secret = STANDARD.encode(Sha256::digest(format!("{password}{salt}").as_bytes()));
    STANDARD.encode(Sha256::digest(format!("{secret}{challenge}").as_bytes()))
}

/// Authentication challenge carried by `Hello` when a password is set.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct AuthChallenge {
    /// Per-connection challenge.
    pub challenge: String,
    /// Per-server salt.
    pub salt: String,
}

/// `Hello` payload.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    /// Server's obs-websocket version, for logging.
    #[serde(default)]
    pub obs_web_socket_version: Option<String>,
    /// Highest RPC version the server speaks.
    pub rpc_version: u32,
    /// Present when the server requires a password.
    #[serde(default)]
    pub authentication: Option<AuthChallenge>,
}

/// `requestStatus` of a `RequestResponse`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct RequestStatus {
    /// Whether the request succeeded.
    pub result: bool,
    /// obs-websocket status code.
    pub code: u16,
    /// Reason for a failure.
    #[serde(default)]
    pub comment: Option<String>,
}

/// `RequestResponse` payload.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResponse {
    /// Echo of the request type.
    pub request_type: String,
    /// Echo of the client-chosen id.
    pub request_id: String,
    /// Outcome.
    pub request_status: RequestStatus,
    /// Result payload, absent for requests that return nothing.
    #[serde(default)]
    pub response_data: Option<Value>,
}

impl RequestResponse {
    /// `responseData` on success, [`ObsError::Request`] otherwise.
    pub fn into_result(self) -> Result<Value, ObsError> {
        if self.request_status.result {
            Ok(self.response_data.unwrap_or(Value::Null))
        } else {
            Err(ObsError::Request {
                request_type: self.request_type,
                code: self.request_status.code,
                comment: self.request_status.comment,
            })
        }
    }
}

/// A decoded server frame.
#[derive(Clone, Debug, PartialEq)]
pub enum ServerFrame {
    /// op 0
    Hello(Hello),
    /// op 2
    Identified,
    /// op 7
    RequestResponse(RequestResponse),
    /// Any other opcode (events, batch responses).
    Other(u8),
}

#[derive(Deserialize)]
struct RawFrame {
    op: u8,
    #[serde(default)]
    d: Value,
}

impl ServerFrame {
    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Self, ObsError> {
        let raw: RawFrame =
            serde_json::from_str(text).map_err(|e| ObsError::Protocol(e.to_string()))?;
        let frame = match raw.op {
            OP_HELLO => Self::Hello(payload(raw.d)?),
            OP_IDENTIFIED => Self::Identified,
            OP_REQUEST_RESPONSE => Self::RequestResponse(payload(raw.d)?),
            op => Self::Other(op),
        };
        Ok(frame)
    }
}

fn payload<T: for<'de> Deserialize<'de>>(d: Value) -> Result<T, ObsError> {
    serde_json::from_value(d).map_err(|e| ObsError::Protocol(e.to_string()))
}

/// `Identify` frame. Event subscriptions are turned off; the relay only
/// issues requests.
pub fn identify_message(authentication: Option<&str>) -> String {
    let mut d = Map::new();
    let _ = d.insert("rpcVersion".into(), json!(RPC_VERSION));
    let _ = d.insert("eventSubscriptions".into(), json!(0));
    if let Some(auth) = authentication {
        let _ = d.insert("authentication".into(), json!(auth));
    }
    json!({ "op": OP_IDENTIFY, "d": d }).to_string()
}

/// `Request` frame.
pub fn request_message(request_type: &str, request_id: &str, data: Option<&Value>) -> String {
    let mut d = Map::new();
    let _ = d.insert("requestType".into(), json!(request_type));
    let _ = d.insert("requestId".into(), json!(request_id));
    if let Some(data) = data {
        let _ = d.insert("requestData".into(), data.clone());
    }
    json!({ "op": OP_REQUEST, "d": d }).to_string()
}
