//! JSON-RPC 2.0 Envelopes
//!
//! Request/response shapes of the batch endpoint. Ids are carried as raw
//! JSON so any id form round-trips byte-for-byte.

use jsonrpsee_types::ErrorObjectOwned;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::value::RawValue;

pub const JSONRPC_VERSION: &str = "2.0";

/// Id written on the response to an unparseable body
pub const PARSE_ERROR_ID: &str = "0";

/// One item of a batch
#[derive(Debug, Deserialize)]
pub struct RequestEnvelope {
    /// `None` only when the key is absent; an explicit `null` is an id
    #[serde(default, deserialize_with = "present_id")]
    pub id: Option<Box<RawValue>>,
    #[serde(rename = "jsonrpc", default)]
    pub version: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub params: Option<Box<RawValue>>,
}

impl RequestEnvelope {
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

fn present_id<'de, D>(deserializer: D) -> Result<Option<Box<RawValue>>, D::Error>
where
    D: Deserializer<'de>,
{
    Box::<RawValue>::deserialize(deserializer).map(Some)
}

/// Id echoed on a response
#[derive(Debug, Clone)]
pub enum ResponseId {
    Echoed(Box<RawValue>),
    Placeholder,
}

impl Serialize for ResponseId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ResponseId::Echoed(raw) => raw.serialize(serializer),
            ResponseId::Placeholder => serializer.serialize_str(PARSE_ERROR_ID),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ResponsePayload {
    Result(Box<RawValue>),
    Error(ErrorObjectOwned),
}

/// One response; carries exactly one of `result` / `error`
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    id: ResponseId,
    payload: ResponsePayload,
}

impl ResponseEnvelope {
    pub fn success(id: Box<RawValue>, result: Box<RawValue>) -> Self {
        Self {
            id: ResponseId::Echoed(id),
            payload: ResponsePayload::Result(result),
        }
    }

    pub fn failure(id: ResponseId, error: ErrorObjectOwned) -> Self {
        Self {
            id,
            payload: ResponsePayload::Error(error),
        }
    }

    pub fn id(&self) -> &ResponseId {
        &self.id
    }

    pub fn payload(&self) -> &ResponsePayload {
        &self.payload
    }

    pub fn result(&self) -> Option<&RawValue> {
        match &self.payload {
            ResponsePayload::Result(raw) => Some(raw),
            ResponsePayload::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorObjectOwned> {
        match &self.payload {
            ResponsePayload::Error(err) => Some(err),
            ResponsePayload::Result(_) => None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error().is_some()
    }
}

impl Serialize for ResponseEnvelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("id", &self.id)?;
        map.serialize_entry("jsonrpc", JSONRPC_VERSION)?;
        match &self.payload {
            ResponsePayload::Result(raw) => map.serialize_entry("result", raw)?,
            ResponsePayload::Error(err) => map.serialize_entry("error", err)?,
        }
        map.end()
    }
}
