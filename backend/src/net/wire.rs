//! Wire formats of the coordinator protocol
//!
//! Parsing is strict about the fields the protocol requires and lenient about
//! anything extra, so coordinators can add fields without breaking workers.

use crate::models::{JobAssignment, JobDescriptor, JobOptions};
use crate::net::ProtocolError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use md5::{Digest, Md5};
use reqwest::Url;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Name of the file carried by every frame upload
pub const FRAME_FILE: &str = "frames.bin.gz.b64";

/// Serialized request body plus its `Content-MD5` digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadBody {
    json: String,
    md5: String,
}

impl UploadBody {
    fn from_value(value: Value) -> Self {
        let json = value.to_string();
        let md5 = content_md5(json.as_bytes());
        Self { json, md5 }
    }

    /// Frame upload: one file, one frame
    pub fn frame(encoded_frame: String) -> Self {
        Self::from_value(json!({
            "files": { FRAME_FILE: encoded_frame },
            "frames": 1,
        }))
    }

    /// Checkpoint upload: the state file plus frames since the previous checkpoint
    pub fn checkpoint(state_file: &str, encoded_state: String, frames: f64) -> Self {
        let mut files = BTreeMap::new();
        files.insert(state_file.to_string(), encoded_state);
        Self::from_value(json!({
            "files": files,
            "frames": frames,
        }))
    }

    /// Stop request, with the error message base64 encoded when present
    pub fn stop(error: Option<&str>) -> Self {
        match error {
            Some(message) => Self::from_value(json!({ "error": STANDARD.encode(message) })),
            None => Self::from_value(json!({})),
        }
    }

    pub fn json(&self) -> &str {
        &self.json
    }

    /// Lowercase hex MD5 of [`UploadBody::json`]
    pub fn md5(&self) -> &str {
        &self.md5
    }
}

/// Lowercase hex MD5 digest, as the coordinator expects in `Content-MD5`
pub fn content_md5(bytes: &[u8]) -> String {
    let digest = Md5::digest(bytes);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Parse the assign reply into a [`JobAssignment`]
///
/// # Example
/// ```
/// use grid_worker_core::net::wire::parse_assignment;
///
/// let assignment = parse_assignment(r#"{"uri":"https://h:1/p","token":"t"}"#).unwrap();
/// assert_eq!(assignment.host, "h");
/// assert_eq!(assignment.port, 1);
/// assert_eq!(assignment.path, "/p");
/// assert_eq!(assignment.token, "t");
/// ```
pub fn parse_assignment(body: &str) -> Result<JobAssignment, ProtocolError> {
    let object = parse_object(body, "assignment")?;
    let uri = required_str(&object, "uri")?;
    let token = required_str(&object, "token")?;
    assignment_from_uri(uri, token)
}

/// Split a stream uri into the parts of a [`JobAssignment`]
pub fn assignment_from_uri(uri: &str, token: &str) -> Result<JobAssignment, ProtocolError> {
    let invalid = |message: String| ProtocolError::InvalidUri {
        uri: uri.to_string(),
        message,
    };

    let url = Url::parse(uri).map_err(|e| invalid(e.to_string()))?;
    let host = url
        .host_str()
        .ok_or_else(|| invalid("no host".to_string()))?
        .to_string();
    let port = url
        .port_or_known_default()
        .ok_or_else(|| invalid("no port".to_string()))?;
    let path = match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    };

    Ok(JobAssignment {
        scheme: url.scheme().to_string(),
        host,
        port,
        path,
        token: token.to_string(),
    })
}

/// Parse the stream reply into a [`JobDescriptor`]
pub fn parse_descriptor(body: &str) -> Result<JobDescriptor, ProtocolError> {
    let object = parse_object(body, "descriptor")?;

    let options = match object.get("options") {
        None | Some(Value::Null) => JobOptions::default(),
        Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
            ProtocolError::InvalidField {
                field: "options",
                message: e.to_string(),
            }
        })?,
    };

    Ok(JobDescriptor {
        stream_id: required_str(&object, "stream_id")?.to_string(),
        target_id: required_str(&object, "target_id")?.to_string(),
        target_files: required_files(&object, "target_files")?,
        stream_files: required_files(&object, "stream_files")?,
        options,
    })
}

fn parse_object(body: &str, context: &'static str) -> Result<Map<String, Value>, ProtocolError> {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(other) => Err(ProtocolError::MalformedBody {
            context,
            message: format!("expected a JSON object, got {}", json_kind(&other)),
        }),
        Err(e) => Err(ProtocolError::MalformedBody {
            context,
            message: e.to_string(),
        }),
    }
}

fn required_str<'a>(
    object: &'a Map<String, Value>,
    field: &'static str,
) -> Result<&'a str, ProtocolError> {
    match object.get(field) {
        None | Some(Value::Null) => Err(ProtocolError::MissingField { field }),
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(ProtocolError::InvalidField {
            field,
            message: format!("expected a string, got {}", json_kind(other)),
        }),
    }
}

fn required_files(
    object: &Map<String, Value>,
    field: &'static str,
) -> Result<BTreeMap<String, String>, ProtocolError> {
    let files = match object.get(field) {
        None | Some(Value::Null) => return Err(ProtocolError::MissingField { field }),
        Some(Value::Object(files)) => files,
        Some(other) => {
            return Err(ProtocolError::InvalidField {
                field,
                message: format!("expected an object, got {}", json_kind(other)),
            })
        }
    };

    files
        .iter()
        .map(|(name, blob)| match blob {
            Value::String(blob) => Ok((name.clone(), blob.clone())),
            other => Err(ProtocolError::InvalidField {
                field,
                message: format!("file '{}' is {}, expected a string", name, json_kind(other)),
            }),
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
