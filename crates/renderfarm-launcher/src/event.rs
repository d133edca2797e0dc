//! S3 event notification parsing

use crate::error::LauncherError;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct S3Event {
    #[serde(rename = "Records", default)]
    records: Vec<S3Record>,
}

#[derive(Debug, Deserialize)]
struct S3Record {
    s3: S3Entity,
}

#[derive(Debug, Deserialize)]
struct S3Entity {
    bucket: S3Bucket,
    object: S3Object,
}

#[derive(Debug, Deserialize)]
struct S3Bucket {
    name: String,
}

#[derive(Debug, Deserialize)]
struct S3Object {
    key: String,
}

/// An uploaded object named in an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub bucket: String,
    /// Decoded key
    pub key: String,
}

/// Decode an object key as S3 writes it into notifications: form encoding,
/// so `+` is a space and everything else is percent-encoded.
pub fn decode_key(raw: &str) -> Result<String, LauncherError> {
    let plus_decoded = raw.replace('+', " ");
    urlencoding::decode(&plus_decoded)
        .map(|key| key.into_owned())
        .map_err(|_| LauncherError::InvalidKey {
            key: raw.to_string(),
        })
}

/// Objects referenced by an S3 event, in record order.
pub fn object_refs(event: &Value) -> Result<Vec<ObjectRef>, LauncherError> {
    let parsed = S3Event::deserialize(event)?;
    parsed
        .records
        .into_iter()
        .map(|record| {
            Ok(ObjectRef {
                bucket: record.s3.bucket.name,
                key: decode_key(&record.s3.object.key)?,
            })
        })
        .collect()
}
