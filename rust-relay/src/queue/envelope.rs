//! Queue record format.
//!
//! A record is a single line `"<token> <destination> <body>"`. Fields are not
//! escaped: token and destination must never contain [`SEPARATOR`], while the
//! body may, because decoding rejoins every trailing field into the body.

use crate::error::{RelayError, Result};

/// Field separator inside a queue record.
pub const SEPARATOR: char = ' ';

/// The unit of work carried by the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Trace token, used only for log correlation.
    pub token: String,
    /// Delivery target, e.g. a phone number.
    pub destination: String,
    /// Free-form text payload.
    pub body: String,
}

impl Envelope {
    /// Build an envelope, rejecting a destination that would make the record
    /// ambiguous.
    pub fn new(token: String, destination: String, body: String) -> Result<Self> {
        validate_destination(&destination)?;
        Ok(Self {
            token,
            destination,
            body,
        })
    }

    /// Serialize into a queue record.
    pub fn encode(&self) -> String {
        encode(&self.token, &self.destination, &self.body)
    }
}

/// Check that `destination` is non-empty and free of separators.
pub fn validate_destination(destination: &str) -> Result<()> {
    if destination.is_empty() || destination.contains(SEPARATOR) {
        return Err(RelayError::InvalidDestination(destination.to_string()));
    }
    Ok(())
}

/// Concatenate token, destination and body with single separators.
pub fn encode(token: &str, destination: &str, body: &str) -> String {
    let mut record = String::with_capacity(token.len() + destination.len() + body.len() + 2);
    record.push_str(token);
    record.push(SEPARATOR);
    record.push_str(destination);
    record.push(SEPARATOR);
    record.push_str(body);
    record
}

/// Decode a popped record.
///
/// An empty record means the queue had no work and yields `Ok(None)`. A
/// record with fewer than three fields is rejected rather than truncated.
pub fn decode(record: &str) -> Result<Option<Envelope>> {
    if record.is_empty() {
        return Ok(None);
    }

    let mut fields = record.splitn(3, SEPARATOR);
    match (fields.next(), fields.next(), fields.next()) {
        (Some(token), Some(destination), Some(body)) if !destination.is_empty() => {
            Ok(Some(Envelope {
                token: token.to_string(),
                destination: destination.to_string(),
                body: body.to_string(),
            }))
        }
        _ => Err(RelayError::MalformedEnvelope(record.to_string())),
    }
}
