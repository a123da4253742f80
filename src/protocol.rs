//! The gossip datagram.
//!
//! A datagram is the bincode encoding of an `Envelope`: a version byte
//! followed by a length-prefixed list of `(endpoint, heartbeat)` records. Only
//! this plain data crosses the wire, failure timers are rebuilt locally by
//! whoever merges the list.

use crate::{
    common::{Endpoint, Heartbeat},
    error::{Error, Result},
};
use bincode::serialized_size;
use serde::{Deserialize, Serialize};

pub const VERSION: u8 = 1;

/// What a node tells its peers about one member.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberRecord {
    pub endpoint: Endpoint,
    pub heartbeat: Heartbeat,
}

impl MemberRecord {
    pub fn new(endpoint: impl Into<Endpoint>, heartbeat: Heartbeat) -> Self {
        Self {
            endpoint: endpoint.into(),
            heartbeat,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
struct Envelope {
    version: u8,
    members: Vec<MemberRecord>,
}

/// Encode a member list into a single datagram of at most `max_payload`
/// bytes.
///
/// The record for `local` always goes first. The remaining records are taken
/// in order and any record that would push the datagram over the limit is
/// left out, so callers wanting fair coverage should shuffle beforehand.
///
/// # Errors
///
/// `PayloadTooLarge` if not even the local record fits.
pub fn encode(local: &str, members: &[MemberRecord], max_payload: usize) -> Result<Vec<u8>> {
    let mut envelope = Envelope {
        version: VERSION,
        members: Vec::with_capacity(members.len()),
    };

    let mut used = size_of(&envelope)?;
    let mut omitted = 0;

    let ordered = members
        .iter()
        .filter(|m| m.endpoint == local)
        .chain(members.iter().filter(|m| m.endpoint != local));

    for record in ordered {
        let size = size_of(record)?;

        if used + size > max_payload {
            if record.endpoint == local {
                return Err(Error::new_payload_too_large(used + size, max_payload));
            }

            omitted += 1;
            continue;
        }

        used += size;
        envelope.members.push(record.clone());
    }

    if omitted > 0 {
        tracing::debug!(
            omitted,
            included = envelope.members.len(),
            "Member list truncated to fit {} bytes",
            max_payload
        );
    }

    bincode::serialize(&envelope).map_err(|e| Error::new_encode(Some(e)))
}

/// Decode a datagram produced by `encode`.
///
/// # Errors
///
/// * `PayloadTooLarge`: the datagram is longer than `max_payload`, meaning
///   it was cut short by the receive buffer.
/// * `Decode`: the bytes are not an envelope, or carry another version.
pub fn decode(buf: &[u8], max_payload: usize) -> Result<Vec<MemberRecord>> {
    if buf.len() > max_payload {
        return Err(Error::new_payload_too_large(buf.len(), max_payload));
    }

    let envelope: Envelope = bincode::deserialize(buf).map_err(|e| Error::new_decode(Some(e)))?;

    if envelope.version != VERSION {
        return Err(Error::new_decode(Some(
            format!("unsupported version {}", envelope.version).into(),
        )));
    }

    Ok(envelope.members)
}

fn size_of<T: Serialize>(value: &T) -> Result<usize> {
    serialized_size(value)
        .map(|n| n as usize)
        .map_err(|e| Error::new_encode(Some(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn records(n: usize) -> Vec<MemberRecord> {
        (0..n)
            .map(|i| MemberRecord::new(format!("10.0.0.{}:7000", i), i as u64))
            .collect()
    }

    #[test]
    fn encode_decode() {
        let members = records(3);
        let buf = encode("10.0.0.0:7000", &members, 1400).unwrap();
        assert_eq!(decode(&buf, 1400).unwrap(), members);
    }

    #[test]
    fn local_goes_first() {
        let members = records(4);
        let buf = encode("10.0.0.2:7000", &members, 1400).unwrap();
        let decoded = decode(&buf, 1400).unwrap();

        assert_eq!(decoded.len(), 4);
        assert_eq!(decoded[0].endpoint, "10.0.0.2:7000");
    }

    #[test]
    fn packs_under_limit() {
        let members = records(100);
        let buf = encode("10.0.0.57:7000", &members, 256).unwrap();
        assert!(buf.len() <= 256);

        let decoded = decode(&buf, 256).unwrap();
        assert!(!decoded.is_empty());
        assert!(decoded.len() < 100);
        assert_eq!(decoded[0], MemberRecord::new("10.0.0.57:7000", 57));
    }

    #[test]
    fn local_alone_too_big() {
        let members = vec![MemberRecord::new("x".repeat(64), 1)];
        let err = encode(&members[0].endpoint, &members, 32).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PayloadTooLarge);
    }

    #[test]
    fn oversize_datagram_rejected() {
        let buf = encode("10.0.0.0:7000", &records(20), 4096).unwrap();
        let err = decode(&buf, buf.len() - 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PayloadTooLarge);
    }

    #[test]
    fn garbage_rejected() {
        let err = decode(b"\x01\xff\xff\xff\xff\xff\xff\xff\xff", 1400).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);

        let err = decode(b"", 1400).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
    }

    #[test]
    fn truncated_rejected() {
        let buf = encode("10.0.0.0:7000", &records(5), 1400).unwrap();
        let err = decode(&buf[..buf.len() - 3], 1400).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
    }

    #[test]
    fn unknown_version_rejected() {
        let envelope = Envelope {
            version: VERSION + 1,
            members: records(1),
        };
        let buf = bincode::serialize(&envelope).unwrap();

        let err = decode(&buf, 1400).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
    }
}
