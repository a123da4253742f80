use crate::error::{Error, Result};

/// Represents some _node/destination_ in the system, as `host:port`.
pub type Endpoint = String;
/// A member's liveness counter, only ever raised by the member itself.
pub type Heartbeat = u64;

/// Splits an endpoint into its host and port.
///
/// IPv6 hosts may be bracketed (`[::1]:7000`), the brackets are stripped.
pub fn split_endpoint(endpoint: &str) -> Result<(&str, u16)> {
    let (host, port) = endpoint
        .rsplit_once(':')
        .ok_or_else(|| Error::new_invalid_endpoint(endpoint))?;

    let port = port
        .parse::<u16>()
        .map_err(|_| Error::new_invalid_endpoint(endpoint))?;

    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(Error::new_invalid_endpoint(endpoint));
    }

    Ok((host, port))
}
