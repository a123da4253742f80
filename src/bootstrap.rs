//! The initial peer list.
//!
//! One `host:port` per line. Blank lines and lines starting with `#` are
//! skipped. One of the entries is expected to be this node.

use crate::{
    common::{split_endpoint, Endpoint},
    error::{Error, Result},
};
use std::{
    fs,
    net::{IpAddr, Ipv4Addr, UdpSocket},
    path::Path,
};
use tracing::debug;

pub fn load(path: impl AsRef<Path>) -> Result<Vec<Endpoint>> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| {
        Error::new_bootstrap(Some(format!("{}: {}", path.display(), e).into()))
    })?;

    let entries = parse(&contents)?;
    debug!(path = %path.display(), entries = entries.len(), "Loaded bootstrap list");
    Ok(entries)
}

/// Parse a bootstrap list, keeping the first of any duplicate entries.
pub fn parse(contents: &str) -> Result<Vec<Endpoint>> {
    let mut entries: Vec<Endpoint> = Vec::new();

    for line in contents.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        split_endpoint(line)?;

        if !entries.iter().any(|e| e == line) {
            entries.push(line.to_string());
        }
    }

    Ok(entries)
}

/// Find the entry naming this host: the first one whose host is `ip`.
///
/// # Errors
///
/// `NoLocalEndpoint` if no entry matches.
pub fn identify_local(entries: &[Endpoint], ip: IpAddr) -> Result<Endpoint> {
    entries
        .iter()
        .find(|entry| {
            split_endpoint(entry)
                .ok()
                .and_then(|(host, _)| host.parse::<IpAddr>().ok())
                == Some(ip)
        })
        .cloned()
        .ok_or_else(Error::new_no_local_endpoint)
}

/// The address of the interface outbound traffic would leave through.
///
/// Connecting a UDP socket only picks a route, nothing is sent.
pub fn local_ip() -> Result<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .map_err(|e| Error::new_bootstrap(Some(Box::new(e))))?;

    socket
        .connect((Ipv4Addr::new(192, 0, 2, 1), 9))
        .and_then(|_| socket.local_addr())
        .map(|addr| addr.ip())
        .map_err(|e| Error::new_bootstrap(Some(Box::new(e))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::io::Write;

    #[test]
    fn parse_skips_blanks_and_comments() {
        let list = "\n# seeds\n 10.0.0.1:7000 \n10.0.0.2:7000\n\n10.0.0.1:7000\n";
        assert_eq!(
            parse(list).unwrap(),
            vec!["10.0.0.1:7000".to_string(), "10.0.0.2:7000".to_string()]
        );
    }

    #[test]
    fn parse_rejects_missing_port() {
        let err = parse("10.0.0.1:7000\n10.0.0.2\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidEndpoint);
    }

    #[test]
    fn identify_exact_host() {
        let entries = parse("10.0.0.12:7000\n10.0.0.1:7001\n10.0.0.1:7002\n").unwrap();

        let local = identify_local(&entries, "10.0.0.1".parse().unwrap()).unwrap();
        assert_eq!(local, "10.0.0.1:7001");

        let err = identify_local(&entries, "10.0.0.9".parse().unwrap()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoLocalEndpoint);
    }

    #[test]
    fn load_from_file() {
        let path = std::env::temp_dir().join(format!("hearsay-bootstrap-{}", std::process::id()));
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "127.0.0.1:7000").unwrap();
        writeln!(file, "127.0.0.1:7001").unwrap();
        drop(file);

        let entries = load(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn load_missing_file() {
        let err = load("/nonexistent/hearsay/start_ips").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Bootstrap);
    }
}
