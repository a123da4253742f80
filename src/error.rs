use std::{error, fmt};

pub type Result<T> = std::result::Result<T, Error>;

type Source = Box<dyn error::Error + Send + Sync + 'static>;

pub struct Error {
    kind: ErrorKind,
    source: Option<Source>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ErrorKind {
    /// The gossip socket could not be bound.
    Bind,
    /// The bootstrap list could not be read.
    Bootstrap,
    /// No bootstrap entry matched this host.
    NoLocalEndpoint,
    InvalidEndpoint,

    Encode,
    Decode,
    PayloadTooLarge,

    Send,
    Recv,
    Shutdown,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub(crate) fn new(kind: ErrorKind, source: Option<Source>) -> Self {
        Self { kind, source }
    }

    pub(crate) fn new_bind(source: Option<Source>) -> Self {
        Self::new(ErrorKind::Bind, source)
    }

    pub(crate) fn new_bootstrap(source: Option<Source>) -> Self {
        Self::new(ErrorKind::Bootstrap, source)
    }

    pub(crate) fn new_no_local_endpoint() -> Self {
        Self::new(ErrorKind::NoLocalEndpoint, None)
    }

    pub(crate) fn new_invalid_endpoint(endpoint: &str) -> Self {
        Self::new(
            ErrorKind::InvalidEndpoint,
            Some(format!("expected host:port, got {:?}", endpoint).into()),
        )
    }

    pub(crate) fn new_encode(source: Option<Source>) -> Self {
        Self::new(ErrorKind::Encode, source)
    }

    pub(crate) fn new_decode(source: Option<Source>) -> Self {
        Self::new(ErrorKind::Decode, source)
    }

    pub(crate) fn new_payload_too_large(len: usize, max: usize) -> Self {
        Self::new(
            ErrorKind::PayloadTooLarge,
            Some(format!("{} bytes exceeds limit of {}", len, max).into()),
        )
    }

    pub(crate) fn new_send(source: Option<Source>) -> Self {
        Self::new(ErrorKind::Send, source)
    }

    pub(crate) fn new_recv(source: Option<Source>) -> Self {
        Self::new(ErrorKind::Recv, source)
    }

    pub(crate) fn new_shutdown(source: Option<Source>) -> Self {
        Self::new(ErrorKind::Shutdown, source)
    }
}

impl From<ErrorKind> for Error {
    fn from(t: ErrorKind) -> Self {
        Error::new(t, None)
    }
}

impl From<(ErrorKind, Source)> for Error {
    fn from(t: (ErrorKind, Source)) -> Self {
        Error::new(t.0, Some(t.1))
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut f = f.debug_tuple("Error");
        f.field(&self.kind);
        if let Some(source) = &self.source {
            f.field(source);
        }
        f.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(source) = &self.source {
            write!(f, "{}: {}", self.kind, source)
        } else {
            write!(f, "{}", self.kind)
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn error::Error + 'static))
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn display_includes_source() {
        let err = Error::new_payload_too_large(2000, 1400);
        assert_eq!(err.kind(), ErrorKind::PayloadTooLarge);
        assert_eq!(
            err.to_string(),
            "PayloadTooLarge: 2000 bytes exceeds limit of 1400"
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn from_kind() {
        let err: Error = ErrorKind::Shutdown.into();
        assert_eq!(err.to_string(), "Shutdown");
        assert!(err.source().is_none());
    }
}
