use thiserror::Error;

/// One remote TLS endpoint plus the material needed to authenticate it.
/// The anchor is compile-time data, so it is borrowed for the process
/// lifetime rather than owned per session.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub ca_pem: &'static str,
    pub timeout_s: u32,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TransferError {
    /// The transport needs to read protocol data before it can make
    /// progress. Retry the same call without advancing the buffer offset.
    #[error("transport wants a read before continuing")]
    WantRead,
    /// Mirror of [`TransferError::WantRead`] for the write direction.
    #[error("transport wants a write before continuing")]
    WantWrite,
    /// Unrecoverable for this session; carries the raw protocol return
    /// code. Code 0 is the closed-without-error sentinel, and a repeated
    /// call after a real close yields `Fatal` again.
    #[error("transport failed (code {0:#x})")]
    Fatal(i32),
}

impl TransferError {
    pub fn is_transient(self) -> bool {
        matches!(self, Self::WantRead | Self::WantWrite)
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConnectError {
    #[error("hostname resolution failed")]
    ResolveFailed,
    #[error("tcp connection failed")]
    ConnectFailed,
    #[error("tls handshake failed")]
    HandshakeFailed,
}

/// One established TLS connection. The transport never promises complete
/// buffer transfers: both directions hand back counts and the caller owns
/// the offset arithmetic.
pub trait Transport {
    /// Writes as many bytes as the transport currently accepts. A short
    /// count is normal, not an error.
    fn write(&mut self, buf: &[u8]) -> Result<usize, TransferError>;

    /// Fills up to `buf.len()` bytes. `Ok(0)` means the peer ended the
    /// stream; each successful count bounds exactly one chunk.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransferError>;

    /// Tears down the TLS session and the socket under it. Idempotent and
    /// safe to call after any error.
    fn close(&mut self);
}

/// Opens channels to a fixed endpoint: resolve, TCP connect, TLS handshake
/// against the single pinned anchor. Each error is terminal for one
/// attempt; retry policy lives with the caller.
pub trait Connector {
    type Channel: Transport;

    fn open(&mut self, endpoint: &Endpoint) -> Result<Self::Channel, ConnectError>;
}

/// Write loop: accumulates an offset across repeated partial writes until
/// the whole buffer is out. Transient conditions retry in place.
pub fn send_all<T: Transport>(transport: &mut T, buf: &[u8]) -> Result<(), TransferError> {
    let mut written = 0;
    while written < buf.len() {
        match transport.write(&buf[written..]) {
            Ok(count) => written += count,
            Err(err) if err.is_transient() => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use pretty_assertions::assert_eq;

    use super::*;

    /// Accepts a scripted number of bytes per call, recording what lands.
    struct ScriptedPipe {
        script: VecDeque<Result<usize, TransferError>>,
        received: Vec<u8>,
    }

    impl ScriptedPipe {
        fn new(script: Vec<Result<usize, TransferError>>) -> Self {
            Self {
                script: script.into(),
                received: Vec::new(),
            }
        }
    }

    impl Transport for ScriptedPipe {
        fn write(&mut self, buf: &[u8]) -> Result<usize, TransferError> {
            match self.script.pop_front().unwrap_or(Ok(buf.len())) {
                Ok(count) => {
                    let count = count.min(buf.len());
                    self.received.extend_from_slice(&buf[..count]);
                    Ok(count)
                }
                Err(err) => Err(err),
            }
        }

        fn read(&mut self, _buf: &mut [u8]) -> Result<usize, TransferError> {
            Ok(0)
        }

        fn close(&mut self) {}
    }

    const REQUEST: &[u8] = b"GET /v2/informers HTTP/1.1\r\n\r\n";

    #[test]
    fn partial_writes_reassemble_the_full_request() {
        let mut pipe = ScriptedPipe::new(vec![Ok(3), Ok(1), Ok(7), Ok(1024)]);

        send_all(&mut pipe, REQUEST).unwrap();

        assert_eq!(pipe.received, REQUEST);
    }

    #[test]
    fn transient_conditions_do_not_advance_the_offset() {
        let mut pipe = ScriptedPipe::new(vec![
            Ok(4),
            Err(TransferError::WantWrite),
            Err(TransferError::WantRead),
            Ok(1024),
        ]);

        send_all(&mut pipe, REQUEST).unwrap();

        assert_eq!(pipe.received, REQUEST);
    }

    #[test]
    fn fatal_write_aborts_with_the_raw_code() {
        let mut pipe = ScriptedPipe::new(vec![Ok(2), Err(TransferError::Fatal(-0x50))]);

        let err = send_all(&mut pipe, REQUEST).unwrap_err();

        assert_eq!(err, TransferError::Fatal(-0x50));
        assert_eq!(pipe.received, &REQUEST[..2]);
    }

    #[test]
    fn closed_stream_sentinel_is_not_transient() {
        assert!(!TransferError::Fatal(0).is_transient());
        assert!(TransferError::WantRead.is_transient());
        assert!(TransferError::WantWrite.is_transient());
    }

    #[test]
    fn empty_request_writes_nothing() {
        let mut pipe = ScriptedPipe::new(vec![Err(TransferError::Fatal(-1))]);

        send_all(&mut pipe, b"").unwrap();

        assert!(pipe.received.is_empty());
    }
}
