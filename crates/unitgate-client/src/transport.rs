//! Invocation transport
//!
//! Hands a fully prepared invocation to the sandbox and waits for its
//! answer. The context is built fresh for every request and discarded once
//! the call returns.

use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use unitgate_common::{ObjectMetadata, Result};

/// Everything the sandbox needs to run a list of function units
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InvocationContext {
    /// Pipe the sandbox listens on
    pub pipe_path: PathBuf,
    /// Where the sandbox writes invocation logs
    pub log_path: PathBuf,
    /// Headers of the inbound request
    pub request_headers: BTreeMap<String, String>,
    /// Object-level headers extracted from the request/response pair
    pub object_headers: BTreeMap<String, String>,
    /// `<METHOD> <host><path>` of a write request
    pub referer: Option<String>,
    /// Function units to run, in order
    pub unit_names: Vec<String>,
    /// Metadata of each requested unit
    pub unit_metadata: BTreeMap<String, ObjectMetadata>,
    /// Transport timeout
    #[serde(rename = "timeout_secs", serialize_with = "serialize_secs")]
    pub timeout: Duration,
}

fn serialize_secs<S: Serializer>(
    timeout: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(timeout.as_secs_f64())
}

/// The sandbox's answer, returned to the caller verbatim
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvocationResponse {
    pub body: serde_json::Value,
}

/// Request/response channel into the sandbox
pub trait InvocationTransport: Send + Sync {
    /// Send the invocation and block until the sandbox answers or the
    /// context's timeout expires
    fn communicate(&self, context: &InvocationContext) -> Result<InvocationResponse>;
}

#[cfg(unix)]
mod unix {
    use super::{InvocationContext, InvocationResponse, InvocationTransport};
    use std::io::{self, BufRead, BufReader, Write};
    use std::os::unix::net::UnixStream;
    use std::time::Duration;
    use tracing::{debug, warn};
    use unitgate_common::{Error, Result};

    /// Transport over the tenant's Unix domain socket
    ///
    /// One JSON document per line in each direction: the context goes out,
    /// the sandbox's response comes back.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct UnixSocketTransport;

    impl UnixSocketTransport {
        #[must_use]
        pub const fn new() -> Self {
            Self
        }
    }

    impl InvocationTransport for UnixSocketTransport {
        fn communicate(&self, context: &InvocationContext) -> Result<InvocationResponse> {
            let timeout = context.timeout;
            let stream = UnixStream::connect(&context.pipe_path).map_err(|e| {
                Error::transport(format!("connect {}: {e}", context.pipe_path.display()))
            })?;
            stream
                .set_read_timeout(Some(timeout))
                .and_then(|()| stream.set_write_timeout(Some(timeout)))
                .map_err(|e| Error::transport(format!("invalid timeout {timeout:?}: {e}")))?;

            let mut request = serde_json::to_vec(context)?;
            request.push(b'\n');
            (&stream)
                .write_all(&request)
                .map_err(|e| io_error(e, timeout))?;
            debug!(
                "Sent invocation of {:?} to {}",
                context.unit_names,
                context.pipe_path.display()
            );

            let mut line = String::new();
            let read = BufReader::new(&stream)
                .read_line(&mut line)
                .map_err(|e| io_error(e, timeout))?;
            if read == 0 {
                return Err(Error::transport("sandbox closed the pipe without replying"));
            }

            serde_json::from_str(&line)
                .map_err(|e| Error::transport(format!("invalid response from sandbox: {e}")))
        }
    }

    fn io_error(err: io::Error, timeout: Duration) -> Error {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
                warn!("Invocation timed out after {:?}", timeout);
                Error::TransportTimeout(timeout)
            }
            _ => Error::transport(err),
        }
    }
}

#[cfg(unix)]
pub use unix::UnixSocketTransport;

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::os::unix::net::UnixListener;
    use std::thread;
    use tempfile::tempdir;
    use unitgate_common::Error;

    fn context(pipe_path: PathBuf, timeout: Duration) -> InvocationContext {
        InvocationContext {
            pipe_path,
            log_path: PathBuf::from("/tmp/logs"),
            request_headers: BTreeMap::new(),
            object_headers: BTreeMap::new(),
            referer: None,
            unit_names: vec!["hello".into()],
            unit_metadata: BTreeMap::new(),
            timeout,
        }
    }

    #[test]
    fn test_context_serialization() {
        let ctx = context(PathBuf::from("/run/pipe"), Duration::from_millis(1500));
        let value = serde_json::to_value(&ctx).unwrap();
        assert_eq!(value["timeout_secs"], 1.5);
        assert_eq!(value["unit_names"][0], "hello");
        assert!(value["referer"].is_null());
    }

    #[test]
    fn test_round_trip_over_socket() {
        let dir = tempdir().unwrap();
        let pipe = dir.path().join("pipe");
        let listener = UnixListener::bind(&pipe).unwrap();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut line = String::new();
            BufReader::new(&stream).read_line(&mut line).unwrap();
            let request: serde_json::Value = serde_json::from_str(&line).unwrap();
            let reply = serde_json::json!({
                "command": "continue",
                "units": request["unit_names"],
            });
            writeln!(stream, "{reply}").unwrap();
        });

        let response = UnixSocketTransport::new()
            .communicate(&context(pipe, Duration::from_secs(5)))
            .unwrap();
        server.join().unwrap();

        assert_eq!(response.body["command"], "continue");
        assert_eq!(response.body["units"][0], "hello");
    }

    #[test]
    fn test_timeout() {
        let dir = tempdir().unwrap();
        let pipe = dir.path().join("pipe");
        let listener = UnixListener::bind(&pipe).unwrap();

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_millis(800));
            drop(stream);
        });

        let err = UnixSocketTransport::new()
            .communicate(&context(pipe, Duration::from_millis(100)))
            .unwrap_err();
        server.join().unwrap();

        assert!(matches!(err, Error::TransportTimeout(_)));
    }

    #[test]
    fn test_zero_timeout_is_a_transport_error() {
        let dir = tempdir().unwrap();
        let pipe = dir.path().join("pipe");
        let _listener = UnixListener::bind(&pipe).unwrap();

        let err = UnixSocketTransport::new()
            .communicate(&context(pipe, Duration::ZERO))
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert!(err.to_string().contains("invalid timeout"));
    }

    #[test]
    fn test_missing_pipe() {
        let dir = tempdir().unwrap();
        let err = UnixSocketTransport::new()
            .communicate(&context(dir.path().join("absent"), Duration::from_secs(1)))
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[test]
    fn test_sandbox_hangs_up() {
        let dir = tempdir().unwrap();
        let pipe = dir.path().join("pipe");
        let listener = UnixListener::bind(&pipe).unwrap();

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut line = String::new();
            BufReader::new(&stream).read_line(&mut line).unwrap();
        });

        let err = UnixSocketTransport::new()
            .communicate(&context(pipe, Duration::from_secs(5)))
            .unwrap_err();
        server.join().unwrap();

        assert!(err.to_string().contains("without replying"));
    }
}
