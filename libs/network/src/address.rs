//! Middleware address parsing
//!
//! Accepted forms: `unix:///run/middleware.sock`, a bare absolute path,
//! `tcp://host:port` or a bare `host:port`.

use crate::{Result, TransportError};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamAddress {
    Unix(PathBuf),
    Tcp(String),
}

impl FromStr for StreamAddress {
    type Err = TransportError;

    fn from_str(address: &str) -> Result<Self> {
        let address = address.trim();
        if let Some(path) = address.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(TransportError::configuration(
                    "Unix socket address has an empty path",
                    Some("socket_address"),
                ));
            }
            return Ok(StreamAddress::Unix(PathBuf::from(path)));
        }
        if address.starts_with('/') {
            return Ok(StreamAddress::Unix(PathBuf::from(address)));
        }

        let host_port = address.strip_prefix("tcp://").unwrap_or(address);
        match host_port.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                Ok(StreamAddress::Tcp(host_port.to_string()))
            }
            _ => Err(TransportError::configuration(
                format!("Unrecognized middleware address '{}'", address),
                Some("socket_address"),
            )),
        }
    }
}

impl fmt::Display for StreamAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamAddress::Unix(path) => write!(f, "unix://{}", path.display()),
            StreamAddress::Tcp(host_port) => write!(f, "tcp://{}", host_port),
        }
    }
}
