use serde::{Deserialize, Serialize};
use std::fmt;

/// Desired run configuration for a single published container.
///
/// Constructed by the caller before launch and immutable afterwards.
/// The same port number is used on both sides of the binding: container
/// `<host_port>/tcp` is published on `0.0.0.0:<host_port>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub image: String,
    pub host_port: String,
    pub name: String,
}

impl ContainerSpec {
    pub fn new(image: &str, host_port: &str, name: &str) -> Self {
        Self {
            image: image.to_string(),
            host_port: host_port.to_string(),
            name: name.to_string(),
        }
    }

    /// Container-side port key in Docker's `<port>/tcp` form.
    pub fn tcp_port_key(&self) -> String {
        format!("{}/tcp", self.host_port)
    }
}

/// Runtime identity of a launched container.
///
/// Produced by create, consumed by stop+remove, invalid after removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerHandle {
    /// Runtime-assigned container ID.
    pub id: String,
    /// Name the container was created under, kept for log lines.
    pub name: String,
}

/// External request to tear the container down, observed once per launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationSignal {
    /// SIGINT / Ctrl+C.
    Interrupt,
    /// SIGTERM.
    Terminate,
}

impl fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationSignal::Interrupt => write!(f, "interrupt"),
            TerminationSignal::Terminate => write!(f, "terminate"),
        }
    }
}
