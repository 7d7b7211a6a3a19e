/// dockhand-core - single-container lifecycle control
///
/// Pull an image, create a container with one published TCP port, start
/// it, and guarantee stop+remove when the embedder signals shutdown.
/// The runtime behind it is abstracted by `ContainerRuntime`; production
/// uses the bollard-backed `DockerRuntime`.

pub mod controller;
pub mod error;
pub mod runtime;
pub mod spec;


pub use controller::{Launched, LifecycleController, TeardownWatcher};
pub use error::LifecycleError;
pub use runtime::{ContainerRuntime, DockerRuntime, RuntimeConfig};
pub use spec::{ContainerHandle, ContainerSpec, TerminationSignal};
