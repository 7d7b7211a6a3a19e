use thiserror::Error;

/// Failure taxonomy for the container lifecycle, one variant per phase.
///
/// Every error is terminal for the call that produced it: nothing is
/// retried internally and partial runtime state is not rolled back (a
/// failed start leaves the created container behind for inspection).
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The runtime client could not be constructed from the given config.
    #[error("failed to initialize container runtime client: {0}")]
    ClientInit(#[source] bollard::errors::Error),

    /// Pulling the image failed (network, auth, or unknown image/tag).
    #[error("failed to pull image '{image}': {source}")]
    ImagePull {
        image: String,
        #[source]
        source: bollard::errors::Error,
    },

    /// Container creation failed (name collision, bad image reference).
    #[error("failed to create container '{name}': {source}")]
    ContainerCreate {
        name: String,
        #[source]
        source: bollard::errors::Error,
    },

    /// The created container could not be started (port already bound,
    /// resource limits). The container is left behind, not auto-removed.
    #[error("failed to start container '{id}': {source}")]
    ContainerStart {
        id: String,
        #[source]
        source: bollard::errors::Error,
    },

    /// Force stop+remove was rejected or the container no longer exists.
    #[error("failed to stop and remove container '{id}': {source}")]
    ContainerRemove {
        id: String,
        #[source]
        source: bollard::errors::Error,
    },

    /// The teardown watcher task panicked or was aborted before it could
    /// report its outcome.
    #[error("teardown watcher task did not complete: {0}")]
    WatcherLost(#[source] tokio::task::JoinError),
}

impl LifecycleError {
    /// Short name of the lifecycle phase that failed, for diagnostics.
    pub fn phase(&self) -> &'static str {
        match self {
            Self::ClientInit(_) => "client-init",
            Self::ImagePull { .. } => "image-pull",
            Self::ContainerCreate { .. } => "container-create",
            Self::ContainerStart { .. } => "container-start",
            Self::ContainerRemove { .. } => "container-remove",
            Self::WatcherLost(_) => "teardown-watcher",
        }
    }
}
