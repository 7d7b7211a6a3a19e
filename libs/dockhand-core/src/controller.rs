/// Lifecycle controller
///
/// Owns the full lifecycle of exactly one container per `launch` call:
/// pull the image, bind one TCP port, create and start the container,
/// and guarantee stop+remove when the shutdown token fires.
///
/// The controller never decides process exit. Shutdown arrives through a
/// `CancellationToken` owned by the embedder, and the teardown outcome is
/// reported back through `TeardownWatcher::wait`.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::error::LifecycleError;
use crate::runtime::ContainerRuntime;
use crate::spec::{ContainerHandle, ContainerSpec};

pub struct LifecycleController<R: ContainerRuntime> {
    runtime: Arc<R>,
}

/// Result of a successful launch: the handle plus the watcher that will
/// tear the container down when shutdown is requested.
#[derive(Debug)]
pub struct Launched {
    pub handle: ContainerHandle,
    pub watcher: TeardownWatcher,
}

/// One-shot teardown task spawned by `launch`.
///
/// The task blocks on the shutdown token, invokes teardown exactly once
/// when it fires, and reports the outcome here.
#[derive(Debug)]
pub struct TeardownWatcher {
    task: JoinHandle<Result<(), LifecycleError>>,
}

impl TeardownWatcher {
    /// Wait for the watcher to observe shutdown and finish teardown.
    pub async fn wait(self) -> Result<(), LifecycleError> {
        match self.task.await {
            Ok(result) => result,
            Err(join_err) => Err(LifecycleError::WatcherLost(join_err)),
        }
    }
}

impl<R: ContainerRuntime> LifecycleController<R> {
    pub fn new(runtime: R) -> Self {
        Self {
            runtime: Arc::new(runtime),
        }
    }

    /// Pull, create, and start the container described by `spec`.
    ///
    /// Steps run sequentially and each failure is attributed to its phase.
    /// The teardown watcher is registered only after the container has
    /// started, so shutdown can never be observed for a handle that does
    /// not exist yet. On a start failure the created container is left in
    /// place for inspection; callers wanting rollback remove it themselves.
    #[instrument(skip(self, spec, shutdown), fields(image = %spec.image, name = %spec.name, host_port = %spec.host_port))]
    pub async fn launch(
        &self,
        spec: ContainerSpec,
        shutdown: CancellationToken,
    ) -> Result<Launched, LifecycleError> {
        info!("pulling image");
        self.runtime.pull_image(&spec.image).await?;

        let handle = self.runtime.create_container(&spec).await?;
        info!(container_id = %handle.id, "container created");

        self.runtime.start_container(&handle).await?;
        info!(container_id = %handle.id, "container started");

        let watcher = self.register_watcher(handle.clone(), shutdown);
        Ok(Launched { handle, watcher })
    }

    /// Force-stop and remove the container behind `handle`.
    ///
    /// Not idempotent: a second call for the same handle surfaces the
    /// runtime's error instead of swallowing it.
    pub async fn teardown(&self, handle: &ContainerHandle) -> Result<(), LifecycleError> {
        self.runtime.remove_container(handle).await
    }

    fn register_watcher(
        &self,
        handle: ContainerHandle,
        shutdown: CancellationToken,
    ) -> TeardownWatcher {
        let runtime = Arc::clone(&self.runtime);
        let task = tokio::spawn(async move {
            shutdown.cancelled().await;
            warn!(name = %handle.name, "killing {}...", handle.name);
            match runtime.remove_container(&handle).await {
                Ok(()) => {
                    info!(name = %handle.name, "{} stopped and removed", handle.name);
                    Ok(())
                }
                Err(err) => {
                    error!(name = %handle.name, error = %err, "failed to stop and remove {}", handle.name);
                    Err(err)
                }
            }
        });
        TeardownWatcher { task }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;

    fn server_error(status_code: u16, message: &str) -> bollard::errors::Error {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message: message.to_string(),
        }
    }

    /// Recording runtime with per-phase failure switches.
    #[derive(Default)]
    struct FakeRuntime {
        calls: Mutex<Vec<String>>,
        removed: Mutex<HashSet<String>>,
        fail_pull: bool,
        fail_create: bool,
        fail_start: bool,
        fail_remove: bool,
    }

    impl FakeRuntime {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn remove_count(&self) -> usize {
            self.calls()
                .iter()
                .filter(|c| c.starts_with("remove"))
                .count()
        }
    }

    #[async_trait]
    impl ContainerRuntime for FakeRuntime {
        async fn pull_image(&self, image: &str) -> Result<(), LifecycleError> {
            self.calls.lock().unwrap().push(format!("pull:{image}"));
            if self.fail_pull {
                return Err(LifecycleError::ImagePull {
                    image: image.to_string(),
                    source: server_error(500, "registry unreachable"),
                });
            }
            Ok(())
        }

        async fn create_container(
            &self,
            spec: &ContainerSpec,
        ) -> Result<ContainerHandle, LifecycleError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("create:{}", spec.name));
            if self.fail_create {
                return Err(LifecycleError::ContainerCreate {
                    name: spec.name.clone(),
                    source: server_error(409, "name already in use"),
                });
            }
            Ok(ContainerHandle {
                id: format!("id-{}", spec.name),
                name: spec.name.clone(),
            })
        }

        async fn start_container(&self, handle: &ContainerHandle) -> Result<(), LifecycleError> {
            self.calls.lock().unwrap().push(format!("start:{}", handle.id));
            if self.fail_start {
                return Err(LifecycleError::ContainerStart {
                    id: handle.id.clone(),
                    source: server_error(500, "port is already allocated"),
                });
            }
            Ok(())
        }

        async fn remove_container(&self, handle: &ContainerHandle) -> Result<(), LifecycleError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("remove:{}", handle.id));
            if self.fail_remove || !self.removed.lock().unwrap().insert(handle.id.clone()) {
                return Err(LifecycleError::ContainerRemove {
                    id: handle.id.clone(),
                    source: server_error(404, "no such container"),
                });
            }
            Ok(())
        }
    }

    fn spec() -> ContainerSpec {
        ContainerSpec::new("nginx:latest", "8080", "web1")
    }

    #[tokio::test]
    async fn launch_runs_phases_in_order() {
        let controller = LifecycleController::new(FakeRuntime::default());
        let launched = controller
            .launch(spec(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(launched.handle.id, "id-web1");
        assert_eq!(launched.handle.name, "web1");
        assert_eq!(
            controller.runtime.calls(),
            vec!["pull:nginx:latest", "create:web1", "start:id-web1"]
        );
    }

    #[tokio::test]
    async fn pull_failure_stops_the_sequence() {
        let runtime = FakeRuntime {
            fail_pull: true,
            ..Default::default()
        };
        let controller = LifecycleController::new(runtime);

        let err = controller
            .launch(spec(), CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.phase(), "image-pull");
        assert_eq!(controller.runtime.calls(), vec!["pull:nginx:latest"]);
    }

    #[tokio::test]
    async fn name_collision_surfaces_create_error() {
        let runtime = FakeRuntime {
            fail_create: true,
            ..Default::default()
        };
        let controller = LifecycleController::new(runtime);

        let err = controller
            .launch(spec(), CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.phase(), "container-create");
        // Start was never attempted.
        assert!(!controller
            .runtime
            .calls()
            .iter()
            .any(|c| c.starts_with("start")));
    }

    #[tokio::test]
    async fn start_failure_leaves_created_container_in_place() {
        let runtime = FakeRuntime {
            fail_start: true,
            ..Default::default()
        };
        let controller = LifecycleController::new(runtime);
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let err = controller.launch(spec(), shutdown).await.unwrap_err();

        assert_eq!(err.phase(), "container-start");
        // No rollback of the created container and, because the watcher is
        // only registered after a successful start, no teardown either even
        // though shutdown was already requested.
        assert_eq!(controller.runtime.remove_count(), 0);
    }

    #[tokio::test]
    async fn shutdown_triggers_exactly_one_teardown() {
        let controller = LifecycleController::new(FakeRuntime::default());
        let shutdown = CancellationToken::new();
        let launched = controller.launch(spec(), shutdown.clone()).await.unwrap();

        shutdown.cancel();
        shutdown.cancel(); // second cancel is a no-op

        launched.watcher.wait().await.unwrap();
        assert_eq!(controller.runtime.remove_count(), 1);
    }

    #[tokio::test]
    async fn shutdown_requested_before_launch_tears_down_the_real_handle() {
        let controller = LifecycleController::new(FakeRuntime::default());
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        // The watcher only exists once the container is running, so a
        // pre-cancelled token fires immediately after registration and
        // tears down the handle launch just produced.
        let launched = controller.launch(spec(), shutdown).await.unwrap();
        launched.watcher.wait().await.unwrap();

        assert_eq!(controller.runtime.remove_count(), 1);
        assert!(controller
            .runtime
            .calls()
            .contains(&"remove:id-web1".to_string()));
    }

    #[tokio::test]
    async fn watcher_surfaces_remove_failure() {
        let runtime = FakeRuntime {
            fail_remove: true,
            ..Default::default()
        };
        let controller = LifecycleController::new(runtime);
        let shutdown = CancellationToken::new();
        let launched = controller.launch(spec(), shutdown.clone()).await.unwrap();

        shutdown.cancel();
        let err = launched.watcher.wait().await.unwrap_err();
        assert_eq!(err.phase(), "container-remove");
    }

    #[tokio::test]
    async fn second_teardown_surfaces_the_runtime_error() {
        let controller = LifecycleController::new(FakeRuntime::default());
        let launched = controller
            .launch(spec(), CancellationToken::new())
            .await
            .unwrap();

        controller.teardown(&launched.handle).await.unwrap();
        let err = controller.teardown(&launched.handle).await.unwrap_err();

        assert_eq!(err.phase(), "container-remove");
        assert_eq!(controller.runtime.remove_count(), 2);
    }
}
