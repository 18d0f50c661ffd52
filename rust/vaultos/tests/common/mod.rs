//! In-memory engine used by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};

use vaultos::engine::{
    BuildLine, BuildStream, EngineClient, EngineContainer, EngineError, EngineVersion,
    PublishedPort, PullProgress, PullStream, RunSpec,
};
use vaultos::image::Arch;
use vaultos::SessionManager;

pub const WEBTOP: &str = "lscr.io/linuxserver/webtop";

#[derive(Default)]
pub struct FakeState {
    pub containers: Vec<EngineContainer>,
    /// Listed but already removed by someone else.
    pub stale: Vec<EngineContainer>,
    pub images: HashSet<String>,
    /// Engine calls in order: `pull`, `build`, `run`, `remove`, ...
    pub calls: Vec<String>,
    pub pulls: Vec<String>,
    /// (tag, Dockerfile text)
    pub builds: Vec<(String, String)>,
    pub runs: Vec<RunSpec>,
    /// (id, force)
    pub removals: Vec<(String, bool)>,
    pub started: Vec<String>,
    pub stopped: Vec<String>,

    /// Progress events emitted per pull, after the first one.
    pub pull_layers: usize,
    pub fail_list: bool,
    pub fail_version: bool,
    pub fail_pull: bool,
    pub fail_run: bool,
    pub fail_remove: bool,
    pub fail_build: Option<String>,
}

#[derive(Default)]
pub struct FakeEngine {
    state: Mutex<FakeState>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn add_image(&self, reference: &str) {
        self.state().images.insert(reference.to_string());
    }

    pub fn add_container(&self, container: EngineContainer) {
        self.state().containers.push(container);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }
}

/// Manager over `engine`, pinned to amd64 tags.
pub fn manager(engine: &Arc<FakeEngine>) -> SessionManager {
    SessionManager::new(engine.clone()).with_arch(Arch::Amd64)
}

pub fn container(id: &str, name: &str, state: &str, labels: &[(&str, &str)]) -> EngineContainer {
    EngineContainer {
        id: id.to_string(),
        name: name.to_string(),
        image: format!("{}:latest", WEBTOP),
        labels: labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        state: state.to_string(),
        ports: Vec::new(),
    }
}

fn not_found(id: &str) -> EngineError {
    EngineError::NotFound {
        resource: id.to_string(),
    }
}

fn server_error(message: &str) -> EngineError {
    EngineError::Api {
        status: 500,
        message: message.to_string(),
    }
}

fn dockerfile_from(context: &[u8]) -> String {
    let mut archive = tar::Archive::new(context);
    let mut contents = String::new();
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        if entry.path().unwrap().to_str() == Some("Dockerfile") {
            entry.read_to_string(&mut contents).unwrap();
        }
    }
    contents
}

#[async_trait]
impl EngineClient for FakeEngine {
    async fn ping(&self) -> Result<(), EngineError> {
        Ok(())
    }

    async fn version(&self) -> Result<EngineVersion, EngineError> {
        if self.state().fail_version {
            return Err(EngineError::Transport("connection refused".to_string()));
        }
        Ok(EngineVersion {
            version: "27.0.1".to_string(),
            api_version: "1.46".to_string(),
        })
    }

    async fn list_containers(&self) -> Result<Vec<EngineContainer>, EngineError> {
        let mut state = self.state();
        state.calls.push("list".to_string());
        if state.fail_list {
            return Err(EngineError::Transport("connection reset".to_string()));
        }
        Ok(state
            .containers
            .iter()
            .chain(state.stale.iter())
            .cloned()
            .collect())
    }

    async fn image_exists(&self, reference: &str) -> Result<bool, EngineError> {
        Ok(self.state().images.contains(reference))
    }

    fn pull_image(&self, repository: &str, tag: &str) -> PullStream<'_> {
        let reference = format!("{}:{}", repository, tag);
        let mut state = self.state();
        state.calls.push("pull".to_string());
        state.pulls.push(reference.clone());

        if state.fail_pull {
            let events = vec![
                Ok(PullProgress::status(format!("Pulling from {}", repository))),
                Err(server_error("manifest unknown")),
            ];
            return stream::iter(events).boxed();
        }

        let mut events = vec![Ok(PullProgress::status(format!("Pulling from {}", repository)))];
        for layer in 0..state.pull_layers {
            events.push(Ok(PullProgress {
                status: "Downloading".to_string(),
                layer: Some(format!("layer{}", layer)),
                progress: None,
                current: Some(50),
                total: Some(100),
            }));
        }
        state.images.insert(reference);
        stream::iter(events).boxed()
    }

    fn build_image(&self, context: Vec<u8>, tag: &str) -> BuildStream<'_> {
        let dockerfile = dockerfile_from(&context);
        let mut state = self.state();
        state.calls.push("build".to_string());
        state.builds.push((tag.to_string(), dockerfile));

        let mut lines = vec![
            Ok(BuildLine::Output("Step 1/4 : FROM base\n".to_string())),
            Ok(BuildLine::Output("\n".to_string())),
        ];
        match state.fail_build.clone() {
            Some(message) => lines.push(Ok(BuildLine::Error(message))),
            None => {
                lines.push(Ok(BuildLine::Output(format!("Successfully tagged {}\n", tag))));
                state.images.insert(tag.to_string());
            }
        }
        stream::iter(lines).boxed()
    }

    async fn run_container(&self, spec: RunSpec) -> Result<String, EngineError> {
        let mut state = self.state();
        state.calls.push("run".to_string());
        state.runs.push(spec.clone());
        if state.fail_run {
            return Err(server_error("port is already allocated"));
        }

        let id = format!("{:0>64}", format!("c0ffee{}", state.runs.len()));
        state.containers.push(EngineContainer {
            id: id.clone(),
            name: spec.name,
            image: spec.image,
            labels: spec.labels,
            state: "running".to_string(),
            ports: spec
                .ports
                .iter()
                .map(|p| PublishedPort {
                    container_port: p.container_port,
                    host_port: Some(p.host_port),
                })
                .collect(),
        });
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), EngineError> {
        let mut state = self.state();
        state.calls.push("start".to_string());
        let container = state
            .containers
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| not_found(id))?;
        container.state = "running".to_string();
        state.started.push(id.to_string());
        Ok(())
    }

    async fn stop_container(&self, id: &str) -> Result<(), EngineError> {
        let mut state = self.state();
        state.calls.push("stop".to_string());
        let container = state
            .containers
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| not_found(id))?;
        container.state = "exited".to_string();
        state.stopped.push(id.to_string());
        Ok(())
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), EngineError> {
        let mut state = self.state();
        state.calls.push("remove".to_string());
        state.removals.push((id.to_string(), force));
        if state.fail_remove {
            return Err(server_error("removal already in progress"));
        }
        let before = state.containers.len();
        state.containers.retain(|c| c.id != id);
        if state.containers.len() == before {
            return Err(not_found(id));
        }
        Ok(())
    }
}

/// Labels of the container `id`.
pub fn labels_of(engine: &FakeEngine, id: &str) -> HashMap<String, String> {
    engine
        .state()
        .containers
        .iter()
        .find(|c| c.id == id)
        .map(|c| c.labels.clone())
        .unwrap_or_default()
}
