//! Session lifecycle orchestration.
//!
//! [`SessionManager`] is the single entry point front-ends use: create,
//! start, stop, delete, list and status. Every call goes straight to the
//! engine; no session state lives in this process.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::{SessionConfig, SessionKind, SessionMode};
use super::expiry::{parse_timer_at, unix_now, Countdown, ExpiryPruner};
use super::registry::{
    ManagedSession, SessionRegistry, APP_LABEL, APP_LABEL_VALUE, EXPIRES_LABEL, NAME_PREFIX,
    WEB_PORT,
};
use crate::catalog;
use crate::config::Config;
use crate::engine::{
    EngineClient, PortBinding, PullProgress, ResourceLimits, RestartPolicy, RunSpec,
    VolumeBinding,
};
use crate::error::{LifecycleOp, Result, VaultError};
use crate::image::recipe::{home_dir, APP_STATE_DIR};
use crate::image::{Arch, ImageProvisioner, ImageReference, TagResolver};

/// Environment every desktop container starts with.
const CONTAINER_ENV: &[&str] = &["PUID=1000", "PGID=1000", "TZ=Etc/UTC"];

const SHM_SIZE_BYTES: i64 = 1 << 30;
const MEMORY_BYTES: i64 = 1 << 30;
/// Two CPUs.
const NANO_CPUS: i64 = 2_000_000_000;

/// Buffered pull events for a background create.
pub const PROGRESS_CHANNEL_CAPACITY: usize = 64;

/// Baseline combination Default mode runs.
const DEFAULT_OS: &str = "alpine";
const DEFAULT_DESKTOP: &str = "xfce";

/// `vaultos-{5 hex}-{display name}`.
pub fn generate_container_name(display_name: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{}{}-{}", NAME_PREFIX, &id[..5], display_name)
}

/// A create running on its own task.
///
/// Dropping `progress` stops event delivery; the create itself carries on.
pub struct CreateTask {
    pub handle: JoinHandle<Result<String>>,
    pub progress: mpsc::Receiver<PullProgress>,
}

/// One row of the active-sessions view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveSession {
    pub id: String,
    pub short_id: String,
    pub name: String,
    pub status: String,
    /// OS display label derived from the image tag; `None` for custom images.
    pub os: Option<String>,
    pub desktop: Option<String>,
    pub host_port: Option<u16>,
    /// Time left for ephemeral sessions.
    pub expiry: Option<Countdown>,
}

impl ActiveSession {
    pub fn from_session(session: &ManagedSession, now: f64) -> Self {
        let variant = ImageReference::parse(&session.image).variant();
        Self {
            id: session.id.clone(),
            short_id: session.short_id().to_string(),
            name: session.name.clone(),
            status: session.status.to_string(),
            os: variant.as_ref().map(|(os, _)| catalog::os_label(os)),
            desktop: variant.as_ref().map(|(_, desktop)| catalog::desktop_label(desktop)),
            host_port: session.host_port,
            expiry: session
                .expires_at()
                .map(|expires_at| Countdown::until(expires_at, now)),
        }
    }
}

/// Engine and fleet snapshot for the status bar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemStatus {
    pub engine_version: String,
    pub api_version: String,
    pub total: usize,
    pub running: usize,
    pub stopped: usize,
    pub connected: bool,
}

impl SystemStatus {
    pub fn disconnected() -> Self {
        Self {
            engine_version: "N/A".to_string(),
            api_version: "N/A".to_string(),
            total: 0,
            running: 0,
            stopped: 0,
            connected: false,
        }
    }
}

/// Orchestrates sessions on one engine.
#[derive(Clone)]
pub struct SessionManager {
    engine: Arc<dyn EngineClient>,
    resolver: TagResolver,
    provisioner: ImageProvisioner,
    registry: SessionRegistry,
    pruner: ExpiryPruner,
    arch: Arch,
}

impl SessionManager {
    pub fn new(engine: Arc<dyn EngineClient>) -> Self {
        Self::with_resolver(engine, TagResolver::default())
    }

    pub fn from_config(engine: Arc<dyn EngineClient>, config: &Config) -> Self {
        Self::with_resolver(engine, TagResolver::new(config.image.repository.clone()))
    }

    fn with_resolver(engine: Arc<dyn EngineClient>, resolver: TagResolver) -> Self {
        let registry = SessionRegistry::new(engine.clone());
        Self {
            provisioner: ImageProvisioner::new(engine.clone()),
            pruner: ExpiryPruner::new(registry.clone(), engine.clone()),
            registry,
            resolver,
            engine,
            arch: Arch::detect(),
        }
    }

    /// Override the detected host architecture.
    pub fn with_arch(mut self, arch: Arch) -> Self {
        self.arch = arch;
        self
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }

    /// Create and start a session; returns the engine's container id.
    ///
    /// Steps run strictly in order: name, resolve, custom build (Advanced
    /// only), ensure image, run. A failure aborts the remaining steps and
    /// leaves already-pulled or built images cached.
    pub async fn create(
        &self,
        config: &SessionConfig,
        progress: Option<mpsc::Sender<PullProgress>>,
    ) -> Result<String> {
        let name = generate_container_name(config.display_name());

        let (os_family, desktop) = match config.desktop() {
            Some(choice) => (choice.os_family.as_str(), choice.desktop.as_str()),
            None => (DEFAULT_OS, DEFAULT_DESKTOP),
        };
        let base = self
            .resolver
            .resolve(os_family, desktop, config.mode(), self.arch);
        info!(name = %name, mode = %config.mode(), image = %base, "Creating session");

        let image = match config.advanced() {
            Some(identity) => {
                self.provisioner
                    .build_custom(&base, &identity.username)
                    .await?
            }
            None => base,
        };

        self.provisioner.ensure(&image, progress.as_ref()).await?;

        let spec = Self::plan_run(config, &image, &name, unix_now());
        debug!(name = %name, ?spec, "Running container");
        let id = self
            .engine
            .run_container(spec)
            .await
            .map_err(|source| VaultError::lifecycle(LifecycleOp::Create, name.clone(), source))?;

        info!(name = %name, id = %id, "Session created");
        Ok(id)
    }

    /// Run on a background task, streaming pull progress back.
    pub fn spawn_create(&self, config: SessionConfig) -> CreateTask {
        let (tx, rx) = mpsc::channel(PROGRESS_CHANNEL_CAPACITY);
        let manager = self.clone();
        let handle = tokio::spawn(async move { manager.create(&config, Some(tx)).await });
        CreateTask {
            handle,
            progress: rx,
        }
    }

    /// The run request for `config` on `image`, as of `now`.
    pub fn plan_run(config: &SessionConfig, image: &ImageReference, name: &str, now: f64) -> RunSpec {
        let mut labels = HashMap::from([(APP_LABEL.to_string(), APP_LABEL_VALUE.to_string())]);
        let mut volumes = Vec::new();

        match config.kind() {
            SessionKind::Default => {}
            SessionKind::Ephemeral { timer, .. } => {
                labels.insert(
                    EXPIRES_LABEL.to_string(),
                    parse_timer_at(timer, now).to_string(),
                );
            }
            SessionKind::Persistent {
                volume, advanced, ..
            } => {
                volumes.push(VolumeBinding::read_write(volume, APP_STATE_DIR));
                if let Some(identity) = advanced {
                    volumes.push(VolumeBinding::read_write(
                        &identity.home_dir,
                        home_dir(&identity.username),
                    ));
                }
            }
        }

        let restart_policy = match config.mode() {
            SessionMode::Ephemeral => RestartPolicy::Never,
            SessionMode::Default | SessionMode::Persistent => RestartPolicy::UnlessStopped,
        };

        RunSpec {
            image: image.to_string(),
            name: name.to_string(),
            labels,
            env: CONTAINER_ENV.iter().map(|e| e.to_string()).collect(),
            ports: vec![PortBinding {
                container_port: WEB_PORT,
                host_port: config.port(),
            }],
            volumes,
            limits: ResourceLimits {
                shm_size_bytes: SHM_SIZE_BYTES,
                memory_bytes: MEMORY_BYTES,
                nano_cpus: NANO_CPUS,
            },
            restart_policy,
        }
    }

    pub async fn start(&self, id: &str) -> Result<()> {
        info!(id, "Starting session");
        self.engine
            .start_container(id)
            .await
            .map_err(|source| VaultError::lifecycle(LifecycleOp::Start, id, source))
    }

    pub async fn stop(&self, id: &str) -> Result<()> {
        info!(id, "Stopping session");
        self.engine
            .stop_container(id)
            .await
            .map_err(|source| VaultError::lifecycle(LifecycleOp::Stop, id, source))
    }

    /// Remove a session whatever its run state.
    pub async fn delete(&self, id: &str) -> Result<()> {
        info!(id, "Deleting session");
        self.engine
            .remove_container(id, true)
            .await
            .map_err(|source| VaultError::lifecycle(LifecycleOp::Delete, id, source))
    }

    pub async fn list_managed(&self) -> Result<Vec<ManagedSession>> {
        self.registry.list_managed().await
    }

    /// Remove expired sessions; returns the survivors.
    pub async fn sweep(&self) -> Result<Vec<ManagedSession>> {
        self.pruner.sweep().await
    }

    pub async fn sweep_at(&self, now: f64) -> Result<Vec<ManagedSession>> {
        self.pruner.sweep_at(now).await
    }

    /// Display rows for every managed session. Expired sessions show
    /// `expired` until the next sweep removes them.
    pub async fn list_active(&self) -> Result<Vec<ActiveSession>> {
        self.list_active_at(unix_now()).await
    }

    pub async fn list_active_at(&self, now: f64) -> Result<Vec<ActiveSession>> {
        let sessions = self.registry.list_managed().await?;
        Ok(sessions
            .iter()
            .map(|session| ActiveSession::from_session(session, now))
            .collect())
    }

    /// Never fails: an unreachable engine yields [`SystemStatus::disconnected`].
    pub async fn system_status(&self) -> SystemStatus {
        match self.try_system_status().await {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "Engine status unavailable");
                SystemStatus::disconnected()
            }
        }
    }

    async fn try_system_status(&self) -> Result<SystemStatus> {
        let version = self
            .engine
            .version()
            .await
            .map_err(VaultError::Connectivity)?;
        let sessions = self.registry.list_managed().await?;
        let running = sessions.iter().filter(|s| s.is_running()).count();

        Ok(SystemStatus {
            engine_version: version.version,
            api_version: version.api_version,
            total: sessions.len(),
            running,
            stopped: sessions.len() - running,
            connected: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{AdvancedIdentity, DesktopChoice, SessionStatus};
    use std::path::PathBuf;

    fn webtop(tag: &str) -> ImageReference {
        ImageReference::new("lscr.io/linuxserver/webtop", tag)
    }

    #[test]
    fn test_generated_name() {
        let name = generate_container_name("demo");
        assert!(name.starts_with("vaultos-"));
        assert!(name.ends_with("-demo"));
        let id = &name["vaultos-".len()..name.len() - "-demo".len()];
        assert_eq!(id.len(), 5);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(generate_container_name("demo"), generate_container_name("demo"));
    }

    #[test]
    fn test_plan_default() {
        let config = SessionConfig::default_mode("demo", 4001).unwrap();
        let spec = SessionManager::plan_run(&config, &webtop("latest"), "vaultos-abcde-demo", 0.0);

        assert_eq!(spec.image, "lscr.io/linuxserver/webtop:latest");
        assert_eq!(spec.labels.len(), 1);
        assert_eq!(spec.labels.get("app").map(String::as_str), Some("vaultOS"));
        assert_eq!(spec.env, vec!["PUID=1000", "PGID=1000", "TZ=Etc/UTC"]);
        assert_eq!(
            spec.ports,
            vec![PortBinding {
                container_port: 3000,
                host_port: 4001
            }]
        );
        assert!(spec.volumes.is_empty());
        assert_eq!(spec.restart_policy, RestartPolicy::UnlessStopped);
        assert_eq!(spec.limits.shm_size_bytes, 1_073_741_824);
        assert_eq!(spec.limits.memory_bytes, 1_073_741_824);
        assert_eq!(spec.limits.nano_cpus, 2_000_000_000);
    }

    #[test]
    fn test_plan_ephemeral() {
        let desktop = DesktopChoice::new("alpine", "xfce").unwrap();
        let config = SessionConfig::ephemeral("demo2", 4002, desktop, "5s").unwrap();
        let spec = SessionManager::plan_run(&config, &webtop("latest"), "n", 1_000.0);

        assert_eq!(spec.labels.get(EXPIRES_LABEL).map(String::as_str), Some("1005"));
        assert_eq!(spec.restart_policy, RestartPolicy::Never);
        assert!(spec.volumes.is_empty());
    }

    #[test]
    fn test_plan_persistent_advanced() {
        let desktop = DesktopChoice::new("ubuntu", "kde").unwrap();
        let identity = AdvancedIdentity::new("alice", "/h").unwrap();
        let config =
            SessionConfig::persistent("work", 4003, desktop, "/v", Some(identity)).unwrap();
        let spec = SessionManager::plan_run(
            &config,
            &ImageReference::local("vaultos-custom-alice"),
            "n",
            0.0,
        );

        assert_eq!(spec.image, "vaultos-custom-alice");
        assert!(!spec.labels.contains_key(EXPIRES_LABEL));
        assert_eq!(spec.restart_policy, RestartPolicy::UnlessStopped);
        assert_eq!(
            spec.volumes,
            vec![
                VolumeBinding::read_write(PathBuf::from("/v"), "/config"),
                VolumeBinding::read_write(PathBuf::from("/h"), "/home/alice"),
            ]
        );
    }

    #[test]
    fn test_active_session_row() {
        let session = ManagedSession {
            id: "f00dbabe1234567890".to_string(),
            name: "vaultos-abcde-demo".to_string(),
            image: "lscr.io/linuxserver/webtop:amd64-el-i3".to_string(),
            labels: HashMap::from([(EXPIRES_LABEL.to_string(), "1100".to_string())]),
            status: SessionStatus::Running,
            host_port: Some(4001),
        };
        let row = ActiveSession::from_session(&session, 1_000.0);
        assert_eq!(row.short_id, "f00dbabe1234");
        assert_eq!(row.os.as_deref(), Some("Enterprise Linux"));
        assert_eq!(row.desktop.as_deref(), Some("I3"));
        assert_eq!(row.status, "running");
        assert_eq!(row.expiry.map(|c| c.to_string()).as_deref(), Some("00:00:01:40"));

        let custom = ManagedSession {
            image: "vaultos-custom-alice".to_string(),
            labels: HashMap::new(),
            ..session
        };
        let row = ActiveSession::from_session(&custom, 1_000.0);
        assert_eq!(row.os, None);
        assert_eq!(row.desktop, None);
        assert_eq!(row.expiry, None);
    }

    #[test]
    fn test_disconnected_status() {
        let status = SystemStatus::disconnected();
        assert!(!status.connected);
        assert_eq!(status.engine_version, "N/A");
        assert_eq!(status.total, 0);
    }
}
