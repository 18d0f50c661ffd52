//! Session configuration.
//!
//! [`SessionRequest`] is what the creation wizard hands over: loose strings
//! and flags. [`SessionConfig`] is the validated form, one [`SessionKind`]
//! variant per mode carrying exactly the fields that mode needs.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VaultError};

/// Account names the identity image can be built for.
static USERNAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z_][a-z0-9_-]{0,31}$").expect("username pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Alpine + Xfce baseline, restarted unless stopped.
    #[default]
    Default,
    /// Host-backed `/config` volume, optionally with a custom account.
    Persistent,
    /// Bounded lifetime, removed by the pruner once expired.
    Ephemeral,
}

impl std::fmt::Display for SessionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionMode::Default => write!(f, "default"),
            SessionMode::Persistent => write!(f, "persistent"),
            SessionMode::Ephemeral => write!(f, "ephemeral"),
        }
    }
}

/// OS family and desktop environment keys (`arch`, `kde`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesktopChoice {
    pub os_family: String,
    pub desktop: String,
}

impl DesktopChoice {
    pub fn new(os_family: impl Into<String>, desktop: impl Into<String>) -> Result<Self> {
        Ok(Self {
            os_family: required("os", os_family.into())?,
            desktop: required("desktop", desktop.into())?,
        })
    }
}

/// Custom account for an Advanced persistent session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvancedIdentity {
    pub username: String,
    /// Host directory mounted as the account's home.
    pub home_dir: PathBuf,
}

impl AdvancedIdentity {
    pub fn new(username: impl Into<String>, home_dir: impl Into<PathBuf>) -> Result<Self> {
        let username = required("username", username.into())?;
        if !USERNAME_PATTERN.is_match(&username) {
            return Err(VaultError::validation(
                "username",
                format!("'{}' is not a valid account name", username),
            ));
        }
        let home_dir = home_dir.into();
        if home_dir.as_os_str().is_empty() {
            return Err(VaultError::validation("homedir", "is required"));
        }
        Ok(Self { username, home_dir })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionKind {
    Default,
    Persistent {
        desktop: DesktopChoice,
        /// Host directory bound to the app-state directory.
        volume: PathBuf,
        advanced: Option<AdvancedIdentity>,
    },
    Ephemeral {
        desktop: DesktopChoice,
        /// Timer text such as `30s`, `1h`, `2d`.
        timer: String,
    },
}

/// A validated request for one new session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    display_name: String,
    port: u16,
    kind: SessionKind,
}

impl SessionConfig {
    pub fn default_mode(display_name: impl Into<String>, port: u16) -> Result<Self> {
        Self::new(display_name.into(), port, SessionKind::Default)
    }

    pub fn ephemeral(
        display_name: impl Into<String>,
        port: u16,
        desktop: DesktopChoice,
        timer: impl Into<String>,
    ) -> Result<Self> {
        let timer = required("timer", timer.into())?;
        Self::new(display_name.into(), port, SessionKind::Ephemeral { desktop, timer })
    }

    pub fn persistent(
        display_name: impl Into<String>,
        port: u16,
        desktop: DesktopChoice,
        volume: impl Into<PathBuf>,
        advanced: Option<AdvancedIdentity>,
    ) -> Result<Self> {
        let volume = volume.into();
        if volume.as_os_str().is_empty() {
            return Err(VaultError::validation("volume", "is required"));
        }
        Self::new(
            display_name.into(),
            port,
            SessionKind::Persistent {
                desktop,
                volume,
                advanced,
            },
        )
    }

    fn new(display_name: String, port: u16, kind: SessionKind) -> Result<Self> {
        let display_name = required("name", display_name)?;
        if port == 0 {
            return Err(VaultError::validation("port", "must be between 1 and 65535"));
        }
        Ok(Self {
            display_name,
            port,
            kind,
        })
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Host port the desktop's web interface is published on.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn kind(&self) -> &SessionKind {
        &self.kind
    }

    pub fn mode(&self) -> SessionMode {
        match self.kind {
            SessionKind::Default => SessionMode::Default,
            SessionKind::Persistent { .. } => SessionMode::Persistent,
            SessionKind::Ephemeral { .. } => SessionMode::Ephemeral,
        }
    }

    /// Requested OS / desktop; `None` in Default mode.
    pub fn desktop(&self) -> Option<&DesktopChoice> {
        match &self.kind {
            SessionKind::Default => None,
            SessionKind::Persistent { desktop, .. } | SessionKind::Ephemeral { desktop, .. } => {
                Some(desktop)
            }
        }
    }

    /// Custom account, for Advanced persistent sessions only.
    pub fn advanced(&self) -> Option<&AdvancedIdentity> {
        match &self.kind {
            SessionKind::Persistent { advanced, .. } => advanced.as_ref(),
            _ => None,
        }
    }
}

/// Raw wizard output, before validation.
///
/// Field names follow the wizard's form ids (`type`, `homedir`, ...). Fields
/// that do not apply to the selected mode are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub port: String,
    #[serde(rename = "type", default)]
    pub mode: SessionMode,
    pub os: Option<String>,
    pub desktop: Option<String>,
    pub timer: Option<String>,
    pub volume: Option<String>,
    #[serde(default)]
    pub advanced: bool,
    pub username: Option<String>,
    pub homedir: Option<String>,
}

impl TryFrom<SessionRequest> for SessionConfig {
    type Error = VaultError;

    fn try_from(req: SessionRequest) -> Result<Self> {
        let name = required("name", req.name)?;
        let port = parse_port(&req.port)?;

        match req.mode {
            SessionMode::Default => SessionConfig::default_mode(name, port),
            SessionMode::Ephemeral => {
                let desktop = desktop_choice(req.os, req.desktop)?;
                let timer = required("timer", req.timer.unwrap_or_default())?;
                SessionConfig::ephemeral(name, port, desktop, timer)
            }
            SessionMode::Persistent => {
                let desktop = desktop_choice(req.os, req.desktop)?;
                let volume = required("volume", req.volume.unwrap_or_default())?;
                let advanced = if req.advanced {
                    Some(AdvancedIdentity::new(
                        req.username.unwrap_or_default().trim(),
                        required("homedir", req.homedir.unwrap_or_default())?,
                    )?)
                } else {
                    None
                };
                SessionConfig::persistent(name, port, desktop, volume, advanced)
            }
        }
    }
}

fn desktop_choice(os: Option<String>, desktop: Option<String>) -> Result<DesktopChoice> {
    DesktopChoice::new(os.unwrap_or_default(), desktop.unwrap_or_default())
}

fn required(field: &'static str, value: String) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(VaultError::validation(field, "is required"));
    }
    Ok(trimmed.to_string())
}

fn parse_port(raw: &str) -> Result<u16> {
    let raw = required("port", raw.to_string())?;
    match raw.parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(VaultError::validation(
            "port",
            format!("'{}' is not a port between 1 and 65535", raw),
        )),
    }
}
