//! Tag resolution: (OS family, desktop, mode, arch) → image reference.
//!
//! The base image publishes one tag per combination, `{arch}-{os}-{desktop}`,
//! plus `latest` for the Alpine + Xfce baseline. Unknown combinations pass
//! through verbatim; the pull is what rejects them.

use std::fmt;

use crate::session::SessionMode;

/// Repository holding every desktop variant.
pub const DEFAULT_REPOSITORY: &str = "lscr.io/linuxserver/webtop";

/// Tag of the Alpine + Xfce baseline, also used for Default mode.
pub const BASELINE_TAG: &str = "latest";

const BASELINE_OS: &str = "alpine";
const BASELINE_DESKTOP: &str = "xfce";

/// Image architecture prefix used in tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    Amd64,
    Arm64v8,
}

impl Arch {
    /// Map a machine name (`uname -m` style) to a tag prefix.
    ///
    /// Unrecognised machines fall back to `amd64`.
    pub fn from_machine(machine: &str) -> Self {
        match machine.to_ascii_lowercase().as_str() {
            "aarch64" | "arm64" => Arch::Arm64v8,
            _ => Arch::Amd64,
        }
    }

    /// Architecture of the running host.
    pub fn detect() -> Self {
        Self::from_machine(std::env::consts::ARCH)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::Amd64 => "amd64",
            Arch::Arm64v8 => "arm64v8",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `repository[:tag]`, e.g. `lscr.io/linuxserver/webtop:latest`.
///
/// Locally built images (`vaultos-custom-alice`) carry no explicit tag and
/// display as the bare name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    repository: String,
    tag: Option<String>,
}

impl ImageReference {
    pub fn new(repository: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            tag: Some(tag.into()),
        }
    }

    /// An image name with no explicit tag.
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            repository: name.into(),
            tag: None,
        }
    }

    /// Split a reference on its tag separator.
    ///
    /// A colon that belongs to a registry port (`host:5000/repo`) is not a
    /// tag separator.
    pub fn parse(reference: &str) -> Self {
        match reference.rsplit_once(':') {
            Some((repository, tag)) if !tag.contains('/') => Self::new(repository, tag),
            _ => Self::local(reference),
        }
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Tag to request from the registry (`latest` when none is set).
    pub fn pull_tag(&self) -> &str {
        self.tag.as_deref().unwrap_or(BASELINE_TAG)
    }

    /// Whether the image derives from the Alpine baseline.
    ///
    /// `latest` is the Alpine baseline; any other reference counts as Alpine
    /// when its name mentions it.
    pub fn is_alpine_based(&self) -> bool {
        self.tag.as_deref() == Some(BASELINE_TAG) || self.to_string().contains(BASELINE_OS)
    }

    /// OS family and desktop keys encoded in the tag, if it follows the
    /// variant naming scheme.
    ///
    /// A registry path without a tag (`lscr.io/linuxserver/webtop`) is the
    /// engine's implicit `latest`.
    pub fn variant(&self) -> Option<(String, String)> {
        let tag = match self.tag.as_deref() {
            Some(tag) => tag,
            None if self.repository.contains('/') => BASELINE_TAG,
            None => return None,
        };
        if tag == BASELINE_TAG {
            return Some((BASELINE_OS.to_string(), BASELINE_DESKTOP.to_string()));
        }
        let parts: Vec<&str> = tag.split('-').collect();
        match parts.as_slice() {
            [_arch, os, desktop, ..] => Some((os.to_string(), desktop.to_string())),
            [os, desktop] => Some((os.to_string(), desktop.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag {
            Some(tag) => write!(f, "{}:{}", self.repository, tag),
            None => f.write_str(&self.repository),
        }
    }
}

/// Tag for a requested combination.
///
/// Default mode always runs the baseline. Otherwise the baseline is used when
/// the combination coincides with it, and `{arch}-{os}-{desktop}` for
/// everything else.
pub fn resolve_tag(os_family: &str, desktop: &str, mode: SessionMode, arch: Arch) -> String {
    if mode == SessionMode::Default {
        return BASELINE_TAG.to_string();
    }
    if os_family == BASELINE_OS && desktop == BASELINE_DESKTOP {
        return BASELINE_TAG.to_string();
    }
    format!("{}-{}-{}", arch, os_family, desktop)
}

/// Resolves full image references against one repository.
#[derive(Debug, Clone)]
pub struct TagResolver {
    repository: String,
}

impl Default for TagResolver {
    fn default() -> Self {
        Self::new(DEFAULT_REPOSITORY)
    }
}

impl TagResolver {
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
        }
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn resolve(
        &self,
        os_family: &str,
        desktop: &str,
        mode: SessionMode,
        arch: Arch,
    ) -> ImageReference {
        ImageReference::new(
            self.repository.clone(),
            resolve_tag(os_family, desktop, mode, arch),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mode_is_always_baseline() {
        assert_eq!(resolve_tag("alpine", "xfce", SessionMode::Default, Arch::Amd64), "latest");
        assert_eq!(resolve_tag("arch", "kde", SessionMode::Default, Arch::Arm64v8), "latest");
    }

    #[test]
    fn test_baseline_combination() {
        assert_eq!(resolve_tag("alpine", "xfce", SessionMode::Persistent, Arch::Amd64), "latest");
        assert_eq!(resolve_tag("alpine", "xfce", SessionMode::Ephemeral, Arch::Arm64v8), "latest");
    }

    #[test]
    fn test_variant_tag() {
        assert_eq!(
            resolve_tag("arch", "kde", SessionMode::Persistent, Arch::Arm64v8),
            "arm64v8-arch-kde"
        );
        assert_eq!(
            resolve_tag("alpine", "i3", SessionMode::Ephemeral, Arch::Amd64),
            "amd64-alpine-i3"
        );
        // Unknown values pass through untouched.
        assert_eq!(
            resolve_tag("gentoo", "twm", SessionMode::Persistent, Arch::Amd64),
            "amd64-gentoo-twm"
        );
    }

    #[test]
    fn test_resolve_is_repeatable() {
        let resolver = TagResolver::default();
        let first = resolver.resolve("debian", "mate", SessionMode::Ephemeral, Arch::Amd64);
        let second = resolver.resolve("debian", "mate", SessionMode::Ephemeral, Arch::Amd64);
        assert_eq!(first, second);
        assert_eq!(first.to_string(), "lscr.io/linuxserver/webtop:amd64-debian-mate");
    }

    #[test]
    fn test_arch_from_machine() {
        assert_eq!(Arch::from_machine("x86_64"), Arch::Amd64);
        assert_eq!(Arch::from_machine("AMD64"), Arch::Amd64);
        assert_eq!(Arch::from_machine("aarch64"), Arch::Arm64v8);
        assert_eq!(Arch::from_machine("arm64"), Arch::Arm64v8);
        assert_eq!(Arch::from_machine("riscv64"), Arch::Amd64);
    }

    #[test]
    fn test_parse_reference() {
        let image = ImageReference::parse("lscr.io/linuxserver/webtop:arm64v8-arch-kde");
        assert_eq!(image.repository(), "lscr.io/linuxserver/webtop");
        assert_eq!(image.tag(), Some("arm64v8-arch-kde"));

        let local = ImageReference::parse("vaultos-custom-alice");
        assert_eq!(local.tag(), None);
        assert_eq!(local.pull_tag(), "latest");
        assert_eq!(local.to_string(), "vaultos-custom-alice");

        let registry_port = ImageReference::parse("registry:5000/webtop");
        assert_eq!(registry_port.repository(), "registry:5000/webtop");
        assert_eq!(registry_port.tag(), None);
    }

    #[test]
    fn test_variant_round_trips_resolution() {
        let resolver = TagResolver::default();
        let image = resolver.resolve("fedora", "xfce", SessionMode::Persistent, Arch::Amd64);
        assert_eq!(image.variant(), Some(("fedora".to_string(), "xfce".to_string())));

        let baseline = resolver.resolve("arch", "kde", SessionMode::Default, Arch::Amd64);
        assert_eq!(baseline.variant(), Some(("alpine".to_string(), "xfce".to_string())));

        assert_eq!(ImageReference::local("vaultos-custom-bob").variant(), None);
    }

    #[test]
    fn test_untagged_registry_path_is_baseline() {
        let image = ImageReference::parse("lscr.io/linuxserver/webtop");
        assert_eq!(image.tag(), None);
        assert_eq!(image.variant(), Some(("alpine".to_string(), "xfce".to_string())));
        assert_eq!(ImageReference::parse("vaultos-custom-alice").variant(), None);
    }

    #[test]
    fn test_alpine_detection() {
        let resolver = TagResolver::default();
        assert!(resolver
            .resolve("alpine", "xfce", SessionMode::Default, Arch::Amd64)
            .is_alpine_based());
        assert!(resolver
            .resolve("alpine", "kde", SessionMode::Persistent, Arch::Amd64)
            .is_alpine_based());
        assert!(!resolver
            .resolve("ubuntu", "kde", SessionMode::Persistent, Arch::Amd64)
            .is_alpine_based());
    }
}
