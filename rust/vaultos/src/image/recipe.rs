//! Identity-rename layer for Advanced sessions.
//!
//! The base images ship a default account (`abc`) owning `/config`. An
//! Advanced session gets a one-off image where that account is renamed to
//! the requested user, home moved to `/home/{user}` (with a compatibility
//! symlink at the old path), init scripts rewritten, the password set to the
//! username and password-less sudo granted.
//!
//! The recipe is rendered as a Dockerfile and packed into an in-memory tar,
//! which is the whole build context.

use super::ImageReference;

/// Account baked into the base images.
pub const DEFAULT_ACCOUNT: &str = "abc";

/// Application state directory inside the base images.
pub const APP_STATE_DIR: &str = "/config";

/// Prefix of locally built identity images.
pub const CUSTOM_IMAGE_PREFIX: &str = "vaultos-custom-";

/// Init-system locations that may reference the default account by name.
const INIT_SCRIPT_DIRS: &[&str] = &["/etc/cont-init.d", "/etc/services.d", "/etc/s6-overlay"];

/// Packages missing from the Alpine base that the rename needs.
const ALPINE_PACKAGES: &[&str] = &["sudo", "shadow", "bash"];

/// Which package family the base image belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeFlavor {
    /// Minimal Alpine base: install sudo/shadow/bash first.
    Alpine,
    /// Debian, Ubuntu, Fedora, Arch and EL bases already have the tools.
    Standard,
}

impl RecipeFlavor {
    pub fn for_base(base: &ImageReference) -> Self {
        if base.is_alpine_based() {
            RecipeFlavor::Alpine
        } else {
            RecipeFlavor::Standard
        }
    }
}

/// Tag of the identity image for `username`.
pub fn custom_tag(username: &str) -> String {
    format!("{}{}", CUSTOM_IMAGE_PREFIX, username)
}

/// Home directory of `username` inside the identity image.
pub fn home_dir(username: &str) -> String {
    format!("/home/{}", username)
}

/// Render the Dockerfile deriving `base` with the account renamed.
pub fn render_recipe(base: &ImageReference, username: &str) -> String {
    let user = username;
    let old = DEFAULT_ACCOUNT;
    let home = home_dir(user);
    let old_home = home_dir(old);

    let mut steps: Vec<String> = Vec::new();
    if RecipeFlavor::for_base(base) == RecipeFlavor::Alpine {
        steps.push(format!("apk add --no-cache {}", ALPINE_PACKAGES.join(" ")));
    }
    steps.extend([
        format!("usermod -l {user} {old}"),
        format!("(groupmod -n {user} {old} || true)"),
        format!(
            "if [ -d \"{old_home}\" ]; then mv {old_home} {home}; else mkdir -p {home}; fi"
        ),
        format!("usermod -d {home} {user}"),
        format!("ln -s {home} {old_home}"),
        format!("chown -R {user}:{user} {home}"),
        format!("(chown -R {user}:{user} {APP_STATE_DIR} || true)"),
        format!(
            "(find {} -type f -exec sed -i 's/{old}/{user}/g' {{}} + || true)",
            INIT_SCRIPT_DIRS.join(" ")
        ),
        format!("echo '{user}:{user}' | chpasswd"),
        format!("echo '{user} ALL=(ALL) NOPASSWD: ALL' > /etc/sudoers.d/{user}"),
        format!("chmod 0440 /etc/sudoers.d/{user}"),
    ]);

    format!(
        "FROM {base}\nENV USER={user}\nENV HOME={home}\nRUN {}\n",
        steps.join(" && \\\n    ")
    )
}

/// Pack a Dockerfile into an uncompressed tar build context.
pub fn build_context(dockerfile: &str) -> std::io::Result<Vec<u8>> {
    let bytes = dockerfile.as_bytes();
    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    builder.append_data(&mut header, "Dockerfile", bytes)?;
    builder.into_inner()
}
