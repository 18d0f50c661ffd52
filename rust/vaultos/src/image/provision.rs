//! Image provisioning: local-store probe, pull with progress, custom builds.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use super::recipe::{build_context, custom_tag, render_recipe, RecipeFlavor};
use super::ImageReference;
use crate::engine::{BuildLine, EngineClient, PullProgress};
use crate::error::{Result, VaultError};

/// Ensures images are present locally and derives identity images.
#[derive(Clone)]
pub struct ImageProvisioner {
    engine: Arc<dyn EngineClient>,
}

impl ImageProvisioner {
    pub fn new(engine: Arc<dyn EngineClient>) -> Self {
        Self { engine }
    }

    /// Make sure `image` is in the local store, pulling it if absent.
    ///
    /// With a `progress` sender, every decoded pull event is forwarded. The
    /// forward never waits: events are dropped while the channel is full and
    /// forwarding stops once the receiver is gone, but the pull itself always
    /// runs to completion. Failures are not retried.
    pub async fn ensure(
        &self,
        image: &ImageReference,
        progress: Option<&mpsc::Sender<PullProgress>>,
    ) -> Result<()> {
        let reference = image.to_string();
        let present = self
            .engine
            .image_exists(&reference)
            .await
            .map_err(|source| VaultError::Provision {
                image: reference.clone(),
                source,
            })?;
        if present {
            debug!(image = %reference, "Image already present");
            return Ok(());
        }

        info!(image = %reference, "Image not found locally, pulling");
        let mut forwarder = ProgressForwarder::new(progress);
        forwarder.send(PullProgress::status(format!(
            "Image {} not found. Starting download...",
            reference
        )));

        let mut stream = self.engine.pull_image(image.repository(), image.pull_tag());
        while let Some(event) = stream.next().await {
            let event = event.map_err(|source| VaultError::Provision {
                image: reference.clone(),
                source,
            })?;
            debug!(image = %reference, "Pull progress: {}", event);
            forwarder.send(event);
        }

        info!(image = %reference, "Image pulled");
        Ok(())
    }

    /// Build the identity image renaming the default account to `username`.
    ///
    /// Always builds, even when a `vaultos-custom-{username}` image already
    /// exists; the engine's layer cache is the only reuse.
    pub async fn build_custom(
        &self,
        base: &ImageReference,
        username: &str,
    ) -> Result<ImageReference> {
        let tag = custom_tag(username);
        let flavor = RecipeFlavor::for_base(base);
        let recipe = render_recipe(base, username);
        let context = build_context(&recipe).map_err(|e| VaultError::Build {
            tag: tag.clone(),
            message: format!("failed to pack build context: {}", e),
            logs: Vec::new(),
        })?;

        info!(base = %base, tag = %tag, ?flavor, "Building custom identity image");

        let mut logs = Vec::new();
        let mut stream = self.engine.build_image(context, &tag);
        while let Some(line) = stream.next().await {
            match line {
                Ok(BuildLine::Output(text)) => {
                    let text = text.trim_end();
                    if !text.is_empty() {
                        debug!(tag = %tag, "{}", text);
                        logs.push(text.to_string());
                    }
                }
                Ok(BuildLine::Error(message)) => {
                    warn!(tag = %tag, error = %message, "Custom image build failed");
                    return Err(VaultError::Build { tag, message, logs });
                }
                Err(source) => {
                    warn!(tag = %tag, error = %source, "Custom image build failed");
                    return Err(VaultError::Build {
                        tag,
                        message: source.to_string(),
                        logs,
                    });
                }
            }
        }

        info!(tag = %tag, "Custom identity image built");
        Ok(ImageReference::local(tag))
    }
}

/// Non-blocking progress delivery to an optional observer.
struct ProgressForwarder<'a> {
    sender: Option<&'a mpsc::Sender<PullProgress>>,
}

impl<'a> ProgressForwarder<'a> {
    fn new(sender: Option<&'a mpsc::Sender<PullProgress>>) -> Self {
        Self { sender }
    }

    fn send(&mut self, event: PullProgress) {
        let Some(sender) = self.sender else {
            return;
        };
        match sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => debug!("Progress channel full, dropping event"),
            Err(TrySendError::Closed(_)) => {
                debug!("Progress receiver dropped, no longer forwarding");
                self.sender = None;
            }
        }
    }
}
