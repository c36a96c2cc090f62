use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use bollard::Docker;
use bollard::image::BuildImageOptions;
use futures_util::StreamExt;
use tokio::sync::Mutex;
use tokio::time::sleep;

use crate::error::Result;
use crate::error::RunboxErr;
use crate::error::SandboxErr;
use crate::types::ImageEntry;
use crate::types::ImageState;
use crate::types::RuntimeProfile;

/// How long [`ImageManager::get_image`] polls an in-flight build before
/// giving up, matching the original `image_manager.py`'s 30 x 1s wait loop.
const POLL_ATTEMPTS: u32 = 30;
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Tracks build state for every [`RuntimeProfile`] and talks to the Docker
/// daemon through `bollard` to build, list, and remove the images PX runs
/// user code in. One `ImageManager` is shared (via `Arc`) across all PX
/// invocations in a process; its internal `Mutex` is the only lock it holds,
/// and nothing it calls while holding that lock acquires another one.
pub struct ImageManager {
    docker: Docker,
    state: Mutex<HashMap<RuntimeProfile, ImageEntry>>,
}

impl ImageManager {
    /// Probe for a reachable Docker daemon. A `RuntimeUnavailable` error here
    /// tells the Dispatcher to route every request to FX without attempting
    /// PX at all (spec §4.2, §6).
    pub async fn connect() -> Result<Arc<Self>> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| RunboxErr::Sandbox(SandboxErr::RuntimeUnavailable(e.to_string())))?;
        docker
            .ping()
            .await
            .map_err(|e| RunboxErr::Sandbox(SandboxErr::RuntimeUnavailable(e.to_string())))?;

        let manager = Arc::new(Self {
            docker,
            state: Mutex::new(HashMap::new()),
        });
        Ok(manager)
    }

    /// Kick off background builds for every profile so the common case finds
    /// a warm image already built or building (spec §4.2's "initialize
    /// eagerly" note). Build failures are logged, not propagated: a cold
    /// profile just gets built on first demand via [`Self::get_image`].
    pub fn initialize(self: &Arc<Self>) {
        for profile in [RuntimeProfile::Basic, RuntimeProfile::Enhanced] {
            let manager = Arc::clone(self);
            tokio::spawn(async move {
                if let Err(e) = manager.ensure_building(profile).await {
                    tracing::warn!(%profile, error = %e, "background image build failed");
                }
            });
        }
    }

    /// Return the launchable tag for `profile`, building it first if needed.
    /// Blocks the caller for up to `POLL_ATTEMPTS * POLL_INTERVAL` behind an
    /// in-flight build from another caller or from [`Self::initialize`]
    /// before giving up (spec §4.2 step 2).
    pub async fn get_image(self: &Arc<Self>, profile: RuntimeProfile) -> Result<String> {
        {
            let state = self.state.lock().await;
            if let Some(entry) = state.get(&profile) {
                if entry.state == ImageState::Built {
                    if let Some(tag) = &entry.tag {
                        return Ok(tag.clone());
                    }
                }
            }
        }

        self.ensure_building(profile).await?;

        for _ in 0..POLL_ATTEMPTS {
            {
                let state = self.state.lock().await;
                match state.get(&profile) {
                    Some(entry) if entry.state == ImageState::Built => {
                        if let Some(tag) = &entry.tag {
                            return Ok(tag.clone());
                        }
                    }
                    Some(entry) if entry.state == ImageState::Absent => {
                        return Err(RunboxErr::Sandbox(SandboxErr::ImageUnavailable(
                            profile.to_string(),
                        )));
                    }
                    _ => {}
                }
            }
            sleep(POLL_INTERVAL).await;
        }

        Err(RunboxErr::Sandbox(SandboxErr::ImageUnavailable(
            profile.to_string(),
        )))
    }

    /// Hand out a cloned client so the Primary Executor can talk to the same
    /// daemon connection without this manager's lock in the way. `bollard`'s
    /// `Docker` is a cheap handle around a shared transport, so cloning it is
    /// not a second connection.
    pub(crate) fn docker(&self) -> Docker {
        self.docker.clone()
    }

    /// Record a per-profile status snapshot for callers that just want to
    /// know whether an image is ready, building, or absent without waiting
    /// (spec §4.2 supplemental operation).
    pub async fn image_status(&self, profile: RuntimeProfile) -> ImageState {
        let state = self.state.lock().await;
        state
            .get(&profile)
            .map(|e| e.state)
            .unwrap_or(ImageState::Absent)
    }

    /// Remove every image this manager built that is not the current tag for
    /// its profile, then forget tags for images that no longer exist. Mirrors
    /// `cleanup_old_images`'s label-filtered removal; per-image failures are
    /// logged and otherwise ignored so one stuck image can't block the rest.
    pub async fn cleanup(&self, force: bool) -> Result<()> {
        let current_tags: Vec<String> = {
            let state = self.state.lock().await;
            state.values().filter_map(|e| e.tag.clone()).collect()
        };

        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec!["runbox.managed=true".to_string()]);
        let options = bollard::image::ListImagesOptions {
            all: force,
            filters,
            ..Default::default()
        };

        let images = self
            .docker
            .list_images(Some(options))
            .await
            .map_err(|e| RunboxErr::ImageManager(e.to_string()))?;

        for image in images {
            if image.repo_tags.iter().any(|t| current_tags.contains(t)) {
                continue;
            }
            if let Err(e) = self
                .docker
                .remove_image(&image.id, None, None)
                .await
            {
                tracing::warn!(image = %image.id, error = %e, "failed to remove stale sandbox image");
            }
        }
        Ok(())
    }

    /// Drop every cached tag and rebuild every profile from scratch (spec
    /// §4.2 supplemental operation), for operators rotating a base image.
    /// Mirrors `initialize`'s per-profile isolation: one profile's build
    /// error is logged and does not abort the others' rebuilds.
    pub async fn rebuild_all(self: &Arc<Self>) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            state.clear();
        }
        for profile in [RuntimeProfile::Basic, RuntimeProfile::Enhanced] {
            if let Err(e) = self.ensure_building(profile).await {
                tracing::warn!(%profile, error = %e, "rebuild failed for profile");
            }
        }
        Ok(())
    }

    /// Start (or join) a build for `profile` if none is already in flight or
    /// complete. Holds the state mutex only long enough to flip the flag
    /// before releasing it for the actual (slow) Docker build call, mirroring
    /// `image_manager.py`'s `building_lock`-guarded `build_status` flag.
    async fn ensure_building(&self, profile: RuntimeProfile) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            match state.get(&profile) {
                Some(entry) if entry.state != ImageState::Absent => return Ok(()),
                _ => {
                    state.insert(
                        profile,
                        ImageEntry {
                            profile,
                            state: ImageState::Building,
                            tag: None,
                            last_used: Instant::now(),
                        },
                    );
                }
            }
        }

        let result = self.build_image(profile).await;

        let mut state = self.state.lock().await;
        match &result {
            Ok(tag) => {
                state.insert(
                    profile,
                    ImageEntry {
                        profile,
                        state: ImageState::Built,
                        tag: Some(tag.clone()),
                        last_used: Instant::now(),
                    },
                );
            }
            Err(_) => {
                state.insert(
                    profile,
                    ImageEntry {
                        profile,
                        state: ImageState::Absent,
                        tag: None,
                        last_used: Instant::now(),
                    },
                );
            }
        }
        result.map(|_| ())
    }

    /// Generate a Dockerfile for `profile` and build it with `bollard`,
    /// returning the tag on success. The Dockerfile templates follow the
    /// original `_generate_optimized_dockerfile`: an Alpine base, a
    /// build-then-strip apk layer, and a non-root `sandbox` user.
    async fn build_image(&self, profile: RuntimeProfile) -> Result<String> {
        let tag = format!("runbox-sandbox-{}:latest", profile.as_str());
        let dockerfile = dockerfile_for(profile);

        let mut tar_builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_path("Dockerfile").map_err(RunboxErr::Io)?;
        header.set_size(dockerfile.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        tar_builder
            .append(&header, dockerfile.as_bytes())
            .map_err(RunboxErr::Io)?;
        let tar_bytes = tar_builder.into_inner().map_err(RunboxErr::Io)?;

        let options = BuildImageOptions {
            dockerfile: "Dockerfile",
            t: tag.as_str(),
            rm: true,
            labels: HashMap::from([("runbox.managed", "true")]),
            ..Default::default()
        };

        let mut stream = self
            .docker
            .build_image(options, None, Some(tar_bytes.into()));

        while let Some(chunk) = stream.next().await {
            let info = chunk.map_err(|e| RunboxErr::ImageManager(e.to_string()))?;
            if let Some(error) = info.error {
                return Err(RunboxErr::ImageManager(error));
            }
        }

        Ok(tag)
    }
}

/// The two Dockerfile templates the original image manager generates:
/// `basic` (bare interpreter) and `enhanced` (adds numpy/scipy/pandas and
/// friends). Both strip build-only packages in the same layer they're
/// installed in to keep the final image small. Neither sets an `ENTRYPOINT`:
/// `PrimaryExecutor` supplies the full `python3 -u /app/main.py` command per
/// container, and an image-level `ENTRYPOINT` would have doubled up with it.
fn dockerfile_for(profile: RuntimeProfile) -> String {
    match profile {
        RuntimeProfile::Basic => {
            r#"FROM python:3.11-alpine
RUN adduser -D -u 1000 sandbox
WORKDIR /app
USER sandbox
"#
            .to_string()
        }
        RuntimeProfile::Enhanced => {
            r#"FROM python:3.11-alpine
RUN apk add --no-cache --virtual .build-deps gcc g++ musl-dev linux-headers \
    && pip install --no-cache-dir numpy scipy pandas matplotlib sympy requests \
    && apk del .build-deps
RUN adduser -D -u 1000 sandbox
WORKDIR /app
USER sandbox
"#
            .to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dockerfile_templates_create_unprivileged_user() {
        for profile in [RuntimeProfile::Basic, RuntimeProfile::Enhanced] {
            let df = dockerfile_for(profile);
            assert!(df.contains("USER sandbox"));
            assert!(df.contains("adduser"));
        }
    }

    #[test]
    fn enhanced_dockerfile_installs_data_science_stack() {
        let df = dockerfile_for(RuntimeProfile::Enhanced);
        assert!(df.contains("numpy"));
        assert!(df.contains("pandas"));
        assert!(df.contains(".build-deps"));
    }
}
