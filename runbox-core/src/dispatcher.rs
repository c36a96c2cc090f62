use std::sync::Arc;

use crate::error::RunboxErr;
use crate::error::SandboxErr;
use crate::error::error_message;
use crate::fallback_executor::FallbackExecutor;
use crate::image_manager::ImageManager;
use crate::primary_executor::PrimaryExecutor;
use crate::types::ExecutionRequest;
use crate::types::ExecutionResult;
use crate::types::ImageState;
use crate::types::RuntimeProfile;

/// Routes every execution request to the Primary Executor when Docker is
/// reachable and at least one image profile is built, falling back to the
/// subprocess-based Fallback Executor otherwise (spec §4.2, §6's "intelligent
/// fallback" priority: container sandbox first, subprocess sandbox second).
/// Never propagates an error out of [`Self::dispatch`]: every failure is
/// folded into a failed [`ExecutionResult`] instead.
pub struct Dispatcher {
    primary: Option<PrimaryExecutor>,
    images: Option<Arc<ImageManager>>,
    fallback: FallbackExecutor,
}

impl Dispatcher {
    /// Probe for a Docker daemon and, if one is reachable, kick off
    /// background image builds. A missing or unreachable daemon is not an
    /// error here: the Dispatcher degrades to fallback-only operation and
    /// logs why.
    pub async fn new() -> Self {
        match ImageManager::connect().await {
            Ok(images) => {
                images.initialize();
                let primary = PrimaryExecutor::new(images.docker(), Arc::clone(&images));
                Self {
                    primary: Some(primary),
                    images: Some(images),
                    fallback: FallbackExecutor::new(),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "container runtime unavailable, running fallback-only");
                Self {
                    primary: None,
                    images: None,
                    fallback: FallbackExecutor::new(),
                }
            }
        }
    }

    /// Run `request`, choosing a backend per the rules above and never
    /// failing outward: the worst case is a failed [`ExecutionResult`], not
    /// an `Err`.
    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
        if let Some(primary) = self.ready_primary().await {
            match primary
                .execute(
                    &request.code,
                    &request.files,
                    &request.stdin,
                    &request.config,
                    request.profile_hint,
                )
                .await
            {
                Ok(result) => return result,
                Err(RunboxErr::Sandbox(SandboxErr::Timeout(secs))) => {
                    // A watchdog firing is PX's own definitive result (spec
                    // §4.3 failure table, §7 item 6): it is not grounds for a
                    // second attempt via the weaker Fallback Executor.
                    tracing::warn!(seconds = secs, "primary executor timed out");
                    return timeout_result(secs);
                }
                Err(e) => {
                    if request.high_risk {
                        tracing::error!(error = %e, "primary executor failed for high-risk request, not retrying via fallback");
                        return ExecutionResult::failure(error_message(&e));
                    }
                    tracing::warn!(error = %e, "primary executor failed, retrying via fallback");
                }
            }
        } else if request.high_risk {
            let reason = self.unavailability_reason();
            tracing::error!(reason = %reason, "primary executor unavailable for high-risk request, refusing fallback");
            return ExecutionResult::failure(reason);
        }

        match self
            .fallback
            .execute(
                &request.code,
                &request.files,
                &request.stdin,
                &request.config,
            )
            .await
        {
            Ok(result) => result,
            Err(RunboxErr::Sandbox(SandboxErr::Timeout(secs))) => timeout_result(secs),
            Err(e) => ExecutionResult::failure(error_message(&e)),
        }
    }

    /// Returns the Primary Executor when a container can plausibly be
    /// started right now: the Docker daemon answered at construction time
    /// and at least one image profile has finished building.
    async fn ready_primary(&self) -> Option<&PrimaryExecutor> {
        let images = self.images.as_ref()?;
        let primary = self.primary.as_ref()?;
        for profile in [RuntimeProfile::Basic, RuntimeProfile::Enhanced] {
            if images.image_status(profile).await == ImageState::Built {
                return Some(primary);
            }
        }
        None
    }

    fn unavailability_reason(&self) -> String {
        if self.images.is_none() {
            error_message(&RunboxErr::Sandbox(SandboxErr::RuntimeUnavailable(
                "no container runtime connection".to_string(),
            )))
        } else {
            error_message(&RunboxErr::Sandbox(SandboxErr::ImageUnavailable(
                "basic/enhanced".to_string(),
            )))
        }
    }
}

/// Build the failed [`ExecutionResult`] for a watchdog-fired timeout, pinning
/// `execution_time` to the elapsed seconds reported by the executor so the
/// spec §8 invariant (`timeout ≤ execution_time ≤ timeout + outer margin`)
/// holds even though the result reached here via `Err`, not a parsed report.
fn timeout_result(secs: f64) -> ExecutionResult {
    ExecutionResult {
        execution_time: secs,
        ..ExecutionResult::failure(error_message(&RunboxErr::Sandbox(SandboxErr::Timeout(secs))))
    }
}
