//! Best-effort Linux hardening for the Fallback Executor's subprocess.
//!
//! Unlike the Primary Executor, which isolates user code inside a Docker
//! container, the Fallback Executor runs the interpreter directly on the
//! host. This crate supplies the landlock + seccomp layer FX applies to that
//! subprocess immediately before `execve`, via `std::os::unix::process::CommandExt::pre_exec`.
//! A `pre_exec` closure already runs in a single-threaded, freshly forked
//! child, which is exactly the precondition landlock and seccomp require —
//! no separate re-exec'd helper binary is needed to get there.

#[cfg(target_os = "linux")]
mod error;
#[cfg(target_os = "linux")]
mod hardening;

#[cfg(target_os = "linux")]
pub use error::HardeningError;
#[cfg(target_os = "linux")]
pub use error::Result;
#[cfg(target_os = "linux")]
pub use hardening::apply_fallback_hardening;
