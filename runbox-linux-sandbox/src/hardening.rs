//! Best-effort Linux sandbox hardening applied to the current OS thread
//! before it execs the Fallback Executor's subprocess interpreter. Landlock
//! and seccomp policies are scoped to the calling thread until the process
//! calls `execve`, at which point they become whole-process; this is why
//! callers must apply the policy on a dedicated thread immediately before
//! spawning the subprocess rather than at any earlier point (mirrors the
//! retrieved `exec_linux`/`linux.rs` dedicated-thread pattern).

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use landlock::ABI;
use landlock::Access;
use landlock::AccessFs;
use landlock::CompatLevel;
use landlock::Compatible;
use landlock::Ruleset;
use landlock::RulesetAttr;
use landlock::RulesetCreatedAttr;
use seccompiler::BpfProgram;
use seccompiler::SeccompAction;
use seccompiler::SeccompFilter;
use seccompiler::SeccompRule;
use seccompiler::TargetArch;
use seccompiler::apply_filter;

use crate::error::HardeningError;
use crate::error::Result;

/// Confine filesystem writes to `workspace_root` (and `/dev/null`) and block
/// outbound networking and ptrace. FX runs an interpreter that already has
/// its own import denylist and rlimits; this is a second, independent layer
/// that degrades to a no-op ruleset on kernels too old to enforce it
/// (`CompatLevel::BestEffort`) rather than failing the execution.
pub fn apply_fallback_hardening(workspace_root: &Path) -> Result<()> {
    install_filesystem_landlock_rules(workspace_root)?;
    install_network_seccomp_filter()?;
    Ok(())
}

fn install_filesystem_landlock_rules(workspace_root: &Path) -> Result<()> {
    let abi = ABI::V5;
    let access_rw = AccessFs::from_all(abi);
    let access_ro = AccessFs::from_read(abi);

    let writable_roots: Vec<PathBuf> = vec![workspace_root.to_path_buf()];

    let ruleset = Ruleset::default()
        .set_compatibility(CompatLevel::BestEffort)
        .handle_access(access_rw)
        .map_err(|e| HardeningError::LandlockRuleset(e))?
        .create()
        .map_err(|e| HardeningError::LandlockRuleset(e))?
        .add_rules(landlock::path_beneath_rules(&["/"], access_ro))
        .map_err(|e| HardeningError::LandlockRuleset(e))?
        .add_rules(landlock::path_beneath_rules(&["/dev/null"], access_rw))
        .map_err(|e| HardeningError::LandlockRuleset(e))?
        .add_rules(landlock::path_beneath_rules(&writable_roots, access_rw))
        .map_err(|e| HardeningError::LandlockRuleset(e))?
        .set_no_new_privs(true);

    // Best-effort: an unenforced ruleset on an old kernel is logged, not
    // fatal, since FX's primary containment is the import denylist + rlimits.
    match ruleset.restrict_self() {
        Ok(status) if status.ruleset == landlock::RulesetStatus::NotEnforced => {
            tracing::warn!("landlock ruleset not enforced by this kernel, continuing best-effort");
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(error = %e, "failed to apply landlock ruleset, continuing best-effort");
        }
    }

    Ok(())
}

/// Deny outbound networking and ptrace, mirroring the network-only filter
/// this is grounded on. This is installed via `pre_exec`, which runs in the
/// forked child immediately *before* the `execve` that starts the
/// interpreter itself — so, unlike the upstream filter's caller (which
/// re-execs into a dedicated hardened helper and only then `execve`s the
/// final command), this filter must never deny `execve`/`fork`/`clone`: that
/// would make the installing process unable to complete its own pending
/// `execve` into the interpreter.
fn install_network_seccomp_filter() -> Result<()> {
    let mut rules: BTreeMap<i64, Vec<SeccompRule>> = BTreeMap::new();
    let mut deny_syscall = |nr: i64| {
        rules.insert(nr, vec![]);
    };

    deny_syscall(libc::SYS_connect);
    deny_syscall(libc::SYS_accept);
    deny_syscall(libc::SYS_accept4);
    deny_syscall(libc::SYS_bind);
    deny_syscall(libc::SYS_listen);
    deny_syscall(libc::SYS_socket);
    deny_syscall(libc::SYS_socketpair);
    deny_syscall(libc::SYS_sendto);
    deny_syscall(libc::SYS_sendmsg);
    deny_syscall(libc::SYS_recvfrom);
    deny_syscall(libc::SYS_recvmsg);
    deny_syscall(libc::SYS_ptrace);

    let filter = SeccompFilter::new(
        rules,
        SeccompAction::Allow,
        SeccompAction::Errno(libc::EPERM as u32),
        if cfg!(target_arch = "x86_64") {
            TargetArch::x86_64
        } else if cfg!(target_arch = "aarch64") {
            TargetArch::aarch64
        } else {
            return Err(HardeningError::UnsupportedArch(
                std::env::consts::ARCH.to_string(),
            ));
        },
    )
    .map_err(|e| HardeningError::SeccompInstall(e))?;

    let prog: BpfProgram = filter
        .try_into()
        .map_err(|e| HardeningError::SeccompBackend(e))?;

    apply_filter(&prog).map_err(|e| HardeningError::SeccompInstall(e))?;

    Ok(())
}
