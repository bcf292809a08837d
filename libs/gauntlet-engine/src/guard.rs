/// Capability Guard - Host-Protection Layer
///
/// **Core Responsibility:**
/// Neutralize operations that could affect the host before any candidate
/// code executes, and cap the isolation process's resources at spawn time.
///
/// Two cooperating layers:
/// 1. An interpreter-level preamble (embedded into the generated harness)
///    that replaces destructive operations with stubs raising
///    `CapabilityViolation`. The exception derives from `BaseException`, so
///    it bypasses the harness's per-test `except Exception` handlers and is
///    classified as a fatal outcome, never a plain failure.
/// 2. Process-level rlimits applied in a pre-exec hook: address-space and
///    data-segment caps when configured, core dumps off. Soft and hard
///    limits are set equal, so the child cannot raise its own ceilings.
///    Unsupported limits are skipped, not failed.
///
/// Applied once per isolation process and irreversible for its lifetime.
/// Scratch-directory cleanup is owned by the supervisor in the parent, so
/// the guard never needs an in-child restore.
use tokio::process::Command;

/// Python preamble that disables destructive host operations.
///
/// Covers: signaling/terminating other processes, filesystem mutation,
/// process spawning, environment/working-directory mutation, shell
/// invocation, debugger/introspection hooks, and raising resource ceilings.
/// Requires `CapabilityViolation`, `_builtins` and `_sys` to already be
/// defined by the surrounding harness.
pub const GUARD_PREAMBLE: &str = r#"
import faulthandler as _faulthandler
_faulthandler.disable()

import os as _os
import shutil as _shutil
import subprocess as _subprocess

_os.environ["OMP_NUM_THREADS"] = "1"


def _neutered(_name):
    def _blocked(*_args, **_kwargs):
        raise CapabilityViolation(_name + " is disabled inside the sandbox")
    return _blocked


for _name in (
    "kill", "killpg", "system", "popen", "putenv", "unsetenv",
    "remove", "removedirs", "rmdir", "rename", "renames", "replace",
    "truncate", "unlink", "chmod", "chown", "fchmod", "fchown",
    "lchmod", "lchown", "lchflags", "chroot", "chdir", "fchdir",
    "getcwd", "setuid", "fork", "forkpty", "spawnl", "spawnv",
):
    if hasattr(_os, _name):
        setattr(_os, _name, _neutered("os." + _name))

for _name in ("rmtree", "move", "chown"):
    setattr(_shutil, _name, _neutered("shutil." + _name))

for _name in ("Popen", "run", "call", "check_call", "check_output"):
    setattr(_subprocess, _name, _neutered("subprocess." + _name))

_builtins.exit = _neutered("exit")
_builtins.quit = _neutered("quit")
_builtins.help = _neutered("help")
_builtins.breakpoint = _neutered("breakpoint")

try:
    import resource as _resource
    _resource.setrlimit = _neutered("resource.setrlimit")
except ImportError:
    pass

for _name in ("ipdb", "joblib", "psutil", "resource", "tkinter"):
    _sys.modules[_name] = None
"#;

/// Arm the pre-exec rlimit hook on a child command.
///
/// No-op on platforms without rlimits; the memory cap is skipped there
/// rather than treated as an error.
pub fn apply_resource_limits(cmd: &mut Command, max_memory_bytes: Option<u64>) {
    #[cfg(unix)]
    unsafe {
        cmd.pre_exec(move || {
            set_rlimits(max_memory_bytes);
            Ok(())
        });
    }
    #[cfg(not(unix))]
    {
        let _ = (cmd, max_memory_bytes);
    }
}

/// Runs between fork and exec: only async-signal-safe setrlimit calls.
/// Individual failures are ignored so an unsupported limit cannot abort
/// the spawn.
#[cfg(unix)]
fn set_rlimits(max_memory_bytes: Option<u64>) {
    if let Some(bytes) = max_memory_bytes {
        let limit = libc::rlimit {
            rlim_cur: bytes as libc::rlim_t,
            rlim_max: bytes as libc::rlim_t,
        };
        unsafe {
            let _ = libc::setrlimit(libc::RLIMIT_AS, &limit);
            let _ = libc::setrlimit(libc::RLIMIT_DATA, &limit);
            // Stack caps misbehave on Darwin; apply on Linux only.
            #[cfg(target_os = "linux")]
            let _ = libc::setrlimit(libc::RLIMIT_STACK, &limit);
        }
    }
    let zero = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    unsafe {
        let _ = libc::setrlimit(libc::RLIMIT_CORE, &zero);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preamble_neutralizes_destructive_operations() {
        for op in [
            "\"kill\"", "\"remove\"", "\"rename\"", "\"chmod\"", "\"truncate\"",
            "\"system\"", "\"fork\"", "\"chdir\"",
        ] {
            assert!(
                GUARD_PREAMBLE.contains(op),
                "guard preamble must neutralize {op}"
            );
        }
        assert!(GUARD_PREAMBLE.contains("rmtree"));
        assert!(GUARD_PREAMBLE.contains("Popen"));
        assert!(GUARD_PREAMBLE.contains("resource.setrlimit"));
    }

    #[test]
    fn preamble_raises_capability_violation() {
        assert!(GUARD_PREAMBLE.contains("raise CapabilityViolation"));
    }
}
