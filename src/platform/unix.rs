use crate::core::models::SpawnRecord;
use crate::core::spawner::{Creation, ProcessCreator};
use crate::error::{ForkTreeError, ForkTreeResult};
use crate::logging::debug;
use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{fork, getpid, getppid, ForkResult, Pid};

/// Process creation backed by `fork(2)` and `waitpid(2)`.
///
/// The new process inherits the shared counter mapping and the spawn log
/// descriptor; nothing is re-attached by name.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForkCreator;

impl ProcessCreator for ForkCreator {
    fn create(&self) -> ForkTreeResult<Creation> {
        // SAFETY: the spawner runs on the process's only thread, so the child
        // cannot inherit a lock held by some other thread at fork time.
        match unsafe { fork() } {
            Ok(ForkResult::Parent { child }) => Ok(Creation::Original {
                child: pid_to_u32(child),
            }),
            Ok(ForkResult::Child) => Ok(Creation::New),
            Err(errno) => Err(ForkTreeError::process("fork", errno)),
        }
    }

    fn identity(&self) -> SpawnRecord {
        SpawnRecord::new(pid_to_u32(getppid()), pid_to_u32(getpid()))
    }

    fn wait(&self, child: u32) -> ForkTreeResult<()> {
        let pid = Pid::from_raw(child as libc::pid_t);
        loop {
            match waitpid(pid, None) {
                Ok(WaitStatus::Exited(_, 0)) => {
                    debug(format!("reaped child {}", child));
                    return Ok(());
                }
                Ok(WaitStatus::Exited(_, code)) => {
                    return Err(ForkTreeError::DescendantFailed {
                        pid: child,
                        status: format!("exit code {}", code),
                    });
                }
                Ok(WaitStatus::Signaled(_, signal, _)) => {
                    return Err(ForkTreeError::DescendantFailed {
                        pid: child,
                        status: format!("killed by {:?}", signal),
                    });
                }
                // stopped / continued: keep waiting for termination
                Ok(_) => continue,
                Err(Errno::EINTR) => continue,
                Err(errno) => return Err(ForkTreeError::process("waitpid", errno)),
            }
        }
    }

    /// `_exit` rather than `exit`: a forked child must not run the atexit
    /// handlers or flush stdio buffers it inherited from the root.
    fn terminate(&self, code: i32) -> ! {
        unsafe { libc::_exit(code) }
    }
}

fn pid_to_u32(pid: Pid) -> u32 {
    pid.as_raw() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_reports_this_process() {
        let identity = ForkCreator.identity();
        assert_eq!(identity.child, std::process::id());
        assert_ne!(identity.parent, identity.child);
    }

    #[test]
    fn waiting_for_a_non_child_is_a_process_error() {
        // pid 1 is never our child
        let err = ForkCreator.wait(1).unwrap_err();
        assert!(matches!(err, ForkTreeError::ProcessCreation { operation: "waitpid", .. }));
    }
}
