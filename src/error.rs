use nix::errno::Errno;
use nix::unistd::Pid;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Could not attach to tracee = {pid}")]
    Attach {
        pid: Pid,
        source: nix::Error,
    },

    #[error("Error waiting on tracees")]
    Wait { source: nix::Error },

    #[error("Thread {tid} is not registered")]
    UnknownThread { tid: Pid },

    #[error("Tracee {pid} died")]
    TraceeDied {
        pid: Pid,
        source: nix::Error,
    },

    #[error("Unexpected ptrace error")]
    Ptrace(#[from] nix::Error),

    #[error("Unexpected internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True iff the error means the target thread no longer exists.
    pub fn tracee_died(&self) -> bool {
        matches!(self, Error::TraceeDied { .. })
    }
}

macro_rules! internal_error {
    ($msg: expr) => {
        return Err($crate::error::Error::Internal($msg.into()))
    };
}

/// Adapter for raw `nix` results that distinguishes a vanished tracee.
///
/// Any ptrace request against a thread that has been reaped, or that is
/// running rather than ptrace-stopped, fails with `ESRCH`.
pub(crate) trait ResultExt<T> {
    fn died_if_esrch(self, pid: Pid) -> Result<T>;
}

impl<T> ResultExt<T> for std::result::Result<T, nix::Error> {
    fn died_if_esrch(self, pid: Pid) -> Result<T> {
        self.map_err(|source| match source {
            Errno::ESRCH => Error::TraceeDied { pid, source },
            _ => Error::Ptrace(source),
        })
    }
}
