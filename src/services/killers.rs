use std::process::Child;
#[cfg(unix)]
use tracing::debug;

pub trait Killer: Send + Sync {
    fn terminate(&self, child: &mut Child);
    fn kill(&self, child: &mut Child);
}

/// Signals the child's whole process group (children are spawned as group leaders),
/// so helpers forked by a scanner go down with it.
#[derive(Default)]
pub struct GroupKiller;

impl GroupKiller {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(unix)]
fn signal_group(child: &Child, sig: libc::c_int) -> bool {
    let pgid = child.id() as libc::pid_t;
    // SAFETY: kill(2) with a negative pid only sends a signal; no memory is touched.
    let rc = unsafe { libc::kill(-pgid, sig) };
    if rc != 0 {
        debug!(
            pid = child.id(),
            sig,
            err = %std::io::Error::last_os_error(),
            "group signal failed"
        );
    }
    rc == 0
}

impl Killer for GroupKiller {
    #[cfg(unix)]
    fn terminate(&self, child: &mut Child) {
        if !signal_group(child, libc::SIGTERM) {
            let _ = child.kill();
        }
    }

    #[cfg(not(unix))]
    fn terminate(&self, child: &mut Child) {
        let _ = child.kill();
    }

    fn kill(&self, child: &mut Child) {
        #[cfg(unix)]
        signal_group(child, libc::SIGKILL);
        let _ = child.kill();
    }
}
