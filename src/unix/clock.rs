//! System clock control

use crate::{LinkError, Result};

/// Set `CLOCK_REALTIME` to `unix_secs`. Needs `CAP_SYS_TIME`.
pub fn set_realtime(unix_secs: i64) -> Result<()> {
    let ts = libc::timespec { tv_sec: unix_secs as libc::time_t, tv_nsec: 0 };
    // SAFETY: ts is a fully initialised timespec living for the duration of the call.
    let rc = unsafe { libc::clock_settime(libc::CLOCK_REALTIME, &ts) };
    if rc != 0 {
        return Err(LinkError::command_failed_with_source(
            "time_sync",
            "clock_settime(CLOCK_REALTIME) failed",
            Box::new(std::io::Error::last_os_error()),
        ));
    }
    Ok(())
}
