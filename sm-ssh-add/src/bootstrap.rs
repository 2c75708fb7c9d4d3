/// Process hardening applied before any key material is touched.
///
/// Best-effort: a failure is logged and the command carries on.
///
/// On Linux, `PR_SET_DUMPABLE 0` disables core dumps and blocks
/// `/proc/<pid>/mem` reads by other unprivileged processes, so decrypted
/// private keys and passphrases cannot be lifted from a crashed or running
/// process.
#[cfg(target_os = "linux")]
pub fn harden_process() {
    // SAFETY: prctl is safe to call with PR_SET_DUMPABLE and a plain integer arg.
    let ret = unsafe { libc::prctl(libc::PR_SET_DUMPABLE, 0i64, 0i64, 0i64, 0i64) };
    if ret == 0 {
        tracing::debug!("PR_SET_DUMPABLE=0: core dumps and /proc/pid/mem access disabled");
    } else {
        let err = std::io::Error::last_os_error();
        tracing::warn!("PR_SET_DUMPABLE=0 failed (non-fatal): {err}");
    }
}

#[cfg(not(target_os = "linux"))]
pub fn harden_process() {}
