//! Terminal-backed [`SecretPrompt`].
//!
//! Every prompt opens `/dev/tty` so that passphrases are read from the
//! controlling terminal even when stdin or stdout are redirected.

use std::io::{self, BufRead, Write};
use std::os::unix::io::{AsRawFd as _, RawFd};

use sm_ssh_core::prompt::{PromptError, SecretPrompt};
use zeroize::Zeroizing;

/// Restores the original `termios` settings on the given fd when dropped.
struct TermiosGuard {
    fd: RawFd,
    orig: libc::termios,
}

impl Drop for TermiosGuard {
    fn drop(&mut self) {
        // SAFETY: fd stays open for the guard's lifetime; orig came from tcgetattr.
        unsafe {
            libc::tcsetattr(self.fd, libc::TCSANOW, &self.orig);
        }
    }
}

/// Read one line from `tty` with echo disabled.  Trailing CR/LF is stripped.
fn read_hidden(tty: &std::fs::File) -> io::Result<Zeroizing<String>> {
    let fd = tty.as_raw_fd();

    // SAFETY: fd is an open terminal and term is initialised by tcgetattr.
    let guard = unsafe {
        let mut term = std::mem::MaybeUninit::<libc::termios>::uninit();
        if libc::tcgetattr(fd, term.as_mut_ptr()) != 0 {
            return Err(io::Error::last_os_error());
        }
        TermiosGuard {
            fd,
            orig: term.assume_init(),
        }
    };

    let mut noecho = guard.orig;
    noecho.c_lflag &= !(libc::ECHO as libc::tcflag_t);
    noecho.c_lflag &= !(libc::ECHONL as libc::tcflag_t);

    // TCSAFLUSH discards keypresses typed before the prompt appeared.
    unsafe {
        if libc::tcsetattr(fd, libc::TCSAFLUSH, &noecho) != 0 {
            return Err(io::Error::last_os_error());
        }
    }

    let mut buf = Zeroizing::new(Vec::<u8>::new());
    let result = io::BufReader::new(tty).read_until(b'\n', &mut buf);

    drop(guard);
    // The user's Enter was not echoed.
    let mut writer = tty;
    let _ = writer.write_all(b"\n");

    result?;

    while buf.last() == Some(&b'\n') || buf.last() == Some(&b'\r') {
        buf.pop();
    }
    let s = std::str::from_utf8(&buf)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
        .to_string();
    Ok(Zeroizing::new(s))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TtyPrompt;

#[async_trait::async_trait]
impl SecretPrompt for TtyPrompt {
    async fn notice(&self, message: &str) {
        eprintln!("{message}");
    }

    async fn read_secret(&self, label: &str) -> Result<Zeroizing<String>, PromptError> {
        let prompt_str = format!("{label}: ");

        tokio::task::spawn_blocking(move || -> Result<Zeroizing<String>, PromptError> {
            let tty = std::fs::OpenOptions::new()
                .read(true)
                .write(true)
                .open("/dev/tty")?;

            let mut writer = &tty;
            writer.write_all(prompt_str.as_bytes())?;
            writer.flush()?;

            Ok(read_hidden(&tty)?)
        })
        .await
        .map_err(|e| PromptError::Other(anyhow::anyhow!("prompt task panicked: {e}")))?
    }
}
