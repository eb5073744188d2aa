//! Non-blocking pseudo-terminal endpoint for the emulator console.
//!
//! The emulator's stdio is tied to the slave side of a pty pair so the
//! harness can feed monitor commands (`quit`) and drain whatever the
//! emulator prints. The master side is switched to `O_NONBLOCK` and
//! registered with the reactor through [`AsyncFd`], which gives the same
//! readiness-then-try transfer shape as a socket.
//!
//! Reading the master after the child has exited fails with `EIO`; that is
//! the pty's way of saying hangup, so it maps to end of input.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::pin::Pin;

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::pty::{openpty, Winsize};
use tokio::io::unix::AsyncFd;

use crate::pump::Duplex;
use crate::{HarnessError, Result};

/// Master side of an emulator console pty, usable as a pump [`Duplex`].
#[derive(Debug)]
pub struct ConsolePty {
    master: AsyncFd<File>,
}

impl ConsolePty {
    /// Allocate a pty pair.
    ///
    /// Returns the non-blocking master wrapped for async use, plus the raw
    /// slave descriptor to hand to the child process as stdin and stdout.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Emulator`] when allocation, the non-blocking
    /// switch, or reactor registration fails.
    pub fn open() -> Result<(Self, OwnedFd)> {
        let winsize = Winsize {
            ws_row: 24,
            ws_col: 80,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        let pty = openpty(Some(&winsize), None)
            .map_err(|err| HarnessError::Emulator(format!("openpty failed: {err}")))?;

        set_nonblocking(pty.master.as_fd())?;
        let master = AsyncFd::new(File::from(pty.master)).map_err(|err| {
            HarnessError::Emulator(format!("console master registration failed: {err}"))
        })?;

        Ok((Self { master }, pty.slave))
    }
}

impl Duplex for ConsolePty {
    fn read_chunk<'a>(
        &'a self,
        buf: &'a mut [u8],
    ) -> Pin<Box<dyn std::future::Future<Output = io::Result<usize>> + Send + 'a>> {
        Box::pin(async move {
            loop {
                let mut guard = self.master.readable().await?;
                match guard.try_io(|inner| inner.get_ref().read(buf)) {
                    Ok(Ok(n)) => return Ok(n),
                    // Hangup after child exit surfaces as EIO on a pty master.
                    Ok(Err(err)) if err.raw_os_error() == Some(nix::libc::EIO) => return Ok(0),
                    Ok(Err(err)) => return Err(err),
                    Err(_would_block) => {}
                }
            }
        })
    }

    fn write_chunk<'a>(
        &'a self,
        chunk: &'a [u8],
    ) -> Pin<Box<dyn std::future::Future<Output = io::Result<usize>> + Send + 'a>> {
        Box::pin(async move {
            loop {
                let mut guard = self.master.writable().await?;
                match guard.try_io(|inner| inner.get_ref().write(chunk)) {
                    Ok(result) => return result,
                    Err(_would_block) => {}
                }
            }
        })
    }
}

/// Switch a descriptor to non-blocking mode.
fn set_nonblocking(fd: BorrowedFd<'_>) -> Result<()> {
    let flags = fcntl(fd, FcntlArg::F_GETFL)
        .map_err(|err| HarnessError::Emulator(format!("F_GETFL failed: {err}")))?;

    let new_flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
    fcntl(fd, FcntlArg::F_SETFL(new_flags))
        .map_err(|err| HarnessError::Emulator(format!("F_SETFL failed: {err}")))?;

    Ok(())
}
