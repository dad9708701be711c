//! Pipe transport between controller and player.
//!
//! Reading never blocks: readiness is checked with a zero-timeout poll and
//! callers drive [`PipeTransport::poll_incoming`] from a periodic tick.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::AsFd;

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use thiserror::Error;

use super::buffer::ReceiveBuffer;
use super::platform::SlavePipes;

#[derive(Error, Debug)]
pub enum TransportError {
  #[error("Read from player failed: {0}")]
  Read(#[source] io::Error),
  #[error("Write to player failed: {0}")]
  Write(#[from] io::Error),
  #[error("Short write to player: {written} of {expected} bytes")]
  ShortWrite { written: usize, expected: usize },
}

/// Owns both slave pipes; each is closed exactly once.
#[derive(Debug)]
pub struct PipeTransport {
  command: Option<File>,
  status: Option<File>,
  buffer: ReceiveBuffer,
}

impl PipeTransport {
  pub fn new(pipes: SlavePipes, buffer_capacity: usize) -> Self {
    Self {
      command: Some(pipes.command),
      status: Some(pipes.status),
      buffer: ReceiveBuffer::with_capacity(buffer_capacity),
    }
  }

  pub fn has_command_pipe(&self) -> bool {
    self.command.is_some()
  }

  /// Read whatever the player has written and return the completed lines.
  ///
  /// Read errors are logged; the next poll retries.
  pub fn poll_incoming(&mut self) -> Vec<String> {
    match self.read_lines() {
      Ok(lines) => lines,
      Err(e) => {
        log::warn!("{}", e);
        Vec::new()
      }
    }
  }

  fn read_lines(&mut self) -> Result<Vec<String>, TransportError> {
    let Some(status) = self.status.as_mut() else {
      return Ok(Vec::new());
    };

    let ready = {
      let mut fds = [PollFd::new(status.as_fd(), PollFlags::POLLIN)];
      match poll(&mut fds, PollTimeout::ZERO) {
        Ok(n) => n > 0,
        Err(e) => {
          log::warn!("Player pipe poll failed: {}", e);
          false
        }
      }
    };
    if !ready {
      return Ok(Vec::new());
    }

    match status.read(self.buffer.spare_mut()) {
      // writer closed, the player is gone or going
      Ok(0) => Ok(Vec::new()),
      Ok(n) => Ok(
        self
          .buffer
          .commit(n)
          .into_iter()
          .map(|line| String::from_utf8_lossy(&line).into_owned())
          .collect(),
      ),
      Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(Vec::new()),
      Err(e) => Err(TransportError::Read(e)),
    }
  }

  /// Write one command line. A missing pipe is not an error.
  pub fn send_line(&mut self, text: &str) -> Result<(), TransportError> {
    let Some(command) = self.command.as_mut() else {
      log::debug!("No command pipe, dropping '{}'", text);
      return Ok(());
    };

    let line = format!("{}\n", text);
    log::debug!("Sending player command: {}", text);
    let written = command.write(line.as_bytes())?;
    if written != line.len() {
      return Err(TransportError::ShortWrite {
        written,
        expected: line.len(),
      });
    }
    Ok(())
  }

  /// Close both pipes. Safe to call repeatedly.
  pub fn close(&mut self) {
    if self.command.take().is_some() {
      log::debug!("Closed player command pipe");
    }
    if self.status.take().is_some() {
      log::debug!("Closed player status pipe");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::slave::fake::{drain, pipe_pair};

  fn transport(capacity: usize) -> (PipeTransport, File, File) {
    let (command, child_stdin) = pipe_pair();
    let (child_stdout, status) = pipe_pair();
    let transport = PipeTransport::new(
      SlavePipes {
        command,
        status,
      },
      capacity,
    );
    (transport, child_stdin, child_stdout)
  }

  #[test]
  fn test_poll_without_data_returns_nothing() {
    let (mut transport, _stdin, _stdout) = transport(64);
    assert!(transport.poll_incoming().is_empty());
  }

  #[test]
  fn test_poll_collects_lines_across_reads() {
    let (mut transport, _stdin, mut stdout) = transport(64);
    stdout.write_all(b"ID_AID_1_LANG=eng\nID_AI").unwrap();
    assert_eq!(transport.poll_incoming(), vec!["ID_AID_1_LANG=eng"]);
    assert!(transport.poll_incoming().is_empty());

    stdout.write_all(b"D_2_LANG=fre\n").unwrap();
    assert_eq!(transport.poll_incoming(), vec!["ID_AID_2_LANG=fre"]);
  }

  #[test]
  fn test_poll_after_writer_closed() {
    let (mut transport, _stdin, stdout) = transport(64);
    drop(stdout);
    assert!(transport.poll_incoming().is_empty());
  }

  #[test]
  fn test_send_line_appends_newline() {
    let (mut transport, mut stdin, _stdout) = transport(64);
    transport.send_line("pause").unwrap();
    transport.send_line("quit").unwrap();
    assert_eq!(drain(&mut stdin), "pause\nquit\n");
  }

  #[test]
  fn test_closed_transport_is_noop() {
    let (mut transport, mut stdin, _stdout) = transport(64);
    transport.close();
    transport.close();
    assert!(!transport.has_command_pipe());
    transport.send_line("quit").unwrap();
    assert!(transport.poll_incoming().is_empty());
    assert_eq!(drain(&mut stdin), "");
  }

  #[test]
  fn test_read_error_is_reported_and_retried() {
    let dir = tempfile::tempdir().unwrap();
    let (command, _stdin) = pipe_pair();
    // a directory polls readable and fails every read with EISDIR
    let status = File::open(dir.path()).unwrap();
    let mut transport = PipeTransport::new(SlavePipes { command, status }, 64);

    assert!(matches!(transport.read_lines(), Err(TransportError::Read(_))));
    assert!(transport.poll_incoming().is_empty());
    assert!(matches!(transport.read_lines(), Err(TransportError::Read(_))));
  }

  #[test]
  fn test_write_to_dead_reader_fails() {
    let (mut transport, stdin, _stdout) = transport(64);
    drop(stdin);
    // the test harness ignores SIGPIPE like any Rust binary
    assert!(matches!(
      transport.send_line("quit"),
      Err(TransportError::Write(_))
    ));
  }
}
