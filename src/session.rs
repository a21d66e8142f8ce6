//! The protocol engine: one authenticated connection to an RCON server and
//! the command round-trip built on top of it.
//!
//! The protocol has no length-of-response field, so end-of-response is
//! detected with a terminator probe: a `RESPONSE_VALUE`-typed packet sent
//! right after the command. Servers answer it only after every fragment of
//! the command's reply, so seeing its id echoed back marks completion.

use std::io::Write;
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::error::{Error, Result};
use crate::packet::{ptype, IdAllocator, Packet};
use crate::transport;

/// Body of the terminator probe. The content is irrelevant to servers; only
/// the echoed id matters.
const TERMINATOR_BODY: &[u8] = b"TERM";

const MAX_RESPONSE_WAIT_MS: u64 = 5000;

/// Timing knobs for one session, all sourced from the `[timing]` config
/// section or their defaults.
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    /// Pause between batch commands.
    pub command_delay: Duration,
    /// Pause between successive receive attempts.
    pub receive_delay: Duration,
    /// Window of one readiness probe.
    pub select_timeout: Duration,
    /// Grace period between sending a command and probing for its reply.
    pub post_send_delay: Duration,
    /// Total silence budget per command before giving up.
    pub max_response_wait: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Timing {
            command_delay: Duration::ZERO,
            receive_delay: Duration::from_millis(10),
            select_timeout: Duration::from_millis(500),
            post_send_delay: Duration::from_millis(10),
            max_response_wait: Duration::from_millis(MAX_RESPONSE_WAIT_MS),
        }
    }
}

/// Connection lifecycle. Only `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Unconnected,
    Connected,
    Authenticated,
    Closed,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (_, Closed) | (Unconnected, Connected) | (Connected, Authenticated)
        )
    }

    fn transition_to(&mut self, next: SessionState) -> Result<()> {
        if self.can_transition_to(next) {
            *self = next;
            Ok(())
        } else {
            Err(Error::ProtocolViolation("illegal session state transition"))
        }
    }
}

/// Rejects blank passwords up front, before any socket is opened.
pub fn validate_password(password: &str, allow_blank: bool) -> Result<()> {
    if password.is_empty() && !allow_blank {
        return Err(Error::BadArgument(
            "password cannot be blank (set bAllowBlankPassword=true to permit it)".into(),
        ));
    }
    Ok(())
}

/// One RCON connection: the socket, the id allocator, the lifecycle state,
/// and the timing tunables. Strictly single-threaded; every send and
/// receive is serialized through `&mut self`.
pub struct Session {
    stream: Option<TcpStream>,
    ids: IdAllocator,
    state: SessionState,
    timing: Timing,
    use_terminator: bool,
    interrupted: Arc<AtomicBool>,
    host: String,
    port: u16,
}

impl Session {
    /// Connects to `host:port`. The session starts unauthenticated.
    ///
    /// `use_terminator` selects the end-of-response strategy: the terminator
    /// probe (default), or a timed drain for servers that mishandle the
    /// probe. `interrupted` is the signal flag observed at suspension
    /// points.
    pub fn connect(
        host: &str,
        port: u16,
        timing: Timing,
        use_terminator: bool,
        interrupted: Arc<AtomicBool>,
    ) -> Result<Session> {
        let mut state = SessionState::Unconnected;
        let stream = transport::connect(host, port)?;
        state.transition_to(SessionState::Connected)?;
        Ok(Session {
            stream: Some(stream),
            ids: IdAllocator::new(),
            state,
            timing,
            use_terminator,
            interrupted,
            host: host.to_string(),
            port,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    pub fn interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Relaxed)
    }

    /// Performs the auth handshake. On failure the session is closed; the
    /// socket cannot be reused.
    pub fn authenticate(&mut self, password: &str) -> Result<()> {
        if self.state != SessionState::Connected {
            return Err(Error::ProtocolViolation(
                "authenticate requires a freshly connected session",
            ));
        }
        let pid = self.ids.next()?;
        let request = Packet::new(pid, ptype::AUTH, password.as_bytes());
        transport::send_packet(self.stream()?, &request)?;

        let mut reply = self.recv_next()?;
        // Some servers preface the auth reply with an empty RESPONSE_VALUE.
        if reply.ptype == ptype::RESPONSE_VALUE {
            reply = self.recv_next()?;
        }
        if reply.ptype != ptype::AUTH_RESPONSE {
            self.close();
            return Err(Error::ProtocolViolation(
                "expected an auth response after the auth request",
            ));
        }
        if reply.id == pid {
            self.state.transition_to(SessionState::Authenticated)
        } else if reply.id == -1 {
            self.close();
            Err(Error::AuthFailed {
                host: self.host.clone(),
                port: self.port,
            })
        } else {
            self.close();
            Err(Error::ProtocolViolation(
                "auth response id matches neither the request nor -1",
            ))
        }
    }

    /// Executes one command, streaming every reply fragment into `sink` as
    /// it arrives.
    ///
    /// A terminator probe is sent right after the command; its echo marks
    /// end-of-response. If the probe cannot be sent (or is disabled), the
    /// response instead ends after two consecutive quiet probe windows.
    pub fn run_command(&mut self, command: &str, sink: &mut dyn Write) -> Result<()> {
        self.check_interrupt()?;
        if self.state != SessionState::Authenticated {
            return Err(Error::ProtocolViolation(
                "commands require an authenticated session",
            ));
        }
        let cmd_id = self.ids.next()?;
        let term_id = self.ids.next()?;
        let timing = self.timing;

        let request = Packet::new(cmd_id, ptype::EXEC_COMMAND, command.as_bytes());
        transport::send_packet(self.stream()?, &request)?;
        thread::sleep(timing.post_send_delay);

        let wait_for_term = if self.use_terminator {
            let probe = Packet::new(term_id, ptype::RESPONSE_VALUE, TERMINATOR_BODY);
            match transport::send_packet(self.stream()?, &probe) {
                Ok(()) => true,
                Err(err) => {
                    debug!(%err, "terminator probe send failed; falling back to timed drain");
                    false
                }
            }
        } else {
            false
        };

        let mut silent = Duration::ZERO;
        let mut idle_windows = 0u32;
        loop {
            self.check_interrupt()?;
            if !transport::wait_readable(self.stream()?, timing.select_timeout)? {
                if wait_for_term {
                    silent += timing.select_timeout;
                    if silent >= timing.max_response_wait {
                        return Err(Error::ResponseTimeout(
                            timing.max_response_wait.as_millis() as u64,
                        ));
                    }
                } else {
                    idle_windows += 1;
                    if idle_windows >= 2 {
                        break;
                    }
                }
                continue;
            }

            let packet = match transport::recv_packet(self.stream()?, &timing)? {
                Some(packet) => packet,
                None => continue,
            };
            silent = Duration::ZERO;
            idle_windows = 0;

            if wait_for_term && packet.id == term_id {
                transport::drain(self.stream()?, &timing)?;
                break;
            }
            if packet.ptype == ptype::RESPONSE_VALUE && packet.id == cmd_id {
                sink.write_all(&packet.body)?;
            } else if packet.id == -1 {
                return Err(Error::ServerRejected);
            } else {
                debug!(id = packet.id, ptype = packet.ptype, "ignoring spurious packet");
            }
            thread::sleep(timing.receive_delay);
        }
        Ok(())
    }

    /// Closes the socket. Safe to call any number of times and from any
    /// state; the underlying close happens at most once.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.state = SessionState::Closed;
    }

    fn stream(&mut self) -> Result<&mut TcpStream> {
        self.stream.as_mut().ok_or(Error::ConnectionLost)
    }

    fn check_interrupt(&self) -> Result<()> {
        if self.interrupted() {
            Err(Error::interrupted())
        } else {
            Ok(())
        }
    }

    fn recv_next(&mut self) -> Result<Packet> {
        loop {
            self.check_interrupt()?;
            let timing = self.timing;
            if let Some(packet) = transport::recv_packet(self.stream()?, &timing)? {
                return Ok(packet);
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}
