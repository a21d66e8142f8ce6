//! Blocking socket plumbing: connect, framed send/receive, readiness
//! probing, and the discard loop used to recover from oversized frames.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::thread;
use std::time::Duration;

use byteorder::{ByteOrder, LE};
use tracing::warn;

use crate::error::{Error, Result};
use crate::packet::{Packet, PSIZE_MAX, PSIZE_MIN};
use crate::session::Timing;

/// Resolves `host` (name, IPv4, or IPv6) and connects the first candidate
/// address that accepts.
pub fn connect(host: &str, port: u16) -> Result<TcpStream> {
    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|e| Error::ResolutionFailed {
            host: host.to_string(),
            port,
            source: e,
        })?;

    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect(addr) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }
    Err(Error::ConnectFailed {
        host: host.to_string(),
        port,
        source: last_err
            .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no addresses resolved")),
    })
}

/// Writes one complete frame and flushes it.
pub fn send_packet(stream: &mut TcpStream, packet: &Packet) -> Result<()> {
    stream.write_all(&packet.encode())?;
    stream.flush()?;
    Ok(())
}

/// Receives one frame. `Ok(None)` means a frame with an out-of-bounds size
/// was skipped; the session stays usable.
pub fn recv_packet(stream: &mut TcpStream, timing: &Timing) -> Result<Option<Packet>> {
    stream.set_read_timeout(Some(timing.max_response_wait))?;

    let mut size_buf = [0u8; 4];
    read_fully(stream, &mut size_buf, timing)?;
    let size = LE::read_i32(&size_buf);

    if size < PSIZE_MIN {
        warn!(size, "received unexpectedly small packet size");
        if size > 0 {
            discard(stream, size as usize, timing)?;
        }
        return Ok(None);
    }
    if size > PSIZE_MAX {
        warn!(size, "received unexpectedly large packet size");
        drain(stream, timing)?;
        return Ok(None);
    }

    let mut frame = vec![0u8; 4 + size as usize];
    frame[..4].copy_from_slice(&size_buf);
    read_fully(stream, &mut frame[4..], timing)?;
    Packet::decode(&frame).map(Some)
}

/// Bounded readiness probe. `Ok(false)` on timeout; an EOF observed here is
/// a lost connection.
pub fn wait_readable(stream: &TcpStream, timeout: Duration) -> Result<bool> {
    let timeout = if timeout.is_zero() {
        Duration::from_millis(1)
    } else {
        timeout
    };
    stream.set_read_timeout(Some(timeout))?;

    let mut probe = [0u8; 1];
    match stream.peek(&mut probe) {
        Ok(0) => Err(Error::ConnectionLost),
        Ok(_) => Ok(true),
        Err(e) if is_timeout(&e) || e.kind() == io::ErrorKind::Interrupted => Ok(false),
        Err(e) => Err(Error::Io(e)),
    }
}

/// Reads and discards pending data until the socket stays quiet for a full
/// `select_timeout` window.
pub fn drain(stream: &mut TcpStream, timing: &Timing) -> Result<()> {
    let mut scratch = [0u8; PSIZE_MAX as usize];
    while wait_readable(stream, timing.select_timeout)? {
        match stream.read(&mut scratch) {
            Ok(0) => return Err(Error::ConnectionLost),
            Ok(_) => {}
            Err(e) if is_timeout(&e) || e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(Error::Io(e)),
        }
        thread::sleep(timing.receive_delay);
    }
    Ok(())
}

fn discard(stream: &mut TcpStream, mut remaining: usize, timing: &Timing) -> Result<()> {
    let mut scratch = [0u8; PSIZE_MAX as usize];
    while remaining > 0 {
        let want = remaining.min(scratch.len());
        read_fully(stream, &mut scratch[..want], timing)?;
        remaining -= want;
    }
    Ok(())
}

fn read_fully(stream: &mut TcpStream, buf: &mut [u8], timing: &Timing) -> Result<()> {
    stream.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe => Error::ConnectionLost,
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
            Error::ResponseTimeout(timing.max_response_wait.as_millis() as u64)
        }
        _ => Error::Io(e),
    })
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}
