//! End-to-end session tests against a scripted RCON server on localhost.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rconc::session::{Session, SessionState, Timing};
use rconc::Error;

const AUTH: i32 = 3;
const AUTH_RESPONSE: i32 = 2;
const EXEC_COMMAND: i32 = 2;
const RESPONSE_VALUE: i32 = 0;

/// Builds one wire frame, size prefix included.
fn frame(id: i32, ptype: i32, body: &[u8]) -> Vec<u8> {
    let size = 10 + body.len() as i32;
    let mut bytes = Vec::with_capacity(4 + size as usize);
    bytes.extend_from_slice(&size.to_le_bytes());
    bytes.extend_from_slice(&id.to_le_bytes());
    bytes.extend_from_slice(&ptype.to_le_bytes());
    bytes.extend_from_slice(body);
    bytes.extend_from_slice(&[0x00, 0x00]);
    bytes
}

/// Server-side frame read: `(id, ptype, body)`.
fn read_frame(stream: &mut TcpStream) -> Option<(i32, i32, Vec<u8>)> {
    let mut size_buf = [0u8; 4];
    stream.read_exact(&mut size_buf).ok()?;
    let size = i32::from_le_bytes(size_buf) as usize;
    let mut rest = vec![0u8; size];
    stream.read_exact(&mut rest).ok()?;
    let id = i32::from_le_bytes(rest[0..4].try_into().unwrap());
    let ptype = i32::from_le_bytes(rest[4..8].try_into().unwrap());
    let body = rest[8..size - 2].to_vec();
    Some((id, ptype, body))
}

/// Keeps the server side open until the client hangs up, so the client's
/// trailing drain sees an idle socket rather than an EOF.
fn hold(mut stream: TcpStream) {
    let mut buf = [0u8; 512];
    while matches!(stream.read(&mut buf), Ok(n) if n > 0) {}
}

fn serve<F>(behavior: F) -> SocketAddr
where
    F: FnOnce(TcpStream) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        if let Ok((stream, _)) = listener.accept() {
            behavior(stream);
        }
    });
    addr
}

/// Short windows so failure paths resolve quickly.
fn fast_timing() -> Timing {
    Timing {
        command_delay: Duration::ZERO,
        receive_delay: Duration::from_millis(1),
        select_timeout: Duration::from_millis(50),
        post_send_delay: Duration::from_millis(1),
        max_response_wait: Duration::from_millis(500),
    }
}

fn connect(addr: SocketAddr, use_terminator: bool) -> Session {
    Session::connect(
        &addr.ip().to_string(),
        addr.port(),
        fast_timing(),
        use_terminator,
        Arc::new(AtomicBool::new(false)),
    )
    .unwrap()
}

/// Server half of a successful handshake; returns the auth packet id.
fn accept_auth(stream: &mut TcpStream, password: &[u8]) -> i32 {
    let (id, ptype, body) = read_frame(stream).unwrap();
    assert_eq!(ptype, AUTH);
    assert_eq!(body, password);
    stream.write_all(&frame(id, AUTH_RESPONSE, b"")).unwrap();
    id
}

#[test]
fn authenticates_when_id_is_echoed() {
    let addr = serve(|mut stream| {
        accept_auth(&mut stream, b"hunter2");
        hold(stream);
    });
    let mut session = connect(addr, true);
    session.authenticate("hunter2").unwrap();
    assert_eq!(session.state(), SessionState::Authenticated);
}

#[test]
fn auth_failure_closes_the_session() {
    let addr = serve(|mut stream| {
        let _ = read_frame(&mut stream).unwrap();
        stream.write_all(&frame(-1, AUTH_RESPONSE, b"")).unwrap();
        hold(stream);
    });
    let mut session = connect(addr, true);
    match session.authenticate("wrong") {
        Err(Error::AuthFailed { host, port }) => {
            assert_eq!(host, "127.0.0.1");
            assert_eq!(port, addr.port());
        }
        other => panic!("expected AuthFailed, got {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn empty_response_value_before_auth_reply_is_discarded() {
    let addr = serve(|mut stream| {
        let (id, _, _) = read_frame(&mut stream).unwrap();
        stream.write_all(&frame(0, RESPONSE_VALUE, b"")).unwrap();
        stream.write_all(&frame(id, AUTH_RESPONSE, b"")).unwrap();
        hold(stream);
    });
    let mut session = connect(addr, true);
    session.authenticate("hunter2").unwrap();
    assert_eq!(session.state(), SessionState::Authenticated);
}

#[test]
fn unexpected_auth_response_id_is_a_protocol_violation() {
    let addr = serve(|mut stream| {
        let (id, _, _) = read_frame(&mut stream).unwrap();
        stream
            .write_all(&frame(id + 7, AUTH_RESPONSE, b""))
            .unwrap();
        hold(stream);
    });
    let mut session = connect(addr, true);
    assert!(matches!(
        session.authenticate("hunter2"),
        Err(Error::ProtocolViolation(_))
    ));
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn reassembles_fragments_in_arrival_order() {
    let addr = serve(|mut stream| {
        accept_auth(&mut stream, b"pw");
        let (cmd_id, ptype, body) = read_frame(&mut stream).unwrap();
        assert_eq!(ptype, EXEC_COMMAND);
        assert_eq!(body, b"list");
        let (term_id, term_type, term_body) = read_frame(&mut stream).unwrap();
        assert_eq!(term_type, RESPONSE_VALUE);
        assert_eq!(term_body, b"TERM");
        for chunk in [&b"a"[..], b"b", b"c"] {
            stream
                .write_all(&frame(cmd_id, RESPONSE_VALUE, chunk))
                .unwrap();
        }
        stream
            .write_all(&frame(term_id, RESPONSE_VALUE, b""))
            .unwrap();
        hold(stream);
    });
    let mut session = connect(addr, true);
    session.authenticate("pw").unwrap();
    let mut output = Vec::new();
    session.run_command("list", &mut output).unwrap();
    assert_eq!(output, b"abc");
}

#[test]
fn two_commands_use_distinct_ids() {
    let addr = serve(|mut stream| {
        accept_auth(&mut stream, b"pw");
        let mut seen = Vec::new();
        for reply in [&b"one"[..], b"two"] {
            let (cmd_id, _, _) = read_frame(&mut stream).unwrap();
            let (term_id, _, _) = read_frame(&mut stream).unwrap();
            seen.push(cmd_id);
            seen.push(term_id);
            stream
                .write_all(&frame(cmd_id, RESPONSE_VALUE, reply))
                .unwrap();
            stream
                .write_all(&frame(term_id, RESPONSE_VALUE, b""))
                .unwrap();
        }
        let mut unique = seen.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), seen.len());
        hold(stream);
    });
    let mut session = connect(addr, true);
    session.authenticate("pw").unwrap();
    let mut first = Vec::new();
    session.run_command("help", &mut first).unwrap();
    let mut second = Vec::new();
    session.run_command("status", &mut second).unwrap();
    assert_eq!(first, b"one");
    assert_eq!(second, b"two");
}

#[test]
fn connection_lost_mid_response() {
    let addr = serve(|mut stream| {
        accept_auth(&mut stream, b"pw");
        let (cmd_id, _, _) = read_frame(&mut stream).unwrap();
        let _ = read_frame(&mut stream).unwrap();
        stream
            .write_all(&frame(cmd_id, RESPONSE_VALUE, b"partial"))
            .unwrap();
        // connection dropped before the terminator echo
    });
    let mut session = connect(addr, true);
    session.authenticate("pw").unwrap();
    let mut output = Vec::new();
    match session.run_command("list", &mut output) {
        Err(Error::ConnectionLost) => {}
        other => panic!("expected ConnectionLost, got {other:?}"),
    }
    assert_eq!(output, b"partial");
}

#[test]
fn id_minus_one_on_command_is_server_rejected() {
    let addr = serve(|mut stream| {
        accept_auth(&mut stream, b"pw");
        let _ = read_frame(&mut stream).unwrap();
        let _ = read_frame(&mut stream).unwrap();
        stream.write_all(&frame(-1, RESPONSE_VALUE, b"")).unwrap();
        hold(stream);
    });
    let mut session = connect(addr, true);
    session.authenticate("pw").unwrap();
    let mut output = Vec::new();
    assert!(matches!(
        session.run_command("list", &mut output),
        Err(Error::ServerRejected)
    ));
}

#[test]
fn silence_past_the_budget_times_out() {
    let addr = serve(|mut stream| {
        accept_auth(&mut stream, b"pw");
        let _ = read_frame(&mut stream).unwrap();
        let _ = read_frame(&mut stream).unwrap();
        hold(stream);
    });
    let mut session = connect(addr, true);
    session.authenticate("pw").unwrap();
    let mut output = Vec::new();
    assert!(matches!(
        session.run_command("list", &mut output),
        Err(Error::ResponseTimeout(_))
    ));
}

#[test]
fn undersized_frame_warns_and_the_session_continues() {
    let addr = serve(|mut stream| {
        accept_auth(&mut stream, b"pw");
        let (cmd_id, _, _) = read_frame(&mut stream).unwrap();
        let (term_id, _, _) = read_frame(&mut stream).unwrap();
        // a frame claiming 5 bytes, then a valid reply
        stream.write_all(&5i32.to_le_bytes()).unwrap();
        stream.write_all(&[0xAB; 5]).unwrap();
        stream
            .write_all(&frame(cmd_id, RESPONSE_VALUE, b"ok"))
            .unwrap();
        stream
            .write_all(&frame(term_id, RESPONSE_VALUE, b""))
            .unwrap();
        hold(stream);
    });
    let mut session = connect(addr, true);
    session.authenticate("pw").unwrap();
    let mut output = Vec::new();
    session.run_command("list", &mut output).unwrap();
    assert_eq!(output, b"ok");
}

#[test]
fn timed_drain_fallback_collects_the_response() {
    let addr = serve(|mut stream| {
        accept_auth(&mut stream, b"pw");
        // no terminator probe arrives in this mode
        let (cmd_id, _, _) = read_frame(&mut stream).unwrap();
        stream
            .write_all(&frame(cmd_id, RESPONSE_VALUE, b"x"))
            .unwrap();
        stream
            .write_all(&frame(cmd_id, RESPONSE_VALUE, b"y"))
            .unwrap();
        hold(stream);
    });
    let mut session = connect(addr, false);
    session.authenticate("pw").unwrap();
    let mut output = Vec::new();
    session.run_command("list", &mut output).unwrap();
    assert_eq!(output, b"xy");
}

#[test]
fn interrupt_flag_stops_the_round_trip() {
    let interrupted = Arc::new(AtomicBool::new(false));
    let addr = serve(|mut stream| {
        accept_auth(&mut stream, b"pw");
        hold(stream);
    });
    let mut session = Session::connect(
        &addr.ip().to_string(),
        addr.port(),
        fast_timing(),
        true,
        Arc::clone(&interrupted),
    )
    .unwrap();
    session.authenticate("pw").unwrap();
    interrupted.store(true, Ordering::Relaxed);
    let mut output = Vec::new();
    let err = session.run_command("list", &mut output).unwrap_err();
    assert!(err.is_interrupt());
}

#[test]
fn closed_session_refuses_commands() {
    let addr = serve(|mut stream| {
        accept_auth(&mut stream, b"pw");
        hold(stream);
    });
    let mut session = connect(addr, true);
    session.authenticate("pw").unwrap();
    session.close();
    session.close();
    assert_eq!(session.state(), SessionState::Closed);
    let mut output = Vec::new();
    assert!(matches!(
        session.run_command("list", &mut output),
        Err(Error::ProtocolViolation(_))
    ));
}
