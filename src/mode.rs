//! The two execution drivers sitting on the protocol engine: a batch run
//! over a fixed command list, and the interactive prompt loop.
//!
//! Both are generic over their input and output streams; the binary hands
//! them locked stdin/stdout.

use std::io::{self, BufRead, Write};
use std::thread;

use crate::error::Result;
use crate::session::Session;
use crate::term::{Palette, ResponseSink};

/// Presentation settings shared by both drivers.
pub struct Ui<'a> {
    pub palette: &'a Palette,
    pub prompt: &'a str,
    pub no_prompt: bool,
    pub bukkit_colors: bool,
}

/// Runs every queued command in order. Response bytes go to `out` exactly
/// as received; the only added newline is the one terminating each
/// response. Any fatal error aborts the remaining queue.
pub fn batch<W: Write>(
    session: &mut Session,
    commands: &[String],
    ui: &Ui,
    out: &mut W,
) -> Result<()> {
    for (index, command) in commands.iter().enumerate() {
        if session.interrupted() {
            break;
        }
        if !ui.no_prompt {
            writeln!(out, "{}{}", ui.prompt, command)?;
            out.flush()?;
        }

        let mut sink = ResponseSink::new(&mut *out, ui.bukkit_colors);
        session.run_command(command, &mut sink)?;
        out.write_all(b"\n")?;
        out.flush()?;

        let delay = session.timing().command_delay;
        if index + 1 != commands.len() && !delay.is_zero() {
            thread::sleep(delay);
        }
    }
    Ok(())
}

/// The prompt loop. `exit` and `quit` end it without contacting the
/// server, as does EOF or an interrupt. Timeouts and command rejections
/// are reported and the loop keeps going; everything else unwinds.
pub fn interactive<R: BufRead, W: Write>(
    session: &mut Session,
    input: &mut R,
    out: &mut W,
    ui: &Ui,
) -> Result<()> {
    loop {
        if session.interrupted() {
            break;
        }
        if !ui.no_prompt {
            write!(out, "{}", ui.prompt)?;
            out.flush()?;
        }

        let mut line = String::new();
        let read = match input.read_line(&mut line) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => break,
            Err(e) => return Err(e.into()),
        };
        if read == 0 {
            break; // EOF
        }
        if session.interrupted() {
            break;
        }

        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            break;
        }

        let mut sink = ResponseSink::new(&mut *out, ui.bukkit_colors);
        let outcome = session.run_command(line, &mut sink);
        drop(sink);
        match outcome {
            Ok(()) => {
                out.write_all(b"\n")?;
                out.flush()?;
            }
            Err(e) if e.is_interrupt() => break,
            Err(e) if e.recoverable_in_repl() => {
                eprintln!("{}{}", ui.palette.warn_prefix(), e);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
