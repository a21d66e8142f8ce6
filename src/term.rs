//! Terminal formatting: the palette every styled write goes through, and
//! the Bukkit section-sign color translation.

use std::io::{self, Write};

const RESET: &str = "\x1b[0m";

/// Section sign (UTF-8 `§`) that introduces a Bukkit color code.
const SECTION_SIGN: [u8; 2] = [0xC2, 0xA7];

/// Central color switch. Styled output is produced only through this type,
/// so `-n`/`bDisableColors` take effect everywhere at once.
#[derive(Debug, Clone)]
pub struct Palette {
    enabled: bool,
}

impl Palette {
    pub fn new(enabled: bool) -> Palette {
        Palette { enabled }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    fn wrap(&self, sgr: &str, text: &str) -> String {
        if self.enabled {
            format!("\x1b[{sgr}m{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    pub fn error_prefix(&self) -> String {
        format!("{} ", self.wrap("31", "error:"))
    }

    pub fn warn_prefix(&self) -> String {
        format!("{} ", self.wrap("33", "warning:"))
    }

    pub fn highlight(&self, text: &str) -> String {
        self.wrap("33", text)
    }

    /// The default interactive prompt: `RCON@<host>> `.
    pub fn default_prompt(&self, host: &str) -> String {
        if self.enabled {
            format!("\x1b[32mRCON@{host}{RESET}> ")
        } else {
            format!("RCON@{host}> ")
        }
    }
}

/// Restores terminal attributes when dropped, whatever the exit path.
pub struct RestoreGuard {
    enabled: bool,
}

impl RestoreGuard {
    pub fn new(palette: &Palette) -> RestoreGuard {
        RestoreGuard {
            enabled: palette.enabled(),
        }
    }
}

impl Drop for RestoreGuard {
    fn drop(&mut self) {
        if self.enabled {
            let mut out = io::stdout();
            let _ = out.write_all(RESET.as_bytes());
            let _ = out.flush();
        }
    }
}

fn sgr_for_code(code: u8) -> Option<&'static str> {
    Some(match code {
        b'0' => "30",
        b'1' => "34",
        b'2' => "32",
        b'3' => "36",
        b'4' => "31",
        b'5' => "35",
        b'6' => "33",
        b'7' => "37",
        b'8' => "90",
        b'9' => "94",
        b'a' => "92",
        b'b' => "96",
        b'c' => "91",
        b'd' => "95",
        b'e' => "93",
        b'f' => "97",
        b'r' => "0",
        b'l' => "1",
        b'n' => "4",
        b'o' => "3",
        b'm' => "9",
        b'k' => "8",
        _ => return None,
    })
}

/// Replaces `§<code>` sequences in one response fragment with ANSI SGR
/// escapes. If anything was translated, a reset is appended at the end of
/// the fragment. Unknown codes and bare section signs pass through.
pub fn translate_bukkit(fragment: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(fragment.len());
    let mut colored = false;
    let mut i = 0;
    while i < fragment.len() {
        if fragment[i..].starts_with(&SECTION_SIGN) && i + 2 < fragment.len() {
            if let Some(sgr) = sgr_for_code(fragment[i + 2]) {
                out.extend_from_slice(format!("\x1b[{sgr}m").as_bytes());
                colored = true;
                i += 3;
                continue;
            }
        }
        out.push(fragment[i]);
        i += 1;
    }
    if colored {
        out.extend_from_slice(RESET.as_bytes());
    }
    out
}

/// Write adapter the drivers hand to the engine: forwards response bytes
/// as-is, optionally running them through the Bukkit translation, and
/// flushes per fragment so output streams as it arrives.
pub struct ResponseSink<W: Write> {
    inner: W,
    bukkit: bool,
}

impl<W: Write> ResponseSink<W> {
    pub fn new(inner: W, bukkit: bool) -> ResponseSink<W> {
        ResponseSink { inner, bukkit }
    }
}

impl<W: Write> Write for ResponseSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.bukkit {
            self.inner.write_all(&translate_bukkit(buf))?;
        } else {
            self.inner.write_all(buf)?;
        }
        self.inner.flush()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
