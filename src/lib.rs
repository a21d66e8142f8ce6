//! Client library for the Source RCON protocol, the remote-console wire
//! format used by Source engine games, Minecraft, and their look-alikes.
//!
//! The entry point is [`Session`]: connect, authenticate, then run
//! commands. Responses may arrive as several fragments with no
//! end-of-response marker in the protocol itself; the session detects
//! completion with a terminator probe (see [`session`]) and streams each
//! fragment to the caller as it arrives.
//!
//! ```no_run
//! use std::sync::atomic::AtomicBool;
//! use std::sync::Arc;
//!
//! use rconc::session::{Session, Timing};
//!
//! # fn main() -> rconc::Result<()> {
//! let interrupted = Arc::new(AtomicBool::new(false));
//! let mut session = Session::connect("localhost", 27015, Timing::default(), true, interrupted)?;
//! session.authenticate("hunter2")?;
//! let mut output = Vec::new();
//! session.run_command("status", &mut output)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod envinfo;
pub mod error;
pub mod hosts;
pub mod mode;
pub mod packet;
pub mod session;
pub mod term;
pub mod transport;

pub use error::{Error, Result};
pub use packet::{IdAllocator, Packet, PSIZE_MAX, PSIZE_MIN};
pub use session::{Session, SessionState, Timing};
