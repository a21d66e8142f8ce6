//! Recognized environment variables. The variable prefix is derived from
//! the executable name, so a renamed binary reads its own set.

use std::env;
use std::io::{self, Write};

/// Basename of the running executable without its extension.
pub fn program_name() -> String {
    env::current_exe()
        .ok()
        .and_then(|exe| {
            exe.file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string())
}

/// Uppercased program name with anything outside `[A-Za-z0-9]` mapped to an
/// underscore.
pub fn env_prefix(program: &str) -> String {
    program
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// The four variables this tool reads, captured at startup.
#[derive(Debug, Clone)]
pub struct EnvVars {
    pub prefix: String,
    pub config_dir: Option<String>,
    pub host: Option<String>,
    pub port: Option<String>,
    pub pass: Option<String>,
}

impl EnvVars {
    pub fn load(prefix: &str) -> EnvVars {
        let read = |suffix: &str| env::var(format!("{prefix}_{suffix}")).ok();
        EnvVars {
            prefix: prefix.to_string(),
            config_dir: read("CONFIG_DIR"),
            host: read("HOST"),
            port: read("PORT"),
            pass: read("PASS"),
        }
    }

    /// The `--print-env` dump: every recognized variable with its current
    /// value and a one-line description.
    pub fn print<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let rows: [(&str, &Option<String>, &str); 4] = [
            (
                "CONFIG_DIR",
                &self.config_dir,
                "directory searched for the config file and hostfile",
            ),
            ("HOST", &self.host, "default target host"),
            ("PORT", &self.port, "default target port"),
            ("PASS", &self.pass, "default target password"),
        ];
        for (suffix, value, description) in rows {
            writeln!(
                out,
                "{}_{}={}",
                self.prefix,
                suffix,
                value.as_deref().unwrap_or("(unset)")
            )?;
            writeln!(out, "    {description}")?;
        }
        Ok(())
    }
}
