//! INI configuration: `[target]`, `[appearance]`, and `[timing]` sections
//! with typed keys (`s` = string, `b` = bool, `i` = integer milliseconds).
//! Unknown keys warn; unknown sections are ignored.

use std::env;
use std::path::{Path, PathBuf};

use ini::Ini;
use tracing::warn;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub target: TargetConfig,
    pub appearance: AppearanceConfig,
    pub timing: TimingConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TargetConfig {
    pub default_host: String,
    pub default_port: String,
    pub default_pass: String,
    pub allow_no_args: bool,
    pub allow_blank_password: bool,
}

impl Default for TargetConfig {
    fn default() -> Self {
        TargetConfig {
            default_host: "localhost".into(),
            default_port: "27015".into(),
            default_pass: String::new(),
            allow_no_args: false,
            allow_blank_password: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppearanceConfig {
    pub disable_prompt: bool,
    pub disable_colors: bool,
    pub custom_prompt: String,
    pub enable_bukkit_colors: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimingConfig {
    pub command_delay_ms: u64,
    pub receive_delay_ms: u64,
    pub select_timeout_ms: u64,
    pub no_terminator_probe: bool,
}

impl Default for TimingConfig {
    fn default() -> Self {
        TimingConfig {
            command_delay_ms: 0,
            receive_delay_ms: 10,
            select_timeout_ms: 500,
            no_terminator_probe: false,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Config> {
        let ini = Ini::load_from_file(path)
            .map_err(|e| Error::ConfigError(format!("failed to read {}: {e}", path.display())))?;
        Ok(Config::from_ini(&ini))
    }

    pub fn from_ini(ini: &Ini) -> Config {
        let mut cfg = Config::default();
        for (section, props) in ini.iter() {
            match section {
                Some("target") => {
                    for (key, value) in props.iter() {
                        match key {
                            "sDefaultHost" => cfg.target.default_host = value.to_string(),
                            "sDefaultPort" => cfg.target.default_port = value.to_string(),
                            "sDefaultPass" => cfg.target.default_pass = value.to_string(),
                            "bAllowNoArgs" => {
                                cfg.target.allow_no_args =
                                    parse_bool("target", key, value, cfg.target.allow_no_args);
                            }
                            "bAllowBlankPassword" => {
                                cfg.target.allow_blank_password = parse_bool(
                                    "target",
                                    key,
                                    value,
                                    cfg.target.allow_blank_password,
                                );
                            }
                            _ => warn!(section = "target", key, "unknown config key"),
                        }
                    }
                }
                Some("appearance") => {
                    for (key, value) in props.iter() {
                        match key {
                            "bDisablePrompt" => {
                                cfg.appearance.disable_prompt = parse_bool(
                                    "appearance",
                                    key,
                                    value,
                                    cfg.appearance.disable_prompt,
                                );
                            }
                            "bDisableColors" => {
                                cfg.appearance.disable_colors = parse_bool(
                                    "appearance",
                                    key,
                                    value,
                                    cfg.appearance.disable_colors,
                                );
                            }
                            "sCustomPrompt" => {
                                cfg.appearance.custom_prompt = value.to_string();
                            }
                            "bEnableBukkitColors" => {
                                cfg.appearance.enable_bukkit_colors = parse_bool(
                                    "appearance",
                                    key,
                                    value,
                                    cfg.appearance.enable_bukkit_colors,
                                );
                            }
                            _ => warn!(section = "appearance", key, "unknown config key"),
                        }
                    }
                }
                Some("timing") => {
                    for (key, value) in props.iter() {
                        match key {
                            "iCommandDelay" => {
                                cfg.timing.command_delay_ms =
                                    parse_ms("timing", key, value, cfg.timing.command_delay_ms);
                            }
                            "iReceiveDelay" => {
                                cfg.timing.receive_delay_ms =
                                    parse_ms("timing", key, value, cfg.timing.receive_delay_ms);
                            }
                            "iSelectTimeout" => {
                                cfg.timing.select_timeout_ms =
                                    parse_ms("timing", key, value, cfg.timing.select_timeout_ms);
                            }
                            "bNoTerminatorProbe" => {
                                cfg.timing.no_terminator_probe = parse_bool(
                                    "timing",
                                    key,
                                    value,
                                    cfg.timing.no_terminator_probe,
                                );
                            }
                            _ => warn!(section = "timing", key, "unknown config key"),
                        }
                    }
                }
                _ => {}
            }
        }
        cfg
    }

    /// Overwrites `path` with the current configuration.
    pub fn write(&self, path: &Path) -> Result<()> {
        let mut ini = Ini::new();
        self.apply_to(&mut ini);
        ini.write_to_file(path)
            .map_err(|e| Error::ConfigError(format!("failed to write {}: {e}", path.display())))
    }

    /// Writes the current configuration into `path`, keeping any keys the
    /// file already has that this tool does not recognize.
    pub fn update(&self, path: &Path) -> Result<()> {
        let mut ini = if path.exists() {
            Ini::load_from_file(path).map_err(|e| {
                Error::ConfigError(format!("failed to read {}: {e}", path.display()))
            })?
        } else {
            Ini::new()
        };
        self.apply_to(&mut ini);
        ini.write_to_file(path)
            .map_err(|e| Error::ConfigError(format!("failed to write {}: {e}", path.display())))
    }

    fn apply_to(&self, ini: &mut Ini) {
        ini.with_section(Some("target"))
            .set("sDefaultHost", self.target.default_host.as_str())
            .set("sDefaultPort", self.target.default_port.as_str())
            .set("sDefaultPass", self.target.default_pass.as_str())
            .set("bAllowNoArgs", bool_str(self.target.allow_no_args))
            .set(
                "bAllowBlankPassword",
                bool_str(self.target.allow_blank_password),
            );
        ini.with_section(Some("appearance"))
            .set("bDisablePrompt", bool_str(self.appearance.disable_prompt))
            .set("bDisableColors", bool_str(self.appearance.disable_colors))
            .set("sCustomPrompt", self.appearance.custom_prompt.as_str())
            .set(
                "bEnableBukkitColors",
                bool_str(self.appearance.enable_bukkit_colors),
            );
        ini.with_section(Some("timing"))
            .set("iCommandDelay", self.timing.command_delay_ms.to_string())
            .set("iReceiveDelay", self.timing.receive_delay_ms.to_string())
            .set("iSelectTimeout", self.timing.select_timeout_ms.to_string())
            .set(
                "bNoTerminatorProbe",
                bool_str(self.timing.no_terminator_probe),
            );
    }
}

fn bool_str(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

fn parse_bool(section: &str, key: &str, value: &str, default: bool) -> bool {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        _ => {
            warn!(section, key, value, "unparseable boolean, keeping default");
            default
        }
    }
}

fn parse_ms(section: &str, key: &str, value: &str, default: u64) -> u64 {
    match value.trim().parse() {
        Ok(ms) => ms,
        Err(_) => {
            warn!(section, key, value, "unparseable integer, keeping default");
            default
        }
    }
}

/// Resolves where the config and hostfile live: `<PROG>_CONFIG_DIR` if set,
/// otherwise next to the executable.
pub struct Locator {
    dir: PathBuf,
    program: String,
}

impl Locator {
    pub fn new(program: &str, env_prefix: &str) -> Locator {
        let dir = env::var_os(format!("{env_prefix}_CONFIG_DIR"))
            .map(PathBuf::from)
            .or_else(|| {
                env::current_exe()
                    .ok()
                    .and_then(|exe| exe.parent().map(Path::to_path_buf))
            })
            .unwrap_or_else(|| PathBuf::from("."));
        Locator {
            dir,
            program: program.to_string(),
        }
    }

    pub fn ini_path(&self) -> PathBuf {
        self.dir.join(format!("{}.ini", self.program))
    }

    pub fn hosts_path(&self) -> PathBuf {
        self.dir.join(format!("{}.hosts", self.program))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.target.default_port, "27015");
        assert!(!cfg.target.allow_no_args);
        assert_eq!(cfg.timing.command_delay_ms, 0);
        assert_eq!(cfg.timing.receive_delay_ms, 10);
        assert_eq!(cfg.timing.select_timeout_ms, 500);
        assert!(!cfg.appearance.disable_prompt);
        assert!(cfg.appearance.custom_prompt.is_empty());
    }

    #[test]
    fn loads_values_from_every_section() {
        let ini = Ini::load_from_str(
            "[target]\n\
             sDefaultHost = play.example.net\n\
             sDefaultPort = 25575\n\
             sDefaultPass = swordfish\n\
             bAllowNoArgs = true\n\
             [appearance]\n\
             bDisablePrompt = 1\n\
             sCustomPrompt = >\n\
             bEnableBukkitColors = yes\n\
             [timing]\n\
             iCommandDelay = 250\n\
             iSelectTimeout = 1000\n",
        )
        .unwrap();
        let cfg = Config::from_ini(&ini);
        assert_eq!(cfg.target.default_host, "play.example.net");
        assert_eq!(cfg.target.default_port, "25575");
        assert_eq!(cfg.target.default_pass, "swordfish");
        assert!(cfg.target.allow_no_args);
        assert!(cfg.appearance.disable_prompt);
        assert!(cfg.appearance.enable_bukkit_colors);
        assert_eq!(cfg.appearance.custom_prompt, ">");
        assert_eq!(cfg.timing.command_delay_ms, 250);
        assert_eq!(cfg.timing.select_timeout_ms, 1000);
        // untouched keys keep their defaults
        assert_eq!(cfg.timing.receive_delay_ms, 10);
    }

    #[test]
    fn unknown_keys_and_sections_are_tolerated() {
        let ini = Ini::load_from_str(
            "[target]\n\
             sNoSuchKey = x\n\
             sDefaultHost = kept\n\
             [mystery]\n\
             anything = goes\n",
        )
        .unwrap();
        let cfg = Config::from_ini(&ini);
        assert_eq!(cfg.target.default_host, "kept");
    }

    #[test]
    fn bad_values_keep_defaults() {
        let ini = Ini::load_from_str(
            "[target]\n\
             bAllowNoArgs = maybe\n\
             [timing]\n\
             iCommandDelay = soon\n",
        )
        .unwrap();
        let cfg = Config::from_ini(&ini);
        assert!(!cfg.target.allow_no_args);
        assert_eq!(cfg.timing.command_delay_ms, 0);
    }

    #[test]
    fn materialized_config_parses_back_identically() {
        let mut cfg = Config::default();
        cfg.target.default_host = "rcon.example.com".into();
        cfg.timing.command_delay_ms = 42;
        cfg.appearance.enable_bukkit_colors = true;

        let mut ini = Ini::new();
        cfg.apply_to(&mut ini);
        assert_eq!(Config::from_ini(&ini), cfg);
    }
}
