use std::fs;
use std::io::{self, BufRead, IsTerminal};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use rconc::config::{Config, Locator};
use rconc::envinfo::{self, EnvVars};
use rconc::error::{Error, Result};
use rconc::hosts::{HostEntry, HostList, SaveOutcome};
use rconc::mode::{self, Ui};
use rconc::session::{self, Session, Timing};
use rconc::term::{Palette, RestoreGuard};

const BUG_REPORT_URL: &str = "https://github.com/rconc/rconc/issues";

/// Command-line RCON client for Source engine and Minecraft servers.
#[derive(Parser, Debug)]
#[command(name = "rconc", version, disable_version_flag = true)]
#[command(about = "A command-line remote console (RCON) client for the Source RCON protocol, \
compatible with Source engine games, Minecraft, and similar servers.")]
struct Args {
    /// RCON server IP or hostname
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// RCON server port
    #[arg(short = 'P', long)]
    port: Option<String>,

    /// RCON server password
    #[arg(short = 'p', long)]
    pass: Option<String>,

    /// Use a saved host's connection info
    #[arg(short = 'S', long, value_name = "NAME")]
    saved: Option<String>,

    /// Save the current target under the given name, then exit
    #[arg(long, value_name = "NAME")]
    save_host: Option<String>,

    /// Remove a saved host by name, then exit (repeatable)
    #[arg(long, value_name = "NAME")]
    remove_host: Vec<String>,

    /// List all saved hosts, then exit
    #[arg(short = 'l', long)]
    list_hosts: bool,

    /// Run each line of the given file as a command (repeatable)
    #[arg(short = 'f', long = "file", value_name = "PATH")]
    files: Vec<PathBuf>,

    /// Milliseconds to wait between queued commands
    #[arg(short = 'w', long, value_name = "MS")]
    wait: Option<String>,

    /// Open an interactive shell after any queued commands
    #[arg(short = 'i', long, short_alias = 't')]
    interactive: bool,

    /// Suppress the interactive prompt and the command echo
    #[arg(short = 'Q', long)]
    no_prompt: bool,

    /// Disable colorized output
    #[arg(short = 'n', long)]
    no_color: bool,

    /// Minimize output that is not a server response
    #[arg(short = 'q', long, short_alias = 's')]
    quiet: bool,

    /// Print recognized environment variables, then exit
    #[arg(long)]
    print_env: bool,

    /// (Over)write the INI config with the default values, then exit
    #[arg(long)]
    write_ini: bool,

    /// Update the INI config, keeping unrecognized keys, then exit
    #[arg(long)]
    update_ini: bool,

    /// Print version information, then exit
    #[arg(short = 'v', long = "version", action = clap::ArgAction::Version)]
    version: (),

    /// Commands to run on the server
    #[arg(value_name = "COMMAND")]
    commands: Vec<String>,
}

/// The connection target after merging defaults, env, hostfile, and CLI.
struct Target {
    host: String,
    port: String,
    pass: String,
}

fn main() -> ExitCode {
    // Map clap's usage errors to this tool's single failure exit code.
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let code = if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS // --help / --version
            };
            let _ = e.print();
            return code;
        }
    };
    init_tracing(args.quiet);
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_interrupt() => ExitCode::SUCCESS,
        Err(e) => {
            report(&e, args.no_color);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let program = envinfo::program_name();
    let prefix = envinfo::env_prefix(&program);
    let env_vars = EnvVars::load(&prefix);

    if args.print_env {
        env_vars.print(&mut io::stdout().lock())?;
        return Ok(());
    }

    let locator = Locator::new(&program, &prefix);
    let ini_path = locator.ini_path();
    let mut cfg = if ini_path.exists() {
        Config::load(&ini_path)?
    } else {
        Config::default()
    };

    // Environment variables override the INI defaults; CLI flags override both.
    if let Some(host) = &env_vars.host {
        cfg.target.default_host = host.clone();
    }
    if let Some(port) = &env_vars.port {
        cfg.target.default_port = port.clone();
    }
    if let Some(pass) = &env_vars.pass {
        cfg.target.default_pass = pass.clone();
    }

    if std::env::args_os().len() <= 1 && !cfg.target.allow_no_args {
        return Err(Error::BadArgument(format!(
            "no arguments were specified; pick a target with -H/-P/-p, \
             set bAllowNoArgs=true in {}, or see --help",
            ini_path.display()
        )));
    }

    let palette = Palette::new(!(args.no_color || cfg.appearance.disable_colors));
    let _restore = RestoreGuard::new(&palette);

    let hosts_path = locator.hosts_path();
    let mut hosts = if hosts_path.exists() {
        HostList::load(&hosts_path)?
    } else {
        HostList::default()
    };

    let target = resolve_target(args, &cfg, &hosts)?;

    if args.write_ini {
        Config::default().write(&ini_path)?;
        println!("wrote config: {}", ini_path.display());
        return Ok(());
    }
    if args.update_ini {
        let mut effective = cfg.clone();
        effective.target.default_host = target.host.clone();
        effective.target.default_port = target.port.clone();
        effective.target.default_pass = target.pass.clone();
        effective.update(&ini_path)?;
        println!("updated config: {}", ini_path.display());
        return Ok(());
    }

    if handle_hostfile_actions(args, &mut hosts, &hosts_path, &target, &palette)? {
        return Ok(());
    }

    let command_delay_ms = match &args.wait {
        Some(value) => value.trim().parse::<u64>().map_err(|_| {
            Error::BadArgument(format!(
                "invalid delay value \"{value}\", expected milliseconds"
            ))
        })?,
        None => cfg.timing.command_delay_ms,
    };

    let commands = collect_commands(args, &palette)?;

    session::validate_password(&target.pass, cfg.target.allow_blank_password)?;
    let port: u16 = target.port.trim().parse().map_err(|_| {
        Error::BadArgument(format!("invalid port \"{}\"", target.port))
    })?;

    let timing = Timing {
        command_delay: Duration::from_millis(command_delay_ms),
        receive_delay: Duration::from_millis(cfg.timing.receive_delay_ms),
        select_timeout: Duration::from_millis(cfg.timing.select_timeout_ms),
        ..Timing::default()
    };

    let interrupted = register_signals()?;
    let mut session = Session::connect(
        &target.host,
        port,
        timing,
        !cfg.timing.no_terminator_probe,
        interrupted,
    )?;
    session.authenticate(&target.pass)?;

    let no_prompt = args.no_prompt || cfg.appearance.disable_prompt;
    let prompt = if no_prompt {
        String::new()
    } else if !cfg.appearance.custom_prompt.is_empty() {
        cfg.appearance.custom_prompt.clone()
    } else {
        palette.default_prompt(&target.host)
    };
    let ui = Ui {
        palette: &palette,
        prompt: &prompt,
        no_prompt,
        bukkit_colors: cfg.appearance.enable_bukkit_colors && palette.enabled(),
    };

    if !commands.is_empty() {
        mode::batch(&mut session, &commands, &ui, &mut io::stdout().lock())?;
    }
    if commands.is_empty() || args.interactive {
        mode::interactive(
            &mut session,
            &mut io::stdin().lock(),
            &mut io::stdout().lock(),
            &ui,
        )?;
    }

    session.close();
    Ok(())
}

fn report(err: &Error, no_color: bool) {
    let palette = Palette::new(!no_color);
    eprintln!("{}{}", palette.error_prefix(), err);
    if matches!(err, Error::Io(_)) {
        eprintln!("please report this failure: {BUG_REPORT_URL}");
    }
}

fn init_tracing(quiet: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(if quiet { "error" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .without_time()
        .compact()
        .init();
}

/// Signal handling: the first SIGINT/SIGTERM sets the interrupt flag that
/// the session observes at suspension points; a second delivery falls
/// through to the default handler.
fn register_signals() -> Result<Arc<AtomicBool>> {
    use signal_hook::consts::{SIGINT, SIGTERM};

    let flag = Arc::new(AtomicBool::new(false));
    for sig in [SIGINT, SIGTERM] {
        signal_hook::flag::register_conditional_default(sig, Arc::clone(&flag))?;
        signal_hook::flag::register(sig, Arc::clone(&flag))?;
    }
    #[cfg(unix)]
    signal_hook::flag::register(signal_hook::consts::SIGABRT, Arc::clone(&flag))?;
    Ok(flag)
}

/// Merges the target: hostfile entry (with `-S`) or config defaults as the
/// base, individual CLI flags on top.
fn resolve_target(args: &Args, cfg: &Config, hosts: &HostList) -> Result<Target> {
    let mut target = if let Some(name) = &args.saved {
        let entry = hosts.get(name).ok_or_else(|| {
            Error::BadArgument(format!("there is no saved target named \"{name}\" in the hostfile"))
        })?;
        Target {
            host: entry.host.clone(),
            port: entry.port.clone(),
            pass: entry.pass.clone(),
        }
    } else {
        Target {
            host: cfg.target.default_host.clone(),
            port: cfg.target.default_port.clone(),
            pass: cfg.target.default_pass.clone(),
        }
    };
    if let Some(host) = &args.host {
        target.host = host.clone();
    }
    if let Some(port) = &args.port {
        target.port = port.clone();
    }
    if let Some(pass) = &args.pass {
        target.pass = pass.clone();
    }
    Ok(target)
}

/// Runs `--remove-host`, `--save-host`, and `--list-hosts`. Returns true
/// if any of them was requested, in which case the program exits without
/// connecting.
fn handle_hostfile_actions(
    args: &Args,
    hosts: &mut HostList,
    path: &Path,
    target: &Target,
    palette: &Palette,
) -> Result<bool> {
    let mut acted = false;

    if !args.remove_host.is_empty() {
        acted = true;
        for name in &args.remove_host {
            if hosts.remove(name) {
                println!("removed {}", palette.highlight(&format!("\"{name}\"")));
            } else {
                eprintln!(
                    "{}no saved host named \"{name}\"",
                    palette.warn_prefix()
                );
            }
        }
        if hosts.is_empty() {
            if path.exists() {
                fs::remove_file(path).map_err(|e| {
                    Error::ConfigError(format!(
                        "failed to delete empty hostfile {}: {e}",
                        path.display()
                    ))
                })?;
                println!("deleted the hostfile; no entries remain");
            }
        } else {
            hosts.save(path)?;
            println!("saved hostfile {}", path.display());
        }
    }

    if let Some(name) = &args.save_host {
        acted = true;
        let entry = HostEntry {
            host: target.host.clone(),
            port: target.port.clone(),
            pass: target.pass.clone(),
        };
        match hosts.insert(name.clone(), entry) {
            SaveOutcome::Added => println!(
                "added {}: {}:{}",
                palette.highlight(&format!("\"{name}\"")),
                target.host,
                target.port
            ),
            SaveOutcome::Updated => println!(
                "updated {}: {}:{}",
                palette.highlight(&format!("\"{name}\"")),
                target.host,
                target.port
            ),
            SaveOutcome::Unchanged => {
                return Err(Error::BadArgument(format!(
                    "host \"{name}\" is already set to {}:{}",
                    target.host, target.port
                )));
            }
        }
        hosts.save(path)?;
        println!("saved hostfile {}", path.display());
    }

    if args.list_hosts {
        acted = true;
        if hosts.is_empty() {
            eprintln!("there are no saved hosts");
        }
        for (name, entry) in hosts.iter() {
            if args.quiet {
                println!(
                    "{}  ( {}:{} )",
                    palette.highlight(&format!("\"{name}\"")),
                    entry.host,
                    entry.port
                );
            } else {
                println!("{}", palette.highlight(&format!("\"{name}\"")));
                println!("    Host:  {}", entry.host);
                println!("    Port:  {}", entry.port);
            }
        }
    }

    Ok(acted)
}

/// Gathers the commands to run: positional arguments, then piped stdin
/// lines, then script files, in that order.
fn collect_commands(args: &Args, palette: &Palette) -> Result<Vec<String>> {
    let mut commands = args.commands.clone();

    if !io::stdin().is_terminal() {
        for line in io::stdin().lock().lines() {
            let line = line?;
            let line = line.trim();
            if !line.is_empty() {
                commands.push(line.to_string());
            }
        }
    }

    for path in &args.files {
        commands.extend(read_script_file(path, palette, args.quiet));
    }
    Ok(commands)
}

/// Reads a script file: one command per line, blank lines and `#`/`;`
/// comment lines skipped. A missing or empty file warns instead of
/// aborting.
fn read_script_file(path: &Path, palette: &Palette, quiet: bool) -> Vec<String> {
    match fs::read_to_string(path) {
        Err(err) => {
            eprintln!(
                "{}couldn't read script file {}: {err}",
                palette.warn_prefix(),
                path.display()
            );
            Vec::new()
        }
        Ok(text) => {
            let commands: Vec<String> = text
                .lines()
                .map(str::trim)
                .filter(|line| {
                    !line.is_empty() && !line.starts_with('#') && !line.starts_with(';')
                })
                .map(String::from)
                .collect();
            if commands.is_empty() {
                eprintln!(
                    "{}no commands in script file {}",
                    palette.warn_prefix(),
                    path.display()
                );
            } else if !quiet {
                println!("read {} commands from {}", commands.len(), path.display());
            }
            commands
        }
    }
}
