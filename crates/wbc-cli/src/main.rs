//! `wbc` – command line entry point of the whole-body controller.
//!
//! Subcommands:
//!
//! - `simulate [--ticks N] [--force F] [--realtime]` – close a simulated
//!   gripper on an object through the supervisor and the control loop.
//! - `describe <file> [--prefix P]` – parse a description document and list
//!   its grippers, handles and contacts.
//! - `config [init]` – print the effective configuration, or write the
//!   defaults to `~/.wbc/config.toml`.
//!
//! **Ctrl-C** raises the shutdown flag; a running loop finishes its tick and
//! exits.

mod config;
mod simulate;

use colored::Colorize;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

use wbc_frames::load_description;
use wbc_runtime::SupervisorCommand;

fn main() {
    // RUST_LOG filters (default "info"); WBC_LOG_FORMAT=json for log
    // aggregators.  User-facing output stays on println!.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    if std::env::var("WBC_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .compact()
            .init();
    }

    print_banner();

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping the control loop …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; the loop can only stop on its own");
    }

    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!("  Config loaded from {}", config::config_path().display().to_string().bold());
            cfg
        }
        Ok(None) => {
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };

    let args: Vec<String> = std::env::args().skip(1).collect();
    let code = match args.first().map(String::as_str) {
        Some("simulate") => cmd_simulate(&cfg, &args[1..], shutdown),
        Some("describe") => cmd_describe(&args[1..]),
        Some("config") => cmd_config(&cfg, &args[1..]),
        Some("help") | Some("--help") | Some("-h") | None => {
            print_usage();
            0
        }
        Some(other) => {
            println!("{} unknown command {}", "✗".red().bold(), other.bold());
            print_usage();
            2
        }
    };
    std::process::exit(code);
}

// ────────────────────────────────────────────────────────────────────────────
// Commands
// ────────────────────────────────────────────────────────────────────────────

fn cmd_simulate(cfg: &config::Config, args: &[String], shutdown: Arc<AtomicBool>) -> i32 {
    let ticks = flag_value(args, "--ticks")
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(3000);
    let force = flag_value(args, "--force")
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(5.0);

    if args.iter().any(|a| a == "--realtime") {
        return simulate_realtime(cfg, force, shutdown);
    }

    println!("  Closing gripper for {} ticks, desired force {} …", ticks, force);
    match simulate::run(cfg, ticks, force, shutdown) {
        Ok(report) => {
            println!();
            println!("  Ticks run      : {}", report.ticks);
            match report.switched_at {
                Some(t) => println!("  Contact        : tick {} ({:.3} s)", t, t as f64 * cfg.period().as_secs_f64()),
                None => println!("  Contact        : {}", "not reached".yellow()),
            }
            println!("  Final force    : {:.4}", report.final_force);
            println!("  Final angle    : {:.4} rad", report.final_angle);
            if report.released {
                println!("  {}", "Latch fell back to position control".yellow());
            }
            0
        }
        Err(e) => {
            println!("{}: {}", "Simulation failed".red(), e);
            1
        }
    }
}

fn simulate_realtime(cfg: &config::Config, force: f64, shutdown: Arc<AtomicBool>) -> i32 {
    let sim = match simulate::build(cfg, force) {
        Ok(sim) => sim,
        Err(e) => {
            println!("{}: {}", "Simulation failed".red(), e);
            return 1;
        }
    };
    if let Err(e) = sim.handle.post(SupervisorCommand::Activate {
        name: simulate::TRANSITION.to_string(),
        verify: true,
    }) {
        println!("{}: {}", "Activation failed".red(), e);
        return 1;
    }
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            println!("{}: {}", "Failed to start the Tokio runtime".red(), e);
            return 1;
        }
    };
    println!("  Running every {:?}; press {} to stop.", cfg.period(), "Ctrl-C".bold());
    match runtime.block_on(sim.control_loop.run(shutdown)) {
        Ok(ticks) => {
            println!("  {} {} ticks run", "✓".green().bold(), ticks);
            0
        }
        Err(e) => {
            println!("{}: {}", "Control loop failed".red(), e);
            1
        }
    }
}

fn cmd_describe(args: &[String]) -> i32 {
    let Some(path) = args.first().filter(|a| !a.starts_with("--")) else {
        println!("{} usage: wbc describe <file> [--prefix P]", "✗".red().bold());
        return 2;
    };
    let prefix = flag_value(args, "--prefix");
    let description = match load_description(Path::new(path), prefix) {
        Ok(d) => d,
        Err(e) => {
            println!("{}: {}", "Invalid description".red(), e);
            return 1;
        }
    };

    println!("  {} ({} grippers, {} handles, {} contacts)",
        path.bold(),
        description.grippers.len(),
        description.handles.len(),
        description.contacts.len()
    );
    for (key, g) in &description.grippers {
        println!("    gripper {} on {} joints [{}]", key.cyan(), g.link, g.joints.join(", "));
    }
    for (key, h) in &description.handles {
        let mask: String = h.mask.iter().map(|&m| if m { '1' } else { '0' }).collect();
        println!("    handle  {} on {} mask {}", key.cyan(), h.link, mask);
    }
    for (key, c) in &description.contacts {
        println!("    contact {} on {} ({} points, {} shapes)", key.cyan(), c.link, c.points.len(), c.shapes.len());
    }
    0
}

fn cmd_config(cfg: &config::Config, args: &[String]) -> i32 {
    if args.first().map(String::as_str) == Some("init") {
        return match config::save(cfg) {
            Ok(()) => {
                println!("  {} Config saved to {}", "✓".green().bold(), config::config_path().display().to_string().bold());
                0
            }
            Err(e) => {
                println!("{}: {}", "Error saving config".red(), e);
                1
            }
        };
    }
    match toml::to_string_pretty(cfg) {
        Ok(raw) => {
            println!("{}", raw);
            0
        }
        Err(e) => {
            println!("{}: {}", "Error printing config".red(), e);
            1
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Banner
// ────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#" _      __ ___  _____"#.bold().cyan());
    println!("{}", r#"| | /| / // _ )/ ___/"#.bold().cyan());
    println!("{}", r#"| |/ |/ // _  / /__  "#.bold().cyan());
    println!("{}", r#"|__/|__//____/\___/  "#.bold().cyan());
    println!();
    println!("  {} {}", "wbc".bold(), format!("v{}", env!("CARGO_PKG_VERSION")).dimmed());
    println!("  Whole-body control supervisor");
    println!();
}

fn print_usage() {
    println!("  Usage:");
    println!("    wbc simulate [--ticks N] [--force F] [--realtime]");
    println!("    wbc describe <file> [--prefix P]");
    println!("    wbc config [init]");
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

/// Value following `name` in `args`.
fn flag_value<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}
