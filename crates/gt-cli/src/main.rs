use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use gt_core::Town;
use gt_doctor::{CheckContext, CheckRegistry, Doctor, DoctorConfig, Report, ToolProbe};
use gt_git::{checkout_branch, CheckoutOutcome, SystemGit};
use gt_routing::{resolve, StoreStatus, Target};
use gt_storage::{DefaultStoreOpener, MigrationOptions, Selection, WispMigrator};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gt-doctor")]
#[command(about = "Health checks and self-healing for a town of rigs", long_about = None)]
struct Cli {
    /// Town root directory
    #[arg(long, global = true, env = "GT_TOWN_ROOT")]
    town: Option<PathBuf>,
    /// Log at debug level and show details of passing checks
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CheckArgs {
    /// Limit per-rig checks to one rig
    #[arg(long)]
    rig: Option<String>,
    /// Only run the named checks (repeatable)
    #[arg(long = "check")]
    checks: Vec<String>,
    /// Minutes before in-progress work counts as stuck
    #[arg(long)]
    stuck_threshold: Option<u64>,
    /// Print the report as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every check and report
    Run(CheckArgs),
    /// Run every check, repair what can be repaired, and re-check
    Fix(CheckArgs),
    /// Move flagged ephemeral records out of the persisted table
    MigrateWisps {
        #[arg(long)]
        rig: Option<String>,
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Show the redirect chain behind a worktree
    Resolve {
        worktree: PathBuf,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Check out a branch, freeing it from a bare repo that holds it
    Checkout { worktree: PathBuf, branch: String },
    /// Print the doctor version and the database binary it found
    Version,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match dispatch(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        "debug".to_string()
    } else if let Ok(level) = std::env::var("GT_LOG_LEVEL") {
        level
    } else {
        "warn".to_string()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn dispatch(cli: Cli) -> Result<ExitCode> {
    let verbose = cli.verbose;
    match cli.command {
        Commands::Run(args) => check_command(cli.town, args, verbose, false),
        Commands::Fix(args) => check_command(cli.town, args, verbose, true),
        Commands::MigrateWisps { rig, dry_run, json } => migrate_wisps(cli.town, rig, dry_run, json),
        Commands::Resolve { worktree, json } => resolve_command(worktree, json),
        Commands::Checkout { worktree, branch } => checkout_command(worktree, &branch),
        Commands::Version => version_command(cli.town),
    }
}

fn town_root(town: Option<PathBuf>) -> Result<Town> {
    let root = match town {
        Some(root) => root,
        None => std::env::current_dir().context("failed to read current directory")?,
    };
    let root = root
        .canonicalize()
        .with_context(|| format!("town root {} is not accessible", root.display()))?;
    debug!(event = "town_root", path = %root.display());
    Ok(Town::new(root))
}

fn load_config(town: &Town) -> Result<DoctorConfig> {
    DoctorConfig::load_for(town).context("failed to load doctor config")
}

fn check_command(town: Option<PathBuf>, args: CheckArgs, verbose: bool, fix: bool) -> Result<ExitCode> {
    let town = town_root(town)?;
    let mut config = load_config(&town)?;
    if let Some(minutes) = args.stuck_threshold {
        config.stuck_threshold_minutes = minutes;
    }
    let opener = DefaultStoreOpener::new(config.dolt_binary.clone());

    let mut registry = CheckRegistry::standard();
    if !args.checks.is_empty() {
        let unknown = registry.retain(&args.checks);
        if !unknown.is_empty() {
            bail!("unknown check(s): {}", unknown.join(", "));
        }
    }

    let ctx = CheckContext::new(town, &opener)
        .with_rig(args.rig)
        .with_config(config)
        .with_verbose(verbose);
    // An unknown --rig is a usage error, not a failed check.
    if ctx.rig.is_some() {
        ctx.rigs().context("failed to resolve --rig")?;
    }

    let doctor = Doctor::new(&registry);
    let report = if fix { doctor.fix(&ctx) } else { doctor.run(&ctx) };
    print_report(&report, args.json, verbose)?;
    Ok(exit_for(&report))
}

fn print_report(report: &Report, json: bool, verbose: bool) -> Result<()> {
    if json {
        println!("{}", report.render_json().context("failed to encode report")?);
    } else {
        print!("{}", report.render_human(verbose));
    }
    Ok(())
}

fn exit_for(report: &Report) -> ExitCode {
    if report.has_errors() {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}

fn migrate_wisps(town: Option<PathBuf>, rig: Option<String>, dry_run: bool, json: bool) -> Result<ExitCode> {
    let town = town_root(town)?;
    let config = load_config(&town)?;
    let opener = DefaultStoreOpener::new(config.dolt_binary.clone());
    let ctx = CheckContext::new(town, &opener).with_rig(rig).with_config(config);
    let rigs = ctx.rigs().context("failed to read rig registry")?;
    if rigs.is_empty() {
        bail!("no rigs in scope");
    }

    let options = MigrationOptions {
        dry_run,
        ..MigrationOptions::default()
    };
    let mut failed = false;
    let mut entries = Vec::new();
    for rig in &rigs {
        let outcome = ctx
            .open_rig_store(rig)
            .and_then(|db| WispMigrator::new(db.as_ref()).migrate(&Selection::FlaggedEphemeral, &options));
        match outcome {
            Ok(report) => {
                if !report.warnings.is_empty() {
                    failed = true;
                }
                if json {
                    entries.push(json!({
                        "rig": rig.name,
                        "dry_run": report.dry_run,
                        "candidates": report.candidates,
                        "copied": report.copied,
                        "purged": report.purged,
                        "closed": report.closed,
                        "committed": report.committed,
                        "warnings": report.warnings,
                    }));
                } else if report.dry_run {
                    println!("{}: {} record(s) would move to wisps", rig.name, report.candidates);
                } else {
                    println!(
                        "{}: {} candidate(s), {} copied, {} purged, {} closed",
                        rig.name, report.candidates, report.copied, report.purged, report.closed
                    );
                    for warning in &report.warnings {
                        println!("  ⚠ {warning}");
                    }
                }
            }
            Err(err) => {
                failed = true;
                warn!(event = "wisp_migration_failed", rig = %rig.name, error = %err);
                if json {
                    entries.push(json!({"rig": rig.name, "error": err.to_string()}));
                } else {
                    println!("{}: ✗ {err}", rig.name);
                }
            }
        }
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    }
    Ok(if failed { ExitCode::from(1) } else { ExitCode::SUCCESS })
}

fn status_label(status: StoreStatus) -> &'static str {
    match status {
        StoreStatus::NoStore => "no store",
        StoreStatus::Local => "local",
        StoreStatus::Redirected => "redirected",
    }
}

fn resolve_command(worktree: PathBuf, json: bool) -> Result<ExitCode> {
    let resolution = resolve(&worktree);
    let broken = match &resolution.target {
        Target::Valid(_) => None,
        Target::Broken { reason, .. } => Some(reason.to_string()),
    };
    if json {
        let hops: Vec<_> = resolution
            .hops
            .iter()
            .map(|hop| json!({"store_dir": hop.store_dir, "raw": hop.raw, "resolved": hop.resolved}))
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "status": status_label(resolution.status),
                "hops": hops,
                "target": resolution.target.path(),
                "broken": broken,
            }))?
        );
    } else {
        println!("{} ({})", resolution.chain(), status_label(resolution.status));
        match &broken {
            Some(reason) => println!("✗ {}: {reason}", resolution.target.path().display()),
            None => println!("✓ {}", resolution.target.path().display()),
        }
    }
    Ok(if resolution.is_healthy() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn checkout_command(worktree: PathBuf, branch: &str) -> Result<ExitCode> {
    match checkout_branch(&SystemGit, &worktree, branch) {
        Ok(CheckoutOutcome::CheckedOut) => println!("checked out {branch}"),
        Ok(CheckoutOutcome::CheckedOutAfterRetarget { bare_repo }) => println!(
            "checked out {branch} after moving HEAD of {}",
            bare_repo.display()
        ),
        Err(err) => {
            eprintln!("✗ {err}");
            return Ok(ExitCode::from(1));
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn version_command(town: Option<PathBuf>) -> Result<ExitCode> {
    println!("gt-doctor {}", env!("CARGO_PKG_VERSION"));
    // Outside a town the defaults still say which binary to look for.
    let config = match town_root(town) {
        Ok(town) => load_config(&town)?,
        Err(err) => {
            debug!(event = "version_without_town", error = %err);
            DoctorConfig::default()
        }
    };
    let probe = ToolProbe::from_config(&config);
    println!("{}: {:?}", probe.binary, probe.probe());
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fix_with_filters() {
        let cli = Cli::try_parse_from([
            "gt-doctor",
            "fix",
            "--rig",
            "gastown",
            "--check",
            "routes",
            "--check",
            "redirect-targets",
            "--stuck-threshold",
            "30",
        ])
        .expect("parse");
        let Commands::Fix(args) = cli.command else {
            panic!("expected fix");
        };
        assert_eq!(args.rig.as_deref(), Some("gastown"));
        assert_eq!(args.checks, vec!["routes", "redirect-targets"]);
        assert_eq!(args.stuck_threshold, Some(30));
    }

    #[test]
    fn town_flag_is_global() {
        let cli = Cli::try_parse_from(["gt-doctor", "migrate-wisps", "--dry-run", "--town", "/srv/town"])
            .expect("parse");
        assert_eq!(cli.town, Some(PathBuf::from("/srv/town")));
        assert!(matches!(cli.command, Commands::MigrateWisps { dry_run: true, .. }));
    }

    #[test]
    fn resolve_reports_broken_redirect() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let store = dir.path().join(".beads");
        std::fs::create_dir_all(&store).expect("store");
        std::fs::write(store.join("redirect"), "../nowhere/.beads\n").expect("redirect");
        let code = resolve_command(dir.path().to_path_buf(), true).expect("resolve");
        assert_eq!(code, ExitCode::from(1));
    }
}
