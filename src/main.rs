use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use pbx_patcher::config::{
    apply_plan, builtin, builtin_names, load_from_path, resolve_plan, ApplyOptions, ApplyReport,
    PatchPlan,
};
use pbx_patcher::report::{Outcome, PatchStatus};
use pbx_patcher::snapshot::{restore, BackupHandle};
use similar::{ChangeTag, TextDiff};
use std::env;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

const PROJECT_FILE: &str = "project.pbxproj";

#[derive(Parser)]
#[command(name = "pbx-patcher")]
#[command(about = "Idempotent build-setting patches for Xcode projects", long_about = None)]
#[command(version)]
struct Cli {
    /// Log engine decisions to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a patch plan to a project
    Apply {
        /// project.pbxproj or .xcodeproj bundle (auto-detected if not specified)
        #[arg(long)]
        project: Option<PathBuf>,

        /// Built-in plan name or path to a plan file
        #[arg(short, long)]
        plan: String,

        /// Dry run - show what would be changed without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Report what a plan would change without writing anything
    Status {
        /// project.pbxproj or .xcodeproj bundle (auto-detected if not specified)
        #[arg(long)]
        project: Option<PathBuf>,

        /// Built-in plan name or path to a plan file
        #[arg(short, long)]
        plan: String,
    },

    /// Restore a project from the backup written by a plan
    Restore {
        /// project.pbxproj or .xcodeproj bundle (auto-detected if not specified)
        #[arg(long)]
        project: Option<PathBuf>,

        /// Built-in plan name or path to a plan file (selects the backup suffix)
        #[arg(short, long)]
        plan: String,
    },

    /// List built-in plans and plan files in a directory
    List {
        /// Directory to search for *.toml plan files
        #[arg(long)]
        plans_dir: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Apply {
            project,
            plan,
            dry_run,
            diff,
            json,
        } => cmd_apply(project, &plan, dry_run, diff, json),

        Commands::Status { project, plan } => cmd_status(project, &plan),

        Commands::Restore { project, plan } => cmd_restore(project, &plan),

        Commands::List { plans_dir } => cmd_list(plans_dir),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "pbx_patcher=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Resolve the project document path.
///
/// Priority order:
/// 1. Explicit --project flag
/// 2. PBXPATCH_PROJECT environment variable
/// 3. The single .xcodeproj bundle in the current directory
fn resolve_project(cli_project: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = cli_project {
        return project_file(&path);
    }

    if let Ok(env_path) = env::var("PBXPATCH_PROJECT") {
        let path = PathBuf::from(&env_path);
        if path.exists() {
            return project_file(&path);
        }
        eprintln!(
            "{}",
            format!(
                "Warning: PBXPATCH_PROJECT is set but path doesn't exist: {}",
                env_path
            )
            .yellow()
        );
    }

    let cwd = env::current_dir()?;
    let bundles: Vec<PathBuf> = WalkDir::new(&cwd)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_dir()
                && entry.path().extension().and_then(|ext| ext.to_str()) == Some("xcodeproj")
        })
        .map(|entry| entry.into_path())
        .collect();

    match bundles.as_slice() {
        [bundle] => {
            eprintln!(
                "{}",
                format!("Auto-detected project: {}", bundle.display()).dimmed()
            );
            project_file(bundle)
        }
        [] => anyhow::bail!(
            "{}\n{}\n  {}\n  {}",
            "Could not find an Xcode project.".red(),
            "Try one of:".bold(),
            "1. Specify explicitly: pbx-patcher apply --project App.xcodeproj --plan <plan>",
            "2. Set environment variable: export PBXPATCH_PROJECT=/path/to/App.xcodeproj"
        ),
        _ => anyhow::bail!(
            "Found {} .xcodeproj bundles in {}; pass --project to choose one",
            bundles.len(),
            cwd.display()
        ),
    }
}

/// Accept either the bundle directory or the pbxproj inside it.
fn project_file(path: &Path) -> Result<PathBuf> {
    let file = if path.is_dir() {
        path.join(PROJECT_FILE)
    } else {
        path.to_path_buf()
    };
    if !file.is_file() {
        anyhow::bail!("Project file not found: {}", file.display());
    }
    Ok(file)
}

fn load_plan(name_or_path: &str) -> Result<PatchPlan> {
    resolve_plan(name_or_path).with_context(|| format!("could not load plan '{name_or_path}'"))
}

/// Helper: Show unified diff between original and modified content
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);
    for hunk in diff.unified_diff().context_radius(3).iter_hunks() {
        println!("{}", hunk.header().to_string().cyan());
        for change in hunk.iter_changes() {
            let line = match change.tag() {
                ChangeTag::Delete => format!("-{}", change).red(),
                ChangeTag::Insert => format!("+{}", change).green(),
                ChangeTag::Equal => format!(" {}", change).normal(),
            };
            print!("{}", line);
        }
    }
}

fn print_outcome(outcome: &Outcome, dry_run: bool) {
    for result in &outcome.details {
        let label = format!("{} [{}]", result.operation, result.block);
        match &result.status {
            status if status.is_change() => {
                let verb = if dry_run { "would be " } else { "" };
                println!("{} {}: {}{}", "✓".green(), label, verb, status);
            }
            PatchStatus::Unchanged => {
                println!("{} {}: already satisfied", "⊙".yellow(), label);
            }
            PatchStatus::Failed(reason) => {
                eprintln!("{} {}: Failed - {}", "✗".red(), label, reason);
            }
            status => {
                println!("{} {}: {}", "⊘".cyan(), label, status);
            }
        }
    }

    if !outcome.anomalies.is_empty() {
        println!();
        for anomaly in &outcome.anomalies {
            eprintln!("{} {}", "⚠".yellow(), anomaly);
        }
    }

    let counts = outcome.counts();
    println!();
    println!("{}", "Summary:".bold());
    println!("  {} changed", format!("{}", counts.changed).green());
    println!(
        "  {} already satisfied",
        format!("{}", counts.unchanged).yellow()
    );
    println!("  {} skipped", format!("{}", counts.skipped).cyan());
    println!("  {} failed", format!("{}", counts.failed).red());
}

fn cmd_apply(
    project: Option<PathBuf>,
    plan_name: &str,
    dry_run: bool,
    show_diff: bool,
    json: bool,
) -> Result<()> {
    let project = resolve_project(project)?;
    let plan = load_plan(plan_name)?;

    let options = ApplyOptions {
        dry_run,
        ..ApplyOptions::default()
    };
    let report = apply_plan(&project, &plan, &options)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report.outcome)?);
    } else {
        print_header(&project, &plan);
        if dry_run {
            println!("{}", "  [DRY RUN - nothing will be written]".cyan());
        }
        print_outcome(&report.outcome, dry_run);
        print_write_back(&report, dry_run);
    }

    if show_diff && report.original != report.patched {
        display_diff(&project, &report.original, &report.patched);
    }

    if report.outcome.has_failures() {
        std::process::exit(1);
    }

    Ok(())
}

fn print_header(project: &Path, plan: &PatchPlan) {
    println!("Project: {}", project.display());
    println!("Plan: {}", plan.meta.name);
    if let Some(description) = &plan.meta.description {
        println!("{}", description.dimmed());
    }
    println!();
}

fn print_write_back(report: &ApplyReport, dry_run: bool) {
    println!();
    match &report.backup {
        Some(handle) => {
            println!("{} Created backup: {}", "💾".normal(), handle.backup.display());
            println!("{}", "✓ Project updated".green());
        }
        None if report.outcome.any_changed && dry_run => {
            println!("{}", "Changes pending (dry run)".cyan());
        }
        None => println!("{}", "No changes needed - project already configured".dimmed()),
    }
}

fn cmd_status(project: Option<PathBuf>, plan_name: &str) -> Result<()> {
    let project = resolve_project(project)?;
    let plan = load_plan(plan_name)?;

    let options = ApplyOptions {
        dry_run: true,
        ..ApplyOptions::default()
    };
    let report = apply_plan(&project, &plan, &options)?;

    println!("{}", "Patch Status Report".bold());
    print_header(&project, &plan);
    print_outcome(&report.outcome, true);

    if report.outcome.any_changed || report.outcome.has_failures() {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_restore(project: Option<PathBuf>, plan_name: &str) -> Result<()> {
    let project = resolve_project(project)?;
    let plan = load_plan(plan_name)?;

    let handle = BackupHandle::existing(&project, plan.backup_suffix());
    restore(&handle)?;

    println!(
        "{} Restored {} from {}",
        "✓".green(),
        project.display(),
        handle.backup.display()
    );
    Ok(())
}

fn cmd_list(plans_dir: Option<PathBuf>) -> Result<()> {
    println!("{}", "Built-in plans:".bold());
    for name in builtin_names() {
        let description = builtin(name)
            .and_then(|plan| plan.ok())
            .and_then(|plan| plan.meta.description)
            .unwrap_or_default();
        println!("  {} {}", name.green(), description.dimmed());
    }

    let Some(dir) = plans_dir else {
        return Ok(());
    };

    let mut files = Vec::new();
    for entry in WalkDir::new(&dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        if entry.file_type().is_file()
            && entry.path().extension().and_then(|s| s.to_str()) == Some("toml")
        {
            files.push(entry.into_path());
        }
    }
    files.sort();

    println!();
    println!("{}", format!("Plans in {}:", dir.display()).bold());
    if files.is_empty() {
        println!("{}", "  No .toml plan files found".yellow());
    }
    for file in files {
        match load_from_path(&file) {
            Ok(plan) => println!(
                "  {} ({} operations) {}",
                file.display(),
                plan.operations.len(),
                plan.meta.description.unwrap_or_default().dimmed()
            ),
            Err(err) => eprintln!("  {} {}: {}", "✗".red(), file.display(), err),
        }
    }

    Ok(())
}
