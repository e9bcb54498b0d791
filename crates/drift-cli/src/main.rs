//! Drift - conference website drift checker CLI
//!
//! The `drift` command runs the drift job on demand and exposes its
//! building blocks for inspecting pages by hand.
//!
//! ## Commands
//!
//! - `run`: fetch, diff, report and persist once, right now
//! - `events`: list the tracked events and whether they are active
//! - `extract`: print the visible text of an HTML file
//! - `diff`: diff the visible text of two HTML files
//! - `render`: render a saved report as the HTML email
//! - `next-run`: show when the daemon will run next

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use drift_core::config::{ENV_BUCKET, ENV_CATALOG, ENV_RECIPIENT};
use drift_core::{
    diff_pages, extract_text, next_run_after, normalize_whitespace, render, DriftConfig,
    EventCatalog, Report, SegmentTag,
};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "drift")]
#[command(author = "PL Conferences")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Detect content drift on tracked conference websites", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the drift job once
    Run {
        /// Render the report without sending it or updating snapshots
        #[arg(long)]
        dry_run: bool,

        /// Event catalog (JSON)
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Snapshot directory
        #[arg(long)]
        snapshot_dir: Option<PathBuf>,

        /// Operator address receiving the report
        #[arg(long)]
        to: Option<String>,

        /// Also write the rendered report to this file
        #[arg(long)]
        report_out: Option<PathBuf>,

        /// Save the report as JSON for `drift render`
        #[arg(long)]
        report_json: Option<PathBuf>,
    },

    /// List tracked events
    Events {
        /// Event catalog (JSON)
        #[arg(long, env = "DRIFT_CATALOG", default_value = "events.json")]
        catalog: PathBuf,

        /// Only show events that are still checked
        #[arg(long)]
        active: bool,
    },

    /// Print the visible text of an HTML file
    Extract {
        /// HTML file
        file: PathBuf,

        /// Collapse whitespace runs the way page diffs do
        #[arg(long)]
        normalize: bool,
    },

    /// Diff the visible text of two HTML files
    Diff {
        /// Previous version
        old: PathBuf,

        /// Current version
        new: PathBuf,

        /// Print the drift summary as JSON
        #[arg(long)]
        json_output: bool,
    },

    /// Render a saved report (JSON) as the HTML email
    Render {
        /// Report JSON written by `drift run --report-json`
        report: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the next scheduled run
    NextRun {
        /// Hour of day (UTC)
        #[arg(long, env = "DRIFT_SCHEDULE_HOUR", default_value_t = drift_core::schedule::DEFAULT_RUN_HOUR_UTC)]
        hour: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    drift_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run {
            dry_run,
            catalog,
            snapshot_dir,
            to,
            report_out,
            report_json,
        } => {
            let overrides = RunOverrides {
                catalog,
                snapshot_dir,
                to,
            };
            cmd_run(
                &overrides,
                dry_run,
                report_out.as_deref(),
                report_json.as_deref(),
            )
            .await
        }
        Commands::Events { catalog, active } => cmd_events(&catalog, active),
        Commands::Extract { file, normalize } => cmd_extract(&file, normalize),
        Commands::Diff {
            old,
            new,
            json_output,
        } => cmd_diff(&old, &new, json_output),
        Commands::Render { report, output } => cmd_render(&report, output.as_deref()),
        Commands::NextRun { hour } => cmd_next_run(hour),
    }
}

/// Command-line values that take precedence over the environment.
#[derive(Debug, Default)]
struct RunOverrides {
    catalog: Option<PathBuf>,
    snapshot_dir: Option<PathBuf>,
    to: Option<String>,
}

impl RunOverrides {
    fn load_config(&self) -> Result<DriftConfig> {
        let mut values = HashMap::new();
        if let Some(dir) = &self.snapshot_dir {
            values.insert(ENV_BUCKET, dir.display().to_string());
        }
        if let Some(catalog) = &self.catalog {
            values.insert(ENV_CATALOG, catalog.display().to_string());
        }
        if let Some(to) = &self.to {
            values.insert(ENV_RECIPIENT, to.clone());
        }
        DriftConfig::from_lookup(|key| {
            values
                .get(key)
                .cloned()
                .or_else(|| std::env::var(key).ok())
        })
        .context("Failed to load drift configuration")
    }
}

/// Run the job once and print what it did
async fn cmd_run(
    overrides: &RunOverrides,
    dry_run: bool,
    report_out: Option<&Path>,
    report_json: Option<&Path>,
) -> Result<()> {
    let config = overrides.load_config()?;
    let catalog = EventCatalog::load(&config.catalog_path).with_context(|| {
        format!(
            "Failed to load event catalog from {}",
            config.catalog_path.display()
        )
    })?;
    let job = config.build_job(dry_run)?;

    info!(catalog = %config.catalog_path.display(), events = catalog.len(), dry_run, "starting drift run");
    let outcome = job.run(&catalog, Utc::now()).await?;

    println!("Run:        {}", outcome.run_id);
    println!("Subject:    {}", outcome.subject);
    println!("Tracked:    {}", outcome.tracked);
    println!("Active:     {}", outcome.active);
    println!("Changed:    {}", outcome.events_changed);
    println!("Failed:     {} page fetch(es)", outcome.fetch_failures);
    println!(
        "Snapshots:  {} written, {} failed",
        outcome.snapshots_written, outcome.snapshot_write_failures
    );
    println!(
        "Notified:   {}",
        if dry_run {
            "no (dry run)"
        } else if outcome.notified {
            "yes"
        } else {
            "NO - report delivery failed"
        }
    );

    for event in outcome.report.changed_events() {
        let roles: Vec<&str> = event.changed_roles().iter().map(|r| r.label()).collect();
        println!("  ~ {} ({})", event.abbreviation, roles.join(", "));
    }

    if let Some(path) = report_out {
        let rendered = render(&outcome.report);
        std::fs::write(path, rendered.body_html)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        println!("Report written to {}", path.display());
    }

    if let Some(path) = report_json {
        let json = serde_json::to_string_pretty(&outcome.report)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report JSON to {}", path.display()))?;
    }

    Ok(())
}

/// List tracked events
fn cmd_events(catalog: &Path, active_only: bool) -> Result<()> {
    let catalog = EventCatalog::load(catalog)
        .with_context(|| format!("Failed to load event catalog from {}", catalog.display()))?;
    let today = Utc::now().date_naive();

    let mut shown = 0;
    for event in catalog.events() {
        let active = event.is_active(today);
        if active_only && !active {
            continue;
        }
        shown += 1;
        println!(
            "{:<12} {:<8} {}",
            event.abbreviation,
            if active { "active" } else { "ended" },
            event.display_name()
        );
        if let Some(url) = &event.url {
            println!("{:<21} main:  {}", "", url);
        }
        if let Some(url) = &event.important_date_url {
            println!("{:<21} dates: {}", "", url);
        }
    }

    if shown == 0 {
        println!("No events found");
    }
    Ok(())
}

fn read_html(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Print the visible text of an HTML file
fn cmd_extract(file: &Path, normalize: bool) -> Result<()> {
    let text = extract_text(&read_html(file)?);
    if normalize {
        println!("{}", normalize_whitespace(&text));
    } else {
        println!("{text}");
    }
    Ok(())
}

/// Diff two HTML files
fn cmd_diff(old: &Path, new: &Path, json_output: bool) -> Result<()> {
    let summary = diff_pages(&read_html(old)?, &read_html(new)?);

    if json_output {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    if !summary.has_changes {
        println!("No changes");
        return Ok(());
    }

    for segment in summary.changes() {
        let marker = match segment.tag {
            SegmentTag::Added => '+',
            SegmentTag::Removed => '-',
            SegmentTag::Unchanged => continue,
        };
        println!("{marker} {}", segment.text);
    }
    println!();
    println!(
        "+{} characters added, -{} characters removed",
        summary.added_count, summary.removed_count
    );
    Ok(())
}

/// Render a saved report
fn cmd_render(report: &Path, output: Option<&Path>) -> Result<()> {
    let text = std::fs::read_to_string(report)
        .with_context(|| format!("Failed to read report {}", report.display()))?;
    let report: Report = serde_json::from_str(&text)
        .with_context(|| format!("Invalid report JSON in {}", report.display()))?;
    let rendered = render(&report);

    match output {
        Some(path) => {
            std::fs::write(path, &rendered.body_html)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("{}", rendered.subject);
        }
        None => println!("{}", rendered.body_html),
    }
    Ok(())
}

/// Show the next scheduled run
fn cmd_next_run(hour: u32) -> Result<()> {
    let now = Utc::now();
    let next = next_run_after(now, hour)?;
    let wait = next - now;
    println!(
        "Next run: {} (in {}h {:02}m)",
        next.format("%Y-%m-%d %H:%M UTC"),
        wait.num_hours(),
        wait.num_minutes() % 60
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use drift_core::{diff, EventDrift};

    #[test]
    fn cli_parses_run_flags() {
        let cli = Cli::try_parse_from([
            "drift",
            "--json",
            "run",
            "--dry-run",
            "--snapshot-dir",
            "/tmp/snapshots",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Run {
                dry_run,
                snapshot_dir,
                ..
            } => {
                assert!(dry_run);
                assert_eq!(snapshot_dir, Some(PathBuf::from("/tmp/snapshots")));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn overrides_win_over_environment() {
        let overrides = RunOverrides {
            catalog: Some(PathBuf::from("catalog.json")),
            snapshot_dir: Some(PathBuf::from("/srv/drift")),
            to: Some("ops@example.org".to_string()),
        };
        let config = overrides.load_config().unwrap();
        assert_eq!(config.snapshot_root, PathBuf::from("/srv/drift"));
        assert_eq!(config.catalog_path, PathBuf::from("catalog.json"));
        assert_eq!(config.recipient.as_deref(), Some("ops@example.org"));
    }

    #[test]
    fn read_html_tolerates_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.html");
        std::fs::write(&path, b"<p>caf\xe9</p>").unwrap();
        assert_eq!(read_html(&path).unwrap(), "<p>caf\u{fffd}</p>");
    }

    #[test]
    fn diff_and_extract_commands_run_on_files() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("old.html");
        let new = dir.path().join("new.html");
        std::fs::write(&old, "<p>Deadline: Jan 1</p>").unwrap();
        std::fs::write(&new, "<p>Deadline: Feb 1</p>").unwrap();

        cmd_extract(&old, true).unwrap();
        cmd_diff(&old, &new, false).unwrap();
        cmd_diff(&old, &new, true).unwrap();
        assert!(cmd_diff(&dir.path().join("missing.html"), &new, false).is_err());
    }

    #[test]
    fn render_reads_saved_report() {
        let dir = tempfile::tempdir().unwrap();
        let mut report = Report::new(Utc::now());
        report.events.push(EventDrift {
            abbreviation: "pldi".to_string(),
            name: "PLDI 2027".to_string(),
            main_url: Some("https://pldi.test/".to_string()),
            important_dates_url: None,
            main: Some(diff("Deadline: Jan 1", "Deadline: Feb 1")),
            important_dates: None,
        });
        let json = dir.path().join("report.json");
        let html = dir.path().join("report.html");
        std::fs::write(&json, serde_json::to_string(&report).unwrap()).unwrap();

        cmd_render(&json, Some(&html)).unwrap();
        let body = std::fs::read_to_string(&html).unwrap();
        assert_eq!(body, render(&report).body_html);
        assert!(body.contains("PLDI (main page)"));
    }
}
