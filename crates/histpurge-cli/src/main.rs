//! histpurge - purge build history from a job store
//!
//! ```text
//! histpurge folder/job            delete unprotected runs of one job
//! histpurge -f -r folder/job      delete every finished run, restart numbering at #1
//! histpurge -R folder             descend into a folder or multi-branch project
//! histpurge --all -r              purge every top-level item
//! ```
//!
//! The report goes to stdout, logs to stderr.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use histpurge_core::{AccessPolicy, HierarchyWalker, ItemPath, PurgeOptions, PurgeReport};
use histpurge_state::{FsJobStore, StoreConfig};
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(name = "histpurge")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Purge build history from jobs, folders and multi-branch projects", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Item to purge, as a slash-separated path (e.g. `team/app/main`)
    #[arg(required_unless_present = "all", conflicts_with = "all")]
    item: Option<String>,

    /// Purge every top-level item (implies --recurse)
    #[arg(long)]
    all: bool,

    /// Reset the next build number to 1 when no runs remain
    #[arg(short = 'r', long = "reset-next-build")]
    reset: bool,

    /// Also delete runs marked keep-forever
    #[arg(short, long)]
    force: bool,

    /// Descend into folders and multi-branch projects
    #[arg(short = 'R', long)]
    recurse: bool,

    /// Store home directory (contains `jobs/`)
    #[arg(long, env = "HISTPURGE_HOME")]
    home: PathBuf,

    /// Access-control policy file (JSON). Everything is allowed without one.
    #[arg(long, env = "HISTPURGE_ACL")]
    acl: Option<PathBuf>,

    /// Report format written to stdout
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    report: ReportFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Text,
    Json,
}

impl Cli {
    fn options(&self) -> PurgeOptions {
        PurgeOptions::new()
            .with_reset(self.reset)
            .with_force(self.force)
            .with_recurse(self.recurse)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    histpurge_core::init_tracing(cli.json, level);

    let report = cmd_purge(&cli).await?;
    print!("{}", render(&report, cli.report)?);
    Ok(())
}

/// Open the store and policy, then run the purge. Any error here is a
/// resolution or configuration failure; skips and per-node failures end up
/// in the report instead.
async fn cmd_purge(cli: &Cli) -> Result<PurgeReport> {
    let store = FsJobStore::open(&StoreConfig::new(&cli.home))
        .await
        .with_context(|| format!("Failed to open job store at {}", cli.home.display()))?;
    let policy = load_policy(cli.acl.as_deref())?;
    let walker = HierarchyWalker::new(&store, &policy, cli.options());

    let report = if cli.all {
        walker.purge_all().await.context("Failed to list top-level items")?
    } else {
        let Some(item) = cli.item.as_deref() else {
            bail!("no item given");
        };
        let path: ItemPath = item
            .parse()
            .with_context(|| format!("Invalid item path: {item}"))?;
        walker
            .purge(&path)
            .await
            .with_context(|| format!("Cannot purge {path}"))?
    };

    info!(
        event = "cli.completed",
        purge_id = %report.purge_id,
        failures = report.failures.len(),
    );
    Ok(report)
}

fn load_policy(path: Option<&Path>) -> Result<AccessPolicy> {
    match path {
        Some(path) => AccessPolicy::load(path)
            .with_context(|| format!("Failed to load access policy {}", path.display())),
        None => Ok(AccessPolicy::allow_all()),
    }
}

fn render(report: &PurgeReport, format: ReportFormat) -> Result<String> {
    Ok(match format {
        ReportFormat::Text => report.render_text(),
        ReportFormat::Json => {
            let mut json = serde_json::to_string_pretty(report)?;
            json.push('\n');
            json
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use histpurge_core::{JobStore, Run};

    async fn seeded_home() -> (tempfile::TempDir, FsJobStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsJobStore::init(&StoreConfig::new(dir.path())).await.unwrap();
        let folder: ItemPath = "team".parse().unwrap();
        let job: ItemPath = "team/app".parse().unwrap();
        store.create_item(&folder, "folder").await.unwrap();
        store.create_item(&job, "job").await.unwrap();
        store.record_build(&job, &Run::new(1)).await.unwrap();
        store
            .record_build(&job, &Run::new(2).protected(true))
            .await
            .unwrap();
        (dir, store)
    }

    fn parse(home: &Path, args: &[&str]) -> Cli {
        let home = home.to_str().unwrap();
        let mut argv = vec!["histpurge", "--home", home];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn flags_map_to_options() {
        let cli = Cli::try_parse_from(["histpurge", "--home", "/tmp", "-r", "-f", "-R", "a/b"]).unwrap();
        let opts = cli.options();
        assert!(opts.reset_next_build_number && opts.force && opts.recurse);
        assert_eq!(cli.item.as_deref(), Some("a/b"));
        assert_eq!(cli.report, ReportFormat::Text);
    }

    #[test]
    fn item_or_all_is_required() {
        assert!(Cli::try_parse_from(["histpurge", "--home", "/tmp"]).is_err());
        assert!(Cli::try_parse_from(["histpurge", "--home", "/tmp", "--all", "x"]).is_err());
        assert!(Cli::try_parse_from(["histpurge", "--home", "/tmp", "--all"]).is_ok());
    }

    #[tokio::test]
    async fn purges_job_and_keeps_protected_run() {
        let (dir, store) = seeded_home().await;
        let cli = parse(dir.path(), &["-r", "team/app"]);

        let report = cmd_purge(&cli).await.unwrap();

        let job: ItemPath = "team/app".parse().unwrap();
        assert_eq!(report.totals().deleted, 1);
        assert_eq!(report.totals().skipped_protected, 1);
        assert_eq!(store.list_runs(&job).await.unwrap().len(), 1);
        assert_eq!(store.next_build_number(&job).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn folder_needs_recurse_but_still_completes() {
        let (dir, _store) = seeded_home().await;
        let cli = parse(dir.path(), &["team"]);
        let report = cmd_purge(&cli).await.unwrap();
        assert_eq!(report.unrecursed_count(), 1);
        assert!(report.jobs.is_empty());
    }

    #[tokio::test]
    async fn all_with_force_and_reset_clears_everything() {
        let (dir, store) = seeded_home().await;
        let cli = parse(dir.path(), &["--all", "-f", "-r"]);
        let report = cmd_purge(&cli).await.unwrap();

        let job: ItemPath = "team/app".parse().unwrap();
        assert!(store.list_runs(&job).await.unwrap().is_empty());
        assert_eq!(store.next_build_number(&job).await.unwrap(), 1);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn missing_item_is_an_error() {
        let (dir, _store) = seeded_home().await;
        let cli = parse(dir.path(), &["team/ghost"]);
        let err = cmd_purge(&cli).await.unwrap_err();
        assert!(format!("{err:#}").contains("team/ghost"));
    }

    #[tokio::test]
    async fn denied_item_is_an_error_and_untouched() {
        let (dir, store) = seeded_home().await;
        let acl = dir.path().join("acl.json");
        std::fs::write(
            &acl,
            r#"{"default": "allow", "rules": [{"effect": "deny", "prefix": "team"}]}"#,
        )
        .unwrap();
        let cli = parse(dir.path(), &["--acl", acl.to_str().unwrap(), "team/app"]);

        assert!(cmd_purge(&cli).await.is_err());
        let job: ItemPath = "team/app".parse().unwrap();
        assert_eq!(store.list_runs(&job).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn malformed_policy_is_an_error() {
        let (dir, _store) = seeded_home().await;
        let acl = dir.path().join("acl.json");
        std::fs::write(&acl, "not json").unwrap();
        let cli = parse(dir.path(), &["--acl", acl.to_str().unwrap(), "team/app"]);
        let err = cmd_purge(&cli).await.unwrap_err();
        assert!(format!("{err:#}").contains("access policy"));
    }

    #[tokio::test]
    async fn missing_home_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cli = parse(&dir.path().join("nowhere"), &["a"]);
        assert!(cmd_purge(&cli).await.is_err());
    }

    #[test]
    fn json_report_is_parseable() {
        let report = PurgeReport::new(PurgeOptions::new());
        let out = render(&report, ReportFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert!(value.get("purge_id").is_some());
    }
}
