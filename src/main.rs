use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

use notice_scout::browser::launcher::{default_profile_dir, BrowserHandle, LaunchOptions};
use notice_scout::browser::BrowserSession;
use notice_scout::core::config::load_portal_config;
use notice_scout::portal::health::check_health;
use notice_scout::portal::poll::wait_for;
use notice_scout::portal::DateRange;
use notice_scout::{
    collect_notifications, process_notifications, NotificationRecord, PortalConfig,
    ProcessingOutcome,
};

const USAGE: &str = "usage: notice-scout [--from DD/MM/YYYY] [--to DD/MM/YYYY] [--out DIR] [--headless] [--login-wait-secs N]";

#[derive(Debug, Default)]
struct CliArgs {
    from: Option<String>,
    to: Option<String>,
    out: Option<PathBuf>,
    headless: bool,
    login_wait_secs: Option<u64>,
}

fn parse_args() -> Result<CliArgs> {
    let mut cli = CliArgs::default();
    let mut args = std::env::args().skip(1);
    while let Some(a) = args.next() {
        let (flag, inline) = match a.split_once('=') {
            Some((f, v)) => (f.to_string(), Some(v.to_string())),
            None => (a.clone(), None),
        };
        let mut value = |name: &str| -> Result<String> {
            inline
                .clone()
                .or_else(|| args.next())
                .ok_or_else(|| anyhow!("{} needs a value\n{}", name, USAGE))
        };
        match flag.as_str() {
            "--from" => cli.from = Some(value("--from")?),
            "--to" => cli.to = Some(value("--to")?),
            "--out" => cli.out = Some(PathBuf::from(value("--out")?)),
            "--headless" => cli.headless = true,
            "--login-wait-secs" => {
                let v = value("--login-wait-secs")?;
                cli.login_wait_secs = Some(
                    v.trim()
                        .parse()
                        .with_context(|| format!("--login-wait-secs: not a number: {}", v))?,
                );
            }
            "-h" | "--help" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            other => return Err(anyhow!("unknown argument {}\n{}", other, USAGE)),
        }
    }
    Ok(cli)
}

fn resolve_range(cli: &CliArgs, cfg: &PortalConfig) -> Result<Option<DateRange>> {
    let fmt = &cfg.date_filter.format;
    let today = chrono::Local::now().date_naive();
    let parse = |s: &str| {
        chrono::NaiveDate::parse_from_str(s.trim(), fmt)
            .with_context(|| format!("date {:?} does not match {}", s, fmt))
    };
    let range = match (cli.from.as_deref(), cli.to.as_deref()) {
        (None, None) => return Ok(None),
        (Some(f), Some(t)) => DateRange::parse(f, t, fmt)
            .ok_or_else(|| anyhow!("invalid date range {} .. {}", f, t))?,
        (Some(f), None) => DateRange {
            from: parse(f)?,
            to: today,
        },
        (None, Some(t)) => {
            let to = parse(t)?;
            DateRange::default_range(to, cfg.date_filter.days_back)
        }
    };
    if range.from > range.to {
        return Err(anyhow!("--from is after --to"));
    }
    Ok(Some(range))
}

/// Wait until the operator has logged in and the inbox table is on screen.
async fn operator_gate(session: &dyn BrowserSession, cfg: &PortalConfig, wait: Duration) -> bool {
    info!(
        "🔐 log in through the browser window; waiting up to {}s for the inbox table",
        wait.as_secs()
    );
    wait_for(Duration::from_secs(2), wait, || async {
        let health = check_health(session, cfg).await;
        health.is_healthy()
    })
    .await
}

#[derive(Serialize)]
struct RunReport<'a> {
    run_id: &'a str,
    generated_at: String,
    records: Vec<NotificationRecord>,
    outcome: &'a ProcessingOutcome,
}

fn write_artefacts(
    dir: &Path,
    records: &[NotificationRecord],
    outcome: &ProcessingOutcome,
) -> Result<PathBuf> {
    let run_dir = dir.join(&outcome.run_id);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("creating {}", run_dir.display()))?;

    let mut written = 0usize;
    for (i, record) in records.iter().enumerate() {
        let (Some(b64), Some(name)) = (&record.attachment_pdf, &record.attachment_filename) else {
            continue;
        };
        let bytes = match STANDARD.decode(b64) {
            Ok(b) => b,
            Err(e) => {
                warn!("artefacts: record {} has an undecodable payload: {}", i, e);
                continue;
            }
        };
        let path = run_dir.join(format!("{:03}-{}", i + 1, name));
        std::fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))?;
        written += 1;
    }

    let report = RunReport {
        run_id: &outcome.run_id,
        generated_at: chrono::Local::now().to_rfc3339(),
        records: records
            .iter()
            .cloned()
            .map(|mut r| {
                r.attachment_pdf = None;
                r
            })
            .collect(),
        outcome,
    };
    let report_path = run_dir.join("report.json");
    std::fs::write(&report_path, serde_json::to_vec_pretty(&report)?)
        .with_context(|| format!("writing {}", report_path.display()))?;

    info!("📁 {} PDF(s) and report written to {}", written, run_dir.display());
    Ok(run_dir)
}

async fn run(session: &dyn BrowserSession, cfg: &PortalConfig, cli: &CliArgs) -> Result<()> {
    let range = resolve_range(cli, cfg)?;

    session
        .goto(&cfg.inbox_url)
        .await
        .map_err(|e| anyhow!("opening {}: {}", cfg.inbox_url, e))?;

    let wait = cli
        .login_wait_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_millis(cfg.timeouts.operator_login_ms));
    if !operator_gate(session, cfg, wait).await {
        return Err(anyhow!(
            "inbox table not reachable after {}s (not logged in?)",
            wait.as_secs()
        ));
    }

    let mut records = collect_notifications(session, cfg, range)
        .await
        .map_err(|e| anyhow!("collecting notifications: {}", e))?;
    if records.is_empty() {
        info!("nothing to process");
        return Ok(());
    }

    let outcome = process_notifications(session, cfg, &mut records).await;

    let out_dir = cli
        .out
        .clone()
        .or_else(|| cfg.resolve_output_dir())
        .ok_or_else(|| anyhow!("no output directory (set --out or NOTICE_SCOUT_OUTPUT_DIR)"))?;
    write_artefacts(&out_dir, &records, &outcome)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,chromiumoxide=warn"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = parse_args()?;
    let cfg = load_portal_config();
    if cfg.inbox_url.trim().is_empty() {
        return Err(anyhow!(
            "no inbox url: set inbox_url in notice-scout.json or NOTICE_SCOUT_INBOX_URL"
        ));
    }

    let handle = BrowserHandle::launch(&LaunchOptions {
        headless: cli.headless,
        profile_dir: default_profile_dir(),
        executable: None,
    })
    .await?;

    let result = run(handle.session(), &cfg, &cli).await;
    handle.shutdown().await;

    if let Err(e) = &result {
        error!("notice-scout: {:#}", e);
    }
    result
}
