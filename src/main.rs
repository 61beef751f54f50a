#![warn(clippy::unwrap_used)]
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use env_logger::{Env, TimestampPrecision};
use rust_sqlite_runner::demo::{self, ConsoleSink, Scenario, Style};
use rust_sqlite_runner::SqliteConfig;

#[derive(Parser, Debug)]
#[clap(name = "sqlite-runner", about = "Runs the books statements under each calling convention")]
pub struct Opt {
    // database file, or :memory: for a transient store
    #[clap(long = "db", env = "SQLITE_RUNNER_DB", default_value = ":memory:")]
    pub db: String,

    // calling convention to run; all of them when omitted
    #[clap(long = "style", value_enum)]
    pub style: Option<Style>,

    // scenario to run; both when omitted
    #[clap(long = "scenario", value_enum)]
    pub scenario: Option<Scenario>,

    #[clap(long = "busy-timeout-ms", default_value = "5000")]
    pub busy_timeout_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opt = Opt::parse();

    env_logger::Builder::from_env(Env::default().default_filter_or("warn"))
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    let config = SqliteConfig::new(opt.db).with_busy_timeout(Duration::from_millis(opt.busy_timeout_ms));
    let styles = match opt.style {
        Some(style) => vec![style],
        None => vec![Style::Blocking, Style::Callback, Style::Async],
    };
    let scenarios = match opt.scenario {
        Some(scenario) => vec![scenario],
        None => vec![Scenario::Success, Scenario::Failure],
    };

    for style in &styles {
        for scenario in &scenarios {
            let label = format!("{style}/{scenario}");
            let statements = demo::books_script(*scenario);
            let (result, _sink) = demo::run_style(*style, &config, statements, ConsoleSink::new(label.clone())).await;
            let summary = result.with_context(|| format!("{label} run failed"))?;
            log::info!("{label}: {} statements, {} failed", summary.statements, summary.failed);
        }
    }
    Ok(())
}
