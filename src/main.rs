use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use regex::Regex;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cite_tier::stats::ResourceMonitor;
use cite_tier::{produce, CancelToken, RecordStore, RevisitPolicy, SearchConfig};

#[derive(Parser, Debug)]
#[command(name = "cite-tier")]
#[command(about = "Find papers transitively citing keyword-matched papers, tier by tier", long_about = None)]
struct Cli {
    /// Line-delimited JSON dataset, one paper per line
    #[arg(short, long)]
    file: PathBuf,
    /// Title keyword (case-sensitive substring); prompted when omitted
    #[arg(short, long)]
    keyword: Option<String>,
    /// Maximum number of tiers; prompted when omitted
    #[arg(short, long)]
    tiers: Option<u32>,
    /// TOML config file (defaults to <config dir>/cite-tier/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    threads: Option<usize>,
    /// Index entries per concurrent batch
    #[arg(long)]
    batch_size: Option<usize>,
    /// Seconds between resource reports
    #[arg(long)]
    monitor_interval: Option<u64>,
    #[arg(long, value_enum)]
    revisit: Option<RevisitPolicy>,
}

impl Cli {
    fn apply_overrides(&self, cfg: &mut SearchConfig) {
        if let Some(t) = self.threads {
            cfg.threads = t;
        }
        if let Some(b) = self.batch_size {
            cfg.batch_size = b;
        }
        if let Some(m) = self.monitor_interval {
            cfg.monitor_interval_secs = m;
        }
        if let Some(r) = self.revisit {
            cfg.revisit = r;
        }
    }
}

fn prompt(question: &str) -> anyhow::Result<String> {
    let mut out = std::io::stdout().lock();
    writeln!(out, "{}", question)?;
    out.flush()?;

    let mut line = String::new();
    let n = std::io::stdin().lock().read_line(&mut line)?;
    if n == 0 {
        anyhow::bail!("stdin closed while waiting for input");
    }
    Ok(line.trim().to_string())
}

/// 只告警不拒绝：关键字期望至少 3 个非数字、非空白字符
fn check_keyword(keyword: &str) -> anyhow::Result<bool> {
    let pattern = Regex::new(r"^[^\d\s]{3,}$")?;
    let ok = pattern.is_match(keyword);
    if !ok {
        warn!(
            "Keyword {:?} is not 3+ non-digit, non-space characters; searching anyway",
            keyword
        );
    }
    Ok(ok)
}

fn parse_tier_count(token: &str) -> anyhow::Result<u32> {
    token
        .trim()
        .parse::<u32>()
        .with_context(|| format!("tier count must be a non-negative integer, got {:?}", token))
}

/// 拉取并打印每一层；返回实际产出的层数
fn run_search(
    store: &RecordStore,
    keyword: &str,
    max_tiers: u32,
    revisit: RevisitPolicy,
) -> anyhow::Result<u32> {
    let tiers = produce(store, keyword, max_tiers)?.revisit(revisit);
    let mut emitted = 0;
    for tier in tiers {
        let tier = tier.context("Error getting tier papers, terminating")?;
        let mut out = std::io::stdout().lock();
        writeln!(out, "{}", tier)?;
        out.flush()?;
        emitted += 1;
    }
    Ok(emitted)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = SearchConfig::load(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);

    let keyword = match cli.keyword.clone() {
        Some(k) => k,
        None => prompt("Enter search keyword (min 3 non-digit, non-space chars):")?,
    };
    check_keyword(&keyword)?;
    let max_tiers = match cli.tiers {
        Some(t) => t,
        None => parse_tier_count(&prompt("Enter an integer (tier):")?)?,
    };

    let cancel = CancelToken::new();
    let store = Arc::new(
        RecordStore::open_with(&cli.file, &config)
            .context("Error loading research papers")?
            .with_cancel(cancel.clone()),
    );

    let monitor = ResourceMonitor::start(
        store.progress(),
        Duration::from_secs(config.monitor_interval_secs.max(1)),
    );

    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling search after the current batch");
                cancel.cancel();
            }
        })
    };

    let search = {
        let store = store.clone();
        let revisit = config.revisit;
        tokio::task::spawn_blocking(move || run_search(&store, &keyword, max_tiers, revisit))
    };
    let result = search.await;

    // 搜索已完全结束后才停止监控
    interrupt.abort();
    monitor.stop().await;

    let emitted = result.context("search worker panicked")??;
    info!("Search finished: {} of {} requested tiers", emitted, max_tiers);
    Ok(())
}
