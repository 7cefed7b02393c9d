//! Terminal shell for the dashboard: chat with the assistant, tail alerts,
//! or print a one-shot summary.

use std::io::Write as _;
use std::path::PathBuf;

use bizpulse_realtime::api::{MetricsSummary, PolicyRecommendation, Review, ReviewSummary};
use bizpulse_realtime::prelude::*;
use bizpulse_realtime::{LogSettings, extract_keywords};
use clap::{Parser, Subcommand};
use tokio::io::AsyncBufReadExt as _;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "bizpulse", about = "BizPulse dashboard in the terminal", version)]
struct Cli {
    /// Dashboard API base URL (overrides BIZPULSE_API_URL).
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Chat socket base URL (overrides BIZPULSE_WS_URL).
    #[arg(long, global = true)]
    ws_url: Option<String>,

    /// Business to scope requests to (overrides BIZPULSE_BUSINESS_ID).
    #[arg(long, global = true)]
    business_id: Option<String>,

    /// Log filter such as `debug` or `bizpulse_realtime=trace`
    /// (overrides BIZPULSE_LOG_LEVEL).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Write JSON-lines logs to this file instead of stderr.
    #[arg(long, global = true, value_name = "PATH")]
    log_json: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ask the assistant questions; one line per query, `/quit` to leave.
    Chat {
        /// How streamed frames are folded: `append` or `replace`.
        #[arg(long)]
        policy: Option<String>,
    },
    /// Print alerts as they arrive.
    Alerts {
        /// Keep at most this many alerts in memory.
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print sales, review and policy summaries.
    Dashboard {
        /// Number of keywords shown per sentiment.
        #[arg(long, default_value_t = 6)]
        keywords: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    bizpulse_realtime::init_with(
        LogSettings::from_env()
            .level(cli.log_level.as_deref())
            .json_path(cli.log_json.clone()),
    );
    let config = resolve_config(&cli)?;
    info!(api_url = %config.api_url, ws_url = %config.ws_url, "configuration loaded");

    match cli.command {
        Command::Chat { policy } => {
            let config = match policy {
                Some(raw) => config.policy(raw.parse()?),
                None => config,
            };
            run_chat(config).await?;
        }
        Command::Alerts { limit } => run_alerts(config.alert_limit(limit)).await?,
        Command::Dashboard { keywords } => run_dashboard(config, keywords).await?,
    }
    Ok(())
}

fn resolve_config(cli: &Cli) -> Result<ClientConfig, ClientError> {
    let mut config = ClientConfig::from_env()?;
    if let Some(api_url) = &cli.api_url {
        let ws_url = config.ws_url.clone();
        config = ClientConfig::new(api_url.as_str())
            .policy(config.policy)
            .request_timeout(config.request_timeout)
            .alert_limit(config.alert_limit)
            .business_id(config.business_id.take());
        // Keep an explicit socket URL from the environment.
        if std::env::var_os("BIZPULSE_WS_URL").is_some() {
            config = config.ws_url(ws_url);
        }
    }
    if let Some(ws_url) = &cli.ws_url {
        config = config.ws_url(ws_url.as_str());
    }
    if let Some(business_id) = &cli.business_id {
        config = config.business_id(Some(business_id.as_str()));
    }
    config.validate()?;
    Ok(config)
}

async fn run_chat(config: ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut chat = ChatSession::from_config(&config)?;
    let url = config.chat_url();
    chat.open(Some(url.clone())).await;
    println!("connected to {url} (policy: {:?}); type /quit to leave", config.policy);

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line == "/quit" {
                    break;
                }
                if line.is_empty() {
                    continue;
                }
                if !chat.submit(line)? {
                    warn!(status = ?chat.status(), "chat socket not open; query not sent");
                    println!("(not connected: {:?})", chat.status());
                }
            }
            update = chat.next_update() => {
                let Some(update) = update else {
                    println!("connection closed");
                    break;
                };
                print_update(&chat, &update)?;
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    chat.close().await;
    Ok(())
}

fn print_update<C: bizpulse_realtime::TransportConnector>(
    chat: &ChatSession<C>,
    update: &ChatUpdate,
) -> std::io::Result<()> {
    let mut out = std::io::stdout().lock();
    match &update.frame {
        Frame::Chunk { content } if update.outcome != FoldOutcome::Ignored => {
            write!(out, "{content}")?;
            out.flush()
        }
        Frame::Final(_) | Frame::Error { .. } => {
            let Some(message) = chat.last_message().filter(|m| m.is_bot()) else {
                return Ok(());
            };
            writeln!(out, "\nbot> {}", message.text)?;
            let labels = message.source_labels();
            if !labels.is_empty() {
                writeln!(out, "     sources: {}", labels.join(", "))?;
            }
            for (name, value) in &message.calculations {
                match value {
                    Some(value) => writeln!(out, "     {name} = {value}")?,
                    None => writeln!(out, "     {name} = n/a")?,
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

async fn run_alerts(config: ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut alerts = AlertStream::from_config(&config)?;
    let url = config.alerts_url();
    alerts.open(Some(url.clone())).await;
    println!("listening for alerts on {url}");

    loop {
        tokio::select! {
            alert = alerts.next_alert() => {
                let Some(alert) = alert else {
                    println!("alert stream ended");
                    break;
                };
                match alert.id() {
                    Some(id) => println!("[{id}] {}", alert.message),
                    None => println!("{}", alert.message),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    alerts.close().await;
    Ok(())
}

async fn run_dashboard(config: ClientConfig, top: usize) -> Result<(), Box<dyn std::error::Error>> {
    let Some(business_id) = config.business_id.clone() else {
        return Err(ClientError::Config(
            "dashboard needs a business id (--business-id or BIZPULSE_BUSINESS_ID)".into(),
        )
        .into());
    };
    let api = ApiClient::new(config)?;

    let mut metrics: Snapshot<MetricsSummary> = Snapshot::new();
    let mut reviews: Snapshot<ReviewSummary> = Snapshot::new();
    let mut all_reviews: Snapshot<Vec<Review>> = Snapshot::new();
    let mut policies: Snapshot<Vec<PolicyRecommendation>> = Snapshot::new();
    metrics
        .refresh("metrics summary", api.metrics_summary(&business_id))
        .await;
    reviews
        .refresh("review summary", api.review_summary(&business_id))
        .await;
    all_reviews
        .refresh("reviews", api.all_reviews(&business_id, 100))
        .await;
    policies
        .refresh("policy recommendations", api.policy_recommendations(&business_id))
        .await;

    let m = metrics.get();
    println!("== {business_id} ==");
    println!(
        "sales   gross {:.0}  net {:.0}  cost {:.0}  profit {:.0}",
        m.gross_sales, m.net_sales, m.cost_of_goods, m.profit
    );
    if m.settlement_delay > 0 {
        println!("        {} delayed settlement(s)", m.settlement_delay);
    }
    if !m.data_delay_notice.is_empty() {
        println!("        {}", m.data_delay_notice);
    }

    let r = reviews.get();
    println!(
        "reviews {} total, avg {:.1} (+{} / ={} / -{})",
        r.review_count, r.average_rating, r.positive_count, r.neutral_count, r.negative_count
    );
    let keywords = extract_keywords(all_reviews.get(), top);
    if keywords.is_empty() {
        println!("        no keywords yet");
    } else {
        println!("        positive: {}", keywords.positive.join(", "));
        println!("        negative: {}", keywords.negative.join(", "));
    }

    println!("policy");
    for rec in policies.get() {
        println!("        [{}] {} ({})", rec.priority, rec.name, rec.group_name);
    }
    if policies.get().is_empty() {
        println!("        no recommendations");
    }

    for (what, err) in [
        ("metrics", metrics.last_error()),
        ("reviews", reviews.last_error()),
        ("reviews", all_reviews.last_error()),
        ("policy", policies.last_error()),
    ] {
        if let Some(err) = err {
            println!("(stale {what}: {err})");
        }
    }
    Ok(())
}
