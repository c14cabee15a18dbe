//! tailgate CLI - submit recommendations and watch the backend log
//!
//! Usage:
//!   tailgate [watch] [--gateway <url>] [--config <path>]
//!   tailgate recommend <MOOD> <ACTIVITY> [--location <text>] [--tags <text>]
//!   tailgate logs [--limit <N>]
//!   tailgate clear

use anyhow::{Context, Result};
use colored::{ColoredString, Colorize};
use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use tailgate::agent::RecommendResponse;
use tailgate::client::{
    ClientError, DisplayEntry, DisplayLevel, Frame, GatewayClient, LogTailClient, PanelState,
    RecommendForm, RenderedLog, ViewState,
};
use tailgate::{LogLevel, LogSource, TailgateConfig};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const DEFAULT_CONFIG: &str = "tailgate.toml";

fn print_usage() {
    eprintln!(
        r#"
{} - Music recommendations with a live backend log

{}
    tailgate [COMMAND] [OPTIONS]

{}
    watch                          Interactive log panel (default)
    recommend <MOOD> <ACTIVITY>    Submit one recommendation request
    logs                           Print the current log tail once
    clear                          Clear the backend log
    health                         Show gateway health

{}
    -g, --gateway <URL>     Gateway URL (default: http://localhost:3000)
    -c, --config <PATH>     Config file (default: tailgate.toml)
    -n, --limit <N>         Entries to fetch (default: 100)
    --location <TEXT>       Location for `recommend`
    --tags <TEXT>           Comma or space separated tags for `recommend`
    -h, --help              Print this help message

{}
    tailgate
    tailgate recommend happy dancing --tags "funk, pop"
    tailgate logs -n 20
"#,
        "tailgate".bold(),
        "USAGE:".bold(),
        "COMMANDS:".bold(),
        "OPTIONS:".bold(),
        "EXAMPLES:".bold(),
    );
}

enum Command {
    Watch,
    Recommend(RecommendForm),
    Logs,
    Clear,
    Health,
}

struct CliArgs {
    command: Command,
    config_path: String,
    gateway_url: Option<String>,
    limit: Option<usize>,
}

fn parse_args() -> Result<CliArgs> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        std::process::exit(0);
    }

    let mut positional = Vec::new();
    let mut config_path = DEFAULT_CONFIG.to_string();
    let mut gateway_url = None;
    let mut limit = None;
    let mut location = String::new();
    let mut tags = String::new();

    let mut i = 0;
    while i < args.len() {
        let value = || {
            args.get(i + 1)
                .cloned()
                .with_context(|| format!("{} needs a value", args[i]))
        };
        match args[i].as_str() {
            "--gateway" | "-g" => {
                gateway_url = Some(value()?);
                i += 1;
            }
            "--config" | "-c" => {
                config_path = value()?;
                i += 1;
            }
            "--limit" | "-n" => {
                let raw = value()?;
                limit = Some(
                    raw.parse()
                        .with_context(|| format!("Invalid limit: {}", raw))?,
                );
                i += 1;
            }
            "--location" => {
                location = value()?;
                i += 1;
            }
            "--tags" => {
                tags = value()?;
                i += 1;
            }
            other => positional.push(other.to_string()),
        }
        i += 1;
    }

    let command = match positional.first().map(String::as_str) {
        None | Some("watch") => Command::Watch,
        Some("recommend") => {
            let mut form = RecommendForm::new(
                positional.get(1).cloned().unwrap_or_default(),
                positional.get(2).cloned().unwrap_or_default(),
            );
            form.location = location;
            form.tags = tags;
            Command::Recommend(form)
        }
        Some("logs") => Command::Logs,
        Some("clear") => Command::Clear,
        Some("health") => Command::Health,
        Some(other) => {
            print_usage();
            anyhow::bail!("Unknown command: {}", other);
        }
    };

    Ok(CliArgs {
        command,
        config_path,
        gateway_url,
        limit,
    })
}

fn level_label(level: &DisplayLevel) -> ColoredString {
    let label = format!("{:<7}", level.label());
    match level {
        DisplayLevel::Known(LogLevel::Error) => label.red().bold(),
        DisplayLevel::Known(LogLevel::Warn) => label.yellow(),
        DisplayLevel::Known(LogLevel::Success) => label.green(),
        DisplayLevel::Known(LogLevel::Debug) => label.dimmed(),
        DisplayLevel::Known(LogLevel::Info) => label.cyan(),
        DisplayLevel::Other(_) => label.normal(),
    }
}

fn print_entry(entry: &DisplayEntry) {
    println!(
        "{} {} {} {}",
        "│".blue(),
        entry.timestamp.dimmed(),
        level_label(&entry.level),
        entry.message
    );
    if let Some(data) = &entry.data {
        println!("{}   {}", "│".blue(), data.dimmed());
    }
}

fn draw(frame: &Frame) {
    if !frame.panel.is_visible() {
        println!("{}", "Log panel hidden. Type 'open' to show it.".dimmed());
        return;
    }

    println!();
    println!(
        "{}",
        "╭─ Backend log ─────────────────────────────────────────────────".blue()
    );
    let range = frame.view.visible_range(frame.log.len());
    if frame.log.is_empty() {
        println!("{} {}", "│".blue(), "No logs yet".dimmed());
    }
    for entry in &frame.log.entries[range.clone()] {
        print_entry(entry);
    }

    let mode = match frame.panel {
        PanelState::VisiblePolling => "live".green(),
        PanelState::VisiblePaused => "paused".yellow(),
        PanelState::Hidden => "hidden".dimmed(),
    };
    let follow = if frame.view.auto_scroll_enabled {
        "auto-scroll on".normal()
    } else {
        "auto-scroll off".dimmed()
    };
    let position = if frame.view.is_at_bottom {
        "at bottom".normal()
    } else {
        "scrolled up".yellow()
    };
    println!(
        "{} {} | {} | {} | {}",
        "╰─".blue(),
        mode,
        follow,
        position,
        format!(
            "{}-{} of {}",
            range.start + usize::from(!range.is_empty()),
            range.end,
            frame.log.len()
        )
        .dimmed()
    );
    let _ = std::io::stdout().flush();
}

fn print_recommendations(response: &RecommendResponse) {
    println!();
    println!("{}", "Recommendations".bold());
    for (i, rec) in response.recommendations.iter().enumerate() {
        println!(
            "  {}. {} by {} {}",
            i + 1,
            rec.song.bold(),
            rec.artist,
            format!("({})", rec.genre).dimmed()
        );
        println!("     {}", rec.reason.dimmed());
    }
    println!("  {}", response.reasoning.italic());
}

fn print_error(err: &ClientError) {
    match err {
        ClientError::Validation(e) => eprintln!("{} {}", "Check the form:".yellow(), e),
        ClientError::Status { message, .. } => eprintln!("{} {}", "Error:".red().bold(), message),
        ClientError::Http(_) => eprintln!(
            "{} {}",
            "Error:".red().bold(),
            "Could not reach the gateway"
        ),
    }
}

fn print_shell_help() {
    eprintln!(
        "{}",
        "Commands: open | close | toggle | pause | resume | clear | auto | up [n] | down [n] | top | bottom\n          rec <mood> | <activity> [| <location> [| <tags>]] | help | quit"
            .dimmed()
    );
}

/// Parse `rec happy | dancing | Lisbon | funk, pop`
fn parse_shell_form(rest: &str) -> RecommendForm {
    let mut parts = rest.split('|').map(str::trim);
    let mut form = RecommendForm::new(
        parts.next().unwrap_or_default(),
        parts.next().unwrap_or_default(),
    );
    form.location = parts.next().unwrap_or_default().to_string();
    form.tags = parts.next().unwrap_or_default().to_string();
    form
}

/// Run a panel action that fetches without holding up the prompt
fn spawn_action<F, Fut>(tail: &Arc<LogTailClient>, action: F)
where
    F: FnOnce(Arc<LogTailClient>) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(action(Arc::clone(tail)));
}

async fn run_watch(client: Arc<GatewayClient>, config: &TailgateConfig) -> Result<()> {
    let line = config.client.line_height.max(1) as i64;
    let tail = Arc::new(LogTailClient::new(
        Arc::clone(&client) as Arc<dyn LogSource>,
        config.client.tail_options(),
        config.client.view_state(),
    ));

    let mut frames = tail.subscribe();
    let drawer = tokio::spawn(async move {
        let mut last: Option<(PanelState, RenderedLog, ViewState)> = None;
        while frames.changed().await.is_ok() {
            let frame = Arc::clone(&frames.borrow_and_update());
            let key = (frame.panel, frame.log.clone(), frame.view);
            // Polls that change nothing are not redrawn
            if last.as_ref() == Some(&key) {
                continue;
            }
            draw(&frame);
            last = Some(key);
        }
    });

    print_shell_help();
    spawn_action(&tail, |t| async move { t.show().await });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(input) = lines.next_line().await? {
        let input = input.trim();
        let (word, rest) = input.split_once(' ').unwrap_or((input, ""));
        let steps = rest.trim().parse::<i64>().unwrap_or(5);
        match word {
            "" => {}
            "open" | "o" => spawn_action(&tail, |t| async move { t.show().await }),
            "close" | "x" => tail.hide(),
            "toggle" | "t" => spawn_action(&tail, |t| async move { t.toggle().await }),
            "pause" | "p" => tail.pause(),
            "resume" | "r" => spawn_action(&tail, |t| async move { t.resume().await }),
            "clear" | "c" => spawn_action(&tail, |t| async move { t.clear().await }),
            "auto" | "a" => {
                tail.toggle_auto_scroll();
            }
            "up" | "k" => tail.scroll_by(steps.saturating_mul(line).saturating_neg()),
            "down" | "j" => tail.scroll_by(steps.saturating_mul(line)),
            "top" => tail.scroll_to(0),
            "bottom" => tail.scroll_to(u32::MAX),
            "rec" => match client.recommend(&parse_shell_form(rest)).await {
                Ok(response) => {
                    print_recommendations(&response);
                    spawn_action(&tail, |t| async move { t.refresh().await });
                }
                Err(e) => print_error(&e),
            },
            "help" | "?" => print_shell_help(),
            "quit" | "q" | "exit" => break,
            other => eprintln!("{} {}", "Unknown command:".yellow(), other),
        }
    }

    tail.hide();
    drawer.abort();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Diagnostics go to stderr so the panel stays readable
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = parse_args()?;

    let mut config = TailgateConfig::load_or_default(&args.config_path)
        .with_context(|| format!("Failed to load config: {}", args.config_path))?
        .with_env_overrides();
    if let Some(url) = args.gateway_url {
        config.client.gateway_url = url;
    }
    if let Some(limit) = args.limit {
        config.client.tail_limit = limit.max(1);
    }

    let client = Arc::new(GatewayClient::new(
        &config.client.gateway_url,
        config.client.request_timeout(),
    )?);

    match args.command {
        Command::Watch => run_watch(client, &config).await?,
        Command::Recommend(form) => match client.recommend(&form).await {
            Ok(response) => print_recommendations(&response),
            Err(e) => {
                print_error(&e);
                std::process::exit(1);
            }
        },
        Command::Logs => {
            let entries = client.fetch_tail(config.client.tail_limit).await?;
            let log = RenderedLog::from_values(&entries);
            if log.is_empty() {
                println!("{}", "No logs yet".dimmed());
            }
            for entry in &log.entries {
                print_entry(entry);
            }
        }
        Command::Clear => {
            client.clear().await?;
            println!("{}", "Logs cleared".green());
        }
        Command::Health => {
            let health = client.health().await?;
            println!("{}", serde_json::to_string_pretty(&health)?);
        }
    }

    Ok(())
}
