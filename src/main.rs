use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use smartdesk::agent::Notification;
use smartdesk::config::Config;
use smartdesk::memory::Role;
use smartdesk::tools::calendar::MeetingRequest;
use smartdesk::tools::search::AnalysisType;
use smartdesk::{ChatRouter, Upload};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

const NOTIFICATION_POLL: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(
    name = "smartdesk",
    about = "Personal productivity assistant: LLM chat, file analysis, web search, calendar reminders"
)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Model override: `name` or `provider:name` (groq, gemini, openai, ollama)
    #[arg(long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Interactive chat with the calendar agent running in the background
    Chat,

    /// Send a single message, optionally with a file (png, jpg, jpeg, pdf)
    Ask {
        message: String,

        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Web search with an LLM summary
    Search {
        #[arg(required = true)]
        query: Vec<String>,

        /// auto, summary, analysis, comparison, learning
        #[arg(long, default_value = "auto")]
        analysis: String,
    },

    /// List upcoming calendar events
    Calendar {
        /// Lookahead window in hours (defaults to calendar.lookahead_hours)
        #[arg(long)]
        hours: Option<i64>,
    },

    /// Create a calendar event
    Schedule {
        summary: String,

        /// Start time, RFC 3339 (e.g. 2025-06-02T15:00:00-04:00)
        #[arg(long)]
        start: String,

        /// Duration in minutes (default 30)
        #[arg(long)]
        minutes: Option<i64>,

        #[arg(long = "attendee")]
        attendees: Vec<String>,

        #[arg(long)]
        location: Option<String>,

        #[arg(long)]
        description: Option<String>,
    },

    /// Monitor the calendar and print reminders until Ctrl-C
    Agent,

    /// Process a webhook payload from a JSON file
    Webhook { payload: PathBuf },

    /// Show or clear the stored chat history
    History {
        #[arg(long)]
        clear: bool,
    },

    /// Render a reminder for a synthetic meeting 10 minutes out
    TestNotification,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("smartdesk=info")),
        )
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::load_or_default(&cli.config)?;
    config.validate()?;

    let mut router = ChatRouter::from_config(&config)?;
    router.set_model(cli.model);

    match cli.command {
        Command::Chat => run_chat(router, config.persona.proactive_agents.calendar).await,
        Command::Ask { message, file } => {
            let upload = file.as_deref().map(read_upload).transpose()?;
            let reply = router.process_user_message(&message, upload).await;
            println!("{reply}");
            Ok(())
        }
        Command::Search { query, analysis } => {
            let analysis: AnalysisType = analysis.parse()?;
            let reply = router
                .search_tool()
                .search(&query.join(" "), analysis, "")
                .await;
            println!("{reply}");
            Ok(())
        }
        Command::Calendar { hours } => {
            let hours = hours.unwrap_or(config.calendar.lookahead_hours);
            println!("{}", router.calendar().upcoming_summary(hours).await);
            Ok(())
        }
        Command::Schedule {
            summary,
            start,
            minutes,
            attendees,
            location,
            description,
        } => {
            let start = DateTime::parse_from_rfc3339(&start)
                .with_context(|| format!("invalid --start {start}"))?
                .with_timezone(&Utc);
            let created = router
                .calendar()
                .schedule_meeting(MeetingRequest {
                    summary,
                    start,
                    duration_minutes: minutes,
                    attendees,
                    location,
                    description,
                })
                .await?;
            println!(
                "Scheduled '{}' (id {})",
                created.title(),
                created.id.as_deref().unwrap_or("unknown")
            );
            Ok(())
        }
        Command::Agent => {
            let agent = router.agent();
            agent.start(Arc::new(|n: Notification| println!("{}\n", n.content)));
            println!("Calendar agent running. Press Ctrl-C to stop.");
            tokio::signal::ctrl_c().await?;
            agent.stop().await;
            Ok(())
        }
        Command::Webhook { payload } => {
            let raw = std::fs::read_to_string(&payload)
                .with_context(|| format!("reading {}", payload.display()))?;
            let payload: serde_json::Value = serde_json::from_str(&raw)?;
            let handler = router.webhook_handler();
            let response = handler.process(&payload);
            println!("{}", serde_json::to_string_pretty(&response)?);
            for n in handler.take_pending() {
                println!("\n{}", n.content);
            }
            Ok(())
        }
        Command::History { clear } => {
            if clear {
                router.clear_memory()?;
                println!("Chat history cleared.");
                return Ok(());
            }
            for msg in router.history() {
                let role = match msg.role {
                    Role::User => "You",
                    Role::Assistant => "Assistant",
                };
                println!(
                    "[{}] {role}: {}",
                    msg.timestamp.format("%Y-%m-%d %H:%M"),
                    msg.content
                );
            }
            Ok(())
        }
        Command::TestNotification => {
            let n = router.agent().test_notification().await;
            println!("{}", n.content);
            Ok(())
        }
    }
}

fn read_upload(path: &Path) -> Result<Upload> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(Upload { name, bytes })
}

/// Line-oriented chat. `/upload <path> [question]` attaches a file; `/quit` exits.
async fn run_chat(mut router: ChatRouter, calendar_agent: bool) -> Result<()> {
    if calendar_agent {
        router.start_calendar_agent();
    }
    let queue = router.proactive_queue();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tick = tokio::time::interval(NOTIFICATION_POLL);

    println!("SmartDesk chat. Commands: /search, /calendar, /summarize, /time, /upload, /clear, /quit");
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                match line {
                    "" => continue,
                    "/quit" | "/exit" => break,
                    "/clear" => {
                        router.clear_memory()?;
                        println!("Memory cleared.\n");
                        continue;
                    }
                    _ => {}
                }

                let (message, upload) = match line.strip_prefix("/upload ") {
                    Some(rest) => {
                        let (path, question) = rest.trim().split_once(' ').unwrap_or((rest.trim(), ""));
                        match read_upload(Path::new(path)) {
                            Ok(upload) => (question, Some(upload)),
                            Err(e) => {
                                println!("{e:#}\n");
                                continue;
                            }
                        }
                    }
                    None => (line, None),
                };
                let reply = router.process_user_message(message, upload).await;
                println!("{reply}\n");
            }
            _ = tick.tick() => {
                for n in queue.drain() {
                    println!("{}\n", n.content);
                }
            }
        }
    }

    router.agent().stop().await;
    Ok(())
}
