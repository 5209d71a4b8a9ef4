//! CLI binary for maintenance-agent.
//!
//! A terminal session driver over the library: loads a manual, reads
//! questions from stdin (or `--ask`), renders replies and the transcript.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use maintenance_agent::{
    read_image, read_manual, AgentConfig, AgentError, ImageAttachment, ManualUpload, Role,
    Session, DEFAULT_MODEL, DEFAULT_PROVIDER,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Interactive session grounded in a manual
  maintenance-agent --manual washer-x200.pdf

  # Manual from a URL
  maintenance-agent --manual https://example.com/docs/boiler.pdf

  # One-shot questions (scripting)
  maintenance-agent --manual pump.pdf --ask "E01 error, what do I do?"

  # No manual: general engineering knowledge only
  maintenance-agent --ask "Kompresör çalışmıyor, ne yapmalıyım?"

SESSION COMMANDS:
  /manual <path|url>   Load (or replace) the maintenance manual
  /image <path>        Attach a JPEG/PNG photo to your next question
  /history [json]      Show the conversation so far
  /reset               Clear the conversation (manual is kept)
  /help                Show this list
  /quit                Leave the session

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key
  GOOGLE_API_KEY          Fallback for GEMINI_API_KEY
  PDFIUM_LIB_PATH         Path to an existing libpdfium — skips auto-download
  PDFIUM_AUTO_CACHE_DIR   Override the default pdfium cache directory
"#;

const COMMANDS: &str = "/manual <path|url>  /image <path>  /history [json]  /reset  /help  /quit";

/// Field maintenance assistant grounded in your PDF manual.
#[derive(Parser, Debug)]
#[command(
    name = "maintenance-agent",
    version,
    about = "Field maintenance assistant grounded in your PDF manual",
    long_about = "Chat with a senior field-service engineer persona that answers from the \
uploaded maintenance manual first and from general engineering knowledge when the manual is \
silent or only says \"contact service\". Answers in English or Turkish.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Maintenance manual: local PDF path or HTTP/HTTPS URL.
    #[arg(short, long, env = "MAINTENANCE_AGENT_MANUAL")]
    manual: Option<String>,

    /// Ask this question and exit instead of starting the REPL (repeatable).
    #[arg(short, long)]
    ask: Vec<String>,

    /// Photo (JPEG/PNG) attached to the first question.
    #[arg(short, long)]
    image: Option<PathBuf>,

    /// Remote model ID.
    #[arg(long, env = "MAINTENANCE_AGENT_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// LLM provider (edgequake-llm name).
    #[arg(long, env = "MAINTENANCE_AGENT_PROVIDER", default_value = DEFAULT_PROVIDER)]
    provider: String,

    /// API key. Falls back to GEMINI_API_KEY, then GOOGLE_API_KEY.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Sampling temperature (0.0–2.0). Provider default when unset.
    #[arg(long, env = "MAINTENANCE_AGENT_TEMPERATURE")]
    temperature: Option<f32>,

    /// Max output tokens per reply. Provider default when unset.
    #[arg(long, env = "MAINTENANCE_AGENT_MAX_TOKENS")]
    max_tokens: Option<usize>,

    /// Per-call model timeout in seconds.
    #[arg(long, env = "MAINTENANCE_AGENT_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Automatic retries on a failed model call (at most 10).
    #[arg(long, env = "MAINTENANCE_AGENT_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// HTTP download timeout in seconds for manual URLs.
    #[arg(long, env = "MAINTENANCE_AGENT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// PDF user password for encrypted manuals.
    #[arg(long, env = "MAINTENANCE_AGENT_PASSWORD")]
    password: Option<String>,

    /// Text file replacing the built-in behavioural protocol.
    #[arg(long, env = "MAINTENANCE_AGENT_PROTOCOL")]
    protocol: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "MAINTENANCE_AGENT_VERBOSE")]
    verbose: bool,

    /// Suppress everything except replies and errors.
    #[arg(short, long, env = "MAINTENANCE_AGENT_QUIET")]
    quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    tokio::runtime::Runtime::new()
        .context("Failed to create tokio runtime")?
        .block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    let config = build_config(&cli).await?;

    // Fatal: no credential or the model cannot be initialised.
    let mut session = match Session::start(config) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("{} {}", red("✘"), e);
            std::process::exit(1);
        }
    };

    if !cli.quiet {
        eprintln!(
            "{} {}  {}",
            bold("🔧 Maintenance Agent"),
            dim(&format!("model: {}", session.model_name())),
            dim("type /help for commands")
        );
    }

    if let Some(ref manual) = cli.manual {
        load_manual(&mut session, manual, cli.download_timeout, cli.quiet).await;
    }

    let mut pending_image = match cli.image {
        Some(ref path) => match read_image(path).await {
            Ok(photo) => Some(photo),
            Err(e) => {
                eprintln!("{} {}", red("✗"), e);
                None
            }
        },
        None => None,
    };

    if !cli.ask.is_empty() {
        for question in &cli.ask {
            let photo = pending_image.take();
            ask(&mut session, question, photo, cli.quiet)
                .await
                .map_err(|(e, _)| e)
                .context("Question failed")?;
        }
        return Ok(());
    }

    if session.manual().is_none() && !cli.quiet {
        eprintln!(
            "{}",
            dim("No manual loaded — answers come from general engineering knowledge. Use /manual <path> to load one.")
        );
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("{} ", cyan("technician ›"));
        io::stderr().flush().ok();

        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('/') {
            let (name, arg) = command
                .split_once(char::is_whitespace)
                .map(|(n, a)| (n, a.trim()))
                .unwrap_or((command, ""));
            match name {
                "quit" | "exit" | "q" => break,
                "help" => eprintln!("{}", dim(COMMANDS)),
                "manual" if !arg.is_empty() => {
                    load_manual(&mut session, arg, cli.download_timeout, cli.quiet).await;
                }
                "image" if !arg.is_empty() => match read_image(arg).await {
                    Ok(photo) => {
                        let (w, h) = photo.dimensions();
                        eprintln!("{} Photo attached to your next question ({w}x{h})", green("📷"));
                        pending_image = Some(photo);
                    }
                    Err(e) => eprintln!("{} {}", red("✗"), e),
                },
                "history" => print_history(&session, arg == "json")?,
                "reset" => {
                    session.reset();
                    eprintln!("{} Conversation cleared", green("✔"));
                }
                _ => eprintln!("{} Unknown command. {}", red("✗"), dim(COMMANDS)),
            }
            continue;
        }

        let photo = pending_image.take();
        if let Err((e, photo)) = ask(&mut session, line, photo, cli.quiet).await {
            // Keep the photo so a resubmission carries it again.
            pending_image = photo;
            if e.downcast_ref::<AgentError>().is_some_and(AgentError::is_fatal) {
                return Err(e);
            }
        }
    }

    Ok(())
}

/// Map CLI args to `AgentConfig`.
async fn build_config(cli: &Cli) -> Result<AgentConfig> {
    let mut builder = AgentConfig::builder()
        .model(&cli.model)
        .provider_name(&cli.provider)
        .api_timeout_secs(cli.api_timeout)
        .max_retries(cli.max_retries)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key);
    }
    if let Some(t) = cli.temperature {
        builder = builder.temperature(t);
    }
    if let Some(n) = cli.max_tokens {
        builder = builder.max_tokens(n);
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd);
    }
    if let Some(ref path) = cli.protocol {
        let protocol = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read protocol from {:?}", path))?;
        builder = builder.protocol(protocol);
    }

    builder.build().context("Invalid configuration")
}

/// Load a manual; failures are reported inline and the session continues.
async fn load_manual(session: &mut Session, input: &str, timeout_secs: u64, quiet: bool) {
    let upload = match read_manual(input, timeout_secs).await {
        Ok(upload) => upload,
        Err(e) => {
            eprintln!("{} {}", red("✗"), e);
            return;
        }
    };

    match session.upload_manual(&upload.name, upload.bytes).await {
        Ok(ManualUpload::Loaded { name, page_count }) => {
            if !quiet {
                eprintln!(
                    "{} PDF Processed Successfully! {} ({} pages)",
                    green("✅"),
                    bold(&name),
                    page_count
                );
            }
        }
        Ok(ManualUpload::Unchanged { .. }) => {}
        Err(e) => eprintln!("{} {}", red("✗"), e),
    }
}

/// Submit one question and render the reply.
///
/// On failure the photo is handed back so the caller can keep it pending.
async fn ask(
    session: &mut Session,
    question: &str,
    photo: Option<ImageAttachment>,
    quiet: bool,
) -> std::result::Result<(), (anyhow::Error, Option<ImageAttachment>)> {
    let spinner = if quiet {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "✓"]),
        );
        bar.set_message("Analyzing…");
        bar.enable_steady_tick(Duration::from_millis(80));
        bar
    };

    let retained = photo.clone();
    let result = session.submit(question, photo).await;
    spinner.finish_and_clear();

    match result {
        Ok(exchange) => {
            println!("{}\n{}\n", bold("🔧 SENIOR ENGINEER"), exchange.reply);
            if !quiet {
                eprintln!(
                    "{}",
                    dim(&format!(
                        "   {} tokens in  /  {} tokens out  —  {}ms",
                        exchange.input_tokens, exchange.output_tokens, exchange.duration_ms
                    ))
                );
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {}", red("✗"), e);
            Err((anyhow::Error::new(e), retained))
        }
    }
}

fn print_history(session: &Session, json: bool) -> Result<()> {
    let transcript = session.transcript();
    if json {
        let out = serde_json::to_string_pretty(transcript).context("Failed to serialise transcript")?;
        println!("{out}");
        return Ok(());
    }

    if transcript.is_empty() {
        eprintln!("{}", dim("(no messages yet)"));
        return Ok(());
    }

    for turn in transcript.all() {
        let label = match turn.role {
            Role::User => cyan("technician"),
            Role::Assistant => bold("engineer"),
        };
        println!("{label}: {}", turn.text);
        if let Some(ref photo) = turn.image {
            let (w, h) = photo.dimensions();
            println!("{}", dim(&format!("   [photo {w}x{h}, {}]", photo.mime_type())));
        }
    }
    Ok(())
}
