use clap::{Parser, ValueEnum};
use punchclock::{ActionKind, ActionOutcome, Config, Params, Session};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "punchclock")]
#[command(about = "Attendance automation for the GreytHR portal")]
#[command(version)]
struct Cli {
    /// Portal config file
    config: PathBuf,

    /// Action to perform
    #[arg(value_enum)]
    action: CliAction,

    /// Run in headless mode (overrides config)
    #[arg(long)]
    headless: bool,

    /// Set a parameter (can be used multiple times), e.g. -P username=alice
    #[arg(short = 'P', long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,

    /// Verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Validate config without opening a browser
    #[arg(long)]
    check: bool,

    /// Quiet mode (only errors)
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum CliAction {
    /// Sign in to the portal
    SignIn,
    /// Sign out from the portal
    SignOut,
    /// Report current attendance state without changing it
    Status,
}

impl From<CliAction> for ActionKind {
    fn from(action: CliAction) -> Self {
        match action {
            CliAction::SignIn => ActionKind::SignIn,
            CliAction::SignOut => ActionKind::SignOut,
            CliAction::Status => ActionKind::StatusOnly,
        }
    }
}

#[tokio::main]
async fn main() -> punchclock::Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let level = if cli.quiet {
        Level::ERROR
    } else {
        match cli.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            _ => Level::DEBUG,
        }
    };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    // Credentials come in as parameters, never from the config file itself.
    let params = Params::from_args(&cli.params)?.overlay_env("PUNCH_");
    let mut config = Config::load_with_params(&cli.config, &params)?;

    if cli.check {
        println!("Config valid: {}", config.name);
        println!("  Portal: {}", config.portal.url);
        println!("  Widget: {}", config.widget.container);
        println!("  Dashboard timeout: {}ms", config.timing.dashboard_timeout_ms);
        if let Some(ref on_failure) = config.on_failure {
            if let Some(ref retry) = on_failure.retry {
                println!("  Retry attempts: {}", retry.attempts);
            }
        }
        return Ok(());
    }

    if cli.headless {
        config.browser.headless = true;
    }

    let kind: ActionKind = cli.action.into();
    let retry = config.on_failure.as_ref().and_then(|f| f.retry.clone());
    let max_attempts = retry.as_ref().map(|r| r.attempts).unwrap_or(1).max(1);
    let delay_ms = retry.as_ref().map(|r| r.delay_ms).unwrap_or(0);
    let screenshot = config.on_failure.as_ref().and_then(|f| f.screenshot.clone());

    println!("Running: {}", config.name);

    // Retries re-issue the whole action with a fresh session; the engine
    // itself never retries.
    let mut last: Option<ActionOutcome> = None;
    for attempt in 1..=max_attempts {
        if attempt > 1 {
            println!("Retrying ({attempt}/{max_attempts})...");
            if delay_ms > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
            }
        }

        let session = match Session::open(config.clone()).await {
            Ok(session) => session,
            Err(e) => {
                eprintln!("✗ {} [{}]", e, e.classification());
                continue;
            }
        };

        let outcome = session.perform(kind).await;
        if !outcome.success {
            if let Some(ref path) = screenshot {
                match session.capture_failure(path).await {
                    Ok(saved) => println!("  Screenshot: {saved}"),
                    Err(e) => eprintln!("  Screenshot failed: {e}"),
                }
            }
        }
        if let Err(e) = session.close().await {
            eprintln!("  Browser close failed: {e}");
        }

        let done = outcome.success;
        last = Some(outcome);
        if done {
            break;
        }
    }

    println!();
    match last {
        Some(outcome) => {
            if outcome.success {
                println!("✓ {}", outcome.summary);
            } else {
                println!("✗ {}", outcome.summary);
            }
            println!("  State: {}", outcome.state);
            if let Some(classification) = outcome.classification {
                println!("  Classification: {classification}");
            }
            if !outcome.success {
                std::process::exit(1);
            }
        }
        None => {
            println!("✗ Could not open a portal session");
            std::process::exit(1);
        }
    }

    Ok(())
}
