//! gst-automation - GST portal automation via Chrome DevTools Protocol.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use gst_portal_automation::browser::client::browser_version;
use gst_portal_automation::browser::SystemChromeLocator;
use gst_portal_automation::config::expand_path;
use gst_portal_automation::models::{
    DEFAULT_FINANCIAL_YEAR_INDEX, DEFAULT_PERIOD_INDEX, DEFAULT_QUARTER_INDEX, FINANCIAL_YEARS,
    PERIODS, QUARTERS,
};
use gst_portal_automation::portal::plan;
use gst_portal_automation::session::DriverLocator;
use gst_portal_automation::{
    ActionSet, AutomationConfig, AutomationRequest, AutomationService, CredentialSource,
    Credentials, JsonCredentialFile, LedgerDateRange, ReturnsFilterOptions, RunOutcome,
    StatusEvent, StatusSink,
};

#[derive(Parser)]
#[command(name = "gst-automation")]
#[command(about = "Automate GST portal login, returns dashboard, GSTR-2B download and ledgers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output JSON lines (for scripts)
    #[arg(long, global = true)]
    json: bool,

    /// Log level (trace, debug, info, warn, error). RUST_LOG overrides.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and run the selected portal actions
    Run(RunArgs),

    /// Check that a browser and the download directory are usable
    Check {
        /// Config file (JSON)
        #[arg(short, long)]
        config: Option<String>,
        /// Browser binary to use instead of discovery
        #[arg(long)]
        browser_path: Option<String>,
        /// Where downloads are saved
        #[arg(long)]
        download_dir: Option<String>,
    },

    /// List the Returns Dashboard dropdown options and their indices
    Options,
}

#[derive(Args)]
struct RunArgs {
    /// Config file (JSON)
    #[arg(short, long)]
    config: Option<String>,

    /// Client file (JSON array of client_name/username/password)
    #[arg(long, requires = "client")]
    clients: Option<String>,

    /// Client to run, looked up by name in --clients
    #[arg(long, conflicts_with = "username")]
    client: Option<String>,

    /// GST portal username
    #[arg(short, long)]
    username: Option<String>,

    /// GST portal password
    #[arg(short, long, env = "GST_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Label for --username runs
    #[arg(long, default_value = "Manual")]
    client_name: String,

    /// Stop after login
    #[arg(long)]
    just_login: bool,

    /// Open the Returns Dashboard and apply the filters
    #[arg(long)]
    returns_dashboard: bool,

    /// Download the GSTR-2B Excel report (implies --returns-dashboard)
    #[arg(long)]
    download_report: bool,

    /// Open the Electronic Credit Ledger
    #[arg(long)]
    credit_ledger: bool,

    /// Open the Electronic Cash Ledger
    #[arg(long)]
    cash_ledger: bool,

    /// Financial year index (see `options`)
    #[arg(long, default_value_t = DEFAULT_FINANCIAL_YEAR_INDEX, allow_negative_numbers = true)]
    year_index: i32,

    /// Quarter index (see `options`)
    #[arg(long, default_value_t = DEFAULT_QUARTER_INDEX, allow_negative_numbers = true)]
    quarter_index: i32,

    /// Period (month) index (see `options`)
    #[arg(long, default_value_t = DEFAULT_PERIOD_INDEX, allow_negative_numbers = true)]
    month_index: i32,

    /// Credit ledger From Date (DD-MM-YYYY, default today)
    #[arg(long)]
    from_date: Option<String>,

    /// Credit ledger To Date (DD-MM-YYYY, default today)
    #[arg(long)]
    to_date: Option<String>,

    /// Where downloads and debug screenshots are saved
    #[arg(long)]
    download_dir: Option<String>,

    /// Browser binary to use instead of discovery
    #[arg(long)]
    browser_path: Option<String>,

    /// Run the browser without a window
    #[arg(long)]
    headless: bool,

    /// Leave the browser open after the run (until Ctrl+C)
    #[arg(long)]
    keep_open: bool,

    /// Validate and print the planned steps without opening a browser
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match cli.command {
        Commands::Run(args) => cmd_run(args, cli.json),
        Commands::Check {
            config,
            browser_path,
            download_dir,
        } => cmd_check(config, browser_path, download_dir, cli.json),
        Commands::Options => cmd_options(cli.json),
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},chromiumoxide=warn", level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Config file plus the CLI overrides shared by `run` and `check`.
fn load_config(
    path: Option<&str>,
    browser_path: Option<String>,
    download_dir: Option<String>,
) -> Result<AutomationConfig> {
    let mut config = AutomationConfig::load(path)?;
    if let Some(path) = browser_path {
        config.browser_path = Some(expand_path(&path));
    }
    if let Some(dir) = download_dir {
        config.download_dir = expand_path(&dir);
    }
    Ok(config)
}

fn credentials(args: &RunArgs) -> Result<Credentials> {
    if let (Some(file), Some(name)) = (&args.clients, &args.client) {
        return JsonCredentialFile::new(expand_path(file)).find(name);
    }
    if args.client.is_some() {
        anyhow::bail!("--client needs a --clients file to look the client up in");
    }
    Ok(Credentials::new(
        args.client_name.as_str(),
        args.username.clone().unwrap_or_default(),
        args.password.clone().unwrap_or_default(),
    ))
}

fn build_request(args: &RunArgs) -> Result<AutomationRequest> {
    let mut request = AutomationRequest::new(
        credentials(args)?,
        ActionSet {
            just_login: args.just_login,
            returns_dashboard: args.returns_dashboard,
            download_report: args.download_report,
            access_credit_ledger: args.credit_ledger,
            access_cash_ledger: args.cash_ledger,
        },
    );
    request.returns_filter = ReturnsFilterOptions {
        year_index: args.year_index,
        quarter_index: args.quarter_index,
        month_index: args.month_index,
    };
    let today = LedgerDateRange::default();
    request.ledger_dates = LedgerDateRange::new(
        args.from_date.clone().unwrap_or(today.from_date),
        args.to_date.clone().unwrap_or(today.to_date),
    );
    request.keep_open = args.keep_open;
    Ok(request)
}

fn cmd_run(args: RunArgs, json_output: bool) -> Result<()> {
    let mut config = load_config(
        args.config.as_deref(),
        args.browser_path.clone(),
        args.download_dir.clone(),
    )?;
    config.headless = config.headless || args.headless;

    let request = build_request(&args)?;

    if args.dry_run {
        let request = request.prepare()?;
        let steps: Vec<String> = plan(&request)
            .iter()
            .map(|step| step.describe(&request))
            .collect();
        if json_output {
            println!(
                "{}",
                serde_json::json!({
                    "dry_run": true,
                    "client": request.credentials.client_name,
                    "download_dir": config.download_dir,
                    "steps": steps,
                })
            );
        } else {
            println!("Dry run for {}", request.credentials);
            println!("Downloads: {}", config.download_dir.display());
            for (i, step) in steps.iter().enumerate() {
                println!("  {}. {}", i + 1, step);
            }
        }
        return Ok(());
    }

    let service = AutomationService::new(config).context("Failed to create automation service")?;
    let sink: Arc<dyn StatusSink> = if json_output {
        Arc::new(|event: &StatusEvent| {
            if let Ok(line) = serde_json::to_string(event) {
                println!("{}", line);
            }
        })
    } else {
        Arc::new(|event: &StatusEvent| println!("[{}] {}", event.level, event.message))
    };

    let handle = service.start(request, sink)?;
    let outcome = handle.join();
    print_outcome(&outcome, json_output)?;

    if outcome.session_retained {
        if !json_output {
            println!("Browser left open. Press Ctrl+C to close it.");
        }
        service
            .block_on(tokio::signal::ctrl_c())
            .context("Failed to listen for Ctrl+C")?;
        let closed = service.close_active();
        tracing::info!("Closed {} browser session(s)", closed);
    }

    if !outcome.success {
        std::process::exit(1);
    }
    Ok(())
}

fn print_outcome(outcome: &RunOutcome, json_output: bool) -> Result<()> {
    if json_output {
        println!("{}", serde_json::to_string(outcome)?);
        return Ok(());
    }

    println!();
    println!("Run: {}", outcome.run_id);
    println!("Result: {}", if outcome.success { "SUCCESS" } else { "FAILED" });
    println!("States: {}", outcome.visited.join(" -> "));
    if let Some(failure) = &outcome.failure {
        println!("Failed step: {} ({})", failure.step, failure.kind);
        println!("Reason: {}", failure.message);
    }
    if let Some(path) = &outcome.screenshot {
        println!("Screenshot: {}", path.display());
    }
    Ok(())
}

fn cmd_check(
    config: Option<String>,
    browser_path: Option<String>,
    download_dir: Option<String>,
    json_output: bool,
) -> Result<()> {
    let config = load_config(config.as_deref(), browser_path, download_dir)?;

    let browser = SystemChromeLocator::new(config.browser_path.clone())
        .locate()
        .map_err(anyhow::Error::from)
        .and_then(|path| {
            let version = browser_version(&path)?;
            Ok((path, version))
        });
    let downloads = config.ensure_download_dir().map(|p| p.to_path_buf());
    let ok = browser.is_ok() && downloads.is_ok();

    if json_output {
        println!(
            "{}",
            serde_json::json!({
                "ok": ok,
                "browser": match &browser {
                    Ok((path, version)) => serde_json::json!({"path": path, "version": version}),
                    Err(e) => serde_json::json!({"error": format!("{:#}", e)}),
                },
                "download_dir": match &downloads {
                    Ok(dir) => serde_json::json!({"path": dir}),
                    Err(e) => serde_json::json!({"error": format!("{:#}", e)}),
                },
            })
        );
    } else {
        match &browser {
            Ok((path, version)) => println!("Browser: OK ({}, {})", version, path.display()),
            Err(e) => println!("Browser: MISSING ({:#})", e),
        }
        match &downloads {
            Ok(dir) => println!("Download directory: OK ({})", dir.display()),
            Err(e) => println!("Download directory: UNUSABLE ({:#})", e),
        }
    }

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_options(json_output: bool) -> Result<()> {
    if json_output {
        println!(
            "{}",
            serde_json::json!({
                "financial_years": FINANCIAL_YEARS,
                "quarters": QUARTERS,
                "periods": PERIODS,
                "defaults": ReturnsFilterOptions::default(),
            })
        );
        return Ok(());
    }

    print_table("Financial years (--year-index)", &FINANCIAL_YEARS, DEFAULT_FINANCIAL_YEAR_INDEX);
    print_table("Quarters (--quarter-index)", &QUARTERS, DEFAULT_QUARTER_INDEX);
    print_table("Periods (--month-index)", &PERIODS, DEFAULT_PERIOD_INDEX);
    Ok(())
}

fn print_table(title: &str, options: &[&str], default: i32) {
    println!("{}:", title);
    for (i, option) in options.iter().enumerate() {
        let marker = if i as i32 == default { " (default)" } else { "" };
        println!("  {:>2}  {}{}", i, option, marker);
    }
}
