//! Mobile Agent - vision-language phone automation
//!
//! This is the CLI entry point for the mobile-agent tool.
//! Run with: cargo run --bin mobile-agent -- "打开微信"

use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use mobile_agent::config::{get_messages, list_supported_apps, Lang};
use mobile_agent::device::{create_device, DeviceKind};
use mobile_agent::model::ModelClient;
use mobile_agent::settings::AppSettings;
use mobile_agent::{AgentError, PhoneAgent};

#[derive(Parser, Debug)]
#[command(name = "mobile-agent", version, about = "Drive a phone with a vision-language model")]
struct Cli {
    /// Model API base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Model name
    #[arg(long)]
    model: Option<String>,

    /// Model API key
    #[arg(long)]
    api_key: Option<String>,

    /// Device transport: adb, hdc or wda
    #[arg(long, value_name = "TYPE")]
    device_type: Option<DeviceKind>,

    /// Device serial (ADB) or connect key (HDC)
    #[arg(short = 'd', long)]
    device_id: Option<String>,

    /// WebDriverAgent URL
    #[arg(long)]
    wda_url: Option<String>,

    /// Prompt and console language: cn or en
    #[arg(long)]
    lang: Option<Lang>,

    /// Maximum steps per task
    #[arg(long)]
    max_steps: Option<u32>,

    /// Do not print the per-step banner
    #[arg(short, long)]
    quiet: bool,

    /// List supported apps for the selected device type and exit
    #[arg(long)]
    list_apps: bool,

    /// Persist the effective settings
    #[arg(long)]
    save_settings: bool,

    /// Task to run; omit for interactive mode
    task: Vec<String>,
}

impl Cli {
    fn apply(&self, settings: &mut AppSettings) {
        if let Some(v) = &self.base_url {
            settings.base_url = v.clone();
        }
        if let Some(v) = &self.model {
            settings.model_name = v.clone();
        }
        if let Some(v) = &self.api_key {
            settings.api_key = v.clone();
        }
        if let Some(v) = self.device_type {
            settings.device_type = v;
        }
        if let Some(v) = &self.device_id {
            settings.device_id = v.clone();
        }
        if let Some(v) = &self.wda_url {
            settings.wda_url = v.clone();
        }
        if let Some(v) = self.lang {
            settings.lang = v;
        }
        if let Some(v) = self.max_steps {
            settings.max_steps = v;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut settings = AppSettings::load()?;
    cli.apply(&mut settings);

    if cli.save_settings {
        let path = settings.save()?;
        println!("Settings saved to {}", path.display());
    }

    let msgs = get_messages(settings.lang);

    if cli.list_apps {
        let platform = settings.device_type.platform();
        println!("{} ({}):", msgs.supported_apps, platform);
        for app in list_supported_apps(platform) {
            println!("  - {}", app);
        }
        return Ok(());
    }

    println!("🤖 Mobile Agent");
    println!("================================================");
    println!("Model: {} @ {}", settings.model_name, settings.base_url);
    println!("Language: {}", settings.lang);
    println!(
        "Retry: max {} attempts, {}s delay",
        settings.max_retries, settings.retry_delay
    );
    println!("Device: {}", settings.device_type);
    if let Some(id) = settings.device_id() {
        println!("Device ID: {}", id);
    }
    println!("================================================\n");

    let device = create_device(
        settings.device_type,
        settings.device_id(),
        Some(settings.wda_url.as_str()),
        settings.timeout(),
    )?;
    let model = Arc::new(ModelClient::new(settings.to_model_config())?);

    let mut agent_config = settings.to_agent_config();
    if cli.quiet {
        agent_config = agent_config.quiet();
    }
    let mut agent = PhoneAgent::new(device, model, agent_config, None, None);

    let stop = agent.stop_signal();
    let busy = Arc::new(AtomicBool::new(false));
    let task_running = busy.clone();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            match on_interrupt(task_running.load(Ordering::SeqCst), stop.is_stopped()) {
                Interrupt::StopTask => {
                    tracing::warn!("Stop requested, Ctrl-C again to quit");
                    stop.stop();
                }
                Interrupt::Exit => {
                    println!("\nGoodbye! 👋");
                    std::process::exit(130);
                }
            }
        }
    });

    if !cli.task.is_empty() {
        let task = cli.task.join(" ");
        println!("📝 {}: {}\n", msgs.task, task);
        run_task(&mut agent, &task, &busy).await;
        return Ok(());
    }

    // Interactive mode
    println!("Interactive mode. Type 'quit' or 'exit' to exit.\n");

    let stdin = io::stdin();
    loop {
        print!("📝 {}: ", msgs.enter_task);
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let task = line.trim();

        if task.is_empty() {
            continue;
        }
        if task == "quit" || task == "exit" {
            println!("Goodbye! 👋");
            break;
        }

        agent.stop_signal().clear();
        run_task(&mut agent, task, &busy).await;
    }

    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Interrupt {
    StopTask,
    Exit,
}

/// The first Ctrl-C during a task stops it; otherwise Ctrl-C quits.
fn on_interrupt(task_running: bool, already_stopping: bool) -> Interrupt {
    if task_running && !already_stopping {
        Interrupt::StopTask
    } else {
        Interrupt::Exit
    }
}

async fn run_task(agent: &mut PhoneAgent, task: &str, busy: &AtomicBool) {
    let msgs = get_messages(agent.config().lang);
    busy.store(true, Ordering::SeqCst);
    let outcome = agent.run(task).await;
    busy.store(false, Ordering::SeqCst);
    match outcome {
        Ok(result) => println!("\n✅ {}: {}\n", msgs.result, result),
        Err(AgentError::Cancelled) => println!("\n⏹ Stopped after {} steps\n", agent.step_count()),
        Err(e) => eprintln!("\n❌ Error: {}\n", e),
    }
}
