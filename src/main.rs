use clap::{Parser, Subcommand};
use std::error::Error;
use std::thread;
use std::time::Duration;

use web_vision::adapters::{all_sources, source_for, TaskSource};
use web_vision::config::Config;
use web_vision::detectors::DetectorRegistry;
use web_vision::driver::{BrowserDriver, DriverResult, MockBrowser, MockPage, WebDriverBrowser};
use web_vision::graph::CaptureGraph;
use web_vision::run::{RunEvent, RunStatus};
use web_vision::session::{generate_run_id, Session};
use web_vision::snapshot::ElementInfo;
use web_vision::task::{Locator, StepTarget, TaskSpec};
use web_vision::verify::Verifier;
use web_vision::vlm::{check_health, HttpVlmClient};

/// Web Vision - Web UI task automation with detector-driven capture
#[derive(Parser, Debug)]
#[command(
    name = "web-vision",
    about = "Run web UI tasks and capture meaningful states with detector and VLM verification",
    after_help = "ENVIRONMENT VARIABLES:\n\
        WEB_VISION_VLM_ENDPOINT       VLM API endpoint URL\n\
        WEB_VISION_VLM_MODEL          VLM model name\n\
        WEB_VISION_AUTO_ACCEPT        Detector auto-accept threshold\n\
        WEB_VISION_FALLBACK_THRESHOLD Detector-only fallback threshold\n\
        WEB_VISION_OUTPUT_DIR         Base directory for run artifacts\n\
        WEB_VISION_LINEAR_WORKSPACE   Linear workspace slug\n\
        WEB_VISION_NOTION_WORKSPACE   Notion workspace/database id\n\
        WEB_VISION_WEBDRIVER_URL      WebDriver endpoint URL"
)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the task catalog for one app or for all apps
    Run {
        /// Which app's tasks to run: linear, notion, or all
        #[arg(short, long, default_value = "all")]
        app: String,

        /// Use a scripted in-memory browser instead of WebDriver
        #[arg(long)]
        dry_run: bool,

        /// Base directory for run artifacts
        #[arg(short, long, env = "WEB_VISION_OUTPUT_DIR")]
        output: Option<String>,
    },

    /// List the known tasks without running anything
    Tasks {
        /// Limit the listing to one app
        #[arg(short, long)]
        app: Option<String>,
    },

    /// Check whether the VLM endpoint is reachable
    CheckVlm,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let mut config = Config::from_env();

    match args.command {
        Commands::Run { app, dry_run, output } => {
            if let Some(dir) = output {
                config.runs.output_dir = dir;
            }

            let sources: Vec<Box<dyn TaskSource>> = if app == "all" {
                all_sources(&config.adapters)
            } else {
                vec![source_for(&app, &config.adapters)
                    .ok_or_else(|| format!("unknown app '{}'; use linear, notion, or all", app))?]
            };

            let run_id = generate_run_id();
            println!("Run ID: {}", run_id);

            if !dry_run {
                match check_health(&config.vlm.endpoint, 5) {
                    Ok(true) => println!("VLM endpoint responding at {}", config.vlm.endpoint),
                    Ok(false) | Err(_) => {
                        eprintln!(
                            "Warning: VLM endpoint not responding at {}; \
                             verification will fall back to detector-only decisions",
                            config.vlm.endpoint
                        );
                    }
                }
            }

            let mut completed = 0u32;
            let mut failed = 0u32;
            let mut first = true;

            for source in sources {
                for task in source.get_tasks() {
                    if !first {
                        thread::sleep(Duration::from_millis(config.runs.inter_task_delay_ms));
                    }
                    first = false;

                    println!("\n{}", "=".repeat(60));
                    println!("Task: {} ({}/{})", task.task_name, task.app, task.task_id);
                    println!("{}", "=".repeat(60));

                    let driver = match make_driver(&task, dry_run, &config.runs.webdriver_url) {
                        Ok(driver) => driver,
                        Err(err) => {
                            eprintln!("Failed to open browser: {}", err);
                            failed += 1;
                            continue;
                        }
                    };

                    let session = Session::for_task(
                        &config.runs.output_dir,
                        &task.app,
                        &run_id,
                        &task.task_id,
                    );
                    let verifier = Verifier::new(
                        Box::new(HttpVlmClient::new(config.vlm.clone())),
                        config.capture.clone(),
                    );
                    let registry = DetectorRegistry::with_builtins(Duration::from_millis(
                        config.capture.quiet_window_ms,
                    ));

                    let mut graph = CaptureGraph::new(
                        task,
                        &run_id,
                        driver,
                        registry,
                        verifier,
                        config.capture.clone(),
                        session,
                    );
                    graph.on_event(log_event);

                    let state = graph.run();
                    if state.status == RunStatus::Completed {
                        completed += 1;
                        println!("Task completed: {} captures", state.captures.len());
                    } else {
                        failed += 1;
                        println!(
                            "Task failed: {}",
                            state.error.as_deref().unwrap_or("unknown error")
                        );
                    }
                }
            }

            println!("\n{}", "=".repeat(60));
            println!("Results:");
            println!("  Completed: {}", completed);
            println!("  Failed: {}", failed);
            println!("  Artifacts saved to: {}", config.runs.output_dir);
            println!("{}", "=".repeat(60));

            if failed > 0 {
                std::process::exit(1);
            }
        }

        Commands::Tasks { app } => {
            let sources: Vec<Box<dyn TaskSource>> = match app {
                Some(app) => vec![source_for(&app, &config.adapters)
                    .ok_or_else(|| format!("unknown app '{}'", app))?],
                None => all_sources(&config.adapters),
            };
            for source in sources {
                println!("{}:", source.app());
                for task in source.get_tasks() {
                    println!(
                        "  {:<24} {} ({} steps)",
                        task.task_id,
                        task.task_name,
                        task.steps.len()
                    );
                }
            }
        }

        Commands::CheckVlm => match check_health(&config.vlm.endpoint, 5)? {
            true => println!("VLM endpoint responding at {}", config.vlm.endpoint),
            false => {
                eprintln!("VLM endpoint not responding at {}", config.vlm.endpoint);
                std::process::exit(1);
            }
        },
    }

    Ok(())
}

fn make_driver(
    task: &TaskSpec,
    dry_run: bool,
    webdriver_url: &str,
) -> DriverResult<Box<dyn BrowserDriver>> {
    if dry_run {
        Ok(Box::new(scripted_browser(task)))
    } else {
        Ok(Box::new(WebDriverBrowser::connect(webdriver_url)?))
    }
}

/// A mock browser whose queued pages let every step of the task settle:
/// each page carries a blocking dialog plus the elements the task's own
/// locators refer to.
fn scripted_browser(task: &TaskSpec) -> MockBrowser {
    let mut elements = vec![ElementInfo::new(Some("dialog"), "Scripted dialog").blocking(1000)];
    for step in &task.steps {
        if let StepTarget::Element(locator) = &step.target {
            if let Some(name) = locator.expected_name() {
                let role = match locator {
                    Locator::Role { role, .. } => Some(role.as_str()),
                    _ => None,
                };
                elements.push(ElementInfo::new(role, name));
            }
        }
    }

    let mut browser = MockBrowser::new();
    for _ in 0..task.steps.len() {
        browser.push_page(MockPage::with_elements(elements.clone()));
    }
    browser
}

fn log_event(event: &RunEvent) {
    match event {
        RunEvent::RunStarted { run_id, task_id } => {
            println!("  Run started: {} ({})", task_id, run_id);
        }
        RunEvent::StepStarted { step, action, target } => {
            println!("  Step {}: {} - {}", step, action, target);
        }
        RunEvent::DetectorFired { step: _, detector, confidence } => {
            println!("  Detector fired: {} (confidence: {:.2})", detector, confidence);
        }
        RunEvent::VlmVerifying { step: _, question } => {
            println!("  VLM verifying: {}", question);
        }
        RunEvent::StateCaptured { state_id, caption, .. } => {
            match caption {
                Some(caption) => println!("  State captured: {} - {}", state_id, caption),
                None => println!("  State captured: {}", state_id),
            }
        }
        RunEvent::CaptureRejected { step: _, reason } => {
            println!("  Capture rejected: {}", reason);
        }
        RunEvent::RunCompleted { captures, duration_ms } => {
            println!("  Run completed: {} captures in {}ms", captures, duration_ms);
        }
        RunEvent::RunFailed { error } => {
            println!("  Run failed: {}", error);
        }
        RunEvent::Error { message } => {
            eprintln!("  Warning: {}", message);
        }
    }
}
