//! fontwatch entrypoint: one font load detection against the headless host.
use anyhow::{Context, Result};
use clap::Parser;
use core_detector::{Descriptors, Detector};
use core_host::headless::FaceMetrics;
use core_host::{HeadlessHost, Visibility};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Once};
use std::time::Duration;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "fontwatch", version, about = "Wait for a web font to become usable")]
struct Args {
    /// Font family to wait for.
    family: String,
    #[arg(long)]
    style: Option<String>,
    #[arg(long)]
    weight: Option<String>,
    #[arg(long)]
    stretch: Option<String>,
    /// Sample text rendered by the probes (default from config, `BESbswy`).
    #[arg(long)]
    text: Option<String>,
    #[arg(long = "timeout-ms")]
    timeout_ms: Option<u64>,
    /// Configuration file path (overrides discovery of `fontwatch.toml`).
    #[arg(long = "config")]
    config: Option<PathBuf>,
    /// Give the host a native font loading API.
    #[arg(long)]
    native: bool,
    /// Families installed locally before the attempt starts.
    #[arg(long = "install", num_args = 1..)]
    install: Vec<String>,
    /// Register the family as a web font that lands after this many ms.
    #[arg(long = "load-after-ms")]
    load_after_ms: Option<u64>,
    /// Average glyph advance of installed and web faces, in em.
    #[arg(long, default_value_t = 0.62)]
    advance: f32,
    #[arg(long = "user-agent")]
    user_agent: Option<String>,
    /// Report the document as hidden (no polling measurements).
    #[arg(long)]
    hidden: bool,
    /// Write logs to this file instead of stderr.
    #[arg(long = "log-file")]
    log_file: Option<PathBuf>,
}

impl Args {
    fn descriptors(&self) -> Descriptors {
        Descriptors {
            style: self.style.clone(),
            weight: self.weight.clone(),
            stretch: self.stretch.clone(),
        }
    }
}

fn configure_logging(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let (writer, guard) = match log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let name = path
                .file_name()
                .with_context(|| format!("log file path has no file name: {}", path.display()))?;
            tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name))
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };
    match tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(writer)
        .try_init()
    {
        Ok(()) => Ok(Some(guard)),
        // Global subscriber already installed; dropping the guard shuts the writer down.
        Err(_) => Ok(None),
    }
}

fn install_panic_hook() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            tracing::error!(target: "runtime.panic", ?info, "panic");
            default_panic(info);
        }));
    });
}

/// Headless document set up as described by the arguments. Returns the
/// host and, when the family is a web font, the delay before it lands.
fn build_host(args: &Args) -> (HeadlessHost, Option<Duration>) {
    let host = HeadlessHost::new();
    host.set_native_font_loading(args.native);
    if args.hidden {
        host.set_visibility(Visibility::Hidden);
    }
    if let Some(user_agent) = &args.user_agent {
        host.set_user_agent(user_agent);
    }
    let metrics = FaceMetrics::proportional(args.advance);
    for family in &args.install {
        host.install_font(family, metrics);
    }
    let landing = args.load_after_ms.map(Duration::from_millis);
    if landing.is_some() {
        if args.install.contains(&args.family) {
            warn!(target: "runtime", family = %args.family, "web_font_already_installed");
        } else {
            host.register_web_font(&args.family, metrics);
        }
    }
    (host, landing)
}

async fn run(args: Args) -> Result<bool> {
    let config = core_config::load_from(args.config.clone())?;
    info!(
        target: "runtime",
        family = %args.family,
        config_path = ?config.path,
        native = args.native,
        "startup"
    );

    let (host, landing) = build_host(&args);
    if let Some(after) = landing {
        let host = host.clone();
        let family = args.family.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let activated = host.activate_font(&family);
            info!(target: "runtime", %family, activated, "web_font_landed");
        });
    }

    let detector = Detector::new(Arc::new(host), args.family.clone(), args.descriptors())
        .with_config(config.observer().clone());
    let timeout = args.timeout_ms.map(Duration::from_millis);
    match detector.load(args.text.as_deref(), timeout).await {
        Ok(descriptor) => {
            info!(target: "runtime", %descriptor, "font_loaded");
            Ok(true)
        }
        Err(failure) => {
            info!(target: "runtime", %failure, "font_timeout");
            Ok(false)
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let _log_guard = configure_logging(args.log_file.as_deref())?;
    install_panic_hook();

    if run(args).await? {
        println!("loaded");
        Ok(ExitCode::SUCCESS)
    } else {
        println!("timeout");
        Ok(ExitCode::from(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_host::LayoutHost;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("fontwatch").chain(argv.iter().copied())).unwrap()
    }

    #[test]
    fn parses_full_argument_set() {
        let args = parse(&[
            "Lobster",
            "--weight",
            "700",
            "--timeout-ms",
            "250",
            "--install",
            "Arial",
            "Verdana",
            "--load-after-ms",
            "40",
            "--hidden",
        ]);
        assert_eq!(args.family, "Lobster");
        assert_eq!(args.timeout_ms, Some(250));
        assert_eq!(args.install, vec!["Arial", "Verdana"]);
        assert_eq!(args.load_after_ms, Some(40));
        assert!(args.hidden);
        assert!(!args.native);
        assert_eq!(args.descriptors().weight.as_deref(), Some("700"));
        assert_eq!(args.descriptors().style, None);
    }

    #[test]
    fn family_is_required() {
        assert!(Args::try_parse_from(["fontwatch"]).is_err());
    }

    #[test]
    fn web_font_is_registered_pending() {
        let args = parse(&["Lobster", "--load-after-ms", "10", "--native"]);
        let (host, landing) = build_host(&args);
        assert_eq!(landing, Some(Duration::from_millis(10)));
        assert!(!host.is_font_active("Lobster"));
        assert!(host.supports_native_font_loading());
        assert!(host.activate_font("Lobster"));
    }

    #[test]
    fn installed_families_are_active() {
        let args = parse(&["Arial", "--install", "Arial", "--user-agent", "Test/1.0"]);
        let (host, landing) = build_host(&args);
        assert_eq!(landing, None);
        assert!(host.is_font_active("Arial"));
        assert_eq!(host.user_agent(), "Test/1.0");
    }

    #[tokio::test(start_paused = true)]
    async fn run_reports_loaded_and_timeout() {
        let missing = std::env::temp_dir().join("fontwatch-test-absent.toml");
        let config = missing.to_string_lossy().into_owned();
        let loaded = parse(&["Lobster", "--load-after-ms", "30", "--config", &config]);
        assert!(run(loaded).await.unwrap());

        let never = parse(&["Nonexistent12345", "--timeout-ms", "100", "--config", &config]);
        assert!(!run(never).await.unwrap());
    }
}
