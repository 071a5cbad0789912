use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use parking_lot::RwLock;
use tracing::info;

use signsense::camera::{CameraProvider, NokhwaProvider, SyntheticProvider};
use signsense::classifier::{GestureClassifier, OnnxGestureClassifier};
use signsense::config::SignsenseConfig;
use signsense::interpreter::InterpreterApp;
use signsense::prefs::UserPreferences;

#[derive(Parser)]
#[command(name = "signsense")]
#[command(about = "Real-time sign language gesture interpreter")]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Camera device index
    #[arg(short = 'd', long)]
    camera_device: Option<u32>,

    /// Spoken-translation language (en, es, fr, de, ja, zh, ar, hi)
    #[arg(short, long)]
    language: Option<String>,

    /// Speak each detected phrase as it is published
    #[arg(long)]
    auto_speak: bool,

    /// Run against a synthetic frame source instead of camera hardware
    #[arg(long)]
    simulate: bool,

    /// List detected camera devices and exit
    #[arg(long)]
    list_cameras: bool,

    /// Load the gesture model, print its labels, and exit
    #[arg(long)]
    check_model: bool,

    /// Stop automatically after this many seconds
    #[arg(long)]
    duration: Option<u64>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(format!("signsense={log_level}"))
        .try_init();

    info!("Starting signsense - real-time gesture interpreter");

    if args.list_cameras {
        let cameras = NokhwaProvider::detect_cameras();
        if cameras.is_empty() {
            println!("No cameras detected");
        } else {
            for index in cameras {
                println!("camera {index}");
            }
        }
        return Ok(());
    }

    // Load configuration
    let mut config = SignsenseConfig::load(&args.config).await?;
    info!("Configuration loaded successfully");
    if let Some(device) = args.camera_device {
        config.camera.device_index = device;
    }

    // The classifier is loaded exactly once here and shared read-only for
    // the lifetime of the process.
    let classifier: Arc<dyn GestureClassifier> =
        Arc::new(OnnxGestureClassifier::load(&config.classifier).await?);
    info!("Gesture model ready with {} labels", classifier.labels().len());

    if args.check_model {
        for label in classifier.labels() {
            println!("{label}");
        }
        return Ok(());
    }

    let mut prefs = UserPreferences::default();
    if let Some(language) = &args.language {
        prefs.set_language(language)?;
    }
    if args.auto_speak {
        prefs.auto_speak = true;
    }
    let prefs = Arc::new(RwLock::new(prefs));

    let provider: Box<dyn CameraProvider> = if args.simulate {
        Box::new(SyntheticProvider)
    } else {
        Box::new(NokhwaProvider)
    };

    let mut app = InterpreterApp::new(classifier, provider, &config, prefs);
    app.run(args.duration.map(Duration::from_secs)).await
}
