use clap::Parser;
use diplomarec_api::RestApi;
use diplomarec_engine::{CsvSource, EngineConfig, RecommendationEngine};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Graph-embedding diploma recommender
#[derive(Parser, Debug)]
#[command(name = "diplomarec")]
#[command(about = "Recommend higher-education programs from a student profile", long_about = None)]
struct Args {
    /// CSV export of the program catalog
    #[arg(short, long, default_value = "./data/programs.csv")]
    data: PathBuf,

    /// Where trained model weights are stored
    #[arg(short, long, default_value = "./data/model.bin")]
    model: PathBuf,

    /// HTTP API port
    #[arg(long, default_value_t = 8000)]
    port: u16,

    /// Recommendations returned per request
    #[arg(long, default_value_t = 10)]
    top_k: usize,

    /// Cosine similarity above which two programs are linked
    #[arg(long, default_value_t = 0.7)]
    threshold: f32,

    /// Training epochs
    #[arg(long, default_value_t = 10)]
    epochs: usize,

    /// Abort a training run after this many seconds
    #[arg(long)]
    train_timeout: Option<u64>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting diplomarec v{}", env!("CARGO_PKG_VERSION"));
    info!("Program data: {:?}", args.data);
    info!("Model file: {:?}", args.model);
    info!("HTTP API port: {}", args.port);

    let mut config = EngineConfig::default()
        .with_model_path(&args.model)
        .with_threshold(args.threshold)
        .with_top_k(args.top_k)
        .with_epochs(args.epochs);
    if let Some(secs) = args.train_timeout {
        config = config.with_train_timeout(Duration::from_secs(secs));
    }

    let source = Arc::new(CsvSource::new(&args.data));
    let engine = Arc::new(RecommendationEngine::unloaded(source, config)?);

    let engine_http = engine.clone();
    let port = args.port;
    let http_handle = std::thread::spawn(move || {
        info!("Starting HTTP server on port {}", port);
        let sys = actix_web::rt::System::new();
        sys.block_on(async {
            if let Err(e) = RestApi::start(engine_http, port).await {
                eprintln!("HTTP server error: {}", e);
            }
        })
    });

    let engine_load = engine.clone();
    tokio::task::spawn_blocking(move || engine_load.load()).await??;
    info!("Engine initialized");

    info!("diplomarec started successfully");
    info!("HTTP API: http://localhost:{}/api/recommend", args.port);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
        _ = tokio::task::spawn_blocking(move || {
            http_handle.join().ok();
        }) => {
            info!("HTTP server stopped");
        }
    }

    info!("Shutting down...");
    Ok(())
}
