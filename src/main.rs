use anyhow::Result;
use autoshorts::config::Config;
use autoshorts::generator::run_generation;
use autoshorts::init;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cfg = Config::from_env();

    init::ensure_directories(&cfg).await?;

    if !init::check_ffmpeg().await {
        eprintln!("[WARNING] FFmpeg not found in PATH. Please install FFmpeg.");
    }

    let code = run_generation(&cfg).await?;
    std::process::exit(code);
}
