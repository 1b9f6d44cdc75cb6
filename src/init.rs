use crate::config::Config;
use anyhow::Result;
use std::path::Path;
use tokio::fs;

pub async fn ensure_directories(cfg: &Config) -> Result<()> {
    for dir in [cfg.out_dir.as_str(), cfg.bgm_dir.as_str()] {
        if !dir.is_empty() && !Path::new(dir).exists() {
            fs::create_dir_all(dir).await?;
            eprintln!("[INFO] Created directory: {}", dir);
        }
    }
    Ok(())
}

pub async fn check_ffmpeg() -> bool {
    for tool in ["ffmpeg", "ffprobe"] {
        let ok = match tokio::process::Command::new(tool)
            .arg("-version")
            .output()
            .await
        {
            Ok(output) => output.status.success(),
            Err(_) => false,
        };
        if !ok {
            return false;
        }
    }
    true
}
