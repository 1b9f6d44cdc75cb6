pub mod api;
pub mod avlock;
pub mod config;
pub mod ffmpeg;
pub mod generator;
pub mod init;
pub mod novelty;
pub mod pool;
pub mod queries;
pub mod schedule;
pub mod state;
pub mod text;

pub(crate) fn logv(tag: &str, message: &str) {
    eprintln!("[{}] {}", tag, message);
}

pub(crate) fn logi(message: impl AsRef<str>) {
    logv("INFO", message.as_ref());
}

pub(crate) fn logok(message: impl AsRef<str>) {
    logv("OK", message.as_ref());
}

pub(crate) fn logw(message: impl AsRef<str>) {
    logv("WARN", message.as_ref());
}
