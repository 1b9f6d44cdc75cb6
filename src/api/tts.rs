use crate::config::Config;
use crate::ffmpeg;
use crate::logw;
use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;
use tokio::fs;
use tokio::process::Command;

const NEURAL_TTS_URL: &str =
    "https://speech.platform.bing.com/consumer/speech/synthesize/readaloud/edge/v1";

const VOICE_OPTIONS: &[(&str, &[&str])] = &[
    ("en", &["en-US-JennyNeural", "en-US-GuyNeural", "en-GB-SoniaNeural"]),
    ("tr", &["tr-TR-EmelNeural", "tr-TR-AhmetNeural"]),
    ("de", &["de-DE-KatjaNeural"]),
    ("es", &["es-ES-ElviraNeural"]),
    ("fr", &["fr-FR-DeniseNeural"]),
];

/// Word boundary reported by the neural endpoint, seconds from stream start.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Mark {
    pub t0: f64,
    pub t1: f64,
}

fn pick_voice(cfg: &Config) -> String {
    let available: &[&str] = VOICE_OPTIONS
        .iter()
        .find(|(lang, _)| *lang == cfg.lang)
        .map(|(_, v)| *v)
        .unwrap_or(&["en-US-JennyNeural"]);
    if available.iter().any(|v| *v == cfg.tts_voice) {
        cfg.tts_voice.clone()
    } else {
        available[0].to_string()
    }
}

/// "+12%" → 1.12 for ffmpeg's atempo.
pub fn rate_to_atempo(rate: &str, default: f64) -> f64 {
    let trimmed = rate.trim().trim_end_matches('%');
    match trimmed.parse::<f64>() {
        Ok(pct) => (1.0 + pct / 100.0).clamp(0.5, 2.0),
        Err(_) => default,
    }
}

/// Distribute the measured narration length over the words of `text`.
/// When the endpoint gave usable marks (at least 60% of the words), their
/// durations are scaled so the sum matches `total`; otherwise every word
/// gets an even share. The last word absorbs rounding drift.
pub fn merge_marks_to_words(text: &str, marks: &[Mark], total: f64) -> Vec<(String, f64)> {
    let words: Vec<String> = text.split_whitespace().map(|w| w.to_string()).collect();
    if words.is_empty() {
        return Vec::new();
    }

    let ms: Vec<&Mark> = marks.iter().filter(|m| m.t1 > m.t0).collect();
    let mut out: Vec<(String, f64)> = Vec::new();
    if ms.len() as f64 >= words.len() as f64 * 0.6 {
        let n = words.len().min(ms.len());
        let raw: Vec<f64> = ms[..n].iter().map(|m| (m.t1 - m.t0).max(0.02)).collect();
        let sum_raw: f64 = raw.iter().sum();
        let scale = if sum_raw > 0.0 { total / sum_raw } else { 1.0 };
        for i in 0..n {
            out.push((words[i].clone(), (raw[i] * scale).max(0.05)));
        }
        let spent: f64 = out.iter().map(|(_, d)| d).sum();
        let remain = (total - spent).max(0.0);
        if words.len() > n && remain > 0.0 {
            let each = remain / (words.len() - n) as f64;
            for w in &words[n..] {
                out.push((w.clone(), each.max(0.05)));
            }
        }
    }

    if out.is_empty() {
        let each = (total / words.len() as f64).max(0.05);
        out = words.iter().map(|w| (w.clone(), each)).collect();
        let s: f64 = out.iter().map(|(_, d)| d).sum();
        if s > 0.0 && (s - total).abs() > 0.02 {
            let last = out.last_mut().unwrap();
            last.1 = (last.1 + total - s).max(0.05);
        }
    }
    out
}

#[derive(Deserialize)]
struct NeuralPayload {
    #[serde(default)]
    marks: Vec<Mark>,
}

async fn post_process(mp3: &Path, wav_out: &Path, atempo: f64, gain: u32) -> Result<()> {
    let args: Vec<String> = vec![
        "ffmpeg".into(),
        "-y".into(),
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-i".into(),
        mp3.display().to_string(),
        "-ar".into(),
        "48000".into(),
        "-ac".into(),
        "1".into(),
        "-acodec".into(),
        "pcm_s16le".into(),
        "-af".into(),
        format!("dynaudnorm=g={}:f=300,atempo={}", gain, atempo),
        wav_out.display().to_string(),
    ];
    let status = Command::new(&args[0])
        .args(&args[1..])
        .status()
        .await
        .context("TTS post-process failed")?;
    if !status.success() {
        return Err(anyhow::anyhow!("TTS post-process ffmpeg error"));
    }
    Ok(())
}

async fn neural_tts(
    client: &Client,
    cfg: &Config,
    text: &str,
    mp3: &Path,
) -> Result<Vec<Mark>> {
    let voice = pick_voice(cfg);
    let ssml = format!(
        "<speak version='1.0' xml:lang='{lang}'><voice name='{voice}'>\
         <prosody rate='{rate}'>{text}</prosody></voice></speak>",
        lang = cfg.lang,
        voice = voice,
        rate = cfg.tts_rate,
        text = text
            .replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;"),
    );
    let resp = client
        .post(NEURAL_TTS_URL)
        .header("Content-Type", "application/ssml+xml")
        .header("X-Microsoft-OutputFormat", "audio-48khz-96kbitrate-mono-mp3")
        .body(ssml)
        .timeout(std::time::Duration::from_secs(60))
        .send()
        .await
        .context("Neural TTS request failed")?;

    if !resp.status().is_success() {
        anyhow::bail!("Neural TTS HTTP {}", resp.status().as_u16());
    }

    let marks = resp
        .headers()
        .get("x-word-boundaries")
        .and_then(|h| h.to_str().ok())
        .and_then(|raw| serde_json::from_str::<NeuralPayload>(raw).ok())
        .map(|p| p.marks)
        .unwrap_or_default();

    let bytes = resp.bytes().await.context("Neural TTS read failed")?;
    if bytes.len() < 1024 {
        anyhow::bail!("Neural TTS returned a suspiciously small payload");
    }
    fs::write(mp3, &bytes).await?;
    Ok(marks)
}

async fn translate_tts(client: &Client, cfg: &Config, text: &str, mp3: &Path) -> Result<()> {
    let q = text.replace(['"', '\''], "");
    let url = format!(
        "https://translate.google.com/translate_tts?ie=UTF-8&q={}&tl={}&client=tw-ob&ttsspeed=1.0",
        urlencoding::encode(&q),
        cfg.lang
    );
    let resp = client
        .get(&url)
        .header("User-Agent", "Mozilla/5.0")
        .timeout(std::time::Duration::from_secs(30))
        .send()
        .await
        .context("Translate TTS request failed")?;
    if !resp.status().is_success() {
        anyhow::bail!("Translate TTS HTTP {}", resp.status().as_u16());
    }
    let bytes = resp.bytes().await.context("Translate TTS read failed")?;
    fs::write(mp3, &bytes).await?;
    Ok(())
}

/// Synthesize one scene: neural endpoint with word marks, translate-tts
/// without marks, then a 4 s silence so the pipeline never stalls on a TTS
/// outage. Empty text yields 1 s of silence.
pub async fn synthesize(
    client: &Client,
    cfg: &Config,
    text: &str,
    wav_out: &Path,
) -> Result<(f64, Vec<(String, f64)>)> {
    let text = text.trim();
    if text.is_empty() {
        ffmpeg::make_silence_wav(wav_out, 1.0).await?;
        return Ok((1.0, Vec::new()));
    }

    let mp3 = wav_out.with_extension("mp3");
    let atempo = rate_to_atempo(&cfg.tts_rate, 1.12);

    match neural_tts(client, cfg, text, &mp3).await {
        Ok(marks) => {
            post_process(&mp3, wav_out, atempo, 7).await?;
            let _ = fs::remove_file(&mp3).await;
            let dur = ffmpeg::ffprobe_duration_seconds(wav_out).await.unwrap_or(0.0);
            return Ok((dur, merge_marks_to_words(text, &marks, dur)));
        }
        Err(err) => logw(format!("Neural TTS failed: {}", err)),
    }

    match translate_tts(client, cfg, text, &mp3).await {
        Ok(()) => {
            post_process(&mp3, wav_out, atempo, 6).await?;
            let _ = fs::remove_file(&mp3).await;
            let dur = ffmpeg::ffprobe_duration_seconds(wav_out).await.unwrap_or(0.0);
            return Ok((dur, merge_marks_to_words(text, &[], dur)));
        }
        Err(err) => logw(format!("Translate TTS failed: {}", err)),
    }

    logw("All TTS tiers failed, emitting silence");
    ffmpeg::make_silence_wav(wav_out, 4.0).await?;
    Ok((4.0, Vec::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn total(words: &[(String, f64)]) -> f64 {
        words.iter().map(|(_, d)| d).sum()
    }

    #[test]
    fn even_split_without_marks() {
        let out = merge_marks_to_words("one two three four", &[], 2.0);
        assert_eq!(out.len(), 4);
        for (_, d) in &out {
            assert!((d - 0.5).abs() < 1e-9);
        }
    }

    #[test]
    fn marks_are_scaled_to_the_measured_total() {
        let marks = vec![
            Mark { t0: 0.0, t1: 0.2 },
            Mark { t0: 0.2, t1: 0.6 },
            Mark { t0: 0.6, t1: 0.8 },
        ];
        let out = merge_marks_to_words("fast slower fast", &marks, 1.6);
        assert_eq!(out.len(), 3);
        // Durations doubled: source sum 0.8, measured 1.6.
        assert!((out[0].1 - 0.4).abs() < 1e-9);
        assert!((out[1].1 - 0.8).abs() < 1e-9);
        assert!((total(&out) - 1.6).abs() < 1e-6);
    }

    #[test]
    fn sparse_marks_fall_back_to_even_split() {
        let marks = vec![Mark { t0: 0.0, t1: 0.2 }];
        let out = merge_marks_to_words("a b c d e f", &marks, 3.0);
        assert_eq!(out.len(), 6);
        assert!((total(&out) - 3.0).abs() < 0.03);
    }

    #[test]
    fn last_word_absorbs_drift() {
        let out = merge_marks_to_words("x y z", &[], 1.0);
        assert!((total(&out) - 1.0).abs() < 0.03);
    }

    #[test]
    fn empty_text_yields_no_words() {
        assert!(merge_marks_to_words("", &[], 2.0).is_empty());
    }

    #[test]
    fn rate_strings_map_to_atempo() {
        assert!((rate_to_atempo("+12%", 1.0) - 1.12).abs() < 1e-9);
        assert!((rate_to_atempo("-10%", 1.0) - 0.9).abs() < 1e-9);
        assert!((rate_to_atempo("junk", 1.12) - 1.12).abs() < 1e-9);
    }
}
