use crate::logw;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Render parameters shared by every video-producing call.
#[derive(Debug, Clone, Copy)]
pub struct RenderOpts {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub crf: u32,
}

async fn run_cmd(args: &[String]) -> Result<()> {
    if args.is_empty() {
        return Ok(());
    }

    let mut cmd = Command::new(&args[0]);
    if args.len() > 1 {
        cmd.args(&args[1..]);
    }

    let status = cmd.status().await.context("Command execution failed")?;
    if !status.success() {
        return Err(anyhow::anyhow!("Command failed: {:?}", args));
    }

    Ok(())
}

fn ff_base() -> Vec<String> {
    vec![
        "ffmpeg".to_string(),
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
    ]
}

pub async fn ffprobe_duration_seconds(path: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .await
        .context("ffprobe duration failed")?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("ffprobe failed"));
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let duration = text.parse::<f64>().unwrap_or(-1.0);
    if duration <= 0.05 {
        return Err(anyhow::anyhow!("Invalid duration"));
    }
    Ok(duration)
}

/// True when this ffmpeg build lists the given filter.
pub async fn has_filter(name: &str) -> bool {
    let output = Command::new("ffmpeg")
        .args(["-hide_banner", "-filters"])
        .output()
        .await;
    match output {
        Ok(out) => String::from_utf8_lossy(&out.stdout)
            .lines()
            .any(|l| l.split_whitespace().nth(1) == Some(name)),
        Err(_) => false,
    }
}

/// First available bold sans font for ASS styling.
pub fn font_path() -> Option<PathBuf> {
    const CANDIDATES: &[&str] = &[
        "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
        "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
        "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
        "C:/Windows/Fonts/arialbd.ttf",
    ];
    CANDIDATES.iter().map(PathBuf::from).find(|p| p.exists())
}

/// The subtitles filter parses its argument, so backslashes and drive
/// colons must be escaped.
fn ff_sanitize_path(p: &Path) -> String {
    p.display().to_string().replace('\\', "/").replace(':', "\\:")
}

fn ass_time(mut s: f64) -> String {
    let h = (s / 3600.0) as u32;
    s -= h as f64 * 3600.0;
    let m = (s / 60.0) as u32;
    s -= m as f64 * 60.0;
    format!("{}:{:02}:{:05.2}", h, m, s)
}

fn ass_color(hex: &str) -> String {
    let c = hex.trim_start_matches('#');
    let c = if c.len() == 6 { c } else { "FFFFFF" };
    format!("&H00{}{}{}", &c[4..6], &c[2..4], &c[0..2])
}

pub fn quantized_fade(qdur: f64) -> f64 {
    (qdur / 8.0).clamp(0.08, 0.22)
}

/// Normalize one stock clip into a uniform timeline segment: loop the source
/// to cover the shot, scale to cover and center-crop, light color touch,
/// constant fps, fades scaled to an eighth of the shot, no audio.
pub async fn make_segment(
    src: &Path,
    duration: f64,
    out: &Path,
    opts: &RenderOpts,
) -> Result<bool> {
    if duration <= 0.05 {
        return Ok(false);
    }
    let fade = quantized_fade(duration);
    let fade_out_st = (duration - fade).max(0.0);
    let vf = format!(
        "scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},\
         eq=brightness=0.02:contrast=1.08:saturation=1.1,\
         fps={fps},setpts=N/{fps}/TB,\
         fade=t=in:st=0:d={fin:.2},fade=t=out:st={fst:.2}:d={fin:.2}",
        w = opts.width,
        h = opts.height,
        fps = opts.fps,
        fin = fade,
        fst = fade_out_st
    );
    let mut args = ff_base();
    args.extend([
        "-stream_loop".to_string(),
        "-1".to_string(),
        "-t".to_string(),
        format!("{:.3}", duration),
        "-i".to_string(),
        src.display().to_string(),
        "-vf".to_string(),
        vf,
        "-r".to_string(),
        opts.fps.to_string(),
        "-vsync".to_string(),
        "cfr".to_string(),
        "-an".to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "fast".to_string(),
        "-crf".to_string(),
        opts.crf.to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        out.display().to_string(),
    ]);
    if let Err(err) = run_cmd(&args).await {
        logw(format!("Segment render failed for {}: {}", src.display(), err));
        return Ok(false);
    }
    Ok(out.exists())
}

/// Join segments with the filter-graph concat method. Each input is fps and
/// timebase normalized first, which survives mixed-source segments where the
/// demuxer method drops frames.
pub async fn concat_videos_filter(files: &[PathBuf], out: &Path, opts: &RenderOpts) -> Result<()> {
    if files.is_empty() {
        anyhow::bail!("Video concat: empty file list");
    }
    let mut args = ff_base();
    let mut filters: Vec<String> = Vec::new();
    for (i, p) in files.iter().enumerate() {
        args.push("-i".to_string());
        args.push(p.display().to_string());
        filters.push(format!(
            "[{i}:v]fps={fps},settb=AVTB,setpts=N/{fps}/TB[v{i}]",
            i = i,
            fps = opts.fps
        ));
    }
    let labels: String = (0..files.len()).map(|i| format!("[v{}]", i)).collect();
    let graph = format!(
        "{};{}concat=n={}:v=1:a=0[v]",
        filters.join(";"),
        labels,
        files.len()
    );
    args.extend([
        "-filter_complex".to_string(),
        graph,
        "-map".to_string(),
        "[v]".to_string(),
        "-r".to_string(),
        opts.fps.to_string(),
        "-vsync".to_string(),
        "cfr".to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "medium".to_string(),
        "-crf".to_string(),
        opts.crf.to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        out.display().to_string(),
    ]);
    run_cmd(&args).await
}

pub async fn make_silence_wav(out: &Path, duration: f64) -> Result<()> {
    let mut args = ff_base();
    args.extend([
        "-f".to_string(),
        "lavfi".to_string(),
        "-t".to_string(),
        format!("{:.3}", duration.max(0.05)),
        "-i".to_string(),
        "anullsrc=r=48000:cl=mono".to_string(),
        out.display().to_string(),
    ]);
    run_cmd(&args).await
}

/// Build the narration track: each scene wav followed by a fixed silence gap
/// (none after the last), joined by the concat demuxer into 48 kHz mono pcm.
/// Returns the probed duration of the result.
pub async fn build_audio_with_gaps(
    scene_wavs: &[PathBuf],
    gap_secs: f64,
    out_wav: &Path,
) -> Result<f64> {
    if scene_wavs.is_empty() {
        anyhow::bail!("Audio concat: empty file list");
    }
    let gap = gap_secs.clamp(0.2, 0.8);
    let gap_wav = out_wav.with_extension("gap.wav");
    make_silence_wav(&gap_wav, gap).await?;

    let list_txt = out_wav.with_extension("txt");
    let mut list = String::new();
    for (i, p) in scene_wavs.iter().enumerate() {
        list.push_str(&format!("file '{}'\n", p.display()));
        if i + 1 < scene_wavs.len() {
            list.push_str(&format!("file '{}'\n", gap_wav.display()));
        }
    }
    tokio::fs::write(&list_txt, list)
        .await
        .context("Write narration concat list failed")?;

    let mut args = ff_base();
    args.extend([
        "-f".to_string(),
        "concat".to_string(),
        "-safe".to_string(),
        "0".to_string(),
        "-i".to_string(),
        list_txt.display().to_string(),
        "-ar".to_string(),
        "48000".to_string(),
        "-ac".to_string(),
        "1".to_string(),
        "-c:a".to_string(),
        "pcm_s16le".to_string(),
        out_wav.display().to_string(),
    ]);
    run_cmd(&args).await?;
    let _ = tokio::fs::remove_file(&list_txt).await;
    let _ = tokio::fs::remove_file(&gap_wav).await;

    ffprobe_duration_seconds(out_wav).await
}

/// Append a last-frame clone so the video reaches the narration length.
pub async fn pad_video_tail(
    video_in: &Path,
    pad_secs: f64,
    out: &Path,
    opts: &RenderOpts,
) -> Result<()> {
    let mut args = ff_base();
    args.extend([
        "-i".to_string(),
        video_in.display().to_string(),
        "-filter_complex".to_string(),
        format!(
            "[0:v]tpad=stop_mode=clone:stop_duration={:.3},fps={fps},setpts=N/{fps}/TB[v]",
            pad_secs,
            fps = opts.fps
        ),
        "-map".to_string(),
        "[v]".to_string(),
        "-r".to_string(),
        opts.fps.to_string(),
        "-vsync".to_string(),
        "cfr".to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "medium".to_string(),
        "-crf".to_string(),
        opts.crf.to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        out.display().to_string(),
    ]);
    run_cmd(&args).await
}

/// Trim the video on the frame counter to exactly `target_frames`.
pub async fn enforce_exact_frames(
    video_in: &Path,
    target_frames: u64,
    out: &Path,
    opts: &RenderOpts,
) -> Result<()> {
    let target_frames = target_frames.max(2);
    let vf = format!(
        "fps={fps},setpts=N/{fps}/TB,trim=start_frame=0:end_frame={}",
        target_frames,
        fps = opts.fps
    );
    let mut args = ff_base();
    args.extend([
        "-i".to_string(),
        video_in.display().to_string(),
        "-vf".to_string(),
        vf,
        "-r".to_string(),
        opts.fps.to_string(),
        "-vsync".to_string(),
        "cfr".to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "medium".to_string(),
        "-crf".to_string(),
        opts.crf.to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        out.display().to_string(),
    ]);
    run_cmd(&args).await
}

/// Trim the narration to exactly `target_frames / fps` seconds.
pub async fn lock_audio_duration(
    audio_in: &Path,
    target_frames: u64,
    out: &Path,
    fps: u32,
) -> Result<()> {
    let dur = target_frames.max(2) as f64 / fps.max(1) as f64;
    let mut args = ff_base();
    args.extend([
        "-i".to_string(),
        audio_in.display().to_string(),
        "-af".to_string(),
        format!("atrim=end={:.6},asetpts=N/SR/TB", dur),
        "-ar".to_string(),
        "48000".to_string(),
        "-ac".to_string(),
        "1".to_string(),
        "-c:a".to_string(),
        "pcm_s16le".to_string(),
        out.display().to_string(),
    ]);
    run_cmd(&args).await
}

/// Final mux: locked video copied untouched, narration encoded to aac.
pub async fn mux(video: &Path, audio: &Path, out: &Path) -> Result<()> {
    let mut args = ff_base();
    args.extend([
        "-i".to_string(),
        video.display().to_string(),
        "-i".to_string(),
        audio.display().to_string(),
        "-map".to_string(),
        "0:v:0".to_string(),
        "-map".to_string(),
        "1:a:0".to_string(),
        "-c:v".to_string(),
        "copy".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        "256k".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        "-muxpreload".to_string(),
        "0".to_string(),
        "-muxdelay".to_string(),
        "0".to_string(),
        "-avoid_negative_ts".to_string(),
        "make_zero".to_string(),
        out.display().to_string(),
    ]);
    run_cmd(&args).await
}

/// Loudness-normalize the music bed, loop it under the whole narration, and
/// fold it to mono with gentle edge fades.
pub async fn loop_bgm(src: &Path, duration: f64, fade: f64, out_wav: &Path) -> Result<()> {
    let fade = fade.max(0.3);
    let end_st = (duration - fade).max(0.0);
    let mut args = ff_base();
    args.extend([
        "-stream_loop".to_string(),
        "-1".to_string(),
        "-t".to_string(),
        format!("{:.3}", duration),
        "-i".to_string(),
        src.display().to_string(),
        "-af".to_string(),
        format!(
            "loudnorm=I=-21:TP=-2.0:LRA=11,afade=t=in:st=0:d={:.2},afade=t=out:st={:.2}:d={:.2},\
             aresample=48000,pan=mono|c0=0.5*FL+0.5*FR",
            fade, end_st, fade
        ),
        "-ar".to_string(),
        "48000".to_string(),
        "-ac".to_string(),
        "1".to_string(),
        "-c:a".to_string(),
        "pcm_s16le".to_string(),
        out_wav.display().to_string(),
    ]);
    run_cmd(&args).await
}

/// Mix the music bed under the narration. Ducking via sidechaincompress when
/// the build has it, plain amix otherwise; a limiter caps the sum either way.
pub async fn duck_and_mix(
    voice: &Path,
    bgm: &Path,
    out_wav: &Path,
    gain_db: f64,
    duck_available: bool,
) -> Result<()> {
    let graph = if duck_available {
        format!(
            "[1:a]volume={g:.1}dB[b];\
             [b][0:a]sidechaincompress=threshold=0.05:ratio=8:attack=20:release=300:makeup=1.0:level_in=1.0:level_sc=1.0[duck];\
             [0:a][duck]amix=inputs=2:duration=shortest,aresample=48000,alimiter=limit=0.98[mix]",
            g = gain_db
        )
    } else {
        format!(
            "[1:a]volume={g:.1}dB[b];\
             [0:a][b]amix=inputs=2:duration=shortest,aresample=48000,alimiter=limit=0.98[mix]",
            g = gain_db
        )
    };
    let mut args = ff_base();
    args.extend([
        "-i".to_string(),
        voice.display().to_string(),
        "-i".to_string(),
        bgm.display().to_string(),
        "-filter_complex".to_string(),
        graph,
        "-map".to_string(),
        "[mix]".to_string(),
        "-ar".to_string(),
        "48000".to_string(),
        "-ac".to_string(),
        "1".to_string(),
        "-c:a".to_string(),
        "pcm_s16le".to_string(),
        out_wav.display().to_string(),
    ]);
    run_cmd(&args).await
}

fn ass_header(width: u32, height: u32) -> String {
    format!(
        "[Script Info]\nScriptType: v4.00+\nPlayResX: {}\nPlayResY: {}\n\n[V4+ Styles]\n\
         Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, BackColour, \
         Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, BorderStyle, Outline, \
         Shadow, Alignment, MarginL, MarginR, MarginV, Encoding\n",
        width, height
    )
}

fn font_name(font: Option<&Path>) -> String {
    font.and_then(|p| p.file_stem())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "DejaVu Sans".to_string())
}

pub async fn burn_ass(
    video_in: &Path,
    ass: &str,
    out: &Path,
    opts: &RenderOpts,
) -> Result<()> {
    let ass_path = out.with_extension("ass");
    tokio::fs::write(&ass_path, ass)
        .await
        .context("Write ASS overlay failed")?;
    let tmp_out = out.with_extension("tmp.mp4");

    let vdur = ffprobe_duration_seconds(video_in).await?;
    let mut args = ff_base();
    args.extend([
        "-i".to_string(),
        video_in.display().to_string(),
        "-vf".to_string(),
        format!("subtitles='{}'", ff_sanitize_path(&ass_path)),
        "-r".to_string(),
        opts.fps.to_string(),
        "-vsync".to_string(),
        "cfr".to_string(),
        "-an".to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "medium".to_string(),
        "-crf".to_string(),
        opts.crf.to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        tmp_out.display().to_string(),
    ]);
    let res = run_cmd(&args).await;
    let _ = tokio::fs::remove_file(&ass_path).await;
    res?;

    // The burn re-times the stream; snap it back to the source frame count.
    let frames = ((vdur * opts.fps as f64).round() as u64).max(2);
    let res = enforce_exact_frames(&tmp_out, frames, out, opts).await;
    let _ = tokio::fs::remove_file(&tmp_out).await;
    res
}

/// Burn a title card and a keyline onto the opening of one segment. Failures
/// leave the plain segment in place.
pub async fn overlay_scene_labels(
    seg_in: &Path,
    title: &str,
    keyline: &str,
    out: &Path,
    card_sec: f64,
    keyline_sec: f64,
    font: Option<&Path>,
    opts: &RenderOpts,
) -> Result<bool> {
    let vdur = match ffprobe_duration_seconds(seg_in).await {
        Ok(d) => d,
        Err(_) => return Ok(false),
    };
    let title: String = crate::text::clean_caption_text(title)
        .to_uppercase()
        .chars()
        .take(70)
        .collect();
    let keyline: String = crate::text::clean_caption_text(keyline).chars().take(90).collect();

    let card_dur = card_sec.max(1.4).min((vdur * 0.6).max(1.8));
    let key_dur = keyline_sec.max(1.2).min((vdur * 0.5).max(1.6));
    let landscape = opts.width > opts.height;
    let fs_title = if landscape { 56 } else { 64 };
    let fs_key = ((fs_title as f64 * 0.64) as u32).max(34);
    let margin_title = (opts.height as f64 * 0.12) as u32;
    let margin_key = opts.height - (opts.height as f64 * 0.20) as u32;
    let outline = 4;
    let fname = font_name(font);

    let mut ass = ass_header(opts.width, opts.height);
    ass.push_str(&format!(
        "Style: Title,{},{},{},&H00FFFFFF,&H00000000,&H7F000000,1,0,0,0,100,100,0,0,1,{},0,8,50,50,{},0\n",
        fname, fs_title, ass_color("#FFFFFF"), outline, margin_title
    ));
    ass.push_str(&format!(
        "Style: Key,{},{},{},&H00FFFFFF,&H00000000,&H7F000000,1,0,0,0,100,100,0,0,1,{},0,2,50,50,{},0\n",
        fname, fs_key, ass_color("#FFD700"), outline - 1, margin_key
    ));
    ass.push_str("\n[Events]\nFormat: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\n");
    ass.push_str(&format!(
        "Dialogue: 0,0:00:00.00,{},Title,,0,0,{},,{{\\bord{}\\shad0}}{}\n",
        ass_time(card_dur), margin_title, outline, title
    ));
    ass.push_str(&format!(
        "Dialogue: 0,0:00:00.00,{},Key,,0,0,{},,{{\\bord{}\\shad0}}{}\n",
        ass_time(key_dur), margin_key, outline - 1, keyline
    ));

    if let Err(err) = burn_ass(seg_in, &ass, out, opts).await {
        logw(format!("Scene label overlay failed: {}", err));
        return Ok(false);
    }
    Ok(out.exists())
}

/// Burn the call-to-action card over the final seconds of the video.
pub async fn overlay_cta_tail(
    video_in: &Path,
    text: &str,
    out: &Path,
    show_sec: f64,
    font: Option<&Path>,
    opts: &RenderOpts,
) -> Result<bool> {
    let vdur = match ffprobe_duration_seconds(video_in).await {
        Ok(d) => d,
        Err(_) => return Ok(false),
    };
    if text.trim().is_empty() {
        return Ok(false);
    }
    let start = (vdur - show_sec.max(0.8)).max(0.0);
    let landscape = opts.width > opts.height;
    let fontsize = if landscape { 50 } else { 56 };
    let margin_v = (opts.height as f64 * if landscape { 0.18 } else { 0.22 }) as u32;
    let outline = 4;
    let body = crate::text::wrap_mobile_lines(&text.to_uppercase(), 26, 3).replace('\n', "\\N");

    let mut ass = ass_header(opts.width, opts.height);
    ass.push_str(&format!(
        "Style: CTA,{},{},{},&H00FFFFFF,&H00000000,&H7F000000,1,0,0,0,100,100,0,0,1,{},0,2,50,50,{},0\n",
        font_name(font), fontsize, ass_color("#3EA6FF"), outline, margin_v
    ));
    ass.push_str("\n[Events]\nFormat: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\n");
    ass.push_str(&format!(
        "Dialogue: 0,{},{},CTA,,0,0,{},,{{\\bord{}\\shad0}}{}\n",
        ass_time(start), ass_time(vdur), margin_v, outline, body
    ));

    if let Err(err) = burn_ass(video_in, &ass, out, opts).await {
        logw(format!("CTA overlay failed: {}", err));
        return Ok(false);
    }
    Ok(out.exists())
}

/// One narrated scene with word-level timings, for karaoke captions.
pub struct KaraokeScene {
    pub start: f64,
    pub words: Vec<(String, f64)>,
}

/// Whole-video karaoke track: one Dialogue line per scene, each word
/// carrying a `\k` centisecond tag from its measured duration.
pub fn build_karaoke_ass(scenes: &[KaraokeScene], font: Option<&Path>, opts: &RenderOpts) -> String {
    let landscape = opts.width > opts.height;
    let fontsize = if landscape { 52 } else { 60 };
    let margin_v = (opts.height as f64 * if landscape { 0.14 } else { 0.18 }) as u32;
    let outline = 4;

    let mut ass = ass_header(opts.width, opts.height);
    ass.push_str(&format!(
        "Style: Kara,{},{},{},{},&H00000000,&H7F000000,1,0,0,0,100,100,0,0,1,{},0,2,50,50,{},0\n",
        font_name(font),
        fontsize,
        ass_color("#FFFFFF"),
        ass_color("#FFD700"),
        outline,
        margin_v
    ));
    ass.push_str("\n[Events]\nFormat: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\n");
    for scene in scenes {
        if scene.words.is_empty() {
            continue;
        }
        let total: f64 = scene.words.iter().map(|(_, d)| d).sum();
        let mut body = String::new();
        for (w, d) in &scene.words {
            body.push_str(&format!("{{\\k{}}}{} ", (d * 100.0).round() as u32, w));
        }
        ass.push_str(&format!(
            "Dialogue: 0,{},{},Kara,,0,0,{},,{{\\bord{}\\shad0}}{}\n",
            ass_time(scene.start),
            ass_time(scene.start + total),
            margin_v,
            outline,
            body.trim_end()
        ));
    }
    ass
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn karaoke_track_has_one_line_per_voiced_scene() {
        let opts = RenderOpts { width: 1080, height: 1920, fps: 30, crf: 22 };
        let scenes = vec![
            KaraokeScene {
                start: 0.0,
                words: vec![("hello".into(), 0.5), ("world".into(), 0.5)],
            },
            KaraokeScene { start: 1.45, words: vec![] },
            KaraokeScene { start: 1.45, words: vec![("again".into(), 0.8)] },
        ];
        let ass = build_karaoke_ass(&scenes, None, &opts);
        assert_eq!(ass.matches("Dialogue:").count(), 2);
        assert!(ass.contains("{\\k50}hello"));
        assert!(ass.contains("0:00:01.45"));
    }

    #[test]
    fn ass_time_formats_hours_minutes_centiseconds() {
        assert_eq!(ass_time(0.0), "0:00:00.00");
        assert_eq!(ass_time(65.5), "0:01:05.50");
        assert_eq!(ass_time(3723.25), "1:02:03.25");
    }

    #[test]
    fn ass_color_is_bgr_with_alpha_prefix() {
        assert_eq!(ass_color("#FFD700"), "&H0000D7FF");
        assert_eq!(ass_color("bogus"), "&H00FFFFFF");
    }

    #[test]
    fn fades_scale_with_shot_length_within_bounds() {
        assert!((quantized_fade(0.4) - 0.08).abs() < 1e-9);
        assert!((quantized_fade(1.2) - 0.15).abs() < 1e-9);
        assert!((quantized_fade(60.0) - 0.22).abs() < 1e-9);
    }

    #[test]
    fn subtitle_paths_escape_colons() {
        let p = PathBuf::from("C:\\work\\label.ass");
        assert_eq!(ff_sanitize_path(&p), "C\\:/work/label.ass");
    }
}
