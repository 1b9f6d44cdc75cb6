use crate::api::{gemini, tts, youtube};
use crate::config::{CaptionMode, Config, ScheduleMode};
use crate::ffmpeg::{self, RenderOpts};
use crate::novelty::{
    self, AttemptMachine, ScriptCandidate, Verdict,
};
use crate::pool::{self, StockProvider};
use crate::schedule;
use crate::state::{hash12, NoveltyStore};
use crate::text::{self, SceneMeta};
use crate::{logi, logok, logw};
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use regex::Regex;
use reqwest::Client;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::fs;

static SAFE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9]+").unwrap());

fn now_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

struct SceneTrack {
    meta: SceneMeta,
    words: Vec<(String, f64)>,
    wav: PathBuf,
}

async fn build_script(
    client: &Client,
    cfg: &Config,
    store: &NoveltyStore,
) -> Result<ScriptCandidate> {
    let topic_lock = if cfg.topic.is_empty() {
        "Interesting Visual Explainers".to_string()
    } else {
        cfg.topic.clone()
    };
    let user_terms = cfg.search_terms.clone();
    let initial_bans = store.recent_topics_for_prompt(15).await;
    let mut machine = AttemptMachine::new(cfg.novelty_retries, initial_bans);

    loop {
        let plan = if cfg.use_gemini && !cfg.gemini_api_key.is_empty() {
            match gemini::generate_script(client, cfg, &topic_lock, &user_terms, &machine.ban_list)
                .await
            {
                Ok(p) => p,
                Err(err) => {
                    logw(format!("Gemini error: {}", err));
                    gemini::fallback_plan(&topic_lock, &user_terms)
                }
            }
        } else {
            gemini::fallback_plan(&topic_lock, &user_terms)
        };

        let sentences = text::polish_hook_cta(&plan.sentences);
        let candidate = ScriptCandidate {
            topic: plan.topic,
            sentences,
            search_terms: plan.search_terms,
            title: plan.title,
            description: plan.description,
            tags: plan.tags,
        };

        let verdict_input = if cfg.novelty_enforce {
            let fp = novelty::sentences_fingerprint(&candidate.sentences);
            let recent = store.recent_fingerprints(cfg.novelty_window).await;
            novelty::novelty_ok(&fp, &recent, cfg.novelty_jaccard_max)
        } else {
            (true, Vec::new())
        };

        let cooling = if cfg.entity_cooldown_days > 0 {
            let ent = novelty::derive_focus_entity(&candidate.topic, &candidate.sentences);
            let key = novelty::entity_key(&cfg.mode, &ent);
            if !ent.is_empty() && store.entity_in_cooldown(&key, cfg.entity_cooldown_days).await {
                Some(ent)
            } else {
                None
            }
        } else {
            None
        };

        let score = novelty::content_score(&candidate.sentences);
        logi(format!(
            "Content: {} | {} scenes | score={:.2}",
            candidate.topic,
            candidate.sentences.len(),
            score
        ));

        match machine.step(candidate.clone(), verdict_input, cooling) {
            Verdict::Accept => return Ok(candidate),
            Verdict::RetryNovelty(terms) => {
                logw(format!(
                    "Similar to recent videos, retry with bans: {:?}",
                    terms.iter().take(8).collect::<Vec<_>>()
                ));
            }
            Verdict::RetryCooldown(entity) => {
                logw(format!("Focus entity cooldown '{}', rebuilding...", entity));
            }
            Verdict::RetryQuality => {
                logw("Low content score, rebuilding...".to_string());
                tokio::time::sleep(Duration::from_millis(400)).await;
            }
            Verdict::Exhausted => {
                logw("Retries exhausted, using best candidate seen".to_string());
                return machine
                    .take_best()
                    .context("No script candidate was produced");
            }
        }
    }
}

async fn download_pool(
    client: &Client,
    candidates: &[pool::Candidate],
    work_dir: &Path,
) -> Vec<(u64, PathBuf)> {
    let mut downloads: Vec<(u64, PathBuf)> = Vec::new();
    for (idx, c) in candidates.iter().enumerate() {
        let dest = work_dir.join(format!("pool_{:02}_{}.mp4", idx, c.id));
        let fetched = async {
            let resp = client
                .get(&c.url)
                .timeout(Duration::from_secs(120))
                .send()
                .await?
                .error_for_status()?;
            let bytes = resp.bytes().await?;
            fs::write(&dest, &bytes).await?;
            Ok::<usize, anyhow::Error>(bytes.len())
        }
        .await;
        match fetched {
            Ok(size) if size > 200_000 => downloads.push((c.id, dest)),
            Ok(size) => logw(format!("Clip {} too small ({} bytes), skipping", c.id, size)),
            Err(err) => logw(format!("Download fail ({}): {}", c.id, err)),
        }
    }
    downloads
}

async fn pick_bgm_source(client: &Client, cfg: &Config, work_dir: &Path, rng: &mut StdRng) -> Option<PathBuf> {
    if let Ok(mut entries) = fs::read_dir(&cfg.bgm_dir).await {
        let mut files: Vec<PathBuf> = Vec::new();
        while let Ok(Some(e)) = entries.next_entry().await {
            let p = e.path();
            match p.extension().and_then(|x| x.to_str()) {
                Some("mp3") | Some("wav") => files.push(p),
                _ => {}
            }
        }
        if !files.is_empty() {
            files.shuffle(rng);
            return files.into_iter().next();
        }
    }

    let mut urls = cfg.bgm_urls.clone();
    urls.shuffle(rng);
    for url in urls {
        let ext = if url.to_lowercase().contains(".mp3") { "mp3" } else { "wav" };
        let dest = work_dir.join(format!("bgm_src.{}", ext));
        let fetched = async {
            let resp = client
                .get(&url)
                .timeout(Duration::from_secs(60))
                .send()
                .await?
                .error_for_status()?;
            let bytes = resp.bytes().await?;
            fs::write(&dest, &bytes).await?;
            Ok::<usize, anyhow::Error>(bytes.len())
        }
        .await;
        match fetched {
            Ok(size) if size > 100_000 => return Some(dest),
            _ => continue,
        }
    }
    None
}

async fn dump_debug_meta(cfg: &Config, candidate: &ScriptCandidate) {
    let path = format!(
        "{}/meta_{}.json",
        cfg.out_dir,
        SAFE_NAME.replace_all(&cfg.channel_name, "_")
    );
    let obj = serde_json::json!({
        "channel": cfg.channel_name,
        "topic": candidate.topic,
        "sentences": candidate.sentences,
        "search_terms": candidate.search_terms,
        "lang": cfg.lang,
        "model": cfg.gemini_model,
        "ts": now_seed(),
    });
    if let Ok(body) = serde_json::to_string_pretty(&obj) {
        let _ = fs::write(&path, body).await;
    }
}

pub async fn run_generation(cfg: &Config) -> Result<i32> {
    logi(format!(
        "==> {} | MODE={} | topic-first build | LONGFORM={}",
        cfg.channel_name, cfg.mode, cfg.longform
    ));

    let seed = if cfg.rotation_seed != 0 { cfg.rotation_seed } else { now_seed() };
    let mut rng = StdRng::seed_from_u64(seed);
    let client = Client::new();
    let store = NoveltyStore::new(Path::new("."), &cfg.channel_slug(), &cfg.channel_name);
    let opts = RenderOpts {
        width: cfg.video_w,
        height: cfg.video_h,
        fps: cfg.fps,
        crf: cfg.crf,
    };

    // 1) Script
    let candidate = build_script(&client, cfg, &store).await?;
    if candidate.sentences.is_empty() {
        logw("No usable script produced".to_string());
        return Ok(1);
    }

    let sig = format!(
        "{}|{}|{}",
        cfg.channel_name,
        candidate.topic,
        candidate.sentences.first().map(String::as_str).unwrap_or("")
    );
    let mut fp: Vec<String> = novelty::sentences_fingerprint(&candidate.sentences)
        .into_iter()
        .collect();
    fp.sort();
    fp.truncate(500);
    store
        .record_topic(&hash12(&sig), &cfg.mode, &candidate.topic, fp)
        .await?;
    let entity = novelty::derive_focus_entity(&candidate.topic, &candidate.sentences);
    if !entity.is_empty() {
        let _ = store.touch_entity(&novelty::entity_key(&cfg.mode, &entity)).await;
    }
    dump_debug_meta(cfg, &candidate).await;
    logi(format!("Scenes: {}", candidate.sentences.len()));

    let work = tempfile::Builder::new()
        .prefix("autoshorts_")
        .tempdir()
        .context("Create temp work dir failed")?;
    let tmp = work.path();
    let font = ffmpeg::font_path();

    // 2) Per-scene narration
    logi("TTS...".to_string());
    let mut tracks: Vec<SceneTrack> = Vec::new();
    for (i, s) in candidate.sentences.iter().enumerate() {
        let base = text::normalize_sentence(s);
        let wav = tmp.join(format!("sent_{:02}.wav", i));
        let (dur, words) = tts::synthesize(&client, cfg, &base, &wav).await?;
        logi(format!("   {}/{}: {:.2}s", i + 1, candidate.sentences.len(), dur));
        tracks.push(SceneTrack {
            meta: SceneMeta { text: base, duration: dur },
            words,
            wav,
        });
    }
    let scene_texts: Vec<String> = tracks.iter().map(|t| t.meta.text.clone()).collect();

    // 3) Stock clip pool
    let pexels = crate::api::pexels::PexelsProvider::new(client.clone(), cfg);
    let pixabay = crate::api::pixabay::PixabayProvider::new(client.clone(), cfg);
    let (primary, secondary): (Box<dyn StockProvider>, Option<Box<dyn StockProvider>>) =
        match (pexels, pixabay) {
            (Some(p), x) => (Box::new(p), x.map(|s| Box::new(s) as Box<dyn StockProvider>)),
            (None, Some(x)) => {
                logw("No Pexels key; using Pixabay as the only provider".to_string());
                (Box::new(x), None)
            }
            (None, None) => anyhow::bail!("No stock footage provider configured"),
        };

    let need_clips = if cfg.longform { 12 } else { 8 };
    let blocklist = store.blocklist_get().await;
    let pool_cands = pool::build_pool(
        primary.as_ref(),
        secondary.as_deref(),
        &candidate.topic,
        &scene_texts,
        &candidate.search_terms,
        need_clips,
        &blocklist,
    )
    .await?;

    logi("Download pool...".to_string());
    let downloads = download_pool(&client, &pool_cands, tmp).await;
    if downloads.is_empty() {
        anyhow::bail!("Clip pool empty after downloads");
    }
    logi(format!("   Downloaded unique clips: {}", downloads.len()));

    // 4) Narration track with inter-scene gaps
    logi("Assemble audio...".to_string());
    let wavs: Vec<PathBuf> = tracks.iter().map(|t| t.wav.clone()).collect();
    let acat = tmp.join("audio_concat.wav");
    let total_audio = ffmpeg::build_audio_with_gaps(&wavs, cfg.scene_gap_sec, &acat).await?;
    logi(format!(
        "Total narration with gaps: {:.2}s (target >= {:.0}s)",
        total_audio, cfg.target_min_sec
    ));

    // 5) Visual timeline
    let scene_durations: Vec<f64> = tracks.iter().map(|t| t.meta.duration).collect();
    let shots = match cfg.schedule_mode {
        ScheduleMode::FixedCadence => {
            logi(format!("Building {:.0}s global carousel...", cfg.shot_cadence_sec));
            schedule::build_carousel(
                downloads.len(),
                total_audio,
                cfg.shot_cadence_sec,
                cfg.max_uses_per_clip,
                cfg.no_back_to_back,
                &mut rng,
            )
        }
        ScheduleMode::SceneLocked => {
            logi("Building scene-locked timeline...".to_string());
            schedule::build_scene_locked(
                downloads.len(),
                &scene_durations,
                cfg.scene_gap_sec,
                cfg.allow_reuse,
                cfg.max_uses_per_clip,
                &mut rng,
            )
        }
    };
    if shots.is_empty() {
        anyhow::bail!("Timeline scheduler produced no shots");
    }
    logi(format!("Shot plan: {} shots", shots.len()));

    // 6) Render segments (plus scene label overlays)
    let mut segs: Vec<PathBuf> = Vec::new();
    let mut chosen_ids: Vec<u64> = Vec::new();
    for (i, shot) in shots.iter().enumerate() {
        let (_frames, qdur) = schedule::quantize_to_frames(shot.duration, cfg.fps);
        let (clip_id, src) = &downloads[shot.clip];
        if !chosen_ids.contains(clip_id) {
            chosen_ids.push(*clip_id);
        }
        let base = tmp.join(format!("broll_{:03}.mp4", i));
        if !ffmpeg::make_segment(src, qdur, &base, &opts).await? {
            logw(format!("Skipping shot {} (segment render failed)", i));
            continue;
        }
        if cfg.caption_mode == CaptionMode::BurnedText {
            let meta_idx = i.min(tracks.len() - 1);
            let title = if meta_idx > 0 {
                format!("SCENE {}", meta_idx + 1)
            } else {
                text::clean_caption_text(&candidate.topic)
                    .to_uppercase()
                    .chars()
                    .take(60)
                    .collect()
            };
            let keyline: String = tracks[meta_idx].meta.text.chars().take(90).collect();
            let labeled = tmp.join(format!("broll_{:03}_lab.mp4", i));
            let card_sec = if i == 0 { 2.2 } else { 1.8 };
            if ffmpeg::overlay_scene_labels(
                &base, &title, &keyline, &labeled, card_sec, 1.6, font.as_deref(), &opts,
            )
            .await?
            {
                segs.push(labeled);
                continue;
            }
        }
        segs.push(base);
    }
    if segs.is_empty() {
        anyhow::bail!("No segments rendered");
    }

    // 7) Concat + A/V lock
    logi("Concatenate video...".to_string());
    let mut vcat = tmp.join("video_concat.mp4");
    ffmpeg::concat_videos_filter(&segs, &vcat, &opts).await?;

    let vdur = ffmpeg::ffprobe_duration_seconds(&vcat).await?;
    let adur = ffmpeg::ffprobe_duration_seconds(&acat).await?;
    let plan = crate::avlock::LockPlan::compute(vdur, adur, cfg.fps);
    if plan.pad_video_secs > 0.0 {
        let padded = tmp.join("video_padded.mp4");
        ffmpeg::pad_video_tail(&vcat, plan.pad_video_secs, &padded, &opts).await?;
        vcat = padded;
    }
    let vexact = tmp.join("video_exact.mp4");
    ffmpeg::enforce_exact_frames(&vcat, plan.frames, &vexact, &opts).await?;
    vcat = vexact;
    let mut acat_locked = tmp.join("audio_exact.wav");
    ffmpeg::lock_audio_duration(&acat, plan.frames, &acat_locked, cfg.fps).await?;
    logok(format!(
        "Locked A/V: video+audio -> {:.3}s | fps={}",
        plan.target_secs, cfg.fps
    ));

    // 7.1) Karaoke captions over the locked video
    if cfg.caption_mode == CaptionMode::Karaoke {
        let mut start = 0.0;
        let mut scenes: Vec<ffmpeg::KaraokeScene> = Vec::new();
        for (i, t) in tracks.iter().enumerate() {
            scenes.push(ffmpeg::KaraokeScene { start, words: t.words.clone() });
            start += t.meta.duration
                + if i + 1 < tracks.len() { cfg.scene_gap_sec } else { 0.0 };
        }
        let ass = ffmpeg::build_karaoke_ass(&scenes, font.as_deref(), &opts);
        let vkara = tmp.join("video_karaoke.mp4");
        match ffmpeg::burn_ass(&vcat, &ass, &vkara, &opts).await {
            Ok(()) => vcat = vkara,
            Err(err) => logw(format!("Karaoke burn failed, keeping plain video: {}", err)),
        }
    }

    // 7.2) CTA tail
    if cfg.cta_enable {
        let cta = text::build_contextual_cta(
            &candidate.topic,
            &scene_texts,
            &cfg.lang,
            cfg.cta_max_chars,
            &cfg.cta_text_force,
            seed,
        );
        if !cta.is_empty() {
            logi(format!("CTA: {}", cta));
            let vcta = tmp.join("video_cta.mp4");
            if ffmpeg::overlay_cta_tail(&vcat, &cta, &vcta, cfg.cta_show_sec, font.as_deref(), &opts)
                .await?
            {
                let vexact2 = tmp.join("video_exact_cta.mp4");
                ffmpeg::enforce_exact_frames(&vcta, plan.frames, &vexact2, &opts).await?;
                vcat = vexact2;
            }
        }
    }

    // 7.5) Background music
    if cfg.bgm_enable {
        match pick_bgm_source(&client, cfg, tmp, &mut rng).await {
            Some(src) => {
                logi("BGM: mixing with ducking...".to_string());
                let bgm_loop = tmp.join("bgm_loop.wav");
                ffmpeg::loop_bgm(&src, plan.target_secs, cfg.bgm_fade, &bgm_loop).await?;
                let duck = ffmpeg::has_filter("sidechaincompress").await;
                let a_mix = tmp.join("audio_with_bgm.wav");
                ffmpeg::duck_and_mix(&acat_locked, &bgm_loop, &a_mix, cfg.bgm_gain_db, duck)
                    .await?;
                let a_mix_exact = tmp.join("audio_with_bgm_exact.wav");
                ffmpeg::lock_audio_duration(&a_mix, plan.frames, &a_mix_exact, cfg.fps).await?;
                acat_locked = a_mix_exact;
            }
            None => logi("BGM: no source (BGM_DIR or BGM_URLS)".to_string()),
        }
    }

    // 8) Mux
    let ts = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    let mut safe_topic: String = SAFE_NAME
        .replace_all(&candidate.topic, "_")
        .chars()
        .take(60)
        .collect();
    if safe_topic.is_empty() {
        safe_topic = "Video".to_string();
    }
    let out_path = PathBuf::from(format!(
        "{}/{}_{}_{}.mp4",
        cfg.out_dir, cfg.channel_name, safe_topic, ts
    ));
    logi("Mux...".to_string());
    ffmpeg::mux(&vcat, &acat_locked, &out_path).await?;
    let final_dur = ffmpeg::ffprobe_duration_seconds(&out_path).await?;
    logok(format!("Saved: {} ({:.2}s)", out_path.display(), final_dur));

    // 9) Metadata + upload
    let (title, description, yt_tags) = text::build_long_description(
        &cfg.channel_name,
        &candidate.topic,
        &scene_texts,
        &candidate.tags,
        &candidate.title,
        &tracks.iter().map(|t| t.meta.clone()).collect::<Vec<_>>(),
        cfg.scene_gap_sec,
    );
    if cfg.upload_enabled {
        if youtube::has_credentials(cfg) {
            logi("Uploading to YouTube...".to_string());
            let meta = youtube::UploadMeta {
                title,
                description,
                tags: yt_tags,
                privacy: cfg.visibility.clone(),
                language: cfg.lang.clone(),
            };
            match youtube::upload(&client, cfg, &out_path, &meta).await {
                Ok(video_id) => logok(format!(
                    "YouTube Video ID: {} | https://youtube.com/watch?v={}",
                    video_id, video_id
                )),
                Err(err) => logw(format!("Upload skipped: {}", err)),
            }
        } else {
            logw("Upload skipped: missing YouTube credentials".to_string());
        }
    } else {
        logi("Upload disabled (UPLOAD_TO_YT != 1)".to_string());
    }

    // 10) Retention blocklist for the clips we actually used
    let used: Vec<u64> = chosen_ids
        .into_iter()
        .collect::<HashSet<u64>>()
        .into_iter()
        .collect();
    if let Err(err) = store.blocklist_add(&used, 30).await {
        logw(format!("Blocklist save warn: {}", err));
    }

    drop(work);
    logi("Cleaned temp files".to_string());
    Ok(0)
}
