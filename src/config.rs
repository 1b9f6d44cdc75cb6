use regex::Regex;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Aspect {
    Portrait,
    Landscape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptionMode {
    Off,
    Karaoke,
    BurnedText,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleMode {
    SceneLocked,
    FixedCadence,
}

/// Immutable run configuration. Built once in `main` from the environment
/// and passed by reference into every component; nothing else reads env vars.
#[derive(Debug, Clone)]
pub struct Config {
    pub channel_name: String,
    pub mode: String,
    pub topic: String,
    pub search_terms: Vec<String>,
    pub lang: String,
    pub visibility: String,
    pub rotation_seed: u64,

    pub aspect: Aspect,
    pub longform: bool,
    pub video_w: u32,
    pub video_h: u32,
    pub fps: u32,
    pub crf: u32,
    pub target_min_sec: f64,
    pub target_max_sec: f64,

    pub caption_mode: CaptionMode,
    pub schedule_mode: ScheduleMode,
    pub shot_cadence_sec: f64,
    pub scene_gap_sec: f64,

    pub novelty_enforce: bool,
    pub novelty_window: usize,
    pub novelty_jaccard_max: f64,
    pub novelty_retries: u32,
    pub entity_cooldown_days: i64,

    pub pool_per_page: u32,
    pub max_uses_per_clip: u32,
    pub allow_reuse: bool,
    pub allow_landscape: bool,
    pub clip_min_duration: f64,
    pub clip_max_duration: f64,
    pub clip_min_height: u32,
    pub clip_min_width: u32,
    pub strict_vertical: bool,
    pub no_back_to_back: bool,

    pub cta_enable: bool,
    pub cta_show_sec: f64,
    pub cta_max_chars: usize,
    pub cta_text_force: String,

    pub bgm_enable: bool,
    pub bgm_gain_db: f64,
    pub bgm_fade: f64,
    pub bgm_dir: String,
    pub bgm_urls: Vec<String>,

    pub tts_voice: String,
    pub tts_rate: String,

    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_prompt: String,
    pub gemini_temp: f64,
    pub use_gemini: bool,

    pub pexels_api_key: String,
    pub pixabay_api_key: String,
    pub allow_pixabay_fallback: bool,

    pub yt_client_id: String,
    pub yt_client_secret: String,
    pub yt_refresh_token: String,
    pub upload_enabled: bool,

    pub out_dir: String,
}

fn env_str(name: &str, default: &str) -> String {
    match env::var(name) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => default.to_string(),
    }
}

fn env_int(name: &str, default: i64) -> i64 {
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("none") {
        return default;
    }
    raw.parse::<i64>()
        .or_else(|_| raw.parse::<f64>().map(|f| f as i64))
        .unwrap_or(default)
}

fn env_float(name: &str, default: f64) -> f64 {
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("none") {
        return default;
    }
    raw.parse::<f64>().unwrap_or(default)
}

fn env_bool(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(v) => v.trim() == "1",
        Err(_) => default,
    }
}

fn sanitize_lang(val: &str) -> String {
    let val = val.trim();
    if val.is_empty() {
        return "en".to_string();
    }
    let mut letters: String = val.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    letters.truncate(2);
    if letters.len() == 2 {
        letters.to_ascii_lowercase()
    } else {
        "en".to_string()
    }
}

fn sanitize_privacy(val: &str) -> String {
    let v = val.trim().to_ascii_lowercase();
    match v.as_str() {
        "public" | "unlisted" | "private" => v,
        _ => "public".to_string(),
    }
}

/// Accepts either a JSON array or a loose comma-separated list.
pub fn parse_terms(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }
    if let Ok(serde_json::Value::Array(items)) = serde_json::from_str::<serde_json::Value>(raw) {
        return items
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    let stripped = raw
        .trim_start_matches(['[', '('])
        .trim_end_matches([']', ')']);
    stripped
        .split(',')
        .map(|p| p.trim().trim_matches(['"', '\'']).to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

fn strip_quotes(s: &str) -> String {
    s.trim().trim_matches(['\'', '"']).trim().to_string()
}

impl Config {
    pub fn from_env() -> Self {
        let aspect_raw = env_str("ASPECT", "9:16").to_ascii_lowercase();
        let aspect = match aspect_raw.as_str() {
            "16:9" | "landscape" | "widescreen" => Aspect::Landscape,
            _ => Aspect::Portrait,
        };
        let longform = env_bool("LONGFORM", env_bool("LONGFORM_ENABLE", false));
        let (video_w, video_h) = match aspect {
            Aspect::Landscape => (1920, 1080),
            Aspect::Portrait => (1080, 1920),
        };
        let landscape = aspect == Aspect::Landscape;

        let lang_raw = env_str("VIDEO_LANG", &env_str("LANG", "en"));
        let caption_mode = match env_str("CAPTION_MODE", "burned").to_ascii_lowercase().as_str() {
            "off" | "none" => CaptionMode::Off,
            "karaoke" => CaptionMode::Karaoke,
            _ => CaptionMode::BurnedText,
        };
        let schedule_mode = if longform || env_bool("FIXED_CADENCE", longform) {
            ScheduleMode::FixedCadence
        } else {
            ScheduleMode::SceneLocked
        };

        Self {
            channel_name: env_str("CHANNEL_NAME", "DefaultChannel"),
            mode: env_str("MODE", "freeform").to_ascii_lowercase(),
            topic: strip_quotes(&env_str("TOPIC", "")),
            search_terms: parse_terms(&env_str("SEARCH_TERMS", "")),
            lang: sanitize_lang(&lang_raw),
            visibility: sanitize_privacy(&env_str("VISIBILITY", "public")),
            rotation_seed: env_int("ROTATION_SEED", 0).max(0) as u64,

            aspect,
            longform,
            video_w,
            video_h,
            fps: env_int("TARGET_FPS", if longform { 30 } else { 25 }).max(1) as u32,
            crf: 22,
            target_min_sec: env_float("TARGET_MIN_SEC", if longform { 180.0 } else { 22.0 }),
            target_max_sec: env_float("TARGET_MAX_SEC", if longform { 300.0 } else { 42.0 }),

            caption_mode,
            schedule_mode,
            shot_cadence_sec: env_float("BROLL_SHOT_SEC", 5.0),
            scene_gap_sec: env_float("SCENE_GAP_SEC", 0.45),

            novelty_enforce: env_bool("NOVELTY_ENFORCE", true),
            novelty_window: env_int("NOVELTY_WINDOW", 40).max(0) as usize,
            novelty_jaccard_max: env_float("NOVELTY_JACCARD_MAX", 0.55),
            novelty_retries: env_int("NOVELTY_RETRIES", 4).max(0) as u32,
            entity_cooldown_days: env_int("ENTITY_COOLDOWN_DAYS", env_int("NOVELTY_WINDOW", 30)),

            pool_per_page: env_int("PEXELS_PER_PAGE", 30).clamp(10, 80) as u32,
            max_uses_per_clip: env_int("PEXELS_MAX_USES_PER_CLIP", 3).max(1) as u32,
            allow_reuse: env_bool("PEXELS_ALLOW_REUSE", true),
            allow_landscape: env_bool("PEXELS_ALLOW_LANDSCAPE", true),
            clip_min_duration: env_int("PEXELS_MIN_DURATION", 3) as f64,
            clip_max_duration: env_int("PEXELS_MAX_DURATION", 13) as f64,
            clip_min_height: env_int("PEXELS_MIN_HEIGHT", if landscape { 720 } else { 1280 }).max(0)
                as u32,
            clip_min_width: env_int("PEXELS_MIN_WIDTH", 1280).max(0) as u32,
            strict_vertical: env_bool("PEXELS_STRICT_VERTICAL", !landscape),
            no_back_to_back: env_bool("PEXELS_NO_BACK_TO_BACK", true),

            cta_enable: env_bool("CTA_ENABLE", true),
            cta_show_sec: env_float("CTA_SHOW_SEC", 3.2),
            cta_max_chars: env_int("CTA_MAX_CHARS", 64).max(8) as usize,
            cta_text_force: env_str("CTA_TEXT", ""),

            bgm_enable: env_bool("BGM_ENABLE", true),
            bgm_gain_db: env_float("BGM_DB", -11.0),
            bgm_fade: env_float("BGM_FADE", 0.8),
            bgm_dir: env_str("BGM_DIR", "bgm"),
            bgm_urls: parse_terms(&env_str("BGM_URLS", "")),

            tts_voice: env_str("TTS_VOICE", ""),
            tts_rate: env_str("TTS_RATE", "+12%"),

            gemini_api_key: env_str("GEMINI_API_KEY", ""),
            gemini_model: env_str("GEMINI_MODEL", "gemini-2.5-flash"),
            gemini_prompt: env_str("GEMINI_PROMPT", ""),
            gemini_temp: env_float("GEMINI_TEMP", 0.85),
            use_gemini: env_bool("USE_GEMINI", true),

            pexels_api_key: env_str("PEXELS_API_KEY", ""),
            pixabay_api_key: env_str("PIXABAY_API_KEY", ""),
            allow_pixabay_fallback: env_bool("ALLOW_PIXABAY_FALLBACK", true),

            yt_client_id: env_str("YT_CLIENT_ID", ""),
            yt_client_secret: env_str("YT_CLIENT_SECRET", ""),
            yt_refresh_token: env_str("YT_REFRESH_TOKEN", ""),
            upload_enabled: env_bool("UPLOAD_TO_YT", true),

            out_dir: env_str("OUT_DIR", "out"),
        }
    }

    pub fn is_landscape(&self) -> bool {
        self.aspect == Aspect::Landscape
    }

    pub fn locale(&self) -> &'static str {
        if self.lang.starts_with("tr") {
            "tr-TR"
        } else {
            "en-US"
        }
    }

    /// Filesystem-safe channel slug used in state file names.
    pub fn channel_slug(&self) -> String {
        let re = Regex::new(r"[^A-Za-z0-9]+").unwrap();
        re.replace_all(&self.channel_name, "_").into_owned()
    }
}

impl Default for Config {
    fn default() -> Self {
        // Mirrors from_env with no environment set; used by tests.
        Self {
            channel_name: "DefaultChannel".into(),
            mode: "freeform".into(),
            topic: String::new(),
            search_terms: Vec::new(),
            lang: "en".into(),
            visibility: "public".into(),
            rotation_seed: 0,
            aspect: Aspect::Portrait,
            longform: false,
            video_w: 1080,
            video_h: 1920,
            fps: 25,
            crf: 22,
            target_min_sec: 22.0,
            target_max_sec: 42.0,
            caption_mode: CaptionMode::BurnedText,
            schedule_mode: ScheduleMode::SceneLocked,
            shot_cadence_sec: 5.0,
            scene_gap_sec: 0.45,
            novelty_enforce: true,
            novelty_window: 40,
            novelty_jaccard_max: 0.55,
            novelty_retries: 4,
            entity_cooldown_days: 30,
            pool_per_page: 30,
            max_uses_per_clip: 3,
            allow_reuse: true,
            allow_landscape: true,
            clip_min_duration: 3.0,
            clip_max_duration: 13.0,
            clip_min_height: 1280,
            clip_min_width: 1280,
            strict_vertical: true,
            no_back_to_back: true,
            cta_enable: true,
            cta_show_sec: 3.2,
            cta_max_chars: 64,
            cta_text_force: String::new(),
            bgm_enable: true,
            bgm_gain_db: -11.0,
            bgm_fade: 0.8,
            bgm_dir: "bgm".into(),
            bgm_urls: Vec::new(),
            tts_voice: String::new(),
            tts_rate: "+12%".into(),
            gemini_api_key: String::new(),
            gemini_model: "gemini-2.5-flash".into(),
            gemini_prompt: String::new(),
            gemini_temp: 0.85,
            use_gemini: true,
            pexels_api_key: String::new(),
            pixabay_api_key: String::new(),
            allow_pixabay_fallback: true,
            yt_client_id: String::new(),
            yt_client_secret: String::new(),
            yt_refresh_token: String::new(),
            upload_enabled: true,
            out_dir: "out".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_terms_accepts_json_and_loose_lists() {
        assert_eq!(parse_terms(r#"["a", "b c"]"#), vec!["a", "b c"]);
        assert_eq!(parse_terms("a, 'b c', \"d\""), vec!["a", "b c", "d"]);
        assert!(parse_terms("").is_empty());
    }

    #[test]
    fn lang_and_privacy_are_sanitized() {
        assert_eq!(sanitize_lang("en_US.UTF-8"), "en");
        assert_eq!(sanitize_lang(""), "en");
        assert_eq!(sanitize_lang("TR"), "tr");
        assert_eq!(sanitize_privacy("UNLISTED"), "unlisted");
        assert_eq!(sanitize_privacy("whatever"), "public");
    }

    #[test]
    fn bgm_gain_reads_the_bgm_db_variable() {
        unsafe { env::set_var("BGM_DB", "-7.5") };
        let cfg = Config::from_env();
        unsafe { env::remove_var("BGM_DB") };
        assert!((cfg.bgm_gain_db + 7.5).abs() < 1e-9);
    }

    #[test]
    fn channel_slug_strips_punctuation() {
        let cfg = Config {
            channel_name: "My Channel #1!".into(),
            ..Config::default()
        };
        assert_eq!(cfg.channel_slug(), "My_Channel_1_");
    }
}
