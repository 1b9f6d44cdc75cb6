use crate::config::Config;
use crate::text::clean_caption_text;
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;

/// Everything the script model produces for one video.
#[derive(Debug, Clone, Default)]
pub struct ScriptPlan {
    pub topic: String,
    pub sentences: Vec<String>,
    pub search_terms: Vec<String>,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
}

const SHORTS_DEFAULT: &str = "Create a 25-40s YouTube Short.\n\
Return STRICT JSON with keys: topic, sentences (7-8), search_terms (4-10), title, description, tags.\n\n\
CONTENT RULES:\n\
- Stay laser-focused on the provided TOPIC (no pivoting).\n\
- Sentence 1 = a punchy HOOK (<=10 words, question or bold claim).\n\
- Sentence 8 = a SOFT CTA that nudges comments (no 'subscribe/like' words).\n\
- Aim for a seamless loop: let the last line mirror the first line idea.\n\
- Coherent, visually anchorable beats; each sentence advances one concrete idea.\n\
- Avoid vague fillers and meta-talk. No numbering. 6-12 words per sentence.";

const SHORTS_COUNTRY: &str = "Create amazing country/city facts.\n\
Return STRICT JSON with keys: topic, sentences (7-8), search_terms (4-10), title, description, tags.\n\
Rules:\n\
- Sentence 1 is a short HOOK (<=10 words, question/claim).\n\
- Sentence 8 is a soft CTA for comments (no 'subscribe/like').\n\
- Each fact must be specific & visual. 6-12 words per sentence.";

const LONGFORM_DEFAULT: &str = "Create a 3-5 minute YouTube video.\n\
Return STRICT JSON with keys: topic, sentences (6-10), search_terms (6-12), title, description, tags.\n\
Rules:\n\
- 'sentences' MUST be 6-10 SCENES. Each item is a SHORT PARAGRAPH (2-3 sentences, 35-60 words total).\n\
- Scene 1 = crisp HOOK (<=12 words opening, then 1-2 supportive lines).\n\
- Last scene = soft CTA for comments (no subscribe/like words).\n\
- Each scene advances one concrete idea with vivid, visual language. Avoid meta/filler.\n\
- Language = same as input; keep it natural.";

const LONGFORM_COUNTRY: &str = "Create a 3-5 minute video of specific country/city facts.\n\
Return STRICT JSON with keys: topic, sentences (6-10), search_terms (6-12), title, description, tags.\n\
Rules:\n\
- 'sentences' are SCENES: 2-3 sentences each (35-60 words).\n\
- Start with a sharp HOOK. End with a soft CTA focused on comments.\n\
- Facts must be concrete and visual; avoid filler and meta-talk.";

fn select_template(topic: &str, longform: bool) -> &'static str {
    const GEO_KW: &[&str] = &[
        "country", "geograph", "city", "capital", "border", "population", "continent", "flag",
    ];
    let t = topic.to_lowercase();
    let geo = GEO_KW.iter().any(|k| t.contains(k));
    match (longform, geo) {
        (true, true) => LONGFORM_COUNTRY,
        (true, false) => LONGFORM_DEFAULT,
        (false, true) => SHORTS_COUNTRY,
        (false, false) => SHORTS_DEFAULT,
    }
}

static JSON_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").unwrap());
static JSON_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^```json\s*|\s*```$").unwrap());
static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9 ]+").unwrap());

/// Pull the strict-JSON object out of a possibly chatty model reply.
fn extract_json(text: &str) -> Result<serde_json::Value> {
    let m = JSON_BLOCK
        .find(text)
        .context("Model reply contains no JSON object")?;
    let raw = JSON_FENCES.replace_all(m.as_str().trim(), "");
    serde_json::from_str(&raw).context("Model JSON parse failed")
}

/// Lowercase, de-generic, dedup, cap at 12 terms of <= 64 chars.
pub fn terms_normalize(terms: &[String]) -> Vec<String> {
    const BAD: &[&str] = &[
        "great", "nice", "good", "bad", "things", "stuff", "concept", "concepts", "idea", "ideas",
    ];
    let mut out: Vec<String> = Vec::new();
    for t in terms {
        let cleaned = NON_ALNUM.replace_all(t, " ").to_lowercase();
        let tt: String = cleaned
            .split_whitespace()
            .filter(|w| w.len() > 2 && !BAD.contains(w))
            .collect::<Vec<_>>()
            .join(" ")
            .chars()
            .take(64)
            .collect();
        if !tt.is_empty() && !out.contains(&tt) {
            out.push(tt);
        }
    }
    out.truncate(12);
    out
}

/// Bigram harvest from the script itself, for when the model returns no
/// usable terms. Deterministic order (the caller shuffles via ranking).
pub fn derive_terms_from_text(topic: &str, sentences: &[String]) -> Vec<String> {
    let mut pool: Vec<String> = Vec::new();
    for s in std::iter::once(topic.to_string()).chain(sentences.iter().cloned()) {
        let cleaned = NON_ALNUM.replace_all(&s, " ").to_lowercase();
        let ws: Vec<&str> = cleaned.split_whitespace().filter(|w| w.len() > 3).collect();
        for pair in ws.windows(2) {
            let bg = format!("{} {}", pair[0], pair[1]);
            if !pool.contains(&bg) {
                pool.push(bg);
            }
        }
    }
    let mut out = terms_normalize(&pool);
    out.truncate(8);
    out
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    parts: Option<Vec<Part>>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

async fn gemini_call(
    client: &Client,
    cfg: &Config,
    prompt: &str,
    temp: f64,
) -> Result<serde_json::Value> {
    if cfg.gemini_api_key.is_empty() {
        anyhow::bail!("GEMINI_API_KEY missing");
    }
    let url = format!(
        "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
        cfg.gemini_model
    );
    let payload = serde_json::json!({
        "contents": [{"parts": [{"text": prompt}]}],
        "generationConfig": {"temperature": temp},
    });
    let resp = client
        .post(&url)
        .header("Content-Type", "application/json")
        .header("x-goog-api-key", &cfg.gemini_api_key)
        .json(&payload)
        .timeout(std::time::Duration::from_secs(60))
        .send()
        .await
        .context("Gemini request failed")?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!(
            "Gemini HTTP {}: {}",
            status.as_u16(),
            body.chars().take(300).collect::<String>()
        );
    }

    let data: GenerateContentResponse =
        resp.json().await.context("Gemini response read failed")?;
    let text = data
        .candidates
        .and_then(|mut c| c.drain(..).next())
        .and_then(|c| c.content)
        .and_then(|c| c.parts)
        .and_then(|mut p| p.drain(..).next())
        .and_then(|p| p.text)
        .context("Gemini reply had no text part")?;
    extract_json(&text)
}

/// The rotation seed nudges temperature so identical schedules do not
/// produce identical scripts.
pub fn jittered_temp(base: f64, seed: u64) -> f64 {
    let jitter = (seed % 13) as f64 * 0.01;
    (base + jitter - 0.06).clamp(0.6, 1.2)
}

pub async fn generate_script(
    client: &Client,
    cfg: &Config,
    topic_lock: &str,
    user_terms: &[String],
    banlist: &[String],
) -> Result<ScriptPlan> {
    let template = select_template(topic_lock, cfg.longform);
    let avoid = if banlist.is_empty() {
        "(none)".to_string()
    } else {
        banlist
            .iter()
            .take(15)
            .map(|b| format!("- {}", b))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let terms_hint = if user_terms.is_empty() {
        "(none)".to_string()
    } else {
        user_terms
            .iter()
            .take(10)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    };
    let extra = if cfg.gemini_prompt.is_empty() {
        String::new()
    } else {
        format!("\nADDITIONAL STYLE:\n{}", cfg.gemini_prompt)
    };
    let prompt = format!(
        "{template}\n\nChannel: {channel}\nLanguage: {lang}\nTOPIC (hard lock): {topic}\n\
         Seed search terms (use and expand): {terms_hint}\nAvoid overlap for 180 days:\n{avoid}{extra}\n\
         \nRULES (MANDATORY):\n- STAY ON TOPIC exactly as provided.\n\
         - Return ONLY JSON, no prose/markdown, keys: topic, sentences, search_terms, title, description, tags.\n",
        template = template,
        channel = cfg.channel_name,
        lang = cfg.lang,
        topic = topic_lock,
        terms_hint = terms_hint,
        avoid = avoid,
        extra = extra,
    );

    let temp = jittered_temp(cfg.gemini_temp, cfg.rotation_seed);
    let data = gemini_call(client, cfg, &prompt, temp).await?;

    let max_scenes = if cfg.longform { 10 } else { 8 };
    let sentences: Vec<String> = data["sentences"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str())
                .map(clean_caption_text)
                .filter(|s| !s.is_empty())
                .take(max_scenes)
                .collect()
        })
        .unwrap_or_default();

    let raw_terms: Vec<String> = match &data["search_terms"] {
        serde_json::Value::String(s) => vec![s.clone()],
        serde_json::Value::Array(arr) => arr
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.to_string())
            .collect(),
        _ => Vec::new(),
    };
    let mut terms = terms_normalize(&raw_terms);
    if terms.is_empty() {
        terms = derive_terms_from_text(topic_lock, &sentences);
    }
    if !user_terms.is_empty() {
        let mut seeded = terms_normalize(user_terms);
        seeded.extend(terms);
        terms = terms_normalize(&seeded);
    }

    Ok(ScriptPlan {
        topic: topic_lock.to_string(),
        sentences,
        search_terms: terms,
        title: data["title"].as_str().unwrap_or("").trim().to_string(),
        description: data["description"].as_str().unwrap_or("").trim().to_string(),
        tags: data["tags"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str())
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default(),
    })
}

/// Deterministic 8-scene script used when the model is disabled or fails.
pub fn fallback_plan(topic_lock: &str, user_terms: &[String]) -> ScriptPlan {
    let tpc = topic_lock.to_string();
    let sentences = vec![
        format!("{} comes alive in small vivid scenes.", tpc),
        "Each beat shows one concrete detail to remember.".to_string(),
        "The story moves forward without fluff or filler.".to_string(),
        "You can picture it clearly as you listen.".to_string(),
        "A tiny contrast locks the idea in memory.".to_string(),
        "No meta talk, just what matters on screen.".to_string(),
        "Replay to catch micro-details and patterns.".to_string(),
        "What would you add? Tell me below.".to_string(),
    ];
    let seed = if user_terms.is_empty() {
        vec![
            "macro detail".to_string(),
            "timelapse".to_string(),
            "clean b-roll".to_string(),
        ]
    } else {
        user_terms.to_vec()
    };
    ScriptPlan {
        topic: tpc,
        sentences,
        search_terms: terms_normalize(&seed),
        ..ScriptPlan::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_is_extracted_from_chatty_replies() {
        let v = extract_json("Sure! Here you go:\n```json\n{\"topic\": \"x\"}\n```").unwrap();
        assert_eq!(v["topic"], "x");
        assert!(extract_json("no json here").is_err());
    }

    #[test]
    fn terms_are_lowercased_deduped_and_capped() {
        let raw: Vec<String> = vec![
            "Ocean Waves!".into(),
            "ocean waves".into(),
            "a".into(),
            "Great Stuff".into(),
        ];
        assert_eq!(terms_normalize(&raw), vec!["ocean waves"]);
    }

    #[test]
    fn derived_terms_are_bigrams_from_the_script() {
        let sents = vec!["Volcanic glass forms when lava cools rapidly".to_string()];
        let terms = derive_terms_from_text("obsidian cliffs", &sents);
        assert!(terms.contains(&"obsidian cliffs".to_string()));
        assert!(terms.contains(&"volcanic glass".to_string()));
        assert!(terms.len() <= 8);
    }

    #[test]
    fn temperature_jitter_stays_in_range() {
        for seed in 0..40u64 {
            let t = jittered_temp(0.85, seed);
            assert!((0.6..=1.2).contains(&t));
        }
        assert!((jittered_temp(0.85, 0) - 0.79).abs() < 1e-9);
    }

    #[test]
    fn geo_topics_select_the_country_template() {
        assert_eq!(select_template("Capital cities of Europe", false), SHORTS_COUNTRY);
        assert_eq!(select_template("Deep sea creatures", true), LONGFORM_DEFAULT);
    }

    #[test]
    fn fallback_plan_is_deterministic_with_eight_scenes() {
        let a = fallback_plan("Tiny Homes", &[]);
        let b = fallback_plan("Tiny Homes", &[]);
        assert_eq!(a.sentences, b.sentences);
        assert_eq!(a.sentences.len(), 8);
        assert!(!a.search_terms.is_empty());
    }
}
