use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9 ]+").unwrap());
static NON_ALNUM_SLUG: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Words too generic to identify what a script is "about".
const GENERIC_SKIP: &[&str] = &[
    "country", "countries", "people", "history", "stories", "story", "facts", "fact", "amazing",
    "weird", "random", "culture", "cultural", "animal", "animals", "nature", "wild", "pattern",
    "patterns", "science", "eco", "habit", "habits", "waste", "tip", "tips", "daily", "news",
    "world", "today", "minute", "short", "video", "watch", "more", "better", "twist", "comment",
    "voice", "narration", "hook", "topic", "secret", "secrets", "unknown", "things", "life",
    "lived", "modern", "time", "times", "explained", "guide", "quick", "fix", "fixes",
];

const BANNED_PHRASES: &[&str] = &[
    "one clear tip",
    "see it",
    "learn it",
    "plot twist",
    "soap-opera narration",
    "repeat once",
    "takeaway action",
    "in 60 seconds",
    "just the point",
    "crisp beats",
];

pub fn tok_words(s: &str) -> Vec<String> {
    let lowered = s.to_lowercase();
    let cleaned = NON_ALNUM.replace_all(&lowered, " ");
    cleaned
        .split_whitespace()
        .filter(|w| w.len() >= 3)
        .map(|w| w.to_string())
        .collect()
}

pub fn trigrams(words: &[String]) -> HashSet<String> {
    if words.len() < 3 {
        return HashSet::new();
    }
    words.windows(3).map(|w| w.join(" ")).collect()
}

/// Lexical fingerprint of a narration: set of contiguous token trigrams.
pub fn sentences_fingerprint(sentences: &[String]) -> HashSet<String> {
    let joined = sentences.join(" ");
    trigrams(&tok_words(&joined))
}

pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let inter = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        inter as f64 / union as f64
    }
}

/// Accept/reject a candidate fingerprint against recent history. Rejection is
/// strictly-greater-than the threshold; on rejection returns up to 12 terms
/// (len >= 4) from the overlapping trigrams to ban on retry.
pub fn novelty_ok(
    candidate: &HashSet<String>,
    recent: &[HashSet<String>],
    jaccard_max: f64,
) -> (bool, Vec<String>) {
    if candidate.is_empty() {
        return (true, Vec::new());
    }
    for fp in recent {
        let sim = jaccard(candidate, fp);
        if sim > jaccard_max {
            let mut terms: Vec<String> = Vec::new();
            'outer: for tri in candidate.intersection(fp).take(40) {
                for w in tri.split_whitespace() {
                    if w.len() >= 4 && !terms.iter().any(|t| t == w) {
                        terms.push(w.to_string());
                    }
                    if terms.len() >= 12 {
                        break 'outer;
                    }
                }
            }
            return (false, terms);
        }
    }
    (true, Vec::new())
}

/// Dominant non-generic token/bigram, a coarse "what is this about" signal.
pub fn derive_focus_entity(topic: &str, sentences: &[String]) -> String {
    let mut text = sentences.join(" ");
    text.push(' ');
    text.push_str(topic);
    let words = tok_words(&text);

    let mut counts: HashMap<&str, u32> = HashMap::new();
    for w in &words {
        if !GENERIC_SKIP.contains(&w.as_str()) {
            *counts.entry(w.as_str()).or_insert(0) += 1;
        }
    }
    if counts.is_empty() {
        return String::new();
    }

    let mut bigrams: HashMap<String, u32> = HashMap::new();
    for pair in words.windows(2) {
        *bigrams.entry(format!("{} {}", pair[0], pair[1])).or_insert(0) += 1;
    }
    let mut top_bigrams: Vec<(&String, &u32)> = bigrams.iter().collect();
    top_bigrams.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    for (bg, _) in top_bigrams.into_iter().take(10) {
        if bg.len() >= 7 && bg.split_whitespace().all(|w| !GENERIC_SKIP.contains(&w)) {
            if let Some(last) = bg.split_whitespace().last() {
                return last.to_string();
            }
        }
    }

    let mut top_words: Vec<(&str, u32)> = counts.into_iter().collect();
    top_words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    for (w, _) in top_words.iter().take(20) {
        if w.len() >= 4 {
            return w.to_string();
        }
    }
    top_words
        .first()
        .map(|(w, _)| w.to_string())
        .unwrap_or_default()
}

pub fn entity_key(mode: &str, entity: &str) -> String {
    let lowered = entity.to_lowercase();
    let slug = NON_ALNUM_SLUG
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string();
    if slug.is_empty() {
        String::new()
    } else {
        format!("{}:{}", mode.to_lowercase(), slug)
    }
}

/// Heuristic quality score in [0, 10]; banned filler phrases and very short
/// sentences pull it down.
pub fn content_score(sentences: &[String]) -> f64 {
    if sentences.is_empty() {
        return 0.0;
    }
    let mut bad = 0.0f64;
    for s in sentences {
        let low = s.to_lowercase();
        if BANNED_PHRASES.iter().any(|bp| low.contains(bp)) {
            bad += 1.0;
        }
        if low.split_whitespace().count() < 5 {
            bad += 0.5;
        }
    }
    (10.0 - bad * 1.4).max(0.0)
}

/// One generated script candidate as assessed by the attempt loop.
#[derive(Debug, Clone, Default)]
pub struct ScriptCandidate {
    pub topic: String,
    pub sentences: Vec<String>,
    pub search_terms: Vec<String>,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Candidate accepted; generation stops.
    Accept,
    /// Too similar to recent scripts; retry with these banned terms.
    RetryNovelty(Vec<String>),
    /// Focus entity is cooling down; retry with the entity banned.
    RetryCooldown(String),
    /// Low content score; retry with the topic banned.
    RetryQuality,
    /// Retries exhausted; fall back to the best-scoring candidate seen.
    Exhausted,
}

/// Bounded-retry state machine for script generation. Pure: the caller feeds
/// in each candidate plus externally computed novelty/cooldown signals and
/// applies the verdict. Exhausting retries never fails the run; the best
/// candidate by content score is used instead.
pub struct AttemptMachine {
    max_attempts: u32,
    novelty_retries: u32,
    quality_floor: f64,
    attempts: u32,
    novelty_tries: u32,
    pub ban_list: Vec<String>,
    best: Option<(f64, ScriptCandidate)>,
}

impl AttemptMachine {
    pub fn new(novelty_retries: u32, initial_bans: Vec<String>) -> Self {
        Self {
            max_attempts: novelty_retries.max(3),
            novelty_retries,
            quality_floor: 7.2,
            attempts: 0,
            novelty_tries: 0,
            ban_list: initial_bans,
            best: None,
        }
    }

    pub fn exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Assess one candidate. `novelty` is the (ok, avoid_terms) pair from the
    /// filter; `cooling_entity` is the focus entity iff it is in cooldown.
    pub fn step(
        &mut self,
        candidate: ScriptCandidate,
        novelty: (bool, Vec<String>),
        cooling_entity: Option<String>,
    ) -> Verdict {
        self.attempts += 1;
        let (novel, avoid_terms) = novelty;

        if !novel && self.novelty_tries < self.novelty_retries {
            self.novelty_tries += 1;
            for term in &avoid_terms {
                self.ban_list.insert(0, term.clone());
            }
            return Verdict::RetryNovelty(avoid_terms);
        }

        if let Some(entity) = cooling_entity {
            if self.novelty_tries < self.novelty_retries {
                self.novelty_tries += 1;
                self.ban_list.insert(0, entity.clone());
                return Verdict::RetryCooldown(entity);
            }
        }

        let score = content_score(&candidate.sentences);
        let topic = candidate.topic.clone();
        let is_best = self.best.as_ref().map(|(s, _)| score > *s).unwrap_or(true);
        if is_best {
            self.best = Some((score, candidate));
        }

        if score >= self.quality_floor && novel {
            return Verdict::Accept;
        }
        if self.exhausted() {
            return Verdict::Exhausted;
        }
        self.ban_list.insert(0, topic);
        Verdict::RetryQuality
    }

    /// Best candidate seen so far (content score tiebreak).
    pub fn take_best(self) -> Option<ScriptCandidate> {
        self.best.map(|(_, c)| c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(sentences: &[&str]) -> HashSet<String> {
        sentences_fingerprint(&sentences.iter().map(|s| s.to_string()).collect::<Vec<_>>())
    }

    #[test]
    fn fingerprint_symmetry_and_self_similarity() {
        let a = fp(&["The quick brown fox jumps over the lazy dog"]);
        let b = fp(&["Volcanoes erupt with molten rock and great force"]);
        assert!((jaccard(&a, &b) - jaccard(&b, &a)).abs() < 1e-12);
        assert!((jaccard(&a, &a) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn short_text_has_empty_fingerprint() {
        assert!(fp(&["hi to a"]).is_empty());
        assert!(fp(&[]).is_empty());
    }

    #[test]
    fn threshold_boundary_accepts_at_exact_max() {
        // candidate {x, y}, stored {x, z}: jaccard == 1/3.
        let cand: HashSet<String> = ["alfa bravo charlie", "delta echo foxtrot"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let stored: HashSet<String> = ["alfa bravo charlie", "golf hotel india"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let sim = jaccard(&cand, &stored);
        let (ok, _) = novelty_ok(&cand, &[stored.clone()], sim);
        assert!(ok, "similarity exactly at the threshold must be accepted");
        let (ok, terms) = novelty_ok(&cand, &[stored], sim - 1e-9);
        assert!(!ok);
        assert!(!terms.is_empty());
    }

    #[test]
    fn near_identical_rejected_unrelated_accepted() {
        let stored = fp(&["The quick fox jumps today"]);
        let cand_same = fp(&["The quick fox jumps today"]);
        let (ok, terms) = novelty_ok(&cand_same, &[stored.clone()], 0.55);
        assert!(!ok);
        assert!(terms.iter().all(|t| t.len() >= 4));
        assert!(terms.len() <= 12);

        let cand_new = fp(&["Volcanoes erupt with molten rock"]);
        let (ok, terms) = novelty_ok(&cand_new, &[stored], 0.55);
        assert!(ok);
        assert!(terms.is_empty());
    }

    #[test]
    fn focus_entity_skips_generic_words() {
        let sentences: Vec<String> = vec![
            "Istanbul bridges span two continents".into(),
            "Istanbul bridges carry millions daily".into(),
        ];
        let ent = derive_focus_entity("Istanbul bridges", &sentences);
        assert!(!ent.is_empty());
        assert!(!GENERIC_SKIP.contains(&ent.as_str()));
    }

    #[test]
    fn entity_key_slugs() {
        assert_eq!(entity_key("Freeform", "Golden Gate!"), "freeform:golden-gate");
        assert_eq!(entity_key("freeform", "!!"), "");
    }

    #[test]
    fn content_score_penalizes_filler() {
        let good: Vec<String> = vec![
            "Suspension cables hold forty thousand tons of steel".into(),
            "Each anchor block weighs more than a warship".into(),
        ];
        let bad: Vec<String> = vec!["See it.".into(), "Plot twist here in 60 seconds.".into()];
        assert!(content_score(&good) > content_score(&bad));
        assert_eq!(content_score(&[]), 0.0);
        // Heavy filler bottoms out at the zero floor.
        let filler: Vec<String> = (0..10).map(|_| "See it.".to_string()).collect();
        assert_eq!(content_score(&filler), 0.0);
    }

    fn cand(topic: &str, sentences: &[&str]) -> ScriptCandidate {
        ScriptCandidate {
            topic: topic.into(),
            sentences: sentences.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn attempt_machine_accepts_good_novel_candidate() {
        let mut m = AttemptMachine::new(4, vec![]);
        let c = cand(
            "Bridges",
            &[
                "Suspension cables hold forty thousand tons of steel",
                "Each anchor block weighs more than a warship",
            ],
        );
        assert_eq!(m.step(c, (true, vec![]), None), Verdict::Accept);
    }

    #[test]
    fn attempt_machine_retries_on_novelty_then_grows_bans() {
        let mut m = AttemptMachine::new(2, vec!["seed".into()]);
        let v = m.step(
            cand("Bridges", &["a"]),
            (false, vec!["cables".into(), "anchor".into()]),
            None,
        );
        assert_eq!(v, Verdict::RetryNovelty(vec!["cables".into(), "anchor".into()]));
        assert!(m.ban_list.contains(&"cables".to_string()));
        assert!(m.ban_list.contains(&"seed".to_string()));
    }

    #[test]
    fn attempt_machine_exhaustion_returns_best_candidate() {
        let mut m = AttemptMachine::new(2, vec![]);
        // Three low-scoring candidates; the middle one scores highest.
        let weak = cand("A", &["See it.", "Learn it.", "Plot twist."]);
        let better = cand(
            "B",
            &[
                "Suspension cables hold forty thousand tons here",
                "See it.",
                "Learn it.",
            ],
        );
        assert_eq!(m.step(weak.clone(), (true, vec![]), None), Verdict::RetryQuality);
        assert_eq!(m.step(better, (true, vec![]), None), Verdict::RetryQuality);
        let v = m.step(weak, (true, vec![]), None);
        assert_eq!(v, Verdict::Exhausted);
        let best = m.take_best().unwrap();
        assert_eq!(best.topic, "B");
    }

    #[test]
    fn attempt_machine_cooldown_retry() {
        let mut m = AttemptMachine::new(4, vec![]);
        let v = m.step(cand("A", &["words"]), (true, vec![]), Some("istanbul".into()));
        assert_eq!(v, Verdict::RetryCooldown("istanbul".into()));
        assert_eq!(m.ban_list[0], "istanbul");
    }
}
