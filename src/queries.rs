use once_cell::sync::Lazy;
use regex::Regex;

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9 ]+").unwrap());
static PROPER_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:[A-Z][a-z]+(?:\s+[A-Z][a-z]+)+)").unwrap());
static LEADING_ARTICLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(The|A|An)\s+").unwrap());

const STOP: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "if", "while", "of", "to", "in", "on", "at", "from",
    "by", "with", "for", "about", "into", "over", "after", "before", "between", "during",
    "under", "above", "across", "around", "through", "this", "that", "these", "those", "is",
    "are", "was", "were", "be", "been", "being", "have", "has", "had", "do", "does", "did",
    "can", "could", "should", "would", "may", "might", "will", "shall", "you", "your", "we",
    "our", "they", "their", "he", "she", "it", "its", "as", "than", "then", "so", "such",
    "very", "more", "most", "many", "much", "just", "also", "only", "even", "still", "yet",
];

const GENERIC_BAD: &[&str] = &[
    "great", "good", "bad", "big", "small", "old", "new", "many", "more", "most", "thing",
    "things", "stuff",
];

const GENERIC_QUERIES: &[&str] = &[
    "city timelapse",
    "ocean waves",
    "forest path",
    "night skyline",
    "macro detail",
    "street crowd",
    "mountain landscape",
];

fn tok4(s: &str) -> Vec<String> {
    let cleaned = NON_WORD.replace_all(s, " ").to_lowercase();
    cleaned
        .split_whitespace()
        .filter(|w| w.len() >= 4 && !STOP.contains(w) && !GENERIC_BAD.contains(w))
        .map(|w| w.to_string())
        .collect()
}

/// Capitalized multi-word runs ("Golden Gate Bridge") as lowercase bigrams.
pub fn proper_phrases(texts: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for t in texts {
        for m in PROPER_RUN.find_iter(t) {
            let phrase = LEADING_ARTICLE.replace(m.as_str(), "").into_owned();
            let ws: Vec<String> = phrase.split_whitespace().map(|w| w.to_lowercase()).collect();
            for pair in ws.windows(2) {
                let bg = format!("{} {}", pair[0], pair[1]);
                if !out.contains(&bg) {
                    out.push(bg);
                }
            }
        }
    }
    out
}

/// Known-domain lexicon expansions keyed by trigger words in the script.
pub fn domain_synonyms(all_text: &str) -> Vec<String> {
    let t = all_text.to_lowercase();
    let mut out: Vec<String> = Vec::new();
    let mut push_all = |terms: &[&str]| {
        for term in terms {
            if !out.iter().any(|x| x == term) {
                out.push(term.to_string());
            }
        }
    };
    if ["bridge", "tunnel", "arch", "span"].iter().any(|k| t.contains(k)) {
        push_all(&[
            "suspension bridge",
            "cable stayed",
            "stone arch",
            "viaduct",
            "aerial city bridge",
        ]);
    }
    if ["ocean", "coast", "tide", "wave", "storm"].iter().any(|k| t.contains(k)) {
        push_all(&["ocean waves", "coastal storm", "rocky coast", "lighthouse coast"]);
    }
    if ["timelapse", "growth", "melt", "cloud"].iter().any(|k| t.contains(k)) {
        push_all(&["city timelapse", "plant growth", "melting ice", "cloud timelapse"]);
    }
    if ["mechanism", "gears", "pulley", "cam"].iter().any(|k| t.contains(k)) {
        push_all(&["macro gears", "belt pulley", "cam follower", "robotic arm macro"]);
    }
    out
}

/// Reduce a query to its first `keep` significant tokens.
pub fn simplify_query(q: &str, keep: usize) -> String {
    let cleaned = NON_WORD.replace_all(&q.to_lowercase(), " ").into_owned();
    let toks: Vec<&str> = cleaned
        .split_whitespace()
        .filter(|t| !STOP.contains(t))
        .take(keep)
        .collect();
    if toks.is_empty() {
        cleaned.trim().chars().take(40).collect()
    } else {
        toks.join(" ")
    }
}

/// One stock-footage query per scene. Priority: lexicon/proper phrase found
/// in the scene, then the scene's last two significant tokens, then a
/// fallback term round-robin, then the simplified topic, then a generic.
pub fn build_per_scene_queries(
    sentences: &[String],
    fallback_terms: &[String],
    topic: &str,
) -> Vec<String> {
    let topic = topic.trim();
    let mut texts_cap: Vec<String> = vec![topic.to_string()];
    texts_cap.extend(sentences.iter().cloned());
    let texts_all = format!("{} {}", topic, sentences.join(" "));

    let mut phrase_pool = proper_phrases(&texts_cap);
    phrase_pool.extend(domain_synonyms(&texts_all));

    let fb: Vec<String> = fallback_terms
        .iter()
        .filter_map(|t| {
            let cleaned = NON_WORD.replace_all(&t.to_lowercase(), " ").into_owned();
            let ws: Vec<&str> = cleaned
                .split_whitespace()
                .filter(|w| !STOP.contains(w) && !GENERIC_BAD.contains(w))
                .take(2)
                .collect();
            if ws.is_empty() {
                None
            } else {
                Some(ws.join(" "))
            }
        })
        .collect();

    let topic_keys = tok4(topic);
    let topic_key_join = topic_keys
        .iter()
        .take(2)
        .cloned()
        .collect::<Vec<_>>()
        .join(" ");

    let mut queries: Vec<String> = Vec::new();
    let mut fb_idx = 0usize;
    for s in sentences {
        let s_low = format!(" {} ", s.to_lowercase());
        let mut picked: Option<String> = None;

        for ph in &phrase_pool {
            if s_low.contains(&format!(" {} ", ph)) {
                picked = Some(ph.clone());
                break;
            }
        }
        if picked.is_none() {
            let toks = tok4(s);
            if toks.len() >= 2 {
                picked = Some(format!("{} {}", toks[toks.len() - 2], toks[toks.len() - 1]));
            } else if toks.len() == 1 {
                picked = Some(toks[0].clone());
            }
        }
        if picked.as_ref().map(|p| p.len() < 4).unwrap_or(true) && !fb.is_empty() {
            picked = Some(fb[fb_idx % fb.len()].clone());
            fb_idx += 1;
        }
        if picked.as_ref().map(|p| p.len() < 4).unwrap_or(true) && !topic_key_join.is_empty() {
            picked = Some(topic_key_join.clone());
        }
        let mut q = match picked {
            Some(p) if p.len() >= 4 && !GENERIC_BAD.contains(&p.as_str()) => p,
            _ => "macro detail".to_string(),
        };
        let words: Vec<&str> = q.split_whitespace().collect();
        if words.len() > 2 {
            q = format!("{} {}", words[words.len() - 2], words[words.len() - 1]);
        }
        queries.push(q);
    }
    queries
}

/// Topic-level query candidates, most specific first, generic fallbacks last.
pub fn topic_query_candidates(topic: &str, terms: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let base = simplify_query(topic, 4);
    if !base.is_empty() {
        out.push(base.clone());
        let short = simplify_query(&base, 2);
        if !out.contains(&short) {
            out.push(short);
        }
    }
    for t in terms {
        let tt = simplify_query(t, 2);
        if !tt.is_empty() && !out.contains(&tt) {
            out.push(tt);
        }
    }
    if !base.is_empty() {
        for w in base.split_whitespace() {
            let w = w.to_string();
            if !out.contains(&w) {
                out.push(w);
            }
        }
    }
    for g in GENERIC_QUERIES {
        let g = g.to_string();
        if !out.contains(&g) {
            out.push(g);
        }
    }
    out.truncate(20);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sv(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn proper_phrases_become_bigrams() {
        let phrases = proper_phrases(&sv(&["The Golden Gate Bridge spans the bay"]));
        assert!(phrases.contains(&"golden gate".to_string()));
        assert!(phrases.contains(&"gate bridge".to_string()));
    }

    #[test]
    fn lexicon_phrase_wins_over_tokens() {
        let qs = build_per_scene_queries(
            &sv(&["the suspension bridge sways in heavy wind"]),
            &[],
            "bridges",
        );
        assert_eq!(qs[0], "suspension bridge");
    }

    #[test]
    fn token_fallback_uses_last_two_significant() {
        let qs = build_per_scene_queries(
            &sv(&["engineers anchor enormous concrete foundations"]),
            &[],
            "construction",
        );
        assert_eq!(qs[0], "concrete foundations");
    }

    #[test]
    fn empty_scene_falls_back_to_terms_then_generic() {
        let qs = build_per_scene_queries(&sv(&["so it is"]), &sv(&["night skyline"]), "");
        assert_eq!(qs[0], "night skyline");
        let qs = build_per_scene_queries(&sv(&["so it is"]), &[], "");
        assert_eq!(qs[0], "macro detail");
    }

    #[test]
    fn queries_clamped_to_two_words() {
        let qs = build_per_scene_queries(
            &sv(&["massive ancient granite aqueduct structures survive"]),
            &[],
            "",
        );
        assert!(qs[0].split_whitespace().count() <= 2);
    }

    #[test]
    fn topic_candidates_end_with_generics_and_cap_at_20() {
        let cands = topic_query_candidates("Amazing Suspension Bridges of Japan", &sv(&["steel cables"]));
        assert!(cands.len() <= 20);
        assert_eq!(cands[0], "amazing suspension bridges japan");
        assert!(cands.contains(&"city timelapse".to_string()));
        // No duplicates.
        let mut dedup = cands.clone();
        dedup.dedup();
        assert_eq!(dedup.len(), cands.len());
    }

    #[test]
    fn simplify_query_keeps_significant_tokens() {
        assert_eq!(simplify_query("The history of the Roman Empire", 2), "history roman");
    }
}
