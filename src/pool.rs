use crate::logi;
use crate::queries::{build_per_scene_queries, simplify_query, topic_query_candidates};
use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static URL_TOKENS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z0-9]+").unwrap());

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("stock footage: no suitable clips after all fallbacks")]
    Exhausted,
}

/// One stock-footage search result. Ephemeral; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: u64,
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub duration: f64,
}

/// A stock-footage provider. Implementations filter by orientation and
/// duration before returning; both calls may return empty without erroring.
#[async_trait]
pub trait StockProvider: Send + Sync {
    async fn search(&self, query: &str, page: u32) -> Result<Vec<Candidate>>;
    async fn popular(&self, page: u32) -> Result<Vec<Candidate>>;
    fn name(&self) -> &str;
}

fn lower_tokens(s: &str) -> HashSet<String> {
    URL_TOKENS
        .find_iter(&s.to_lowercase())
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Relevance ranking: query-token overlap against the clip URL (weight x2),
/// a duration sweet-spot bonus, and a resolution bonus. Blocklisted and
/// already-chosen ids are dropped here; dedup by id keeps the best-scored.
pub fn rank_candidates(
    items: &[Candidate],
    query_tokens: &HashSet<String>,
    blocked: &HashSet<u64>,
    chosen: &HashSet<u64>,
) -> Vec<Candidate> {
    let mut scored: Vec<(f64, &Candidate)> = Vec::new();
    for c in items {
        if blocked.contains(&c.id) || chosen.contains(&c.id) {
            continue;
        }
        let tokens = lower_tokens(&c.url);
        let overlap = tokens.intersection(query_tokens).count() as f64;
        let sweet = if (2.0..=12.0).contains(&c.duration) { 1.0 } else { 0.0 };
        let sharp = if c.height >= 720 { 1.0 } else { 0.0 };
        scored.push((overlap * 2.0 + sweet + sharp, c));
    }
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut seen: HashSet<u64> = HashSet::new();
    let mut out: Vec<Candidate> = Vec::new();
    for (_, c) in scored {
        if seen.insert(c.id) {
            out.push(c.clone());
        }
    }
    out
}

/// Assemble a ranked pool of `need` clips (at least one per scene). Stages:
/// per-scene + topic queries on the primary provider, then its popular feed,
/// then the secondary provider. Blocklisted ids are deprioritized, not
/// excluded: fresh clips come first, previously-used ones fill the tail.
/// Errors only when every stage produced nothing.
pub async fn build_pool(
    primary: &dyn StockProvider,
    secondary: Option<&dyn StockProvider>,
    topic: &str,
    scene_texts: &[String],
    search_terms: &[String],
    need: usize,
    blocklist: &HashSet<u64>,
) -> Result<Vec<Candidate>> {
    let per_scene = build_per_scene_queries(scene_texts, search_terms, topic);
    let topic_cands = topic_query_candidates(topic, search_terms);

    let mut queries: Vec<String> = Vec::new();
    for q in per_scene.into_iter().chain(topic_cands) {
        let q = q.trim().to_string();
        if !q.is_empty() && !queries.contains(&q) {
            queries.push(q);
        }
    }

    let no_block: HashSet<u64> = HashSet::new();
    let mut chosen: HashSet<u64> = HashSet::new();
    let mut pool: Vec<Candidate> = Vec::new();

    for q in &queries {
        let qtokens = lower_tokens(q);
        let mut merged: Vec<Candidate> = Vec::new();
        for page in 1..=3u32 {
            match primary.search(q, page).await {
                Ok(items) => merged.extend(items),
                Err(err) => {
                    tracing::warn!("{} search failed for '{}' p{}: {}", primary.name(), q, page, err);
                    break;
                }
            }
            if merged.len() >= need * 3 {
                break;
            }
        }
        // Rank against the retention blocklist so fresh clips surface first;
        // blocklisted ones re-enter in the fallback partition below.
        let ranked = rank_candidates(&merged, &qtokens, blocklist, &chosen);
        for c in ranked.into_iter().take((need / 2).max(3)) {
            chosen.insert(c.id);
            pool.push(c);
        }
        if pool.len() >= need * 2 {
            break;
        }
    }

    if pool.len() < need {
        let mut merged: Vec<Candidate> = Vec::new();
        for page in 1..=3u32 {
            match primary.popular(page).await {
                Ok(items) => merged.extend(items),
                Err(err) => {
                    tracing::warn!("{} popular feed failed p{}: {}", primary.name(), page, err);
                    break;
                }
            }
            if merged.len() >= need * 3 {
                break;
            }
        }
        let ranked = rank_candidates(&merged, &HashSet::new(), blocklist, &chosen);
        let room = (need * 2).saturating_sub(pool.len());
        for c in ranked.into_iter().take(room) {
            chosen.insert(c.id);
            pool.push(c);
        }
    }

    if pool.len() < need {
        if let Some(sec) = secondary {
            let fallback_q = queries
                .last()
                .cloned()
                .filter(|q| !q.is_empty())
                .unwrap_or_else(|| {
                    let s = simplify_query(topic, 1);
                    if s.is_empty() { "city".to_string() } else { s }
                });
            match sec.search(&fallback_q, 1).await {
                Ok(items) => {
                    let ranked =
                        rank_candidates(&items, &lower_tokens(&fallback_q), &no_block, &chosen);
                    for c in ranked.into_iter().take(need - pool.len()) {
                        chosen.insert(c.id);
                        pool.push(c);
                    }
                }
                Err(err) => tracing::warn!("{} fallback failed: {}", sec.name(), err),
            }
        }
    }

    // Final dedup, fresh-first partition, truncation.
    let mut seen: HashSet<u64> = HashSet::new();
    let mut fresh: Vec<Candidate> = Vec::new();
    let mut used: Vec<Candidate> = Vec::new();
    for c in pool {
        if !seen.insert(c.id) {
            continue;
        }
        if blocklist.contains(&c.id) {
            used.push(c);
        } else {
            fresh.push(c);
        }
    }
    let fresh_count = fresh.len();
    let mut final_pool = fresh;
    final_pool.extend(used);
    final_pool.truncate(need.max(scene_texts.len()));

    if final_pool.is_empty() {
        return Err(PoolError::Exhausted.into());
    }
    logi(format!(
        "Clip pool: q={} | pool={} (fresh={})",
        queries.len(),
        final_pool.len(),
        fresh_count
    ));
    Ok(final_pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubProvider {
        search_results: Vec<Candidate>,
        popular_results: Vec<Candidate>,
    }

    #[async_trait]
    impl StockProvider for StubProvider {
        async fn search(&self, _query: &str, page: u32) -> Result<Vec<Candidate>> {
            if page == 1 {
                Ok(self.search_results.clone())
            } else {
                Ok(vec![])
            }
        }
        async fn popular(&self, page: u32) -> Result<Vec<Candidate>> {
            if page == 1 {
                Ok(self.popular_results.clone())
            } else {
                Ok(vec![])
            }
        }
        fn name(&self) -> &str {
            "stub"
        }
    }

    fn clip(id: u64, url: &str, height: u32, duration: f64) -> Candidate {
        Candidate { id, url: url.into(), width: 1080, height, duration }
    }

    #[test]
    fn ranking_prefers_overlap_then_bonuses() {
        let items = vec![
            clip(1, "https://cdn.example/video/random-road.mp4", 1920, 6.0),
            clip(2, "https://cdn.example/video/ocean-waves-storm.mp4", 1920, 6.0),
            clip(3, "https://cdn.example/video/ocean-waves.mp4", 480, 30.0),
        ];
        let q = lower_tokens("ocean waves");
        let ranked = rank_candidates(&items, &q, &HashSet::new(), &HashSet::new());
        assert_eq!(ranked[0].id, 2);
        assert_eq!(ranked[1].id, 3);
        assert_eq!(ranked[2].id, 1);
    }

    #[test]
    fn ranking_drops_blocked_and_chosen_and_dedups() {
        let items = vec![
            clip(1, "a", 1920, 5.0),
            clip(1, "a-dup", 1920, 5.0),
            clip(2, "b", 1920, 5.0),
            clip(3, "c", 1920, 5.0),
        ];
        let blocked: HashSet<u64> = [2].into_iter().collect();
        let chosen: HashSet<u64> = [3].into_iter().collect();
        let ranked = rank_candidates(&items, &HashSet::new(), &blocked, &chosen);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].id, 1);
    }

    #[tokio::test]
    async fn pool_falls_back_to_secondary_provider() {
        let primary = StubProvider { search_results: vec![], popular_results: vec![] };
        let secondary = StubProvider {
            search_results: vec![clip(10, "x", 1920, 5.0), clip(11, "y", 1920, 5.0)],
            popular_results: vec![],
        };
        let scenes: Vec<String> = vec!["volcanoes erupting molten rock".into()];
        let pool = build_pool(
            &primary,
            Some(&secondary),
            "volcano facts",
            &scenes,
            &[],
            4,
            &HashSet::new(),
        )
        .await
        .unwrap();
        assert_eq!(pool.len(), 2);
    }

    #[tokio::test]
    async fn pool_errors_only_when_everything_is_empty() {
        let primary = StubProvider { search_results: vec![], popular_results: vec![] };
        let secondary = StubProvider { search_results: vec![], popular_results: vec![] };
        let scenes: Vec<String> = vec!["anything at all here".into()];
        let err = build_pool(
            &primary,
            Some(&secondary),
            "topic",
            &scenes,
            &[],
            4,
            &HashSet::new(),
        )
        .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn blocklisted_secondary_clips_fill_the_tail() {
        // Primary yields nothing; the secondary stage ignores the blocklist
        // and its previously-used clips land after the fresh ones.
        let primary = StubProvider { search_results: vec![], popular_results: vec![] };
        let secondary = StubProvider {
            search_results: vec![
                clip(1, "https://cdn.example/ocean-waves.mp4", 1920, 5.0),
                clip(2, "https://cdn.example/ocean-tide.mp4", 1920, 5.0),
            ],
            popular_results: vec![],
        };
        let blocklist: HashSet<u64> = [1].into_iter().collect();
        let scenes: Vec<String> = vec!["ocean waves crashing ashore".into()];
        let pool = build_pool(&primary, Some(&secondary), "ocean", &scenes, &[], 2, &blocklist)
            .await
            .unwrap();
        assert_eq!(pool.len(), 2);
        assert_eq!(pool[0].id, 2, "fresh clip first");
        assert_eq!(pool[1].id, 1, "blocklisted clip retained at the tail");
    }

    #[tokio::test]
    async fn popular_feed_fills_a_short_pool() {
        let primary = StubProvider {
            search_results: vec![clip(1, "a", 1920, 5.0)],
            popular_results: vec![clip(2, "b", 1920, 5.0), clip(3, "c", 1920, 5.0)],
        };
        let scenes: Vec<String> = vec!["volcanoes erupting molten rock".into()];
        let pool = build_pool(&primary, None, "volcano", &scenes, &[], 3, &HashSet::new())
            .await
            .unwrap();
        assert_eq!(pool.len(), 3);
    }
}
