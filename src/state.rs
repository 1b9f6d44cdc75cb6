use crate::logw;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs;

const RECENT_CAP: usize = 1200;
const USED_IDS_CAP: usize = 5000;
const GLOBAL_TOPICS_CAP: usize = 4000;
const ENTITIES_CAP: usize = 12000;
const ENTITIES_EVICT: usize = 2000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicRecord {
    pub h: String,
    pub mode: String,
    pub topic: String,
    pub ts: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fp: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClipUsage {
    pub id: u64,
    pub ts: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelState {
    #[serde(default)]
    pub recent: Vec<TopicRecord>,
    #[serde(default)]
    pub used_clip_ids: Vec<ClipUsage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalState {
    #[serde(default)]
    pub recent_topics: Vec<String>,
    #[serde(default)]
    pub entities: HashMap<String, f64>,
}

/// Durable novelty/cooldown state. One JSON document per channel plus one
/// cross-channel topic document. Reads never fail: a missing or corrupt file
/// degrades to the empty default. Single-writer by assumption; there is no
/// file locking, so concurrent runs against the same channel can lose
/// appends on save.
pub struct NoveltyStore {
    channel_path: PathBuf,
    legacy_channel_path: PathBuf,
    global_path: PathBuf,
    legacy_global_path: PathBuf,
}

fn now_epoch() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// First 12 hex chars of a sha256 over the content signature.
pub fn hash12(sig: &str) -> String {
    let digest = Sha256::digest(sig.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex[..12].to_string()
}

async fn load_json_or<T: serde::de::DeserializeOwned>(path: &Path, default: T) -> T {
    match fs::read_to_string(path).await {
        Ok(text) => serde_json::from_str(&text).unwrap_or(default),
        Err(_) => default,
    }
}

async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, text.as_bytes())
        .await
        .with_context(|| format!("write state: {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .await
        .with_context(|| format!("rename state: {}", path.display()))?;
    Ok(())
}

async fn mirror_legacy<T: Serialize>(path: &Path, value: &T) {
    let text = match serde_json::to_string_pretty(value) {
        Ok(t) => t,
        Err(_) => return,
    };
    if let Err(err) = fs::write(path, text.as_bytes()).await {
        logw(format!("legacy state mirror failed ({}): {}", path.display(), err));
    }
}

impl NoveltyStore {
    pub fn new(state_dir: &Path, channel_slug: &str, channel_name: &str) -> Self {
        Self {
            channel_path: state_dir.join(format!("state_{}.json", channel_slug)),
            legacy_channel_path: state_dir.join(format!("state_{}.json", channel_name)),
            global_path: state_dir.join("state_global_topics.json"),
            legacy_global_path: state_dir.join("state_global.json"),
        }
    }

    pub async fn load_channel(&self) -> ChannelState {
        if fs::metadata(&self.channel_path).await.is_ok() {
            return load_json_or(&self.channel_path, ChannelState::default()).await;
        }
        if fs::metadata(&self.legacy_channel_path).await.is_ok() {
            let st = load_json_or(&self.legacy_channel_path, ChannelState::default()).await;
            // One-time migration to the primary location.
            if let Err(err) = self.save_channel(st.clone()).await {
                logw(format!("state migration write failed: {}", err));
            }
            return st;
        }
        ChannelState::default()
    }

    pub async fn save_channel(&self, mut st: ChannelState) -> Result<()> {
        if st.recent.len() > RECENT_CAP {
            st.recent.drain(..st.recent.len() - RECENT_CAP);
        }
        if st.used_clip_ids.len() > USED_IDS_CAP {
            st.used_clip_ids.drain(..st.used_clip_ids.len() - USED_IDS_CAP);
        }
        write_json_atomic(&self.channel_path, &st).await?;
        if self.legacy_channel_path != self.channel_path {
            mirror_legacy(&self.legacy_channel_path, &st).await;
        }
        Ok(())
    }

    pub async fn load_global(&self) -> GlobalState {
        if fs::metadata(&self.global_path).await.is_ok() {
            return load_json_or(&self.global_path, GlobalState::default()).await;
        }
        if fs::metadata(&self.legacy_global_path).await.is_ok() {
            let gst = load_json_or(&self.legacy_global_path, GlobalState::default()).await;
            if let Err(err) = self.save_global(gst.clone()).await {
                logw(format!("global state migration write failed: {}", err));
            }
            return gst;
        }
        GlobalState::default()
    }

    pub async fn save_global(&self, mut gst: GlobalState) -> Result<()> {
        if gst.recent_topics.len() > GLOBAL_TOPICS_CAP {
            gst.recent_topics
                .drain(..gst.recent_topics.len() - GLOBAL_TOPICS_CAP);
        }
        if gst.entities.len() > ENTITIES_CAP {
            let mut by_age: Vec<(String, f64)> =
                gst.entities.iter().map(|(k, v)| (k.clone(), *v)).collect();
            by_age.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
            for (key, _) in by_age.into_iter().take(ENTITIES_EVICT) {
                gst.entities.remove(&key);
            }
        }
        write_json_atomic(&self.global_path, &gst).await?;
        mirror_legacy(&self.legacy_global_path, &gst).await;
        Ok(())
    }

    pub async fn record_topic(
        &self,
        hash: &str,
        mode: &str,
        topic: &str,
        fingerprint: Vec<String>,
    ) -> Result<()> {
        let mut st = self.load_channel().await;
        st.recent.push(TopicRecord {
            h: hash.to_string(),
            mode: mode.to_string(),
            topic: topic.to_string(),
            ts: now_epoch(),
            fp: fingerprint,
        });
        self.save_channel(st).await?;

        let mut gst = self.load_global().await;
        if !topic.is_empty() && !gst.recent_topics.iter().any(|t| t == topic) {
            gst.recent_topics.push(topic.to_string());
            self.save_global(gst).await?;
        }
        Ok(())
    }

    pub async fn touch_entity(&self, key: &str) -> Result<()> {
        if key.is_empty() {
            return Ok(());
        }
        let mut gst = self.load_global().await;
        gst.entities.insert(key.to_string(), now_epoch());
        self.save_global(gst).await
    }

    pub async fn entity_in_cooldown(&self, key: &str, days: i64) -> bool {
        if key.is_empty() || days <= 0 {
            return false;
        }
        let gst = self.load_global().await;
        match gst.entities.get(key) {
            Some(ts) => entity_age_in_cooldown(now_epoch() - ts, days),
            None => false,
        }
    }

    pub async fn blocklist_add(&self, clip_ids: &[u64], retention_days: i64) -> Result<()> {
        let mut st = self.load_channel().await;
        let now = now_epoch() as i64;
        for id in clip_ids {
            st.used_clip_ids.push(ClipUsage { id: *id, ts: now });
        }
        let cutoff = now - retention_days * 86_400;
        st.used_clip_ids.retain(|u| u.ts >= cutoff);
        self.save_channel(st).await
    }

    pub async fn blocklist_get(&self) -> HashSet<u64> {
        let st = self.load_channel().await;
        st.used_clip_ids.iter().map(|u| u.id).collect()
    }

    /// Most recent fingerprints first, up to `window` entries.
    pub async fn recent_fingerprints(&self, window: usize) -> Vec<HashSet<String>> {
        let st = self.load_channel().await;
        st.recent
            .iter()
            .rev()
            .filter(|rec| !rec.fp.is_empty())
            .take(window)
            .map(|rec| rec.fp.iter().cloned().collect())
            .collect()
    }

    /// Recent topics for the generation prompt ban list, newest first.
    pub async fn recent_topics_for_prompt(&self, limit: usize) -> Vec<String> {
        let gst = self.load_global().await;
        let mut uniq: Vec<String> = Vec::new();
        for topic in gst.recent_topics.iter().rev() {
            if !topic.is_empty() && !uniq.iter().any(|t| t == topic) {
                uniq.push(topic.clone());
            }
            if uniq.len() >= limit {
                break;
            }
        }
        uniq
    }
}

/// Strict window edge: an entity exactly `days` old is out of cooldown.
pub fn entity_age_in_cooldown(age_secs: f64, days: i64) -> bool {
    if days <= 0 {
        return false;
    }
    age_secs < (days * 86_400) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> NoveltyStore {
        NoveltyStore::new(dir.path(), "Test_Channel", "Test Channel")
    }

    #[test]
    fn hash12_is_stable_and_short() {
        let a = hash12("chan|topic|first");
        let b = hash12("chan|topic|first");
        assert_eq!(a, b);
        assert_eq!(a.len(), 12);
        assert_ne!(a, hash12("chan|topic|other"));
    }

    #[test]
    fn cooldown_boundary_is_strict() {
        let day = 86_400.0;
        assert!(entity_age_in_cooldown(day - 1.0, 1));
        assert!(!entity_age_in_cooldown(day, 1));
        assert!(!entity_age_in_cooldown(0.0, 0));
    }

    #[tokio::test]
    async fn load_defaults_when_missing_or_corrupt() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        let st = s.load_channel().await;
        assert!(st.recent.is_empty());

        fs::write(dir.path().join("state_Test_Channel.json"), b"{not json")
            .await
            .unwrap();
        let st = s.load_channel().await;
        assert!(st.recent.is_empty() && st.used_clip_ids.is_empty());
    }

    #[tokio::test]
    async fn save_load_round_trip_is_stable() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        s.record_topic("abc123def456", "freeform", "Volcano Facts", vec!["a b c".into()])
            .await
            .unwrap();
        let first = s.load_channel().await;
        s.save_channel(first.clone()).await.unwrap();
        let second = s.load_channel().await;
        assert_eq!(first.recent.len(), second.recent.len());
        assert_eq!(first.recent[0].h, second.recent[0].h);
        assert_eq!(first.recent[0].fp, second.recent[0].fp);
    }

    #[tokio::test]
    async fn legacy_state_migrates_once() {
        let dir = TempDir::new().unwrap();
        let legacy = ChannelState {
            recent: vec![TopicRecord {
                h: "deadbeef0000".into(),
                mode: "freeform".into(),
                topic: "Old Topic".into(),
                ts: 1.0,
                fp: vec![],
            }],
            used_clip_ids: vec![],
        };
        fs::write(
            dir.path().join("state_Test Channel.json"),
            serde_json::to_string(&legacy).unwrap(),
        )
        .await
        .unwrap();

        let s = store(&dir);
        let st = s.load_channel().await;
        assert_eq!(st.recent.len(), 1);
        // Primary file exists after the migrating load.
        assert!(dir.path().join("state_Test_Channel.json").exists());
    }

    #[tokio::test]
    async fn blocklist_prunes_by_retention() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        let mut st = ChannelState::default();
        st.used_clip_ids.push(ClipUsage {
            id: 1,
            ts: now_epoch() as i64 - 40 * 86_400,
        });
        s.save_channel(st).await.unwrap();

        s.blocklist_add(&[2, 3], 30).await.unwrap();
        let ids = s.blocklist_get().await;
        assert!(!ids.contains(&1));
        assert!(ids.contains(&2) && ids.contains(&3));
    }

    #[tokio::test]
    async fn recent_caps_apply_on_save() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        let mut st = ChannelState::default();
        for i in 0..(RECENT_CAP + 10) {
            st.recent.push(TopicRecord {
                h: format!("{:012x}", i),
                mode: "m".into(),
                topic: format!("t{}", i),
                ts: i as f64,
                fp: vec![],
            });
        }
        s.save_channel(st).await.unwrap();
        let st = s.load_channel().await;
        assert_eq!(st.recent.len(), RECENT_CAP);
        // Oldest entries were the ones dropped.
        assert_eq!(st.recent[0].topic, "t10");
    }

    #[tokio::test]
    async fn entity_touch_and_cooldown() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        assert!(!s.entity_in_cooldown("freeform:volcano", 30).await);
        s.touch_entity("freeform:volcano").await.unwrap();
        assert!(s.entity_in_cooldown("freeform:volcano", 30).await);
        assert!(!s.entity_in_cooldown("freeform:volcano", 0).await);
        assert!(!s.entity_in_cooldown("", 30).await);
    }
}
