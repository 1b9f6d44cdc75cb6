use crate::config::Config;
use crate::pool::{Candidate, StockProvider};
use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    videos: Vec<Video>,
}

#[derive(Deserialize)]
struct Video {
    #[serde(default)]
    id: u64,
    #[serde(default)]
    duration: f64,
    #[serde(default)]
    video_files: Vec<VideoFile>,
}

#[derive(Deserialize)]
struct VideoFile {
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
    link: Option<String>,
}

/// Dimension gate shared by both providers. Landscape output wants wide
/// files; portrait wants tall ones unless the config loosens it.
pub fn dimension_ok(cfg: &Config, w: u32, h: u32) -> bool {
    if cfg.is_landscape() {
        w >= h && w >= cfg.clip_min_width
    } else if cfg.strict_vertical {
        h > w && h >= cfg.clip_min_height
    } else {
        h >= cfg.clip_min_height && (h >= w || cfg.allow_landscape)
    }
}

pub struct PexelsProvider {
    client: Client,
    api_key: String,
    locale: &'static str,
    per_page: u32,
    min_duration: f64,
    max_duration: f64,
    cfg: Config,
}

impl PexelsProvider {
    /// None when no API key is configured; the caller skips the provider.
    pub fn new(client: Client, cfg: &Config) -> Option<Self> {
        if cfg.pexels_api_key.is_empty() {
            return None;
        }
        Some(Self {
            client,
            api_key: cfg.pexels_api_key.clone(),
            locale: cfg.locale(),
            per_page: cfg.pool_per_page.clamp(10, 80),
            min_duration: cfg.clip_min_duration,
            max_duration: cfg.clip_max_duration,
            cfg: cfg.clone(),
        })
    }

    /// Best file variant: closest height to 1600, largest area breaking ties.
    fn pick_variant(&self, v: &Video) -> Option<(u32, u32, String)> {
        let mut files: Vec<(u32, u32, String)> = v
            .video_files
            .iter()
            .filter(|f| dimension_ok(&self.cfg, f.width, f.height))
            .filter_map(|f| f.link.clone().map(|l| (f.width, f.height, l)))
            .collect();
        files.sort_by_key(|(w, h, _)| ((*h as i64 - 1600).abs(), -((*w as i64) * (*h as i64))));
        files.into_iter().next()
    }

    fn collect(&self, resp: SearchResponse) -> Vec<Candidate> {
        let mut out = Vec::new();
        for v in resp.videos {
            if v.duration < self.min_duration || v.duration > self.max_duration {
                continue;
            }
            if let Some((w, h, link)) = self.pick_variant(&v) {
                out.push(Candidate {
                    id: v.id,
                    url: link,
                    width: w,
                    height: h,
                    duration: v.duration,
                });
            }
        }
        out
    }
}

#[async_trait]
impl StockProvider for PexelsProvider {
    async fn search(&self, query: &str, page: u32) -> Result<Vec<Candidate>> {
        let resp = self
            .client
            .get("https://api.pexels.com/videos/search")
            .header("Authorization", &self.api_key)
            .query(&[
                ("query", query),
                ("per_page", &self.per_page.to_string()),
                ("page", &page.to_string()),
                ("size", "large"),
                ("locale", self.locale),
            ])
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Ok(Vec::new());
        }
        Ok(self.collect(resp.json().await?))
    }

    async fn popular(&self, page: u32) -> Result<Vec<Candidate>> {
        let resp = self
            .client
            .get("https://api.pexels.com/videos/popular")
            .header("Authorization", &self.api_key)
            .query(&[("per_page", "40"), ("page", &page.to_string())])
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Ok(Vec::new());
        }
        Ok(self.collect(resp.json().await?))
    }

    fn name(&self) -> &str {
        "pexels"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn portrait_strict_requires_tall_frames() {
        let cfg = Config::default();
        assert!(dimension_ok(&cfg, 1080, 1920));
        assert!(!dimension_ok(&cfg, 1920, 1080));
        assert!(!dimension_ok(&cfg, 720, 1080));
    }

    #[test]
    fn landscape_requires_wide_frames_above_min_width() {
        let cfg = Config {
            aspect: crate::config::Aspect::Landscape,
            ..Config::default()
        };
        assert!(dimension_ok(&cfg, 1920, 1080));
        assert!(!dimension_ok(&cfg, 1080, 1920));
        assert!(!dimension_ok(&cfg, 640, 360));
    }

    #[test]
    fn variant_selection_prefers_height_near_1600() {
        let cfg = Config::default();
        let provider = PexelsProvider {
            client: Client::new(),
            api_key: "k".into(),
            locale: "en-US",
            per_page: 30,
            min_duration: 3.0,
            max_duration: 13.0,
            cfg,
        };
        let v = Video {
            id: 1,
            duration: 6.0,
            video_files: vec![
                VideoFile { width: 2160, height: 3840, link: Some("uhd".into()) },
                VideoFile { width: 1080, height: 1920, link: Some("hd".into()) },
                VideoFile { width: 540, height: 960, link: Some("sd".into()) },
            ],
        };
        let (_, h, link) = provider.pick_variant(&v).unwrap();
        assert_eq!(h, 1920);
        assert_eq!(link, "hd");
    }
}
