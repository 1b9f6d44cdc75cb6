use crate::api::pexels::dimension_ok;
use crate::config::Config;
use crate::pool::{Candidate, StockProvider};
use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

#[derive(Deserialize)]
struct HitsResponse {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Deserialize)]
struct Hit {
    #[serde(default)]
    id: u64,
    #[serde(default)]
    duration: f64,
    #[serde(default)]
    videos: Ladder,
}

#[derive(Deserialize, Default)]
struct Ladder {
    large: Option<Variant>,
    medium: Option<Variant>,
    small: Option<Variant>,
    tiny: Option<Variant>,
}

#[derive(Deserialize)]
struct Variant {
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
    url: Option<String>,
}

pub struct PixabayProvider {
    client: Client,
    api_key: String,
    min_duration: f64,
    max_duration: f64,
    cfg: Config,
}

impl PixabayProvider {
    /// None when the key is missing or the fallback is disabled.
    pub fn new(client: Client, cfg: &Config) -> Option<Self> {
        if !cfg.allow_pixabay_fallback || cfg.pixabay_api_key.is_empty() {
            return None;
        }
        Some(Self {
            client,
            api_key: cfg.pixabay_api_key.clone(),
            min_duration: cfg.clip_min_duration,
            max_duration: cfg.clip_max_duration,
            cfg: cfg.clone(),
        })
    }

    /// Walk the quality ladder top down; first variant that fits the frame.
    fn pick_variant(&self, hit: &Hit) -> Option<(u32, u32, String)> {
        let ladder = [
            hit.videos.large.as_ref(),
            hit.videos.medium.as_ref(),
            hit.videos.small.as_ref(),
            hit.videos.tiny.as_ref(),
        ];
        for v in ladder.into_iter().flatten() {
            if dimension_ok(&self.cfg, v.width, v.height) {
                if let Some(url) = v.url.clone() {
                    return Some((v.width, v.height, url));
                }
            }
        }
        None
    }
}

#[async_trait]
impl StockProvider for PixabayProvider {
    async fn search(&self, query: &str, _page: u32) -> Result<Vec<Candidate>> {
        let resp = self
            .client
            .get("https://pixabay.com/api/videos/")
            .query(&[
                ("key", self.api_key.as_str()),
                ("q", query),
                ("safesearch", "true"),
                ("per_page", "50"),
                ("video_type", "film"),
                ("order", "popular"),
            ])
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Ok(Vec::new());
        }
        let data: HitsResponse = resp.json().await?;
        let mut out = Vec::new();
        for hit in data.hits {
            if hit.duration < self.min_duration || hit.duration > self.max_duration {
                continue;
            }
            if let Some((w, h, url)) = self.pick_variant(&hit) {
                out.push(Candidate {
                    id: hit.id,
                    url,
                    width: w,
                    height: h,
                    duration: hit.duration,
                });
            }
        }
        Ok(out)
    }

    // No popular feed; this provider is search-only fallback.
    async fn popular(&self, _page: u32) -> Result<Vec<Candidate>> {
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "pixabay"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ladder_falls_through_to_the_first_fitting_variant() {
        let provider = PixabayProvider {
            client: Client::new(),
            api_key: "k".into(),
            min_duration: 3.0,
            max_duration: 13.0,
            cfg: Config::default(),
        };
        let hit = Hit {
            id: 7,
            duration: 8.0,
            videos: Ladder {
                large: Some(Variant { width: 1920, height: 1080, url: Some("wide".into()) }),
                medium: Some(Variant { width: 1080, height: 1920, url: Some("tall".into()) }),
                small: None,
                tiny: None,
            },
        };
        // Portrait default rejects the wide large variant.
        let (_, h, url) = provider.pick_variant(&hit).unwrap();
        assert_eq!(h, 1920);
        assert_eq!(url, "tall");
    }
}
