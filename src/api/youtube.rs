use crate::config::Config;
use anyhow::{Context, Result};
use reqwest::multipart;
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;

/// Snippet-level metadata for one upload.
#[derive(Debug, Clone)]
pub struct UploadMeta {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub privacy: String,
    pub language: String,
}

pub fn has_credentials(cfg: &Config) -> bool {
    !cfg.yt_client_id.is_empty()
        && !cfg.yt_client_secret.is_empty()
        && !cfg.yt_refresh_token.is_empty()
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct InsertResponse {
    #[serde(default)]
    id: String,
}

async fn access_token(client: &Client, cfg: &Config) -> Result<String> {
    let resp = client
        .post("https://oauth2.googleapis.com/token")
        .form(&[
            ("client_id", cfg.yt_client_id.as_str()),
            ("client_secret", cfg.yt_client_secret.as_str()),
            ("refresh_token", cfg.yt_refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ])
        .timeout(std::time::Duration::from_secs(30))
        .send()
        .await
        .context("OAuth token request failed")?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!(
            "OAuth token HTTP {}: {}",
            status.as_u16(),
            body.chars().take(200).collect::<String>()
        );
    }
    let tok: TokenResponse = resp.json().await.context("OAuth token parse failed")?;
    Ok(tok.access_token)
}

/// Multipart videos.insert. Returns the new video id.
pub async fn upload(
    client: &Client,
    cfg: &Config,
    video_path: &Path,
    meta: &UploadMeta,
) -> Result<String> {
    if !has_credentials(cfg) {
        anyhow::bail!("Missing YT_CLIENT_ID / YT_CLIENT_SECRET / YT_REFRESH_TOKEN");
    }
    let token = access_token(client, cfg).await?;

    let body = serde_json::json!({
        "snippet": {
            "title": meta.title,
            "description": meta.description,
            "tags": meta.tags,
            "categoryId": "27",
            "defaultLanguage": meta.language,
            "defaultAudioLanguage": meta.language,
        },
        "status": {
            "privacyStatus": meta.privacy,
            "selfDeclaredMadeForKids": false,
        },
    });

    let bytes = tokio::fs::read(video_path)
        .await
        .with_context(|| format!("Read {} failed", video_path.display()))?;

    let form = multipart::Form::new()
        .part(
            "metadata",
            multipart::Part::text(body.to_string()).mime_str("application/json")?,
        )
        .part(
            "video",
            multipart::Part::bytes(bytes).mime_str("video/mp4")?,
        );

    let resp = client
        .post("https://www.googleapis.com/upload/youtube/v3/videos")
        .query(&[("uploadType", "multipart"), ("part", "snippet,status")])
        .bearer_auth(token)
        .multipart(form)
        .timeout(std::time::Duration::from_secs(1800))
        .send()
        .await
        .context("Upload request failed")?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!(
            "YouTube upload HTTP {}: {}",
            status.as_u16(),
            body.chars().take(300).collect::<String>()
        );
    }
    let data: InsertResponse = resp.json().await.context("Upload response parse failed")?;
    Ok(data.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_need_all_three_fields() {
        let mut cfg = Config::default();
        assert!(!has_credentials(&cfg));
        cfg.yt_client_id = "id".into();
        cfg.yt_client_secret = "secret".into();
        assert!(!has_credentials(&cfg));
        cfg.yt_refresh_token = "refresh".into();
        assert!(has_credentials(&cfg));
    }
}
