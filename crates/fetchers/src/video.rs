//! Video-channel fetcher driven by the yt-dlp subprocess.
//!
//! Discovery enumerates recent uploads with a `--break-match-filters`
//! date boundary; each video then gets a second yt-dlp run that writes
//! auto/manual English subtitles into a scratch directory, which are
//! parsed into a plain transcript. Videos without transcripts are still
//! stored, low priority, so the item is not silently lost.

use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::json;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use prismis_config::Config;
use prismis_core::{ContentItem, Error, Priority, Result, Source, SourceKind};

use crate::ContentFetcher;
use crate::vtt::parse_subtitle_text;

const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(60);
const TRANSCRIPT_TIMEOUT: Duration = Duration::from_secs(60);
/// Subtitle files occasionally land a beat after yt-dlp exits; poll
/// briefly before concluding the video has no captions.
const SUBTITLE_POLL: Duration = Duration::from_secs(3);
/// yt-dlp exits 101 when --break-match-filters stops at the date
/// boundary; everything printed before that is good output.
const BREAK_FILTER_EXIT: i32 = 101;

#[derive(Debug, Clone)]
struct VideoMeta {
    id: String,
    title: String,
    url: String,
    duration: Option<i64>,
    upload_date: Option<String>,
    view_count: Option<i64>,
}

pub struct VideoFetcher {
    max_items: usize,
    max_days_lookback: i64,
    yt_dlp: String,
}

impl VideoFetcher {
    pub fn new(config: &Config) -> Self {
        Self {
            max_items: config.max_items(SourceKind::Video) as usize,
            max_days_lookback: config.daemon.max_days_lookback as i64,
            yt_dlp: "yt-dlp".to_string(),
        }
    }

    async fn fetch_inner(&self, source: &Source) -> Result<Vec<ContentItem>> {
        let channel_url = normalize_channel_url(&source.url);
        info!(channel = %channel_url, "discovering channel videos");

        let videos = self.discover_videos(&channel_url).await?;
        if videos.is_empty() {
            info!(channel = %channel_url, "no recent videos");
            return Ok(Vec::new());
        }

        let mut items = Vec::new();
        for video in videos.into_iter().take(self.max_items) {
            let started = Instant::now();
            match self.extract_transcript(&video).await {
                Some(transcript) => {
                    debug!(
                        video = %video.id,
                        secs = started.elapsed().as_secs(),
                        "transcript extracted"
                    );
                    items.push(to_content_item(&video, transcript, &source.id));
                }
                None => {
                    debug!(video = %video.id, "no transcript available");
                    items.push(missing_transcript_item(&video, &source.id));
                }
            }
        }
        Ok(items)
    }

    /// Enumerate recent uploads via `--print` with a pipe-delimited
    /// template. Bounded by a hard timeout; the filter-boundary exit code
    /// is success.
    async fn discover_videos(&self, channel_url: &str) -> Result<Vec<VideoMeta>> {
        let date_after = (Utc::now() - chrono::Duration::days(self.max_days_lookback))
            .format("%Y%m%d")
            .to_string();

        let mut cmd = Command::new(&self.yt_dlp);
        cmd.arg("--simulate")
            .arg("--playlist-end")
            .arg(self.max_items.to_string())
            .arg("--print")
            .arg("%(id)s|%(title)s|%(duration)s|%(upload_date)s|%(view_count)s|%(webpage_url)s")
            .arg("--socket-timeout")
            .arg("120")
            .arg("--retries")
            .arg("3")
            .arg("--break-match-filters")
            .arg(format!("upload_date>={date_after}"))
            .arg(channel_url)
            .kill_on_drop(true);

        let output = timeout(DISCOVERY_TIMEOUT, cmd.output())
            .await
            .map_err(|_| Error::fetch(format!("channel discovery timed out: {channel_url}")))?
            .map_err(|e| Error::fetch(format!("yt-dlp not runnable: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let exit = output.status.code().unwrap_or(-1);

        if !output.status.success() && exit != BREAK_FILTER_EXIT {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.to_lowercase().contains("no videos") || stdout.trim().is_empty() {
                return Ok(Vec::new());
            }
            return Err(Error::fetch(format!(
                "yt-dlp discovery failed ({exit}): {}",
                stderr.trim()
            )));
        }

        Ok(parse_discovery_output(&stdout))
    }

    /// Pull English subtitles for one video into a scratch dir and parse
    /// them. None when the video has no captions or the run times out.
    async fn extract_transcript(&self, video: &VideoMeta) -> Option<String> {
        let scratch = tempfile::tempdir().ok()?;

        let mut cmd = Command::new(&self.yt_dlp);
        cmd.arg("--write-auto-sub")
            .arg("--write-sub")
            .arg("--sub-lang")
            .arg("en,en-US,en-GB")
            .arg("--skip-download")
            .arg("--quiet")
            .arg("--no-warnings")
            .arg("--output")
            .arg(scratch.path().join("%(id)s.%(ext)s"))
            .arg(&video.url)
            .kill_on_drop(true);

        match timeout(TRANSCRIPT_TIMEOUT, cmd.output()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                warn!(video = %video.id, error = %e, "transcript run failed");
                return None;
            }
            Err(_) => {
                warn!(video = %video.id, "transcript extraction timed out");
                return None;
            }
        }

        let deadline = tokio::time::Instant::now() + SUBTITLE_POLL;
        loop {
            if let Some(raw) = find_subtitle_file(scratch.path(), &video.id) {
                let text = parse_subtitle_text(&raw);
                return (!text.is_empty()).then_some(text);
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }
}

/// Pick the best subtitle file yt-dlp wrote, preferring an exact
/// video-id + English match, then any .vtt/.srt.
fn find_subtitle_file(dir: &Path, video_id: &str) -> Option<String> {
    let entries: Vec<_> = std::fs::read_dir(dir)
        .ok()?
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().to_str()?.to_string();
            (name.ends_with(".vtt") || name.ends_with(".srt")).then_some((name, entry.path()))
        })
        .collect();

    let ranked = entries
        .iter()
        .find(|(name, _)| name.starts_with(video_id) && name.contains(".en"))
        .or_else(|| entries.iter().find(|(name, _)| name.starts_with(video_id)))
        .or_else(|| entries.iter().find(|(name, _)| name.contains(".en")))
        .or_else(|| entries.first());

    ranked.and_then(|(_, path)| std::fs::read_to_string(path).ok())
}

/// Parse `id|title|duration|upload_date|view_count|url` lines, skipping
/// anything malformed.
fn parse_discovery_output(stdout: &str) -> Vec<VideoMeta> {
    let mut videos = Vec::new();
    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split('|').collect();
        if parts.len() < 6 {
            warn!(line, "unparseable discovery line");
            continue;
        }
        let (id, title, duration, upload_date, view_count, url) =
            (parts[0], parts[1], parts[2], parts[3], parts[4], parts[5]);

        videos.push(VideoMeta {
            id: id.to_string(),
            title: title.to_string(),
            url: if url.starts_with("http") {
                url.to_string()
            } else {
                format!("https://www.youtube.com/watch?v={id}")
            },
            duration: (duration != "NA").then(|| duration.parse().ok()).flatten(),
            upload_date: (upload_date != "NA").then(|| upload_date.to_string()),
            view_count: (view_count != "NA").then(|| view_count.parse().ok()).flatten(),
        });
    }
    videos
}

fn normalize_channel_url(url: &str) -> String {
    let url = url.trim();
    if url.starts_with('@') {
        return format!("https://www.youtube.com/{url}");
    }
    if !url.starts_with("http") {
        return format!("https://www.youtube.com/@{url}");
    }
    url.to_string()
}

/// yt-dlp upload dates are bare `YYYYMMDD`.
fn parse_upload_date(date: Option<&str>) -> Option<DateTime<Utc>> {
    let date = date?;
    NaiveDate::parse_from_str(date, "%Y%m%d")
        .ok()?
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
}

fn metrics(video: &VideoMeta) -> serde_json::Value {
    json!({
        "video_id": video.id,
        "view_count": video.view_count,
        "duration": video.duration,
    })
}

fn to_content_item(video: &VideoMeta, transcript: String, source_id: &str) -> ContentItem {
    let mut item = ContentItem::new(
        source_id,
        video.url.clone(),
        video.title.clone(),
        video.url.clone(),
        transcript,
    );
    item.published_at = parse_upload_date(video.upload_date.as_deref());
    item.fetched_at = Utc::now();
    item.analysis = Some(json!({"metrics": metrics(video)}));
    item
}

fn missing_transcript_item(video: &VideoMeta, source_id: &str) -> ContentItem {
    let mut item = ContentItem::new(
        source_id,
        video.url.clone(),
        video.title.clone(),
        video.url.clone(),
        format!(
            "Video title: {}\n\nNo transcript available for this video.",
            video.title
        ),
    );
    item.published_at = parse_upload_date(video.upload_date.as_deref());
    item.fetched_at = Utc::now();
    item.priority = Some(Priority::Low);
    item.notes = Some("No transcript available".to_string());
    item.analysis = Some(json!({"metrics": metrics(video)}));
    item
}

#[async_trait]
impl ContentFetcher for VideoFetcher {
    async fn fetch(&self, source: &Source) -> Result<Vec<ContentItem>> {
        let started = Instant::now();
        match self.fetch_inner(source).await {
            Ok(items) => {
                prismis_observability::log(
                    "fetcher.complete",
                    json!({
                        "fetcher_type": "youtube",
                        "source_id": source.id,
                        "source_url": source.url,
                        "items_count": items.len(),
                        "duration_ms": started.elapsed().as_millis() as u64,
                        "status": "success",
                    }),
                );
                Ok(items)
            }
            Err(e) => {
                prismis_observability::log(
                    "fetcher.error",
                    json!({
                        "fetcher_type": "youtube",
                        "source_id": source.id,
                        "source_url": source.url,
                        "error": e.to_string(),
                        "duration_ms": started.elapsed().as_millis() as u64,
                        "status": "error",
                    }),
                );
                Err(e)
            }
        }
    }
}
