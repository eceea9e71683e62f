//! Podcast RSS feed fetching and parsing
//!
//! Handles the subset of RSS 2.0 + iTunes extensions that podcast apps rely
//! on: item title/guid/pubDate/description, the `<enclosure url=…>` audio
//! link and `<itunes:duration>`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::{debug, info, warn};

use super::rate_limiter::{RateLimitedClient, UpstreamError};

/// Episode parsed from a feed `<item>`
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEpisode {
    pub guid: String,
    pub title: String,
    pub description: Option<String>,
    /// RFC 3339
    pub pub_date: Option<String>,
    pub audio_url: Option<String>,
    pub duration_seconds: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedFeed {
    /// Channel-level description
    pub description: Option<String>,
    pub episodes: Vec<FeedEpisode>,
}

pub struct PodcastFeedClient {
    client: RateLimitedClient,
}

impl PodcastFeedClient {
    pub fn new() -> Self {
        Self {
            client: RateLimitedClient::for_rss(),
        }
    }

    /// Fetch and parse a feed
    pub async fn fetch_feed(&self, url: &str) -> Result<ParsedFeed> {
        info!(url = %url, "Fetching podcast feed");

        let response = self
            .client
            .get_with_headers_and_query(url, &[], &[] as &[(&str, &str)])
            .await
            .context("Failed to fetch podcast feed")?;

        if let Some(err) = UpstreamError::from_status(self.client.name(), response.status()) {
            return Err(err.into());
        }

        let content = response
            .text()
            .await
            .context("Failed to read podcast feed content")?;

        Ok(parse_feed(&content))
    }
}

impl Default for PodcastFeedClient {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct EpisodeBuilder {
    guid: Option<String>,
    title: Option<String>,
    description: Option<String>,
    pub_date: Option<String>,
    audio_url: Option<String>,
    duration: Option<String>,
}

impl EpisodeBuilder {
    fn set_text(&mut self, tag: &str, text: String) {
        match tag {
            "title" => self.title = Some(text),
            "guid" => self.guid = Some(text),
            "pubDate" => self.pub_date = Some(text),
            "description" | "content:encoded" if self.description.is_none() => {
                self.description = Some(text)
            }
            "itunes:summary" if self.description.is_none() => self.description = Some(text),
            "itunes:duration" => self.duration = Some(text),
            _ => {}
        }
    }

    /// Items without a title are dropped; the guid falls back to the
    /// enclosure url, then the title.
    fn build(self) -> Option<FeedEpisode> {
        let title = self.title.filter(|t| !t.trim().is_empty())?;
        let guid = self
            .guid
            .filter(|g| !g.trim().is_empty())
            .or_else(|| self.audio_url.clone())
            .unwrap_or_else(|| title.clone());

        Some(FeedEpisode {
            guid,
            title,
            description: self.description,
            pub_date: self.pub_date.as_deref().and_then(parse_rss_date).map(|d| d.to_rfc3339()),
            audio_url: self.audio_url,
            duration_seconds: self.duration.as_deref().and_then(parse_duration),
        })
    }
}

/// Parse RSS XML. Malformed XML stops parsing and keeps what was read so far.
pub fn parse_feed(content: &str) -> ParsedFeed {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut feed = ParsedFeed::default();
    let mut current: Option<EpisodeBuilder> = None;
    let mut current_tag = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let tag = tag_name(e);
                if tag == "item" {
                    current = Some(EpisodeBuilder::default());
                } else if tag == "enclosure"
                    && let Some(ref mut builder) = current
                {
                    builder.audio_url = enclosure_url(e);
                }
                current_tag = tag;
            }
            Ok(Event::Empty(ref e)) => {
                if tag_name(e) == "enclosure"
                    && let Some(ref mut builder) = current
                {
                    builder.audio_url = enclosure_url(e);
                }
            }
            Ok(Event::End(ref e)) => {
                if e.name().as_ref() == b"item"
                    && let Some(builder) = current.take()
                    && let Some(episode) = builder.build()
                {
                    feed.episodes.push(episode);
                }
                current_tag.clear();
            }
            Ok(Event::Text(ref e)) => {
                let text = e.unescape().unwrap_or_default().to_string();
                apply_text(&mut feed, &mut current, &current_tag, text);
            }
            Ok(Event::CData(ref e)) => {
                let text = String::from_utf8_lossy(e.as_ref()).to_string();
                apply_text(&mut feed, &mut current, &current_tag, text);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!(error = ?e, "Error parsing podcast feed XML");
                break;
            }
            _ => {}
        }
    }

    debug!(episodes = feed.episodes.len(), "Parsed podcast feed");
    feed
}

fn apply_text(feed: &mut ParsedFeed, current: &mut Option<EpisodeBuilder>, tag: &str, text: String) {
    match current {
        Some(builder) => builder.set_text(tag, text),
        // Channel description appears before the first item
        None if tag == "description" && feed.description.is_none() => feed.description = Some(text),
        None => {}
    }
}

fn tag_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.name().as_ref()).to_string()
}

fn enclosure_url(e: &BytesStart) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == b"url")
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.to_string()))
}

/// `itunes:duration` is either plain seconds or `[HH:]MM:SS`
pub fn parse_duration(s: &str) -> Option<i64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let mut total = 0i64;
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() > 3 {
        return None;
    }
    for part in parts {
        let value: i64 = part.trim().parse().ok()?;
        total = total * 60 + value;
    }
    Some(total)
}

/// Parse RSS date format (RFC 2822), with a few common variations
fn parse_rss_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    let formats = ["%a, %d %b %Y %H:%M:%S GMT", "%a, %d %b %Y %H:%M %z", "%Y-%m-%d %H:%M:%S"];
    for fmt in formats {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc());
        }
    }

    debug!(date = %s, "Failed to parse feed date");
    None
}
