//! Room Session
//!
//! Per-room cache of the identifiers needed to open a stream connection:
//! the user-supplied short room id, the lazily resolved long room id, the
//! session cookie token, and the randomized client token. The long id is
//! scraped from the room's public page, which embeds it in one of two known
//! formats.

use regex::Regex;

use crate::signature::{self, DEFAULT_CLIENT_TOKEN_LEN};

use super::{StreamConfig, StreamError};

/// How much of a fetched page is kept in a resolution error, to aid
/// debugging markup drift without dumping whole documents into logs.
const PAGE_EXCERPT_CHARS: usize = 500;

/// Cached identity for one watched room.
///
/// Created on the first watch request; the long id and session token are
/// resolved lazily and kept for the client's lifetime. Switching rooms
/// means a fresh session with the still-valid token seeded in.
pub struct RoomSession {
    short_id: String,
    long_id: Option<String>,
    session_token: Option<String>,
    client_token: String,
}

impl RoomSession {
    pub fn new(short_id: impl Into<String>) -> Self {
        Self {
            short_id: short_id.into(),
            long_id: None,
            session_token: None,
            client_token: signature::generate_client_token(DEFAULT_CLIENT_TOKEN_LEN),
        }
    }

    pub fn short_id(&self) -> &str {
        &self.short_id
    }

    /// Seed a session token obtained elsewhere (avoids refetching when the
    /// caller already holds one).
    pub fn set_session_token(&mut self, token: String) {
        self.session_token = Some(token);
    }

    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    /// Resolve and cache the session cookie token.
    pub async fn ensure_session_token(
        &mut self,
        http: &reqwest::Client,
        config: &StreamConfig,
    ) -> Result<String, StreamError> {
        if let Some(token) = &self.session_token {
            return Ok(token.clone());
        }

        let token = signature::fetch_session_token(http, &config.base_url).await?;
        tracing::debug!(room = %self.short_id, "session token resolved");
        self.session_token = Some(token.clone());
        Ok(token)
    }

    /// Resolve and cache the long room id by scraping the room's public
    /// page.
    pub async fn ensure_room_id(
        &mut self,
        http: &reqwest::Client,
        config: &StreamConfig,
    ) -> Result<String, StreamError> {
        if let Some(id) = &self.long_id {
            return Ok(id.clone());
        }

        let token = self.ensure_session_token(http, config).await?;
        let page_url = format!("{}{}", config.base_url, self.short_id);
        let cookie = format!("ttwid={token}; msToken={};", self.client_token);

        let response = http
            .get(&page_url)
            .header(reqwest::header::COOKIE, cookie)
            .header(reqwest::header::REFERER, config.base_url.as_str())
            .send()
            .await
            .map_err(|e| StreamError::RoomIdResolution {
                reason: format!("room page request failed: {e}"),
                excerpt: String::new(),
            })?;

        let status = response.status();
        let html = response
            .text()
            .await
            .map_err(|e| StreamError::RoomIdResolution {
                reason: format!("room page body unreadable: {e}"),
                excerpt: String::new(),
            })?;

        if !status.is_success() {
            return Err(StreamError::RoomIdResolution {
                reason: format!("room page returned {status}"),
                excerpt: page_excerpt(&html),
            });
        }

        let id = extract_room_id(&html).ok_or_else(|| StreamError::RoomIdResolution {
            reason: "no room id marker found in page".to_string(),
            excerpt: page_excerpt(&html),
        })?;

        tracing::info!(room = %self.short_id, room_id = %id, "room id resolved");
        self.long_id = Some(id.clone());
        Ok(id)
    }
}

/// Pull the long room id out of a room page.
///
/// The page embeds it either as a plain JS property (`roomId:"123"`) or
/// escaped inside a JSON string (`roomId\":\"123\"`).
pub fn extract_room_id(html: &str) -> Option<String> {
    let pattern = Regex::new(r#"roomId\s*:\s*"(\d+)"|roomId\\":\\"(\d+)"#).ok()?;
    let captures = pattern.captures(html)?;
    captures
        .get(1)
        .or_else(|| captures.get(2))
        .map(|m| m.as_str().to_string())
}

/// Bounded excerpt of a fetched page for error reporting.
fn page_excerpt(html: &str) -> String {
    html.chars().take(PAGE_EXCERPT_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_room_id_plain_format() {
        let html = r#"<script>var data = {roomId:"7381929301", other: 1};</script>"#;
        assert_eq!(extract_room_id(html), Some("7381929301".to_string()));
    }

    #[test]
    fn test_extract_room_id_plain_format_with_spaces() {
        let html = r#"roomId : "42""#;
        assert_eq!(extract_room_id(html), Some("42".to_string()));
    }

    #[test]
    fn test_extract_room_id_escaped_format() {
        let html = r#"{"state":"{\"roomStore\":{\"roomId\":\"9988776655\",\"x\":1}}"}"#;
        assert_eq!(extract_room_id(html), Some("9988776655".to_string()));
    }

    #[test]
    fn test_extract_room_id_absent() {
        assert_eq!(extract_room_id("<html>no markers here</html>"), None);
        assert_eq!(extract_room_id(r#"roomId:"not-digits""#), None);
    }

    #[test]
    fn test_page_excerpt_is_bounded() {
        let long_page = "x".repeat(10_000);
        assert_eq!(page_excerpt(&long_page).len(), PAGE_EXCERPT_CHARS);

        // Multi-byte content must not panic on a char boundary.
        let unicode_page = "直播".repeat(5_000);
        assert_eq!(page_excerpt(&unicode_page).chars().count(), PAGE_EXCERPT_CHARS);
    }

    #[test]
    fn test_seeded_token_is_returned() {
        let mut session = RoomSession::new("78888888");
        assert!(session.session_token().is_none());

        session.set_session_token("tok".to_string());
        assert_eq!(session.session_token(), Some("tok"));
    }

    #[test]
    fn test_new_session_generates_client_token() {
        let session = RoomSession::new("1");
        assert_eq!(session.client_token.len(), DEFAULT_CLIENT_TOKEN_LEN);
    }
}
