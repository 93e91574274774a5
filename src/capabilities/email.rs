//! `fetch_emails`: trip-related mail search over the Gmail REST API.

use crate::config::MailSettings;
use crate::error::{Result, TripsyError};
use crate::tools::{Capability, ToolArguments, ToolDeclaration};
use async_trait::async_trait;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};
use url::Url;

pub const TOOL_NAME: &str = "fetch_emails";

/// Gmail encodes bodies as base64url, sometimes without padding.
const BASE64_URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

pub fn declaration() -> ToolDeclaration {
    ToolDeclaration::new(
        TOOL_NAME,
        "Fetch emails from the user's mailbox. Use this to find flight, hotel, rental and \
         reservation confirmations for a trip. Dates use the YYYY/MM/DD format.",
        json!({
            "type": "object",
            "properties": {
                "labels": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Mailbox labels to search, e.g. ['VACATION']"
                },
                "start_date": {
                    "type": "string",
                    "description": "Only emails received after this date (YYYY/MM/DD)"
                },
                "end_date": {
                    "type": "string",
                    "description": "Only emails received before this date (YYYY/MM/DD)"
                },
                "title_keywords": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Match emails whose subject contains any of these keywords"
                },
                "content_keywords": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Keep only emails whose subject or body contains any of these keywords"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of emails to fetch"
                }
            }
        }),
    )
}

/// Arguments accepted by `fetch_emails`.
#[derive(Debug, Default, Deserialize)]
pub struct EmailQuery {
    #[serde(default)]
    pub labels: Vec<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    #[serde(default)]
    pub title_keywords: Vec<String>,
    #[serde(default)]
    pub content_keywords: Vec<String>,
    pub max_results: Option<u32>,
}

/// One fetched email as returned to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Email {
    pub id: String,
    pub subject: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub date: Option<String>,
    pub body: String,
}

/// Build a Gmail search query.
///
/// Explicit labels replace the default label. Subject keywords are OR-ed;
/// every other clause is AND-ed by Gmail.
pub fn build_query(
    labels: &[String],
    default_label: &str,
    start_date: Option<&str>,
    end_date: Option<&str>,
    title_keywords: &[String],
) -> Result<String> {
    let mut parts = Vec::new();

    if labels.is_empty() {
        if !default_label.is_empty() {
            parts.push(format!("label:{}", default_label));
        }
    } else {
        parts.extend(labels.iter().map(|l| format!("label:{}", l)));
    }

    if let Some(start) = start_date {
        parts.push(format!("after:{}", normalize_date(start)?));
    }
    if let Some(end) = end_date {
        parts.push(format!("before:{}", normalize_date(end)?));
    }

    if !title_keywords.is_empty() {
        let subjects: Vec<String> = title_keywords
            .iter()
            .map(|k| format!("subject:\"{}\"", k))
            .collect();
        parts.push(subjects.join(" OR "));
    }

    Ok(parts.join(" "))
}

/// Validate a date and render it as `YYYY/MM/DD`. ISO dates are accepted too.
fn normalize_date(date: &str) -> Result<String> {
    let date = date.trim();
    NaiveDate::parse_from_str(date, "%Y/%m/%d")
        .or_else(|_| NaiveDate::parse_from_str(date, "%Y-%m-%d"))
        .map(|d| d.format("%Y/%m/%d").to_string())
        .map_err(|_| TripsyError::InvalidInput(format!("Invalid date '{}', expected YYYY/MM/DD", date)))
}

/// Keep emails whose subject or body mentions any keyword, case-insensitively.
pub fn filter_by_keywords(emails: Vec<Email>, keywords: &[String]) -> Vec<Email> {
    if keywords.is_empty() {
        return emails;
    }
    let keywords: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();

    emails
        .into_iter()
        .filter(|email| {
            let haystack = format!(
                "{}\n{}",
                email.subject.as_deref().unwrap_or_default(),
                email.body
            )
            .to_lowercase();
            keywords.iter().any(|k| haystack.contains(k.as_str()))
        })
        .collect()
}

// ── Gmail wire types ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GmailMessage {
    id: String,
    payload: MessagePart,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MessagePart {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    headers: Vec<Header>,
    #[serde(default)]
    body: PartBody,
    #[serde(default)]
    parts: Vec<MessagePart>,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    value: String,
}

#[derive(Debug, Default, Deserialize)]
struct PartBody {
    data: Option<String>,
}

/// Flatten a MIME tree into its leaf parts, depth first.
fn collect_parts(part: &MessagePart) -> Vec<&MessagePart> {
    if part.parts.is_empty() {
        vec![part]
    } else {
        part.parts.iter().flat_map(collect_parts).collect()
    }
}

fn decode_body(data: &str) -> Result<String> {
    let bytes = BASE64_URL
        .decode(data.trim())
        .map_err(|e| TripsyError::Mail(format!("Invalid message body encoding: {}", e)))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Turns Gmail message payloads into [`Email`] records.
#[derive(Debug, Clone)]
pub struct MessageParser {
    hidden_regex: Regex,
    tag_regex: Regex,
    space_regex: Regex,
}

impl Default for MessageParser {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageParser {
    pub fn new() -> Self {
        Self {
            hidden_regex: Regex::new(r"(?is)<(script|style|head)[^>]*>.*?</(script|style|head)>")
                .expect("Invalid regex"),
            tag_regex: Regex::new(r"(?s)<[^>]*>").expect("Invalid regex"),
            space_regex: Regex::new(r"[ \t\r\f]*\n[\s]*|[ \t]{2,}").expect("Invalid regex"),
        }
    }

    /// Reduce an HTML body to its readable text.
    pub fn strip_html(&self, html: &str) -> String {
        let text = self.hidden_regex.replace_all(html, " ");
        let text = self.tag_regex.replace_all(&text, " ");
        let text = text
            .replace("&nbsp;", " ")
            .replace("&amp;", "&")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&#39;", "'");
        self.space_regex
            .replace_all(&text, |caps: &regex::Captures| {
                if caps[0].contains('\n') {
                    "\n".to_string()
                } else {
                    " ".to_string()
                }
            })
            .trim()
            .to_string()
    }

    /// Plain text body if present, otherwise the HTML body stripped of markup.
    fn body(&self, payload: &MessagePart) -> Result<String> {
        let mut plain = None;
        let mut html = None;

        for part in collect_parts(payload) {
            let Some(data) = part.body.data.as_deref() else {
                continue;
            };
            match part.mime_type.as_str() {
                "text/plain" if plain.is_none() => plain = Some(decode_body(data)?),
                "text/html" if html.is_none() => html = Some(decode_body(data)?),
                _ => {}
            }
        }

        Ok(match (plain, html) {
            (Some(text), _) if !text.trim().is_empty() => text,
            (_, Some(html)) => self.strip_html(&html),
            (Some(text), None) => text,
            (None, None) => String::new(),
        })
    }

    pub(crate) fn parse(&self, message: GmailMessage) -> Result<Email> {
        let header = |name: &str| {
            message
                .payload
                .headers
                .iter()
                .find(|h| h.name.eq_ignore_ascii_case(name))
                .map(|h| h.value.clone())
        };

        Ok(Email {
            subject: header("Subject"),
            from: header("From"),
            to: header("To"),
            date: header("Date"),
            body: self.body(&message.payload)?,
            id: message.id,
        })
    }

    /// Parse every message, skipping the ones whose body cannot be decoded.
    pub(crate) fn parse_all(&self, messages: Vec<GmailMessage>) -> Vec<Email> {
        messages
            .into_iter()
            .filter_map(|message| {
                let id = message.id.clone();
                match self.parse(message) {
                    Ok(email) => Some(email),
                    Err(e) => {
                        warn!("Skipping message {}: {}", id, e);
                        None
                    }
                }
            })
            .collect()
    }
}

/// Minimal Gmail REST client for the signed-in user's mailbox.
#[derive(Debug, Clone)]
pub struct GmailClient {
    http: reqwest::Client,
    base_url: Url,
    access_token: String,
}

impl GmailClient {
    pub fn new(base_url: &str, access_token: impl Into<String>) -> Result<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| TripsyError::Config(format!("Invalid mail base_url '{}': {}", base_url, e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            access_token: access_token.into(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| TripsyError::Mail(format!("Invalid Gmail endpoint '{}': {}", path, e)))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, String)],
    ) -> Result<T> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TripsyError::Mail(format!(
                "Gmail API returned {}: {}",
                status.as_u16(),
                body.trim()
            )));
        }

        Ok(response.json().await?)
    }

    /// Ids of messages matching a search query.
    pub async fn search(&self, query: &str, max_results: u32) -> Result<Vec<String>> {
        let list: MessageList = self
            .get_json(
                self.endpoint("users/me/messages")?,
                &[("q", query.to_string()), ("maxResults", max_results.to_string())],
            )
            .await?;
        Ok(list.messages.into_iter().map(|m| m.id).collect())
    }

    pub(crate) async fn message(&self, id: &str) -> Result<GmailMessage> {
        self.get_json(
            self.endpoint(&format!("users/me/messages/{}", id))?,
            &[("format", "full".to_string())],
        )
        .await
    }
}

/// The `fetch_emails` capability.
#[derive(Debug, Clone)]
pub struct EmailCapability {
    settings: MailSettings,
    parser: MessageParser,
}

impl EmailCapability {
    pub fn new(settings: MailSettings) -> Self {
        Self {
            settings,
            parser: MessageParser::new(),
        }
    }

    #[instrument(skip_all)]
    async fn fetch(&self, query: EmailQuery) -> Result<Vec<Email>> {
        let search = build_query(
            &query.labels,
            &self.settings.default_label,
            query.start_date.as_deref(),
            query.end_date.as_deref(),
            &query.title_keywords,
        )?;
        let max_results = query.max_results.unwrap_or(self.settings.max_results);

        let client = GmailClient::new(&self.settings.base_url, self.settings.access_token()?)?;
        info!("Searching mail with query: {}", search);

        let ids = client.search(&search, max_results).await?;
        debug!("Found {} message(s)", ids.len());

        let mut messages = Vec::with_capacity(ids.len());
        for id in ids {
            messages.push(client.message(&id).await?);
        }
        let emails = self.parser.parse_all(messages);

        Ok(filter_by_keywords(emails, &query.content_keywords))
    }
}

#[async_trait]
impl Capability for EmailCapability {
    async fn invoke(&self, args: ToolArguments) -> Result<Value> {
        let query: EmailQuery = args.parse()?;
        let emails = self.fetch(query).await?;
        Ok(serde_json::to_value(emails)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(text: &str) -> String {
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(text)
    }

    fn email(subject: &str, body: &str) -> Email {
        Email {
            id: subject.to_string(),
            subject: Some(subject.to_string()),
            from: None,
            to: None,
            date: None,
            body: body.to_string(),
        }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_build_query_defaults_to_configured_label() {
        let query = build_query(
            &[],
            "VACATION",
            Some("2025/03/05"),
            Some("2025/03/15"),
            &strings(&["booking", "hotel"]),
        )
        .unwrap();
        assert_eq!(
            query,
            r#"label:VACATION after:2025/03/05 before:2025/03/15 subject:"booking" OR subject:"hotel""#
        );
    }

    #[test]
    fn test_build_query_uses_given_labels() {
        let query = build_query(&strings(&["INBOX", "UPDATES"]), "VACATION", None, None, &[]).unwrap();
        assert_eq!(query, "label:INBOX label:UPDATES");
    }

    #[test]
    fn test_build_query_normalizes_iso_dates() {
        let query = build_query(&[], "", Some("2025-03-05"), None, &[]).unwrap();
        assert_eq!(query, "after:2025/03/05");
    }

    #[test]
    fn test_build_query_rejects_bad_date() {
        let result = build_query(&[], "VACATION", Some("2025/13/45"), None, &[]);
        assert!(matches!(result, Err(TripsyError::InvalidInput(_))));
    }

    #[test]
    fn test_filter_without_keywords_keeps_all() {
        let emails = vec![email("a", "x"), email("b", "y")];
        assert_eq!(filter_by_keywords(emails, &[]).len(), 2);
    }

    #[test]
    fn test_filter_matches_subject_or_body_case_insensitively() {
        let emails = vec![
            email("Your Emirates itinerary", "See attached."),
            email("Newsletter", "Book a HOTEL today"),
            email("Receipt", "Thanks for shopping"),
        ];
        let kept = filter_by_keywords(emails, &strings(&["emirates", "Hotel"]));
        let ids: Vec<_> = kept.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["Your Emirates itinerary", "Newsletter"]);
    }

    #[test]
    fn test_filter_does_not_match_across_subject_body_boundary() {
        // "trip" must not be found by joining the subject "tri" with the body "p...".
        let emails = vec![email("tri", "parking notice")];
        assert!(filter_by_keywords(emails, &strings(&["trip"])).is_empty());
    }

    #[test]
    fn test_parse_prefers_plain_text_body() {
        let message: GmailMessage = serde_json::from_value(json!({
            "id": "m1",
            "payload": {
                "mimeType": "multipart/alternative",
                "headers": [
                    {"name": "Subject", "value": "Booking confirmed"},
                    {"name": "from", "value": "hotel@example.com"},
                    {"name": "DATE", "value": "Mon, 3 Mar 2025 10:00:00 +0000"}
                ],
                "parts": [
                    {"mimeType": "text/html", "body": {"data": encode("<p>HTML body</p>")}},
                    {
                        "mimeType": "multipart/related",
                        "parts": [
                            {"mimeType": "text/plain", "body": {"data": encode("Plain body")}}
                        ]
                    }
                ]
            }
        }))
        .unwrap();

        let parsed = MessageParser::new().parse(message).unwrap();
        assert_eq!(parsed.id, "m1");
        assert_eq!(parsed.subject.as_deref(), Some("Booking confirmed"));
        assert_eq!(parsed.from.as_deref(), Some("hotel@example.com"));
        assert!(parsed.date.is_some());
        assert!(parsed.to.is_none());
        assert_eq!(parsed.body, "Plain body");
    }

    #[test]
    fn test_parse_falls_back_to_stripped_html() {
        let html = "<html><head><style>p{}</style></head><body><p>Check-in&nbsp;March 5</p>\n<p>Room 12</p></body></html>";
        let message: GmailMessage = serde_json::from_value(json!({
            "id": "m2",
            "payload": {
                "mimeType": "text/html",
                "headers": [],
                "body": {"data": encode(html)}
            }
        }))
        .unwrap();

        let parsed = MessageParser::new().parse(message).unwrap();
        assert!(parsed.body.contains("Check-in March 5"));
        assert!(parsed.body.contains("Room 12"));
        assert!(!parsed.body.contains('<'));
        assert!(!parsed.body.contains("p{}"));
    }

    #[test]
    fn test_undecodable_message_is_skipped() {
        let messages: Vec<GmailMessage> = serde_json::from_value(json!([
            {
                "id": "broken",
                "payload": {"mimeType": "text/plain", "headers": [], "body": {"data": "***"}}
            },
            {
                "id": "flight",
                "payload": {
                    "mimeType": "text/plain",
                    "headers": [{"name": "Subject", "value": "Your flight to Oslo"}],
                    "body": {"data": encode("Departure 08:15")}
                }
            }
        ]))
        .unwrap();

        let emails = MessageParser::new().parse_all(messages);
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].id, "flight");
        assert_eq!(emails[0].body, "Departure 08:15");
    }

    #[test]
    fn test_decode_body_accepts_padding() {
        let padded = base64::engine::general_purpose::URL_SAFE.encode("hi?");
        assert_eq!(decode_body(&padded).unwrap(), "hi?");
        assert!(decode_body("***").is_err());
    }

    #[test]
    fn test_gmail_endpoint_keeps_base_path() {
        let client = GmailClient::new("https://gmail.googleapis.com/gmail/v1", "token").unwrap();
        assert_eq!(
            client.endpoint("users/me/messages").unwrap().as_str(),
            "https://gmail.googleapis.com/gmail/v1/users/me/messages"
        );
        assert!(matches!(
            GmailClient::new("not a url", "token"),
            Err(TripsyError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_invoke_rejects_bad_arguments() {
        let capability = EmailCapability::new(MailSettings::default());
        let mut map = serde_json::Map::new();
        map.insert("labels".to_string(), json!("VACATION"));
        let result = capability.invoke(ToolArguments::new(map)).await;
        assert!(matches!(result, Err(TripsyError::InvalidInput(_))));
    }
}
