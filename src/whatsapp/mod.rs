//! Business Messaging API client. Implements [`Transport`] for the engine.
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde_json::{json, Value};
use std::fmt;
use tracing::{debug, instrument, warn};

use crate::config::Config;
use crate::services::{Button, ListMessage, Transport};

pub mod model;

use model::{MediaInfo, SendResponse};

pub const MAX_LIST_ROWS: usize = 10;
pub const MAX_BUTTONS: usize = 3;
const ROW_TITLE_LIMIT: usize = 24;
const ROW_DESCRIPTION_LIMIT: usize = 72;
const BUTTON_TITLE_LIMIT: usize = 20;
const HEADER_LIMIT: usize = 60;

#[derive(Clone)]
pub struct WhatsAppClient {
    http: Client,
    base_url: Url,
    token: String,
    phone_number_id: String,
}

impl fmt::Debug for WhatsAppClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WhatsAppClient")
            .field("base_url", &self.base_url)
            .field("phone_number_id", &self.phone_number_id)
            .finish_non_exhaustive()
    }
}

/// Cut `s` to at most `max` characters, marking the cut with `…`.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

pub fn build_text_body(to: &str, body: &str) -> Value {
    json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": to,
        "type": "text",
        "text": { "preview_url": false, "body": body }
    })
}

pub fn build_template_body(to: &str, template: &str, language: &str, params: &[String]) -> Value {
    let mut tpl = json!({
        "name": template,
        "language": { "code": language }
    });
    if !params.is_empty() {
        let parameters: Vec<Value> = params
            .iter()
            .map(|p| json!({ "type": "text", "text": p }))
            .collect();
        tpl["components"] = json!([{ "type": "body", "parameters": parameters }]);
    }
    json!({
        "messaging_product": "whatsapp",
        "to": to,
        "type": "template",
        "template": tpl
    })
}

pub fn build_document_body(to: &str, link: &str, filename: &str, caption: &str) -> Value {
    json!({
        "messaging_product": "whatsapp",
        "to": to,
        "type": "document",
        "document": { "link": link, "filename": filename, "caption": caption }
    })
}

/// Interactive list; rows past [`MAX_LIST_ROWS`] are dropped and titles cut
/// to what the API accepts.
pub fn build_list_body(to: &str, list: &ListMessage) -> Value {
    let rows: Vec<Value> = list
        .rows
        .iter()
        .take(MAX_LIST_ROWS)
        .map(|row| {
            let mut r = json!({
                "id": row.id,
                "title": truncate(&row.title, ROW_TITLE_LIMIT),
            });
            if let Some(d) = &row.description {
                r["description"] = json!(truncate(d, ROW_DESCRIPTION_LIMIT));
            }
            r
        })
        .collect();
    json!({
        "messaging_product": "whatsapp",
        "to": to,
        "type": "interactive",
        "interactive": {
            "type": "list",
            "header": { "type": "text", "text": truncate(&list.header, HEADER_LIMIT) },
            "body": { "text": list.body },
            "action": {
                "button": truncate(&list.button, BUTTON_TITLE_LIMIT),
                "sections": [{ "title": truncate(&list.header, ROW_TITLE_LIMIT), "rows": rows }]
            }
        }
    })
}

pub fn build_buttons_body(to: &str, body: &str, buttons: &[Button]) -> Value {
    let buttons: Vec<Value> = buttons
        .iter()
        .take(MAX_BUTTONS)
        .map(|b| {
            json!({
                "type": "reply",
                "reply": { "id": b.id, "title": truncate(&b.title, BUTTON_TITLE_LIMIT) }
            })
        })
        .collect();
    json!({
        "messaging_product": "whatsapp",
        "to": to,
        "type": "interactive",
        "interactive": {
            "type": "button",
            "body": { "text": body },
            "action": { "buttons": buttons }
        }
    })
}

impl WhatsAppClient {
    pub fn new(api_base: &str, api_version: &str, token: String, phone_number_id: String) -> Result<Self> {
        let base_url = Url::parse(&format!(
            "{}/{}/",
            api_base.trim_end_matches('/'),
            api_version.trim_matches('/')
        ))
        .context("invalid messaging API base URL")?;
        let http = Client::builder()
            .user_agent("wa-invoicer/0.1")
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            http,
            base_url,
            token,
            phone_number_id,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        let wa = &cfg.whatsapp;
        Self::new(
            &wa.api_base,
            &wa.api_version,
            wa.token.clone(),
            wa.phone_number_id.clone(),
        )
    }

    pub fn build_request(&self, body: &Value) -> Result<reqwest::Request> {
        let endpoint = self
            .base_url
            .join(&format!("{}/messages", self.phone_number_id))
            .context("invalid messages endpoint")?;
        self.http
            .post(endpoint)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Content-Type", "application/json")
            .json(body)
            .build()
            .context("failed to build messaging request")
    }

    async fn execute_send(&self, body: Value) -> Result<String> {
        let request = self.build_request(&body)?;
        debug!(url = %request.url(), "messaging API request");
        for (name, value) in request.headers() {
            if name.as_str().eq_ignore_ascii_case("authorization") {
                debug!("  {}: Bearer [REDACTED]", name);
            } else {
                debug!("  {}: {}", name, value.to_str().unwrap_or("[invalid]"));
            }
        }

        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach messaging API")?;
        let status = res.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("rate limited by messaging API: {}", body));
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("messaging API error {}: {}", status, body));
        }
        let payload: SendResponse = res
            .json()
            .await
            .context("invalid messaging API response JSON")?;
        Ok(payload
            .messages
            .into_iter()
            .next()
            .map(|m| m.id)
            .unwrap_or_default())
    }

    /// Send and log; failures never reach the caller.
    async fn send(&self, kind: &'static str, to: &str, body: Value) -> bool {
        match self.execute_send(body).await {
            Ok(message_id) => {
                debug!(kind, to, %message_id, "message sent");
                true
            }
            Err(err) => {
                warn!(?err, kind, to, "failed to send message");
                false
            }
        }
    }

    async fn get_authorized(&self, url: Url) -> Result<reqwest::Response> {
        let res = self
            .http
            .get(url)
            .header("Authorization", format!("Bearer {}", self.token))
            .send()
            .await
            .context("failed to reach messaging API")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("media request failed {}: {}", status, body));
        }
        Ok(res)
    }
}

#[async_trait]
impl Transport for WhatsAppClient {
    async fn send_text(&self, to: &str, body: &str) -> bool {
        self.send("text", to, build_text_body(to, body)).await
    }

    async fn send_template(&self, to: &str, template: &str, language: &str, params: &[String]) -> bool {
        self.send("template", to, build_template_body(to, template, language, params))
            .await
    }

    async fn send_document(&self, to: &str, link: &str, filename: &str, caption: &str) -> bool {
        self.send("document", to, build_document_body(to, link, filename, caption))
            .await
    }

    async fn send_list(&self, to: &str, list: &ListMessage) -> bool {
        self.send("list", to, build_list_body(to, list)).await
    }

    async fn send_buttons(&self, to: &str, body: &str, buttons: &[Button]) -> bool {
        self.send("buttons", to, build_buttons_body(to, body, buttons))
            .await
    }

    /// Resolve the media id to a short-lived URL, then fetch the bytes.
    #[instrument(skip(self))]
    async fn download_media(&self, media_id: &str) -> Result<Vec<u8>> {
        let meta_url = self.base_url.join(media_id).context("invalid media id")?;
        let info: MediaInfo = self
            .get_authorized(meta_url)
            .await?
            .json()
            .await
            .context("invalid media metadata JSON")?;
        debug!(mime_type = ?info.mime_type, "media resolved");
        let url = Url::parse(&info.url).context("invalid media URL")?;
        let bytes = self.get_authorized(url).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ListRow;

    fn client() -> WhatsAppClient {
        WhatsAppClient::new("https://graph.example.com/", "v19.0", "secret".into(), "12345".into())
            .unwrap()
    }

    #[test]
    fn build_request_targets_messages_endpoint() {
        let request = client().build_request(&build_text_body("234801", "hi")).unwrap();
        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(request.url().as_str(), "https://graph.example.com/v19.0/12345/messages");
        assert_eq!(
            request
                .headers()
                .get("Authorization")
                .and_then(|h| h.to_str().ok())
                .unwrap(),
            "Bearer secret"
        );
    }

    #[test]
    fn debug_hides_token() {
        assert!(!format!("{:?}", client()).contains("secret"));
    }

    #[test]
    fn template_parameters_become_body_component() {
        let body = build_template_body("234801", "invoice_notification", "en", &["Joy".into(), "₦5,000".into()]);
        assert_eq!(body["template"]["name"], "invoice_notification");
        assert_eq!(body["template"]["language"]["code"], "en");
        let params = &body["template"]["components"][0]["parameters"];
        assert_eq!(params[1]["text"], "₦5,000");

        let bare = build_template_body("234801", "hello", "en", &[]);
        assert!(bare["template"].get("components").is_none());
    }

    #[test]
    fn list_is_capped_and_titles_truncated() {
        let rows = (0..12)
            .map(|i| ListRow {
                id: format!("product:{i}"),
                title: format!("Extra long brazilian body wave wig number {i}"),
                description: Some("₦45,000".into()),
            })
            .collect();
        let list = ListMessage {
            header: "Catalog".into(),
            body: "Pick a product".into(),
            button: "View products".into(),
            rows,
        };
        let body = build_list_body("234801", &list);
        let rows = body["interactive"]["action"]["sections"][0]["rows"]
            .as_array()
            .unwrap();
        assert_eq!(rows.len(), MAX_LIST_ROWS);
        let title = rows[0]["title"].as_str().unwrap();
        assert_eq!(title.chars().count(), ROW_TITLE_LIMIT);
        assert!(title.ends_with('…'));
    }

    #[test]
    fn at_most_three_buttons() {
        let buttons: Vec<Button> = (0..4)
            .map(|i| Button {
                id: format!("b{i}"),
                title: format!("Button {i}"),
            })
            .collect();
        let body = build_buttons_body("234801", "Cart", &buttons);
        let sent = body["interactive"]["action"]["buttons"].as_array().unwrap();
        assert_eq!(sent.len(), MAX_BUTTONS);
        assert_eq!(sent[2]["reply"]["id"], "b2");
    }

    #[test]
    fn truncate_keeps_short_text() {
        assert_eq!(truncate("Wig", 24), "Wig");
        assert_eq!(truncate("abcdef", 4), "abc…");
    }
}
