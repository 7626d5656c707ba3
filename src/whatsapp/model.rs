//! Webhook payload types of the Business Messaging API and their mapping to
//! [`InboundMessage`]. Only the fields the bot reads are modelled.
use serde::Deserialize;

use crate::model::{InboundContent, InboundMessage};

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[derive(Debug, Deserialize)]
pub struct Change {
    #[serde(default)]
    pub field: String,
    pub value: ChangeValue,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub messages: Vec<WireMessage>,
}

#[derive(Debug, Deserialize)]
pub struct Contact {
    pub wa_id: String,
    #[serde(default)]
    pub profile: Option<Profile>,
}

#[derive(Debug, Deserialize)]
pub struct Profile {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct WireMessage {
    pub from: String,
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<TextBody>,
    #[serde(default)]
    pub audio: Option<Media>,
    #[serde(default)]
    pub image: Option<Media>,
    #[serde(default)]
    pub interactive: Option<Interactive>,
    #[serde(default)]
    pub button: Option<QuickReply>,
}

#[derive(Debug, Deserialize)]
pub struct TextBody {
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct Media {
    pub id: String,
    #[serde(default)]
    pub caption: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Interactive {
    #[serde(default)]
    pub list_reply: Option<Reply>,
    #[serde(default)]
    pub button_reply: Option<Reply>,
}

#[derive(Debug, Deserialize)]
pub struct Reply {
    pub id: String,
    pub title: String,
}

/// Quick-reply button tapped on a template message.
#[derive(Debug, Deserialize)]
pub struct QuickReply {
    #[serde(default)]
    pub payload: Option<String>,
    pub text: String,
}

impl WireMessage {
    fn content(self) -> InboundContent {
        match self.kind.as_str() {
            "text" => match self.text {
                Some(t) => InboundContent::Text(t.body),
                None => InboundContent::Unsupported(self.kind.clone()),
            },
            "audio" | "voice" => match self.audio {
                Some(a) => InboundContent::Audio { media_id: a.id },
                None => InboundContent::Unsupported(self.kind.clone()),
            },
            "image" => match self.image {
                Some(i) => InboundContent::Image {
                    media_id: i.id,
                    caption: i.caption.filter(|c| !c.trim().is_empty()),
                },
                None => InboundContent::Unsupported(self.kind.clone()),
            },
            "interactive" => match self.interactive.and_then(|i| i.list_reply.or(i.button_reply)) {
                Some(r) => InboundContent::Interactive {
                    id: r.id,
                    title: r.title,
                },
                None => InboundContent::Unsupported(self.kind.clone()),
            },
            // Template quick replies carry their text; treat them as typed text.
            "button" => match self.button {
                Some(b) => InboundContent::Text(b.text),
                None => InboundContent::Unsupported(self.kind.clone()),
            },
            _ => InboundContent::Unsupported(self.kind.clone()),
        }
    }
}

impl WebhookPayload {
    /// Flatten every message in the payload, in delivery order. Status
    /// callbacks carry no messages and yield nothing.
    pub fn into_messages(self) -> Vec<InboundMessage> {
        let mut out = Vec::new();
        for change in self.entry.into_iter().flat_map(|e| e.changes) {
            let value = change.value;
            let contacts = value.contacts;
            for msg in value.messages {
                let profile_name = contacts
                    .iter()
                    .find(|c| c.wa_id == msg.from)
                    .or_else(|| contacts.first())
                    .and_then(|c| c.profile.as_ref())
                    .map(|p| p.name.clone());
                let from = msg.from.clone();
                let message_id = msg.id.clone();
                out.push(InboundMessage {
                    from,
                    message_id,
                    profile_name,
                    content: msg.content(),
                });
            }
        }
        out
    }
}

#[derive(Debug, Deserialize)]
pub struct MediaInfo {
    pub url: String,
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendResponse {
    #[serde(default)]
    pub messages: Vec<SentMessage>,
}

#[derive(Debug, Deserialize)]
pub struct SentMessage {
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(messages: serde_json::Value) -> WebhookPayload {
        serde_json::from_value(json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "WABA",
                "changes": [{
                    "field": "messages",
                    "value": {
                        "messaging_product": "whatsapp",
                        "metadata": { "phone_number_id": "123" },
                        "contacts": [{ "profile": { "name": "Ada" }, "wa_id": "2348011112222" }],
                        "messages": messages
                    }
                }]
            }]
        }))
        .unwrap()
    }

    #[test]
    fn text_and_media_messages() {
        let msgs = payload(json!([
            { "from": "2348011112222", "id": "m1", "timestamp": "1", "type": "text",
              "text": { "body": "invoice Joy 5000" } },
            { "from": "2348011112222", "id": "m2", "type": "audio",
              "audio": { "id": "aud-1", "mime_type": "audio/ogg; codecs=opus", "voice": true } },
            { "from": "2348011112222", "id": "m3", "type": "image",
              "image": { "id": "img-1", "caption": "  " } }
        ]))
        .into_messages();
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[0].profile_name.as_deref(), Some("Ada"));
        assert_eq!(msgs[0].content, InboundContent::Text("invoice Joy 5000".into()));
        assert_eq!(
            msgs[1].content,
            InboundContent::Audio {
                media_id: "aud-1".into()
            }
        );
        assert_eq!(
            msgs[2].content,
            InboundContent::Image {
                media_id: "img-1".into(),
                caption: None
            }
        );
    }

    #[test]
    fn interactive_replies() {
        let msgs = payload(json!([
            { "from": "2348011112222", "id": "m1", "type": "interactive",
              "interactive": { "type": "list_reply",
                               "list_reply": { "id": "product:7", "title": "Wig", "description": "x" } } },
            { "from": "2348011112222", "id": "m2", "type": "interactive",
              "interactive": { "type": "button_reply",
                               "button_reply": { "id": "cart:clear", "title": "Clear cart" } } },
            { "from": "2348011112222", "id": "m3", "type": "sticker", "sticker": { "id": "s" } }
        ]))
        .into_messages();
        assert_eq!(
            msgs[0].content,
            InboundContent::Interactive {
                id: "product:7".into(),
                title: "Wig".into()
            }
        );
        assert!(matches!(&msgs[1].content, InboundContent::Interactive { id, .. } if id == "cart:clear"));
        assert_eq!(msgs[2].content, InboundContent::Unsupported("sticker".into()));
    }

    #[test]
    fn status_callbacks_yield_nothing() {
        let p: WebhookPayload = serde_json::from_value(json!({
            "object": "whatsapp_business_account",
            "entry": [{ "changes": [{ "field": "messages",
                "value": { "statuses": [{ "id": "wamid", "status": "delivered" }] } }] }]
        }))
        .unwrap();
        assert!(p.into_messages().is_empty());
    }
}
