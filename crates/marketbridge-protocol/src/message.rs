//! Platform-neutral rich message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Embed colors used by the formatter.
pub mod colors {
    /// New listing.
    pub const LISTING: u32 = 0x5865F2;
    /// Listing edits.
    pub const LISTING_UPDATED: u32 = 0x9B59B6;
    /// Newly opened dispute.
    pub const DISPUTE_WARNING: u32 = 0xFEE75C;
    /// Dispute status change.
    pub const DISPUTE_INFO: u32 = 0x95A5A6;
    /// Resolved in favor of the buyer.
    pub const RESOLVED_BUYER: u32 = 0x3498DB;
    /// Resolved in favor of the seller.
    pub const RESOLVED_SELLER: u32 = 0xE67E22;
    /// Resolved with a refund.
    pub const RESOLVED_REFUND: u32 = 0x2ECC71;
    /// Any other resolution code.
    pub const RESOLVED_DEFAULT: u32 = 0x57F287;
}

/// A single name/value field in a rich message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl EmbedField {
    pub fn new(name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            inline,
        }
    }
}

/// A structured chat message.
///
/// Gateways render this into whatever their platform calls a rich message
/// (an embed on Discord). `timestamp` is taken from the event payload; when it
/// is absent the gateway stamps the send time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub title: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub body_lines: Vec<String>,
    #[serde(default)]
    pub fields: Vec<EmbedField>,
    pub color: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl Message {
    /// Start a message with just a title and color.
    pub fn new(title: impl Into<String>, color: u32) -> Self {
        Self {
            title: title.into(),
            body_lines: Vec::new(),
            fields: Vec::new(),
            color,
            timestamp: None,
            footer: None,
            link: None,
            image_url: None,
        }
    }

    /// Append a field.
    pub fn push_field(&mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) {
        self.fields.push(EmbedField::new(name, value, inline));
    }

    /// Look up the value of the first field with the given name.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }

    /// Body lines joined with newlines, or `None` when there is no body.
    pub fn body(&self) -> Option<String> {
        if self.body_lines.is_empty() {
            None
        } else {
            Some(self.body_lines.join("\n"))
        }
    }
}
