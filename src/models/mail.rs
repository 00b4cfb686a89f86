// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Microsoft Graph mail payloads.

use serde::{Deserialize, Serialize};

/// Inbox listing entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailSummary {
    pub id: String,
    pub subject: Option<String>,
    pub from: Option<Recipient>,
    pub received_date_time: Option<String>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub has_attachments: bool,
    #[serde(default)]
    pub body_preview: String,
}

/// A single message with its body and attachment metadata.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailMessage {
    #[serde(flatten)]
    pub summary: MailSummary,
    pub body: Option<ItemBody>,
    #[serde(default)]
    pub to_recipients: Vec<Recipient>,
    #[serde(default)]
    pub attachments: Vec<AttachmentInfo>,
}

/// Graph `itemBody`; `content_type` is `html` or `text`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemBody {
    pub content_type: String,
    #[serde(default)]
    pub content: String,
}

/// Attachment metadata; file content is not kept.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentInfo {
    pub id: String,
    pub name: Option<String>,
    pub content_type: Option<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub is_inline: bool,
}

/// Graph `recipient` resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub email_address: EmailAddress,
}

impl Recipient {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            email_address: EmailAddress {
                name: None,
                address: address.into(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailAddress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub address: String,
}

/// Graph collection wrapper (`{"value": [...]}`).
#[derive(Debug, Clone, Deserialize)]
pub struct GraphPage<T> {
    pub value: Vec<T>,
}
