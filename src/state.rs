//! Transcript data model
//!
//! These types are independent of the terminal UI. A `Message` is either a
//! user turn (text plus an optional attachment snapshot) or an assistant turn
//! (a structured answer or a failure marker), so the role-specific fields can
//! never be mixed up.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Shown in place of an answer when a solve request fails.
pub const FAILED_REPLY_TEXT: &str =
    "Xin lỗi, tôi gặp sự cố khi giải bài toán này. Hãy thử lại hoặc cung cấp hình ảnh rõ hơn.";

/// Unique identifier for a transcript entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The role of a message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
}

/// The structured answer returned by a solver. Every field may embed
/// `$...$` math markup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MathResponse {
    pub theory: String,
    pub hint: String,
    pub solution: String,
}

/// Snapshot of the file that was sent with a user message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAttachment {
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    /// Base64 payload, kept only for image attachments.
    pub preview: Option<String>,
}

impl UserAttachment {
    pub fn is_image(&self) -> bool {
        self.preview.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reply {
    Solved(MathResponse),
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageBody {
    User {
        text: String,
        attachment: Option<UserAttachment>,
    },
    Assistant(Reply),
}

/// One transcript entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub body: MessageBody,
}

impl Message {
    pub fn user(text: impl Into<String>, attachment: Option<UserAttachment>) -> Self {
        Self {
            id: MessageId::new(),
            body: MessageBody::User {
                text: text.into(),
                attachment,
            },
        }
    }

    pub fn solved(data: MathResponse) -> Self {
        Self {
            id: MessageId::new(),
            body: MessageBody::Assistant(Reply::Solved(data)),
        }
    }

    pub fn failed() -> Self {
        Self {
            id: MessageId::new(),
            body: MessageBody::Assistant(Reply::Failed),
        }
    }

    pub fn role(&self) -> Role {
        match self.body {
            MessageBody::User { .. } => Role::User,
            MessageBody::Assistant(_) => Role::Assistant,
        }
    }

    /// Raw user text. `None` for assistant messages.
    pub fn text(&self) -> Option<&str> {
        match &self.body {
            MessageBody::User { text, .. } => Some(text),
            MessageBody::Assistant(_) => None,
        }
    }

    pub fn attachment(&self) -> Option<&UserAttachment> {
        match &self.body {
            MessageBody::User { attachment, .. } => attachment.as_ref(),
            MessageBody::Assistant(_) => None,
        }
    }

    pub fn data(&self) -> Option<&MathResponse> {
        match &self.body {
            MessageBody::Assistant(Reply::Solved(data)) => Some(data),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.body, MessageBody::Assistant(Reply::Failed))
    }
}

/// Ordered, append-only transcript. Insertion order is display order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, message: Message) -> MessageId {
        let id = message.id;
        self.messages.push(message);
        id
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Message> {
        self.messages.get(index)
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    pub fn as_slice(&self) -> &[Message] {
        &self.messages
    }
}

impl<'a> IntoIterator for &'a Conversation {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}
