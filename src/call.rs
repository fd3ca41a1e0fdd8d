//! Outbound call description used for classification.

use crate::config::LimitedMethod;

/// An outbound API call as seen by the limiter: the method name and its addressed target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutboundCall {
    pub method: String,
    pub chat_id: Option<i64>,
    pub inline_message_id: Option<String>,
}

impl OutboundCall {
    /// Call with no recipient yet; chain [`Self::to_chat`] or [`Self::inline`].
    pub fn new(method: impl Into<String>) -> Self {
        Self { method: method.into(), chat_id: None, inline_message_id: None }
    }

    pub fn to_chat(mut self, chat_id: i64) -> Self {
        self.chat_id = Some(chat_id);
        self
    }

    pub fn inline(mut self, inline_message_id: impl Into<String>) -> Self {
        self.inline_message_id = Some(inline_message_id.into());
        self
    }

    /// Whether a recipient is addressed at all.
    pub fn has_recipient(&self) -> bool {
        self.chat_id.is_some() || self.inline_message_id.is_some()
    }

    /// A call is limited when it addresses a recipient and its method is in [`LimitedMethod`].
    pub fn is_limited(&self) -> bool {
        self.has_recipient() && LimitedMethod::lookup(&self.method).is_some()
    }

    /// Groups and channels use negative chat ids; inline messages count as group traffic.
    pub fn is_group(&self) -> bool {
        self.chat_id.is_some_and(|id| id < 0) || self.inline_message_id.is_some()
    }
}

/// Requests that can describe themselves as an [`OutboundCall`].
///
/// Implemented by request types passed through [`ThrottleLayer`](crate::ThrottleLayer).
pub trait Classify {
    fn outbound_call(&self) -> OutboundCall;
}

impl Classify for OutboundCall {
    fn outbound_call(&self) -> OutboundCall {
        self.clone()
    }
}
