use serde::{Deserialize, Serialize};

/// One exchange of a conversation: what the user said and what the assistant
/// answered. Only lives for the duration of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub user: String,
    pub assistant: String,
}
