//! Layout of the chat data in the store tree.
//!
//! ```text
//! users/{uid}                          name, email, avatar
//! users/{uid}/conversations/{cid}      roster entry (true)
//! conversations/{cid}                  participants, name, createdAt,
//!                                      lastMessage, lastMessageTimestamp,
//!                                      lastMessageSender
//! conversations/{cid}/messages/{mid}   senderId, senderName, text,
//!                                      timestamp, type
//! typing/{cid}/{uid}                   bool
//! ```

use murmur_shared::{ConversationId, ParticipantId};

use crate::path::StorePath;

pub const USERS: &str = "users";
pub const CONVERSATIONS: &str = "conversations";
pub const MESSAGES: &str = "messages";
pub const TYPING: &str = "typing";

/// Field names used in stored records.
pub mod fields {
    pub const NAME: &str = "name";
    pub const EMAIL: &str = "email";
    pub const AVATAR: &str = "avatar";

    pub const PARTICIPANTS: &str = "participants";
    pub const CREATED_AT: &str = "createdAt";
    pub const LAST_MESSAGE: &str = "lastMessage";
    pub const LAST_MESSAGE_TIMESTAMP: &str = "lastMessageTimestamp";
    pub const LAST_MESSAGE_SENDER: &str = "lastMessageSender";

    pub const SENDER_ID: &str = "senderId";
    pub const SENDER_NAME: &str = "senderName";
    pub const TEXT: &str = "text";
    pub const TIMESTAMP: &str = "timestamp";
    pub const KIND: &str = "type";
}

/// Profile record of a user.
pub fn user(uid: &ParticipantId) -> StorePath {
    StorePath::root().child(USERS).child(uid.as_str())
}

/// The set of conversation ids visible to a user.
pub fn roster(uid: &ParticipantId) -> StorePath {
    user(uid).child(CONVERSATIONS)
}

pub fn conversation(cid: &ConversationId) -> StorePath {
    StorePath::root().child(CONVERSATIONS).child(cid.as_str())
}

pub fn messages(cid: &ConversationId) -> StorePath {
    conversation(cid).child(MESSAGES)
}

/// Map of participant id to "is typing" for one conversation.
pub fn typing(cid: &ConversationId) -> StorePath {
    StorePath::root().child(TYPING).child(cid.as_str())
}

/// Relative key of `path` below the root, for multi-path root updates.
pub fn root_key(path: &StorePath) -> String {
    path.segments().join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout() {
        let uid = ParticipantId::from("u1");
        let cid = ConversationId::from("c1");
        assert_eq!(roster(&uid).to_string(), "/users/u1/conversations");
        assert_eq!(messages(&cid).to_string(), "/conversations/c1/messages");
        assert_eq!(typing(&cid).to_string(), "/typing/c1");
        assert_eq!(root_key(&roster(&uid).child("c1")), "users/u1/conversations/c1");
    }
}
