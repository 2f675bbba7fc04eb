use diesel::prelude::*;

use crate::db::schema::chat_messages;
use crate::store::HistoryEntry;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = chat_messages)]
pub struct ChatMessageRow {
    pub id: i64,
    pub socket_id: String,
    pub username: String,
    pub room: String,
    pub message: String,
    pub timestamp: i64,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = chat_messages)]
pub struct NewChatMessageRow<'a> {
    pub socket_id: &'a str,
    pub username: &'a str,
    pub room: &'a str,
    pub message: &'a str,
    pub timestamp: i64,
}

impl From<ChatMessageRow> for HistoryEntry {
    fn from(row: ChatMessageRow) -> Self {
        Self {
            connection_id: row.socket_id,
            username: row.username,
            text: row.message,
            timestamp: row.timestamp,
        }
    }
}
