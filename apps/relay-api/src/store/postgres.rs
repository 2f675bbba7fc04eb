use async_trait::async_trait;
use diesel::dsl::{count_distinct, count_star};
use diesel::prelude::*;

use crate::db::pool::DbPool;
use crate::db::schema::{chat_messages, connection_logs};
use crate::error::StoreError;
use crate::models::connection_log::NewConnectionLogRow;
use crate::models::message::{ChatMessageRow, NewChatMessageRow};

use super::{
    validate_connection_event, validate_message, ChatStore, ConnectionAction, ConnectionLogEntry,
    HistoryEntry, NewChatMessage, NewConnectionEvent, PurgeScope, RoomMessageCount, Statistics,
    UserMessage,
};

/// PostgreSQL-backed [`ChatStore`].
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChatStore for PgStore {
    async fn record_connection_event(
        &self,
        event: NewConnectionEvent<'_>,
    ) -> Result<i64, StoreError> {
        validate_connection_event(&event)?;
        let mut conn = self.pool.get().await?;

        let id: i64 = diesel_async::RunQueryDsl::get_result(
            diesel::insert_into(connection_logs::table)
                .values(NewConnectionLogRow {
                    socket_id: event.connection_id,
                    username: event.username,
                    room: event.room,
                    action: event.action.as_str(),
                    timestamp: event.timestamp_ms,
                    ip_address: event.source_address,
                })
                .returning(connection_logs::id),
            &mut conn,
        )
        .await?;

        tracing::debug!(
            id,
            username = %event.username,
            room = %event.room,
            action = event.action.as_str(),
            "connection log recorded"
        );
        Ok(id)
    }

    async fn record_message(&self, message: NewChatMessage<'_>) -> Result<i64, StoreError> {
        validate_message(&message)?;
        let mut conn = self.pool.get().await?;

        let id: i64 = diesel_async::RunQueryDsl::get_result(
            diesel::insert_into(chat_messages::table)
                .values(NewChatMessageRow {
                    socket_id: message.connection_id,
                    username: message.username,
                    room: message.room,
                    message: message.text,
                    timestamp: message.timestamp_ms,
                })
                .returning(chat_messages::id),
            &mut conn,
        )
        .await?;

        tracing::debug!(id, username = %message.username, room = %message.room, "chat message recorded");
        Ok(id)
    }

    async fn fetch_room_history(
        &self,
        room: &str,
        limit: i64,
    ) -> Result<Vec<HistoryEntry>, StoreError> {
        let mut conn = self.pool.get().await?;

        let rows: Vec<ChatMessageRow> = diesel_async::RunQueryDsl::load(
            chat_messages::table
                .filter(chat_messages::room.eq(room))
                .order((chat_messages::timestamp.desc(), chat_messages::id.desc()))
                .limit(limit)
                .select(ChatMessageRow::as_select()),
            &mut conn,
        )
        .await?;

        Ok(rows.into_iter().rev().map(HistoryEntry::from).collect())
    }

    async fn fetch_connection_logs(
        &self,
        room: &str,
        limit: i64,
    ) -> Result<Vec<ConnectionLogEntry>, StoreError> {
        let mut conn = self.pool.get().await?;

        let rows: Vec<(String, String, i64)> = diesel_async::RunQueryDsl::load(
            connection_logs::table
                .filter(connection_logs::room.eq(room))
                .order((connection_logs::timestamp.desc(), connection_logs::id.desc()))
                .limit(limit)
                .select((
                    connection_logs::username,
                    connection_logs::action,
                    connection_logs::timestamp,
                )),
            &mut conn,
        )
        .await?;

        Ok(rows
            .into_iter()
            .rev()
            .filter_map(|(username, action, timestamp)| {
                let Some(action) = ConnectionAction::parse(&action) else {
                    tracing::warn!(%action, "skipping connection log with unknown action");
                    return None;
                };
                Some(ConnectionLogEntry {
                    username,
                    action,
                    timestamp,
                })
            })
            .collect())
    }

    async fn fetch_user_messages(
        &self,
        username: &str,
        room: &str,
        limit: i64,
    ) -> Result<Vec<UserMessage>, StoreError> {
        let mut conn = self.pool.get().await?;

        let rows: Vec<(String, i64)> = diesel_async::RunQueryDsl::load(
            chat_messages::table
                .filter(chat_messages::username.eq(username))
                .filter(chat_messages::room.eq(room))
                .order((chat_messages::timestamp.desc(), chat_messages::id.desc()))
                .limit(limit)
                .select((chat_messages::message, chat_messages::timestamp)),
            &mut conn,
        )
        .await?;

        Ok(rows
            .into_iter()
            .rev()
            .map(|(message, timestamp)| UserMessage { message, timestamp })
            .collect())
    }

    async fn fetch_statistics(&self) -> Result<Statistics, StoreError> {
        let mut conn = self.pool.get().await?;

        let total_messages: i64 =
            diesel_async::RunQueryDsl::get_result(chat_messages::table.count(), &mut conn).await?;
        let total_connections: i64 =
            diesel_async::RunQueryDsl::get_result(connection_logs::table.count(), &mut conn)
                .await?;
        let active_rooms: i64 = diesel_async::RunQueryDsl::get_result(
            chat_messages::table.select(count_distinct(chat_messages::room)),
            &mut conn,
        )
        .await?;
        let total_users: i64 = diesel_async::RunQueryDsl::get_result(
            chat_messages::table.select(count_distinct(chat_messages::username)),
            &mut conn,
        )
        .await?;

        Ok(Statistics {
            total_messages,
            total_connections,
            active_rooms,
            total_users,
        })
    }

    async fn purge_older_than(
        &self,
        scope: PurgeScope<'_>,
        cutoff_ms: i64,
    ) -> Result<u64, StoreError> {
        let mut conn = self.pool.get().await?;

        let deleted = match scope {
            PurgeScope::Room(room) => {
                diesel_async::RunQueryDsl::execute(
                    diesel::delete(
                        chat_messages::table
                            .filter(chat_messages::room.eq(room))
                            .filter(chat_messages::timestamp.lt(cutoff_ms)),
                    ),
                    &mut conn,
                )
                .await?
            }
            PurgeScope::AllRooms => {
                diesel_async::RunQueryDsl::execute(
                    diesel::delete(chat_messages::table.filter(chat_messages::timestamp.lt(cutoff_ms))),
                    &mut conn,
                )
                .await?
            }
        };

        Ok(deleted as u64)
    }

    async fn purge_all_messages(&self, room: &str) -> Result<u64, StoreError> {
        let mut conn = self.pool.get().await?;

        let deleted = diesel_async::RunQueryDsl::execute(
            diesel::delete(chat_messages::table.filter(chat_messages::room.eq(room))),
            &mut conn,
        )
        .await?;

        Ok(deleted as u64)
    }

    async fn list_rooms_with_message_counts(&self) -> Result<Vec<RoomMessageCount>, StoreError> {
        let mut conn = self.pool.get().await?;

        let rows: Vec<(String, i64, Option<i64>, Option<i64>)> = diesel_async::RunQueryDsl::load(
            chat_messages::table
                .group_by(chat_messages::room)
                .select((
                    chat_messages::room,
                    count_star(),
                    diesel::dsl::min(chat_messages::timestamp),
                    diesel::dsl::max(chat_messages::timestamp),
                ))
                .order(chat_messages::room.asc()),
            &mut conn,
        )
        .await?;

        Ok(rows
            .into_iter()
            .map(|(room, count, first_timestamp, last_timestamp)| RoomMessageCount {
                room,
                count,
                first_timestamp,
                last_timestamp,
            })
            .collect())
    }

    async fn close(&self) {
        self.pool.close();
        tracing::info!("database pool closed");
    }
}
