use diesel::prelude::*;

use crate::db::schema::connection_logs;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = connection_logs)]
pub struct ConnectionLogRow {
    pub id: i64,
    pub socket_id: String,
    pub username: String,
    pub room: String,
    pub action: String,
    pub timestamp: i64,
    pub ip_address: Option<String>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = connection_logs)]
pub struct NewConnectionLogRow<'a> {
    pub socket_id: &'a str,
    pub username: &'a str,
    pub room: &'a str,
    pub action: &'a str,
    pub timestamp: i64,
    pub ip_address: Option<&'a str>,
}
