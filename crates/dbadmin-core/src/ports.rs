//! Storage traits implemented by the server's MySQL gateway and Redis bridge

use crate::Result;
use async_trait::async_trait;
use dbadmin_types::{
    AlterTableRequest, CreateTableRequest, NewUser, PageRequest, RedisEntry, TableBackup,
    TableData, TableInfo, User, UserPatch,
};
use serde_json::{Map, Value};

/// User store
#[async_trait]
pub trait UserStore: Send + Sync {
    /// All users, optionally filtered by a name substring
    async fn list_users(&self, name: Option<&str>) -> Result<Vec<User>>;
    async fn get_user(&self, id: u64) -> Result<Option<User>>;
    async fn create_user(&self, user: &NewUser) -> Result<User>;
    /// Overwrite the stored user with the fields present in `patch`.
    /// Returns `None` when the user does not exist.
    async fn update_user(&self, id: u64, patch: UserPatch) -> Result<Option<User>>;
    /// Fails when no row was deleted.
    async fn delete_user(&self, id: u64) -> Result<()>;
}

/// Schema browsing, DDL, ad-hoc queries and table transfer
#[async_trait]
pub trait SchemaGateway: Send + Sync {
    async fn list_tables(&self) -> Result<Vec<TableInfo>>;
    async fn table_detail(&self, name: &str) -> Result<TableInfo>;
    async fn create_table(&self, request: &CreateTableRequest) -> Result<()>;
    async fn alter_table(&self, table: &str, request: &AlterTableRequest) -> Result<()>;
    /// Idempotent, succeeds when the table is absent.
    async fn drop_table(&self, name: &str) -> Result<()>;
    async fn table_page(&self, table: &str, page: &PageRequest) -> Result<TableData>;
    /// Run a statement already checked to be a SELECT.
    async fn run_query(&self, sql: &str) -> Result<Vec<Map<String, Value>>>;
    async fn export_table(&self, name: &str) -> Result<TableBackup>;
    /// Create the table and replay its data atomically.
    async fn import_table(&self, backup: &TableBackup) -> Result<()>;
}

/// Key-value cache, single node or cluster
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Every key matching a glob pattern, with type, value and ttl
    async fn list_entries(&self, pattern: &str) -> Result<Vec<RedisEntry>>;
    async fn get_entry(&self, key: &str) -> Result<Option<RedisEntry>>;
    /// A ttl of zero or less stores the key without expiry.
    async fn set(&self, key: &str, value: &str, ttl_secs: i64) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
}
