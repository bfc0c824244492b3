//! In-memory stand-ins for MySQL and Redis, used by the handler tests

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dbadmin_core::{
    import_backup, sql, AdminError, ImportTarget, KeyValueStore, Result, SchemaGateway,
    UserStore,
};
use dbadmin_types::{
    AlterAction, AlterTableRequest, ColumnInfo, ColumnSpec, CreateTableRequest, NewUser,
    PageRequest, RedisEntry, SortOrder, TableBackup, TableData, TableInfo, User, UserPatch,
};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Key-value cache with TTL support
#[derive(Default)]
pub struct MemoryCache {
    data: DashMap<String, CacheEntry>,
}

struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn expired(&self, now: Instant) -> bool {
        self.expires_at.map(|at| now >= at).unwrap_or(false)
    }

    fn ttl(&self, now: Instant) -> i64 {
        match self.expires_at {
            Some(at) => at.saturating_duration_since(now).as_secs() as i64,
            None => -1,
        }
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &str, now: Instant) -> Option<RedisEntry> {
        let entry = self.data.get(key)?;
        if entry.expired(now) {
            drop(entry);
            self.data.remove(key);
            return None;
        }
        Some(RedisEntry {
            key: key.to_string(),
            value: entry.value.clone(),
            key_type: "string".to_string(),
            ttl: entry.ttl(now),
            node: None,
        })
    }
}

#[async_trait]
impl KeyValueStore for MemoryCache {
    async fn list_entries(&self, pattern: &str) -> Result<Vec<RedisEntry>> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .data
            .iter()
            .filter(|e| glob_match(pattern, e.key()))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        Ok(keys.iter().filter_map(|k| self.entry(k, now)).collect())
    }

    async fn get_entry(&self, key: &str) -> Result<Option<RedisEntry>> {
        Ok(self.entry(key, Instant::now()))
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: i64) -> Result<()> {
        let expires_at = (ttl_secs > 0).then(|| Instant::now() + Duration::from_secs(ttl_secs as u64));
        self.data.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.data.remove(key);
        Ok(())
    }
}

/// Redis-style glob supporting `*` and `?`
fn glob_match(pattern: &str, text: &str) -> bool {
    fn matches(p: &[char], t: &[char]) -> bool {
        match p.split_first() {
            None => t.is_empty(),
            Some(('*', rest)) => (0..=t.len()).any(|i| matches(rest, &t[i..])),
            Some(('?', rest)) => !t.is_empty() && matches(rest, &t[1..]),
            Some((c, rest)) => t.first() == Some(c) && matches(rest, &t[1..]),
        }
    }
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    matches(&p, &t)
}

#[derive(Default)]
pub struct MemoryUsers {
    inner: Mutex<UserTable>,
}

#[derive(Default)]
struct UserTable {
    next_id: u64,
    rows: BTreeMap<u64, User>,
}

impl MemoryUsers {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUsers {
    async fn list_users(&self, name: Option<&str>) -> Result<Vec<User>> {
        let table = self.inner.lock().unwrap();
        Ok(table
            .rows
            .values()
            .filter(|u| name.map(|n| u.name.contains(n)).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn get_user(&self, id: u64) -> Result<Option<User>> {
        Ok(self.inner.lock().unwrap().rows.get(&id).cloned())
    }

    async fn create_user(&self, user: &NewUser) -> Result<User> {
        let mut table = self.inner.lock().unwrap();
        table.next_id += 1;
        let now = Utc::now();
        let created = User {
            id: table.next_id,
            name: user.name.clone(),
            email: user.email.clone(),
            age: user.age,
            created_at: now,
            updated_at: now,
        };
        table.rows.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_user(&self, id: u64, patch: UserPatch) -> Result<Option<User>> {
        let mut table = self.inner.lock().unwrap();
        Ok(table.rows.get_mut(&id).map(|user| {
            user.apply(patch);
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn delete_user(&self, id: u64) -> Result<()> {
        match self.inner.lock().unwrap().rows.remove(&id) {
            Some(_) => Ok(()),
            None => Err(AdminError::Database(format!(
                "delete affected no rows: user {} does not exist",
                id
            ))),
        }
    }
}

struct MemTable {
    columns: Vec<ColumnSpec>,
    rows: Vec<Vec<Value>>,
    create_time: String,
}

impl MemTable {
    fn info(&self, name: &str) -> TableInfo {
        TableInfo {
            name: name.to_string(),
            column_count: self.columns.len() as i64,
            rows: self.rows.len() as i64,
            create_time: self.create_time.clone(),
            column_details: None,
        }
    }
}

/// Tables held in memory. Imported statements are not parsed beyond the
/// table name; imported rows keep their INSERT text.
#[derive(Default)]
pub struct MemorySchema {
    tables: Mutex<BTreeMap<String, MemTable>>,
}

fn missing(table: &str) -> AdminError {
    AdminError::Database(format!("Table '{}' doesn't exist", table))
}

fn compare(a: &Value, b: &Value) -> Ordering {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

impl MemorySchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_rows(&self, table: &str, rows: Vec<Vec<Value>>) {
        if let Some(t) = self.tables.lock().unwrap().get_mut(table) {
            t.rows.extend(rows);
        }
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.tables.lock().unwrap().contains_key(table)
    }
}

#[async_trait]
impl SchemaGateway for MemorySchema {
    async fn list_tables(&self) -> Result<Vec<TableInfo>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.iter().map(|(name, t)| t.info(name)).collect())
    }

    async fn table_detail(&self, name: &str) -> Result<TableInfo> {
        let tables = self.tables.lock().unwrap();
        let Some(table) = tables.get(name) else {
            return Ok(TableInfo {
                name: name.to_string(),
                column_count: 0,
                rows: 0,
                create_time: String::new(),
                column_details: Some(Vec::new()),
            });
        };

        let mut info = table.info(name);
        info.column_details = Some(
            table
                .columns
                .iter()
                .map(|c| ColumnInfo {
                    name: c.name.clone(),
                    column_type: c.column_type.clone(),
                    nullable: c.nullable,
                    default: c.default.clone().unwrap_or_default(),
                    key: String::new(),
                })
                .collect(),
        );
        Ok(info)
    }

    async fn create_table(&self, request: &CreateTableRequest) -> Result<()> {
        sql::create_table(request)?;
        let mut tables = self.tables.lock().unwrap();
        if tables.contains_key(&request.name) {
            return Err(AdminError::Database(format!(
                "Table '{}' already exists",
                request.name
            )));
        }
        tables.insert(
            request.name.clone(),
            MemTable {
                columns: request.columns.clone(),
                rows: Vec::new(),
                create_time: Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            },
        );
        Ok(())
    }

    async fn alter_table(&self, table: &str, request: &AlterTableRequest) -> Result<()> {
        sql::alter_table(table, request)?;
        let mut tables = self.tables.lock().unwrap();
        let t = tables.get_mut(table).ok_or_else(|| missing(table))?;
        let column = &request.column;
        let position = t.columns.iter().position(|c| c.name == column.name);

        let definition = ColumnSpec {
            name: column.name.clone(),
            column_type: column.column_type.clone().unwrap_or_default(),
            nullable: column.nullable,
            default: column.default.clone(),
        };
        match (request.action, position) {
            (AlterAction::Add, None) => {
                t.columns.push(definition);
                for row in &mut t.rows {
                    row.push(Value::Null);
                }
            }
            (AlterAction::Modify, Some(i)) => t.columns[i] = definition,
            (AlterAction::Drop, Some(i)) => {
                t.columns.remove(i);
                for row in &mut t.rows {
                    if i < row.len() {
                        row.remove(i);
                    }
                }
            }
            (AlterAction::Add, Some(_)) => {
                return Err(AdminError::Database(format!(
                    "Duplicate column name '{}'",
                    column.name
                )))
            }
            (_, None) => {
                return Err(AdminError::Database(format!(
                    "Unknown column '{}'",
                    column.name
                )))
            }
        }
        Ok(())
    }

    async fn drop_table(&self, name: &str) -> Result<()> {
        self.tables.lock().unwrap().remove(name);
        Ok(())
    }

    async fn table_page(&self, table: &str, page: &PageRequest) -> Result<TableData> {
        sql::select_page(table, page)?;
        let tables = self.tables.lock().unwrap();
        let t = tables.get(table).ok_or_else(|| missing(table))?;
        let index = t
            .columns
            .iter()
            .position(|c| c.name == page.sort_field)
            .ok_or_else(|| {
                AdminError::Database(format!(
                    "Unknown column '{}' in 'order clause'",
                    page.sort_field
                ))
            })?;

        let mut rows = t.rows.clone();
        rows.sort_by(|a, b| {
            let ordering = compare(&a[index], &b[index]);
            match page.sort_order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });

        Ok(TableData {
            columns: t.columns.iter().map(|c| c.name.clone()).collect(),
            rows: rows
                .into_iter()
                .skip(page.offset() as usize)
                .take(page.page_size as usize)
                .collect(),
            total: t.rows.len() as i64,
        })
    }

    /// Understands `SELECT * FROM <table>` only.
    async fn run_query(&self, query: &str) -> Result<Vec<Map<String, Value>>> {
        let words: Vec<&str> = query.trim().trim_end_matches(';').split_whitespace().collect();
        let table = match words.as_slice() {
            [select, "*", from, table]
                if select.eq_ignore_ascii_case("select") && from.eq_ignore_ascii_case("from") =>
            {
                table.trim_matches('`')
            }
            _ => {
                return Err(AdminError::Database(
                    "You have an error in your SQL syntax".to_string(),
                ))
            }
        };

        let tables = self.tables.lock().unwrap();
        let t = tables.get(table).ok_or_else(|| missing(table))?;
        Ok(t.rows
            .iter()
            .map(|row| {
                t.columns
                    .iter()
                    .zip(row)
                    .map(|(c, v)| (c.name.clone(), v.clone()))
                    .collect()
            })
            .collect())
    }

    async fn export_table(&self, name: &str) -> Result<TableBackup> {
        let tables = self.tables.lock().unwrap();
        let t = tables.get(name).ok_or_else(|| missing(name))?;
        let structure = sql::create_table(&CreateTableRequest {
            name: name.to_string(),
            columns: t.columns.clone(),
        })?;
        let data = t
            .rows
            .iter()
            .map(|row| sql::insert_statement(name, row))
            .collect::<Result<Vec<_>>>()?;

        Ok(TableBackup {
            name: name.to_string(),
            structure,
            data: data.join("\n"),
        })
    }

    async fn import_table(&self, backup: &TableBackup) -> Result<()> {
        let mut target = MemoryImport {
            schema: self,
            staged: None,
        };
        import_backup(&mut target, backup).await?;
        Ok(())
    }
}

/// Behaves like a MySQL session: CREATE TABLE takes effect at once, INSERTs
/// wait for commit.
struct MemoryImport<'a> {
    schema: &'a MemorySchema,
    staged: Option<Vec<(String, Vec<Value>)>>,
}

/// Table named by `CREATE TABLE <t> ...` or `INSERT INTO <t> ...`
fn statement_table(statement: &str) -> Option<String> {
    let word = statement.split_whitespace().nth(2)?;
    let name = word.split('(').next()?.trim_matches('`');
    (!name.is_empty()).then(|| name.to_string())
}

fn syntax_error(statement: &str) -> AdminError {
    AdminError::Database(format!(
        "You have an error in your SQL syntax near '{}'",
        statement
    ))
}

#[async_trait]
impl<'a> ImportTarget for MemoryImport<'a> {
    async fn table_exists(&mut self, name: &str) -> Result<bool> {
        Ok(self.schema.has_table(name))
    }

    async fn begin(&mut self) -> Result<()> {
        self.staged = Some(Vec::new());
        Ok(())
    }

    async fn execute(&mut self, statement: &str) -> Result<()> {
        let upper = statement.trim_start().to_uppercase();
        let table = statement_table(statement).ok_or_else(|| syntax_error(statement))?;
        let mut tables = self.schema.tables.lock().unwrap();

        if upper.starts_with("CREATE TABLE") {
            if tables.contains_key(&table) {
                return Err(AdminError::Database(format!("Table '{}' already exists", table)));
            }
            tables.insert(
                table,
                MemTable {
                    columns: Vec::new(),
                    rows: Vec::new(),
                    create_time: Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
                },
            );
            Ok(())
        } else if upper.starts_with("INSERT INTO") {
            if !tables.contains_key(&table) {
                return Err(missing(&table));
            }
            let staged = self.staged.as_mut().ok_or_else(|| syntax_error(statement))?;
            staged.push((table, vec![Value::String(statement.to_string())]));
            Ok(())
        } else {
            Err(syntax_error(statement))
        }
    }

    async fn commit(&mut self) -> Result<()> {
        let mut tables = self.schema.tables.lock().unwrap();
        for (table, row) in self.staged.take().unwrap_or_default() {
            tables.get_mut(&table).ok_or_else(|| missing(&table))?.rows.push(row);
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.staged = None;
        Ok(())
    }

    async fn drop_table(&mut self, name: &str) -> Result<()> {
        self.schema.tables.lock().unwrap().remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_basic_operations() {
        let cache = MemoryCache::new();

        cache.set("key1", "one", 0).await.unwrap();
        let entry = cache.get_entry("key1").await.unwrap().unwrap();
        assert_eq!(entry.value, "one");
        assert_eq!(entry.ttl, -1);

        assert!(cache.get_entry("nonexistent").await.unwrap().is_none());

        cache.delete("key1").await.unwrap();
        assert!(cache.get_entry("key1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ttl() {
        let cache = MemoryCache::new();

        cache.set("key1", "one", 60).await.unwrap();
        let ttl = cache.get_entry("key1").await.unwrap().unwrap().ttl;
        assert!(ttl > 0 && ttl <= 60);
    }

    #[tokio::test]
    async fn test_pattern_listing() {
        let cache = MemoryCache::new();
        cache.set("user:1", "a", 0).await.unwrap();
        cache.set("user:2", "b", 0).await.unwrap();
        cache.set("order:1", "c", 0).await.unwrap();

        let keys: Vec<String> = cache
            .list_entries("user:*")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.key)
            .collect();
        assert_eq!(keys, vec!["user:1", "user:2"]);
        assert_eq!(cache.list_entries("*").await.unwrap().len(), 3);
    }

    #[test]
    fn test_statement_table() {
        assert_eq!(
            statement_table("CREATE TABLE `orders` (`id` INT)").as_deref(),
            Some("orders")
        );
        assert_eq!(
            statement_table("INSERT INTO `orders` VALUES (1);").as_deref(),
            Some("orders")
        );
        assert_eq!(statement_table("CREATE TABLE t(id INT)").as_deref(), Some("t"));
        assert_eq!(statement_table("BROKEN"), None);
    }

    #[tokio::test]
    async fn test_import_creates_before_inserting() {
        let schema = MemorySchema::new();
        let backup = TableBackup {
            name: "orders".to_string(),
            structure: "CREATE TABLE `orders` (`id` INT)".to_string(),
            data: "INSERT INTO `orders` VALUES (1);\nINSERT INTO `missing` VALUES (2);".to_string(),
        };

        let err = schema.import_table(&backup).await.unwrap_err();
        assert_eq!(err.to_string(), "Table 'missing' doesn't exist");
        assert!(!schema.has_table("orders"));
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match("*", ""));
        assert!(glob_match("a?c", "abc"));
        assert!(!glob_match("a?c", "ac"));
        assert!(glob_match("*:1", "user:1"));
        assert!(!glob_match("user", "user:1"));
    }
}
