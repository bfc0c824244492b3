//! MySQL data-access gateway

use anyhow::{Context, Result as AnyResult};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use dbadmin_core::{
    import_backup, sql, AdminError, DatabaseConfig, ImportTarget, Result, SchemaGateway,
    UserStore,
};
use dbadmin_types::{
    AlterTableRequest, ColumnInfo, CreateTableRequest, NewUser, PageRequest, TableBackup,
    TableData, TableInfo, User, UserPatch,
};
use futures::TryStreamExt;
use serde_json::{Map, Value};
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::{Executor, MySql, Row, Transaction};
use tracing::{debug, info, warn};

use super::values::{row_object, row_values};

pub struct MySqlGateway {
    pool: MySqlPool,
}

/// Engine errors surface verbatim
fn db_err(e: sqlx::Error) -> AdminError {
    match e {
        sqlx::Error::Database(db) => AdminError::Database(db.message().to_string()),
        other => AdminError::Database(other.to_string()),
    }
}

impl MySqlGateway {
    pub async fn connect(config: &DatabaseConfig) -> AnyResult<Self> {
        let options = connect_options(config);

        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to {}", config.redacted_dsn()))?;

        info!("MySQL connection established, running migrations...");

        Self::run_migrations(&pool)
            .await
            .context("Failed to run database migrations")?;

        info!("Database initialization complete");
        Ok(Self { pool })
    }

    async fn run_migrations(pool: &MySqlPool) -> AnyResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGINT UNSIGNED AUTO_INCREMENT PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                email VARCHAR(255) NOT NULL,
                age INT NULL,
                created_at DATETIME(3) NOT NULL DEFAULT CURRENT_TIMESTAMP(3),
                updated_at DATETIME(3) NOT NULL DEFAULT CURRENT_TIMESTAMP(3)
                    ON UPDATE CURRENT_TIMESTAMP(3)
            )
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    async fn table_exists(&self, name: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM information_schema.tables
            WHERE table_schema = DATABASE() AND table_name = ?
            "#,
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(count > 0)
    }

    async fn column_names(&self, table: &str) -> Result<Vec<String>> {
        sqlx::query_scalar(
            r#"
            SELECT CAST(column_name AS CHAR)
            FROM information_schema.columns
            WHERE table_schema = DATABASE() AND table_name = ?
            ORDER BY ordinal_position
            "#,
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }
}

/// Build connect options from the configuration snapshot. Only parameters the
/// driver understands are applied.
fn connect_options(config: &DatabaseConfig) -> MySqlConnectOptions {
    let mut options = MySqlConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.username)
        .database(&config.dbname);

    if !config.password.is_empty() {
        options = options.password(&config.password);
    }

    let (supported, ignored) = split_params(config.params());
    for name in ignored {
        warn!("Ignoring unsupported connection parameter: {}", name);
    }
    for (key, value) in supported {
        options = match key.as_str() {
            "charset" => options.charset(&value),
            _ => options.collation(&value),
        };
    }

    options
}

const SUPPORTED_PARAMS: [&str; 2] = ["charset", "collation"];

/// Parameters the driver applies, and the names of those it does not know
fn split_params(params: Vec<(String, String)>) -> (Vec<(String, String)>, Vec<String>) {
    let (supported, ignored): (Vec<_>, Vec<_>) = params
        .into_iter()
        .partition(|(key, _)| SUPPORTED_PARAMS.contains(&key.as_str()));
    (supported, ignored.into_iter().map(|(key, _)| key).collect())
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: u64,
    name: String,
    email: String,
    age: Option<i32>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        User {
            id: r.id,
            name: r.name,
            email: r.email,
            age: r.age,
            created_at: r.created_at.and_utc(),
            updated_at: r.updated_at.and_utc(),
        }
    }
}

/// `%needle%` with LIKE wildcards in the needle escaped
fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[async_trait]
impl UserStore for MySqlGateway {
    async fn list_users(&self, name: Option<&str>) -> Result<Vec<User>> {
        let rows: Vec<UserRow> = match name.filter(|n| !n.is_empty()) {
            Some(name) => {
                sqlx::query_as(
                    r#"
                    SELECT id, name, email, age, created_at, updated_at
                    FROM users WHERE name LIKE ? ORDER BY id
                    "#,
                )
                .bind(like_pattern(name))
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as(
                    r#"
                    SELECT id, name, email, age, created_at, updated_at
                    FROM users ORDER BY id
                    "#,
                )
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(db_err)?;

        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn get_user(&self, id: u64) -> Result<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT id, name, email, age, created_at, updated_at
            FROM users WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(User::from))
    }

    async fn create_user(&self, user: &NewUser) -> Result<User> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (name, email, age) VALUES (?, ?, ?)
            "#,
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.age)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        let id = result.last_insert_id();
        self.get_user(id)
            .await?
            .ok_or_else(|| AdminError::Database(format!("user {} vanished after insert", id)))
    }

    async fn update_user(&self, id: u64, patch: UserPatch) -> Result<Option<User>> {
        let Some(mut user) = self.get_user(id).await? else {
            return Ok(None);
        };
        user.apply(patch);

        sqlx::query(
            r#"
            UPDATE users SET name = ?, email = ?, age = ? WHERE id = ?
            "#,
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.age)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        self.get_user(id).await
    }

    async fn delete_user(&self, id: u64) -> Result<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(AdminError::Database(format!(
                "delete affected no rows: user {} does not exist",
                id
            )));
        }
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct TableRow {
    name: String,
    column_count: i64,
    row_count: i64,
    create_time: Option<String>,
}

impl From<TableRow> for TableInfo {
    fn from(r: TableRow) -> Self {
        TableInfo {
            name: r.name,
            column_count: r.column_count,
            rows: r.row_count,
            create_time: r.create_time.unwrap_or_default(),
            column_details: None,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ColumnRow {
    name: String,
    column_type: String,
    nullable: i64,
    column_default: String,
    column_key: String,
}

impl From<ColumnRow> for ColumnInfo {
    fn from(r: ColumnRow) -> Self {
        ColumnInfo {
            name: r.name,
            column_type: r.column_type,
            nullable: r.nullable != 0,
            default: r.column_default,
            key: r.column_key,
        }
    }
}

// information_schema columns are cast to CHAR because some server versions
// report them with a binary collation.
const TABLE_SUMMARY: &str = r#"
    SELECT
        CAST(t.table_name AS CHAR) AS name,
        (
            SELECT COUNT(*)
            FROM information_schema.columns c
            WHERE c.table_schema = t.table_schema
            AND c.table_name = t.table_name
        ) AS column_count,
        CAST(COALESCE(t.table_rows, 0) AS SIGNED) AS row_count,
        DATE_FORMAT(t.create_time, '%Y-%m-%d %H:%i:%s') AS create_time
    FROM information_schema.tables t
    WHERE t.table_schema = DATABASE()
"#;

#[async_trait]
impl SchemaGateway for MySqlGateway {
    async fn list_tables(&self) -> Result<Vec<TableInfo>> {
        let query = format!("{} ORDER BY t.table_name", TABLE_SUMMARY);
        let rows: Vec<TableRow> = sqlx::query_as(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(rows.into_iter().map(TableInfo::from).collect())
    }

    async fn table_detail(&self, name: &str) -> Result<TableInfo> {
        let columns: Vec<ColumnRow> = sqlx::query_as(
            r#"
            SELECT
                CAST(column_name AS CHAR) AS name,
                CAST(column_type AS CHAR) AS column_type,
                CAST(is_nullable = 'YES' AS SIGNED) AS nullable,
                CAST(COALESCE(column_default, '') AS CHAR) AS column_default,
                CAST(column_key AS CHAR) AS column_key
            FROM information_schema.columns
            WHERE table_schema = DATABASE()
            AND table_name = ?
            ORDER BY ordinal_position
            "#,
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let query = format!("{} AND t.table_name = ?", TABLE_SUMMARY);
        let summary: Option<TableRow> = sqlx::query_as(&query)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        let columns: Vec<ColumnInfo> = columns.into_iter().map(ColumnInfo::from).collect();
        let mut info = summary.map(TableInfo::from).unwrap_or_else(|| TableInfo {
            name: name.to_string(),
            column_count: columns.len() as i64,
            rows: 0,
            create_time: String::new(),
            column_details: None,
        });
        info.column_details = Some(columns);
        Ok(info)
    }

    async fn create_table(&self, request: &CreateTableRequest) -> Result<()> {
        let statement = sql::create_table(request)?;
        debug!("Creating table: {}", statement);
        self.pool
            .execute(statement.as_str())
            .await
            .map_err(db_err)?;
        info!("Created table {}", request.name);
        Ok(())
    }

    async fn alter_table(&self, table: &str, request: &AlterTableRequest) -> Result<()> {
        let statement = sql::alter_table(table, request)?;
        debug!("Altering table: {}", statement);
        self.pool
            .execute(statement.as_str())
            .await
            .map_err(db_err)?;
        info!(
            "Altered table {} ({} column {})",
            table, request.action, request.column.name
        );
        Ok(())
    }

    async fn drop_table(&self, name: &str) -> Result<()> {
        let statement = sql::drop_table(name)?;
        self.pool
            .execute(statement.as_str())
            .await
            .map_err(db_err)?;
        info!("Dropped table {}", name);
        Ok(())
    }

    async fn table_page(&self, table: &str, page: &PageRequest) -> Result<TableData> {
        let total: i64 = sqlx::query_scalar(&sql::count_rows(table)?)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        let columns = self.column_names(table).await?;

        // Text protocol, so values the typed decode rejects still arrive as text.
        let select = sql::select_page(table, page)?;
        let rows = self
            .pool
            .fetch_all(select.as_str())
            .await
            .map_err(db_err)?;

        Ok(TableData {
            columns,
            rows: rows.iter().map(row_values).collect(),
            total,
        })
    }

    async fn run_query(&self, query: &str) -> Result<Vec<Map<String, Value>>> {
        // Prepared execution accepts a single statement only.
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(rows.iter().map(row_object).collect())
    }

    async fn export_table(&self, name: &str) -> Result<TableBackup> {
        let ddl = sqlx::query(&sql::show_create_table(name)?)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        let structure: String = ddl.try_get_unchecked(1).map_err(db_err)?;

        let select = sql::select_all(name)?;
        let mut rows = self.pool.fetch(select.as_str());
        let mut statements = Vec::new();
        while let Some(row) = rows.try_next().await.map_err(db_err)? {
            statements.push(sql::insert_statement(name, &row_values(&row))?);
        }

        info!("Exported table {} ({} rows)", name, statements.len());
        Ok(TableBackup {
            name: name.to_string(),
            structure,
            data: statements.join("\n"),
        })
    }

    async fn import_table(&self, backup: &TableBackup) -> Result<()> {
        let mut target = MySqlImport {
            gateway: self,
            tx: None,
        };
        import_backup(&mut target, backup).await?;
        Ok(())
    }
}

/// Import statements run on one pooled transaction. Drops go through the pool
/// since DDL commits on its own anyway.
struct MySqlImport<'a> {
    gateway: &'a MySqlGateway,
    tx: Option<Transaction<'static, MySql>>,
}

fn no_transaction() -> AdminError {
    AdminError::Database("no import transaction is open".to_string())
}

#[async_trait]
impl<'a> ImportTarget for MySqlImport<'a> {
    async fn table_exists(&mut self, name: &str) -> Result<bool> {
        self.gateway.table_exists(name).await
    }

    async fn begin(&mut self) -> Result<()> {
        self.tx = Some(self.gateway.pool.begin().await.map_err(db_err)?);
        Ok(())
    }

    async fn execute(&mut self, statement: &str) -> Result<()> {
        let tx = self.tx.as_mut().ok_or_else(no_transaction)?;
        (&mut **tx).execute(statement).await.map_err(db_err)?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let tx = self.tx.take().ok_or_else(no_transaction)?;
        tx.commit().await.map_err(db_err)
    }

    async fn rollback(&mut self) -> Result<()> {
        let tx = self.tx.take().ok_or_else(no_transaction)?;
        tx.rollback().await.map_err(db_err)
    }

    async fn drop_table(&mut self, name: &str) -> Result<()> {
        SchemaGateway::drop_table(self.gateway, name).await
    }
}
