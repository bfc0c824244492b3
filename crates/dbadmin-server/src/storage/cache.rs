//! Redis command bridge
//!
//! One `KeyValueStore` implementation per topology. The variant is chosen once
//! in [`connect`]; handlers only ever see the trait object.

use anyhow::{Context, Result as AnyResult};
use async_trait::async_trait;
use dashmap::DashMap;
use dbadmin_core::{AdminError, KeyValueStore, RedisConfig, RedisMode, Result};
use dbadmin_types::RedisEntry;
use redis::aio::{ConnectionLike, ConnectionManager};
use redis::cluster::ClusterClientBuilder;
use redis::cluster_async::ClusterConnection;
use redis::{Client, IntoConnectionInfo, RedisError, RedisResult};
use std::sync::Arc;
use tracing::{debug, info, warn};

fn cache_err(e: RedisError) -> AdminError {
    AdminError::Cache(e.to_string())
}

/// Open the configured topology and check it answers PING.
pub async fn connect(config: &RedisConfig) -> AnyResult<Arc<dyn KeyValueStore>> {
    match config.mode {
        RedisMode::Single => {
            let store = SingleNodeStore::connect(config).await?;
            Ok(Arc::new(store))
        }
        RedisMode::Cluster => {
            let store = ClusterStore::connect(config).await?;
            Ok(Arc::new(store))
        }
    }
}

/// TYPE, GET and TTL for one key. `None` when the key vanished.
async fn describe_key<C>(conn: &mut C, key: &str) -> RedisResult<Option<RedisEntry>>
where
    C: ConnectionLike + Send,
{
    let key_type: String = redis::cmd("TYPE").arg(key).query_async(conn).await?;
    if key_type == "none" {
        return Ok(None);
    }

    // Non-string types have no single value to show.
    let value = if key_type == "string" {
        let raw: Option<Vec<u8>> = redis::cmd("GET").arg(key).query_async(conn).await?;
        raw.map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default()
    } else {
        String::new()
    };

    let ttl: i64 = redis::cmd("TTL").arg(key).query_async(conn).await?;

    Ok(Some(RedisEntry {
        key: key.to_string(),
        value,
        key_type,
        ttl,
        node: None,
    }))
}

async fn scan_connection<C>(conn: &mut C, pattern: &str) -> RedisResult<Vec<RedisEntry>>
where
    C: ConnectionLike + Send,
{
    let keys: Vec<String> = redis::cmd("KEYS").arg(pattern).query_async(conn).await?;
    let mut entries = Vec::with_capacity(keys.len());
    for key in &keys {
        if let Some(entry) = describe_key(conn, key).await? {
            entries.push(entry);
        }
    }
    Ok(entries)
}

fn set_command(key: &str, value: &str, ttl_secs: i64) -> redis::Cmd {
    let mut cmd = redis::cmd("SET");
    cmd.arg(key).arg(value);
    if ttl_secs > 0 {
        cmd.arg("EX").arg(ttl_secs);
    }
    cmd
}

async fn ping<C>(conn: &mut C) -> RedisResult<()>
where
    C: ConnectionLike + Send,
{
    let _: String = redis::cmd("PING").query_async(conn).await?;
    Ok(())
}

pub struct SingleNodeStore {
    conn: ConnectionManager,
}

impl SingleNodeStore {
    pub async fn connect(config: &RedisConfig) -> AnyResult<Self> {
        let single = &config.single;
        let mut info = (single.host.as_str(), single.port)
            .into_connection_info()
            .context("Invalid redis address")?;
        if !single.password.is_empty() {
            info.redis.password = Some(single.password.clone());
        }
        info.redis.db = single.db;

        let client = Client::open(info).context("Invalid redis configuration")?;
        let mut conn = ConnectionManager::new(client)
            .await
            .with_context(|| format!("Failed to connect to redis at {}:{}", single.host, single.port))?;
        ping(&mut conn).await.context("Redis did not answer PING")?;

        info!("Connected to redis {}:{} (db {})", single.host, single.port, single.db);
        Ok(Self { conn })
    }
}

#[async_trait]
impl KeyValueStore for SingleNodeStore {
    async fn list_entries(&self, pattern: &str) -> Result<Vec<RedisEntry>> {
        let mut conn = self.conn.clone();
        scan_connection(&mut conn, pattern).await.map_err(cache_err)
    }

    async fn get_entry(&self, key: &str) -> Result<Option<RedisEntry>> {
        let mut conn = self.conn.clone();
        describe_key(&mut conn, key).await.map_err(cache_err)
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: i64) -> Result<()> {
        let mut conn = self.conn.clone();
        set_command(key, value, ttl_secs)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(cache_err)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async::<_, i64>(&mut conn)
            .await
            .map_err(cache_err)?;
        Ok(())
    }
}

/// A node that can be scanned on its own
#[async_trait]
pub trait CacheNode: Send + Sync {
    fn address(&self) -> &str;
    async fn matching_entries(&self, pattern: &str) -> Result<Vec<RedisEntry>>;
}

/// Scan every node in order, tagging entries with the node they came from.
/// The first failing node aborts the whole listing.
pub async fn scan_masters<N: CacheNode>(nodes: &[N], pattern: &str) -> Result<Vec<RedisEntry>> {
    let mut entries = Vec::new();
    for node in nodes {
        let found = node.matching_entries(pattern).await?;
        debug!("{} keys matched on {}", found.len(), node.address());
        entries.extend(found.into_iter().map(|e| e.tagged(node.address())));
    }
    Ok(entries)
}

/// Direct connection to one cluster member
#[derive(Clone)]
pub struct RedisNode {
    address: String,
    conn: ConnectionManager,
}

#[async_trait]
impl CacheNode for RedisNode {
    fn address(&self) -> &str {
        &self.address
    }

    async fn matching_entries(&self, pattern: &str) -> Result<Vec<RedisEntry>> {
        let mut conn = self.conn.clone();
        scan_connection(&mut conn, pattern).await.map_err(cache_err)
    }
}

pub struct ClusterStore {
    cluster: ClusterConnection,
    seeds: Vec<String>,
    password: Option<String>,
    nodes: DashMap<String, RedisNode>,
}

impl ClusterStore {
    pub async fn connect(config: &RedisConfig) -> AnyResult<Self> {
        let cluster_config = &config.cluster;
        let seeds: Vec<String> = cluster_config
            .addrs
            .iter()
            .map(|addr| node_url(addr))
            .collect();
        let password = Some(cluster_config.password.clone()).filter(|p| !p.is_empty());

        let mut builder = ClusterClientBuilder::new(seeds.clone());
        if let Some(password) = &password {
            builder = builder.password(password.clone());
        }
        if cluster_config.read_only {
            builder = builder.read_from_replicas();
        }
        let client = builder.build().context("Invalid redis cluster configuration")?;

        let mut cluster = client
            .get_async_connection()
            .await
            .context("Failed to connect to redis cluster")?;
        ping(&mut cluster)
            .await
            .context("Redis cluster did not answer PING")?;

        info!("Connected to redis cluster ({} seed nodes)", seeds.len());
        Ok(Self {
            cluster,
            seeds: cluster_config.addrs.clone(),
            password,
            nodes: DashMap::new(),
        })
    }

    /// Cached direct connection to `address`
    async fn node(&self, address: &str) -> Result<RedisNode> {
        if let Some(node) = self.nodes.get(address) {
            return Ok(node.clone());
        }

        let mut info = node_url(address)
            .as_str()
            .into_connection_info()
            .map_err(cache_err)?;
        info.redis.password = self.password.clone();

        let client = Client::open(info).map_err(cache_err)?;
        let conn = ConnectionManager::new(client).await.map_err(cache_err)?;
        let node = RedisNode {
            address: address.to_string(),
            conn,
        };

        debug!("Opened connection to cluster node {}", address);
        self.nodes.insert(address.to_string(), node.clone());
        Ok(node)
    }

    /// Current masters as reported by the first seed that answers
    async fn masters(&self) -> Result<Vec<RedisNode>> {
        let mut last_error = None;
        for seed in &self.seeds {
            let topology = match self.cluster_nodes(seed).await {
                Ok(text) => text,
                Err(e) => {
                    warn!("CLUSTER NODES failed on {}: {}", seed, e);
                    last_error = Some(e);
                    continue;
                }
            };

            let addresses = parse_cluster_masters(&topology);
            let pruned = prune_nodes(&self.nodes, &addresses, &self.seeds);
            if pruned > 0 {
                info!("Closed {} connections to nodes no longer serving as masters", pruned);
            }

            let mut masters = Vec::with_capacity(addresses.len());
            for address in &addresses {
                masters.push(self.node(address).await?);
            }
            return Ok(masters);
        }

        Err(last_error
            .unwrap_or_else(|| AdminError::Cache("no cluster seed nodes configured".to_string())))
    }

    async fn cluster_nodes(&self, seed: &str) -> Result<String> {
        let mut conn = self.node(seed).await?.conn;
        redis::cmd("CLUSTER")
            .arg("NODES")
            .query_async(&mut conn)
            .await
            .map_err(cache_err)
    }
}

#[async_trait]
impl KeyValueStore for ClusterStore {
    async fn list_entries(&self, pattern: &str) -> Result<Vec<RedisEntry>> {
        let masters = self.masters().await?;
        scan_masters(&masters, pattern).await
    }

    async fn get_entry(&self, key: &str) -> Result<Option<RedisEntry>> {
        let mut conn = self.cluster.clone();
        describe_key(&mut conn, key).await.map_err(cache_err)
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: i64) -> Result<()> {
        let mut conn = self.cluster.clone();
        set_command(key, value, ttl_secs)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(cache_err)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.cluster.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async::<_, i64>(&mut conn)
            .await
            .map_err(cache_err)?;
        Ok(())
    }
}

/// Forget cached connections to nodes that are neither current masters nor
/// configured seeds. Returns how many were dropped.
fn prune_nodes<V>(nodes: &DashMap<String, V>, masters: &[String], seeds: &[String]) -> usize {
    let before = nodes.len();
    nodes.retain(|address, _| masters.contains(address) || seeds.contains(address));
    before.saturating_sub(nodes.len())
}

fn node_url(address: &str) -> String {
    if address.contains("://") {
        address.to_string()
    } else {
        format!("redis://{}", address)
    }
}

/// Addresses of healthy masters in a `CLUSTER NODES` reply, sorted.
///
/// Each line reads `<id> <ip:port@cport[,hostname]> <flags> ...`.
pub fn parse_cluster_masters(text: &str) -> Vec<String> {
    let mut masters: Vec<String> = text
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let _id = fields.next()?;
            let address = fields.next()?;
            let flags: Vec<&str> = fields.next()?.split(',').collect();

            let healthy = flags.contains(&"master")
                && !flags
                    .iter()
                    .any(|f| matches!(*f, "fail" | "fail?" | "noaddr" | "handshake"));
            if !healthy {
                return None;
            }

            let address = address.split(',').next()?;
            let address = address.split('@').next()?;
            if address.starts_with(':') {
                return None;
            }
            Some(address.to_string())
        })
        .collect();
    masters.sort();
    masters
}
