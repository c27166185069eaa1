use std::sync::Arc;

use deadpool_redis::redis;
use errors::{Error, ErrorKind, Result};
use log::info;
use tokio::sync::RwLock;
use utils::connector::{create_redis_pool, postgres_connection};

use crate::model::config::Config;

/// Shared handles built once at startup: the parsed configuration, the SQL
/// connection, and the Redis pool every subsystem draws from.
#[derive(Clone)]
pub struct State {
    pub config: Arc<RwLock<Config>>,
    pub db: Arc<sea_orm::DatabaseConnection>,
    pub redis: deadpool_redis::Pool,
}

impl State {
    pub async fn new(config: Config) -> Result<Self> {
        let db = postgres_connection(
            &config.db.database_host,
            config.db.database_port,
            &config.db.database_name,
            &config.db.database_schema,
            &config.db.database_user,
            &config.db.database_password,
        )
        .await
        .ok_or_else(|| {
            Error::with_message(ErrorKind::Database, "failed to connect to postgres")
                .with_op("state.new")
        })?;
        info!("postgres connection established");

        let redis = create_redis_pool(
            &config.redis.redis_host,
            config.redis.redis_port,
            config.redis.redis_db,
            &config.redis.redis_username,
            &config.redis.redis_password,
            config.redis.pool_size,
        )
        .ok_or_else(|| {
            Error::with_message(ErrorKind::Dependency, "failed to create redis pool")
                .with_op("state.new")
        })?;

        {
            let mut conn = redis
                .get()
                .await
                .map_err(|e| Error::new(ErrorKind::Dependency, Some(e)).with_op("state.new"))?;
            let _pong: String = redis::cmd("PING")
                .query_async(&mut conn)
                .await
                .map_err(|e| Error::new(ErrorKind::Dependency, Some(e)).with_op("state.new"))?;
        }
        info!("redis pool established");

        Ok(State {
            config: Arc::new(RwLock::new(config)),
            db: Arc::new(db),
            redis,
        })
    }
}
