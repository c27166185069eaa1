use sea_orm::{Database, DatabaseConnection};

pub fn create_redis_pool(
    host: &str,
    port: u16,
    db: u16,
    username: &Option<String>,
    password: &Option<String>,
    pool_size: Option<usize>,
) -> Option<deadpool_redis::Pool> {
    let cfg = deadpool_redis::Config {
        connection: Some(deadpool_redis::ConnectionInfo {
            addr: deadpool_redis::ConnectionAddr::Tcp(host.to_string(), port),
            redis: deadpool_redis::RedisConnectionInfo {
                db: db as i64,
                username: username.clone(),
                password: password.clone(),
                protocol: deadpool_redis::ProtocolVersion::RESP3,
            },
        }),
        pool: Some(deadpool_redis::PoolConfig {
            max_size: pool_size.unwrap_or(100),
            ..Default::default()
        }),
        ..Default::default()
    };
    cfg.create_pool(Some(deadpool_redis::Runtime::Tokio1)).ok()
}

pub async fn postgres_connection(
    host: &str,
    port: u16,
    db: &str,
    schema: &str,
    user: &str,
    password: &str,
) -> Option<DatabaseConnection> {
    let pg_url = format!("postgres://{user}:{password}@{host}:{port}/{db}");

    let mut db_options = sea_orm::ConnectOptions::new(pg_url);
    db_options
        .set_schema_search_path(schema)
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    match Database::connect(db_options).await {
        Ok(db) => Some(db),
        Err(e) => {
            log::error!("failed to connect to postgres database: {e}");
            None
        }
    }
}
