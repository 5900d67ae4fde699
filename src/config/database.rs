use sqlx::{mysql::MySqlPoolOptions, MySql, Pool};
use std::time::Duration;

pub type DbPool = Pool<MySql>;

pub async fn init_db(database_url: &str) -> Result<DbPool, sqlx::Error> {
    let pool = MySqlPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}
