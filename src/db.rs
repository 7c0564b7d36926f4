use once_cell::sync::OnceCell;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::time::Duration;

static DB_POOL: OnceCell<DatabaseConnection> = OnceCell::new();

#[inline(always)]
pub fn get_db_pool() -> &'static DatabaseConnection {
    DB_POOL
        .get()
        .expect("DatabaseConnection in DB_POOL accessed before init_db()")
}

/// Sets the process-wide connection pool. Returns the connection back if the
/// pool was already set.
pub fn set_db_pool(pool: DatabaseConnection) -> Result<(), DatabaseConnection> {
    DB_POOL.set(pool)
}

/// Opens the database URL and initializes the DB_POOL static.
pub async fn init_db(database_url: String) -> &'static DatabaseConnection {
    let mut opt = ConnectOptions::new(database_url);
    opt.max_connections(100)
        .min_connections(5)
        .connect_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(8))
        .sqlx_logging(true);

    let pool = Database::connect(opt)
        .await
        .expect("Database connection was not established.");
    set_db_pool(pool).expect("init_db() called twice");

    get_db_pool()
}
