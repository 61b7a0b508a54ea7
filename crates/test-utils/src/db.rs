//! Throwaway Postgres databases for payload persister tests.
//!
//! Each test gets its own database, created from `TEST_ADMIN_DATABASE_URL`
//! (read from the environment or a `.env` file) and migrated with the swfr
//! schema. The admin role needs CREATE/DROP DATABASE.
//!
//! Databases are dropped when the test body returns `Ok`. They are kept
//! when it fails, panics, or `TEST_KEEP_DB` is set.

use std::future::Future;
use std::pin::Pin;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Connection, Executor, PgConnection, PgPool};
use url::Url;
use uuid::Uuid;

const ADMIN_URL_VAR: &str = "TEST_ADMIN_DATABASE_URL";
const KEEP_DB_VAR: &str = "TEST_KEEP_DB";

/// Postgres caps identifiers at 63 bytes.
const MAX_IDENT_LEN: usize = 63;

/// A migrated database owned by one test.
struct TestDb {
    admin: PgConnection,
    name: String,
    pool: PgPool,
}

impl TestDb {
    async fn create(test_name: &str) -> Result<Self> {
        dotenvy::dotenv().ok();

        let admin_url = std::env::var(ADMIN_URL_VAR)
            .with_context(|| format!("{ADMIN_URL_VAR} must be set for database tests"))?;
        let mut admin = PgConnection::connect(&admin_url)
            .await
            .context("connecting to the admin database")?;

        let name = database_name(test_name);
        admin
            .execute(format!(r#"CREATE DATABASE "{name}""#).as_str())
            .await
            .with_context(|| format!("creating database {name}"))?;

        let mut url = Url::parse(&admin_url)?;
        url.set_path(&format!("/{name}"));
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect(url.as_str())
            .await?;

        sqlx::migrate!("../swfr/migrations").run(&pool).await?;

        Ok(Self { admin, name, pool })
    }

    async fn drop_database(mut self) {
        self.pool.close().await;
        let statement = format!(r#"DROP DATABASE IF EXISTS "{}" WITH (FORCE)"#, self.name);
        match self.admin.execute(statement.as_str()).await {
            Ok(_) => eprintln!("[test-utils] dropped database {}", self.name),
            Err(e) => eprintln!("[test-utils] could not drop database {}: {e}", self.name),
        }
    }
}

/// Run `f` against a fresh, migrated database.
///
/// The database name is derived from `test_name` so kept databases are easy
/// to find.
pub async fn with_test_db<F, T>(test_name: &str, f: F) -> Result<T>
where
    F: for<'a> FnOnce(&'a PgPool) -> Pin<Box<dyn Future<Output = Result<T>> + 'a>>,
{
    let db = TestDb::create(test_name).await?;
    let result = f(&db.pool).await;

    if result.is_ok() && std::env::var_os(KEEP_DB_VAR).is_none() {
        db.drop_database().await;
    } else {
        eprintln!("[test-utils] keeping database {}", db.name);
    }

    result
}

/// `test_<sanitized name>_<uuid v7>`, within the identifier limit.
fn database_name(test_name: &str) -> String {
    let suffix = Uuid::now_v7().simple().to_string();
    let budget = MAX_IDENT_LEN - "test_".len() - 1 - suffix.len();

    let sanitized: String = test_name
        .chars()
        .map(|c| match c {
            c if c.is_ascii_alphanumeric() => c.to_ascii_lowercase(),
            _ => '_',
        })
        .collect();
    let mut stem = sanitized.trim_matches('_').to_owned();
    stem.truncate(budget);

    format!("test_{stem}_{suffix}")
}

/// Define an async test that runs against its own database.
///
/// ```ignore
/// use test_utils::db_test;
///
/// db_test!(payload_round_trips, |pool| {
///     sqlx::query("SELECT 1").execute(pool).await?;
///     Ok(())
/// });
/// ```
#[macro_export]
macro_rules! db_test {
    ($name:ident, |$pool:ident| $body:block) => {
        #[tokio::test(flavor = "multi_thread")]
        async fn $name() -> anyhow::Result<()> {
            $crate::db::with_test_db(stringify!($name), |$pool| Box::pin(async move { $body }))
                .await
        }
    };
}
