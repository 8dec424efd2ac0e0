use sqlx::{Executor, PgPool};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

use regimen_db::config::DbConfig;
use regimen_db::pool::{self, SchemaReport};

const SERVER_ENV: &str = "REGIMEN_TEST_PG_URL";
const PG_TAG: &str = "16";

/// Where test databases are created. The container, if any, lives as long
/// as the test binary.
struct Server {
    base_url: String,
    _container: Option<ContainerAsync<Postgres>>,
}

static SERVER: OnceCell<Server> = OnceCell::const_new();

async fn server() -> &'static Server {
    SERVER
        .get_or_init(|| async {
            if let Ok(url) = std::env::var(SERVER_ENV) {
                return Server {
                    base_url: url.trim_end_matches('/').to_owned(),
                    _container: None,
                };
            }

            let container = Postgres::default()
                .with_tag(PG_TAG)
                .start()
                .await
                .expect("failed to start PostgreSQL container");
            let host = container.get_host().await.expect("container host");
            let port = container
                .get_host_port_ipv4(5432)
                .await
                .expect("container port");

            Server {
                base_url: format!("postgresql://postgres:postgres@{host}:{port}"),
                _container: Some(container),
            }
        })
        .await
}

/// A freshly bootstrapped regimen database, unique to one test.
///
/// Created through [`pool::bootstrap`], the same path `regimen db-init`
/// takes. Call [`TestDb::teardown`] at the end of the test.
pub struct TestDb {
    pub pool: PgPool,
    pub config: DbConfig,
    /// What bootstrap reported for the new database.
    pub report: SchemaReport,
}

impl TestDb {
    pub async fn create() -> Self {
        let server = server().await;
        let name = format!("regimen_test_{}", Uuid::new_v4().simple());
        let config = DbConfig::new(format!("{}/{name}", server.base_url));

        let (pool, report) = pool::bootstrap(&config)
            .await
            .unwrap_or_else(|e| panic!("failed to bootstrap {name}: {e:#}"));
        assert!(report.created, "{name} should not exist before the test");

        Self {
            pool,
            config,
            report,
        }
    }

    /// Close the pool and drop the database, terminating any stragglers.
    pub async fn teardown(self) {
        self.pool.close().await;

        let Some(name) = self.config.database_name() else {
            return;
        };
        let maint = pool::maintenance_pool(&self.config)
            .await
            .expect("maintenance connection for cleanup");

        let _ = sqlx::query(
            "SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
             WHERE datname = $1 AND pid <> pg_backend_pid()",
        )
        .bind(name)
        .execute(&maint)
        .await;

        let stmt = format!("DROP DATABASE IF EXISTS {}", pool::quote_ident(name));
        if let Err(e) = maint.execute(stmt.as_str()).await {
            eprintln!("failed to drop test database {name}: {e}");
        }
        maint.close().await;
    }
}
