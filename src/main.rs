use pingcrm::{
    AppState,
    cli::{self, Action},
    config::{AppConfig, Env},
    create_router,
    repository::{PostgresRepository, RepositoryState},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_sessions_sqlx_store::PostgresStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads configuration, initializes logging and the database, then either runs
/// a user-management command or serves HTTP.
#[tokio::main]
async fn main() {
    // 1. Configuration (fail fast on missing production settings)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    let matches = cli::new().get_matches();

    // 2. Logging: RUST_LOG wins, otherwise crate-level debug.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "pingcrm=debug,tower_http=info,axum=trace".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    let action = match cli::dispatch(&matches) {
        Ok(action) => action,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };

    tracing::info!("Application starting in {:?} mode", config.env);

    // 3. Database and schema
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("FATAL: Failed to apply database migrations.");

    let repo = Arc::new(PostgresRepository::new(pool.clone())) as RepositoryState;
    let app_state = AppState::new(repo, config.clone())
        .expect("FATAL: Invalid password hashing parameters.");

    match action {
        Action::CreateUser(data) => {
            let email = data.email.clone();
            match app_state.users().create(data).await {
                Ok(user) => println!("User created: {}", user.email),
                Err(e) => {
                    eprintln!("Could not create {email}: {e}");
                    std::process::exit(1);
                }
            }
        }
        Action::PromoteToSuperuser { email } => {
            match app_state.users().promote_to_superuser(&email).await {
                Ok(user) => println!("Upgraded {} to superuser", user.email),
                Err(e) => {
                    eprintln!("Could not promote {email}: {e}");
                    std::process::exit(1);
                }
            }
        }
        Action::Serve => serve(app_state, pool, &config).await,
    }
}

async fn serve(app_state: AppState, pool: sqlx::PgPool, config: &AppConfig) {
    // 4. Session store (table managed by the store itself)
    let store = PostgresStore::new(pool);
    store
        .migrate()
        .await
        .expect("FATAL: Failed to create the session table.");

    // 5. Router and server
    let app = create_router(app_state, store);

    let address = config.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .expect("FATAL: Failed to bind the HTTP listener.");

    tracing::info!("Listening on {address}");
    tracing::info!("API Documentation (Swagger UI) available at: http://{address}/schema/swagger");

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server terminated unexpectedly.");
}
