use herd_api::auth;
use herd_api::config::ServerConfig;
use herd_api::routes::{app_router, AppState};
use herd_api::store::TodoStore;

/// Load .env.server for local development.
#[cfg(debug_assertions)]
fn load_dev_dotenv() {
    let server_env = std::path::Path::new(".env.server");
    if server_env.exists() {
        let _ = dotenvy::from_path(server_env);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(debug_assertions)]
    load_dev_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("herd_api=info".parse().expect("valid directive")),
        )
        .init();

    let config = ServerConfig::from_env()?;
    let args: Vec<String> = std::env::args().collect();

    // Admin mode: `herd-api issue-token <user-id> [name]` mints a bearer
    // token and exits.
    if args.get(1).map(String::as_str) == Some("issue-token") {
        let Some(user_id) = args.get(2) else {
            eprintln!("usage: herd-api issue-token <user-id> [name]");
            std::process::exit(2);
        };
        let name = args.get(3).cloned().unwrap_or_else(|| user_id.clone());
        let store = TodoStore::open(&config.db_path)?;
        let token = auth::issue_token(store.connection(), user_id, &name)?;
        println!("{token}");
        return Ok(());
    }

    tracing::info!(db = %config.db_path, "starting herd-api");
    let store = TodoStore::open(&config.db_path)?;
    let state = AppState::new(store);
    let router = app_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("herd-api listening on {}", config.bind_addr);
    axum::serve(listener, router).await?;
    Ok(())
}
