pub mod api;
pub mod auth;
pub mod config;
pub mod db;

pub use db::DbPool;

use auth::TokenProvider;
use config::Config;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub tokens: TokenProvider,
}

impl AppState {
    pub fn new(config: Config, db: DbPool) -> Self {
        let tokens = TokenProvider::from_config(&config.auth);
        Self { config, db, tokens }
    }
}
