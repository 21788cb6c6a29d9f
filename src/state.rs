use std::sync::Arc;

use crate::{
    cache::Cache,
    config::AppConfig,
    db::{DbPool, OrmConn},
    mailer::Mailer,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
    pub cache: Cache,
    pub mailer: Arc<dyn Mailer>,
    pub config: Arc<AppConfig>,
}
