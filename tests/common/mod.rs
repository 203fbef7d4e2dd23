use std::sync::Arc;

use barrelworks_api::{
    config::AppConfig,
    db,
    entities::{product, ProductModel},
    events::{self, EventSender},
    AppServices, AppState,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use tempfile::TempDir;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Test harness: application state backed by a throwaway SQLite file.
///
/// Each instance gets its own temp directory, so tests can run in
/// parallel without sharing schema or rows.
pub struct TestApp {
    pub state: Arc<AppState>,
    _event_task: tokio::task::JoinHandle<()>,
    _db_dir: TempDir,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let db_dir = tempfile::tempdir().expect("failed to create temp dir");
        let db_path = db_dir.path().join("barrelworks_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(64);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let services = AppServices::new(
            db_arc.clone(),
            Arc::new(event_sender.clone()),
            Arc::new(cfg.clone()),
        );

        let state = Arc::new(AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        });

        Self {
            state,
            _event_task: event_task,
            _db_dir: db_dir,
        }
    }
}

/// Inserts a catalog product with every customization axis enabled.
pub async fn seed_product(app: &TestApp, name: &str, base_price: Decimal) -> ProductModel {
    let id = Uuid::new_v4();
    let now = Utc::now();

    let model = product::ActiveModel {
        id: Set(id),
        category_id: Set(None),
        name: Set(name.to_string()),
        slug: Set(format!("{}-{}", name.to_lowercase().replace(' ', "-"), id)),
        description: Set(format!("{name} description")),
        short_description: Set(format!("{name} short description")),
        base_price: Set(base_price),
        stock_quantity: Set(100),
        is_active: Set(true),
        has_color_finish: Set(true),
        has_engraving: Set(true),
        has_barrel_length: Set(true),
        has_barrel_material: Set(true),
        images: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    };

    model
        .insert(&*app.state.db)
        .await
        .expect("failed to seed product")
}
