//! qit-server library - carton quality-inspection service
//!
//! Hosts the draft-batch workflow, the committed record collection and
//! image analysis behind an axum router.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use qit_common::catalog::CartonCatalog;
use qit_common::draft::DraftBatch;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

pub mod api;
pub mod classifier;
pub mod error;
pub mod store;
pub mod workbook;

use classifier::DefectClassifier;
use store::RecordStore;
use workbook::Workbook;

/// Upper bound on request bodies; photos arrive inline as base64
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Open draft batches by id
pub type DraftMap = Arc<RwLock<HashMap<Uuid, DraftBatch>>>;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Committed record collection
    pub store: Arc<dyn RecordStore>,
    pub classifier: Arc<dyn DefectClassifier>,
    /// Closed carton → serial catalog
    pub catalog: Arc<CartonCatalog>,
    /// Bulk-import source, when configured
    pub workbook: Option<Arc<Workbook>>,
    pub drafts: DraftMap,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// Create new application state
    pub fn new(
        store: Arc<dyn RecordStore>,
        classifier: Arc<dyn DefectClassifier>,
        catalog: CartonCatalog,
    ) -> Self {
        Self {
            store,
            classifier,
            catalog: Arc::new(catalog),
            workbook: None,
            drafts: Arc::new(RwLock::new(HashMap::new())),
            startup_time: qit_common::time::now(),
        }
    }

    pub fn with_workbook(mut self, workbook: Workbook) -> Self {
        self.workbook = Some(Arc::new(workbook));
        self
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, patch, post, put};

    let records = Router::new()
        .route("/api/records", get(api::list_records))
        .route("/api/records/layout", get(api::records_layout))
        .route("/api/records/import", post(api::import_records))
        .route(
            "/api/records/row/:n",
            patch(api::update_record_by_row).delete(api::delete_record_by_row),
        )
        .route(
            "/api/records/:id",
            patch(api::update_record).delete(api::delete_record),
        );

    let batches = Router::new()
        .route("/api/batches", post(api::open_batch))
        .route(
            "/api/batches/:id",
            get(api::get_batch).delete(api::discard_batch),
        )
        .route("/api/batches/:id/scan", post(api::scan_serial))
        .route("/api/batches/:id/submit", post(api::submit_batch))
        .route(
            "/api/batches/:id/rows/:usn/manual",
            put(api::enter_manual_serial),
        )
        .route(
            "/api/batches/:id/rows/:usn/not-available",
            post(api::mark_not_available),
        )
        .route("/api/batches/:id/rows/:usn/defect", put(api::annotate_row))
        .route("/api/batches/:id/rows/:usn/image", put(api::attach_image))
        .route("/api/batches/:id/rows/:usn/result", put(api::override_result))
        .route(
            "/api/batches/:id/rows/:usn/follow-up",
            put(api::set_follow_up),
        )
        .route("/api/batches/:id/rows/:usn/analyze", post(api::analyze_row));

    let public = Router::new()
        .route("/", get(api::serve_index))
        .route("/api/buildinfo", get(api::get_build_info))
        .route("/api/cartons/:id", get(api::get_carton))
        .route("/api/analysis", post(api::analyze_image))
        .merge(api::health_routes());

    Router::new()
        .merge(records)
        .merge(batches)
        .merge(public)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
