//! HTTP API handlers for qit-server

pub mod analysis;
pub mod batches;
pub mod buildinfo;
pub mod cartons;
pub mod extract;
pub mod health;
pub mod records;
pub mod ui;

pub use analysis::{analyze_image, analyze_row};
pub use batches::{
    annotate_row, attach_image, discard_batch, enter_manual_serial, get_batch,
    mark_not_available, open_batch, override_result, scan_serial, set_follow_up, submit_batch,
};
pub use buildinfo::get_build_info;
pub use cartons::get_carton;
pub use extract::{ApiJson, ApiPath};
pub use health::health_routes;
pub use records::{
    delete_record, delete_record_by_row, import_records, list_records, records_layout,
    update_record, update_record_by_row,
};
pub use ui::serve_index;
