pub mod bridge;
pub mod collector;
pub mod date_filter;
pub mod download;
pub mod health;
pub mod matchers;
pub mod modal;
pub mod pagination;
pub mod poll;
pub mod processor;
pub mod recovery;
pub mod rows;
pub mod scripts;
pub mod table;

pub use collector::collect_notifications;
pub use date_filter::{apply_date_filter, DateRange};
pub use download::{capture_consolidated_pdf, CapturedPdf, DownloadOutcome};
pub use health::check_health;
pub use modal::{ModalController, ModalState};
pub use processor::{process_notifications, NotificationProcessor};
pub use recovery::{recover, RecoveryReport};
pub use rows::extract_visible_rows;
pub use scripts::PageScript;
pub use table::{await_table_loaded, peek_table_state};
