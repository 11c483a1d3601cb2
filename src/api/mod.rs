//! HTTP handlers: the webhook trigger plus read-only run inspection

pub mod runs;
pub mod status;
pub mod webhook;

pub use runs::get_run;
pub use status::{root, status};
pub use webhook::handle_webhook;
