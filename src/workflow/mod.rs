pub mod invoice_flow;
pub mod record_ctx;

pub use invoice_flow::{InvoiceFlow, RecordOutcome};
pub use record_ctx::RecordCtx;
