pub mod invoicing_client;

pub use invoicing_client::{HttpInvoicingClient, InvoicingError, InvoicingService};
