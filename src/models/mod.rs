pub mod billing_record;
pub mod invoice;
pub mod period;

pub use billing_record::{BillingRecord, Charges, ConfirmationCode};
pub use invoice::{AdditionalField, Cabecera, DetailLine, ExtraInfo, InvoiceRequest, Solicitud};
pub use period::{Period, PeriodError};
