pub mod batch_loader;
pub mod document_archive;
pub mod failure_ledger;
pub mod invoice_formatter;
pub mod numbering_corrector;
pub mod precondition_checker;

pub use batch_loader::BatchLoader;
pub use document_archive::DocumentArchive;
pub use failure_ledger::FailureLedger;
pub use invoice_formatter::{FormatError, InvoiceFormatter};
pub use numbering_corrector::NumberingCorrector;
pub use precondition_checker::PreconditionChecker;
