pub mod invoice;
pub mod result;
pub mod settings;
pub mod transaction;

pub use invoice::{Invoice, InvoiceStatus, SalesInvoiceRow};
pub use result::{MatchResult, MatchStatus, QueryStage};
pub use settings::{ConfigurationError, FilterId, MatchConfiguration, SortField, SortOrder};
pub use transaction::BankTransaction;
