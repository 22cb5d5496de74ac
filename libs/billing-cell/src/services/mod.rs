pub mod claim;
pub mod encounter;
pub mod invoice;
pub mod payment;
pub mod stripe;
pub mod totals;
pub mod webhook;

pub use claim::ClaimService;
pub use encounter::EncounterService;
pub use invoice::InvoiceService;
pub use payment::PaymentService;
