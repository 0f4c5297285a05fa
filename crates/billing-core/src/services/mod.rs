pub mod grace_service;
pub mod processor;
pub mod service_billing;
pub mod tier_service;

pub use grace_service::GraceService;
pub use processor::{CustomerBillingProcessor, CustomerBillingReport};
pub use service_billing::{ServiceBillingOutcome, ServiceBillingService};
pub use tier_service::{Phase1Result, TierService};
