pub mod postgres;
pub mod traits;

pub use traits::{
    CancellationHistoryRepository, CreditRepository, CustomerRepository, IdempotencyRepository,
    InvoiceRepository, NotificationRepository, PaymentMethodRepository, ServiceInstanceRepository,
};
