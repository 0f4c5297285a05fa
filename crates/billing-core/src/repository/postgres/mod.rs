mod cancellation_history;
mod clock_store;
mod credit;
mod customer;
mod idempotency;
mod invoice;
mod notification;
mod payment_method;
mod service_instance;
mod usage;

pub use cancellation_history::PostgresCancellationHistoryRepository;
pub use clock_store::PostgresClockStore;
pub use credit::PostgresCreditRepository;
pub use customer::PostgresCustomerRepository;
pub use idempotency::PostgresIdempotencyRepository;
pub use invoice::PostgresInvoiceRepository;
pub use notification::PostgresNotificationRepository;
pub use payment_method::PostgresPaymentMethodRepository;
pub use service_instance::PostgresServiceInstanceRepository;
pub use usage::PostgresUsageSource;
