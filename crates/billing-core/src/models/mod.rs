pub mod cancellation_history;
pub mod credit;
pub mod customer;
pub mod idempotency;
pub mod invoice;
pub mod notification;
pub mod payment_method;
pub mod service_instance;

pub use cancellation_history::ServiceCancellationHistory;
pub use credit::{CreditReason, CustomerCredit};
pub use customer::{Customer, CustomerStatus};
pub use idempotency::IdempotencyRecord;
pub use invoice::{
    BillingType, Invoice, InvoiceLineItem, InvoicePayment, InvoiceStatus, InvoiceType, ItemType,
    PaymentSourceType,
};
pub use notification::{AdminNotification, NotificationSeverity};
pub use payment_method::{CustomerPaymentMethod, PaymentMethodStatus, ProviderType};
pub use service_instance::{InstanceConfig, ServiceInstance, ServiceState, Tier};
