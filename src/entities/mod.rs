pub mod customer;
pub mod discount_code;
pub mod entitlement;
pub mod invoice_request;
pub mod invoice_sequence;
pub mod notification;
pub mod payment_record;
pub mod transaction;
