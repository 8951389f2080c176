// Settlement pipeline
pub mod discounts;
pub mod gateway;
pub mod settlements;

// Invoicing
pub mod documents;
pub mod invoicing;
pub mod sequences;

// Customer management
pub mod customers;
pub mod referrals;
