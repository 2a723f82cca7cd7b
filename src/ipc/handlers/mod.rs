pub mod consent;
pub mod core;
pub mod login;
pub mod sessions;
pub mod study;
pub mod survey;
pub mod voucher;
