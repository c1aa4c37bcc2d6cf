//! Request middleware

pub mod timeout;
