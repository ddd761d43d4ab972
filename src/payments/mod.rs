//! M-Pesa payment primitives: phone normalization, the gateway client, and
//! the tolerant parsing rules shared by initiation and callback handling.

pub mod error;
pub mod extract;
pub mod gateway;
pub mod phone;
pub mod types;
