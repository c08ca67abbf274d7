//! Presentation-facing helpers: pay request URIs and user messages.

pub mod messages;
pub mod pay_url;
