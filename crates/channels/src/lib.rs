//! Outbound coupon notifications.
//!
//! WhatsApp: template messages through the AiSensy `sendMessage` API, one
//! synchronous attempt per user.

pub mod whatsapp;

pub use whatsapp::WhatsAppProvider;
