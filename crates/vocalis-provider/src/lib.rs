//! Outbound HTTP clients
//!
//! Everything that leaves the process over HTTP lives here: the voice
//! provider's call-listing API, the payment gateway, and the alert
//! webhook. All clients are built once at startup and shared.

pub mod alerter;
pub mod client;
pub mod payments;

pub use alerter::WebhookAlerter;
pub use client::VoiceProviderClient;
pub use payments::PaymentGatewayClient;
