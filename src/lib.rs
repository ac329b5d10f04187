//! Sofia Proxy - self-hosted Claude API relay for the Okul Asistanım frontend.
//!
//! Features:
//! - Single relay endpoint keeping the Claude API key server-side
//! - Shape validation before any provider quota is spent
//! - Transparent passthrough of provider status codes and error bodies
//! - Normalized JSON error envelopes with localized (Turkish) messages

pub mod api;
pub mod config;
pub mod error;
pub mod http;
pub mod relay;
