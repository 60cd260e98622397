#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
//! Device-bound authentication core for mobile clients.
//!
//! Establishes a stable, cryptographically derived device identity, drives
//! the phone → OTP → MPIN login flows for administrators and standard
//! users, keeps the access token fresh in the background, and pairs web
//! sessions scanned from a browser. The embedding shell supplies the two
//! storage tiers and renders the states this crate returns.

use strum::EnumString;

/// Backend deployment targeted by the client.
#[derive(Debug, Clone, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Environment {
    /// Pre-production deployment.
    Staging,
    /// Production deployment.
    Production,
}

mod api;
pub use api::*;

mod client;
pub use client::*;

mod config;
pub use config::*;

mod digits;
pub use digits::*;

mod error;
pub use error::*;

mod flow;
pub use flow::*;

mod identity;
pub use identity::*;

pub mod logger;

mod pairing;
pub use pairing::*;

mod refresh;
pub use refresh::*;

mod request;
pub use request::*;

mod session;
pub use session::*;

pub mod storage;
