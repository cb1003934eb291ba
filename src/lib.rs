//! `BiteBuddy` dashboard core: OTP login, server-side sessions and role gating.
//!
//! The CRUD glue of the dashboard (restaurants, metrics, reviews, filters) is
//! mounted by an outer route layer behind [`bitebuddy::handlers::require_auth`]
//! and [`bitebuddy::handlers::require_admin`].

pub mod auth;
pub mod bitebuddy;
pub mod cli;
pub mod notify;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

/// Application name shown in OTP messages.
pub const APP_NAME: &str = "BiteBuddy";
