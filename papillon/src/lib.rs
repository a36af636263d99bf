//! Papillon: send one personalised message per contact through an SMTP
//! account, within the account's sending limits, optionally filing a copy of
//! each message in the account's sent mailbox.
//!
//! A campaign is described in a single RON file; see [`campaign::Campaign`].

pub mod campaign;
pub mod config;
pub mod summary;

pub use campaign::Campaign;
