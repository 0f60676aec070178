//! Named-pipe mail intake: normalize raw MIME messages, append them to a JSON Lines log and
//! forward them to the processing API.

pub mod api;
pub mod auth;
pub mod config;
pub mod daemon;
pub mod domain;
pub mod error;
pub mod mail;
pub mod store;
