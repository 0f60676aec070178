pub mod credential_cache;
pub mod token_store;
