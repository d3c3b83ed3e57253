// store

mod cache_backend;

pub use cache_backend::*;

// identity

mod credential_verifier;

pub use credential_verifier::*;
