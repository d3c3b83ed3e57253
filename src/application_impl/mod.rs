mod credential_verifier_impl;
mod session_authenticator_impl;
mod token_store_impl;

pub use credential_verifier_impl::*;
pub use session_authenticator_impl::*;
pub use token_store_impl::*;
