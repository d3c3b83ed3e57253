mod session_authenticator;
mod token_store;

pub use session_authenticator::*;
pub use token_store::*;
