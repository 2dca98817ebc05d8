//! Access token authentication — resolves connection tokens to identities.

pub mod token;
pub mod traits;

pub use token::HmacTokenAuthenticator;
pub use traits::{Authenticator, Identity};

/// Factory: create the authenticator from config
pub fn create_authenticator(config: &crate::config::AuthConfig) -> Box<dyn Authenticator> {
    Box::new(HmacTokenAuthenticator::from_config(config))
}
