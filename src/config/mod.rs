pub mod schema;

#[allow(unused_imports)]
pub use schema::{AuthConfig, ChatConfig, Config, ProviderConfig, ServerConfig};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reexported_config_default_is_constructible() {
        let config = Config::default();

        assert_eq!(config.server.port, 42910);
        assert!(config.provider.api_key.is_none());
        assert!(config.chat.top_k > 0);
    }
}
