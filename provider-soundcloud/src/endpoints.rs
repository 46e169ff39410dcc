//! SoundCloud endpoints and OAuth presets

use core_auth::{AuthScheme, AuthorityConfig, GrantKind, OAuthConfig};

pub const SOUNDCLOUD_API_BASE: &str = "https://api.soundcloud.com";
pub const SOUNDCLOUD_AUTHORIZE_URL: &str = "https://secure.soundcloud.com/authorize";
pub const SOUNDCLOUD_TOKEN_URL: &str = "https://secure.soundcloud.com/oauth/token";
pub const PROVIDER_NAME: &str = "soundcloud";

/// Client registration for both grant modes.
///
/// The authorize page is requested as a popup; `redirect_uri` is only needed
/// for the user mode.
pub fn oauth_config(
    client_id: impl Into<String>,
    client_secret: impl Into<String>,
    redirect_uri: Option<String>,
) -> OAuthConfig {
    let config = OAuthConfig::new(client_id, SOUNDCLOUD_TOKEN_URL)
        .with_client_secret(client_secret)
        .with_authorize_url(SOUNDCLOUD_AUTHORIZE_URL)
        .with_authorize_param("display", "popup");

    match redirect_uri {
        Some(uri) => config.with_redirect_uri(uri),
        None => config,
    }
}

/// SoundCloud expects `Authorization: OAuth <token>`
pub fn authority_config(grant_kind: GrantKind) -> AuthorityConfig {
    AuthorityConfig::new(PROVIDER_NAME, grant_kind).with_scheme(AuthScheme::OAuth)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_mode_presets() {
        let config = oauth_config("cid", "secret", Some("app://callback".to_string()));
        assert!(config.validate().is_ok());
        assert_eq!(config.token_url, SOUNDCLOUD_TOKEN_URL);
        assert_eq!(config.authorize_url.as_deref(), Some(SOUNDCLOUD_AUTHORIZE_URL));

        let authority = authority_config(GrantKind::AuthorizationCode);
        assert_eq!(authority.scheme, AuthScheme::OAuth);
        assert_eq!(authority.key_prefix, "soundcloud_user");
    }

    #[test]
    fn test_app_mode_key_prefix() {
        assert_eq!(
            authority_config(GrantKind::ClientCredentials).key_prefix,
            "soundcloud_app"
        );
    }
}
