use secrecy::SecretString;

/// Secrets shared by every component; never printed.
#[derive(Clone)]
pub struct GlobalArgs {
    pub access_token_secret: SecretString,
    pub refresh_token_secret: SecretString,
    pub cookie_secret: SecretString,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(
        access_token_secret: SecretString,
        refresh_token_secret: SecretString,
        cookie_secret: SecretString,
    ) -> Self {
        Self {
            access_token_secret,
            refresh_token_secret,
            cookie_secret,
        }
    }
}

impl std::fmt::Debug for GlobalArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalArgs")
            .field("access_token_secret", &"***")
            .field("refresh_token_secret", &"***")
            .field("cookie_secret", &"***")
            .finish()
    }
}
