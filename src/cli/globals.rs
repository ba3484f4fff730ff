use secrecy::SecretString;

/// Process-wide configuration shared with the handlers.
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub base_url: String,
    pub from_email: String,
    pub token_secret: SecretString,
    pub session_ttl_seconds: i64,
    pub reset_ttl_seconds: i64,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            from_email: String::new(),
            token_secret: SecretString::from(String::new()),
            session_ttl_seconds: 3600,
            reset_ttl_seconds: 1800,
        }
    }

    pub fn set_token_secret(&mut self, secret: SecretString) {
        self.token_secret = secret;
    }
}
