use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};

use crate::utils::error::FetchError;

/// Static credential pair injected on every request
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Credentials {
    pub api_key: String,
    pub application_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("application_key", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, application_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            application_key: application_key.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.api_key.is_empty() && self.application_key.is_empty()
    }

    /// Authorization header value in the remote API's format
    pub fn authorization(&self) -> String {
        format!(
            "chave_api {} aplicacao {}",
            self.api_key, self.application_key
        )
    }
}

/// Build the default headers shared by listing and detail requests
///
/// The authorization value is marked sensitive so it never shows up in
/// debug output of the client.
///
/// # Examples
///
/// ```
/// use gather::crawler::headers::{build_api_headers, Credentials};
///
/// let headers = build_api_headers("gather/0.1", &Credentials::new("key", "app")).unwrap();
/// assert!(headers.contains_key("authorization"));
/// ```
pub fn build_api_headers(
    user_agent: &str,
    credentials: &Credentials,
) -> Result<HeaderMap, FetchError> {
    let mut headers = HeaderMap::new();

    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(user_agent)
            .map_err(|e| FetchError::InvalidHeader(format!("user agent: {e}")))?,
    );
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    if !credentials.is_empty() {
        let mut auth = HeaderValue::from_str(&credentials.authorization())
            .map_err(|e| FetchError::InvalidHeader(format!("authorization: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
    }

    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_format() {
        let creds = Credentials::new("abc", "def");
        assert_eq!(creds.authorization(), "chave_api abc aplicacao def");
    }

    #[test]
    fn test_headers_include_auth() {
        let headers = build_api_headers("gather/test", &Credentials::new("k", "a")).unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "chave_api k aplicacao a");
        assert!(headers.get(AUTHORIZATION).unwrap().is_sensitive());
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(headers.get(USER_AGENT).unwrap(), "gather/test");
    }

    #[test]
    fn test_headers_without_credentials() {
        let headers = build_api_headers("gather/test", &Credentials::default()).unwrap();
        assert!(headers.get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_credentials_debug_redacted() {
        let creds = Credentials::new("secret", "also-secret");
        let debug = format!("{creds:?}");
        assert!(!debug.contains("secret"));
    }
}
