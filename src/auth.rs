//! Credential resolution.
//!
//! A direct token always wins. Otherwise a pre-signed GitHub App JWT is
//! exchanged for an installation token; minting the JWT itself is left to
//! the caller's environment.
use crate::error::SyncError;
use crate::github::ApiError;

/// Credential inputs gathered from the command line and environment.
#[derive(Clone, Copy, Default)]
pub struct Credentials<'a> {
    /// Installation or personal access token.
    pub token: Option<&'a str>,
    /// GitHub App id, reported in logs.
    pub app_id: Option<u64>,
    /// Installation to request a token for.
    pub installation_id: Option<u64>,
    /// Pre-signed GitHub App JWT.
    pub app_jwt: Option<&'a str>,
}

impl std::fmt::Debug for Credentials<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &self.token.map(|_| "<redacted>"))
            .field("app_id", &self.app_id)
            .field("installation_id", &self.installation_id)
            .field("app_jwt", &self.app_jwt.map(|_| "<redacted>"))
            .finish()
    }
}

/// Where a resolved token came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    /// Passed in directly.
    Direct,
    /// Exchanged for the given installation.
    Installation {
        /// Installation id used for the exchange.
        installation_id: u64,
    },
}

/// Pick or obtain the token used for every remote call.
///
/// `exchange` turns `(app_jwt, installation_id)` into an installation token.
///
/// # Errors
///
/// Returns [`SyncError::MissingCredentials`] when neither a token nor a
/// complete app configuration is available, or a remote error if the
/// exchange fails.
pub fn resolve_token(
    creds: &Credentials<'_>,
    exchange: impl FnOnce(&str, u64) -> Result<String, ApiError>,
) -> Result<(String, TokenSource), SyncError> {
    if let Some(token) = creds.token.filter(|t| !t.is_empty()) {
        return Ok((token.to_string(), TokenSource::Direct));
    }
    match (creds.app_id, creds.installation_id, creds.app_jwt) {
        (Some(_), Some(installation_id), Some(jwt)) if !jwt.is_empty() => {
            let token = exchange(jwt, installation_id)
                .map_err(|e| SyncError::remote("installation token", e))?;
            Ok((token, TokenSource::Installation { installation_id }))
        }
        (Some(_), Some(_), _) => Err(SyncError::MissingCredentials(
            "--app-id and --installation-id need GITHUB_APP_JWT".to_string(),
        )),
        _ => Err(SyncError::MissingCredentials(
            "pass --token (or GITHUB_TOKEN), or --app-id and --installation-id with GITHUB_APP_JWT"
                .to_string(),
        )),
    }
}
