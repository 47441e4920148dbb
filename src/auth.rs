//! OAuth2 authentication shared by the Gmail and Sheets hubs

use google_gmail1::{hyper_rustls, hyper_util, yup_oauth2, Gmail};
use google_sheets4::Sheets;
use hyper_util::client::legacy::connect::HttpConnector;
use std::path::{Path, PathBuf};

use crate::error::{Result, SyncError};

/// Read/write mailbox access, needed to clear the UNREAD label (no deletion)
pub const GMAIL_SCOPE: &str = "https://www.googleapis.com/auth/gmail.modify";

/// Read/write access to spreadsheets
pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

/// Every scope the sync needs; requested together so one consent covers both APIs
pub const REQUIRED_SCOPES: &[&str] = &[GMAIL_SCOPE, SHEETS_SCOPE];

pub type HttpsConnector = hyper_rustls::HttpsConnector<HttpConnector>;
pub type Authenticator = yup_oauth2::authenticator::Authenticator<HttpsConnector>;
pub type GmailHub = Gmail<HttpsConnector>;
pub type SheetsHub = Sheets<HttpsConnector>;

/// Installed-flow authenticator with an on-disk token cache
#[derive(Clone)]
pub struct GoogleAuth {
    authenticator: Authenticator,
    token_cache_path: PathBuf,
}

impl GoogleAuth {
    /// Build the authenticator from a client secret file
    ///
    /// No network traffic happens here; the browser flow starts on the first
    /// [`GoogleAuth::token`] call when the cache holds no usable token.
    pub async fn new(credentials_path: &Path, token_cache_path: &Path) -> Result<Self> {
        if !credentials_path.exists() {
            return Err(SyncError::ConfigError(format!(
                "Credentials file not found at {:?}. Download an OAuth client secret (Desktop app) from the Google Cloud console",
                credentials_path
            )));
        }

        let secret = yup_oauth2::read_application_secret(credentials_path)
            .await
            .map_err(|e| SyncError::AuthError(format!("Failed to read credentials: {}", e)))?;

        if let Some(parent) = token_cache_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        // HTTPRedirect opens a browser for user authorization
        let authenticator = yup_oauth2::InstalledFlowAuthenticator::builder(
            secret,
            yup_oauth2::InstalledFlowReturnMethod::HTTPRedirect,
        )
        .persist_tokens_to_disk(token_cache_path)
        .build()
        .await
        .map_err(|e| SyncError::AuthError(format!("Failed to build authenticator: {}", e)))?;

        Ok(Self {
            authenticator,
            token_cache_path: token_cache_path.to_path_buf(),
        })
    }

    /// Obtain (or refresh) a token for `scopes` and lock down the cache file
    pub async fn token(&self, scopes: &[&str]) -> Result<()> {
        self.authenticator
            .token(scopes)
            .await
            .map_err(|e| SyncError::AuthError(format!("Failed to obtain token: {}", e)))?;

        if self.token_cache_path.exists() {
            secure_token_file(&self.token_cache_path).await?;
        }
        Ok(())
    }

    /// Pre-authorize every required scope so the cached token covers both hubs
    pub async fn authorize_all(&self) -> Result<()> {
        self.token(REQUIRED_SCOPES).await
    }

    pub fn gmail_hub(&self) -> Result<GmailHub> {
        let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
            .build(https_connector()?);
        Ok(Gmail::new(client, self.authenticator.clone()))
    }

    pub fn sheets_hub(&self) -> Result<SheetsHub> {
        let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
            .build(https_connector()?);
        Ok(Sheets::new(client, self.authenticator.clone()))
    }
}

/// TLS connector over native roots
///
/// HTTP/1 only; the generated hubs behave more predictably without HTTP/2.
fn https_connector() -> Result<HttpsConnector> {
    Ok(hyper_rustls::HttpsConnectorBuilder::new()
        .with_native_roots()
        .map_err(|e| SyncError::AuthError(format!("Failed to load TLS roots: {}", e)))?
        .https_or_http()
        .enable_http1()
        .build())
}

/// Secure token file permissions on Unix systems
///
/// Sets file permissions to 0600 (read/write for owner only)
#[cfg(unix)]
pub async fn secure_token_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o600);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

/// Windows relies on the profile directory ACLs
#[cfg(windows)]
pub async fn secure_token_file(_path: &Path) -> Result<()> {
    Ok(())
}
