//! Controller credential lookup and caching.

use anyhow::Result;
use asciicam_types::Credential;

/// Anything that can produce the controller credential.
pub trait CredentialSource {
    fn fetch_credential(&self) -> Result<Credential>;
}

/// Remembers the first successfully fetched credential.
///
/// A failed fetch yields an empty credential and is retried on the next call.
#[derive(Debug, Default)]
pub struct CredentialCache {
    cached: Option<Credential>,
}

impl CredentialCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cached(&self) -> Option<&Credential> {
        self.cached.as_ref()
    }

    pub fn get_or_fetch(&mut self, source: &dyn CredentialSource) -> Credential {
        if let Some(credential) = &self.cached {
            return credential.clone();
        }
        match source.fetch_credential() {
            Ok(credential) => {
                tracing::info!("controller credential fetched");
                self.cached = Some(credential.clone());
                credential
            }
            Err(e) => {
                tracing::warn!("credential fetch failed, continuing with empty key: {e:#}");
                Credential::default()
            }
        }
    }
}
