//! HTTP calls for camera, credential and recording listings.
//!
//! Blocking `ureq` requests with a per-call timeout; the front end runs them
//! outside the session event loop.

use std::time::Duration;

use anyhow::{Context, Result};
use asciicam_types::{CameraInfo, Credential, CredentialInfo, Recording};

use crate::credentials::CredentialSource;

#[derive(Clone, Debug)]
pub struct DirectoryClient {
    base: String,
    timeout: Duration,
}

impl DirectoryClient {
    /// `base` is `http(s)://host[:port]`.
    pub fn new(base: impl Into<String>, timeout: Duration) -> Self {
        let base = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Capture devices known to the service.
    pub fn cameras(&self) -> Result<Vec<CameraInfo>> {
        self.get_json("cameras")
    }

    /// Controller API key plus the stream endpoint the service advertises.
    pub fn credential_info(&self) -> Result<CredentialInfo> {
        let info: CredentialInfo = self.get_json("api")?;
        tracing::debug!(endpoint = ?info.endpoint, "credential info received");
        Ok(info)
    }

    pub fn recordings(&self) -> Result<Vec<Recording>> {
        self.get_json("recordings")
    }

    pub fn delete_recording(&self, filename: &str) -> Result<()> {
        let url = format!(
            "{}/recordings/{}",
            self.base,
            urlencoding::encode(filename)
        );
        let resp = ureq::delete(&url)
            .config()
            .timeout_per_call(Some(self.timeout))
            .http_status_as_error(false)
            .build()
            .call()
            .with_context(|| format!("request DELETE /recordings/{filename}"))?;
        if !resp.status().is_success() {
            return Err(anyhow::anyhow!("delete {filename} failed with {}", resp.status()));
        }
        tracing::info!(filename, "recording deleted");
        Ok(())
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}/{path}", self.base);
        let mut resp = ureq::get(&url)
            .config()
            .timeout_per_call(Some(self.timeout))
            .build()
            .call()
            .with_context(|| format!("request /{path}"))?;
        resp.body_mut()
            .read_json()
            .with_context(|| format!("decode /{path} response"))
    }
}

impl CredentialSource for DirectoryClient {
    fn fetch_credential(&self) -> Result<Credential> {
        self.credential_info().map(Credential::from)
    }
}
