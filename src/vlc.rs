//! VLC HTTP Client (§6.5): thin wrapper around VLC's built-in HTTP
//! interface (`/requests/status.json`). Every call carries its own 5s
//! timeout and never panics — a dead or misconfigured VLC instance
//! degrades the Video Queue to an error state, it doesn't crash the
//! gateway.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum VlcError {
    #[error("vlc request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("vlc returned unexpected status: {0}")]
    UnexpectedStatus(u16),
}

#[derive(Debug, Clone)]
pub struct VlcStatus {
    pub playing: bool,
    pub position_secs: f64,
    pub duration_secs: f64,
}

#[derive(Debug, Deserialize)]
struct RawStatus {
    state: String,
    time: f64,
    length: f64,
}

pub struct VlcClient {
    client: Client,
    base_url: String,
    password: String,
}

impl VlcClient {
    pub fn new(host: &str, port: u16, password: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("reqwest client builds with static config"),
            base_url: format!("http://{host}:{port}/requests"),
            password: password.into(),
        }
    }

    fn request(&self, command: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}/status.json", self.base_url))
            .basic_auth("", Some(&self.password))
            .query(&[("command", command)])
    }

    pub async fn play(&self, filename: &str) -> Result<(), VlcError> {
        let response = self
            .client
            .get(format!("{}/status.json", self.base_url))
            .basic_auth("", Some(&self.password))
            .query(&[("command", "in_play"), ("input", filename)])
            .send()
            .await?;
        ensure_success(&response)?;
        Ok(())
    }

    pub async fn pause(&self) -> Result<(), VlcError> {
        let response = self.request("pl_forcepause").send().await?;
        ensure_success(&response)?;
        Ok(())
    }

    pub async fn resume(&self) -> Result<(), VlcError> {
        let response = self.request("pl_play").send().await?;
        ensure_success(&response)?;
        Ok(())
    }

    pub async fn stop(&self) -> Result<(), VlcError> {
        let response = self.request("pl_stop").send().await?;
        ensure_success(&response)?;
        Ok(())
    }

    pub async fn status(&self) -> Result<VlcStatus, VlcError> {
        let response = self
            .client
            .get(format!("{}/status.json", self.base_url))
            .basic_auth("", Some(&self.password))
            .send()
            .await?;
        ensure_success(&response)?;
        let raw: RawStatus = response.json().await?;
        Ok(VlcStatus {
            playing: raw.state == "playing",
            position_secs: raw.time,
            duration_secs: raw.length,
        })
    }

    /// §6.1 `/health`: VLC reachability, folded into the startup self-check.
    pub async fn health(&self) -> bool {
        self.status().await.is_ok()
    }
}

fn ensure_success(response: &reqwest::Response) -> Result<(), VlcError> {
    if response.status().is_success() {
        Ok(())
    } else {
        Err(VlcError::UnexpectedStatus(response.status().as_u16()))
    }
}
