// src/publish/mod.rs

use anyhow::{anyhow, Context, Result};
use reqwest::blocking::{multipart, Client};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, info, instrument};

/// Content-addressed publishing: hand over content, get back its identifier.
pub trait Publisher {
    /// Publish a JSON document under a human-readable `name`.
    fn publish_json(&self, name: &str, value: &Value) -> Result<String>;

    /// Publish the bytes of the file at `path`.
    fn publish_file(&self, path: &Path) -> Result<String>;
}

impl<P: Publisher + ?Sized> Publisher for Box<P> {
    fn publish_json(&self, name: &str, value: &Value) -> Result<String> {
        (**self).publish_json(name, value)
    }

    fn publish_file(&self, path: &Path) -> Result<String> {
        (**self).publish_file(path)
    }
}

/// Build the public locator for `cid` under `gateway`.
pub fn gateway_url(gateway: &str, cid: &str) -> String {
    format!("{}/{}", gateway.trim_end_matches('/'), cid)
}

#[derive(Debug, Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
}

/// Pins content through a Pinata-compatible HTTP API.
pub struct PinataPublisher {
    client: Client,
    api_url: String,
    jwt: String,
}

impl PinataPublisher {
    pub fn new(api_url: impl Into<String>, jwt: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            jwt: jwt.into(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/pinning/{}", self.api_url, path)
    }

    fn read_cid(resp: reqwest::blocking::Response, what: &str) -> Result<String> {
        let resp = resp
            .error_for_status()
            .with_context(|| format!("pinning {}", what))?;
        let body: PinResponse = resp
            .json()
            .with_context(|| format!("decoding pin response for {}", what))?;
        if body.ipfs_hash.is_empty() {
            return Err(anyhow!("pin response for {} carried an empty hash", what));
        }
        Ok(body.ipfs_hash)
    }
}

impl Publisher for PinataPublisher {
    #[instrument(level = "info", skip(self, value))]
    fn publish_json(&self, name: &str, value: &Value) -> Result<String> {
        let body = json!({
            "pinataContent": value,
            "pinataMetadata": { "name": name },
        });
        let url = self.endpoint("pinJSONToIPFS");
        debug!(%url, "pinning json");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.jwt)
            .json(&body)
            .send()
            .with_context(|| format!("POST {}", url))?;
        let cid = Self::read_cid(resp, name)?;
        info!(%cid, "pinned json");
        Ok(cid)
    }

    #[instrument(level = "info", skip(self, path), fields(path = %path.display()))]
    fn publish_file(&self, path: &Path) -> Result<String> {
        let form = multipart::Form::new()
            .file("file", path)
            .with_context(|| format!("reading {:?} for upload", path))?;
        let url = self.endpoint("pinFileToIPFS");
        debug!(%url, "pinning file");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.jwt)
            .multipart(form)
            .send()
            .with_context(|| format!("POST {}", url))?;
        let cid = Self::read_cid(resp, &path.display().to_string())?;
        info!(%cid, "pinned file");
        Ok(cid)
    }
}

/// Stores content under `<dir>/<sha256 hex>`; the digest is the identifier.
/// Offline stand-in for a pinning service.
pub struct LocalPublisher {
    dir: PathBuf,
}

impl LocalPublisher {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).with_context(|| format!("creating publish dir {:?}", dir))?;
        Ok(Self { dir })
    }

    fn store(&self, bytes: &[u8]) -> Result<String> {
        let cid: String = Sha256::digest(bytes)
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();
        let path = self.dir.join(&cid);
        if !path.exists() {
            fs::write(&path, bytes).with_context(|| format!("writing {:?}", path))?;
        }
        debug!(%cid, path = %path.display(), "stored content");
        Ok(cid)
    }
}

impl Publisher for LocalPublisher {
    fn publish_json(&self, name: &str, value: &Value) -> Result<String> {
        let bytes = serde_json::to_vec_pretty(value).context("serializing json for publish")?;
        let cid = self.store(&bytes)?;
        info!(name, %cid, "published json locally");
        Ok(cid)
    }

    fn publish_file(&self, path: &Path) -> Result<String> {
        let bytes = fs::read(path).with_context(|| format!("reading {:?}", path))?;
        let cid = self.store(&bytes)?;
        info!(path = %path.display(), %cid, "published file locally");
        Ok(cid)
    }
}
