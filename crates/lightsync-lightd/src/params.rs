//! Sapling proving parameters
//!
//! The wallet needs the spend and output parameter files to build a
//! transaction. They are read from a directory or fetched over HTTP and kept
//! in memory behind `Arc`s so the submitter can hand them to a blocking task.

use crate::{Error, Result};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Spend parameters file name
pub const SPEND_PARAMS_FILE: &str = "sapling-spend.params";
/// Output parameters file name
pub const OUTPUT_PARAMS_FILE: &str = "sapling-output.params";

/// SHA-256 of the published spend parameters
pub const SAPLING_SPEND_SHA256: &str =
    "8e48ffd23abb3a5fd9c5589204f32d9c31285a04b78096ba40a79b75677efc13";
/// SHA-256 of the published output parameters
pub const SAPLING_OUTPUT_SHA256: &str =
    "2f0ebbcbb9bb0bcffe95a397e7eba89c29eb4dde6191c339db88570e3f3fb0e4";

/// Sapling spend and output parameters
#[derive(Clone)]
pub struct SaplingParams {
    spend: Arc<[u8]>,
    output: Arc<[u8]>,
}

impl fmt::Debug for SaplingParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaplingParams")
            .field("spend_len", &self.spend.len())
            .field("output_len", &self.output.len())
            .finish()
    }
}

fn non_empty(file: &str, bytes: Vec<u8>) -> Result<Arc<[u8]>> {
    if bytes.is_empty() {
        return Err(Error::Params(format!("Didn't receive {}", file)));
    }
    Ok(bytes.into())
}

impl SaplingParams {
    /// Wrap parameter bytes. Empty files are rejected.
    pub fn from_bytes(spend: Vec<u8>, output: Vec<u8>) -> Result<Self> {
        Ok(Self {
            spend: non_empty(SPEND_PARAMS_FILE, spend)?,
            output: non_empty(OUTPUT_PARAMS_FILE, output)?,
        })
    }

    /// Read both files from `dir`
    pub async fn load_from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let read = |file: &'static str| {
            let path = dir.join(file);
            async move {
                tokio::fs::read(&path).await.map_err(|e| {
                    Error::Params(format!("Failed to read {}: {}", path.display(), e))
                })
            }
        };
        let (spend, output) = tokio::try_join!(read(SPEND_PARAMS_FILE), read(OUTPUT_PARAMS_FILE))?;
        debug!(
            "Loaded Sapling params from {} ({} + {} bytes)",
            dir.display(),
            spend.len(),
            output.len()
        );
        Self::from_bytes(spend, output)
    }

    /// Download both files from `base_url` (e.g. `https://host/params`)
    pub async fn fetch(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::new();
        let base = base_url.trim_end_matches('/');
        let get = |file: &'static str| {
            let request = client.get(format!("{}/{}", base, file));
            async move {
                let bytes = request.send().await?.error_for_status()?.bytes().await?;
                Ok::<_, Error>(bytes.to_vec())
            }
        };
        let (spend, output) = tokio::try_join!(get(SPEND_PARAMS_FILE), get(OUTPUT_PARAMS_FILE))?;
        info!(
            "Fetched Sapling params from {} ({} + {} bytes)",
            base,
            spend.len(),
            output.len()
        );
        Self::from_bytes(spend, output)
    }

    /// Write both files into `dir`, creating it if needed
    pub async fn save_to_dir(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(dir.join(SPEND_PARAMS_FILE), &self.spend[..]).await?;
        tokio::fs::write(dir.join(OUTPUT_PARAMS_FILE), &self.output[..]).await?;
        Ok(())
    }

    /// Check both files against the published hashes
    pub fn verify(&self) -> Result<()> {
        for (file, bytes, expected) in [
            (SPEND_PARAMS_FILE, &self.spend, SAPLING_SPEND_SHA256),
            (OUTPUT_PARAMS_FILE, &self.output, SAPLING_OUTPUT_SHA256),
        ] {
            let found = hex::encode(Sha256::digest(&bytes[..]));
            if found != expected {
                return Err(Error::Params(format!(
                    "{} hash didn't match. expected {}, found {}",
                    file, expected, found
                )));
            }
        }
        Ok(())
    }

    /// Spend parameters
    pub fn spend(&self) -> &[u8] {
        &self.spend
    }

    /// Output parameters
    pub fn output(&self) -> &[u8] {
        &self.output
    }
}
