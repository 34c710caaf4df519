//! Bluesky (AT Protocol) publisher.
//!
//! Talks to a PDS over XRPC:
//! - `com.atproto.server.createSession` to log in
//! - `com.atproto.repo.uploadBlob` for the image bytes
//! - `com.atproto.repo.createRecord` for the `app.bsky.feed.post` record

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use url::Url;

use super::{BlobRef, ImageEmbed, PublishReceipt, Publisher, Session};
use crate::error::PublishError;

pub const DEFAULT_PDS_URL: &str = "https://bsky.social";

const POST_COLLECTION: &str = "app.bsky.feed.post";
const IMAGES_EMBED_TYPE: &str = "app.bsky.embed.images";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionResponse {
    did: String,
    handle: String,
    access_jwt: String,
}

#[derive(Debug, Deserialize)]
struct UploadBlobResponse {
    blob: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CreateRecordResponse {
    uri: String,
    cid: String,
}

/// Blocking XRPC client for a single PDS.
pub struct BlueskyClient {
    agent: ureq::Agent,
    base: Url,
}

impl BlueskyClient {
    pub fn new(pds_url: &str) -> Result<Self> {
        let mut base = Url::parse(pds_url).with_context(|| format!("parse PDS url '{}'", pds_url))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(anyhow!(
                "unsupported PDS scheme '{}'; expected http(s)",
                base.scheme()
            ));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .build();
        Ok(Self { agent, base })
    }

    fn endpoint(&self, nsid: &str) -> Result<Url> {
        self.base
            .join(&format!("xrpc/{}", nsid))
            .with_context(|| format!("build xrpc url for {}", nsid))
    }

    fn create_session(&self, handle: &str, password: &str) -> Result<CreateSessionResponse> {
        let url = self.endpoint("com.atproto.server.createSession")?;
        let body = json!({ "identifier": handle, "password": password });
        let response = self
            .agent
            .post(url.as_str())
            .set("Content-Type", "application/json")
            .send_string(&body.to_string())
            .map_err(describe_error)?;
        read_json(response)
    }

    fn upload(&self, session: &Session, bytes: &[u8], mime_type: &str) -> Result<UploadBlobResponse> {
        let url = self.endpoint("com.atproto.repo.uploadBlob")?;
        let response = self
            .agent
            .post(url.as_str())
            .set("Authorization", &format!("Bearer {}", session.access_jwt))
            .set("Content-Type", mime_type)
            .send_bytes(bytes)
            .map_err(describe_error)?;
        read_json(response)
    }

    fn create_record(
        &self,
        session: &Session,
        text: &str,
        created_at: DateTime<Utc>,
        embed: &ImageEmbed,
    ) -> Result<CreateRecordResponse> {
        let url = self.endpoint("com.atproto.repo.createRecord")?;
        let body = post_record_body(&session.did, text, created_at, embed);
        let response = self
            .agent
            .post(url.as_str())
            .set("Authorization", &format!("Bearer {}", session.access_jwt))
            .set("Content-Type", "application/json")
            .send_string(&body.to_string())
            .map_err(describe_error)?;
        read_json(response)
    }
}

impl Publisher for BlueskyClient {
    fn authenticate(&mut self, handle: &str, password: &str) -> Result<Session, PublishError> {
        let created = self
            .create_session(handle, password)
            .map_err(|e| PublishError::AuthFailure {
                handle: handle.to_string(),
                cause: e.into(),
            })?;
        log::info!("logged in to {} as {}", self.base, created.handle);
        Ok(Session {
            did: created.did,
            handle: created.handle,
            access_jwt: created.access_jwt,
        })
    }

    fn upload_blob(
        &mut self,
        session: &Session,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<BlobRef, PublishError> {
        let uploaded = self
            .upload(session, bytes, mime_type)
            .map_err(|e| PublishError::UploadFailure(e.into()))?;
        Ok(BlobRef(uploaded.blob))
    }

    fn create_post(
        &mut self,
        session: &Session,
        text: &str,
        created_at: DateTime<Utc>,
        embed: &ImageEmbed,
    ) -> Result<PublishReceipt, PublishError> {
        let record = self
            .create_record(session, text, created_at, embed)
            .map_err(|e| PublishError::RecordFailure(e.into()))?;
        Ok(PublishReceipt {
            uri: record.uri,
            cid: record.cid,
        })
    }
}

fn post_record_body(
    did: &str,
    text: &str,
    created_at: DateTime<Utc>,
    embed: &ImageEmbed,
) -> serde_json::Value {
    json!({
        "repo": did,
        "collection": POST_COLLECTION,
        "record": {
            "$type": POST_COLLECTION,
            "text": text,
            "createdAt": created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            "embed": {
                "$type": IMAGES_EMBED_TYPE,
                "images": [
                    { "alt": embed.alt_text, "image": embed.blob.0 }
                ]
            }
        }
    })
}

fn read_json<T: serde::de::DeserializeOwned>(response: ureq::Response) -> Result<T> {
    let body = response.into_string().context("read xrpc response body")?;
    serde_json::from_str(&body).map_err(|e| anyhow!("invalid xrpc response: {}", e))
}

fn describe_error(err: ureq::Error) -> anyhow::Error {
    match err {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            anyhow!("xrpc request failed with status {}: {}", code, body.trim())
        }
        ureq::Error::Transport(transport) => anyhow!("xrpc transport error: {}", transport),
    }
}
