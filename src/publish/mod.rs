//! Publishing frames to a remote social backend.
//!
//! `Publisher` is the capability seam: log in, upload a blob, create a post
//! record embedding that blob. `BlueskyClient` implements it over AT Protocol
//! XRPC; tests substitute their own implementations.

pub mod bluesky;

use chrono::{DateTime, Utc};

use crate::error::PublishError;
use crate::frame::EncodedImage;

pub use bluesky::BlueskyClient;

/// Account credentials used to open a session.
#[derive(Clone)]
pub struct Credentials {
    pub handle: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("handle", &self.handle)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Authenticated session returned by `Publisher::authenticate`.
#[derive(Clone, Debug)]
pub struct Session {
    pub did: String,
    pub handle: String,
    pub access_jwt: String,
}

/// Server-side reference to an uploaded blob. Opaque to the pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct BlobRef(pub serde_json::Value);

/// Image embed attached to a post.
#[derive(Clone, Debug)]
pub struct ImageEmbed {
    pub blob: BlobRef,
    pub alt_text: String,
}

/// Marker returned once a post record exists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishReceipt {
    pub uri: String,
    pub cid: String,
}

/// Everything needed to publish one frame. Built fresh per job.
#[derive(Debug)]
pub struct PostRequest {
    pub text: String,
    pub alt_text: String,
    pub image: EncodedImage,
}

pub trait Publisher {
    fn authenticate(&mut self, handle: &str, password: &str) -> Result<Session, PublishError>;

    fn upload_blob(
        &mut self,
        session: &Session,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<BlobRef, PublishError>;

    fn create_post(
        &mut self,
        session: &Session,
        text: &str,
        created_at: DateTime<Utc>,
        embed: &ImageEmbed,
    ) -> Result<PublishReceipt, PublishError>;
}

/// Log in, upload the image, and create the post record.
pub fn publish_post<P: Publisher + ?Sized>(
    publisher: &mut P,
    credentials: &Credentials,
    post: &PostRequest,
) -> Result<PublishReceipt, PublishError> {
    let session = publisher.authenticate(&credentials.handle, &credentials.password)?;
    log::debug!("authenticated as {} ({})", session.handle, session.did);

    let blob = publisher.upload_blob(&session, &post.image.bytes, post.image.format.mime_type())?;
    log::debug!(
        "uploaded {} byte {} blob",
        post.image.size(),
        post.image.format
    );

    let embed = ImageEmbed {
        blob,
        alt_text: post.alt_text.clone(),
    };
    publisher.create_post(&session, &post.text, Utc::now(), &embed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ImageFormat;

    #[derive(Default)]
    struct RecordingPublisher {
        calls: Vec<&'static str>,
        fail_auth: bool,
        uploaded_mime: Option<String>,
        posted: Option<(String, String)>,
    }

    impl Publisher for RecordingPublisher {
        fn authenticate(&mut self, handle: &str, _password: &str) -> Result<Session, PublishError> {
            self.calls.push("authenticate");
            if self.fail_auth {
                return Err(PublishError::AuthFailure {
                    handle: handle.to_string(),
                    cause: "invalid password".into(),
                });
            }
            Ok(Session {
                did: "did:plc:test".to_string(),
                handle: handle.to_string(),
                access_jwt: "jwt".to_string(),
            })
        }

        fn upload_blob(
            &mut self,
            _session: &Session,
            _bytes: &[u8],
            mime_type: &str,
        ) -> Result<BlobRef, PublishError> {
            self.calls.push("upload_blob");
            self.uploaded_mime = Some(mime_type.to_string());
            Ok(BlobRef(serde_json::json!({ "ref": "blob" })))
        }

        fn create_post(
            &mut self,
            _session: &Session,
            text: &str,
            _created_at: DateTime<Utc>,
            embed: &ImageEmbed,
        ) -> Result<PublishReceipt, PublishError> {
            self.calls.push("create_post");
            self.posted = Some((text.to_string(), embed.alt_text.clone()));
            Ok(PublishReceipt {
                uri: "at://did:plc:test/app.bsky.feed.post/1".to_string(),
                cid: "cid".to_string(),
            })
        }
    }

    fn post() -> PostRequest {
        PostRequest {
            text: "Hello [0:00:05]".to_string(),
            alt_text: "Frame from a.mp4 at 5.00s".to_string(),
            image: EncodedImage {
                bytes: vec![1, 2, 3],
                format: ImageFormat::Jpeg,
                width: 1,
                height: 1,
            },
        }
    }

    fn credentials() -> Credentials {
        Credentials {
            handle: "user.bsky.social".to_string(),
            password: "pass".to_string(),
        }
    }

    #[test]
    fn publishes_in_order() -> Result<(), PublishError> {
        let mut publisher = RecordingPublisher::default();
        let receipt = publish_post(&mut publisher, &credentials(), &post())?;

        assert_eq!(publisher.calls, vec!["authenticate", "upload_blob", "create_post"]);
        assert_eq!(publisher.uploaded_mime.as_deref(), Some("image/jpeg"));
        assert_eq!(
            publisher.posted,
            Some((
                "Hello [0:00:05]".to_string(),
                "Frame from a.mp4 at 5.00s".to_string()
            ))
        );
        assert!(receipt.uri.starts_with("at://"));
        Ok(())
    }

    #[test]
    fn auth_failure_stops_before_upload() {
        let mut publisher = RecordingPublisher {
            fail_auth: true,
            ..RecordingPublisher::default()
        };
        let err = publish_post(&mut publisher, &credentials(), &post()).unwrap_err();
        assert!(matches!(err, PublishError::AuthFailure { .. }));
        assert_eq!(publisher.calls, vec!["authenticate"]);
    }

    #[test]
    fn credentials_debug_hides_password() {
        let rendered = format!("{:?}", credentials());
        assert!(rendered.contains("user.bsky.social"));
        assert!(!rendered.contains("pass\""));
    }
}
