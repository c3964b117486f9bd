//! Images held by a form before it is saved.
//!
//! A picked file stays local as [`ImageValue::Pending`] until the owning
//! record is saved. The save operation calls [`ensure_uploaded`] first, so a
//! failed upload is the save's failure.

use serde::{Deserialize, Serialize};

use super::ApiClient;
use crate::error::TransportFailure;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageValue {
    #[default]
    None,
    Url(String),
    /// Local bytes; never sent as is. Serializing this variant fails, so an
    /// [`EditSession`](crate::EditSession) saving a draft that still holds
    /// one caches the server's response (with the stored URL) unmerged.
    #[serde(skip)]
    Pending { bytes: Vec<u8>, content_type: String },
}

impl ImageValue {
    pub fn pending(bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self::Pending {
            bytes,
            content_type: content_type.into(),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Url(url) => Some(url),
            _ => None,
        }
    }
}

/// Resolve `value` to a stored URL, uploading it first if it is still local.
pub async fn ensure_uploaded(
    client: &ApiClient,
    value: &ImageValue,
) -> Result<Option<String>, TransportFailure> {
    match value {
        ImageValue::None => Ok(None),
        ImageValue::Url(url) => Ok(Some(url.clone())),
        ImageValue::Pending {
            bytes,
            content_type,
        } => client
            .upload_image(bytes.clone(), content_type)
            .await
            .map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::session::Session;
    use serde_json::json;

    #[test]
    fn stored_values_serialize_as_plain_url_or_null() {
        assert_eq!(
            serde_json::to_value(ImageValue::Url("https://cdn/x.png".into())).unwrap(),
            json!("https://cdn/x.png")
        );
        assert_eq!(serde_json::to_value(ImageValue::None).unwrap(), json!(null));

        let back: ImageValue = serde_json::from_value(json!("https://cdn/y.png")).unwrap();
        assert_eq!(back.url(), Some("https://cdn/y.png"));
    }

    #[test]
    fn pending_bytes_do_not_serialize() {
        assert!(serde_json::to_value(ImageValue::pending(vec![1], "image/png")).is_err());
    }

    #[tokio::test]
    async fn stored_values_need_no_upload() {
        let client = ApiClient::new(&ClientConfig::default(), Session::default()).unwrap();

        let url = ensure_uploaded(&client, &ImageValue::Url("https://cdn/z.png".into()))
            .await
            .unwrap();
        assert_eq!(url.as_deref(), Some("https://cdn/z.png"));
        assert_eq!(ensure_uploaded(&client, &ImageValue::None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn failed_upload_surfaces_as_transport_failure() {
        std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = ClientConfig {
            base_url: format!("http://{addr}"),
            ..ClientConfig::default()
        };
        let client = ApiClient::new(&config, Session::default()).unwrap();
        let pending = ImageValue::pending(vec![0xff; 8], "image/jpeg");
        assert!(pending.is_pending());

        let failure = ensure_uploaded(&client, &pending).await.unwrap_err();
        assert_eq!(failure.status, None);
    }
}
