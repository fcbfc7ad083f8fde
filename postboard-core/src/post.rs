use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// View model of a post as the views render it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub title: String,
    pub content: String,
    pub image_path: Option<String>,
    pub creator: Option<String>,
}

/// Post as the server stores it (`_id` instead of `id`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub image_path: Option<String>,
    #[serde(default)]
    pub creator: Option<String>,
}

impl Post {
    pub fn from_record(record: PostRecord) -> Self {
        Self {
            id: record.id,
            title: record.title,
            content: record.content,
            image_path: record.image_path,
            creator: record.creator,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PostPageResponse {
    #[serde(default)]
    pub message: String,
    pub posts: Vec<PostRecord>,
    pub total: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CreatePostResponse {
    #[serde(default)]
    pub message: String,
    pub post: CreatedPost,
}

/// Server-assigned fields of a freshly created post.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreatedPost {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub image_path: Option<String>,
    #[serde(default)]
    pub creator: Option<String>,
}

/// Structured update body used when the image is referenced by path.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PostUpdateBody<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub content: &'a str,
    pub image_path: &'a str,
    pub creator: Option<&'a str>,
}

/// Binary image data picked by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub data: Bytes,
    pub content_type: Option<String>,
}

impl ImageUpload {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Image argument of an update: fresh binary data or an already stored path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageInput {
    Upload(ImageUpload),
    Existing(String),
}

impl From<ImageUpload> for ImageInput {
    fn from(upload: ImageUpload) -> Self {
        ImageInput::Upload(upload)
    }
}

impl From<&str> for ImageInput {
    fn from(path: &str) -> Self {
        ImageInput::Existing(path.to_owned())
    }
}

impl From<String> for ImageInput {
    fn from(path: String) -> Self {
        ImageInput::Existing(path)
    }
}

/// The service's cached page of posts plus the total it was published with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostSnapshot {
    pub posts: Vec<Post>,
    pub total: u64,
}

pub type SharedSnapshot = Arc<RwLock<PostSnapshot>>;

pub fn shared_snapshot() -> SharedSnapshot {
    Arc::new(RwLock::new(PostSnapshot::default()))
}
