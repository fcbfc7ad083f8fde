use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::ApiConfig;
use crate::error::{check_status, ApiError};
use crate::post::{
    shared_snapshot, CreatePostResponse, ImageInput, ImageUpload, Post, PostPageResponse,
    PostRecord, PostSnapshot, PostUpdateBody, SharedSnapshot,
};
use crate::routes::{Navigator, Route};
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    FetchPage,
    Create,
    Update,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostsUpdate {
    pub posts: Vec<Post>,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureNotice {
    pub operation: Operation,
    pub message: String,
}

/// What subscribers of the post list receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostsEvent {
    Updated(PostsUpdate),
    Failed(FailureNotice),
}

/// Owns the cached post list and publishes every change to it.
///
/// Clones share the same cache, notification channel and fetch counter, so
/// one instance can be handed to many tasks. Page fetches are sequenced: only
/// the most recently issued one may land in the cache.
#[derive(Clone)]
pub struct PostService {
    client: Client,
    posts_url: Url,
    snapshot: SharedSnapshot,
    updates: broadcast::Sender<PostsEvent>,
    fetch_seq: Arc<AtomicU64>,
    session: Session,
    navigator: Arc<dyn Navigator>,
}

impl PostService {
    pub fn new(
        config: &ApiConfig,
        client: Client,
        session: Session,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, ApiError> {
        let (updates, _) = broadcast::channel(config.notification_capacity.max(1));
        Ok(Self {
            client,
            posts_url: config.posts_url()?,
            snapshot: shared_snapshot(),
            updates,
            fetch_seq: Arc::new(AtomicU64::new(0)),
            session,
            navigator,
        })
    }

    /// Subscribes to future notifications; nothing already published is replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<PostsEvent> {
        self.updates.subscribe()
    }

    pub async fn snapshot(&self) -> PostSnapshot {
        self.snapshot.read().await.clone()
    }

    /// Drops the cached list and invalidates fetches still in flight.
    pub async fn clear(&self) {
        let mut snapshot = self.snapshot.write().await;
        self.fetch_seq.fetch_add(1, Ordering::SeqCst);
        *snapshot = PostSnapshot::default();
        debug!("post snapshot cleared");
    }

    /// Loads one page into the cache. The outcome is only observable through
    /// [`subscribe`](Self::subscribe).
    pub async fn fetch_page(&self, page: u32, size: u32) {
        let seq = self.fetch_seq.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(page, size, seq, "fetching posts page");
        let result = self.request_page(page, size).await;

        let mut snapshot = self.snapshot.write().await;
        if self.fetch_seq.load(Ordering::SeqCst) != seq {
            debug!(page, size, seq, "discarding stale page response");
            return;
        }
        match result {
            Ok(body) => {
                snapshot.posts = body.posts.into_iter().map(Post::from_record).collect();
                snapshot.total = body.total;
                debug!(page, size, count = snapshot.posts.len(), total = snapshot.total, message = %body.message, "posts page loaded");
                self.publish(PostsEvent::Updated(PostsUpdate {
                    posts: snapshot.posts.clone(),
                    total: snapshot.total,
                }));
            }
            Err(err) => {
                warn!(page, size, error = %err, "failed to fetch posts page");
                self.publish_failure(Operation::FetchPage, &err);
            }
        }
    }

    /// Raw server record for one post; the cache is not involved.
    pub async fn fetch_one(&self, id: &str) -> Result<PostRecord, ApiError> {
        let response = self
            .authorized(self.client.get(self.post_url(id)?))
            .send()
            .await?;
        let record = check_status(response).await?.json::<PostRecord>().await?;
        Ok(record)
    }

    /// Uploads a new post, appends it to the cache and returns to the list.
    ///
    /// The published total is the cache length, not the server-wide count.
    pub async fn create_post(
        &self,
        title: &str,
        content: &str,
        image: ImageUpload,
    ) -> Result<Post, ApiError> {
        let created = match self.request_create(title, content, image).await {
            Ok(created) => created,
            Err(err) => {
                warn!(error = %err, "failed to create post");
                self.publish_failure(Operation::Create, &err);
                return Err(err);
            }
        };

        let post = Post {
            id: created.post.id,
            title: title.to_owned(),
            content: content.to_owned(),
            image_path: created.post.image_path,
            creator: created.post.creator,
        };
        {
            let mut snapshot = self.snapshot.write().await;
            snapshot.posts.push(post.clone());
            snapshot.total = snapshot.posts.len() as u64;
            info!(post_id = %post.id, message = %created.message, "post created");
            self.publish(PostsEvent::Updated(PostsUpdate {
                posts: snapshot.posts.clone(),
                total: snapshot.total,
            }));
        }
        self.navigator.navigate(Route::PostList);
        Ok(post)
    }

    /// Replaces a post on the server and swaps the cached entry in place.
    ///
    /// The cached replacement carries an empty image path and no creator
    /// until the next page fetch.
    pub async fn update_post(
        &self,
        id: &str,
        title: &str,
        content: &str,
        image: impl Into<ImageInput>,
    ) -> Result<(), ApiError> {
        if let Err(err) = self.request_update(id, title, content, image.into()).await {
            warn!(post_id = %id, error = %err, "failed to update post");
            self.publish_failure(Operation::Update, &err);
            return Err(err);
        }

        {
            let mut snapshot = self.snapshot.write().await;
            match snapshot.posts.iter().position(|p| p.id == id) {
                Some(index) => {
                    snapshot.posts[index] = Post {
                        id: id.to_owned(),
                        title: title.to_owned(),
                        content: content.to_owned(),
                        image_path: Some(String::new()),
                        creator: None,
                    };
                }
                None => debug!(post_id = %id, "updated post is not in the cached page"),
            }
            snapshot.total = snapshot.posts.len() as u64;
            info!(post_id = %id, "post updated");
            self.publish(PostsEvent::Updated(PostsUpdate {
                posts: snapshot.posts.clone(),
                total: snapshot.total,
            }));
        }
        self.navigator.navigate(Route::PostList);
        Ok(())
    }

    /// Deletes a post on the server. The cache is left alone; callers refresh.
    pub async fn delete_post(&self, id: &str) -> Result<(), ApiError> {
        let response = self
            .authorized(self.client.delete(self.post_url(id)?))
            .send()
            .await?;
        check_status(response).await?;
        info!(post_id = %id, "post deleted");
        Ok(())
    }

    async fn request_page(&self, page: u32, size: u32) -> Result<PostPageResponse, ApiError> {
        let request = self
            .client
            .get(self.posts_url.clone())
            .query(&[("page", page), ("size", size)]);
        let response = self.authorized(request).send().await?;
        let body = check_status(response).await?.json::<PostPageResponse>().await?;
        Ok(body)
    }

    async fn request_create(
        &self,
        title: &str,
        content: &str,
        image: ImageUpload,
    ) -> Result<CreatePostResponse, ApiError> {
        let form = Form::new()
            .text("title", title.to_owned())
            .text("content", content.to_owned())
            .part("image", image_part(image, title)?);
        let response = self
            .authorized(self.client.post(self.posts_url.clone()).multipart(form))
            .send()
            .await?;
        let body = check_status(response).await?.json::<CreatePostResponse>().await?;
        Ok(body)
    }

    async fn request_update(
        &self,
        id: &str,
        title: &str,
        content: &str,
        image: ImageInput,
    ) -> Result<(), ApiError> {
        let request = self.client.put(self.post_url(id)?);
        let request = match image {
            ImageInput::Upload(upload) => {
                let form = Form::new()
                    .text("id", id.to_owned())
                    .text("title", title.to_owned())
                    .text("content", content.to_owned())
                    .part("image", image_part(upload, title)?);
                request.multipart(form)
            }
            ImageInput::Existing(path) => request.json(&PostUpdateBody {
                id,
                title,
                content,
                image_path: &path,
                creator: None,
            }),
        };
        let response = self.authorized(request).send().await?;
        check_status(response).await?;
        Ok(())
    }

    fn post_url(&self, id: &str) -> Result<Url, ApiError> {
        let mut url = self.posts_url.clone();
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .push(id);
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.session.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn publish(&self, event: PostsEvent) {
        if self.updates.send(event).is_err() {
            debug!("no subscribers for post updates");
        }
    }

    fn publish_failure(&self, operation: Operation, err: &ApiError) {
        self.publish(PostsEvent::Failed(FailureNotice {
            operation,
            message: err.to_string(),
        }));
    }
}

/// Multipart image field; the file name is the post title.
fn image_part(image: ImageUpload, title: &str) -> Result<Part, ApiError> {
    let length = image.data.len() as u64;
    let part = Part::stream_with_length(image.data, length).file_name(title.to_owned());
    let part = match image.content_type {
        Some(mime) => part.mime_str(&mime)?,
        None => part,
    };
    Ok(part)
}
