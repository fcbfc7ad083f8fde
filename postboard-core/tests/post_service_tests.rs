use std::sync::Arc;
use std::time::Duration;

use postboard_core::{
    ApiConfig, AuthData, ImageUpload, Operation, PostService, PostsEvent, Route, Session,
};
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::mpsc;
use wiremock::matchers::{body_partial_json, header, header_regex, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn service_for(server: &MockServer, session: Session) -> (PostService, mpsc::UnboundedReceiver<Route>) {
    let config = ApiConfig {
        api_url: format!("{}/api/", server.uri()),
        ..ApiConfig::default()
    };
    let (nav_tx, nav_rx) = mpsc::unbounded_channel();
    let service = PostService::new(&config, Client::new(), session, Arc::new(nav_tx))
        .expect("valid service config");
    (service, nav_rx)
}

fn records(prefix: &str, count: usize) -> Vec<Value> {
    (0..count)
        .map(|i| {
            json!({
                "_id": format!("{prefix}{i}"),
                "title": format!("Title {i}"),
                "content": format!("Content {i}"),
                "imagePath": format!("http://localhost/images/{prefix}{i}.png"),
                "creator": "user-1"
            })
        })
        .collect()
}

async fn mount_page(server: &MockServer, page: &str, size: &str, posts: Vec<Value>, total: u64) {
    Mock::given(method("GET"))
        .and(path("/api/posts/"))
        .and(query_param("page", page))
        .and(query_param("size", size))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": "Posts fetched successfully!",
            "posts": posts,
            "total": total
        })))
        .mount(server)
        .await;
}

async fn last_body(server: &MockServer, verb: &str) -> String {
    let requests = server
        .received_requests()
        .await
        .expect("request recording is enabled");
    let request = requests
        .iter()
        .rev()
        .find(|r| r.method.as_str() == verb)
        .expect("request was sent");
    String::from_utf8_lossy(&request.body).into_owned()
}

fn expect_update(event: PostsEvent) -> postboard_core::PostsUpdate {
    match event {
        PostsEvent::Updated(update) => update,
        PostsEvent::Failed(notice) => panic!("unexpected failure notice: {notice:?}"),
    }
}

#[tokio::test]
async fn fetch_page_replaces_snapshot_and_notifies_with_server_total() {
    let server = MockServer::start().await;
    let sent = records("p", 10);
    mount_page(&server, "1", "10", sent.clone(), 25).await;

    let (service, _nav) = service_for(&server, Session::default());
    let mut rx = service.subscribe();

    service.fetch_page(1, 10).await;

    let update = expect_update(rx.try_recv().expect("notification after fetch"));
    assert_eq!(update.posts.len(), 10);
    assert_eq!(update.total, 25);
    for (post, record) in update.posts.iter().zip(&sent) {
        assert_eq!(post.id, record["_id"].as_str().unwrap());
        assert_eq!(post.creator.as_deref(), Some("user-1"));
    }

    let snapshot = service.snapshot().await;
    assert_eq!(snapshot.posts, update.posts);
    assert_eq!(snapshot.total, 25);
}

#[tokio::test]
async fn late_subscriber_gets_no_replay() {
    let server = MockServer::start().await;
    mount_page(&server, "1", "2", records("p", 2), 2).await;

    let (service, _nav) = service_for(&server, Session::default());
    let mut early = service.subscribe();
    service.fetch_page(1, 2).await;
    let mut late = service.subscribe();

    assert!(matches!(early.try_recv(), Ok(PostsEvent::Updated(_))));
    assert!(matches!(late.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn failed_fetch_publishes_failure_and_keeps_snapshot() {
    let server = MockServer::start().await;
    mount_page(&server, "1", "2", records("p", 2), 2).await;
    Mock::given(method("GET"))
        .and(path("/api/posts/"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "message": "Fetching posts failed!" })))
        .mount(&server)
        .await;

    let (service, _nav) = service_for(&server, Session::default());
    service.fetch_page(1, 2).await;
    let mut rx = service.subscribe();

    service.fetch_page(2, 2).await;

    match rx.try_recv().expect("failure notice") {
        PostsEvent::Failed(notice) => {
            assert_eq!(notice.operation, Operation::FetchPage);
            assert!(notice.message.contains("Fetching posts failed!"), "{}", notice.message);
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(service.snapshot().await.posts.len(), 2);
}

#[tokio::test]
async fn stale_page_response_is_discarded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/posts/"))
        .and(query_param("page", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "message": "ok", "posts": records("old", 2), "total": 4 }))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;
    mount_page(&server, "2", "2", records("new", 2), 4).await;

    let (service, _nav) = service_for(&server, Session::default());
    let mut rx = service.subscribe();

    let second = service.clone();
    tokio::join!(service.fetch_page(1, 2), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        second.fetch_page(2, 2).await;
    });

    let update = expect_update(rx.try_recv().expect("newest page published"));
    assert_eq!(update.posts[0].id, "new0");
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(service.snapshot().await.posts[0].id, "new0");
}

#[tokio::test]
async fn create_appends_to_snapshot_and_navigates_home() {
    let server = MockServer::start().await;
    mount_page(&server, "1", "2", records("p", 2), 7).await;
    Mock::given(method("POST"))
        .and(path("/api/posts/"))
        .and(header_regex("content-type", "^multipart/form-data"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "message": "Post added successfully",
            "post": { "id": "abc123", "imagePath": "http://localhost/images/t.png", "creator": "user-1" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (service, mut nav) = service_for(&server, Session::default());
    service.fetch_page(1, 2).await;
    let mut rx = service.subscribe();

    let image = ImageUpload::new(vec![0x89, 0x50, 0x4e, 0x47]).with_content_type("image/png");
    let post = service.create_post("T", "C", image).await.expect("create succeeds");

    assert_eq!(post.id, "abc123");
    let update = expect_update(rx.try_recv().expect("notification after create"));
    assert_eq!(update.posts.len(), 3);
    assert_eq!(update.total, 3);
    let last = update.posts.last().unwrap();
    assert_eq!(last.id, "abc123");
    assert_eq!(last.title, "T");
    assert_eq!(last.image_path.as_deref(), Some("http://localhost/images/t.png"));
    assert_eq!(nav.try_recv().ok(), Some(Route::PostList));

    let body = last_body(&server, "POST").await;
    assert!(body.contains(r#"name="title""#), "{body}");
    assert!(body.contains(r#"name="content""#), "{body}");
    assert!(body.contains(r#"name="image"; filename="T""#), "{body}");
    assert!(body.to_ascii_lowercase().contains("content-type: image/png"), "{body}");
    assert!(body.contains("PNG"), "image bytes are sent");
    assert!(!body.contains(r#"name="id""#), "{body}");
}

#[tokio::test]
async fn failed_create_leaves_snapshot_and_route_alone() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/posts/"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "message": "Creating a post failed!" })))
        .mount(&server)
        .await;

    let (service, mut nav) = service_for(&server, Session::default());
    let mut rx = service.subscribe();

    let err = service
        .create_post("T", "C", ImageUpload::new(vec![1, 2, 3]))
        .await
        .expect_err("server error surfaces");
    assert_eq!(err.status().map(|s| s.as_u16()), Some(500));

    assert!(matches!(
        rx.try_recv(),
        Ok(PostsEvent::Failed(notice)) if notice.operation == Operation::Create
    ));
    assert!(service.snapshot().await.posts.is_empty());
    assert!(nav.try_recv().is_err());
}

#[tokio::test]
async fn update_with_path_sends_json_and_replaces_entry_in_place() {
    let server = MockServer::start().await;
    let mut page = records("p", 2);
    page.push(json!({
        "_id": "abc123", "title": "T", "content": "C",
        "imagePath": "http://localhost/images/t.png", "creator": "user-1"
    }));
    mount_page(&server, "1", "3", page, 3).await;
    Mock::given(method("PUT"))
        .and(path("/api/posts/abc123"))
        .and(body_partial_json(json!({
            "id": "abc123", "title": "T2", "content": "C2", "imagePath": "path.png", "creator": null
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "Update successful!" })))
        .expect(1)
        .mount(&server)
        .await;

    let (service, mut nav) = service_for(&server, Session::default());
    service.fetch_page(1, 3).await;
    let mut rx = service.subscribe();

    service
        .update_post("abc123", "T2", "C2", "path.png")
        .await
        .expect("update succeeds");

    let update = expect_update(rx.try_recv().expect("notification after update"));
    assert_eq!(update.posts.len(), 3);
    let entry = &update.posts[2];
    assert_eq!(entry.id, "abc123");
    assert_eq!(entry.title, "T2");
    assert_eq!(entry.content, "C2");
    assert_eq!(entry.image_path.as_deref(), Some(""));
    assert_eq!(entry.creator, None);
    assert_eq!(update.posts[0].id, "p0");
    assert_eq!(nav.try_recv().ok(), Some(Route::PostList));
}

#[tokio::test]
async fn update_with_fresh_image_sends_multipart() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/posts/abc123"))
        .and(header_regex("content-type", "^multipart/form-data"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "Update successful!" })))
        .expect(1)
        .mount(&server)
        .await;

    let (service, _nav) = service_for(&server, Session::default());
    service
        .update_post("abc123", "T2", "C2", ImageUpload::new(b"JPEGDATA".to_vec()))
        .await
        .expect("multipart update succeeds");

    let body = last_body(&server, "PUT").await;
    for field in [r#"name="id""#, r#"name="title""#, r#"name="content""#, r#"name="image"; filename="T2""#] {
        assert!(body.contains(field), "missing {field} in {body}");
    }
    assert!(body.contains("abc123"));
    assert!(body.contains("JPEGDATA"));
}

#[tokio::test]
async fn update_of_uncached_post_keeps_snapshot_but_still_notifies() {
    let server = MockServer::start().await;
    mount_page(&server, "1", "1", records("p", 1), 9).await;
    Mock::given(method("PUT"))
        .and(path("/api/posts/zzz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "Update successful!" })))
        .expect(1)
        .mount(&server)
        .await;

    let (service, mut nav) = service_for(&server, Session::default());
    service.fetch_page(1, 1).await;
    let before = service.snapshot().await;
    let mut rx = service.subscribe();

    service
        .update_post("zzz", "T2", "C2", "path.png")
        .await
        .expect("update succeeds");

    let update = expect_update(rx.try_recv().expect("notification after update"));
    assert_eq!(update.posts, before.posts);
    assert_eq!(update.total, 1);
    assert_eq!(service.snapshot().await.posts, before.posts);
    assert_eq!(nav.try_recv().ok(), Some(Route::PostList));
}

#[tokio::test]
async fn delete_never_touches_snapshot_or_notifies() {
    let server = MockServer::start().await;
    mount_page(&server, "1", "2", records("p", 2), 2).await;
    Mock::given(method("DELETE"))
        .and(path("/api/posts/p0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "Deletion successful!" })))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/posts/p1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "message": "Not authorized!" })))
        .mount(&server)
        .await;

    let (service, _nav) = service_for(&server, Session::default());
    service.fetch_page(1, 2).await;
    let before = service.snapshot().await;
    let mut rx = service.subscribe();

    service.delete_post("p0").await.expect("delete succeeds");
    let err = service.delete_post("p1").await.expect_err("unauthorized delete fails");
    assert_eq!(err.status().map(|s| s.as_u16()), Some(401));

    assert_eq!(service.snapshot().await, before);
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn fetch_one_returns_raw_record_without_caching() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/posts/abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_id": "abc123", "title": "T", "content": "C",
            "imagePath": "http://localhost/images/t.png", "creator": "user-1"
        })))
        .mount(&server)
        .await;

    let (service, _nav) = service_for(&server, Session::default());
    let mut rx = service.subscribe();

    let record = service.fetch_one("abc123").await.expect("record");
    assert_eq!(record.id, "abc123");
    assert_eq!(record.image_path.as_deref(), Some("http://localhost/images/t.png"));
    assert!(service.snapshot().await.posts.is_empty());
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn requests_carry_bearer_token_of_active_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/posts/"))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": "ok", "posts": [], "total": 0
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = Session::new(Some(AuthData::new("tok-1", "user-1", chrono::Duration::hours(1))));
    let (service, _nav) = service_for(&server, session);
    let mut rx = service.subscribe();

    service.fetch_page(1, 5).await;

    let update = expect_update(rx.try_recv().expect("notification"));
    assert!(update.posts.is_empty());
}

#[tokio::test]
async fn clear_empties_snapshot() {
    let server = MockServer::start().await;
    mount_page(&server, "1", "2", records("p", 2), 2).await;

    let (service, _nav) = service_for(&server, Session::default());
    service.fetch_page(1, 2).await;
    assert_eq!(service.snapshot().await.posts.len(), 2);

    service.clear().await;
    let snapshot = service.snapshot().await;
    assert!(snapshot.posts.is_empty());
    assert_eq!(snapshot.total, 0);
}
