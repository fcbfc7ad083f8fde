pub mod auth;
pub mod config;
pub mod error;
pub mod post;
pub mod routes;
pub mod service;
pub mod session;
pub mod storage;

pub use auth::AuthService;
pub use config::{ApiConfig, AppConfig, UiConfig};
pub use error::{ApiError, ConfigError, RouteError};
pub use post::{ImageInput, ImageUpload, Post, PostRecord, PostSnapshot};
pub use routes::{AllowAll, AuthRoute, Guard, Navigator, Route, Router, View};
pub use service::{FailureNotice, Operation, PostService, PostsEvent, PostsUpdate};
pub use session::{AuthData, Session};
pub use storage::SessionStore;
