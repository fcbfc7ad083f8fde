mod app;

use std::path::PathBuf;
use std::sync::Arc;

use eframe::{egui, NativeOptions};
use postboard_core::{AppConfig, AuthService, PostService, Router, Session, SessionStore};
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use crate::app::{AppInit, PostboardApp};

fn main() -> eframe::Result<()> {
    init_tracing();

    let runtime = Arc::new(Runtime::new().expect("failed to initialise Tokio runtime"));
    let config = AppConfig::load();
    let client = config
        .api
        .build_client()
        .expect("failed to build HTTP client");
    let (nav_tx, nav_rx) = mpsc::unbounded_channel();
    let navigator = Arc::new(nav_tx);
    let session = Session::default();
    let store = load_session_store(&runtime);

    let posts = PostService::new(&config.api, client.clone(), session.clone(), navigator.clone())
        .expect("invalid api url in configuration");
    let auth = AuthService::new(&config.api, client, session, store, posts.clone(), navigator)
        .expect("invalid api url in configuration");
    runtime.block_on(auth.restore());

    let init = AppInit {
        runtime: runtime.clone(),
        router: Router::new(),
        posts,
        auth,
        navigation: nav_rx,
        ui: config.ui,
    };

    eframe::run_native(
        "Postboard",
        NativeOptions {
            viewport: egui::ViewportBuilder::default()
                .with_inner_size([800.0, 800.0])
                .with_min_inner_size([500.0, 400.0]),
            ..Default::default()
        },
        Box::new(move |_cc| Box::new(PostboardApp::new(init))),
    )
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn session_path() -> PathBuf {
    let dir = AppConfig::config_dir()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_default());
    dir.join("session.json")
}

fn load_session_store(runtime: &Arc<Runtime>) -> SessionStore {
    runtime.block_on(SessionStore::load_from(session_path()))
}
