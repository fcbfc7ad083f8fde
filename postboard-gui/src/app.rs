use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use eframe::egui::{self, Color32};
use postboard_core::{
    ApiError, AuthData, AuthRoute, AuthService, ImageInput, ImageUpload, Post, PostRecord, PostService,
    PostsEvent, Route, RouteError, Router, UiConfig,
};
use tokio::runtime::Runtime;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, warn};

const ERROR_COLOR: Color32 = Color32::from_rgb(244, 67, 54);

pub struct AppInit {
    pub runtime: Arc<Runtime>,
    pub router: Router,
    pub posts: PostService,
    pub auth: AuthService,
    pub navigation: mpsc::UnboundedReceiver<Route>,
    pub ui: UiConfig,
}

#[derive(Debug, Default)]
struct PostForm {
    post_id: Option<String>,
    title: String,
    content: String,
    image_file: String,
    existing_image: Option<String>,
}

#[derive(Debug, Default)]
struct Credentials {
    email: String,
    password: String,
}

enum Submission {
    Create(ImageUpload),
    Update(String, ImageInput),
}

enum ListAction {
    Edit(String),
    Delete(String),
}

type Pending<T> = Option<oneshot::Receiver<Result<T, ApiError>>>;

pub struct PostboardApp {
    runtime: Arc<Runtime>,
    router: Router,
    posts: PostService,
    auth: AuthService,
    updates: broadcast::Receiver<PostsEvent>,
    navigation: mpsc::UnboundedReceiver<Route>,
    session_changes: watch::Receiver<Option<AuthData>>,
    current: Route,
    page_size_options: Vec<u32>,
    listed: Vec<Post>,
    total: u64,
    page: u32,
    page_size: u32,
    loading: bool,
    error: Option<String>,
    form: PostForm,
    credentials: Credentials,
    form_load: Pending<PostRecord>,
    form_submit: Pending<()>,
    auth_submit: Pending<()>,
    delete: Pending<()>,
}

impl PostboardApp {
    pub fn new(init: AppInit) -> Self {
        let mut page_size_options = init.ui.page_size_options;
        if !page_size_options.contains(&init.ui.posts_per_page) {
            page_size_options.push(init.ui.posts_per_page);
            page_size_options.sort_unstable();
        }
        let updates = init.posts.subscribe();
        let session_changes = init.auth.session().subscribe();
        let mut app = Self {
            runtime: init.runtime,
            router: init.router,
            posts: init.posts,
            auth: init.auth,
            updates,
            navigation: init.navigation,
            session_changes,
            current: Route::PostList,
            page_size_options,
            listed: Vec::new(),
            total: 0,
            page: 1,
            page_size: init.ui.posts_per_page.max(1),
            loading: false,
            error: None,
            form: PostForm::default(),
            credentials: Credentials::default(),
            form_load: None,
            form_submit: None,
            auth_submit: None,
            delete: None,
        };
        app.go(&Route::PostList.path());
        app
    }

    fn go(&mut self, path: &str) {
        self.error = None;
        match self.router.resolve(path, self.auth.session()) {
            Ok(route) => self.enter(route),
            Err(RouteError::Unauthorized(_)) => {
                self.enter(Route::Auth(AuthRoute::Login));
                self.error = Some("Please log in to continue.".to_owned());
            }
            Err(err) => {
                warn!(path, error = %err, "navigation failed");
                self.error = Some(err.to_string());
            }
        }
    }

    fn enter(&mut self, route: Route) {
        debug!(path = %route.path(), "entering route");
        match &route {
            Route::PostList => self.refresh(),
            Route::Create => {
                self.form = PostForm::default();
                self.form_load = None;
            }
            Route::Edit { post_id } => {
                self.form = PostForm {
                    post_id: Some(post_id.clone()),
                    ..PostForm::default()
                };
                let (tx, rx) = oneshot::channel();
                let posts = self.posts.clone();
                let id = post_id.clone();
                self.runtime.spawn(async move {
                    let _ = tx.send(posts.fetch_one(&id).await);
                });
                self.form_load = Some(rx);
            }
            Route::Auth(_) => self.credentials.password.clear(),
        }
        self.current = route;
    }

    fn refresh(&mut self) {
        self.loading = true;
        let posts = self.posts.clone();
        let (page, size) = (self.page, self.page_size);
        self.runtime.spawn(async move {
            posts.fetch_page(page, size).await;
        });
    }

    fn poll_channels(&mut self) {
        if self.session_changes.has_changed().unwrap_or(false) {
            let signed_in = self.session_changes.borrow_and_update().is_some();
            debug!(signed_in, "session changed");
            if signed_in {
                self.credentials = Credentials::default();
            } else if self.current.requires_auth() {
                self.go(&Route::PostList.path());
            }
        }

        while let Ok(route) = self.navigation.try_recv() {
            self.go(&route.path());
        }

        loop {
            match self.updates.try_recv() {
                Ok(PostsEvent::Updated(update)) => {
                    self.listed = update.posts;
                    self.total = update.total;
                    self.loading = false;
                }
                Ok(PostsEvent::Failed(notice)) => {
                    self.loading = false;
                    self.error = Some(format!("{:?} failed: {}", notice.operation, notice.message));
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "post notifications lagged");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }

        if let Some(result) = take_ready(&mut self.form_load) {
            match result {
                Ok(record) => {
                    self.form.title = record.title;
                    self.form.content = record.content;
                    self.form.existing_image = record.image_path;
                }
                Err(err) => self.error = Some(format!("Could not load post: {err}")),
            }
        }
        if let Some(Err(err)) = take_ready(&mut self.form_submit) {
            self.error = Some(err.to_string());
        }
        if let Some(Err(err)) = take_ready(&mut self.auth_submit) {
            self.error = Some(err.to_string());
        }
        match take_ready(&mut self.delete) {
            Some(Ok(())) => self.refresh(),
            Some(Err(err)) => self.error = Some(format!("Could not delete post: {err}")),
            None => {}
        }
    }

    fn draw_header(&mut self, ui: &mut egui::Ui) {
        let mut target: Option<Route> = None;
        let authenticated = self.auth.session().is_authenticated();
        ui.horizontal(|ui| {
            ui.heading(egui::RichText::new("Postboard").size(18.0));
            ui.separator();
            if ui.selectable_label(self.current == Route::PostList, "All posts").clicked() {
                target = Some(Route::PostList);
            }
            if authenticated {
                if ui.selectable_label(self.current == Route::Create, "New post").clicked() {
                    target = Some(Route::Create);
                }
                if ui.button("Logout").clicked() {
                    let auth = self.auth.clone();
                    self.runtime.spawn(async move { auth.logout().await });
                }
            } else {
                let login = Route::Auth(AuthRoute::Login);
                let signup = Route::Auth(AuthRoute::Signup);
                if ui.selectable_label(self.current == login, "Login").clicked() {
                    target = Some(login);
                }
                if ui.selectable_label(self.current == signup, "Sign up").clicked() {
                    target = Some(signup);
                }
            }
        });
        if let Some(route) = target {
            self.go(&route.path());
        }
    }

    fn draw_list(&mut self, ui: &mut egui::Ui) {
        if self.loading {
            ui.spinner();
        }
        if self.listed.is_empty() && !self.loading {
            ui.label(egui::RichText::new("No posts added yet!").weak());
        }

        let user_id = self.auth.session().user_id();
        let mut action: Option<ListAction> = None;
        for post in &self.listed {
            ui.group(|ui| {
                ui.set_width(ui.available_width());
                ui.vertical(|ui| {
                    ui.label(egui::RichText::new(post.title.as_str()).strong().size(16.0));
                    if let Some(image) = post.image_path.as_deref().filter(|p| !p.is_empty()) {
                        ui.label(egui::RichText::new(image).small().weak());
                    }
                    ui.label(post.content.as_str());
                    if user_id.is_some() && user_id.as_deref() == post.creator.as_deref() {
                        ui.horizontal(|ui| {
                            if ui.button("Edit").clicked() {
                                action = Some(ListAction::Edit(post.id.clone()));
                            }
                            if ui.add_enabled(self.delete.is_none(), egui::Button::new("Delete")).clicked() {
                                action = Some(ListAction::Delete(post.id.clone()));
                            }
                        });
                    }
                });
            });
            ui.add_space(4.0);
        }

        match action {
            Some(ListAction::Edit(id)) => self.go(&Route::Edit { post_id: id }.path()),
            Some(ListAction::Delete(id)) => {
                let (tx, rx) = oneshot::channel();
                let posts = self.posts.clone();
                self.runtime.spawn(async move {
                    let _ = tx.send(posts.delete_post(&id).await);
                });
                self.delete = Some(rx);
            }
            None => {}
        }

        ui.separator();
        self.draw_pagination(ui);
    }

    fn draw_pagination(&mut self, ui: &mut egui::Ui) {
        let size = u64::from(self.page_size.max(1));
        let pages = self.total.div_ceil(size).max(1);
        let options = self.page_size_options.clone();
        let mut page = self.page;
        let mut page_size = self.page_size;

        ui.horizontal(|ui| {
            if ui.add_enabled(page > 1, egui::Button::new("◀ Previous")).clicked() {
                page -= 1;
            }
            ui.label(format!("Page {page} / {pages} ({} posts)", self.total));
            if ui.add_enabled(u64::from(page) < pages, egui::Button::new("Next ▶")).clicked() {
                page += 1;
            }
            ui.separator();
            egui::ComboBox::from_label("per page")
                .selected_text(page_size.to_string())
                .show_ui(ui, |ui| {
                    for option in options {
                        ui.selectable_value(&mut page_size, option, option.to_string());
                    }
                });
        });

        if page_size != self.page_size {
            self.page_size = page_size;
            self.page = 1;
            self.refresh();
        } else if page != self.page {
            self.page = page;
            self.refresh();
        }
    }

    fn draw_form(&mut self, ui: &mut egui::Ui) {
        let editing = self.form.post_id.is_some();
        ui.heading(if editing { "Edit post" } else { "New post" });
        ui.add_space(6.0);
        if self.form_load.is_some() {
            ui.spinner();
            return;
        }

        ui.label("Title");
        ui.text_edit_singleline(&mut self.form.title);
        ui.label("Content");
        ui.text_edit_multiline(&mut self.form.content);
        ui.label("Image file");
        ui.text_edit_singleline(&mut self.form.image_file);
        if let Some(existing) = self.form.existing_image.as_deref().filter(|p| !p.is_empty()) {
            ui.label(egui::RichText::new(format!("Current image: {existing}")).small().weak());
        }

        ui.add_space(6.0);
        let busy = self.form_submit.is_some();
        ui.horizontal(|ui| {
            if ui.add_enabled(!busy, egui::Button::new("Save post")).clicked() {
                self.submit_form();
            }
            if busy {
                ui.spinner();
            }
        });
    }

    fn submit_form(&mut self) {
        let title = self.form.title.trim().to_owned();
        let content = self.form.content.trim().to_owned();
        if title.chars().count() < 3 || content.is_empty() {
            self.error = Some("A post needs a title of at least 3 characters and some content.".to_owned());
            return;
        }

        let image_file = self.form.image_file.trim().to_owned();
        let upload = if image_file.is_empty() {
            None
        } else {
            match read_image(Path::new(&image_file)) {
                Ok(upload) => Some(upload),
                Err(message) => {
                    self.error = Some(message);
                    return;
                }
            }
        };

        let submission = match (self.form.post_id.clone(), upload) {
            (None, Some(upload)) => Submission::Create(upload),
            (Some(id), Some(upload)) => Submission::Update(id, upload.into()),
            (Some(id), None) => {
                Submission::Update(id, self.form.existing_image.clone().unwrap_or_default().into())
            }
            (None, None) => {
                self.error = Some("Please pick an image file.".to_owned());
                return;
            }
        };

        self.error = None;
        let (tx, rx) = oneshot::channel();
        let posts = self.posts.clone();
        self.runtime.spawn(async move {
            let result = match submission {
                Submission::Create(upload) => {
                    posts.create_post(&title, &content, upload).await.map(|_| ())
                }
                Submission::Update(id, image) => posts.update_post(&id, &title, &content, image).await,
            };
            let _ = tx.send(result);
        });
        self.form_submit = Some(rx);
    }

    fn draw_auth(&mut self, ui: &mut egui::Ui, mode: AuthRoute) {
        let label = match mode {
            AuthRoute::Login => "Login",
            AuthRoute::Signup => "Sign up",
        };
        ui.heading(label);
        ui.add_space(6.0);
        ui.label("E-mail");
        ui.text_edit_singleline(&mut self.credentials.email);
        ui.label("Password");
        ui.add(egui::TextEdit::singleline(&mut self.credentials.password).password(true));

        ui.add_space(6.0);
        let busy = self.auth_submit.is_some();
        let ready = !self.credentials.email.trim().is_empty() && !self.credentials.password.is_empty();
        ui.horizontal(|ui| {
            if ui.add_enabled(!busy && ready, egui::Button::new(label)).clicked() {
                self.submit_auth(mode);
            }
            if busy {
                ui.spinner();
            }
        });
    }

    fn submit_auth(&mut self, mode: AuthRoute) {
        let email = self.credentials.email.trim().to_owned();
        let password = self.credentials.password.clone();
        let auth = self.auth.clone();
        let (tx, rx) = oneshot::channel();
        self.runtime.spawn(async move {
            let result = match mode {
                AuthRoute::Login => auth.login(&email, &password).await.map(|_| ()),
                AuthRoute::Signup => auth.signup(&email, &password).await,
            };
            let _ = tx.send(result);
        });
        self.auth_submit = Some(rx);
    }
}

impl eframe::App for PostboardApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_channels();

        egui::TopBottomPanel::top("navigation").show(ctx, |ui| self.draw_header(ui));

        egui::CentralPanel::default().show(ctx, |ui| {
            if let Some(error) = &self.error {
                ui.colored_label(ERROR_COLOR, error.as_str());
                ui.separator();
            }
            egui::ScrollArea::vertical().show(ui, |ui| match self.current.clone() {
                Route::PostList => self.draw_list(ui),
                Route::Create | Route::Edit { .. } => self.draw_form(ui),
                Route::Auth(mode) => self.draw_auth(ui, mode),
            });
        });

        // Background tasks report through channels; keep polling them.
        ctx.request_repaint_after(Duration::from_millis(200));
    }
}

fn take_ready<T>(slot: &mut Pending<T>) -> Option<Result<T, ApiError>> {
    let rx = slot.as_mut()?;
    match rx.try_recv() {
        Ok(result) => {
            *slot = None;
            Some(result)
        }
        Err(oneshot::error::TryRecvError::Empty) => None,
        Err(oneshot::error::TryRecvError::Closed) => {
            *slot = None;
            None
        }
    }
}

fn read_image(path: &Path) -> Result<ImageUpload, String> {
    let mime = match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => return Err(format!("{} is not a png or jpeg image", path.display())),
    };
    let bytes = std::fs::read(path).map_err(|e| format!("Cannot read {}: {e}", path.display()))?;
    Ok(ImageUpload::new(bytes).with_content_type(mime))
}
