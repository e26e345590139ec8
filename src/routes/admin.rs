use crate::config::Config;
use crate::helper::admin_helpers::{self, FormOp, PostForm, SocialLinkForm};
use crate::helper::embed_helpers::EmbedView;
use crate::helper::form_helpers::{self, read_multipart};
use crate::helper::media_helpers::MAX_IMAGE_BYTES;
use crate::helper::post_helpers::{self, FEED_PAGE_SIZE};
use crate::helper::subadmin_helpers::{self, CreateSubadminRequest};
use crate::helper::{set_notification, social_link_helpers, take_notification};
use crate::middleware::{AdminUser, DashboardUser};
use crate::models::{total_pages, Notification};
use crate::routes::{redirect, render};
use crate::DbPool;
use actix_multipart::Multipart;
use actix_session::Session;
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{web, HttpResponse, Responder};
use redb::Database;
use serde::Deserialize;
use std::path::Path;
use tera::{Context, Tera};

const TABS: [&str; 4] = ["posts", "social", "subadmins", "backup"];

#[derive(Deserialize)]
pub struct DashboardQuery {
    tab: Option<String>,
    page: Option<u32>,
    edit: Option<String>,
    edit_link: Option<String>,
}

#[derive(Deserialize)]
pub struct PreviewQuery {
    #[serde(default)]
    url: String,
}

pub fn config_dashboard(cfg: &mut web::ServiceConfig) {
    cfg.route("", web::get().to(show_dashboard))
        .route("/posts/submit", web::post().to(submit_post_action))
        .route("/posts/delete", web::post().to(delete_post_action))
        .route("/backup/export", web::get().to(export_backup_action))
        .route("/backup/import", web::post().to(import_backup_action))
        .route("/social_links/submit", web::post().to(submit_social_link_action))
        .route("/social_links/toggle", web::post().to(toggle_social_link_action))
        .route("/social_links/delete", web::post().to(delete_social_link_action))
        .route("/subadmins/create", web::post().to(create_subadmin_action))
        .route("/subadmins/delete", web::post().to(delete_subadmin_action))
        .route("/api/embed_preview", web::get().to(embed_preview));
}

/// What the dashboard shows besides the stored data.
struct DashboardView {
    tab: String,
    page: u32,
    post_form: PostForm,
    link_form: SocialLinkForm,
    notification: Option<Notification>,
}

impl DashboardView {
    fn new(tab: Option<&str>, page: u32) -> Self {
        let tab = tab.filter(|t| TABS.contains(t)).unwrap_or("posts").to_string();
        DashboardView {
            tab,
            page: page.max(1),
            post_form: PostForm::default(),
            link_form: SocialLinkForm::default(),
            notification: None,
        }
    }
}

fn tab_url(config: &Config, tab: &str) -> String {
    format!("{}?tab={}", config.dashboard_url(), tab)
}

fn render_dashboard(
    user: &DashboardUser,
    view: DashboardView,
    tera: &Tera,
    db: &Database,
    pool: &DbPool,
    config: &Config,
) -> HttpResponse {
    let mut ctx = Context::new();
    ctx.insert("user", user);
    ctx.insert("is_admin", &user.is_admin());
    ctx.insert("is_privileged", &true);
    ctx.insert("is_signed_in", &true);
    ctx.insert("dashboard_url", &config.dashboard_url());
    ctx.insert("auth_url_prefix", &config.auth_url_prefix);
    ctx.insert("tab", &view.tab);
    if let Some(notification) = &view.notification {
        ctx.insert("notification", notification);
    }

    match post_helpers::list_posts(db, view.page, FEED_PAGE_SIZE) {
        Ok(listing) => {
            ctx.insert("total_pages", &listing.total_pages());
            ctx.insert("page", &listing.page);
            ctx.insert("total_posts", &listing.total);
            ctx.insert("posts", &listing.posts);
        }
        Err(e) => {
            log::error!("Error fetching posts for dashboard: {}", e);
            ctx.insert("total_pages", &1u32);
            ctx.insert("page", &1u32);
            ctx.insert("total_posts", &0u64);
            ctx.insert("posts", &Vec::<String>::new());
            ctx.insert("notification", &Notification { message: "Error fetching posts".to_string(), r#type: "error".to_string() });
        }
    }
    ctx.insert("previews", &view.post_form.previews());
    ctx.insert("submit_label", view.post_form.submit_label());
    ctx.insert("post_form", &view.post_form);

    if user.is_admin() {
        match social_link_helpers::list_social_links(db) {
            Ok(links) => ctx.insert("social_links", &links),
            Err(e) => {
                log::error!("Error fetching social links for dashboard: {}", e);
                ctx.insert("social_links", &Vec::<String>::new());
            }
        }
        ctx.insert("link_form", &view.link_form);

        match subadmin_helpers::list_subadmins(pool, Some(&user.access_token)) {
            Ok(entries) => ctx.insert("subadmins", &entries),
            Err(e) => {
                log::error!("Error fetching sub-admins for dashboard: {}", e.public_message());
                ctx.insert("subadmins", &Vec::<String>::new());
            }
        }
    }

    render(tera, "admin/dashboard.html", &ctx)
}

async fn show_dashboard(
    user: DashboardUser,
    session: Session,
    tera: web::Data<Tera>,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
    query: web::Query<DashboardQuery>,
    config: web::Data<Config>,
) -> impl Responder {
    let mut view = DashboardView::new(query.tab.as_deref(), query.page.unwrap_or(1));
    view.notification = take_notification(&session);

    if let Some(post_id) = query.edit.as_deref() {
        match post_helpers::get_post_by_id(&db, post_id) {
            Ok(post) => {
                view.tab = "posts".to_string();
                view.post_form = PostForm::from_post(&post);
            }
            Err(e) => {
                view.notification =
                    Some(Notification { message: e.notice("Error fetching post"), r#type: "error".to_string() })
            }
        }
    }

    if let Some(link_id) = query.edit_link.as_deref().filter(|_| user.is_admin()) {
        match social_link_helpers::get_social_link(&db, link_id) {
            Ok(link) => {
                view.tab = "social".to_string();
                view.link_form = SocialLinkForm::from_link(&link);
            }
            Err(e) => {
                view.notification =
                    Some(Notification { message: e.notice("Error fetching social link"), r#type: "error".to_string() })
            }
        }
    }

    render_dashboard(&user, view, &tera, &db, &pool, &config)
}

/// Handles both the form edits (add/remove/reorder rows) and the final save.
async fn submit_post_action(
    user: DashboardUser,
    session: Session,
    payload: Multipart,
    tera: web::Data<Tera>,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
) -> impl Responder {
    let posts_url = tab_url(&config, "posts");
    let form = match read_multipart(payload, MAX_IMAGE_BYTES).await {
        Ok(form) => form,
        Err(e) => {
            log::error!("Failed to read post form: {}", e);
            set_notification(&session, "Failed to save post", "error");
            return redirect(posts_url);
        }
    };

    let op = form.text("op").and_then(FormOp::parse).unwrap_or(FormOp::Save);
    let mut state = PostForm::from_multipart(&form);
    if op != FormOp::Save {
        state.apply(op);
        let mut view = DashboardView::new(Some("posts"), 1);
        view.post_form = state;
        return render_dashboard(&user, view, &tera, &db, &pool, &config);
    }

    let media_root = Path::new(&config.media_path);
    match admin_helpers::save_post(&db, &pool, media_root, &user.user.id, form).await {
        Ok((post, created)) => {
            log::info!("Post '{}' saved by {}", post.slug, user.user.email);
            let message = if created { "Post created successfully!" } else { "Post updated successfully!" };
            set_notification(&session, message, "success");
            redirect(posts_url)
        }
        Err(e) => {
            // Keep what was typed so nothing has to be re-entered.
            let mut view = DashboardView::new(Some("posts"), 1);
            view.notification = Some(Notification { message: e.notice("Failed to save post"), r#type: "error".to_string() });
            view.post_form = state;
            render_dashboard(&user, view, &tera, &db, &pool, &config)
        }
    }
}

async fn delete_post_action(
    AdminUser(user): AdminUser,
    session: Session,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
    form: web::Bytes,
    config: web::Data<Config>,
) -> impl Responder {
    let parsed = match form_helpers::parse_form(&form) {
        Ok(p) => p,
        Err(response) => return response,
    };
    let post_id = parsed.get("post_id").map(|s| s.trim()).unwrap_or("");
    let current_page = parsed.get("page").and_then(|p| p.parse::<u32>().ok()).unwrap_or(1);

    match post_helpers::delete_post(&db, &pool, &user.user.id, post_id) {
        Ok(()) => set_notification(&session, "Post deleted successfully!", "success"),
        Err(e) => set_notification(&session, &e.notice("Failed to delete post"), "error"),
    }

    let page = match post_helpers::count_posts(&db) {
        Ok(total) => post_helpers::clamp_page(current_page, total_pages(total, FEED_PAGE_SIZE)),
        Err(e) => {
            log::error!("Could not recount posts after delete: {}", e);
            1
        }
    };
    redirect(format!("{}?tab=posts&page={}", config.dashboard_url(), page))
}

async fn export_backup_action(
    _admin: AdminUser,
    session: Session,
    db: web::Data<Database>,
    config: web::Data<Config>,
) -> impl Responder {
    let document = match post_helpers::export_all(&db) {
        Ok(document) => document,
        Err(e) => {
            set_notification(&session, &e.notice("Failed to export backup"), "error");
            return redirect(tab_url(&config, "backup"));
        }
    };
    match serde_json::to_string_pretty(&document) {
        Ok(body) => HttpResponse::Ok()
            .content_type("application/json")
            .insert_header(ContentDisposition {
                disposition: DispositionType::Attachment,
                parameters: vec![DispositionParam::Filename(admin_helpers::backup_filename())],
            })
            .body(body),
        Err(e) => {
            log::error!("Failed to serialize backup: {}", e);
            set_notification(&session, "Failed to export backup", "error");
            redirect(tab_url(&config, "backup"))
        }
    }
}

async fn import_backup_action(
    AdminUser(user): AdminUser,
    session: Session,
    payload: Multipart,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
) -> impl Responder {
    let backup_url = tab_url(&config, "backup");
    let mut form = match read_multipart(payload, form_helpers::MAX_BACKUP_BYTES).await {
        Ok(form) => form,
        Err(e) => {
            log::error!("Failed to read backup upload: {}", e);
            set_notification(&session, "Failed to import backup", "error");
            return redirect(backup_url);
        }
    };

    let file = match form.take_file("backup_file") {
        Some(file) if !file.exceeds_limit => file,
        Some(_) => {
            set_notification(&session, "Backup file is too large", "error");
            return redirect(backup_url);
        }
        None => {
            set_notification(&session, "Please select a backup file", "error");
            return redirect(backup_url);
        }
    };

    match post_helpers::import_all(&db, &pool, &user.user.id, &file.bytes) {
        Ok(count) => {
            log::info!("{} imported {} posts from backup", user.user.email, count);
            set_notification(&session, &format!("Successfully imported {} posts!", count), "success");
        }
        Err(e) => set_notification(&session, &e.notice("Failed to import backup"), "error"),
    }
    redirect(backup_url)
}

async fn submit_social_link_action(
    AdminUser(user): AdminUser,
    session: Session,
    payload: Multipart,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
) -> impl Responder {
    let social_url = tab_url(&config, "social");
    let form = match read_multipart(payload, MAX_IMAGE_BYTES).await {
        Ok(form) => form,
        Err(e) => {
            log::error!("Failed to read social link form: {}", e);
            set_notification(&session, "Failed to save social link", "error");
            return redirect(social_url);
        }
    };

    let media_root = Path::new(&config.media_path);
    match admin_helpers::save_social_link(&db, &pool, media_root, &user.user.id, form).await {
        Ok((_, created)) => {
            let message = if created { "Social link created successfully!" } else { "Social link updated successfully!" };
            set_notification(&session, message, "success");
        }
        Err(e) => set_notification(&session, &e.notice("Failed to save social link"), "error"),
    }
    redirect(social_url)
}

fn link_id_from(form: &web::Bytes) -> Result<String, HttpResponse> {
    let parsed = form_helpers::parse_form(form)?;
    Ok(parsed.get("link_id").map(|s| s.trim().to_string()).unwrap_or_default())
}

async fn toggle_social_link_action(
    AdminUser(user): AdminUser,
    session: Session,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
    form: web::Bytes,
    config: web::Data<Config>,
) -> impl Responder {
    let link_id = match link_id_from(&form) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match social_link_helpers::toggle_active(&db, &pool, &user.user.id, &link_id) {
        Ok(link) => {
            let state = if link.is_active { "activated" } else { "deactivated" };
            set_notification(&session, &format!("Social link {} successfully!", state), "success");
        }
        Err(e) => set_notification(&session, &e.notice("Failed to update social link"), "error"),
    }
    redirect(tab_url(&config, "social"))
}

async fn delete_social_link_action(
    AdminUser(user): AdminUser,
    session: Session,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
    form: web::Bytes,
    config: web::Data<Config>,
) -> impl Responder {
    let link_id = match link_id_from(&form) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match social_link_helpers::delete_social_link(&db, &pool, &user.user.id, &link_id) {
        Ok(()) => set_notification(&session, "Social link deleted successfully!", "success"),
        Err(e) => set_notification(&session, &e.notice("Failed to delete social link"), "error"),
    }
    redirect(tab_url(&config, "social"))
}

async fn create_subadmin_action(
    AdminUser(user): AdminUser,
    session: Session,
    pool: web::Data<DbPool>,
    form: web::Bytes,
    config: web::Data<Config>,
) -> impl Responder {
    let parsed = match form_helpers::parse_form(&form) {
        Ok(p) => p,
        Err(response) => return response,
    };
    let request = CreateSubadminRequest {
        email: parsed.get("email").cloned().unwrap_or_default(),
        password: parsed.get("password").cloned().unwrap_or_default(),
    };

    // Goes through the same code path as the create-subadmin endpoint, with the admin's own token.
    let token = user.access_token.clone();
    let result = web::block(move || subadmin_helpers::create_subadmin(&pool, Some(&token), request)).await;
    match result {
        Ok(Ok(created)) => {
            log::info!("Sub-admin {} created from dashboard", created.email);
            set_notification(&session, "Sub-admin created successfully!", "success");
        }
        Ok(Err(e)) => set_notification(&session, &e.public_message(), "error"),
        Err(e) => {
            log::error!("Sub-admin creation task failed: {}", e);
            set_notification(&session, "Failed to create sub-admin", "error");
        }
    }
    redirect(tab_url(&config, "subadmins"))
}

async fn delete_subadmin_action(
    AdminUser(user): AdminUser,
    session: Session,
    pool: web::Data<DbPool>,
    form: web::Bytes,
    config: web::Data<Config>,
) -> impl Responder {
    let parsed = match form_helpers::parse_form(&form) {
        Ok(p) => p,
        Err(response) => return response,
    };
    let target = parsed.get("user_id").map(|s| s.trim()).unwrap_or("");

    match subadmin_helpers::remove_subadmin(&pool, &user.user.id, target) {
        Ok(()) => set_notification(&session, "Sub-admin removed successfully", "success"),
        Err(e) => set_notification(&session, &e.notice("Failed to remove sub-admin"), "error"),
    }
    redirect(tab_url(&config, "subadmins"))
}

async fn embed_preview(_user: DashboardUser, query: web::Query<PreviewQuery>) -> impl Responder {
    let url = query.url.trim();
    if url.is_empty() {
        return HttpResponse::BadRequest().json(serde_json::json!({ "error": "A 'url' query parameter is required." }));
    }
    HttpResponse::Ok().json(EmbedView::for_link(url, "Preview"))
}
