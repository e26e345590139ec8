use crate::config::Config;
use crate::helper::post_helpers::{self, FEED_PAGE_SIZE};
use crate::helper::{public_helpers, social_link_helpers, take_notification, ActionError};
use crate::middleware::CurrentIdentity;
use crate::models::Post;
use crate::routes::render;
use actix_session::Session;
use actix_web::{web, HttpResponse, Responder};
use redb::Database;
use serde::{Deserialize, Serialize};
use tera::{Context, Tera};

const MAX_API_PAGE_SIZE: u32 = 100;

#[derive(Deserialize)]
pub struct PageQuery {
    page: Option<u32>,
    page_size: Option<u32>,
}

#[derive(Serialize)]
struct PostListing {
    posts: Vec<Post>,
    total: u64,
    page: u32,
    page_size: u32,
    total_pages: u32,
}

pub fn config_pages(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(show_home))
        .route("/post/{slug}", web::get().to(show_post))
        .route("/{page:\\d+}", web::get().to(show_home_page));
}

/// JSON read API, mounted under `/api`.
pub fn config_api(cfg: &mut web::ServiceConfig) {
    cfg.route("/is_server_active", web::get().to(is_server_active))
        .route("/posts", web::get().to(get_posts))
        .route("/posts/{slug}", web::get().to(get_post_by_slug))
        .route("/social_links", web::get().to(get_social_links));
}

/// Shared by every page that carries the navbar.
fn base_context(identity: &CurrentIdentity, session: &Session, config: &Config) -> Context {
    let mut ctx = Context::new();
    ctx.insert("is_privileged", &identity.gate.access().is_privileged());
    ctx.insert("is_signed_in", &identity.gate.user().is_some());
    ctx.insert("dashboard_url", &config.dashboard_url());
    ctx.insert("login_url", &config.login_url());
    ctx.insert("auth_url_prefix", &config.auth_url_prefix);
    if let Some(notification) = take_notification(session) {
        ctx.insert("notification", &notification);
    }
    ctx
}

async fn show_home(
    identity: CurrentIdentity,
    session: Session,
    tera: web::Data<Tera>,
    db: web::Data<Database>,
    config: web::Data<Config>,
) -> impl Responder {
    render_feed(1, &identity, &session, &tera, &db, &config)
}

async fn show_home_page(
    page: web::Path<u32>,
    identity: CurrentIdentity,
    session: Session,
    tera: web::Data<Tera>,
    db: web::Data<Database>,
    config: web::Data<Config>,
) -> impl Responder {
    render_feed(page.into_inner(), &identity, &session, &tera, &db, &config)
}

fn render_feed(
    page: u32,
    identity: &CurrentIdentity,
    session: &Session,
    tera: &Tera,
    db: &Database,
    config: &Config,
) -> HttpResponse {
    let mut ctx = base_context(identity, session, config);
    match public_helpers::feed_page(db, page) {
        Ok(feed) => {
            ctx.insert("feed", &feed);
            render(tera, "public/home.html", &ctx)
        }
        Err(e) => {
            log::error!("Error fetching posts for page {}: {}", page, e);
            HttpResponse::InternalServerError().body("Error fetching posts")
        }
    }
}

async fn show_post(
    slug: web::Path<String>,
    identity: CurrentIdentity,
    session: Session,
    tera: web::Data<Tera>,
    db: web::Data<Database>,
    config: web::Data<Config>,
) -> impl Responder {
    let mut ctx = base_context(&identity, &session, &config);
    match public_helpers::post_detail_page(&db, &slug) {
        Ok(detail) => {
            ctx.insert("detail", &detail);
            render(&tera, "public/post_detail.html", &ctx)
        }
        Err(ActionError::NotFound(_)) => {
            let mut response = render(&tera, "public/not_found.html", &ctx);
            *response.status_mut() = actix_web::http::StatusCode::NOT_FOUND;
            response
        }
        Err(e) => {
            log::error!("Error fetching post '{}': {}", slug, e);
            HttpResponse::InternalServerError().body("Error fetching post")
        }
    }
}

async fn is_server_active() -> impl Responder {
    HttpResponse::Ok().body("active")
}

async fn get_posts(db: web::Data<Database>, query: web::Query<PageQuery>) -> impl Responder {
    let page = query.page.unwrap_or(1);
    let page_size = query.page_size.unwrap_or(FEED_PAGE_SIZE).clamp(1, MAX_API_PAGE_SIZE);

    match post_helpers::list_posts(&db, page, page_size) {
        Ok(listing) => {
            let total_pages = listing.total_pages();
            HttpResponse::Ok().json(PostListing {
                posts: listing.posts,
                total: listing.total,
                page: listing.page,
                page_size: listing.page_size,
                total_pages,
            })
        }
        Err(e) => {
            log::error!("Failed to fetch posts page {}: {}", page, e);
            HttpResponse::InternalServerError().finish()
        }
    }
}

async fn get_post_by_slug(slug: web::Path<String>, db: web::Data<Database>) -> impl Responder {
    match post_helpers::get_post_by_slug(&db, &slug) {
        Ok(post) => HttpResponse::Ok().json(post),
        Err(ActionError::NotFound(msg)) => HttpResponse::NotFound().body(msg),
        Err(e) => {
            log::error!("Failed to fetch post '{}': {}", slug, e);
            HttpResponse::InternalServerError().finish()
        }
    }
}

async fn get_social_links(db: web::Data<Database>) -> impl Responder {
    match social_link_helpers::list_active_social_links(&db) {
        Ok(links) => HttpResponse::Ok().json(links),
        Err(e) => {
            log::error!("Failed to fetch social links: {}", e);
            HttpResponse::InternalServerError().finish()
        }
    }
}
