use crate::config::Config;
use actix_cors::Cors;
use actix_csrf::CsrfMiddleware;
use actix_web::http::{header, Method};
use actix_web::{web, HttpResponse};
use rand::rngs::StdRng;
use tera::{Context, Tera};

pub mod admin;
pub mod auth;
pub mod functions;
pub mod public;

pub(crate) fn render(tera: &Tera, template: &str, ctx: &Context) -> HttpResponse {
    match tera.render(template, ctx) {
        Ok(rendered) => HttpResponse::Ok().content_type("text/html; charset=utf-8").body(rendered),
        Err(err) => {
            log::error!("Template rendering error in '{}': {:?}", template, err);
            HttpResponse::InternalServerError().body("Error rendering page.")
        }
    }
}

pub(crate) fn redirect(location: impl Into<String>) -> HttpResponse {
    HttpResponse::Found().append_header((header::LOCATION, location.into())).finish()
}

fn api_cors(allowed_origins: &str) -> Cors {
    let cors = if allowed_origins.trim() == "*" {
        Cors::default().allow_any_origin()
    } else {
        allowed_origins
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
    };
    cors.allowed_methods(vec!["GET"])
        .allowed_headers(vec![header::AUTHORIZATION, header::ACCEPT, header::CONTENT_TYPE])
        .max_age(3600)
}

/// Every route of the site. App-wide middleware (session, logger, headers) is added by the caller.
/// The digit-only feed page route is registered last so the prefixed scopes win.
pub fn config_routes(cfg: &mut web::ServiceConfig, config: &Config) {
    let auth_path = format!("/{}", config.auth_url_prefix);
    let admin_path = format!("/{}", config.admin_url_prefix);

    cfg.service(web::scope("/api").wrap(api_cors(&config.allowed_origins)).configure(public::config_api))
        .configure(functions::config_functions)
        .configure(auth::config_auth_api)
        .service(actix_files::Files::new("/media", &config.media_path))
        .service(
            web::scope(&auth_path)
                .wrap(CsrfMiddleware::<StdRng>::new().set_cookie(Method::GET, auth_path.clone()))
                .configure(auth::config_auth_pages),
        )
        .service(web::scope(&admin_path).configure(admin::config_dashboard))
        .configure(public::config_pages);
}
