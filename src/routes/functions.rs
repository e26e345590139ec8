use crate::helper::subadmin_helpers::{self, CreateSubadminRequest, FunctionError};
use crate::middleware::bearer_token;
use crate::DbPool;
use actix_web::http::Method;
use actix_web::middleware::DefaultHeaders;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde_json::json;

/// The privileged JSON endpoints. Every response, errors included, carries the CORS headers.
pub fn config_functions(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/functions/v1")
            .wrap(
                DefaultHeaders::new()
                    .add(("Access-Control-Allow-Origin", "*"))
                    .add(("Access-Control-Allow-Headers", "authorization, x-client-info, apikey, content-type")),
            )
            .route("/create-subadmin", web::post().to(create_subadmin))
            .route("/create-subadmin", web::method(Method::OPTIONS).to(preflight))
            .route("/list-subadmins", web::get().to(list_subadmins))
            .route("/list-subadmins", web::post().to(list_subadmins))
            .route("/list-subadmins", web::method(Method::OPTIONS).to(preflight)),
    );
}

async fn preflight() -> impl Responder {
    HttpResponse::Ok().finish()
}

fn error_response(e: FunctionError) -> HttpResponse {
    HttpResponse::BadRequest().json(json!({ "error": e.public_message() }))
}

async fn create_subadmin(req: HttpRequest, pool: web::Data<DbPool>, body: web::Bytes) -> impl Responder {
    let bearer = bearer_token(&req);
    // A malformed body reads as empty fields; the admin check still comes first.
    let request: CreateSubadminRequest = serde_json::from_slice(&body).unwrap_or_else(|e| {
        log::warn!("create-subadmin received an unreadable body: {}", e);
        CreateSubadminRequest::default()
    });

    let result = web::block(move || subadmin_helpers::create_subadmin(&pool, bearer.as_deref(), request)).await;
    match result {
        Ok(Ok(user)) => HttpResponse::Ok().json(json!({ "success": true, "user": user })),
        Ok(Err(e)) => error_response(e),
        Err(e) => {
            log::error!("create-subadmin task failed: {}", e);
            HttpResponse::BadRequest().json(json!({ "error": "Internal error" }))
        }
    }
}

async fn list_subadmins(req: HttpRequest, pool: web::Data<DbPool>) -> impl Responder {
    let bearer = bearer_token(&req);
    match subadmin_helpers::list_subadmins(&pool, bearer.as_deref()) {
        Ok(entries) => HttpResponse::Ok().json(json!({ "subAdmins": entries })),
        Err(e) => error_response(e),
    }
}
