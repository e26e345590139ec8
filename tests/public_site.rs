#[macro_use]
mod common;

use actix_web::test;
use common::{body_text, TestEnv};
use serde_json::Value;
use vidfeed_backend::helper::{post_helpers, social_link_helpers};
use vidfeed_backend::models::SocialLinkDraft;

#[actix_web::test]
async fn feed_shows_twelve_posts_per_page() {
    let env = TestEnv::new();
    let (_, admin_id) = env.admin();
    for i in 1..=13 {
        env.post(&admin_id, &format!("Clip number {}", i), &[]);
    }
    let app = test_app!(env);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
    assert!(resp.status().is_success());
    let body = body_text(resp).await;
    assert!(body.contains("Clip number 13"), "newest post is on the first page");
    assert!(!body.contains("Clip number 1<"), "oldest post spills onto page two");
    assert!(body.contains("Page 1 of 2"));

    let resp = test::call_service(&app, test::TestRequest::get().uri("/2").to_request()).await;
    let body = body_text(resp).await;
    assert!(body.contains("Clip number 1<"));
    assert!(body.contains("Page 2 of 2"));
}

#[actix_web::test]
async fn api_listing_is_paginated_and_empty_past_the_end() {
    let env = TestEnv::new();
    let (_, admin_id) = env.admin();
    for i in 1..=13 {
        env.post(&admin_id, &format!("Clip {}", i), &[]);
    }
    let app = test_app!(env);

    let first: Value =
        test::call_and_read_body_json(&app, test::TestRequest::get().uri("/api/posts").to_request()).await;
    assert_eq!(first["total"], 13);
    assert_eq!(first["total_pages"], 2);
    assert_eq!(first["posts"].as_array().unwrap().len(), 12);
    assert_eq!(first["posts"][0]["title"], "Clip 13");

    let second: Value =
        test::call_and_read_body_json(&app, test::TestRequest::get().uri("/api/posts?page=2").to_request()).await;
    assert_eq!(second["posts"].as_array().unwrap().len(), 1);
    assert_eq!(second["posts"][0]["title"], "Clip 1");

    let beyond: Value =
        test::call_and_read_body_json(&app, test::TestRequest::get().uri("/api/posts?page=3").to_request()).await;
    assert!(beyond["posts"].as_array().unwrap().is_empty());
    assert_eq!(beyond["total"], 13);
}

#[actix_web::test]
async fn post_detail_embeds_youtube_links() {
    let env = TestEnv::new();
    let (_, admin_id) = env.admin();
    let post = env.post(&admin_id, "Test Clip", &["https://youtu.be/dQw4w9WgXcQ", "https://example.com/watch/1"]);
    assert_eq!(post.slug, "test-clip");
    let app = test_app!(env);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/post/test-clip").to_request()).await;
    assert!(resp.status().is_success());
    let body = body_text(resp).await;
    assert!(body.contains("<h1>Test Clip</h1>"));
    assert!(body.contains("youtube.com&#x2F;embed&#x2F;dQw4w9WgXcQ"));
    assert!(body.contains("Test Clip - Video 1"));
    // Unknown hosts are linked out, not framed.
    assert!(body.contains("Test Clip - Video 2"));
    assert!(body.contains("Open Video"));
}

#[actix_web::test]
async fn sidebar_never_lists_the_current_post() {
    let env = TestEnv::new();
    let (_, admin_id) = env.admin();
    let only = env.post(&admin_id, "Lonely Clip", &[]);
    assert!(post_helpers::sidebar(&env.db, &only.slug, 3).unwrap().is_empty());

    let other = env.post(&admin_id, "Second Clip", &[]);
    let picks = post_helpers::sidebar(&env.db, &only.slug, 3).unwrap();
    assert_eq!(picks.iter().map(|p| p.id.as_str()).collect::<Vec<_>>(), vec![other.id.as_str()]);
    // Unknown slugs fall back to any post.
    assert_eq!(post_helpers::sidebar(&env.db, "gone", 3).unwrap().len(), 2);
}

#[actix_web::test]
async fn unknown_slug_renders_not_found() {
    let env = TestEnv::new();
    let app = test_app!(env);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/post/does-not-exist").to_request()).await;
    assert_eq!(resp.status(), 404);
    let body = body_text(resp).await;
    assert!(body.contains("Post not found"));
    assert!(body.contains("Back to home"));

    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/posts/does-not-exist").to_request()).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn only_active_social_links_are_public() {
    let env = TestEnv::new();
    let (_, admin_id) = env.admin();
    let draft = |platform: &str, order: i64| SocialLinkDraft {
        platform: platform.to_string(),
        url: format!("https://{}.example.com", platform.to_lowercase()),
        image_url: "https://img.example.com/banner.png".to_string(),
        display_order: order,
    };
    social_link_helpers::create_social_link(&env.db, &env.pool, &admin_id, draft("Telegram", 1)).unwrap();
    let hidden = social_link_helpers::create_social_link(&env.db, &env.pool, &admin_id, draft("Twitter", 0)).unwrap();
    social_link_helpers::toggle_active(&env.db, &env.pool, &admin_id, &hidden.id).unwrap();
    let app = test_app!(env);

    let links: Value =
        test::call_and_read_body_json(&app, test::TestRequest::get().uri("/api/social_links").to_request()).await;
    let links = links.as_array().unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0]["platform"], "Telegram");

    let body = body_text(test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await).await;
    assert!(body.contains("Telegram Banner"));
    assert!(!body.contains("Twitter Banner"));
}

#[actix_web::test]
async fn anonymous_visitors_see_no_dashboard_link() {
    let env = TestEnv::new();
    let app = test_app!(env);

    let body = body_text(test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await).await;
    assert!(!body.contains(">Dashboard</a>"));
    assert!(!body.contains(">Logout</button>"));
    assert!(body.contains("No posts yet"));
}
