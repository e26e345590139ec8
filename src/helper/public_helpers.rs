use crate::helper::embed_helpers::EmbedView;
use crate::helper::post_helpers::{self, FEED_PAGE_SIZE, SIDEBAR_SIZE};
use crate::helper::{social_link_helpers, ActionError};
use crate::models::{Post, SocialLink};
use redb::Database;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct FeedPage {
    pub posts: Vec<Post>,
    pub social_links: Vec<SocialLink>,
    pub page: u32,
    pub total_pages: u32,
    pub prev_page: Option<u32>,
    pub next_page: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct PostDetailPage {
    pub post: Post,
    pub embeds: Vec<EmbedView>,
    pub sidebar: Vec<Post>,
    pub social_links: Vec<SocialLink>,
}

/// A social link failure must not take the page down; it just renders without banners.
fn active_links_or_empty(db: &Database) -> Vec<SocialLink> {
    social_link_helpers::list_active_social_links(db).unwrap_or_else(|e| {
        log::error!("Error fetching social links: {}", e);
        Vec::new()
    })
}

pub fn feed_page(db: &Database, page: u32) -> Result<FeedPage, ActionError> {
    let listing = post_helpers::list_posts(db, page, FEED_PAGE_SIZE)?;
    let total_pages = listing.total_pages();
    let page = listing.page;
    Ok(FeedPage {
        posts: listing.posts,
        social_links: active_links_or_empty(db),
        page,
        total_pages,
        prev_page: if page > 1 { Some(page - 1) } else { None },
        next_page: if page < total_pages { Some(page + 1) } else { None },
    })
}

pub fn post_detail_page(db: &Database, slug: &str) -> Result<PostDetailPage, ActionError> {
    let post = post_helpers::get_post_by_slug(db, slug)?;
    let embeds = EmbedView::for_links(&post.video_links, &post.title);
    let sidebar = post_helpers::sidebar(db, slug, SIDEBAR_SIZE).unwrap_or_else(|e| {
        log::error!("Error fetching sidebar posts: {}", e);
        Vec::new()
    });
    Ok(PostDetailPage { post, embeds, sidebar, social_links: active_links_or_empty(db) })
}
