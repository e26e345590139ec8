use crate::helper::embed_helpers::EmbedView;
use crate::helper::form_helpers::MultipartForm;
use crate::helper::media_helpers::{self, UploadedImage};
use crate::helper::{post_helpers, social_link_helpers, ActionError};
use crate::models::db_operations::users_db_operations;
use crate::models::{Post, PostDraft, Role, SocialLink, SocialLinkDraft};
use crate::DbPool;
use chrono::Utc;
use redb::Database;
use serde::Serialize;
use std::path::Path;

/// Where an image comes from. Resolved to a URL only right before the write.
#[derive(Debug, Clone)]
pub enum ImageSource {
    Uploaded(UploadedImage),
    Referenced(String),
}

impl ImageSource {
    /// An uploaded file wins over a typed URL; neither gives `None`.
    pub fn from_form(form: &mut MultipartForm, file_field: &str, url_field: &str) -> Option<Self> {
        if let Some(file) = form.take_file(file_field) {
            return Some(ImageSource::Uploaded(file));
        }
        form.text(url_field)
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(|url| ImageSource::Referenced(url.to_string()))
    }

    /// Upload checks that must pass before anything is written.
    pub fn validate(&self) -> Result<(), ActionError> {
        match self {
            ImageSource::Uploaded(image) => media_helpers::validate_image(image)
                .map(|_| ())
                .map_err(ActionError::Validation),
            ImageSource::Referenced(_) => Ok(()),
        }
    }

    pub async fn resolve(self, media_root: &Path) -> Result<String, ActionError> {
        match self {
            ImageSource::Uploaded(image) => Ok(media_helpers::store_image(media_root, image).await?),
            ImageSource::Referenced(url) => Ok(url),
        }
    }
}

/// Edits to the post form that do not save anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormOp {
    Save,
    AddVideo,
    RemoveVideo(usize),
    MoveUp(usize),
    MoveDown(usize),
    AddImage,
    RemoveImage(usize),
}

impl FormOp {
    /// Reads the value of the pressed submit button, e.g. `move_up:2`.
    pub fn parse(raw: &str) -> Option<Self> {
        let (name, index) = match raw.split_once(':') {
            Some((name, index)) => (name, index.parse::<usize>().ok()),
            None => (raw, None),
        };
        match (name, index) {
            ("save", None) => Some(FormOp::Save),
            ("add_video", None) => Some(FormOp::AddVideo),
            ("add_image", None) => Some(FormOp::AddImage),
            ("remove_video", Some(i)) => Some(FormOp::RemoveVideo(i)),
            ("move_up", Some(i)) => Some(FormOp::MoveUp(i)),
            ("move_down", Some(i)) => Some(FormOp::MoveDown(i)),
            ("remove_image", Some(i)) => Some(FormOp::RemoveImage(i)),
            _ => None,
        }
    }
}

/// The post form as the dashboard renders it.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PostForm {
    pub editing_id: Option<String>,
    pub title: String,
    pub thumbnail_url: String,
    pub image_urls: Vec<String>,
    pub video_links: Vec<String>,
}

impl Default for PostForm {
    fn default() -> Self {
        PostForm {
            editing_id: None,
            title: String::new(),
            thumbnail_url: String::new(),
            image_urls: Vec::new(),
            video_links: vec![String::new()],
        }
    }
}

fn indexed_fields(form: &MultipartForm, prefix: &str) -> Vec<(usize, String)> {
    let mut slots: Vec<(usize, String)> = form
        .fields
        .iter()
        .filter_map(|(key, value)| {
            key.strip_prefix(prefix)
                .and_then(|index| index.parse::<usize>().ok())
                .map(|index| (index, value.clone()))
        })
        .collect();
    slots.sort_by_key(|(index, _)| *index);
    slots
}

impl PostForm {
    pub fn from_post(post: &Post) -> Self {
        PostForm {
            editing_id: Some(post.id.clone()),
            title: post.title.clone(),
            thumbnail_url: post.thumbnail_url.clone(),
            image_urls: post.additional_images.clone(),
            video_links: if post.video_links.is_empty() { vec![String::new()] } else { post.video_links.clone() },
        }
    }

    pub fn from_multipart(form: &MultipartForm) -> Self {
        PostForm {
            editing_id: form.text("post_id").map(str::trim).filter(|id| !id.is_empty()).map(str::to_string),
            title: form.text("title").unwrap_or_default().to_string(),
            thumbnail_url: form.text("thumbnail_url").unwrap_or_default().trim().to_string(),
            image_urls: indexed_fields(form, "image_url_").into_iter().map(|(_, url)| url).collect(),
            video_links: form.all("video_link"),
        }
    }

    pub fn apply(&mut self, op: FormOp) {
        match op {
            FormOp::Save => {}
            FormOp::AddVideo => self.video_links.push(String::new()),
            FormOp::RemoveVideo(i) if i < self.video_links.len() => {
                self.video_links.remove(i);
            }
            FormOp::MoveUp(i) if i > 0 && i < self.video_links.len() => self.video_links.swap(i - 1, i),
            FormOp::MoveDown(i) if i + 1 < self.video_links.len() => self.video_links.swap(i, i + 1),
            FormOp::AddImage => self.image_urls.push(String::new()),
            FormOp::RemoveImage(i) if i < self.image_urls.len() => {
                self.image_urls.remove(i);
            }
            _ => {}
        }
    }

    /// Live previews for the non-blank links, in order.
    pub fn previews(&self) -> Vec<EmbedView> {
        self.video_links
            .iter()
            .map(|link| link.trim())
            .filter(|link| !link.is_empty())
            .map(|link| EmbedView::for_link(link, "Preview"))
            .collect()
    }

    pub fn submit_label(&self) -> &'static str {
        if self.editing_id.is_some() {
            "Update Post"
        } else {
            "Create Post"
        }
    }
}

fn require_role(pool: &DbPool, actor_id: &str, allowed: &[Role]) -> Result<Role, ActionError> {
    let conn = pool.get()?;
    Ok(users_db_operations::require_role(&conn, actor_id, allowed)?)
}

/// Creates or updates a post from the dashboard form. Returns the post and
/// whether it was newly created.
pub async fn save_post(
    db: &Database,
    pool: &DbPool,
    media_root: &Path,
    actor_id: &str,
    mut form: MultipartForm,
) -> Result<(Post, bool), ActionError> {
    let state = PostForm::from_multipart(&form);
    let (title, video_links) = post_helpers::validate_post_fields(&state.title, &state.video_links)?;
    require_role(pool, actor_id, &[Role::Admin, Role::Subadmin])?;

    let existing = match &state.editing_id {
        Some(id) => Some(post_helpers::get_post_by_id(db, id)?),
        None => None,
    };

    let thumbnail = ImageSource::from_form(&mut form, "thumbnail_file", "thumbnail_url");
    let thumbnail_url = match (thumbnail, &existing) {
        (Some(source), _) => {
            source.validate()?;
            source.resolve(media_root).await?
        }
        (None, Some(post)) => post.thumbnail_url.clone(),
        (None, None) => {
            return Err(ActionError::Validation(
                "Please provide a thumbnail image (upload or URL)".to_string(),
            ))
        }
    };

    let mut slots: Vec<usize> = indexed_fields(&form, "image_url_").into_iter().map(|(i, _)| i).collect();
    for key in form.files.keys() {
        if let Some(index) = key.strip_prefix("image_file_").and_then(|i| i.parse::<usize>().ok()) {
            if !slots.contains(&index) {
                slots.push(index);
            }
        }
    }
    slots.sort_unstable();

    let mut additional_images = Vec::new();
    for index in slots {
        let source = ImageSource::from_form(&mut form, &format!("image_file_{}", index), &format!("image_url_{}", index));
        let source = match source {
            Some(source) => source,
            None => continue,
        };
        if let Err(e) = source.validate() {
            log::warn!("Skipping additional image {}: {}", index, e);
            continue;
        }
        match source.resolve(media_root).await {
            Ok(url) => additional_images.push(url),
            Err(e) => {
                log::error!("Failed to upload additional image {}: {}", index, e);
                continue;
            }
        }
    }

    let draft = PostDraft { title, thumbnail_url, additional_images, video_links };
    match existing {
        Some(post) => Ok((post_helpers::update_post(db, pool, actor_id, &post.id, draft)?, false)),
        None => Ok((post_helpers::create_post(db, pool, actor_id, draft)?, true)),
    }
}

/// The social link form as the dashboard renders it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SocialLinkForm {
    pub editing_id: Option<String>,
    pub platform: String,
    pub url: String,
    pub image_url: String,
    pub display_order: i64,
}

impl SocialLinkForm {
    pub fn from_link(link: &SocialLink) -> Self {
        SocialLinkForm {
            editing_id: Some(link.id.clone()),
            platform: link.platform.clone(),
            url: link.url.clone(),
            image_url: link.image_url.clone(),
            display_order: link.display_order,
        }
    }
}

/// Creates or updates a social link; an edit without a new image keeps the old one.
pub async fn save_social_link(
    db: &Database,
    pool: &DbPool,
    media_root: &Path,
    actor_id: &str,
    mut form: MultipartForm,
) -> Result<(SocialLink, bool), ActionError> {
    let editing_id = form.text("link_id").map(str::trim).filter(|id| !id.is_empty()).map(str::to_string);
    let (platform, url) = social_link_helpers::validate_link_fields(
        form.text("platform").unwrap_or_default(),
        form.text("url").unwrap_or_default(),
    )?;
    let display_order = form
        .text("display_order")
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| v.parse::<i64>())
        .transpose()
        .map_err(|_| ActionError::Validation("Display order must be a whole number".to_string()))?
        .unwrap_or(0);
    require_role(pool, actor_id, &[Role::Admin])?;

    let existing = match &editing_id {
        Some(id) => Some(social_link_helpers::get_social_link(db, id)?),
        None => None,
    };
    let image = ImageSource::from_form(&mut form, "image_file", "image_url");
    let image_url = match (image, &existing) {
        (Some(source), _) => {
            source.validate()?;
            source.resolve(media_root).await?
        }
        (None, Some(link)) => link.image_url.clone(),
        (None, None) => return Err(ActionError::Validation("Please provide an image".to_string())),
    };

    let draft = SocialLinkDraft { platform, url, image_url, display_order };
    match existing {
        Some(link) => Ok((social_link_helpers::update_social_link(db, pool, actor_id, &link.id, draft)?, false)),
        None => Ok((social_link_helpers::create_social_link(db, pool, actor_id, draft)?, true)),
    }
}

pub fn backup_filename() -> String {
    format!("posts-backup-{}.json", Utc::now().format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form_with(fields: &[(&str, &str)]) -> MultipartForm {
        MultipartForm {
            fields: fields.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            files: Default::default(),
        }
    }

    #[test]
    fn form_ops_parse_from_button_values() {
        assert_eq!(FormOp::parse("save"), Some(FormOp::Save));
        assert_eq!(FormOp::parse("move_up:2"), Some(FormOp::MoveUp(2)));
        assert_eq!(FormOp::parse("remove_image:0"), Some(FormOp::RemoveImage(0)));
        assert_eq!(FormOp::parse("move_up"), None);
        assert_eq!(FormOp::parse("explode:1"), None);
    }

    #[test]
    fn video_links_reorder_and_ignore_out_of_range() {
        let mut form = PostForm {
            video_links: vec!["a".into(), "b".into(), "c".into()],
            ..PostForm::default()
        };
        form.apply(FormOp::MoveUp(2));
        assert_eq!(form.video_links, vec!["a", "c", "b"]);
        form.apply(FormOp::MoveDown(0));
        assert_eq!(form.video_links, vec!["c", "a", "b"]);
        form.apply(FormOp::MoveUp(0));
        form.apply(FormOp::MoveDown(2));
        form.apply(FormOp::RemoveVideo(9));
        assert_eq!(form.video_links, vec!["c", "a", "b"]);
        form.apply(FormOp::RemoveVideo(1));
        form.apply(FormOp::AddVideo);
        assert_eq!(form.video_links, vec!["c", "b", ""]);
    }

    #[test]
    fn multipart_state_keeps_field_order() {
        let form = form_with(&[
            ("post_id", ""),
            ("title", "Clip"),
            ("video_link", "https://youtu.be/2"),
            ("image_url_1", "https://img/b.png"),
            ("video_link", "https://youtu.be/1"),
            ("image_url_0", "https://img/a.png"),
        ]);
        let state = PostForm::from_multipart(&form);
        assert_eq!(state.editing_id, None);
        assert_eq!(state.submit_label(), "Create Post");
        assert_eq!(state.video_links, vec!["https://youtu.be/2", "https://youtu.be/1"]);
        assert_eq!(state.image_urls, vec!["https://img/a.png", "https://img/b.png"]);
        assert_eq!(state.previews().len(), 2);
    }

    #[test]
    fn uploaded_file_wins_over_url() {
        let mut form = form_with(&[("thumbnail_url", "https://img/t.png")]);
        form.files.insert(
            "thumbnail_file".to_string(),
            UploadedImage {
                content_type: "image/png".to_string(),
                filename: "t.png".to_string(),
                bytes: vec![1, 2, 3],
                exceeds_limit: false,
            },
        );
        assert!(matches!(
            ImageSource::from_form(&mut form, "thumbnail_file", "thumbnail_url"),
            Some(ImageSource::Uploaded(_))
        ));
        assert!(matches!(
            ImageSource::from_form(&mut form, "thumbnail_file", "thumbnail_url"),
            Some(ImageSource::Referenced(url)) if url == "https://img/t.png"
        ));
    }

    #[test]
    fn backup_filename_carries_the_date() {
        let name = backup_filename();
        assert!(name.starts_with("posts-backup-"));
        assert!(name.ends_with(".json"));
        assert_eq!(name.len(), "posts-backup-YYYY-MM-DD.json".len());
    }
}
