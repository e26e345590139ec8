use crate::helper::media_helpers::{MediaError, UploadedImage};
use crate::helper::sanitization_helpers;
use crate::models::db_operations::posts_db_operations::MAX_TITLE_CHARS;
use actix_multipart::Multipart;
use actix_web::{web, web::BytesMut, HttpResponse};
use futures_util::StreamExt;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;
use url::{form_urlencoded, Url};

const MAX_TEXT_FIELD_BYTES: usize = 64 * 1024;
/// Upper bound for an uploaded backup document.
pub const MAX_BACKUP_BYTES: usize = 256 * 1024 * 1024;

/// Parses URL-encoded form data from bytes, handling potential UTF-8 errors gracefully.
pub fn parse_form(form_bytes: &web::Bytes) -> Result<HashMap<String, String>, HttpResponse> {
    let body = match String::from_utf8(form_bytes.to_vec()) {
        Ok(s) => s,
        Err(_) => return Err(HttpResponse::BadRequest().body("Invalid UTF-8 in request body.")),
    };
    Ok(form_urlencoded::parse(body.as_bytes()).into_owned().collect())
}

/// A fully buffered multipart submission. Text fields keep their order, which
/// matters for repeated fields like `video_link`.
#[derive(Debug, Default)]
pub struct MultipartForm {
    pub fields: Vec<(String, String)>,
    pub files: HashMap<String, UploadedImage>,
}

impl MultipartForm {
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
    }

    pub fn all(&self, name: &str) -> Vec<String> {
        self.fields
            .iter()
            .filter(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
            .collect()
    }

    pub fn take_file(&mut self, name: &str) -> Option<UploadedImage> {
        self.files.remove(name)
    }
}

/// Reads every part of the payload. File parts larger than `file_limit` are
/// truncated and flagged rather than rejected, so validation can report them.
pub async fn read_multipart(mut payload: Multipart, file_limit: usize) -> Result<MultipartForm, MediaError> {
    let mut form = MultipartForm::default();

    while let Some(item) = payload.next().await {
        let mut field = item?;
        let name = field.content_disposition().get_name().unwrap_or_default().to_string();
        let filename = field.content_disposition().get_filename().map(str::to_string);

        match filename {
            Some(filename) => {
                let content_type = field
                    .content_type()
                    .map(|mime| mime.essence_str().to_string())
                    .unwrap_or_default();
                let mut bytes = BytesMut::new();
                let mut exceeds_limit = false;
                while let Some(chunk) = field.next().await {
                    let data = chunk?;
                    if bytes.len() + data.len() > file_limit {
                        exceeds_limit = true;
                        continue;
                    }
                    bytes.extend_from_slice(&data);
                }
                // Browsers send an empty part for a file input left blank.
                if filename.is_empty() && bytes.is_empty() && !exceeds_limit {
                    continue;
                }
                form.files.insert(
                    name,
                    UploadedImage { content_type, filename, bytes: bytes.to_vec(), exceeds_limit },
                );
            }
            None => {
                let mut data = BytesMut::new();
                while let Some(chunk) = field.next().await {
                    data.extend_from_slice(&chunk?);
                    if data.len() > MAX_TEXT_FIELD_BYTES {
                        return Err(MediaError::Invalid(format!("Form field '{}' is too large.", name)));
                    }
                }
                let value = String::from_utf8(data.to_vec())
                    .map_err(|_| MediaError::Invalid("Invalid UTF-8 in form field.".to_string()))?;
                form.fields.push((name, value));
            }
        }
    }
    Ok(form)
}

// --- Field validation ---

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("static email pattern compiles"))
}

pub fn validate_email(email: &str) -> Result<(), String> {
    if !email_pattern().is_match(email) {
        return Err("Invalid email address".to_string());
    }
    if email.chars().count() > 255 {
        return Err("Email too long".to_string());
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), String> {
    let len = password.chars().count();
    if len < 6 {
        return Err("Password must be at least 6 characters".to_string());
    }
    if len > 100 {
        return Err("Password too long".to_string());
    }
    Ok(())
}

pub fn validate_username(username: &str) -> Result<(), String> {
    let len = username.chars().count();
    if len < 3 {
        return Err("Username must be at least 3 characters".to_string());
    }
    if len > 50 {
        return Err("Username too long".to_string());
    }
    Ok(())
}

/// Plain-text title, checked for presence and length.
pub fn clean_title(raw: &str) -> Result<String, String> {
    let title = sanitization_helpers::strip_all_html(raw).trim().to_string();
    if title.is_empty() {
        return Err("Title is required".to_string());
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err("Title too long".to_string());
    }
    Ok(title)
}

/// Drops blank entries, trims the rest and requires each to be an absolute URL.
pub fn clean_video_links(raw: &[String]) -> Result<Vec<String>, String> {
    let mut links = Vec::new();
    for link in raw.iter().map(|l| l.trim()).filter(|l| !l.is_empty()) {
        if Url::parse(link).is_err() {
            return Err("Invalid video URL".to_string());
        }
        links.push(link.to_string());
    }
    Ok(links)
}

pub fn is_valid_url(value: &str) -> bool {
    Url::parse(value.trim()).is_ok()
}
