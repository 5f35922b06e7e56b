//! Resource DTOs for the novel API.
//!
//! # Design
//! The backend is a loosely versioned DRF service, so most records keep the
//! fields this client reads as typed members and collect everything else in
//! a flattened `extra` map instead of failing on unknown keys.
//! Input payloads skip absent fields so PATCH requests stay partial.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginCredentials {
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub dob: String,
    pub gender: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: u64,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub dob: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default, rename = "imageURI")]
    pub image_uri: Option<String>,
    #[serde(default, rename = "bannerImageURI")]
    pub banner_image_uri: Option<String>,
    #[serde(default, rename = "patreonUrl")]
    pub patreon_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Partial profile update. `email` is deliberately absent: it cannot change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dob: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "patreonUrl")]
    pub patreon_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Novel {
    pub id: u64,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub synopsis: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Payload for creating an author novel. The `*_names` fields let the
/// backend create missing tags and genres on the fly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NovelDraft {
    pub title: String,
    pub synopsis: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_synopsis: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planned_length: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maturity_rating: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_genre_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub genre_ids: Vec<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tag_ids: Vec<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_genre_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub genre_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tag_names: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NovelUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synopsis: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_genre_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre_ids: Option<Vec<u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_ids: Option<Vec<u64>>,
}

/// Cover image bytes for an upload.
#[derive(Debug, Clone)]
pub struct CoverImage {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChapterStatus {
    Published,
    Draft,
}

impl ChapterStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ChapterStatus::Published => "published",
            ChapterStatus::Draft => "draft",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Paragraph {
    #[serde(default)]
    pub text: String,
}

/// A chapter as the backend returns it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChapterRecord {
    pub id: u64,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub chapter_slug: Option<String>,
    #[serde(default)]
    pub slugified_title: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub word_count: Option<u64>,
    #[serde(default)]
    pub number: Option<u32>,
    #[serde(default)]
    pub is_published: bool,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub content_html: Option<String>,
    #[serde(default)]
    pub content_delta: Option<Value>,
    #[serde(default)]
    pub paragraphs: Vec<Paragraph>,
    #[serde(default)]
    pub hero_image_url: Option<String>,
    #[serde(default)]
    pub hero_image: Option<String>,
}

/// A chapter in the shape the editor works with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: u64,
    pub slug: Option<String>,
    pub title: String,
    pub word_count: u64,
    pub published_at: Option<String>,
    pub status: ChapterStatus,
    pub order: u32,
    pub content: String,
    pub content_delta: Option<Value>,
    pub images: Vec<String>,
    pub hero_image_url: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl From<ChapterRecord> for Chapter {
    fn from(record: ChapterRecord) -> Self {
        let content = record.content_html.unwrap_or_else(|| {
            record
                .paragraphs
                .iter()
                .map(|p| p.text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n")
        });
        let hero_image_url = record.hero_image_url.or(record.hero_image);
        let published_at = record.published_at.or_else(|| {
            if record.is_published {
                record.created_at.clone()
            } else {
                None
            }
        });
        let slug = non_empty(record.slug)
            .or_else(|| non_empty(record.chapter_slug))
            .or_else(|| non_empty(record.slugified_title))
            .or_else(|| Some(record.id.to_string()));

        Chapter {
            id: record.id,
            slug,
            title: record.title,
            word_count: record.word_count.unwrap_or(0),
            published_at,
            status: if record.is_published {
                ChapterStatus::Published
            } else {
                ChapterStatus::Draft
            },
            order: record.number.filter(|n| *n > 0).unwrap_or(1),
            content,
            content_delta: record.content_delta,
            images: hero_image_url.iter().cloned().collect(),
            hero_image_url,
        }
    }
}

/// Editor-side chapter edits.
#[derive(Debug, Clone, Default)]
pub struct ChapterDraft {
    pub title: Option<String>,
    pub status: Option<ChapterStatus>,
    pub order: Option<u32>,
    pub content: Option<String>,
    pub content_delta: Option<Value>,
}

/// Backend field names for chapter writes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChapterPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_published: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_delta: Option<Value>,
}

impl ChapterPayload {
    pub fn for_create(draft: &ChapterDraft) -> Self {
        Self {
            content_html: non_empty(draft.content.clone()),
            content_delta: draft.content_delta.clone(),
            ..Self::for_update(draft)
        }
    }

    /// Updates only touch metadata; content goes through autosave.
    pub fn for_update(draft: &ChapterDraft) -> Self {
        Self {
            title: non_empty(draft.title.clone()),
            is_published: draft.status.map(|s| s == ChapterStatus::Published),
            number: draft.order,
            content_html: None,
            content_delta: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChapterQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub status: Option<ChapterStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutosavePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paragraphs: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_published: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_delta: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hero_image_data: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutosaveResult {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub content_html: Option<String>,
    #[serde(default)]
    pub content_delta: Option<Value>,
    #[serde(default)]
    pub hero_image_url: Option<String>,
}

/// Tags and genres share one shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Taxon {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

pub type Tag = Taxon;
pub type Genre = Taxon;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaxonInput {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: u64,
    pub rating: f64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: u64,
    pub body: String,
    #[serde(default)]
    pub parent: Option<u64>,
    #[serde(default)]
    pub replies: Vec<Comment>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommentInput {
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Value,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub read: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialProvider {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub authorization_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialLoginStart {
    pub redirect_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialLoginSession {
    pub authorization_url: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub code_verifier: Option<String>,
}
