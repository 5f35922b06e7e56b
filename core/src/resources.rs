//! Resource methods: novels, chapters, tags, genres and the community
//! endpoints. Each one only names the method, path, auth needs and, for
//! collections, the page policy.

use serde_json::{json, Value};

use crate::client::ApiService;
use crate::error::ApiError;
use crate::http::{HttpMethod, MultipartForm};
use crate::pagination::{Collected, PagePolicy, PartialFailure};
use crate::request::{with_query, RequestOptions};
use crate::response::{ApiResponse, Payload};
use crate::types::{
    AutosavePayload, AutosaveResult, Chapter, ChapterDraft, ChapterPayload, ChapterQuery,
    ChapterRecord, Comment, CommentInput, CoverImage, Genre, Notification, Novel, NovelDraft,
    NovelUpdate, ProfileUpdate, Review, Tag, TaxonInput, UserProfile,
};

/// Query parameters as plain pairs.
pub type Params<'a> = &'a [(&'a str, &'a str)];

fn query(path: &str, params: Params<'_>) -> String {
    let pairs: Vec<(&str, Option<String>)> = params
        .iter()
        .map(|(k, v)| (*k, Some(v.to_string())))
        .collect();
    with_query(path, &pairs)
}

fn unit(response: ApiResponse<Payload>) -> ApiResponse<()> {
    response.map(|_| ())
}

fn chapter(response: ApiResponse<ChapterRecord>) -> ApiResponse<Chapter> {
    response.map(Chapter::from)
}

impl ApiService {
    // --- profile ---

    pub async fn profile(&self) -> Result<ApiResponse<UserProfile>, ApiError> {
        self.request_as("/accounts/profile/", RequestOptions::get()).await
    }

    pub async fn update_profile(
        &self,
        update: &ProfileUpdate,
    ) -> Result<ApiResponse<UserProfile>, ApiError> {
        let options = RequestOptions::method(HttpMethod::Patch).json(update)?;
        self.request_as("/accounts/profile/", options).await
    }

    // --- author novels ---

    /// A payload that is not a list reads as no novels.
    pub async fn my_novels(&self) -> Result<ApiResponse<Vec<Novel>>, ApiError> {
        let response = self.request("/author/novels/", RequestOptions::get()).await?;
        if matches!(response.data, Payload::Json(Value::Array(_))) {
            response.decode()
        } else {
            tracing::debug!("author novels payload is not a list");
            Ok(response.map(|_| Vec::new()))
        }
    }

    pub async fn author_novel(&self, slug: &str) -> Result<ApiResponse<Novel>, ApiError> {
        self.request_as(&format!("/author/novels/{slug}/"), RequestOptions::get())
            .await
    }

    pub async fn create_novel(&self, draft: &NovelDraft) -> Result<ApiResponse<Novel>, ApiError> {
        let options = RequestOptions::method(HttpMethod::Post).json(draft)?;
        self.request_as("/author/novels/", options).await
    }

    pub async fn update_novel(
        &self,
        slug: &str,
        update: &NovelUpdate,
    ) -> Result<ApiResponse<Novel>, ApiError> {
        let options = RequestOptions::method(HttpMethod::Patch).json(update)?;
        self.request_as(&format!("/author/novels/{slug}/"), options)
            .await
    }

    pub async fn upload_novel_cover(
        &self,
        novel_id: u64,
        cover: CoverImage,
    ) -> Result<ApiResponse<Value>, ApiError> {
        let form = MultipartForm::new()
            .text("novel_id", novel_id.to_string())
            .file(
                "cover_image",
                &cover.file_name,
                cover.content_type.as_deref(),
                cover.bytes,
            );
        let options = RequestOptions::method(HttpMethod::Post).multipart(form);
        Ok(self
            .request("/novel/novel-image-upload/", options)
            .await?
            .map(Payload::into_value))
    }

    // --- public novels ---

    pub async fn novels(&self) -> Result<ApiResponse<Vec<Novel>>, ApiError> {
        self.request_as("/novels/", RequestOptions::get()).await
    }

    pub async fn trending_novels(&self) -> Result<ApiResponse<Vec<Novel>>, ApiError> {
        self.request_as("/trending/", RequestOptions::get()).await
    }

    pub async fn latest_releases(&self) -> Result<ApiResponse<Vec<Novel>>, ApiError> {
        self.request_as("/novels/latest/", RequestOptions::get()).await
    }

    pub async fn dashboard_stats(&self) -> Result<ApiResponse<Value>, ApiError> {
        self.request_as("/dashboard/stats/", RequestOptions::get()).await
    }

    // --- chapters ---

    pub async fn chapters(
        &self,
        novel_slug: &str,
        filter: &ChapterQuery,
    ) -> Result<ApiResponse<Vec<Chapter>>, ApiError> {
        let endpoint = with_query(
            &format!("/novels/{novel_slug}/chapters/"),
            &[
                ("page", filter.page.map(|p| p.to_string())),
                ("page_size", filter.page_size.map(|p| p.to_string())),
                ("status", filter.status.map(|s| s.as_str().to_string())),
            ],
        );
        let response = self
            .request_as::<Vec<ChapterRecord>>(&endpoint, RequestOptions::get())
            .await?;
        Ok(response.map(|records| records.into_iter().map(Chapter::from).collect()))
    }

    pub async fn create_chapter(
        &self,
        novel_slug: &str,
        draft: &ChapterDraft,
    ) -> Result<ApiResponse<Chapter>, ApiError> {
        let options =
            RequestOptions::method(HttpMethod::Post).json(&ChapterPayload::for_create(draft))?;
        self.request_as(&format!("/novels/{novel_slug}/chapters/"), options)
            .await
            .map(chapter)
    }

    pub async fn chapter_by_id(&self, chapter_id: u64) -> Result<ApiResponse<Chapter>, ApiError> {
        self.request_as(&format!("/chapters/{chapter_id}/"), RequestOptions::get())
            .await
            .map(chapter)
    }

    pub async fn chapter_by_slug(
        &self,
        novel_slug: &str,
        chapter_slug: &str,
    ) -> Result<ApiResponse<Chapter>, ApiError> {
        self.request_as(
            &format!("/novels/{novel_slug}/chapters/{chapter_slug}/"),
            RequestOptions::get(),
        )
        .await
        .map(chapter)
    }

    /// PATCH, so fields the draft leaves out stay untouched.
    pub async fn update_chapter(
        &self,
        chapter_id: u64,
        draft: &ChapterDraft,
    ) -> Result<ApiResponse<Chapter>, ApiError> {
        let options =
            RequestOptions::method(HttpMethod::Patch).json(&ChapterPayload::for_update(draft))?;
        self.request_as(&format!("/chapters/{chapter_id}/"), options)
            .await
            .map(chapter)
    }

    pub async fn autosave_chapter(
        &self,
        chapter_id: u64,
        payload: &AutosavePayload,
    ) -> Result<ApiResponse<AutosaveResult>, ApiError> {
        let options = RequestOptions::method(HttpMethod::Post).json(payload)?;
        self.request_as(&format!("/chapters/{chapter_id}/autosave/"), options)
            .await
    }

    pub async fn delete_chapter(&self, chapter_id: u64) -> Result<ApiResponse<()>, ApiError> {
        self.request(
            &format!("/chapters/{chapter_id}/"),
            RequestOptions::method(HttpMethod::Delete),
        )
        .await
        .map(unit)
    }

    pub async fn chapter_stats(&self, chapter_id: u64) -> Result<ApiResponse<Value>, ApiError> {
        self.request_as(&format!("/chapters/{chapter_id}/stats/"), RequestOptions::get())
            .await
    }

    // --- tags ---

    pub async fn tags(&self, params: Params<'_>) -> Result<Collected<Tag>, PartialFailure<Tag>> {
        self.collect(&query("/tags/", params), PagePolicy::TAGS).await
    }

    pub async fn create_tag(&self, input: &TaxonInput) -> Result<ApiResponse<Tag>, ApiError> {
        let options = RequestOptions::method(HttpMethod::Post).json(input)?;
        self.request_as("/tags/", options).await
    }

    pub async fn update_tag(
        &self,
        tag_id: u64,
        input: &TaxonInput,
    ) -> Result<ApiResponse<Tag>, ApiError> {
        let options = RequestOptions::method(HttpMethod::Put).json(input)?;
        self.request_as(&format!("/tags/{tag_id}/"), options).await
    }

    pub async fn delete_tag(&self, tag_id: u64) -> Result<ApiResponse<()>, ApiError> {
        self.request(&format!("/tags/{tag_id}/"), RequestOptions::method(HttpMethod::Delete))
            .await
            .map(unit)
    }

    // --- genres ---

    pub async fn genres(
        &self,
        params: Params<'_>,
    ) -> Result<Collected<Genre>, PartialFailure<Genre>> {
        self.collect(&query("/genres/", params), PagePolicy::GENRES)
            .await
    }

    pub async fn create_genre(&self, input: &TaxonInput) -> Result<ApiResponse<Genre>, ApiError> {
        let options = RequestOptions::method(HttpMethod::Post).json(input)?;
        self.request_as("/genres/", options).await
    }

    pub async fn update_genre(
        &self,
        genre_id: u64,
        input: &TaxonInput,
    ) -> Result<ApiResponse<Genre>, ApiError> {
        let options = RequestOptions::method(HttpMethod::Put).json(input)?;
        self.request_as(&format!("/genres/{genre_id}/"), options)
            .await
    }

    pub async fn delete_genre(&self, genre_id: u64) -> Result<ApiResponse<()>, ApiError> {
        self.request(
            &format!("/genres/{genre_id}/"),
            RequestOptions::method(HttpMethod::Delete),
        )
        .await
        .map(unit)
    }

    // --- reviews ---

    pub async fn reviews(&self, params: Params<'_>) -> Result<ApiResponse<Vec<Review>>, ApiError> {
        self.request_as(&query("/reviews/", params), RequestOptions::get())
            .await
    }

    pub async fn create_review(&self, review: &Value) -> Result<ApiResponse<Review>, ApiError> {
        let options = RequestOptions::method(HttpMethod::Post).json(review)?;
        self.request_as("/reviews/", options).await
    }

    pub async fn update_review(
        &self,
        review_id: u64,
        review: &Value,
    ) -> Result<ApiResponse<Review>, ApiError> {
        let options = RequestOptions::method(HttpMethod::Put).json(review)?;
        self.request_as(&format!("/reviews/{review_id}/"), options)
            .await
    }

    pub async fn delete_review(&self, review_id: u64) -> Result<ApiResponse<()>, ApiError> {
        self.request(
            &format!("/reviews/{review_id}/"),
            RequestOptions::method(HttpMethod::Delete),
        )
        .await
        .map(unit)
    }

    // --- comments ---

    pub async fn comments(&self, params: Params<'_>) -> Result<ApiResponse<Vec<Comment>>, ApiError> {
        self.request_as(&query("/comments/", params), RequestOptions::get())
            .await
    }

    pub async fn comments_for_post(&self, post_id: u64) -> Result<ApiResponse<Vec<Comment>>, ApiError> {
        self.comments(&[("post", &post_id.to_string())]).await
    }

    pub async fn comment_thread(&self, comment_id: u64) -> Result<ApiResponse<Comment>, ApiError> {
        self.request_as(&format!("/comments/{comment_id}/thread/"), RequestOptions::get())
            .await
    }

    pub async fn create_comment(&self, input: &CommentInput) -> Result<ApiResponse<Comment>, ApiError> {
        let options = RequestOptions::method(HttpMethod::Post).json(input)?;
        self.request_as("/comments/", options).await
    }

    pub async fn update_comment(
        &self,
        comment_id: u64,
        input: &CommentInput,
    ) -> Result<ApiResponse<Comment>, ApiError> {
        let options = RequestOptions::method(HttpMethod::Put).json(input)?;
        self.request_as(&format!("/comments/{comment_id}/"), options)
            .await
    }

    pub async fn delete_comment(&self, comment_id: u64) -> Result<ApiResponse<()>, ApiError> {
        self.request(
            &format!("/comments/{comment_id}/"),
            RequestOptions::method(HttpMethod::Delete),
        )
        .await
        .map(unit)
    }

    // --- feeds ---

    pub async fn bookmarks(&self, params: Params<'_>) -> Result<ApiResponse<Vec<Value>>, ApiError> {
        self.request_as(&query("/bookmarks/", params), RequestOptions::get())
            .await
    }

    pub async fn featured(&self, params: Params<'_>) -> Result<ApiResponse<Vec<Value>>, ApiError> {
        self.request_as(&query("/featured/", params), RequestOptions::get())
            .await
    }

    pub async fn posts(&self) -> Result<ApiResponse<Vec<Value>>, ApiError> {
        self.request_as("/posts/", RequestOptions::get()).await
    }

    pub async fn create_post(&self, post: &Value) -> Result<ApiResponse<Value>, ApiError> {
        let options = RequestOptions::method(HttpMethod::Post).json(post)?;
        self.request_as("/posts/", options).await
    }

    // --- notifications ---

    pub async fn notifications(
        &self,
        params: Params<'_>,
    ) -> Result<ApiResponse<Vec<Notification>>, ApiError> {
        self.request_as(&query("/notifications/", params), RequestOptions::get())
            .await
    }

    pub async fn mark_notification_read(
        &self,
        notification_id: &str,
    ) -> Result<ApiResponse<Notification>, ApiError> {
        let options = RequestOptions::method(HttpMethod::Post).json(&json!({}))?;
        self.request_as(&format!("/notifications/{notification_id}/read/"), options)
            .await
    }

    pub async fn mark_all_notifications_read(&self) -> Result<ApiResponse<()>, ApiError> {
        let options = RequestOptions::method(HttpMethod::Post).json(&json!({}))?;
        self.request("/notifications/mark-all-read/", options)
            .await
            .map(unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::http::{Body, FormPart};
    use crate::pagination::StopReason;
    use crate::testing::{json, page, page_number, ScriptedTransport};
    use crate::token::{MemoryTokenStore, TokenPair};
    use crate::types::ChapterStatus;

    fn service(transport: Arc<ScriptedTransport>) -> ApiService {
        ApiService::new(
            "http://api.test/api",
            transport,
            Arc::new(MemoryTokenStore::with_pair(TokenPair::new("a", None))),
        )
    }

    #[tokio::test]
    async fn chapters_query_and_mapping() {
        let transport = ScriptedTransport::new(|_| {
            json(
                200,
                serde_json::json!({
                    "count": 1, "next": null, "previous": null,
                    "results": [{"id": 4, "title": "One", "is_published": false, "number": 1}]
                }),
            )
        });
        let api = service(transport.clone());

        let chapters = api
            .chapters(
                "dune",
                &ChapterQuery {
                    page: Some(2),
                    page_size: None,
                    status: Some(ChapterStatus::Draft),
                },
            )
            .await
            .unwrap();

        assert_eq!(chapters.data.len(), 1);
        assert_eq!(chapters.data[0].slug.as_deref(), Some("4"));
        assert_eq!(
            transport.requests()[0].url,
            "http://api.test/api/novels/dune/chapters/?page=2&status=draft"
        );
    }

    #[tokio::test]
    async fn cover_upload_is_multipart() {
        let transport = ScriptedTransport::new(|_| json(200, serde_json::json!({"cover_image": "x.png"})));
        let api = service(transport.clone());

        api.upload_novel_cover(
            9,
            CoverImage {
                file_name: "cover.png".to_string(),
                content_type: Some("image/png".to_string()),
                bytes: vec![1, 2, 3],
            },
        )
        .await
        .unwrap();

        let request = &transport.requests()[0];
        assert!(request.header("content-type").is_none());
        assert_eq!(request.bearer_token(), Some("a"));
        let Some(Body::Multipart(form)) = &request.body else {
            panic!("expected multipart body");
        };
        assert_eq!(
            form.parts[0],
            FormPart::Text {
                name: "novel_id".to_string(),
                value: "9".to_string()
            }
        );
        assert!(matches!(&form.parts[1], FormPart::File { name, .. } if name == "cover_image"));
    }

    #[tokio::test]
    async fn my_novels_without_a_list_is_empty() {
        let transport =
            ScriptedTransport::new(|_| json(200, serde_json::json!({"detail": "no novels yet"})));
        let api = service(transport);
        let novels = api.my_novels().await.unwrap();
        assert_eq!(novels.status, 200);
        assert!(novels.data.is_empty());
    }

    #[tokio::test]
    async fn delete_returns_unit_on_no_content() {
        let transport = ScriptedTransport::new(|_| {
            Ok(crate::http::HttpResponse {
                status: 204,
                reason: Some("No Content".to_string()),
                headers: Vec::new(),
                body: String::new(),
            })
        });
        let api = service(transport.clone());
        let response = api.delete_tag(5).await.unwrap();
        assert_eq!(response.status, 204);
        assert_eq!(transport.requests()[0].method, HttpMethod::Delete);
    }

    #[tokio::test]
    async fn genres_stop_at_their_cap() {
        let transport = ScriptedTransport::new(|req| page((page_number(req) - 1) * 10, 10));
        let api = service(transport.clone());

        let genres = api.genres(&[]).await.unwrap();
        assert_eq!(genres.items.len(), PagePolicy::GENRES.max_items);
        assert_eq!(genres.stop, StopReason::CapReached);
        assert_eq!(transport.requests().len(), 5);
    }

    #[tokio::test]
    async fn tags_forward_params_on_every_page() {
        let transport = ScriptedTransport::new(|req| match page_number(req) {
            1 => page(0, 10),
            _ => page(10, 2),
        });
        let api = service(transport.clone());

        let tags = api.tags(&[("search", "sci fi")]).await.unwrap();
        assert_eq!(tags.items.len(), 12);
        let urls: Vec<String> = transport.requests().into_iter().map(|r| r.url).collect();
        assert_eq!(
            urls,
            vec![
                "http://api.test/api/tags/?search=sci+fi",
                "http://api.test/api/tags/?search=sci+fi&page=2",
            ]
        );
    }

    #[tokio::test]
    async fn tag_listing_keeps_partial_results_on_server_error() {
        let transport = ScriptedTransport::new(|req| match page_number(req) {
            1 => page(0, 10),
            _ => json(503, serde_json::json!({"detail": "Service unavailable"})),
        });
        let api = service(transport);

        let failure = api.tags(&[]).await.unwrap_err();
        assert_eq!(failure.items.len(), 10);
        assert_eq!(failure.error.status, 503);
        assert_eq!(failure.error.message, "Service unavailable");
    }
}
