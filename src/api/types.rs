//! JSON envelopes for the SmugMug v2 API.
//!
//! Responses arrive wrapped in a `Response` object; list endpoints add a
//! `Pages.NextPage` cursor. Missing fields decode to their defaults, matching
//! the server's habit of omitting empty values.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use serde::Deserialize;

use super::pages::Page;
use crate::names::{NameError, NameVars, RenderName};

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct UriRef {
    pub uri: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct Pages {
    pub next_page: String,
}

/// `GET /api/v2!authuser`
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct CurrentUserReply {
    pub response: CurrentUserBody,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct CurrentUserBody {
    pub user: CurrentUser,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct CurrentUser {
    pub nick_name: String,
}

/// `GET /api/v2/user/{nickname}` — only the albums URI matters here.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct UserReply {
    pub response: UserBody,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct UserBody {
    pub user: User,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct User {
    pub uris: UserUris,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct UserUris {
    pub user_albums: UriRef,
}

/// One page of the user's albums.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct AlbumsReply {
    pub response: AlbumsBody,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct AlbumsBody {
    pub album: Vec<Album>,
    pub pages: Pages,
}

impl Page for AlbumsReply {
    type Record = Album;

    fn into_page(self) -> (Vec<Album>, Option<String>) {
        (self.response.album, Some(self.response.pages.next_page))
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct Album {
    pub url_path: String,
    pub uris: AlbumUris,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct AlbumUris {
    pub album_images: UriRef,
}

impl Album {
    /// The album's destination folder relative to the backup root. `UrlPath`
    /// is a rooted URL path like `/Travel/Paris`; joined naively it would
    /// replace the backup root, so split it into components instead.
    pub fn relative_path(&self) -> PathBuf {
        let mut path = PathBuf::new();
        for component in self.url_path.split('/') {
            if !component.is_empty() {
                path.push(component);
            }
        }
        path
    }
}

/// One page of an album's media items.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct AlbumImagesReply {
    pub response: AlbumImagesBody,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct AlbumImagesBody {
    pub album_image: Vec<AlbumImage>,
    pub pages: Pages,
}

impl Page for AlbumImagesReply {
    type Record = AlbumImage;

    fn into_page(self) -> (Vec<AlbumImage>, Option<String>) {
        (
            self.response.album_image,
            Some(self.response.pages.next_page),
        )
    }
}

/// A photo or video in an album. `image_key` is the stable remote identity;
/// `file_name` is the human name and may be absent.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct AlbumImage {
    pub file_name: String,
    pub image_key: String,
    #[serde(rename = "ArchivedMD5")]
    pub archived_md5: String,
    pub archived_size: u64,
    pub archived_uri: String,
    pub is_video: bool,
    pub processing: bool,
    pub upload_key: String,
    pub uris: ImageUris,

    // Rendered at most once per item, then reused for every path decision.
    #[serde(skip)]
    built_filename: OnceCell<String>,
    #[serde(skip)]
    built_filename_unique: OnceCell<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct ImageUris {
    pub image_metadata: UriRef,
    pub largest_video: UriRef,
}

impl AlbumImage {
    fn vars(&self) -> NameVars<'_> {
        NameVars {
            file_name: &self.file_name,
            image_key: &self.image_key,
            archived_md5: &self.archived_md5,
            upload_key: &self.upload_key,
        }
    }

    /// Render and cache the primary file name.
    pub fn build_filename(&self, template: &dyn RenderName) -> Result<&str, NameError> {
        self.built_filename
            .get_or_try_init(|| template.render(&self.vars()))
            .map(String::as_str)
    }

    /// Render and cache the collision-resistant fallback name.
    pub fn build_filename_unique(&self, template: &dyn RenderName) -> Result<&str, NameError> {
        self.built_filename_unique
            .get_or_try_init(|| template.render(&self.vars()))
            .map(String::as_str)
    }

    /// The item's working name: the rendered name when available, else the
    /// remote file name, else the image key as last-resort identity.
    pub fn name(&self) -> &str {
        if let Some(built) = self.built_filename.get() {
            return built;
        }
        if !self.file_name.is_empty() {
            return &self.file_name;
        }
        &self.image_key
    }

    /// The fallback name, with the image key as last-resort identity.
    pub fn name_unique(&self) -> &str {
        match self.built_filename_unique.get() {
            Some(built) => built,
            None => &self.image_key,
        }
    }
}

/// `GET` of an image's metadata URI, used for timestamp enrichment.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct ImageMetadataReply {
    pub response: ImageMetadataBody,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct ImageMetadataBody {
    pub date_time_created: Option<DateTime<Utc>>,
    pub date_time_modified: Option<DateTime<Utc>>,
}

/// `GET` of a video item's largest-video URI; videos are downloaded from the
/// URL reported here rather than from the archived URI.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct LargestVideoReply {
    pub response: LargestVideoBody,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct LargestVideoBody {
    pub largest_video: LargestVideo,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct LargestVideo {
    pub size: u64,
    pub url: String,
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::names::TokenTemplate;

    #[test]
    fn test_decode_current_user() {
        let reply: CurrentUserReply = serde_json::from_str(
            r#"{"Response": {"User": {"NickName": "cmac"}}}"#,
        )
        .unwrap();
        assert_eq!(reply.response.user.nick_name, "cmac");
    }

    #[test]
    fn test_decode_user_albums_uri() {
        let reply: UserReply = serde_json::from_str(
            r#"{"Response": {"User": {"Uris": {"UserAlbums": {"Uri": "/api/v2/user/cmac!albums"}}}}}"#,
        )
        .unwrap();
        assert_eq!(
            reply.response.user.uris.user_albums.uri,
            "/api/v2/user/cmac!albums"
        );
    }

    #[test]
    fn test_decode_albums_page() {
        let reply: AlbumsReply = serde_json::from_str(
            r#"{
                "Response": {
                    "Album": [
                        {"UrlPath": "/Travel/Paris", "Uris": {"AlbumImages": {"Uri": "/api/v2/album/abc!images"}}}
                    ],
                    "Pages": {"NextPage": "/api/v2/user/cmac!albums?start=2"}
                }
            }"#,
        )
        .unwrap();
        let (albums, next) = reply.into_page();
        assert_eq!(albums.len(), 1);
        assert_eq!(albums[0].url_path, "/Travel/Paris");
        assert_eq!(albums[0].uris.album_images.uri, "/api/v2/album/abc!images");
        assert_eq!(next.as_deref(), Some("/api/v2/user/cmac!albums?start=2"));
    }

    #[test]
    fn test_decode_albums_page_without_cursor() {
        let reply: AlbumsReply =
            serde_json::from_str(r#"{"Response": {"Album": []}}"#).unwrap();
        let (albums, next) = reply.into_page();
        assert!(albums.is_empty());
        assert_eq!(next.as_deref(), Some(""));
    }

    #[test]
    fn test_decode_album_image_fields() {
        let reply: AlbumImagesReply = serde_json::from_str(
            r#"{
                "Response": {
                    "AlbumImage": [{
                        "FileName": "photo.jpg",
                        "ImageKey": "AbC123",
                        "ArchivedMD5": "0123abc",
                        "ArchivedSize": 1024,
                        "ArchivedUri": "https://photos.example.com/photo.jpg",
                        "IsVideo": false,
                        "Processing": false,
                        "UploadKey": "99",
                        "Uris": {
                            "ImageMetadata": {"Uri": "/api/v2/image/AbC123!metadata"},
                            "LargestVideo": {"Uri": ""}
                        }
                    }],
                    "Pages": {"NextPage": ""}
                }
            }"#,
        )
        .unwrap();
        let (images, next) = reply.into_page();
        assert_eq!(next.as_deref(), Some(""));
        let image = &images[0];
        assert_eq!(image.file_name, "photo.jpg");
        assert_eq!(image.image_key, "AbC123");
        assert_eq!(image.archived_md5, "0123abc");
        assert_eq!(image.archived_size, 1024);
        assert!(!image.is_video);
    }

    #[test]
    fn test_album_relative_path_strips_leading_slash() {
        let album = Album {
            url_path: "/Travel/Paris".to_string(),
            ..Album::default()
        };
        assert_eq!(album.relative_path(), PathBuf::from("Travel/Paris"));
    }

    #[test]
    fn test_name_prefers_built_then_file_name_then_key() {
        let image = AlbumImage {
            file_name: "photo.jpg".to_string(),
            image_key: "AbC123".to_string(),
            ..AlbumImage::default()
        };
        assert_eq!(image.name(), "photo.jpg");

        let template = TokenTemplate::parse("{{.ImageKey}}-{{.FileName}}").unwrap();
        image.build_filename(&template).unwrap();
        assert_eq!(image.name(), "AbC123-photo.jpg");

        let nameless = AlbumImage {
            image_key: "AbC123".to_string(),
            ..AlbumImage::default()
        };
        assert_eq!(nameless.name(), "AbC123");
    }

    #[test]
    fn test_name_unique_falls_back_to_key() {
        let image = AlbumImage {
            file_name: "photo.jpg".to_string(),
            image_key: "AbC123".to_string(),
            ..AlbumImage::default()
        };
        assert_eq!(image.name_unique(), "AbC123");
    }

    #[test]
    fn test_names_render_at_most_once() {
        struct CountingTemplate(AtomicU32);
        impl RenderName for CountingTemplate {
            fn render(&self, vars: &NameVars<'_>) -> Result<String, NameError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(vars.file_name.to_string())
            }
        }

        let image = AlbumImage {
            file_name: "photo.jpg".to_string(),
            image_key: "AbC123".to_string(),
            ..AlbumImage::default()
        };
        let template = CountingTemplate(AtomicU32::new(0));
        assert_eq!(image.build_filename(&template).unwrap(), "photo.jpg");
        assert_eq!(image.build_filename(&template).unwrap(), "photo.jpg");
        assert_eq!(template.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_decode_largest_video() {
        let reply: LargestVideoReply = serde_json::from_str(
            r#"{"Response": {"LargestVideo": {"Size": 2048, "Url": "https://videos.example.com/v.mp4"}}}"#,
        )
        .unwrap();
        assert_eq!(reply.response.largest_video.size, 2048);
        assert_eq!(reply.response.largest_video.url, "https://videos.example.com/v.mp4");
    }

    #[test]
    fn test_decode_image_metadata_timestamps() {
        let reply: ImageMetadataReply = serde_json::from_str(
            r#"{"Response": {"DateTimeCreated": "2024-05-01T10:00:00Z", "DateTimeModified": "2024-06-01T12:30:00Z"}}"#,
        )
        .unwrap();
        let body = reply.response;
        assert!(body.date_time_created.is_some());
        assert!(body.date_time_modified.is_some());
        assert!(body.date_time_modified > body.date_time_created);
    }
}
