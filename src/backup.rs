//! Backup orchestration.
//!
//! The workflow is linear: resolve the current user, fetch all albums, and
//! for each album create its destination folder and walk its images, handing
//! each one to the downloader. Failures below the album-list level are
//! counted and skipped rather than aborting the run; a nonzero count turns
//! into an aggregate error once every album has been visited.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::api::pages::fetch_all_pages;
use crate::api::types::{
    Album, AlbumImage, AlbumImagesReply, AlbumsReply, CurrentUserReply, ImageMetadataReply,
    LargestVideoReply, UserReply,
};
use crate::api::{ApiClient, ApiError, RetryPolicy};
use crate::auth::OAuth1Signer;
use crate::config::Conf;
use crate::download::{DownloadError, Downloader};
use crate::files;
use crate::names::{NameError, NameTemplates};

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("error checking credentials: {0}")]
    Credentials(ApiError),
    #[error("error getting user albums: {0}")]
    Albums(ApiError),
    #[error("invalid naming template: {0}")]
    Templates(#[from] NameError),
    #[error("completed with {errors} errors, please check logs")]
    Completed { errors: u32 },
}

/// One item's recoverable failure; the album loop counts these and moves on.
#[derive(Debug, Error)]
enum ItemError {
    #[error("{0}: video still processing, skipping")]
    Processing(String),
    #[error("{0}: no largest-video URI reported")]
    MissingVideoUri(String),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Download(#[from] DownloadError),
    #[error("setting file times on {}: {source}", .path.display())]
    FileTimes {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub struct Backup {
    conf: Conf,
    api: ApiClient,
    templates: NameTemplates,
    dry_run: bool,
    errors: u32,
}

impl Backup {
    /// Build a backup worker from validated configuration.
    pub fn new(conf: Conf, dry_run: bool) -> Result<Self, BackupError> {
        let signer = OAuth1Signer::new(
            &conf.authentication.api_key,
            &conf.authentication.api_secret,
            &conf.authentication.user_token,
            &conf.authentication.user_secret,
        );
        let api = ApiClient::new(Arc::new(signer), RetryPolicy::default());
        Self::with_client(conf, api, dry_run)
    }

    /// Variant with an injected API client; tests point it at a local server.
    pub fn with_client(conf: Conf, api: ApiClient, dry_run: bool) -> Result<Self, BackupError> {
        let templates =
            NameTemplates::from_config(&conf.store.file_names, &conf.store.file_names_unique)?;
        Ok(Self {
            conf,
            api,
            templates,
            dry_run,
            errors: 0,
        })
    }

    /// Run the backup to completion.
    ///
    /// Failing to resolve the current user or the album list aborts
    /// immediately; everything below that granularity is counted and skipped.
    pub async fn run(&mut self) -> Result<(), BackupError> {
        self.errors = 0;

        let nickname = self
            .current_user()
            .await
            .map_err(BackupError::Credentials)?;

        info!("Getting albums for user {nickname}...");
        let albums = self
            .user_albums(&nickname)
            .await
            .map_err(BackupError::Albums)?;
        info!("Found {} albums", albums.len());

        for album in &albums {
            let folder = self.conf.destination().join(album.relative_path());

            if let Err(e) = files::create_folder(&folder) {
                error!(
                    "cannot create the destination folder {}: {e}",
                    folder.display()
                );
                self.errors += 1;
                continue;
            }

            debug!("[ALBUM IMAGES] {}", album.uris.album_images.uri);
            let images = match self.album_images(album).await {
                Ok(images) => images,
                Err(e) => {
                    error!(
                        "Cannot get album images for {}: {e}",
                        album.uris.album_images.uri
                    );
                    self.errors += 1;
                    continue;
                }
            };

            self.save_images(&images, &folder).await;
        }

        if self.errors > 0 {
            return Err(BackupError::Completed {
                errors: self.errors,
            });
        }
        info!("Backup completed.");
        Ok(())
    }

    async fn current_user(&self) -> Result<String, ApiError> {
        let reply: CurrentUserReply = self.api.get("/api/v2!authuser").await?;
        Ok(reply.response.user.nick_name)
    }

    /// The user's albums, across all pages.
    async fn user_albums(&self, nickname: &str) -> Result<Vec<Album>, ApiError> {
        let user: UserReply = self.api.get(&format!("/api/v2/user/{nickname}")).await?;
        fetch_all_pages::<AlbumsReply>(&self.api, &user.response.user.uris.user_albums.uri).await
    }

    /// One album's images, across all pages.
    async fn album_images(&self, album: &Album) -> Result<Vec<AlbumImage>, ApiError> {
        fetch_all_pages::<AlbumImagesReply>(&self.api, &album.uris.album_images.uri).await
    }

    /// Process one album's items in remote order, counting failures and
    /// continuing past them.
    async fn save_images(&mut self, images: &[AlbumImage], folder: &Path) {
        for image in images {
            if let Err(e) = image.build_filename(self.templates.primary.as_ref()) {
                warn!(
                    "Building filename for {}: {e}; falling back to {}",
                    image.image_key,
                    image.name()
                );
                self.errors += 1;
            }
            if let Err(e) = image.build_filename_unique(self.templates.fallback.as_ref()) {
                warn!(
                    "Building unique filename for {}: {e}; falling back to {}",
                    image.image_key,
                    image.name_unique()
                );
                self.errors += 1;
            }
            if image.name().is_empty() {
                warn!("Unable to find a valid name for {}, skipping", image.image_key);
                self.errors += 1;
                continue;
            }

            if let Err(e) = self.save_image(image, folder).await {
                error!("{e}");
                self.errors += 1;
            }
        }
    }

    /// Back up one item, returning whether a download actually happened.
    async fn save_image(&self, image: &AlbumImage, folder: &Path) -> Result<bool, ItemError> {
        let dest = folder.join(image.name());
        let dest_unique = folder.join(image.name_unique());
        let downloader = Downloader::new(&self.api, self.conf.match_policy(), self.dry_run);

        let downloaded = if image.is_video {
            if image.processing {
                return Err(ItemError::Processing(dest.display().to_string()));
            }
            let uri = &image.uris.largest_video.uri;
            if uri.is_empty() {
                return Err(ItemError::MissingVideoUri(dest.display().to_string()));
            }
            let video: LargestVideoReply = self.api.get(uri).await?;
            let largest = video.response.largest_video;
            downloader
                .resolve(
                    &dest,
                    &dest_unique,
                    &largest.url,
                    largest.size,
                    &image.archived_md5,
                )
                .await?
        } else {
            downloader
                .resolve(
                    &dest,
                    &dest_unique,
                    &image.archived_uri,
                    image.archived_size,
                    &image.archived_md5,
                )
                .await?
        };

        if self.conf.store.use_metadata_times
            && !self.dry_run
            && (downloaded || self.conf.store.force_metadata_times)
        {
            self.apply_metadata_times(image, &dest, &dest_unique).await?;
        }

        Ok(downloaded)
    }

    /// Mirror the remote timestamp onto the local file. The backup may live
    /// at either candidate path; whichever exists is the one to stamp.
    async fn apply_metadata_times(
        &self,
        image: &AlbumImage,
        dest: &Path,
        dest_unique: &Path,
    ) -> Result<(), ItemError> {
        let uri = &image.uris.image_metadata.uri;
        if uri.is_empty() {
            return Ok(());
        }
        let metadata: ImageMetadataReply = self.api.get(uri).await?;
        let body = metadata.response;
        let Some(stamp) = body.date_time_modified.or(body.date_time_created) else {
            debug!("No timestamps reported for {}", image.name());
            return Ok(());
        };

        let target = if dest.exists() { dest } else { dest_unique };
        let times = std::fs::FileTimes::new()
            .set_accessed(stamp.into())
            .set_modified(stamp.into());
        std::fs::File::options()
            .write(true)
            .open(target)
            .and_then(|file| file.set_times(times))
            .map_err(|source| ItemError::FileTimes {
                path: target.to_path_buf(),
                source,
            })?;
        debug!("Set file times of {} to {stamp}", target.display());
        Ok(())
    }
}
