//! Avatar lookup seam.
//!
//! Avatars come from outside the identity layer (page scraping, a cache).
//! Profile queries load them best-effort: a failed fetch leaves the view
//! without an avatar and never fails the query.

use std::future::Future;

use bytes::Bytes;
use thiserror::Error;

use crate::identifier::ProfileIdentifier;

/// Why an avatar could not be fetched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AvatarError {
    /// The source has no avatar for this profile
    #[error("no avatar for {0}")]
    Missing(ProfileIdentifier),

    /// The source failed
    #[error("avatar fetch failed: {0}")]
    Fetch(String),
}

/// Supplies profile avatar images.
pub trait AvatarSource: Clone + Send + Sync + 'static {
    /// Fetch the avatar image bytes for `profile`.
    fn fetch_avatar(
        &self,
        profile: &ProfileIdentifier,
    ) -> impl Future<Output = Result<Bytes, AvatarError>> + Send;
}

/// Source with no avatars; every fetch reports `Missing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAvatars;

impl AvatarSource for NoAvatars {
    fn fetch_avatar(
        &self,
        profile: &ProfileIdentifier,
    ) -> impl Future<Output = Result<Bytes, AvatarError>> + Send {
        let missing = AvatarError::Missing(profile.clone());
        async move { Err(missing) }
    }
}
