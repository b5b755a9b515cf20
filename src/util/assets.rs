use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, RwLock, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace, warn};

use crate::constants::EMOTE_CDN_URL;
use crate::parsing::tags::{Badge, ChatMessage};
use crate::util::helix::{Helix, HelixBadgeSet, HelixErr};
use crate::util::viewer::Viewer;

pub type AssetResult<T> = core::result::Result<T, AssetError>;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("while fetching asset: {0}")]
    Helix(#[from] HelixErr),

    #[error("while writing asset to disk: {0}")]
    Io(#[from] std::io::Error),

    #[error("viewer '{0}' has no profile image")]
    NoProfileImage(String),
}

/// `set id → version → icon url`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BadgeIconIndex {
    sets: HashMap<String, HashMap<String, String>>,
}

impl BadgeIconIndex {
    pub fn from_sets(sets: Vec<HelixBadgeSet>) -> Self {
        let mut index = Self::default();
        index.extend(sets);
        index
    }

    /// Later sets replace earlier versions with the same id, so channel badges override globals
    pub fn extend(&mut self, sets: Vec<HelixBadgeSet>) {
        for set in sets {
            let versions = self.sets.entry(set.set_id).or_default();
            for version in set.versions {
                versions.insert(version.id, version.image_url_1x);
            }
        }
    }

    pub fn icon_url(&self, set_id: &str, version: &str) -> Option<&str> {
        self.sets
            .get(set_id)
            .and_then(|versions| versions.get(version))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sets.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A cached asset's location, plus the download writing it when it was not yet on disk
#[derive(Debug)]
pub struct CachedAsset {
    pub path: PathBuf,
    pub download: Option<JoinHandle<()>>,
}

/// On-disk cache for badge, emote and profile images
///
/// Paths are a pure function of the asset key. A file already present is reused without any
/// network call; a missing one is downloaded once, even when several lines ask for it before the
/// first download lands. Each completed write is announced on the content-changed channel.
#[derive(Debug, Clone)]
pub struct AssetCache {
    root: PathBuf,
    emote_cdn: String,
    helix: Arc<Helix>,
    index: Arc<RwLock<BadgeIconIndex>>,
    in_flight: Arc<Mutex<HashSet<PathBuf>>>,
    changed: broadcast::Sender<PathBuf>,
}

impl AssetCache {
    pub fn new(root: impl AsRef<Path>, helix: Arc<Helix>) -> Self {
        let (changed, _) = broadcast::channel(64);

        Self {
            root: root.as_ref().to_path_buf(),
            emote_cdn: EMOTE_CDN_URL.to_string(),
            helix,
            index: Arc::new(RwLock::new(BadgeIconIndex::default())),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            changed,
        }
    }

    pub fn with_emote_cdn(mut self, base: &str) -> Self {
        self.emote_cdn = base.trim_end_matches('/').to_string();
        self
    }

    /// Receives the path of every asset written from now on
    pub fn subscribe(&self) -> broadcast::Receiver<PathBuf> {
        self.changed.subscribe()
    }

    pub fn badge_path(&self, badge: &Badge) -> PathBuf {
        self.root
            .join("badges")
            .join(encode_key(&badge.name))
            .join(format!("{}.png", encode_key(&badge.version)))
    }

    pub fn emote_path(&self, emote_id: &str) -> PathBuf {
        self.root
            .join("emotes")
            .join(format!("{}.png", encode_key(emote_id)))
    }

    pub fn profile_path(&self, viewer: &Viewer) -> PathBuf {
        self.root
            .join("profiles")
            .join(format!("{}.png", encode_key(&viewer.id)))
    }

    /// Replaces the badge index with a fresh fetch of global (and, given an id, channel) badges
    ///
    /// Only a failed global fetch is an error; the old index is then left untouched.
    #[instrument(skip(self))]
    pub async fn refresh_badges(&self, broadcaster_id: Option<&str>) -> AssetResult<usize> {
        let mut index = BadgeIconIndex::from_sets(self.helix.fetch_global_badges().await?);

        if let Some(id) = broadcaster_id {
            match self.helix.fetch_channel_badges(id).await {
                Ok(sets) => index.extend(sets),
                Err(e) => warn!(error = %e, "channel badges unavailable, keeping global badges"),
            }
        }

        let count = index.len();
        *self.index.write().await = index;

        info!(badge_count = count, "badge index refreshed");
        Ok(count)
    }

    pub async fn set_index(&self, index: BadgeIconIndex) {
        *self.index.write().await = index;
    }

    /// Locates (and if needed fetches) the icon for `badge`; `None` when the index has no url
    pub async fn badge_icon(&self, badge: &Badge) -> Option<CachedAsset> {
        let url = {
            let index = self.index.read().await;
            index.icon_url(&badge.name, &badge.version)?.to_string()
        };

        let path = self.badge_path(badge);
        let download = self.fetch_if_missing(&path, url).await;
        Some(CachedAsset { path, download })
    }

    pub async fn emote_icon(&self, emote_id: &str) -> CachedAsset {
        let url = format!("{}/{}/default/dark/1.0", self.emote_cdn, emote_id);
        let path = self.emote_path(emote_id);

        let download = self.fetch_if_missing(&path, url).await;
        CachedAsset { path, download }
    }

    /// Fills in the icon paths of a freshly decoded chat line
    ///
    /// Paths are assigned straight away; icons still downloading show up once content-changed
    /// fires for them.
    pub async fn decorate(&self, mut chat: ChatMessage) -> ChatMessage {
        for badge in &chat.badges {
            match self.badge_icon(badge).await {
                Some(asset) => chat.badge_icon_paths.push(asset.path),
                None => trace!(badge = %badge.name, version = %badge.version, "no icon for badge"),
            }
        }

        for emote in chat.emotes.iter_mut() {
            emote.path = Some(self.emote_icon(&emote.id).await.path);
        }

        chat
    }

    /// Downloads a viewer's profile image on demand, reusing a cached copy
    #[instrument(skip(self, viewer), fields(viewer = %viewer.name))]
    pub async fn profile_image(&self, viewer: &Viewer) -> AssetResult<PathBuf> {
        if viewer.profile_image_url.is_empty() {
            return Err(AssetError::NoProfileImage(viewer.name.clone()));
        }

        let path = self.profile_path(viewer);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            trace!(path = %path.display(), "profile image cached");
            return Ok(path);
        }

        let bytes = self.helix.download(&viewer.profile_image_url).await?;
        write_asset(&path, &bytes).await?;
        let _ = self.changed.send(path.clone());

        Ok(path)
    }

    async fn fetch_if_missing(&self, path: &Path, url: String) -> Option<JoinHandle<()>> {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            trace!(path = %path.display(), "asset cached");
            return None;
        }

        if !self.in_flight.lock().await.insert(path.to_path_buf()) {
            debug!(path = %path.display(), "asset download already in flight");
            return None;
        }

        let path = path.to_path_buf();
        let helix = self.helix.clone();
        let in_flight = self.in_flight.clone();
        let changed = self.changed.clone();

        Some(tokio::spawn(async move {
            match helix.download(&url).await {
                // another writer may have landed while this one was in flight
                Ok(_) if tokio::fs::try_exists(&path).await.unwrap_or(false) => {
                    debug!(path = %path.display(), "asset appeared during download");
                }
                Ok(bytes) => match write_asset(&path, &bytes).await {
                    Ok(()) => {
                        debug!(path = %path.display(), bytes = bytes.len(), "asset cached");
                        let _ = changed.send(path.clone());
                    }
                    Err(e) => warn!(path = %path.display(), error = %e, "failed to write asset"),
                },
                Err(e) => warn!(%url, error = %e, "failed to download asset"),
            }

            in_flight.lock().await.remove(&path);
        }))
    }
}

async fn write_asset(path: &Path, bytes: &[u8]) -> AssetResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    tokio::fs::write(path, bytes).await?;
    Ok(())
}

/// Percent-encodes every byte outside `[A-Za-z0-9_-]`
///
/// The result is a single path component, and distinct keys never share one.
fn encode_key(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' => encoded.push(byte as char),
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }

    encoded
}
