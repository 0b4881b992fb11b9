//! Apps, owner profiles and subscription limits.

use crate::error::{IngestError, IngestResult};
use crate::snapshot_cache::SnapshotCache;
use crate::types::{AccountId, AppId, SpreadsheetRef};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

const MAX_SLUG_LEN: usize = 48;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    #[default]
    Free,
    Maker,
    Pro,
}

impl SubscriptionTier {
    /// Maximum number of apps, `None` for unlimited.
    pub fn apps_limit(&self) -> Option<u32> {
        match self {
            Self::Free => Some(1),
            Self::Maker => Some(5),
            Self::Pro => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Maker => "maker",
            Self::Pro => "pro",
        }
    }
}

impl std::fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateType {
    #[default]
    Directory,
    Dashboard,
    Crm,
    Catalog,
    Portal,
    Custom,
}

/// Presentation toggles for the published page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    pub show_header: bool,
    pub show_footer: bool,
    pub enable_search: bool,
    pub enable_filters: bool,
    pub items_per_page: u32,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            show_header: true,
            show_footer: true,
            enable_search: true,
            enable_filters: true,
            items_per_page: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: AccountId,
    pub subscription_tier: SubscriptionTier,
    pub apps_created: u32,
    pub google_connected: bool,
    pub google_email: Option<String>,
    /// Set when the provider reported a spreadsheet as inaccessible.
    #[serde(default)]
    pub google_connection_broken: bool,
}

impl UserProfile {
    pub fn new(id: AccountId, subscription_tier: SubscriptionTier) -> Self {
        Self {
            id,
            subscription_tier,
            apps_created: 0,
            google_connected: false,
            google_email: None,
            google_connection_broken: false,
        }
    }

    pub fn can_create_app(&self) -> bool {
        self.subscription_tier
            .apps_limit()
            .is_none_or(|limit| self.apps_created < limit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct App {
    pub id: AppId,
    pub owner: AccountId,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub template_type: TemplateType,
    pub sheet: SpreadsheetRef,
    /// Display name of the spreadsheet, when known.
    pub sheet_name: Option<String>,
    #[serde(default)]
    pub settings: AppSettings,
    pub is_published: bool,
    pub views_count: u64,
    pub last_synced: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Input for [`AppDirectory::create_app`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewApp {
    pub name: String,
    pub description: Option<String>,
    pub template_type: TemplateType,
    pub sheet: SpreadsheetRef,
    pub sheet_name: Option<String>,
}

/// Persistence for apps and owner profiles.
#[async_trait]
pub trait AppRepository: Send + Sync {
    async fn app(&self, id: AppId) -> IngestResult<Option<App>>;
    async fn app_by_slug(&self, slug: &str) -> IngestResult<Option<App>>;
    async fn apps_for_owner(&self, owner: AccountId) -> IngestResult<Vec<App>>;
    async fn slug_taken(&self, slug: &str) -> IngestResult<bool>;
    async fn insert_app(&self, app: App) -> IngestResult<()>;
    async fn update_app(&self, app: App) -> IngestResult<()>;
    async fn delete_app(&self, id: AppId) -> IngestResult<bool>;

    /// Increments the view counter, returning the new count.
    async fn record_view(&self, id: AppId) -> IngestResult<u64>;
    async fn set_last_synced(&self, id: AppId, at: DateTime<Utc>) -> IngestResult<()>;

    async fn profile(&self, account: AccountId) -> IngestResult<Option<UserProfile>>;
    async fn save_profile(&self, profile: UserProfile) -> IngestResult<()>;
    async fn mark_connection_broken(&self, account: AccountId, broken: bool) -> IngestResult<()>;
}

/// Map-backed repository for tests and local runs.
#[derive(Clone, Default)]
pub struct InMemoryAppRepository {
    apps: Arc<RwLock<HashMap<AppId, App>>>,
    profiles: Arc<RwLock<HashMap<AccountId, UserProfile>>>,
}

impl InMemoryAppRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AppRepository for InMemoryAppRepository {
    async fn app(&self, id: AppId) -> IngestResult<Option<App>> {
        Ok(self.apps.read().await.get(&id).cloned())
    }

    async fn app_by_slug(&self, slug: &str) -> IngestResult<Option<App>> {
        Ok(self.apps.read().await.values().find(|a| a.slug == slug).cloned())
    }

    async fn apps_for_owner(&self, owner: AccountId) -> IngestResult<Vec<App>> {
        let mut apps: Vec<App> = self
            .apps
            .read()
            .await
            .values()
            .filter(|a| a.owner == owner)
            .cloned()
            .collect();
        apps.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(apps)
    }

    async fn slug_taken(&self, slug: &str) -> IngestResult<bool> {
        Ok(self.apps.read().await.values().any(|a| a.slug == slug))
    }

    async fn insert_app(&self, app: App) -> IngestResult<()> {
        let mut apps = self.apps.write().await;
        if apps.values().any(|a| a.slug == app.slug) {
            return Err(IngestError::Storage(format!("slug {} already in use", app.slug)));
        }
        apps.insert(app.id, app);
        Ok(())
    }

    async fn update_app(&self, app: App) -> IngestResult<()> {
        let mut apps = self.apps.write().await;
        match apps.get_mut(&app.id) {
            Some(existing) => {
                *existing = app;
                Ok(())
            }
            None => Err(IngestError::UnknownApp(app.id.to_string())),
        }
    }

    async fn delete_app(&self, id: AppId) -> IngestResult<bool> {
        Ok(self.apps.write().await.remove(&id).is_some())
    }

    async fn record_view(&self, id: AppId) -> IngestResult<u64> {
        let mut apps = self.apps.write().await;
        let app = apps
            .get_mut(&id)
            .ok_or_else(|| IngestError::UnknownApp(id.to_string()))?;
        app.views_count += 1;
        Ok(app.views_count)
    }

    async fn set_last_synced(&self, id: AppId, at: DateTime<Utc>) -> IngestResult<()> {
        let mut apps = self.apps.write().await;
        let app = apps
            .get_mut(&id)
            .ok_or_else(|| IngestError::UnknownApp(id.to_string()))?;
        app.last_synced = Some(at);
        Ok(())
    }

    async fn profile(&self, account: AccountId) -> IngestResult<Option<UserProfile>> {
        Ok(self.profiles.read().await.get(&account).cloned())
    }

    async fn save_profile(&self, profile: UserProfile) -> IngestResult<()> {
        self.profiles.write().await.insert(profile.id, profile);
        Ok(())
    }

    async fn mark_connection_broken(&self, account: AccountId, broken: bool) -> IngestResult<()> {
        let mut profiles = self.profiles.write().await;
        let profile = profiles
            .get_mut(&account)
            .ok_or_else(|| IngestError::UnknownAccount(account.to_string()))?;
        profile.google_connection_broken = broken;
        Ok(())
    }
}

/// Lowercase ASCII slug: alphanumerics kept, everything else collapsed to `-`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.truncate(MAX_SLUG_LEN);
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "app".to_string()
    } else {
        slug.to_string()
    }
}

/// App lifecycle operations that must keep the snapshot cache consistent.
pub struct AppDirectory {
    repo: Arc<dyn AppRepository>,
    cache: Arc<SnapshotCache>,
}

impl AppDirectory {
    pub fn new(repo: Arc<dyn AppRepository>, cache: Arc<SnapshotCache>) -> Self {
        Self { repo, cache }
    }

    /// Creates an unpublished app, enforcing the owner's tier limit.
    pub async fn create_app(&self, owner: AccountId, new_app: NewApp) -> IngestResult<App> {
        let mut profile = self
            .repo
            .profile(owner)
            .await?
            .ok_or_else(|| IngestError::UnknownAccount(owner.to_string()))?;

        if let Some(limit) = profile.subscription_tier.apps_limit() {
            if profile.apps_created >= limit {
                return Err(IngestError::AppLimitReached {
                    tier: profile.subscription_tier,
                    limit,
                });
            }
        }

        let slug = self.unique_slug(&new_app.name).await?;
        let app = App {
            id: AppId::new(),
            owner,
            name: new_app.name,
            slug,
            description: new_app.description,
            template_type: new_app.template_type,
            sheet: new_app.sheet,
            sheet_name: new_app.sheet_name,
            settings: AppSettings::default(),
            is_published: false,
            views_count: 0,
            last_synced: None,
            created_at: Utc::now(),
        };
        self.repo.insert_app(app.clone()).await?;

        profile.apps_created += 1;
        self.repo.save_profile(profile).await?;

        info!("created app {} ({}) for {owner}", app.slug, app.id);
        Ok(app)
    }

    async fn unique_slug(&self, name: &str) -> IngestResult<String> {
        let base = slugify(name);
        if !self.repo.slug_taken(&base).await? {
            return Ok(base);
        }
        for n in 2..=100u32 {
            let candidate = format!("{base}-{n}");
            if !self.repo.slug_taken(&candidate).await? {
                return Ok(candidate);
            }
        }
        let suffix = AppId::new().0.simple().to_string();
        Ok(format!("{base}-{}", &suffix[..8]))
    }

    pub async fn app(&self, id: AppId) -> IngestResult<App> {
        self.repo
            .app(id)
            .await?
            .ok_or_else(|| IngestError::UnknownApp(id.to_string()))
    }

    pub async fn set_published(&self, id: AppId, published: bool) -> IngestResult<App> {
        let mut app = self.app(id).await?;
        app.is_published = published;
        self.repo.update_app(app.clone()).await?;
        debug!("app {} published={published}", app.slug);
        Ok(app)
    }

    /// Points the app at a different spreadsheet or range and drops its snapshot.
    pub async fn replace_sheet(&self, id: AppId, sheet: SpreadsheetRef) -> IngestResult<App> {
        let mut app = self.app(id).await?;
        app.sheet = sheet;
        app.last_synced = None;
        self.repo.update_app(app.clone()).await?;
        self.cache.remove(id);
        info!("app {} now reads {}", app.slug, app.sheet.spreadsheet_id);
        Ok(app)
    }

    pub async fn update_settings(&self, id: AppId, settings: AppSettings) -> IngestResult<App> {
        let mut app = self.app(id).await?;
        app.settings = settings;
        self.repo.update_app(app.clone()).await?;
        Ok(app)
    }

    /// Deletes the app and its snapshot, freeing one slot of the owner's quota.
    pub async fn delete_app(&self, id: AppId) -> IngestResult<bool> {
        let Some(app) = self.repo.app(id).await? else {
            return Ok(false);
        };
        let removed = self.repo.delete_app(id).await?;
        self.cache.remove(id);
        if removed {
            if let Some(mut profile) = self.repo.profile(app.owner).await? {
                profile.apps_created = profile.apps_created.saturating_sub(1);
                self.repo.save_profile(profile).await?;
            }
            info!("deleted app {}", app.slug);
        }
        Ok(removed)
    }

    pub async fn apps_for_owner(&self, owner: AccountId) -> IngestResult<Vec<App>> {
        self.repo.apps_for_owner(owner).await
    }
}
