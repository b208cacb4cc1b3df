//! DataStore facade.
//!
//! Owns every entity store, the page-view and user-visit counters, the site
//! config, and the snapshot file. One JSON file holds the whole database:
//!
//! ```json
//! {"pv": 12, "uv": 3, "conf": {...},
//!  "user": {"data": [...], "next": 4}, "attach": {...}, "hook": {...},
//!  "layer": {...}, "map": {...}, "link": {...}, "tabs": {...}}
//! ```
//!
//! Mutations mark the store dirty. A background thread flushes dirty data
//! every `save_interval`; [`DataStore::request_flush`] flushes sooner, at
//! most once per `flush_rate_limit`.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::dirty::DirtyTracker;
use crate::error::{Result, StoreError};
use crate::model::user::DEFAULT_HASH_COST;
use crate::model::{
    is_zero_u64, AttachId, Attachment, BaseMap, HookConfig, HookId, LayerGroup, LayerId, Link, LinkId,
    LinkOrder, MapId, TabData, TabId, TmplIndex, User, UserId, VersionKind,
};
use crate::snapshot::StoreBlock;
use crate::store::{AttachStore, HookStore, LayerStore, LinkStore, MapStore, TabStore, UserStore};
use crate::token::{RandomTokens, TokenSource};

// ============================================================================
// OPTIONS
// ============================================================================

/// Construction-time settings for a [`DataStore`].
#[derive(Clone)]
pub struct StoreOptions {
    save_interval: Duration,
    flush_rate_limit: Duration,
    password_cost: u32,
    clock: Arc<dyn Clock>,
    tokens: Arc<dyn TokenSource>,
}

impl StoreOptions {
    pub fn new() -> Self {
        Self {
            save_interval: Duration::from_secs(180),
            flush_rate_limit: Duration::from_secs(30),
            password_cost: DEFAULT_HASH_COST,
            clock: Arc::new(SystemClock),
            tokens: Arc::new(RandomTokens),
        }
    }

    /// How often the background saver checks for unsaved changes.
    pub fn save_interval(mut self, interval: Duration) -> Self {
        self.save_interval = interval;
        self
    }

    /// Minimum gap between two on-demand flushes.
    pub fn flush_rate_limit(mut self, limit: Duration) -> Self {
        self.flush_rate_limit = limit;
        self
    }

    /// bcrypt cost for new password hashes.
    pub fn password_cost(mut self, cost: u32) -> Self {
        self.password_cost = cost;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn token_source(mut self, tokens: Arc<dyn TokenSource>) -> Self {
        self.tokens = tokens;
        self
    }
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// SNAPSHOT FILE
// ============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
struct DatabaseFile {
    #[serde(default, skip_serializing_if = "is_zero_u64")]
    pv: u64,
    #[serde(default, skip_serializing_if = "is_zero_u64")]
    uv: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    conf: Option<TmplIndex>,
    #[serde(default)]
    user: StoreBlock<User>,
    #[serde(default)]
    attach: StoreBlock<Attachment>,
    #[serde(default)]
    hook: StoreBlock<HookConfig>,
    #[serde(default)]
    layer: StoreBlock<LayerGroup>,
    #[serde(default)]
    map: StoreBlock<BaseMap>,
    #[serde(default)]
    link: StoreBlock<Link>,
    #[serde(default)]
    tabs: StoreBlock<TabData>,
}

/// Read a snapshot. A missing or blank file is a fresh database.
fn read_snapshot(path: &Path) -> Result<DatabaseFile> {
    let buf = match fs::read(path) {
        Ok(buf) => buf,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::info!("no database at {}, starting empty", path.display());
            return Ok(DatabaseFile::default());
        }
        Err(e) => {
            log::error!("Failed to read database {}: {}", path.display(), e);
            return Err(e.into());
        }
    };
    if buf.iter().all(u8::is_ascii_whitespace) {
        return Ok(DatabaseFile::default());
    }
    serde_json::from_slice(&buf).map_err(|e| {
        log::error!("Failed to parse database {}: {}", path.display(), e);
        StoreError::from(e)
    })
}

/// Write-then-rename so a crash mid-write leaves the previous snapshot.
fn write_snapshot(path: &Path, db: &DatabaseFile) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_vec(db)?;

    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp_path = PathBuf::from(temp);

    fs::write(&temp_path, json)?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

struct Saver {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

// ============================================================================
// DATASTORE
// ============================================================================

pub struct DataStore {
    users: UserStore,
    attachments: AttachStore,
    hooks: HookStore,
    layers: LayerStore,
    maps: MapStore,
    links: LinkStore,
    tabs: TabStore,

    page_views: AtomicU64,
    user_visits: AtomicU64,

    config: ArcSwapOption<TmplIndex>,
    config_write: Mutex<()>,

    /// Break-glass accounts, never persisted. Keyed by account.
    shadow_users: RwLock<BTreeMap<String, User>>,

    dirty: DirtyTracker,
    /// Snapshot path once opened. Held for the whole of open and flush.
    file: Mutex<Option<PathBuf>>,
    saver: Mutex<Option<Saver>>,

    options: StoreOptions,
}

impl DataStore {
    pub fn new(options: StoreOptions) -> Self {
        Self {
            users: UserStore::new(),
            attachments: AttachStore::with_token_source(options.tokens.clone()),
            hooks: HookStore::with_token_source(options.tokens.clone()),
            layers: LayerStore::new(),
            maps: MapStore::new(),
            links: LinkStore::new(),
            tabs: TabStore::new(),
            page_views: AtomicU64::new(0),
            user_visits: AtomicU64::new(0),
            config: ArcSwapOption::empty(),
            config_write: Mutex::new(()),
            shadow_users: RwLock::new(BTreeMap::new()),
            dirty: DirtyTracker::new(options.flush_rate_limit),
            file: Mutex::new(None),
            saver: Mutex::new(None),
            options,
        }
    }

    /// Current time from the configured clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.options.clock.now()
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Load the snapshot at `path` and start the background saver.
    ///
    /// Fails on unreadable, malformed or corrupt snapshots; the store must
    /// not be used after a failed open.
    pub fn open(self: &Arc<Self>, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref().to_path_buf();
        let mut file = lock(&self.file);
        if let Some(current) = file.as_ref() {
            return Err(StoreError::AlreadyExists {
                kind: "database",
                key: current.display().to_string(),
            });
        }

        let db = read_snapshot(&path)?;
        self.load(db)?;
        *file = Some(path.clone());
        drop(file);

        self.spawn_saver();
        log::info!(
            "opened {}: {} users, {} attachments, {} hooks, {} layers, {} maps, {} links, {} tabs",
            path.display(),
            self.users.len(),
            self.attachments.len(),
            self.hooks.len(),
            self.layers.len(),
            self.maps.len(),
            self.links.len(),
            self.tabs.len()
        );
        Ok(())
    }

    fn load(&self, db: DatabaseFile) -> Result<()> {
        self.users.load_block(db.user)?;
        self.attachments.load_block(db.attach)?;
        self.hooks.load_block(db.hook)?;
        self.layers.load_block(db.layer)?;
        self.maps.load_block(db.map)?;
        self.links.load_block(db.link)?;
        self.tabs.load_block(db.tabs)?;

        self.page_views.store(db.pv, Ordering::SeqCst);
        self.user_visits.store(db.uv, Ordering::SeqCst);
        self.config.store(db.conf.map(Arc::new));
        Ok(())
    }

    fn spawn_saver(self: &Arc<Self>) {
        let (stop, stopped) = mpsc::channel::<()>();
        let store: Weak<DataStore> = Arc::downgrade(self);
        let interval = self.options.save_interval;

        let handle = thread::spawn(move || loop {
            match stopped.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {}
                // Stop requested or the facade was dropped
                _ => break,
            }
            let Some(store) = store.upgrade() else {
                break;
            };
            if store.is_dirty() {
                if let Err(e) = store.flush() {
                    log::error!("Background flush failed: {}", e);
                }
            }
        });

        *lock(&self.saver) = Some(Saver { stop, handle });
    }

    /// Stop the saver and write a final snapshot. Safe to call repeatedly.
    pub fn close(&self) -> Result<()> {
        let Some(saver) = lock(&self.saver).take() else {
            return Ok(());
        };
        let _ = saver.stop.send(());
        if saver.handle.join().is_err() {
            log::error!("background saver panicked");
        }
        let result = self.flush();
        log::info!("database closed");
        result
    }

    /// Serialize everything and replace the snapshot file.
    ///
    /// Does nothing (with a warning) before [`DataStore::open`].
    pub fn flush(&self) -> Result<()> {
        let file = lock(&self.file);
        let Some(path) = file.as_ref() else {
            log::warn!("flush requested before the database was opened");
            return Ok(());
        };

        self.dirty.take_dirty();
        let db = self.snapshot();
        match write_snapshot(path, &db) {
            Ok(()) => {
                log::debug!("flushed database to {}", path.display());
                Ok(())
            }
            Err(e) => {
                self.dirty.set_dirty();
                log::error!("Failed to write database {}: {}", path.display(), e);
                Err(e)
            }
        }
    }

    fn snapshot(&self) -> DatabaseFile {
        DatabaseFile {
            pv: self.page_view(),
            uv: self.user_visit(),
            conf: self.config.load_full().map(|c| (*c).clone()),
            user: self.users.to_block(),
            attach: self.attachments.to_block(),
            hook: self.hooks.to_block(),
            layer: self.layers.to_block(),
            map: self.maps.to_block(),
            link: self.links.to_block(),
            tabs: self.tabs.to_block(),
        }
    }

    pub fn flag_dirty(&self) {
        self.dirty.set_dirty();
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.is_dirty()
    }

    /// Flush now if the rate limit allows, otherwise leave it to the saver.
    pub fn request_flush(&self) -> Result<()> {
        if self.dirty.can_flush() {
            self.flush()
        } else {
            log::debug!("flush deferred by rate limit");
            Ok(())
        }
    }

    /// Flag dirty (and bump `bump`) when a mutation went through.
    fn changed<R>(&self, result: Result<R>, bump: Option<VersionKind>) -> Result<R> {
        if result.is_ok() {
            self.flag_dirty();
            if let Some(kind) = bump {
                self.bump_version(kind);
            }
        }
        result
    }

    // ------------------------------------------------------------------------
    // Counters
    // ------------------------------------------------------------------------

    pub fn page_view(&self) -> u64 {
        self.page_views.load(Ordering::Relaxed)
    }

    /// Count a page view and return the new total.
    pub fn add_page_view(&self) -> u64 {
        self.page_views.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn user_visit(&self) -> u64 {
        self.user_visits.load(Ordering::Relaxed)
    }

    pub fn add_user_visit(&self) -> u64 {
        self.user_visits.fetch_add(1, Ordering::Relaxed) + 1
    }

    // ------------------------------------------------------------------------
    // Site config
    // ------------------------------------------------------------------------

    /// The current site config, or [`TmplIndex::site_default`] if none was
    /// ever set.
    pub fn config(&self) -> Arc<TmplIndex> {
        self.config
            .load_full()
            .unwrap_or_else(|| Arc::new(TmplIndex::site_default()))
    }

    pub fn set_config(&self, conf: TmplIndex) {
        let _guard = lock(&self.config_write);
        self.config.store(Some(Arc::new(conf)));
        self.flag_dirty();
    }

    /// Edit a copy of the config, bump the `kind` stamp, and publish it.
    pub fn update_config(&self, kind: VersionKind, f: impl FnOnce(&mut TmplIndex)) {
        let _guard = lock(&self.config_write);
        let mut conf = (*self.config()).clone();
        f(&mut conf);
        conf.bump(kind, self.now());
        self.config.store(Some(Arc::new(conf)));
        self.flag_dirty();
    }

    pub fn bump_version(&self, kind: VersionKind) {
        self.update_config(kind, |_| {});
    }

    // ------------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------------

    /// Register a break-glass super user that lives only in memory.
    pub fn add_shadow_user(&self, acc: &str, pwd: &str) -> Result<()> {
        let mut user = User {
            is_super: true,
            note: "not persisted".to_string(),
            ..User::new(acc, "shadow super user")
        };
        user.set_password(pwd, self.options.password_cost)?;
        self.shadow_users
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(acc.to_string(), user);
        Ok(())
    }

    fn shadow_user(&self, acc: Option<&str>) -> Option<User> {
        let shadow = self.shadow_users.read().unwrap_or_else(|e| e.into_inner());
        match acc {
            Some(acc) => shadow.get(acc).cloned(),
            None => shadow.values().next().cloned(),
        }
    }

    /// Shadow users win over stored accounts.
    pub fn get_user_by_acc(&self, acc: &str) -> Option<User> {
        self.shadow_user(Some(acc))
            .or_else(|| self.users.get_by_acc(acc))
    }

    /// ID 0 resolves to a shadow user, if one is registered.
    pub fn get_user_by_uid(&self, uid: UserId) -> Option<User> {
        if uid == 0 {
            return self.shadow_user(None);
        }
        self.users.get_by_id(uid)
    }

    /// The account for `acc` if `pwd` matches and it is not frozen.
    pub fn check_login(&self, acc: &str, pwd: &str) -> Option<User> {
        let user = self.get_user_by_acc(acc)?;
        if user.freeze || !user.check_password(pwd) {
            return None;
        }
        Some(user)
    }

    /// Create an account with `pwd` as its password.
    pub fn add_user(&self, mut user: User, pwd: &str) -> Result<UserId> {
        user.set_password(pwd, self.options.password_cost)?;
        self.changed(self.users.add(user), None)
    }

    /// Update an account. `None` keeps the stored password.
    pub fn update_user(&self, mut user: User, pwd: Option<&str>) -> Result<()> {
        match pwd {
            Some(pwd) => user.set_password(pwd, self.options.password_cost)?,
            None => user.hash.clear(),
        }
        self.changed(self.users.set(user), None)
    }

    pub fn del_user(&self, uid: UserId) -> Result<()> {
        self.changed(self.users.del(uid), None)
    }

    /// Stored accounts by ID, hashes stripped.
    pub fn list_users(&self) -> Arc<Vec<User>> {
        self.users.get_all()
    }

    // ------------------------------------------------------------------------
    // Attachments
    // ------------------------------------------------------------------------

    /// A fresh upload record stamped with the current time.
    pub fn new_attachment(&self, name: &str, size: i64, uploader: UserId) -> Attachment {
        Attachment {
            upload_uid: uploader,
            ..Attachment::new(name, size, self.now())
        }
    }

    pub fn add_attachment(&self, obj: Attachment) -> Result<Attachment> {
        self.changed(self.attachments.add(obj), Some(VersionKind::Data))
    }

    pub fn update_attachment(&self, obj: Attachment) -> Result<()> {
        self.changed(self.attachments.set(obj), Some(VersionKind::Data))
    }

    /// Returns the removed record so the caller can delete its file.
    pub fn del_attachment(&self, aid: AttachId) -> Result<Option<Attachment>> {
        self.changed(self.attachments.del(aid), Some(VersionKind::Data))
    }

    pub fn get_attachment_by_id(&self, aid: AttachId) -> Option<Attachment> {
        self.attachments.get_by_id(aid)
    }

    pub fn get_attachment_by_token(&self, token: &str) -> Option<Attachment> {
        self.attachments.get_by_token(token)
    }

    /// Listing for the web page: visible, newest first.
    pub fn list_attachments(&self) -> Arc<Vec<Attachment>> {
        self.attachments.get_web()
    }

    pub fn all_attachments(&self) -> Vec<Attachment> {
        self.attachments.get_all()
    }

    // ------------------------------------------------------------------------
    // Hooks
    // ------------------------------------------------------------------------

    pub fn add_hook(&self, obj: HookConfig) -> Result<HookConfig> {
        self.changed(self.hooks.add(obj), None)
    }

    /// Admin edit of name, note, disable and type.
    pub fn update_hook_config(&self, obj: &HookConfig) -> Result<()> {
        self.changed(self.hooks.set_config(obj), None)
    }

    /// Store a hook after a data push.
    pub fn update_hook(&self, obj: HookConfig) -> Result<()> {
        self.changed(self.hooks.set(obj), None)
    }

    pub fn del_hook(&self, hid: HookId) -> Result<Option<HookConfig>> {
        self.changed(self.hooks.del(hid), None)
    }

    pub fn get_hook_by_id(&self, hid: HookId) -> Option<HookConfig> {
        self.hooks.get_by_id(hid)
    }

    pub fn get_hook_by_token(&self, token: &str) -> Option<HookConfig> {
        self.hooks.get_by_token(token)
    }

    pub fn get_hook_by_auth_token(&self, auth: &str) -> Option<HookConfig> {
        self.hooks.get_by_auth_token(auth)
    }

    pub fn list_hooks(&self) -> Arc<Vec<HookConfig>> {
        self.hooks.get_web()
    }

    pub fn get_pub_hooks(&self) -> Arc<Vec<HookConfig>> {
        self.hooks.get_pub()
    }

    /// Every hook by ascending ID, unredacted.
    pub fn all_hooks(&self) -> Vec<HookConfig> {
        self.hooks.get_all()
    }

    // ------------------------------------------------------------------------
    // Layers
    // ------------------------------------------------------------------------

    pub fn add_layer(&self, obj: LayerGroup) -> Result<LayerId> {
        self.changed(self.layers.add(obj), Some(VersionKind::Config))
    }

    pub fn update_layer(&self, obj: LayerGroup) -> Result<()> {
        self.changed(self.layers.set(obj), Some(VersionKind::Config))
    }

    pub fn del_layer(&self, id: LayerId) -> Result<()> {
        self.changed(self.layers.del(id), Some(VersionKind::Config))
    }

    pub fn order_layers(&self, ids: &[LayerId]) -> Result<()> {
        self.changed(self.layers.order(ids), Some(VersionKind::Config))
    }

    pub fn get_layer_by_id(&self, id: LayerId) -> Option<LayerGroup> {
        self.layers.get_by_id(id)
    }

    pub fn list_layers(&self) -> Vec<LayerGroup> {
        self.layers.get_all()
    }

    pub fn get_pub_layers(&self) -> Arc<Vec<LayerGroup>> {
        self.layers.get_pub()
    }

    // ------------------------------------------------------------------------
    // Base maps
    // ------------------------------------------------------------------------

    pub fn add_map(&self, obj: BaseMap) -> Result<MapId> {
        self.changed(self.maps.add(obj), Some(VersionKind::Config))
    }

    pub fn update_map(&self, obj: BaseMap) -> Result<()> {
        self.changed(self.maps.set(obj), Some(VersionKind::Config))
    }

    pub fn del_map(&self, id: MapId) -> Result<()> {
        self.changed(self.maps.del(id), Some(VersionKind::Config))
    }

    pub fn order_maps(&self, ids: &[MapId]) -> Result<()> {
        self.changed(self.maps.order(ids), Some(VersionKind::Config))
    }

    pub fn get_map_by_id(&self, id: MapId) -> Option<BaseMap> {
        self.maps.get_by_id(id)
    }

    pub fn list_maps(&self) -> Vec<BaseMap> {
        self.maps.get_all()
    }

    pub fn get_pub_maps(&self) -> Arc<Vec<BaseMap>> {
        self.maps.get_pub()
    }

    // ------------------------------------------------------------------------
    // Links
    // ------------------------------------------------------------------------

    pub fn add_link(&self, obj: Link) -> Result<LinkId> {
        self.changed(self.links.add(obj), Some(VersionKind::Config))
    }

    pub fn update_link(&self, obj: Link) -> Result<()> {
        self.changed(self.links.set(obj), Some(VersionKind::Config))
    }

    pub fn del_link(&self, id: LinkId) -> Result<()> {
        self.changed(self.links.del(id), Some(VersionKind::Config))
    }

    pub fn order_links(&self, entries: &[LinkOrder]) -> Result<()> {
        self.changed(self.links.order(entries), Some(VersionKind::Config))
    }

    pub fn get_link_by_id(&self, id: LinkId) -> Option<Link> {
        self.links.get_by_id(id)
    }

    pub fn list_links(&self) -> Vec<Link> {
        self.links.get_all()
    }

    pub fn get_pub_links(&self) -> Arc<Vec<Link>> {
        self.links.get_pub()
    }

    // ------------------------------------------------------------------------
    // Tabs
    // ------------------------------------------------------------------------

    pub fn add_tab(&self, obj: TabData) -> Result<TabId> {
        self.changed(self.tabs.add(obj), Some(VersionKind::Config))
    }

    pub fn update_tab(&self, obj: TabData) -> Result<()> {
        self.changed(self.tabs.set(obj), Some(VersionKind::Config))
    }

    pub fn del_tab(&self, id: TabId) -> Result<()> {
        self.changed(self.tabs.del(id), Some(VersionKind::Config))
    }

    pub fn order_tabs(&self, ids: &[TabId]) -> Result<()> {
        self.changed(self.tabs.order(ids), Some(VersionKind::Config))
    }

    pub fn get_tab_by_id(&self, id: TabId) -> Option<TabData> {
        self.tabs.get_by_id(id)
    }

    pub fn list_tabs(&self) -> Vec<TabData> {
        self.tabs.get_all()
    }

    pub fn get_pub_tabs(&self) -> Arc<Vec<TabData>> {
        self.tabs.get_pub()
    }

    /// Next IDs per store, in snapshot key order.
    pub fn next_ids(&self) -> [(&'static str, u64); 7] {
        [
            ("user", self.users.next_id()),
            ("attach", self.attachments.next_id()),
            ("hook", self.hooks.next_id()),
            ("layer", self.layers.next_id()),
            ("map", self.maps.next_id()),
            ("link", self.links.next_id()),
            ("tabs", self.tabs.next_id()),
        ]
    }
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new(StoreOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;
    use std::collections::HashSet;

    fn options() -> StoreOptions {
        StoreOptions::new().password_cost(4)
    }

    fn opened(dir: &Path) -> Arc<DataStore> {
        let ds = Arc::new(DataStore::new(options()));
        ds.open(dir.join("webmap.db")).unwrap();
        ds
    }

    fn layer(name: &str) -> LayerGroup {
        LayerGroup {
            name: name.to_string(),
            ..LayerGroup::default()
        }
    }

    fn read_json(path: &Path) -> serde_json::Value {
        serde_json::from_slice(&fs::read(path).unwrap()).unwrap()
    }

    #[test]
    fn open_missing_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let ds = opened(dir.path());

        assert!(ds.next_ids().iter().all(|(_, next)| *next == 1));
        assert!(ds.list_layers().is_empty());
        assert_eq!(ds.page_view(), 0);
        assert_eq!(ds.config().site_title, "map site");
        ds.close().unwrap();
    }

    #[test]
    fn open_blank_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("webmap.db");
        fs::write(&path, " \n").unwrap();

        let ds = Arc::new(DataStore::new(options()));
        ds.open(&path).unwrap();
        assert!(ds.next_ids().iter().all(|(_, next)| *next == 1));
        ds.close().unwrap();
    }

    #[test]
    fn open_rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("webmap.db");
        fs::write(&path, "{\"layer\": [").unwrap();

        let ds = Arc::new(DataStore::new(options()));
        let err = ds.open(&path).unwrap_err();
        assert!(matches!(err, StoreError::Json(_)));
    }

    #[test]
    fn open_refuses_duplicate_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("webmap.db");
        fs::write(
            &path,
            r#"{"layer":{"data":[{"lyid":1,"name":"a"},{"lyid":1,"name":"b"}],"next":2}}"#,
        )
        .unwrap();

        let ds = Arc::new(DataStore::new(options()));
        assert!(ds.open(&path).unwrap_err().is_fatal());
    }

    #[test]
    fn open_twice_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ds = opened(dir.path());
        let err = ds.open(dir.path().join("other.db")).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
        ds.close().unwrap();
    }

    #[test]
    fn flush_then_open_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("webmap.db");
        let ds = opened(dir.path());

        ds.add_user(User::new("alice", "Alice"), "pw").unwrap();
        let attach = ds
            .add_attachment(ds.new_attachment("track.gpx", 10, 1))
            .unwrap();
        let hook = ds.add_hook(HookConfig::new("wind", "uv-json")).unwrap();
        for name in ["a", "b", "c"] {
            ds.add_layer(layer(name)).unwrap();
        }
        ds.order_layers(&[3, 1]).unwrap();
        ds.add_map(BaseMap {
            name: "osm".to_string(),
            max_zoom: 18,
            ..BaseMap::default()
        })
        .unwrap();
        ds.add_link(Link {
            name: "home".to_string(),
            ..Link::default()
        })
        .unwrap();
        ds.add_tab(TabData {
            title: "about".to_string(),
            show: true,
            ..TabData::default()
        })
        .unwrap();
        ds.add_page_view();
        ds.add_page_view();
        ds.add_user_visit();
        ds.close().unwrap();

        let json = read_json(&path);
        assert_eq!(json["pv"], 2);
        assert_eq!(json["layer"]["next"], 4);
        assert!(json["tabs"]["data"].is_array());

        let again = Arc::new(DataStore::new(options()));
        again.open(&path).unwrap();
        assert_eq!(again.page_view(), 2);
        assert_eq!(again.user_visit(), 1);
        assert_eq!(again.next_ids(), ds.next_ids());
        assert_eq!(again.list_layers(), ds.list_layers());
        assert_eq!(*again.get_pub_layers(), *ds.get_pub_layers());
        assert_eq!(again.list_maps(), ds.list_maps());
        assert_eq!(again.list_links(), ds.list_links());
        assert_eq!(again.list_tabs(), ds.list_tabs());
        assert_eq!(again.all_attachments(), ds.all_attachments());
        assert_eq!(
            again.get_attachment_by_token(&attach.token).unwrap().id,
            attach.id
        );
        assert_eq!(
            again.get_hook_by_auth_token(&hook.auth_token).unwrap().id,
            hook.id
        );
        assert!(again.check_login("alice", "pw").is_some());
        assert_eq!(*again.config(), *ds.config());
        again.close().unwrap();
    }

    #[test]
    fn empty_config_fields_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("webmap.db");
        let ds = opened(dir.path());
        let conf = TmplIndex {
            show_stats: true,
            ..TmplIndex::default()
        };
        ds.set_config(conf.clone());
        ds.close().unwrap();
        assert_eq!(read_json(&path)["conf"], serde_json::json!({"stats": true}));

        let again = Arc::new(DataStore::new(options()));
        again.open(&path).unwrap();
        assert_eq!(*again.config(), conf);
        assert!(again.config().site_title.is_empty());
        assert!(again.config().logo.is_empty());
        again.close().unwrap();
    }

    #[test]
    fn zero_fields_are_omitted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("webmap.db");
        let ds = opened(dir.path());
        ds.close().unwrap();

        let json = read_json(&path);
        assert!(json.get("pv").is_none());
        assert!(json.get("uv").is_none());
        assert!(json.get("conf").is_none());
        assert_eq!(json["user"]["next"], 1);
        assert!(!dir.path().join("webmap.db.tmp").exists());
    }

    #[test]
    fn display_kind_mutations_bump_config_version() {
        let start = Utc.with_ymd_and_hms(2025, 2, 3, 4, 5, 6).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let ds = DataStore::new(options().clock(clock.clone()));

        let id = ds.add_layer(layer("a")).unwrap();
        let first = ds.config().version_c.clone();
        assert!(first.starts_with("20250203T040506-"));
        assert!(ds.config().version_d.is_empty());

        clock.advance(chrono::Duration::seconds(60));
        ds.del_layer(id).unwrap();
        let second = ds.config().version_c.clone();
        assert!(second.starts_with("20250203T040606-"));

        // Failed mutations change nothing
        let mut missing = layer("x");
        missing.id = 42;
        assert!(ds.update_layer(missing).is_err());
        assert_eq!(ds.config().version_c, second);
    }

    #[test]
    fn attachment_mutations_bump_data_version() {
        let ds = DataStore::new(options());
        let obj = ds.new_attachment("a.png", 1, 2);
        ds.add_attachment(obj).unwrap();
        assert!(!ds.config().version_d.is_empty());
        assert!(ds.config().version_c.is_empty());
    }

    #[test]
    fn update_config_keeps_edits() {
        let ds = DataStore::new(options());
        ds.update_config(VersionKind::Assets, |c| c.site_title = "Wind map".to_string());
        let conf = ds.config();
        assert_eq!(conf.site_title, "Wind map");
        assert!(!conf.version_a.is_empty());
        assert!(ds.is_dirty());
    }

    #[test]
    fn all_hooks_keeps_disabled_and_private_fields() {
        let ds = DataStore::new(options());
        let mut wind = ds.add_hook(HookConfig::new("wind", "uv-json")).unwrap();
        let mut off = HookConfig::new("off", "geojson");
        off.disable = true;
        let off = ds.add_hook(off).unwrap();

        wind.set_data("wind.json", 42, ds.now());
        ds.update_hook(wind.clone()).unwrap();

        let all = ds.all_hooks();
        assert_eq!(
            all.iter().map(|h| h.id).collect::<Vec<_>>(),
            vec![wind.id, off.id]
        );
        assert_eq!(all[0].save_name, wind.save_name);
        assert!(!all[0].auth_token.is_empty());
        assert!(all[1].disable);
        assert!(ds.get_pub_hooks().iter().all(|h| h.id != off.id));
    }

    #[test]
    fn mutations_flag_dirty_only_on_success() {
        let ds = DataStore::new(options());
        assert!(!ds.is_dirty());
        assert!(ds.del_user(99).is_ok());
        assert!(ds.is_dirty());

        let ds = DataStore::new(options());
        let mut missing = HookConfig::new("x", "");
        missing.id = 5;
        assert!(ds.update_hook_config(&missing).is_err());
        assert!(!ds.is_dirty());
    }

    #[test]
    fn shadow_user_is_looked_up_first_and_never_saved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("webmap.db");
        let ds = opened(dir.path());

        ds.add_user(User::new("root", "Stored root"), "stored").unwrap();
        ds.add_shadow_user("root", "break-glass").unwrap();

        let found = ds.get_user_by_acc("root").unwrap();
        assert_eq!(found.id, 0);
        assert!(found.is_super);
        assert!(ds.check_login("root", "break-glass").is_some());
        assert!(ds.check_login("root", "stored").is_none());
        assert_eq!(ds.get_user_by_uid(0).unwrap().acc, "root");
        assert_eq!(ds.get_user_by_uid(1).unwrap().name, "Stored root");
        assert_eq!(ds.list_users().len(), 1);

        ds.close().unwrap();
        let json = read_json(&path);
        assert_eq!(json["user"]["data"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn frozen_users_cannot_log_in() {
        let ds = DataStore::new(options());
        let id = ds.add_user(User::new("kim", "Kim"), "pw").unwrap();
        let mut user = ds.get_user_by_uid(id).unwrap();
        user.freeze = true;
        ds.update_user(user, None).unwrap();

        assert!(ds.check_login("kim", "pw").is_none());
        // Password survived the update
        assert!(ds.get_user_by_uid(id).unwrap().check_password("pw"));
    }

    #[test]
    fn concurrent_adds_get_unique_ids() {
        let ds = Arc::new(DataStore::new(options()));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let ds = ds.clone();
                thread::spawn(move || {
                    (0..50)
                        .map(|i| ds.add_layer(layer(&format!("{}-{}", t, i))).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(ids.insert(id));
            }
        }
        assert_eq!(ids.len(), 400);
        assert_eq!(ids.iter().max(), Some(&400));
        assert_eq!(ds.list_layers().len(), 400);
        assert_eq!(ds.get_pub_layers().len(), 400);
    }

    #[test]
    fn flush_before_open_is_a_no_op() {
        let ds = DataStore::new(options());
        ds.flag_dirty();
        ds.flush().unwrap();
        assert!(ds.is_dirty());
        // Never opened, nothing to stop
        ds.close().unwrap();
    }

    #[test]
    fn close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let ds = opened(dir.path());
        ds.add_layer(layer("a")).unwrap();
        ds.close().unwrap();
        assert!(!ds.is_dirty());
        ds.close().unwrap();
        assert!(dir.path().join("webmap.db").exists());
    }

    #[test]
    fn request_flush_is_rate_limited() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("webmap.db");
        let ds = Arc::new(DataStore::new(
            options().flush_rate_limit(Duration::from_secs(3600)),
        ));
        ds.open(&path).unwrap();

        ds.add_layer(layer("first")).unwrap();
        ds.request_flush().unwrap();
        assert!(!ds.is_dirty());
        assert_eq!(read_json(&path)["layer"]["data"].as_array().unwrap().len(), 1);

        ds.add_layer(layer("second")).unwrap();
        ds.request_flush().unwrap();
        assert!(ds.is_dirty());
        assert_eq!(read_json(&path)["layer"]["data"].as_array().unwrap().len(), 1);

        ds.close().unwrap();
        assert_eq!(read_json(&path)["layer"]["data"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn background_saver_flushes_dirty_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("webmap.db");
        let ds = Arc::new(DataStore::new(
            options().save_interval(Duration::from_millis(20)),
        ));
        ds.open(&path).unwrap();
        ds.add_layer(layer("auto")).unwrap();

        let mut saved = false;
        for _ in 0..100 {
            thread::sleep(Duration::from_millis(20));
            if path.exists() {
                saved = true;
                break;
            }
        }
        assert!(saved);
        assert_eq!(read_json(&path)["layer"]["data"][0]["name"], "auto");
        ds.close().unwrap();
    }

    #[test]
    fn persisted_zero_next_is_coerced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("webmap.db");
        fs::write(&path, r#"{"map":{"data":[],"next":0}}"#).unwrap();

        let ds = Arc::new(DataStore::new(options()));
        ds.open(&path).unwrap();
        assert_eq!(ds.add_map(BaseMap::default()).unwrap(), 1);
        ds.close().unwrap();
    }
}
