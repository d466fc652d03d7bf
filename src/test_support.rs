//! Fakes and fixtures shared by the unit tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use rusqlite::{params, Connection};
use tempfile::TempDir;

use crate::collaborators::{
    AppRegistry, Collaborators, Geometry, Presenter, RunningApp, SettingsSource, Suppression,
    SurfaceKind,
};
use crate::models::{Notification, NotificationText, Origin, SenderIcon};

const LOG_SCHEMA: &str = "
    CREATE TABLE app (
        app_id INTEGER PRIMARY KEY,
        identifier VARCHAR NOT NULL UNIQUE,
        badge INTEGER NULL
    );
    CREATE TABLE record (
        rec_id INTEGER PRIMARY KEY,
        app_id INTEGER,
        uuid BLOB,
        data BLOB,
        request_date REAL,
        request_last_date REAL,
        delivered_date REAL,
        presented BOOL,
        style INTEGER,
        snooze_fire_date REAL
    );
";

/// A throw-away notification log with the host's table layout.
pub struct LogFixture {
    dir: TempDir,
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl LogFixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("db");
        let conn = Connection::open(&path).expect("open fixture log");
        conn.execute_batch(LOG_SCHEMA).expect("create fixture schema");
        Self {
            dir,
            path,
            conn: Mutex::new(conn),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Switch to WAL journaling, so appends land in `db-wal`.
    pub fn use_wal(&self) {
        let conn = self.conn.lock().unwrap();
        let mode: String = conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode, "wal");
    }

    /// Append a record whose payload is `payload` encoded as a binary plist.
    pub fn insert(&self, identifier: &str, payload: &serde_json::Value) -> i64 {
        let mut bytes = Vec::new();
        plist::to_writer_binary(&mut bytes, payload).expect("encode plist payload");
        self.insert_raw(identifier, &bytes)
    }

    pub fn insert_raw(&self, identifier: &str, payload: &[u8]) -> i64 {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO app (identifier) VALUES (?1)",
            params![identifier],
        )
        .unwrap();
        let app_id: i64 = conn
            .query_row(
                "SELECT app_id FROM app WHERE identifier = ?1",
                params![identifier],
                |row| row.get(0),
            )
            .unwrap();
        conn.execute(
            "INSERT INTO record (app_id, data, delivered_date, presented) VALUES (?1, ?2, ?3, 1)",
            params![app_id, payload, 700_000_000.0_f64],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    /// Move the log out of the way, as if access had been revoked.
    pub fn revoke(&self) {
        std::fs::rename(&self.path, self.dir.path().join("db.hidden")).unwrap();
    }

    pub fn restore(&self) {
        std::fs::rename(self.dir.path().join("db.hidden"), &self.path).unwrap();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenterEvent {
    Show(SurfaceKind, Option<String>),
    Dismiss,
    Chime,
}

#[derive(Default)]
pub struct RecordingPresenter {
    events: Mutex<Vec<PresenterEvent>>,
    showing: AtomicBool,
    /// A surface the engine did not ask for is on screen.
    competing: AtomicBool,
    last_shown: Mutex<Option<Notification>>,
}

impl RecordingPresenter {
    pub fn events(&self) -> Vec<PresenterEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn shown_titles(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                PresenterEvent::Show(_, title) => title,
                _ => None,
            })
            .collect()
    }

    pub fn last_shown(&self) -> Option<Notification> {
        self.last_shown.lock().unwrap().clone()
    }

    pub fn set_competing(&self, busy: bool) {
        self.competing.store(busy, Ordering::SeqCst);
    }
}

impl Presenter for RecordingPresenter {
    fn show(&self, kind: SurfaceKind, notification: &Notification) {
        self.showing.store(true, Ordering::SeqCst);
        *self.last_shown.lock().unwrap() = Some(notification.clone());
        self.events
            .lock()
            .unwrap()
            .push(PresenterEvent::Show(kind, notification.title.clone()));
    }

    fn dismiss(&self) {
        self.showing.store(false, Ordering::SeqCst);
        self.events.lock().unwrap().push(PresenterEvent::Dismiss);
    }

    fn is_visible(&self) -> bool {
        self.showing.load(Ordering::SeqCst) || self.competing.load(Ordering::SeqCst)
    }

    fn play_chime(&self) {
        self.events.lock().unwrap().push(PresenterEvent::Chime);
    }
}

#[derive(Default)]
pub struct FakeGeometry {
    inside: Mutex<Option<bool>>,
}

impl FakeGeometry {
    pub fn set(&self, inside: Option<bool>) {
        *self.inside.lock().unwrap() = inside;
    }
}

impl Geometry for FakeGeometry {
    fn pointer_in_zone(&self, _shown: &Notification) -> Option<bool> {
        *self.inside.lock().unwrap()
    }
}

#[derive(Default)]
pub struct FakeSuppression {
    active: AtomicBool,
}

impl FakeSuppression {
    pub fn set(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }
}

impl Suppression for FakeSuppression {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

pub struct FakeSettings {
    pub installed: AtomicBool,
    pub enabled: AtomicBool,
    pub show_preview: AtomicBool,
}

impl Default for FakeSettings {
    fn default() -> Self {
        Self {
            installed: AtomicBool::new(true),
            enabled: AtomicBool::new(true),
            show_preview: AtomicBool::new(true),
        }
    }
}

impl FakeSettings {
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn set_show_preview(&self, show: bool) {
        self.show_preview.store(show, Ordering::SeqCst);
    }
}

impl SettingsSource for FakeSettings {
    fn installed(&self) -> bool {
        self.installed.load(Ordering::SeqCst)
    }

    fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn show_preview(&self) -> bool {
        self.show_preview.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct FakeRegistry {
    /// lowercase alias -> canonical identifier
    pub aliases: HashMap<String, String>,
    pub names: HashMap<String, String>,
    pub activated: Mutex<Vec<String>>,
    /// Metadata lookups made on the record path.
    pub lookups: AtomicUsize,
}

impl FakeRegistry {
    pub fn with_app(mut self, identifier: &str, name: &str) -> Self {
        self.aliases
            .insert(identifier.to_ascii_lowercase(), identifier.to_string());
        self.names.insert(identifier.to_string(), name.to_string());
        self
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl AppRegistry for FakeRegistry {
    fn canonical_identifier(&self, raw: &str) -> Option<String> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.aliases.get(&raw.to_ascii_lowercase()).cloned()
    }

    fn display_name(&self, identifier: &str) -> Option<String> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.names.get(identifier).cloned()
    }

    fn icon(&self, identifier: &str) -> Option<SenderIcon> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.names
            .get(identifier)
            .map(|_| SenderIcon::File(PathBuf::from(format!("/icons/{identifier}.icns"))))
    }

    fn running_process(&self, identifier: &str) -> Option<RunningApp> {
        self.names.get(identifier).map(|_| RunningApp {
            identifier: identifier.to_string(),
            pid: 42,
        })
    }

    fn activate(&self, identifier: &str) -> Result<()> {
        self.activated.lock().unwrap().push(identifier.to_string());
        Ok(())
    }
}

/// Every fake, plus the bundle handed to the engine.
pub struct Harness {
    pub presenter: Arc<RecordingPresenter>,
    pub geometry: Arc<FakeGeometry>,
    pub suppression: Arc<FakeSuppression>,
    pub registry: Arc<FakeRegistry>,
    pub settings: Arc<FakeSettings>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_registry(FakeRegistry::default().with_app("com.example.Chat", "Chat"))
    }

    pub fn with_registry(registry: FakeRegistry) -> Self {
        Self {
            presenter: Arc::new(RecordingPresenter::default()),
            geometry: Arc::new(FakeGeometry::default()),
            suppression: Arc::new(FakeSuppression::default()),
            registry: Arc::new(registry),
            settings: Arc::new(FakeSettings::default()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            presenter: self.presenter.clone(),
            geometry: self.geometry.clone(),
            suppression: self.suppression.clone(),
            registry: self.registry.clone(),
            settings: self.settings.clone(),
            pre_signal: None,
        }
    }
}

pub fn notification(title: &str) -> Notification {
    Notification::new(
        "com.example.Chat",
        "Chat",
        NotificationText {
            title: Some(title.to_string()),
            subtitle: None,
            body: Some(format!("{title} body")),
        },
        None,
        Origin::System,
    )
}
