//! Display label resolution
//!
//! Rendering-side lookup of human-readable names for ranked entries. App
//! name resolution can be slow on a real device, so it runs on its own
//! background task behind an explicit cache. Repeated misses for one
//! identity queue a single lookup. Switching the display language
//! invalidates the cache and abandons lookups submitted before the
//! switch. Nothing here touches the processing pipeline.

use crate::core::{ConsumerKind, DiffEntry};
use crate::i18n::I18n;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Capacity of the request queue feeding the resolver task. Display
/// calls drop the lookup when the queue is full and retry on a later
/// miss.
const RESOLVE_QUEUE_CAPACITY: usize = 64;

/// Resolves display names for app identities.
pub trait LabelResolver: Send + Sync {
    /// Look up a display name. Returning None keeps the fallback label.
    fn resolve(&self, identity_key: &str, package_hint: Option<&str>) -> Option<String>;
}

/// Derives names from package hints ("com.example.browser" -> "Browser")
pub struct PackageHintResolver;

impl LabelResolver for PackageHintResolver {
    fn resolve(&self, _identity_key: &str, package_hint: Option<&str>) -> Option<String> {
        let package = package_hint?;
        let stem = package.rsplit('.').next().filter(|s| !s.is_empty())?;

        let mut chars = stem.chars();
        let first = chars.next()?;
        Some(first.to_uppercase().collect::<String>() + chars.as_str())
    }
}

/// Name cache for one display locale
pub struct LabelCache {
    locale: String,
    names: HashMap<String, String>,
}

impl LabelCache {
    pub fn new(locale: &str) -> Self {
        Self {
            locale: locale.to_string(),
            names: HashMap::new(),
        }
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn get(&self, identity_key: &str) -> Option<&str> {
        self.names.get(identity_key).map(String::as_str)
    }

    pub fn insert(&mut self, identity_key: &str, name: String) {
        self.names.insert(identity_key.to_string(), name);
    }

    /// Cached names belong to one locale; changing it drops them all.
    pub fn switch_locale(&mut self, locale: &str) {
        if self.locale != locale {
            self.locale = locale.to_string();
            self.names.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

struct ResolveRequest {
    identity_key: String,
    package_hint: Option<String>,
    epoch: u64,
}

struct LabelerShared {
    cache: Mutex<LabelCache>,
    i18n: Mutex<I18n>,
    /// Bumped on every locale change; requests carry the epoch they were
    /// submitted under.
    epoch: AtomicU64,
    /// Identities with a queued lookup, keyed to the epoch that queued
    /// it. One in-flight lookup per identity; a newer epoch supersedes.
    pending: Mutex<HashMap<String, u64>>,
}

/// Labeler handle used by the rendering layer
pub struct Labeler {
    shared: Arc<LabelerShared>,
    tx: mpsc::Sender<ResolveRequest>,
    os_system_key: String,
}

impl Labeler {
    /// Start the labeler and its background resolution task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(resolver: Box<dyn LabelResolver>, language: &str, os_system_id: i64) -> Self {
        let i18n = I18n::new(language);
        let locale = i18n.current_language().to_string();

        let shared = Arc::new(LabelerShared {
            cache: Mutex::new(LabelCache::new(&locale)),
            i18n: Mutex::new(i18n),
            epoch: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
        });

        let (tx, rx) = mpsc::channel(RESOLVE_QUEUE_CAPACITY);
        tokio::spawn(resolver_loop(rx, resolver, Arc::clone(&shared)));

        Self {
            shared,
            tx,
            os_system_key: os_system_id.to_string(),
        }
    }

    /// Switch the display language. Cached names are dropped and pending
    /// lookups from before the switch are abandoned.
    pub fn set_language(&self, language: &str) {
        let mut i18n = self.shared.i18n.lock().unwrap();
        i18n.set_language(language);
        let locale = i18n.current_language().to_string();
        drop(i18n);

        let mut cache = self.shared.cache.lock().unwrap();
        if cache.locale() != locale {
            self.shared.epoch.fetch_add(1, Ordering::SeqCst);
            cache.switch_locale(&locale);
            self.shared.pending.lock().unwrap().clear();
        }
    }

    pub fn language(&self) -> String {
        self.shared.i18n.lock().unwrap().current_language().to_string()
    }

    /// Best available name for one ranked entry. App names missing from
    /// the cache get a fallback now and a background lookup for later.
    pub fn display_name(&self, entry: &DiffEntry) -> String {
        match entry.kind {
            ConsumerKind::System => {
                let i18n = self.shared.i18n.lock().unwrap();
                let drain = entry
                    .identity_key
                    .strip_prefix("S|")
                    .and_then(|id| id.parse::<i64>().ok());
                match drain {
                    Some(id) => i18n.get(drain_label_key(id)),
                    None => i18n.get("label.unknown"),
                }
            }
            ConsumerKind::User => {
                let user = entry
                    .identity_key
                    .strip_prefix("U|")
                    .unwrap_or(&entry.identity_key);
                format!("{} {}", self.shared.i18n.lock().unwrap().get("label.user"), user)
            }
            ConsumerKind::App => self.app_display_name(entry),
        }
    }

    fn app_display_name(&self, entry: &DiffEntry) -> String {
        if entry.identity_key == self.os_system_key {
            return self.shared.i18n.lock().unwrap().get("label.system_apps");
        }

        {
            let cache = self.shared.cache.lock().unwrap();
            if let Some(name) = cache.get(&entry.identity_key) {
                return name.to_string();
            }
        }

        self.request(entry);
        match &entry.label_hint {
            Some(hint) => hint.clone(),
            None => format!(
                "{} {}",
                self.shared.i18n.lock().unwrap().get("label.app"),
                entry.identity_key
            ),
        }
    }

    fn request(&self, entry: &DiffEntry) {
        let epoch = self.shared.epoch.load(Ordering::SeqCst);

        {
            let mut pending = self.shared.pending.lock().unwrap();
            if pending.get(&entry.identity_key) == Some(&epoch) {
                return;
            }
            pending.insert(entry.identity_key.clone(), epoch);
        }

        let request = ResolveRequest {
            identity_key: entry.identity_key.clone(),
            package_hint: entry.label_hint.clone(),
            epoch,
        };
        if let Err(e) = self.tx.try_send(request) {
            log::debug!("Label queue rejected lookup for {}: {}", entry.identity_key, e);
            self.shared.pending.lock().unwrap().remove(&entry.identity_key);
        }
    }
}

async fn resolver_loop(
    mut rx: mpsc::Receiver<ResolveRequest>,
    resolver: Box<dyn LabelResolver>,
    shared: Arc<LabelerShared>,
) {
    while let Some(request) = rx.recv().await {
        let resolved = resolver.resolve(&request.identity_key, request.package_hint.as_deref());

        if let Some(name) = resolved {
            let mut cache = shared.cache.lock().unwrap();
            // A locale change abandons lookups submitted before it.
            if shared.epoch.load(Ordering::SeqCst) == request.epoch {
                cache.insert(&request.identity_key, name);
            } else {
                log::debug!("Dropping stale label for {}", request.identity_key);
            }
        }

        // Clear the in-flight marker unless a newer request superseded it.
        let mut pending = shared.pending.lock().unwrap();
        if pending.get(&request.identity_key) == Some(&request.epoch) {
            pending.remove(&request.identity_key);
        }
    }
}

fn drain_label_key(drain_type: i64) -> &'static str {
    match drain_type {
        0 => "drain.ambient",
        1 => "drain.audio",
        2 => "drain.bluetooth",
        3 => "drain.camera",
        4 => "drain.cell",
        5 => "drain.flashlight",
        6 => "drain.idle",
        7 => "drain.memory",
        8 => "drain.phone",
        9 => "drain.screen",
        10 => "drain.wifi",
        11 => "drain.unaccounted",
        12 => "drain.overcounted",
        _ => "label.unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn app_entry(identity_key: &str, hint: Option<&str>) -> DiffEntry {
        let mut entry = DiffEntry::new(identity_key, ConsumerKind::App);
        entry.label_hint = hint.map(String::from);
        entry
    }

    struct CountingResolver {
        lookups: Arc<AtomicUsize>,
    }

    impl LabelResolver for CountingResolver {
        fn resolve(&self, identity_key: &str, package_hint: Option<&str>) -> Option<String> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            PackageHintResolver.resolve(identity_key, package_hint)
        }
    }

    #[test]
    fn test_package_hint_resolver() {
        let resolver = PackageHintResolver;
        assert_eq!(
            resolver.resolve("10042", Some("com.example.browser")),
            Some("Browser".to_string())
        );
        assert_eq!(resolver.resolve("10042", Some("standalone")), Some("Standalone".to_string()));
        assert_eq!(resolver.resolve("10042", Some("com.example.")), None);
        assert_eq!(resolver.resolve("10042", None), None);
    }

    #[test]
    fn test_cache_locale_switch() {
        let mut cache = LabelCache::new("en");
        cache.insert("10042", "Browser".to_string());
        assert_eq!(cache.get("10042"), Some("Browser"));

        cache.switch_locale("en");
        assert_eq!(cache.len(), 1);

        cache.switch_locale("fr");
        assert!(cache.is_empty());
        assert_eq!(cache.locale(), "fr");
    }

    #[tokio::test]
    async fn test_display_names_by_kind() {
        let labeler = Labeler::new(Box::new(PackageHintResolver), "en", 1000);

        let screen = DiffEntry::new("S|9", ConsumerKind::System);
        assert_eq!(labeler.display_name(&screen), "Screen");

        let owner = DiffEntry::new("U|0", ConsumerKind::User);
        assert_eq!(labeler.display_name(&owner), "User 0");

        let bucket = app_entry("1000", None);
        assert_eq!(labeler.display_name(&bucket), "System apps");

        let bare = app_entry("10099", None);
        assert_eq!(labeler.display_name(&bare), "App 10099");
    }

    #[tokio::test]
    async fn test_app_name_resolves_in_background() {
        let labeler = Labeler::new(Box::new(PackageHintResolver), "en", 1000);
        let entry = app_entry("10042", Some("com.example.browser"));

        // First call answers with the raw hint and queues a lookup.
        assert_eq!(labeler.display_name(&entry), "com.example.browser");

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(labeler.display_name(&entry), "Browser");
    }

    #[tokio::test]
    async fn test_repeated_misses_queue_one_lookup() {
        let lookups = Arc::new(AtomicUsize::new(0));
        let labeler = Labeler::new(
            Box::new(CountingResolver {
                lookups: Arc::clone(&lookups),
            }),
            "en",
            1000,
        );
        let entry = app_entry("10042", Some("com.example.browser"));

        // Every miss before the resolver runs serves the fallback; only
        // the first one reaches the queue.
        for _ in 0..50 {
            assert_eq!(labeler.display_name(&entry), "com.example.browser");
        }
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(lookups.load(Ordering::SeqCst), 1);
        assert!(labeler.shared.pending.lock().unwrap().is_empty());

        // Cache hits never touch the resolver again.
        assert_eq!(labeler.display_name(&entry), "Browser");
        assert_eq!(lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_language_switch_abandons_pending_lookups() {
        let labeler = Labeler::new(Box::new(PackageHintResolver), "en", 1000);
        let entry = app_entry("10042", Some("com.example.browser"));

        // Queue a lookup, then switch language before the worker runs.
        assert_eq!(labeler.display_name(&entry), "com.example.browser");
        labeler.set_language("fr");

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        // The stale result was dropped; the next call falls back again.
        assert!(labeler.shared.cache.lock().unwrap().is_empty());
        assert_eq!(labeler.display_name(&entry), "com.example.browser");

        let screen = DiffEntry::new("S|9", ConsumerKind::System);
        assert_eq!(labeler.display_name(&screen), "\u{00C9}cran");
    }
}
