use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::MutexGuard;
use tracing::{debug, info};

use crate::core::types::{CacheEntry, ImageId, ImageSource, SubmittedImage, WidgetKeys};
use crate::orchestration::input::CollectedInput;
use crate::utils::Metrics;

/// What the uploader and camera widgets currently hold
#[derive(Default)]
struct WidgetValues {
    uploads: Vec<(String, Arc<Vec<u8>>)>,
    camera: Option<Arc<Vec<u8>>>,
}

impl fmt::Debug for WidgetValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WidgetValues")
            .field(
                "uploads",
                &self.uploads.iter().map(|(n, b)| (n, b.len())).collect::<Vec<_>>(),
            )
            .field("camera", &self.camera.as_ref().map(|b| b.len()))
            .finish()
    }
}

/// Per-session state: reset epoch, widget values and the memoized results.
///
/// Entries are only ever added; a reset drops the whole map, empties both
/// widgets and bumps the epoch so widget names and camera ids from before
/// the reset can no longer match anything.
#[derive(Debug, Default)]
pub struct SessionState {
    epoch: u64,
    widgets: WidgetValues,
    results: HashMap<ImageId, Arc<CacheEntry>>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn widget_keys(&self) -> WidgetKeys {
        WidgetKeys::for_epoch(self.epoch)
    }

    /// Apply one submission to the widgets. A widget the submission left
    /// empty keeps its previous value.
    pub fn apply_input(&mut self, input: CollectedInput) {
        if !input.uploads.is_empty() {
            self.widgets.uploads = input
                .uploads
                .into_iter()
                .map(|(name, bytes)| (name, Arc::new(bytes)))
                .collect();
        }
        if let Some(bytes) = input.camera {
            self.widgets.camera = Some(Arc::new(bytes));
        }
    }

    /// Images the widgets hold, uploads first and then the camera capture
    pub fn current_images(&self) -> Vec<SubmittedImage> {
        let mut images: Vec<SubmittedImage> = self
            .widgets
            .uploads
            .iter()
            .enumerate()
            .map(|(index, (name, bytes))| SubmittedImage {
                index,
                id: ImageId::from_upload(name, bytes.len()),
                source: ImageSource::Upload {
                    name: name.clone(),
                    size: bytes.len(),
                },
                bytes: Arc::clone(bytes),
            })
            .collect();

        if let Some(ref bytes) = self.widgets.camera {
            let index = images.len();
            images.push(SubmittedImage {
                index,
                id: ImageId::from_camera(self.epoch, index),
                source: ImageSource::Camera,
                bytes: Arc::clone(bytes),
            });
        }
        images
    }

    pub fn get(&self, id: &ImageId) -> Option<Arc<CacheEntry>> {
        self.results.get(id).cloned()
    }

    /// Store an entry unless one already exists; returns whichever is stored
    pub fn insert(&mut self, id: ImageId, entry: CacheEntry) -> Arc<CacheEntry> {
        Arc::clone(self.results.entry(id).or_insert_with(|| Arc::new(entry)))
    }

    pub fn cached_results(&self) -> usize {
        self.results.len()
    }

    /// Clear every result and widget value, then advance the epoch.
    /// Returns the new epoch.
    pub fn reset(&mut self) -> u64 {
        self.results.clear();
        self.widgets = WidgetValues::default();
        self.epoch += 1;
        self.epoch
    }
}

/// A live session: its state behind an async lock held for a whole
/// interaction, plus the last time it was touched.
pub struct SessionHandle {
    state: tokio::sync::Mutex<SessionState>,
    last_seen: Mutex<Instant>,
}

impl SessionHandle {
    fn new() -> Self {
        Self {
            state: tokio::sync::Mutex::new(SessionState::new()),
            last_seen: Mutex::new(Instant::now()),
        }
    }

    /// Wait for any in-flight interaction of this session, then lock it
    pub async fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.touch();
        self.state.lock().await
    }

    fn touch(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }
}

/// Process-wide registry of sessions, keyed by the session cookie value
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<DashMap<String, Arc<SessionHandle>>>,
    metrics: Option<Metrics>,
}

impl SessionStore {
    pub fn new(metrics: Option<Metrics>) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            metrics,
        }
    }

    /// Look up the session named by the cookie, or start a new one.
    ///
    /// Unknown ids are never adopted; a fresh random id is issued instead.
    /// Returns `(session_id, handle, created)`.
    pub fn get_or_create(&self, session_id: Option<&str>) -> (String, Arc<SessionHandle>, bool) {
        if let Some(id) = session_id {
            if let Some(handle) = self.sessions.get(id) {
                return (id.to_string(), Arc::clone(handle.value()), false);
            }
        }

        let id = format!("{:032x}", rand::random::<u128>());
        let handle = Arc::new(SessionHandle::new());
        self.sessions.insert(id.clone(), Arc::clone(&handle));
        debug!("Started session {}", id);
        self.publish_count();

        (id, handle, true)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop sessions idle for at least `max_idle`. Returns how many went.
    pub fn sweep_idle(&self, max_idle: Duration) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, handle| handle.idle_for() < max_idle);
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            self.publish_count();
        }
        removed
    }

    /// Background task that expires idle sessions
    pub fn start_sweeper(&self, max_idle: Duration) {
        let store = self.clone();
        let period = (max_idle / 4).max(Duration::from_secs(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let removed = store.sweep_idle(max_idle);
                if removed > 0 {
                    info!("Expired {} idle session(s), {} remaining", removed, store.len());
                }
            }
        });
    }

    fn publish_count(&self) {
        if let Some(ref m) = self.metrics {
            m.set_active_sessions(self.sessions.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Prediction;

    fn entry(label: &str) -> CacheEntry {
        CacheEntry {
            top_result: Prediction::new(label, 0.9),
            chart_data: Vec::new(),
            translated_label: label.to_string(),
        }
    }

    #[test]
    fn test_insert_never_overwrites() {
        let mut state = SessionState::new();
        let id = ImageId::from_upload("a.png", 3);

        let first = state.insert(id.clone(), entry("first"));
        let second = state.insert(id.clone(), entry("second"));

        assert_eq!(first.translated_label, "first");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(state.get(&id).unwrap().translated_label, "first");
    }

    #[test]
    fn test_reset_clears_and_changes_widget_keys() {
        let mut state = SessionState::new();
        let id = ImageId::from_upload("a.png", 3);
        state.insert(id.clone(), entry("a"));
        let keys_before = state.widget_keys();

        assert_eq!(state.reset(), 1);
        assert!(state.get(&id).is_none());
        assert_eq!(state.cached_results(), 0);
        assert_ne!(state.widget_keys(), keys_before);
        assert_ne!(ImageId::from_camera(state.epoch(), 0), ImageId::from_camera(0, 0));
    }

    fn uploads(files: &[(&str, usize)]) -> CollectedInput {
        CollectedInput {
            uploads: files
                .iter()
                .map(|(name, size)| (name.to_string(), vec![0; *size]))
                .collect(),
            camera: None,
        }
    }

    fn capture(size: usize) -> CollectedInput {
        CollectedInput {
            uploads: Vec::new(),
            camera: Some(vec![1; size]),
        }
    }

    fn ids(state: &SessionState) -> Vec<String> {
        state
            .current_images()
            .iter()
            .map(|img| img.id.as_str().to_string())
            .collect()
    }

    #[test]
    fn test_current_images_ids_and_order() {
        let mut state = SessionState::new();
        state.reset();
        state.reset();
        state.apply_input(uploads(&[("a.PNG", 10), ("b.jpeg", 20)]));
        state.apply_input(capture(4));

        assert_eq!(ids(&state), vec!["a.PNG_10", "b.jpeg_20", "camera_2_2"]);
        let indices: Vec<usize> = state.current_images().iter().map(|i| i.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_untouched_widget_keeps_its_value() {
        let mut state = SessionState::new();
        state.apply_input(uploads(&[("a.png", 3)]));
        state.apply_input(capture(5));
        assert_eq!(ids(&state), vec!["a.png_3", "camera_0_1"]);

        state.apply_input(CollectedInput::default());
        assert_eq!(ids(&state), vec!["a.png_3", "camera_0_1"]);
    }

    #[test]
    fn test_new_selection_replaces_widget_value() {
        let mut state = SessionState::new();
        state.apply_input(uploads(&[("a.png", 3), ("b.png", 4)]));
        state.apply_input(uploads(&[("c.png", 7)]));
        assert_eq!(ids(&state), vec!["c.png_7"]);

        state.apply_input(capture(5));
        state.apply_input(capture(6));
        let images = state.current_images();
        assert_eq!(images.len(), 2);
        assert_eq!(images[1].bytes.len(), 6);
    }

    #[test]
    fn test_reset_empties_widgets() {
        let mut state = SessionState::new();
        state.apply_input(uploads(&[("a.png", 3)]));
        state.apply_input(capture(5));
        state.reset();
        assert!(state.current_images().is_empty());
    }

    #[tokio::test]
    async fn test_store_reuses_known_ids_only() {
        let store = SessionStore::new(None);
        let (id, _, created) = store.get_or_create(None);
        assert!(created);

        let (same, _, created) = store.get_or_create(Some(&id));
        assert_eq!(same, id);
        assert!(!created);

        let (other, _, created) = store.get_or_create(Some("forged"));
        assert!(created);
        assert_ne!(other, "forged");
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = SessionStore::new(None);
        let (_, a, _) = store.get_or_create(None);
        let (_, b, _) = store.get_or_create(None);

        a.lock().await.insert(ImageId::from_upload("x.png", 1), entry("x"));
        assert_eq!(a.lock().await.cached_results(), 1);
        assert_eq!(b.lock().await.cached_results(), 0);
    }

    #[tokio::test]
    async fn test_sweep_idle() {
        let metrics = Metrics::new();
        let store = SessionStore::new(Some(metrics.clone()));
        store.get_or_create(None);
        store.get_or_create(None);
        assert_eq!(metrics.snapshot().active_sessions, 2);

        assert_eq!(store.sweep_idle(Duration::from_secs(3600)), 0);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.sweep_idle(Duration::from_millis(10)), 2);
        assert!(store.is_empty());
        assert_eq!(metrics.snapshot().active_sessions, 0);
    }
}
