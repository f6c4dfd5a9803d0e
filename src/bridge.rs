use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;

use crate::{
    backend::{FetchResult, Fut, ThumbnailBackend},
    BackendError, BridgeConfig, BridgeError, Size, Thumbnail,
};

mod pending;
use pending::{Completer, PendingRequest};

// called from a loader thread, `None` means "no thumbnail available"
pub trait ImageProvider: Send + Sync {
    fn request_image(&self, id: &str, requested: Size) -> Option<Thumbnail>;
}

/// Presents a blocking thumbnail request over an asynchronous [`ThumbnailBackend`].
///
/// Requests through one bridge are serialized: the next request is not
/// dispatched until the previous one returned. Completions run on the runtime
/// behind `runtime`, so [`request`](Self::request) must not be called from one
/// of its worker threads.
pub struct ThumbnailBridge {
    runtime: Handle,
    config: BridgeConfig,
    backend: RwLock<Option<Arc<dyn ThumbnailBackend>>>,
    gate: Mutex<()>,
}

impl ThumbnailBridge {
    pub fn new(runtime: Handle, config: BridgeConfig) -> Self {
        Self {
            runtime,
            config,
            backend: RwLock::new(None),
            gate: Mutex::new(()),
        }
    }

    pub fn with_backend(mut self, backend: Arc<dyn ThumbnailBackend>) -> Self {
        *self.backend.get_mut() = Some(backend);
        self
    }

    pub const fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn set_backend(&self, backend: Option<Arc<dyn ThumbnailBackend>>) {
        *self.backend.write() = backend;
    }

    pub fn backend(&self) -> Option<Arc<dyn ThumbnailBackend>> {
        self.backend.read().clone()
    }

    pub fn request(&self, id: &str, requested: Size) -> Result<Thumbnail, BridgeError> {
        let _gate = self.gate.lock();
        tracing::debug!(id, %requested, "requesting thumbnail");

        let backend = self.backend().ok_or(BridgeError::Unconfigured)?;
        if id.is_empty() {
            return Err(BridgeError::InvalidId);
        }

        let max = self.config.max_size;
        let (width, height) = max.limit(requested.or_default(self.config.default_size));
        let fut = {
            let _enter = self.runtime.enter();
            backend
                .fetch_thumbnail(id, width, height)
                .map_err(BridgeError::Dispatch)?
        };

        let pending = PendingRequest::new();
        self.runtime.spawn(Self::complete(
            id.to_string(),
            requested,
            max,
            fut,
            pending.completer(),
        ));

        pending.wait(self.config.timeout)
    }

    async fn complete(
        id: String,
        requested: Size,
        max: Size,
        fut: Fut<FetchResult>,
        completer: Completer,
    ) {
        let data = match fut.wait().await {
            Some(Ok(data)) => data,
            Some(Err(err)) => {
                completer.complete(Err(BridgeError::Backend(err)));
                return;
            }
            None => {
                completer.complete(Err(BridgeError::Backend(BackendError::Dropped)));
                return;
            }
        };

        // a panic while decoding drops the completer, which still wakes the caller
        let _ = tokio::task::spawn_blocking(move || {
            let outcome = Thumbnail::decode(&id, &data, requested, max);
            if let Ok(thumbnail) = &outcome {
                tracing::debug!(id = %id, size = %thumbnail.size(), "decoded thumbnail");
            }
            if !completer.complete(outcome) {
                tracing::debug!(id = %id, "discarding late thumbnail");
            }
        })
        .await;
    }
}

impl ImageProvider for ThumbnailBridge {
    fn request_image(&self, id: &str, requested: Size) -> Option<Thumbnail> {
        match self.request(id, requested) {
            Ok(thumbnail) => Some(thumbnail),
            Err(BridgeError::Unconfigured) => {
                tracing::debug!(id, "no backend configured");
                None
            }
            Err(err) => {
                tracing::warn!(id, %err, "could not fetch thumbnail");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::{Duration, Instant},
    };

    use tokio::sync::oneshot;

    use super::*;
    use crate::thumbnail::tests::png;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap()
    }

    fn config(timeout: Duration) -> BridgeConfig {
        BridgeConfig {
            timeout,
            ..BridgeConfig::default()
        }
    }

    // serves a `scale * width` by `scale * height` png and records every call
    #[derive(Default)]
    struct MockBackend {
        scale: u32,
        fixed: Option<(u32, u32)>,
        calls: Mutex<Vec<(String, u32, u32)>>,
    }

    impl MockBackend {
        fn fixed(width: u32, height: u32) -> Self {
            Self {
                fixed: Some((width, height)),
                ..Self::default()
            }
        }

        fn scaled(scale: u32) -> Self {
            Self {
                scale,
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<(String, u32, u32)> {
            self.calls.lock().clone()
        }
    }

    impl ThumbnailBackend for MockBackend {
        fn fetch_thumbnail(
            &self,
            id: &str,
            width: u32,
            height: u32,
        ) -> Result<Fut<FetchResult>, BackendError> {
            self.calls.lock().push((id.to_string(), width, height));
            let (w, h) = self
                .fixed
                .unwrap_or((width * self.scale, height * self.scale));
            Ok(Fut::spawn(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(png(w, h))
            }))
        }
    }

    struct FailingBackend;

    impl ThumbnailBackend for FailingBackend {
        fn fetch_thumbnail(&self, _: &str, _: u32, _: u32) -> Result<Fut<FetchResult>, BackendError> {
            Ok(Fut::spawn(async {
                Err(BackendError::Server {
                    status: 404,
                    errcode: "M_NOT_FOUND".to_string(),
                    message: "gone".to_string(),
                })
            }))
        }
    }

    struct RefusingBackend;

    impl ThumbnailBackend for RefusingBackend {
        fn fetch_thumbnail(&self, id: &str, _: u32, _: u32) -> Result<Fut<FetchResult>, BackendError> {
            Err(BackendError::InvalidId(id.to_string()))
        }
    }

    // never answers, but keeps the sender alive
    #[derive(Default)]
    struct SilentBackend {
        senders: Mutex<Vec<oneshot::Sender<FetchResult>>>,
    }

    impl ThumbnailBackend for SilentBackend {
        fn fetch_thumbnail(&self, _: &str, _: u32, _: u32) -> Result<Fut<FetchResult>, BackendError> {
            let (tx, rx) = oneshot::channel();
            self.senders.lock().push(tx);
            Ok(Fut::new(rx))
        }
    }

    struct VanishingBackend;

    impl ThumbnailBackend for VanishingBackend {
        fn fetch_thumbnail(&self, _: &str, _: u32, _: u32) -> Result<Fut<FetchResult>, BackendError> {
            let (_tx, rx) = oneshot::channel();
            Ok(Fut::new(rx))
        }
    }

    struct GarbageBackend;

    impl ThumbnailBackend for GarbageBackend {
        fn fetch_thumbnail(&self, _: &str, _: u32, _: u32) -> Result<Fut<FetchResult>, BackendError> {
            Ok(Fut::ready(Ok(b"<html>not an image</html>".to_vec())))
        }
    }

    #[test]
    fn test_unconfigured_returns_immediately() {
        let rt = runtime();
        let bridge = ThumbnailBridge::new(rt.handle().clone(), config(Duration::from_secs(30)));

        let start = Instant::now();
        assert!(matches!(
            bridge.request("mxc://server/abc", Size::new(50, 50)),
            Err(BridgeError::Unconfigured)
        ));
        assert!(bridge.request_image("mxc://server/abc", Size::new(50, 50)).is_none());
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_empty_id_is_rejected_without_dispatch() {
        let rt = runtime();
        let backend = Arc::new(MockBackend::fixed(10, 10));
        let bridge = ThumbnailBridge::new(rt.handle().clone(), BridgeConfig::default())
            .with_backend(backend.clone());

        assert!(matches!(
            bridge.request("", Size::new(10, 10)),
            Err(BridgeError::InvalidId)
        ));
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_scales_to_fit_requested_size() {
        let rt = runtime();
        let backend = Arc::new(MockBackend::fixed(200, 200));
        let bridge = ThumbnailBridge::new(rt.handle().clone(), BridgeConfig::default())
            .with_backend(backend.clone());

        let thumb = bridge
            .request_image("mxc://server/abc", Size::new(50, 50))
            .expect("thumbnail");
        assert_eq!(thumb.size(), Size::new(50, 50));
        assert_eq!(thumb.pixels().dimensions(), (50, 50));
        assert_eq!(
            backend.calls(),
            vec![("mxc://server/abc".to_string(), 50, 50)]
        );
    }

    #[test]
    fn test_unset_size_dispatches_default() {
        let rt = runtime();
        let backend = Arc::new(MockBackend::fixed(100, 100));
        let bridge = ThumbnailBridge::new(rt.handle().clone(), BridgeConfig::default())
            .with_backend(backend.clone());

        let thumb = bridge
            .request_image("mxc://server/abc", Size::new(0, 0))
            .expect("thumbnail");
        assert_eq!(thumb.size(), Size::new(100, 100));
        assert_eq!(
            backend.calls(),
            vec![("mxc://server/abc".to_string(), 100, 100)]
        );
    }

    #[test]
    fn test_partially_unset_size() {
        let rt = runtime();
        let backend = Arc::new(MockBackend::fixed(200, 100));
        let bridge = ThumbnailBridge::new(rt.handle().clone(), BridgeConfig::default())
            .with_backend(backend.clone());

        let thumb = bridge
            .request_image("mxc://server/abc", Size::new(40, -1))
            .expect("thumbnail");
        assert_eq!(thumb.size(), Size::new(40, 20));
        assert_eq!(
            backend.calls(),
            vec![("mxc://server/abc".to_string(), 40, 100)]
        );
    }

    #[test]
    fn test_backend_failure_unblocks_caller() {
        let rt = runtime();
        let bridge = ThumbnailBridge::new(rt.handle().clone(), config(Duration::from_secs(30)))
            .with_backend(Arc::new(FailingBackend));

        let start = Instant::now();
        assert!(matches!(
            bridge.request("mxc://server/abc", Size::new(10, 10)),
            Err(BridgeError::Backend(BackendError::Server { status: 404, .. }))
        ));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_dispatch_failure_returns_without_blocking() {
        let rt = runtime();
        let bridge = ThumbnailBridge::new(rt.handle().clone(), config(Duration::from_secs(30)))
            .with_backend(Arc::new(RefusingBackend));

        let start = Instant::now();
        assert!(matches!(
            bridge.request("nope", Size::new(10, 10)),
            Err(BridgeError::Dispatch(BackendError::InvalidId(..)))
        ));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_dropped_request_unblocks_caller() {
        let rt = runtime();
        let bridge = ThumbnailBridge::new(rt.handle().clone(), config(Duration::from_secs(30)))
            .with_backend(Arc::new(VanishingBackend));

        let start = Instant::now();
        assert!(matches!(
            bridge.request("mxc://server/abc", Size::new(10, 10)),
            Err(BridgeError::Backend(BackendError::Dropped))
        ));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_undecodable_response() {
        let rt = runtime();
        let bridge = ThumbnailBridge::new(rt.handle().clone(), BridgeConfig::default())
            .with_backend(Arc::new(GarbageBackend));

        assert!(matches!(
            bridge.request("mxc://server/abc", Size::new(10, 10)),
            Err(BridgeError::Decode(..))
        ));
    }

    #[test]
    fn test_silent_backend_times_out() {
        let rt = runtime();
        let timeout = Duration::from_millis(100);
        let bridge = ThumbnailBridge::new(rt.handle().clone(), config(timeout))
            .with_backend(Arc::new(SilentBackend::default()));

        let start = Instant::now();
        assert!(matches!(
            bridge.request("mxc://server/abc", Size::new(10, 10)),
            Err(BridgeError::Timeout(t)) if t == timeout
        ));
        assert!(start.elapsed() >= timeout);
        assert!(bridge.request_image("mxc://server/abc", Size::new(10, 10)).is_none());
    }

    #[test]
    fn test_late_answer_does_not_leak_into_next_request() {
        let rt = runtime();
        let silent = Arc::new(SilentBackend::default());
        let bridge = ThumbnailBridge::new(rt.handle().clone(), config(Duration::from_millis(50)))
            .with_backend(silent.clone());

        assert!(bridge.request("mxc://server/late", Size::new(10, 10)).is_err());

        bridge.set_backend(Some(Arc::new(MockBackend::fixed(30, 30))));
        for tx in silent.senders.lock().drain(..) {
            let _ = tx.send(Ok(png(7, 7)));
        }

        let thumb = bridge
            .request("mxc://server/next", Size::new(0, 0))
            .unwrap();
        assert_eq!(thumb.size(), Size::new(30, 30));
    }

    #[test]
    fn test_set_backend_applies_to_next_request() {
        let rt = runtime();
        let first = Arc::new(MockBackend::fixed(10, 10));
        let second = Arc::new(MockBackend::fixed(20, 20));
        let bridge = ThumbnailBridge::new(rt.handle().clone(), BridgeConfig::default())
            .with_backend(first.clone());

        assert!(bridge.request_image("mxc://server/a", Size::new(0, 0)).is_some());
        bridge.set_backend(Some(second.clone()));
        let thumb = bridge.request_image("mxc://server/b", Size::new(0, 0)).unwrap();

        assert_eq!(thumb.size(), Size::new(20, 20));
        assert_eq!(first.calls().len(), 1);
        assert_eq!(second.calls().len(), 1);

        bridge.set_backend(None);
        assert!(bridge.backend().is_none());
        assert!(matches!(
            bridge.request("mxc://server/c", Size::new(0, 0)),
            Err(BridgeError::Unconfigured)
        ));
    }

    #[test]
    fn test_set_backend_during_request_keeps_in_flight_result() {
        struct GatedBackend {
            started: Mutex<std::sync::mpsc::Sender<()>>,
            release: Mutex<Option<oneshot::Receiver<()>>>,
        }

        impl ThumbnailBackend for GatedBackend {
            fn fetch_thumbnail(&self, _: &str, _: u32, _: u32) -> Result<Fut<FetchResult>, BackendError> {
                let release = self.release.lock().take().expect("single request");
                let _ = self.started.lock().send(());
                Ok(Fut::spawn(async move {
                    let _ = release.await;
                    Ok(png(64, 32))
                }))
            }
        }

        let rt = runtime();
        let (started_tx, started_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = oneshot::channel();
        let gated = Arc::new(GatedBackend {
            started: Mutex::new(started_tx),
            release: Mutex::new(Some(release_rx)),
        });

        let bridge = Arc::new(
            ThumbnailBridge::new(rt.handle().clone(), config(Duration::from_secs(10)))
                .with_backend(gated),
        );

        let caller = std::thread::spawn({
            let bridge = Arc::clone(&bridge);
            move || bridge.request("mxc://server/abc", Size::new(32, 32))
        });

        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        bridge.set_backend(Some(Arc::new(MockBackend::fixed(1, 1))));
        release_tx.send(()).unwrap();

        let thumb = caller.join().unwrap().unwrap();
        assert_eq!(thumb.size(), Size::new(32, 16));
    }

    #[test]
    fn test_concurrent_callers_get_their_own_results() {
        let rt = runtime();
        let backend = Arc::new(MockBackend::scaled(2));
        let bridge = Arc::new(
            ThumbnailBridge::new(rt.handle().clone(), config(Duration::from_secs(10)))
                .with_backend(backend.clone()),
        );

        let done = Arc::new(AtomicUsize::new(0));
        let handles = (1..=8)
            .map(|i| {
                let bridge = Arc::clone(&bridge);
                let done = Arc::clone(&done);
                std::thread::spawn(move || {
                    // 2:1 aspect so every caller's result is distinguishable
                    let requested = Size::new(i * 8, i * 4);
                    let thumb = bridge
                        .request(&format!("mxc://server/{i}"), requested)
                        .unwrap();
                    done.fetch_add(1, Ordering::SeqCst);
                    (requested, thumb.size())
                })
            })
            .collect::<Vec<_>>();

        for handle in handles {
            let (requested, actual) = handle.join().unwrap();
            assert_eq!(requested, actual);
        }

        assert_eq!(done.load(Ordering::SeqCst), 8);
        let mut calls = backend.calls();
        calls.sort();
        assert_eq!(calls.len(), 8);
        for (id, w, h) in calls {
            let i = id.trim_start_matches("mxc://server/").parse::<u32>().unwrap();
            assert_eq!((w, h), (i * 8, i * 4));
        }
    }

    #[test]
    fn test_oversized_request_is_limited() {
        let rt = runtime();
        let backend = Arc::new(MockBackend::fixed(1, 1));
        let config = BridgeConfig {
            max_size: Size::new(64, 64),
            ..BridgeConfig::default()
        };
        let bridge = ThumbnailBridge::new(rt.handle().clone(), config).with_backend(backend.clone());

        let thumb = bridge
            .request("mxc://server/abc", Size::new(i32::MAX, i32::MAX))
            .unwrap();
        assert_eq!(thumb.size(), Size::new(64, 64));
        assert_eq!(
            backend.calls(),
            vec![("mxc://server/abc".to_string(), 64, 64)]
        );
    }

    #[test]
    fn test_only_one_request_in_flight() {
        #[derive(Default)]
        struct CountingBackend {
            in_flight: Arc<AtomicUsize>,
            peak: Arc<AtomicUsize>,
        }

        impl ThumbnailBackend for CountingBackend {
            fn fetch_thumbnail(&self, _: &str, w: u32, h: u32) -> Result<Fut<FetchResult>, BackendError> {
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);

                let in_flight = Arc::clone(&self.in_flight);
                Ok(Fut::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(png(w, h))
                }))
            }
        }

        let rt = runtime();
        let backend = Arc::new(CountingBackend::default());
        let bridge = Arc::new(
            ThumbnailBridge::new(rt.handle().clone(), config(Duration::from_secs(10)))
                .with_backend(backend.clone()),
        );

        let handles = (1..=8)
            .map(|i| {
                let bridge = Arc::clone(&bridge);
                std::thread::spawn(move || {
                    bridge
                        .request(&format!("mxc://server/{i}"), Size::new(i, i))
                        .map(|thumb| thumb.size())
                })
            })
            .collect::<Vec<_>>();

        for (i, handle) in (1..=8).zip(handles) {
            assert_eq!(handle.join().unwrap().unwrap(), Size::new(i, i));
        }

        assert_eq!(backend.peak.load(Ordering::SeqCst), 1);
        assert_eq!(backend.in_flight.load(Ordering::SeqCst), 0);
    }
}
