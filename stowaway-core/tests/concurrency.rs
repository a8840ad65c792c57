//! Concurrency tests for PluginManager
//!
//! These tests validate the publish model:
//! - `init` runs exactly one discovery pass however many threads race it
//! - Dispatch keeps working while other threads load and unload bundles
//! - Readers never see a bundle without its components or the reverse

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

mod common;

use common::{FnModule, Manifest, catalog_with, manager, reply_bundle};
use stowaway_bundle_api::LifecycleEvent;
use stowaway_core::{
    BundlePayload, BundleSource, HostHandle, MemorySource, ModuleCatalog, PluginManager,
    SourceError,
};

/// Source that counts discovery passes
struct CountingSource {
    inner: MemorySource,
    discoveries: AtomicUsize,
}

impl BundleSource for CountingSource {
    fn discover(&self) -> Result<Vec<PathBuf>, SourceError> {
        self.discoveries.fetch_add(1, Ordering::SeqCst);
        // Widen the race window.
        thread::sleep(std::time::Duration::from_millis(20));
        self.inner.discover()
    }

    fn read_bundle(&self, path: &Path) -> Result<BundlePayload, SourceError> {
        self.inner.read_bundle(path)
    }

    fn read_file(&self, location: &Path, relative: &Path) -> Result<Vec<u8>, SourceError> {
        self.inner.read_file(location, relative)
    }
}

fn bundles(count: usize) -> (MemorySource, ModuleCatalog) {
    let mut source = MemorySource::new();
    let mut catalog = ModuleCatalog::new();
    for i in 0..count {
        let id = format!("b{i}");
        source.insert(
            format!("mem/{id}"),
            Manifest::new(&id)
                .builtin(&id)
                .component(&format!("svc.{id}"), "Run")
                .build(),
        );
        catalog = catalog_with(catalog, &id, FnModule::new().with_reply("Run"));
    }
    (source, catalog)
}

#[test]
fn racing_init_runs_one_pass() {
    let (inner, catalog) = bundles(8);
    let source = Arc::new(CountingSource {
        inner,
        discoveries: AtomicUsize::new(0),
    });
    let manager = Arc::new(
        PluginManager::new(source.clone(), HostHandle::unattached()).with_catalog(catalog),
    );

    let threads = 16;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let report = manager.init();
                // Every caller returns only after the pass completed.
                assert_eq!(report.loaded.len(), 8);
                assert_eq!(manager.components().len(), 8);
                report.loaded.clone()
            })
        })
        .collect();

    let results: Vec<Vec<String>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(source.discoveries.load(Ordering::SeqCst), 1);
    assert!(results.windows(2).all(|pair| pair[0] == pair[1]));
}

#[test]
fn concurrent_init_matches_sequential_init() {
    let (source, catalog) = bundles(5);
    let sequential = manager(source.clone(), catalog.clone(), HostHandle::unattached());
    sequential.init();

    let concurrent = Arc::new(manager(source, catalog, HostHandle::unattached()));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let manager = Arc::clone(&concurrent);
            thread::spawn(move || {
                manager.init();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(sequential.components(), concurrent.components());
}

#[test]
fn dispatch_runs_while_bundles_come_and_go() {
    let (source, catalog) = bundles(4);
    let manager = Arc::new(manager(source, catalog, HostHandle::unattached()));
    manager.load(Path::new("mem/b0")).unwrap();

    let stop = Arc::new(AtomicBool::new(false));

    let churn = {
        let manager = Arc::clone(&manager);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut cycles = 0;
            while !stop.load(Ordering::Relaxed) && cycles < 200 {
                for id in ["b1", "b2", "b3"] {
                    manager.load(Path::new(&format!("mem/{id}"))).unwrap();
                }
                for id in ["b3", "b2", "b1"] {
                    manager.unload(id).unwrap();
                }
                cycles += 1;
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                for _ in 0..500 {
                    // The always-loaded bundle answers every time.
                    let outcome = manager
                        .dispatch("svc.b0", &LifecycleEvent::Start)
                        .unwrap();
                    assert_eq!(reply_bundle(&outcome), Some("b0"));

                    // A churning bundle is either fully there or fully gone.
                    match manager.dispatch("svc.b2", &LifecycleEvent::Start) {
                        Ok(outcome) => assert_eq!(reply_bundle(&outcome), Some("b2")),
                        Err(e) => assert!(e.is_routing_miss(), "unexpected error: {e}"),
                    }
                    for info in manager.bundles() {
                        assert_eq!(info.registration.accepted.len(), 1);
                    }
                }
            })
        })
        .collect();

    for reader in readers {
        reader.join().unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    churn.join().unwrap();
}

#[test]
fn racing_loads_of_one_bundle_have_one_winner() {
    let (source, catalog) = bundles(1);
    let manager = Arc::new(manager(source, catalog, HostHandle::unattached()));

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                manager.load(Path::new("mem/b0"))
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().filter_map(|r| r.as_ref().err()).all(|e| matches!(
        e,
        stowaway_core::PluginError::AlreadyLoaded { .. }
    )));
    assert_eq!(manager.components().len(), 1);
}
