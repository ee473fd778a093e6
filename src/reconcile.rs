//! Startup reconciliation between host-supplied annotations and the cached snapshot.
//!
//! Order matters:
//! 1. a clear directive erases the cache,
//! 2. supplied input is merged into the cache and written back right away,
//! 3. the cache is read and becomes the seed for both models.
//!
//! Running twice with the same input and no clear directive yields the same
//! snapshot, and running with no input resumes the previous session.

use serde::Deserialize;

use crate::measurement;
use crate::palette;
use crate::rectangle;
use crate::snapshot::{SavedEndpoint, SavedRectangle, Snapshot};
use crate::store::SnapshotStore;

/// Annotations handed over by the host at construction. `None` means "not supplied".
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalInput {
    #[serde(default)]
    pub rectangles: Option<Vec<SavedRectangle>>,
    #[serde(default)]
    pub endpoints: Option<Vec<SavedEndpoint>>,
    #[serde(default)]
    pub pixel_mm_ratio: Option<f64>,
}

impl ExternalInput {
    pub fn is_supplied(&self) -> bool {
        self.rectangles.is_some() || self.endpoints.is_some() || self.pixel_mm_ratio.is_some()
    }
}

/// Reads the cache, treating anything unreadable as an empty snapshot.
pub fn read_or_empty<S: SnapshotStore + ?Sized>(store: &S) -> Snapshot {
    match store.read() {
        Ok(Some(snapshot)) => snapshot.normalized(),
        Ok(None) => Snapshot::default(),
        Err(e) => {
            tracing::warn!(error = %e, "cached snapshot unreadable, starting empty");
            Snapshot::default()
        }
    }
}

/// Folds `input` into `cached`. Supplied rectangles replace cached ones with the
/// same label in place and new labels are appended; a supplied endpoint pair
/// replaces the cached pair. Empty lists change nothing.
pub fn merge(mut cached: Snapshot, input: &ExternalInput) -> Snapshot {
    if let Some(rects) = &input.rectangles {
        let mut supplied_labels = std::collections::HashSet::new();
        for rect in rects {
            if !supplied_labels.insert(rect.label.as_str()) {
                tracing::warn!(label = %rect.label, "duplicate label in supplied rectangles");
                continue;
            }
            match cached.rectangles.iter_mut().find(|r| r.label == rect.label) {
                Some(slot) => *slot = stamped(rect, Some(&*slot)),
                None => cached.rectangles.push(stamped(rect, None)),
            }
        }
    }

    match input.endpoints.as_deref() {
        Some(pair @ [_, _]) => cached.endpoints = pair.to_vec(),
        Some([]) | None => {}
        Some(other) => {
            tracing::warn!(count = other.len(), "ignoring supplied endpoints that are not a pair");
        }
    }

    match input.pixel_mm_ratio {
        Some(ratio) if measurement::is_valid_ratio(ratio) => cached.pixel_mm_ratio = ratio,
        Some(ratio) => tracing::warn!(ratio, "ignoring invalid supplied pixel/mm ratio"),
        None => {}
    }

    cached
}

/// Supplied rectangle with its color and timestamp filled in, so the durable
/// copy matches what every later open will load. Missing fields come from the
/// cached rectangle it replaces, then from the label table and the clock.
fn stamped(rect: &SavedRectangle, cached: Option<&SavedRectangle>) -> SavedRectangle {
    let color = rect
        .color
        .clone()
        .or_else(|| cached.and_then(|c| c.color.clone()))
        .unwrap_or_else(|| palette::color_for_label(&rect.label).to_owned());
    let timestamp = rect
        .timestamp
        .clone()
        .or_else(|| cached.and_then(|c| c.timestamp.clone()))
        .unwrap_or_else(rectangle::now_rfc3339);
    SavedRectangle {
        color: Some(color),
        timestamp: Some(timestamp),
        ..rect.clone()
    }
}

/// Runs the startup sequence and returns the authoritative seed.
///
/// Store failures are logged and never abort: if the merged input cannot be
/// written, the merged value is used as the seed directly.
pub fn reconcile<S: SnapshotStore + ?Sized>(
    store: &mut S,
    clear: bool,
    input: &ExternalInput,
) -> Snapshot {
    // Whether the store can be trusted to hold nothing from earlier sessions.
    let mut cleared = true;
    if clear {
        match store.erase() {
            Ok(()) => tracing::info!("cleared persisted annotations"),
            Err(e) => {
                tracing::warn!(error = %e, "failed to erase persisted annotations, overwriting");
                if let Err(e) = store.write(&Snapshot::default()) {
                    tracing::warn!(error = %e, "failed to clear persisted annotations");
                    cleared = false;
                }
            }
        }
    }

    if input.is_supplied() {
        let base = if clear {
            Snapshot::default()
        } else {
            read_or_empty(store)
        };
        let merged = merge(base, input).normalized();
        if let Err(e) = store.write(&merged) {
            tracing::warn!(error = %e, "failed to persist supplied annotations");
            return merged;
        }
        tracing::info!(
            rectangles = merged.rectangles.len(),
            endpoints = merged.endpoints.len(),
            "merged supplied annotations into cache"
        );
    } else if !cleared {
        return Snapshot::default();
    }

    let seed = read_or_empty(store);
    tracing::debug!(
        rectangles = seed.rectangles.len(),
        endpoints = seed.endpoints.len(),
        ratio = seed.pixel_mm_ratio,
        "reconciled snapshot"
    );
    seed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreError};

    fn rect(label: &str, x: i64) -> SavedRectangle {
        SavedRectangle {
            label: label.into(),
            x,
            y: 0,
            width: 20,
            height: 20,
            color: Some("#112233".into()),
            timestamp: Some("2024-05-01T10:00:00+00:00".into()),
        }
    }

    fn input(rects: Vec<SavedRectangle>) -> ExternalInput {
        ExternalInput {
            rectangles: Some(rects),
            ..ExternalInput::default()
        }
    }

    #[test]
    fn no_input_resumes_cache() {
        let cached = Snapshot {
            rectangles: vec![rect("A", 1)],
            ..Snapshot::default()
        };
        let mut store = MemoryStore::new();
        store.write(&cached).unwrap();
        let seed = reconcile(&mut store, false, &ExternalInput::default());
        assert_eq!(seed, cached);
        assert_eq!(store.writes(), 1);
    }

    #[test]
    fn same_input_twice_is_idempotent() {
        let mut store = MemoryStore::new();
        let i = input(vec![rect("A", 1), rect("B", 2)]);
        let first = reconcile(&mut store, false, &i);
        let second = reconcile(&mut store, false, &i);
        assert_eq!(first, second);
        assert_eq!(first.rectangles.len(), 2);
    }

    #[test]
    fn clear_directive_drops_prior_session() {
        let mut store = MemoryStore::new();
        store
            .write(&Snapshot {
                rectangles: vec![rect("Old", 9)],
                endpoints: vec![SavedEndpoint { x: 0, y: 0 }, SavedEndpoint { x: 5, y: 5 }],
                pixel_mm_ratio: 0.3,
            })
            .unwrap();
        let seed = reconcile(&mut store, true, &input(vec![rect("A", 1)]));
        assert_eq!(seed.rectangles, vec![rect("A", 1)]);
        assert!(seed.endpoints.is_empty());
        assert_eq!(seed.pixel_mm_ratio, measurement::DEFAULT_PIXEL_MM_RATIO);
    }

    #[test]
    fn clear_without_input_starts_empty() {
        let mut store = MemoryStore::new();
        store
            .write(&Snapshot {
                rectangles: vec![rect("Old", 9)],
                ..Snapshot::default()
            })
            .unwrap();
        assert_eq!(reconcile(&mut store, true, &ExternalInput::default()), Snapshot::default());
    }

    /// Store whose erase always fails, optionally with failing writes too.
    struct StuckStore(MemoryStore);

    impl SnapshotStore for StuckStore {
        fn read(&self) -> Result<Option<Snapshot>, StoreError> {
            self.0.read()
        }

        fn write(&mut self, snapshot: &Snapshot) -> Result<(), StoreError> {
            self.0.write(snapshot)
        }

        fn erase(&mut self) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("read-only".into()))
        }
    }

    fn stuck_with_old() -> StuckStore {
        let mut inner = MemoryStore::new();
        inner
            .write(&Snapshot {
                rectangles: vec![rect("Old", 9)],
                ..Snapshot::default()
            })
            .unwrap();
        StuckStore(inner)
    }

    #[test]
    fn failed_erase_still_clears() {
        let mut store = stuck_with_old();
        let seed = reconcile(&mut store, true, &ExternalInput::default());
        assert_eq!(seed, Snapshot::default());
        assert_eq!(store.read().unwrap(), Some(Snapshot::default()));

        let mut store = stuck_with_old();
        let seed = reconcile(&mut store, true, &input(vec![rect("A", 1)]));
        assert_eq!(seed.rectangles, vec![rect("A", 1)]);
    }

    #[test]
    fn failed_erase_and_write_seeds_empty_or_input() {
        let mut store = stuck_with_old();
        store.0.set_fail_writes(true);
        assert_eq!(reconcile(&mut store, true, &ExternalInput::default()), Snapshot::default());

        let seed = reconcile(&mut store, true, &input(vec![rect("A", 1)]));
        assert_eq!(seed.rectangles, vec![rect("A", 1)]);
    }

    #[test]
    fn unstamped_input_is_stable_across_opens() {
        let bare = SavedRectangle {
            color: None,
            timestamp: None,
            ..rect("Palate", 4)
        };
        let mut store = MemoryStore::new();
        let first = reconcile(&mut store, false, &input(vec![bare.clone()]));
        let second = reconcile(&mut store, false, &input(vec![bare]));
        assert_eq!(first, second);

        let saved = &second.rectangles[0];
        assert_eq!(saved.color.as_deref(), Some("#3498DB"));
        assert!(saved.timestamp.is_some());
    }

    #[test]
    fn unstamped_input_keeps_cached_timestamp() {
        let cached = Snapshot {
            rectangles: vec![rect("A", 1)],
            ..Snapshot::default()
        };
        let merged = merge(
            cached,
            &input(vec![SavedRectangle {
                color: None,
                timestamp: None,
                ..rect("A", 5)
            }]),
        );
        assert_eq!(merged.rectangles, vec![rect("A", 5)]);
    }

    #[test]
    fn merge_replaces_by_label_and_appends() {
        let cached = Snapshot {
            rectangles: vec![rect("A", 1), rect("B", 2)],
            ..Snapshot::default()
        };
        let merged = merge(cached, &input(vec![rect("B", 7), rect("C", 3), rect("C", 4)]));
        let xs: Vec<_> = merged.rectangles.iter().map(|r| (r.label.as_str(), r.x)).collect();
        assert_eq!(xs, [("A", 1), ("B", 7), ("C", 3)]);
    }

    #[test]
    fn merge_endpoints_and_ratio() {
        let pair = vec![SavedEndpoint { x: 1, y: 2 }, SavedEndpoint { x: 3, y: 4 }];
        let cached = Snapshot {
            endpoints: pair.clone(),
            ..Snapshot::default()
        };
        let kept = merge(
            cached.clone(),
            &ExternalInput {
                endpoints: Some(vec![SavedEndpoint { x: 9, y: 9 }]),
                pixel_mm_ratio: Some(0.0),
                ..ExternalInput::default()
            },
        );
        assert_eq!(kept.endpoints, pair);
        assert_eq!(kept.pixel_mm_ratio, measurement::DEFAULT_PIXEL_MM_RATIO);

        let replaced = merge(
            cached,
            &ExternalInput {
                endpoints: Some(vec![SavedEndpoint { x: 0, y: 0 }, SavedEndpoint { x: 30, y: 40 }]),
                pixel_mm_ratio: Some(0.25),
                ..ExternalInput::default()
            },
        );
        assert_eq!(replaced.endpoints[1], SavedEndpoint { x: 30, y: 40 });
        assert_eq!(replaced.pixel_mm_ratio, 0.25);
    }

    #[test]
    fn malformed_cache_fails_open() {
        let mut store = MemoryStore::with_raw("{\"rectangles\": 12");
        let seed = reconcile(&mut store, false, &ExternalInput::default());
        assert_eq!(seed, Snapshot::default());

        let seed = reconcile(&mut store, false, &input(vec![rect("A", 1)]));
        assert_eq!(seed.rectangles.len(), 1);
        assert!(store.read().is_ok());
    }

    #[test]
    fn write_failure_still_seeds_from_input() {
        let mut store = MemoryStore::new();
        store.set_fail_writes(true);
        let seed = reconcile(&mut store, false, &input(vec![rect("A", 1)]));
        assert_eq!(seed.rectangles, vec![rect("A", 1)]);
        assert!(store.raw().is_none());
    }

    #[test]
    fn external_input_reads_camel_case() {
        let i: ExternalInput =
            serde_json::from_str(r#"{"endpoints": [{"x": 1, "y": 2}, {"x": 3.4, "y": 4}], "pixelMmRatio": 0.2}"#)
                .unwrap();
        assert!(i.rectangles.is_none());
        assert_eq!(i.endpoints.unwrap()[1].x, 3);
        assert_eq!(i.pixel_mm_ratio, Some(0.2));
    }
}
