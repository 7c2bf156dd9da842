//! Service watcher.
//!
//! The kube watcher reports a re-list as `Init`, `InitApply`... `InitDone`
//! and afterwards only `Apply` and `Delete`. [`EventClassifier`] remembers
//! which objects it has seen so these become add, update and delete
//! notifications, and reports objects missing from a re-list as deleted.
//!
//! Forwarding rules:
//! - add: always sent as [`ServiceEvent::Created`];
//! - update: sent as `Created` only when the label is `"true"`;
//! - delete: always sent as [`ServiceEvent::Deleted`].
//!
//! Creations and deletions share one channel holding a single event, so
//! events for an object reach the controller loop in watch order and a
//! busy loop stalls the watch instead of dropping events.

use std::collections::{HashMap, HashSet};
use std::fmt::Display;

use futures::{Stream, StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::Service;
use kube::api::{Api, ListParams};
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{ControllerError, Result};
use crate::service::{ServiceEvent, ServiceMeta};

/// Capacity of the event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 1;

/// A watch event carrying typed Service metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A re-list started.
    Init,
    /// An object returned by the re-list.
    InitApply(ServiceMeta),
    /// The re-list finished.
    InitDone,
    /// An object was created or modified.
    Apply(ServiceMeta),
    /// An object was deleted.
    Delete(ServiceMeta),
}

impl From<Event<Service>> for WatchEvent {
    fn from(event: Event<Service>) -> Self {
        match event {
            Event::Init => Self::Init,
            Event::InitApply(service) => Self::InitApply(ServiceMeta::from_service(&service)),
            Event::InitDone => Self::InitDone,
            Event::Apply(service) => Self::Apply(ServiceMeta::from_service(&service)),
            Event::Delete(service) => Self::Delete(ServiceMeta::from_service(&service)),
        }
    }
}

/// Informer-style classification of a watch event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    /// First sighting of the object.
    Added(ServiceMeta),
    /// A known object changed (or was re-listed).
    Updated(ServiceMeta),
    /// The object is gone.
    Deleted(ServiceMeta),
}

impl Classified {
    /// Applies the forwarding rules.
    #[must_use]
    pub fn into_service_event(self) -> Option<ServiceEvent> {
        match self {
            Self::Added(meta) => Some(ServiceEvent::Created(meta)),
            Self::Updated(meta) if meta.lifecycle().is_requested() => {
                Some(ServiceEvent::Created(meta))
            }
            Self::Updated(_) => None,
            Self::Deleted(meta) => Some(ServiceEvent::Deleted(meta)),
        }
    }
}

/// Tracks seen objects to turn watch events into add/update/delete.
#[derive(Debug, Default)]
pub struct EventClassifier {
    known: HashMap<(String, String), ServiceMeta>,
    relisted: Option<HashSet<(String, String)>>,
}

impl EventClassifier {
    /// Creates a classifier that has seen nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects currently known.
    #[must_use]
    pub fn known(&self) -> usize {
        self.known.len()
    }

    /// Classifies one watch event.
    pub fn classify(&mut self, event: WatchEvent) -> Vec<Classified> {
        match event {
            WatchEvent::Init => {
                self.relisted = Some(HashSet::new());
                Vec::new()
            }
            WatchEvent::InitApply(meta) => {
                if let Some(relisted) = &mut self.relisted {
                    relisted.insert(meta.key());
                }
                vec![self.apply(meta)]
            }
            WatchEvent::InitDone => {
                let Some(relisted) = self.relisted.take() else {
                    return Vec::new();
                };
                let vanished: Vec<_> = self
                    .known
                    .keys()
                    .filter(|key| !relisted.contains(*key))
                    .cloned()
                    .collect();
                vanished
                    .into_iter()
                    .filter_map(|key| self.known.remove(&key))
                    .map(Classified::Deleted)
                    .collect()
            }
            WatchEvent::Apply(meta) => vec![self.apply(meta)],
            WatchEvent::Delete(meta) => {
                self.known.remove(&meta.key());
                vec![Classified::Deleted(meta)]
            }
        }
    }

    fn apply(&mut self, meta: ServiceMeta) -> Classified {
        match self.known.insert(meta.key(), meta.clone()) {
            Some(_) => Classified::Updated(meta),
            None => Classified::Added(meta),
        }
    }
}

/// Sending half of the watcher's event channel.
#[derive(Debug, Clone)]
pub struct EventSink {
    events: mpsc::Sender<ServiceEvent>,
}

/// Receiving half of the watcher's event channel.
#[derive(Debug)]
pub struct EventSource {
    events: mpsc::Receiver<ServiceEvent>,
}

/// Creates the channel carrying creation and deletion events in order.
#[must_use]
pub fn event_channels() -> (EventSink, EventSource) {
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    (EventSink { events: tx }, EventSource { events: rx })
}

impl EventSink {
    /// Sends an event, waiting for room; false once the consumer is gone.
    pub async fn send(&self, event: ServiceEvent) -> bool {
        match &event {
            ServiceEvent::Created(meta) => {
                info!(name = %meta.name, namespace = %meta.namespace, "service created");
            }
            ServiceEvent::Deleted(meta) => {
                info!(name = %meta.name, namespace = %meta.namespace, "service deleted");
            }
        }
        self.events.send(event).await.is_ok()
    }
}

impl EventSource {
    /// Receives the next event; `None` once every sink is dropped.
    pub async fn recv(&mut self) -> Option<ServiceEvent> {
        self.events.recv().await
    }
}

/// Classifies `stream` and forwards the resulting events to `sink`.
///
/// Stream errors are logged and skipped. Returns when the stream ends or
/// the consumer goes away.
pub async fn forward_events<St, E>(stream: St, sink: &EventSink) -> Result<()>
where
    St: Stream<Item = std::result::Result<WatchEvent, E>>,
    E: Display,
{
    let mut stream = std::pin::pin!(stream);
    let mut classifier = EventClassifier::new();

    while let Some(event) = stream.next().await {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "service watch error, will retry");
                continue;
            }
        };

        for classified in classifier.classify(event) {
            debug!(?classified, "classified watch event");
            if let Some(event) = classified.into_service_event() {
                if !sink.send(event).await {
                    info!("event consumer closed, stopping watcher");
                    return Ok(());
                }
            }
        }
    }

    Ok(())
}

/// Watches `api` and forwards Service events to `sink`.
///
/// # Errors
///
/// Returns [`ControllerError::Watch`] if the Service API cannot be reached
/// at start-up.
pub async fn run_watcher(api: Api<Service>, sink: EventSink) -> Result<()> {
    api.list(&ListParams::default().limit(1))
        .await
        .map_err(|e| ControllerError::Watch(format!("cannot list services: {e}")))?;

    info!("watching services");
    let stream = watcher::watcher(api, watcher::Config::default())
        .default_backoff()
        .map_ok(WatchEvent::from);

    forward_events(stream, &sink).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::GENCERT_LABEL;
    use std::time::Duration;

    fn svc(name: &str, label: Option<&str>) -> ServiceMeta {
        let meta = ServiceMeta::new(name, "ns1");
        match label {
            Some(value) => meta.with_label(GENCERT_LABEL, value),
            None => meta,
        }
    }

    #[test]
    fn apply_of_new_object_is_add() {
        let mut classifier = EventClassifier::new();
        let out = classifier.classify(WatchEvent::Apply(svc("web", None)));
        assert_eq!(out, [Classified::Added(svc("web", None))]);

        let out = classifier.classify(WatchEvent::Apply(svc("web", Some("true"))));
        assert_eq!(out, [Classified::Updated(svc("web", Some("true")))]);
    }

    #[test]
    fn delete_forgets_object() {
        let mut classifier = EventClassifier::new();
        classifier.classify(WatchEvent::Apply(svc("web", Some("false"))));
        let out = classifier.classify(WatchEvent::Delete(svc("web", Some("false"))));
        assert_eq!(out, [Classified::Deleted(svc("web", Some("false")))]);
        assert_eq!(classifier.known(), 0);

        let out = classifier.classify(WatchEvent::Apply(svc("web", None)));
        assert_eq!(out, [Classified::Added(svc("web", None))]);
    }

    #[test]
    fn relist_reports_vanished_objects() {
        let mut classifier = EventClassifier::new();
        classifier.classify(WatchEvent::Apply(svc("web", Some("false"))));
        classifier.classify(WatchEvent::Apply(svc("api", Some("false"))));

        assert!(classifier.classify(WatchEvent::Init).is_empty());
        let out = classifier.classify(WatchEvent::InitApply(svc("web", Some("false"))));
        assert_eq!(out, [Classified::Updated(svc("web", Some("false")))]);
        let out = classifier.classify(WatchEvent::InitDone);
        assert_eq!(out, [Classified::Deleted(svc("api", Some("false")))]);
        assert_eq!(classifier.known(), 1);
    }

    #[test]
    fn forwarding_rules() {
        assert_eq!(
            Classified::Added(svc("web", None)).into_service_event(),
            Some(ServiceEvent::Created(svc("web", None)))
        );
        assert_eq!(Classified::Updated(svc("web", Some("false"))).into_service_event(), None);
        assert_eq!(Classified::Updated(svc("web", None)).into_service_event(), None);
        assert_eq!(
            Classified::Updated(svc("web", Some("true"))).into_service_event(),
            Some(ServiceEvent::Created(svc("web", Some("true"))))
        );
        assert_eq!(
            Classified::Deleted(svc("web", None)).into_service_event(),
            Some(ServiceEvent::Deleted(svc("web", None)))
        );
    }

    #[tokio::test]
    async fn forward_routes_to_channels() {
        let (sink, mut source) = event_channels();
        let events: Vec<std::result::Result<WatchEvent, String>> = vec![
            Ok(WatchEvent::Init),
            Ok(WatchEvent::InitApply(svc("web", Some("true")))),
            Ok(WatchEvent::InitDone),
            Err("connection reset".to_string()),
            Ok(WatchEvent::Apply(svc("web", Some("false")))),
            Ok(WatchEvent::Delete(svc("web", Some("false")))),
        ];

        let forward = tokio::spawn(async move {
            forward_events(futures::stream::iter(events), &sink).await
        });

        assert_eq!(
            source.recv().await,
            Some(ServiceEvent::Created(svc("web", Some("true"))))
        );
        assert_eq!(
            source.recv().await,
            Some(ServiceEvent::Deleted(svc("web", Some("false"))))
        );
        forward.await.unwrap().unwrap();
        assert!(source.recv().await.is_none());
    }

    #[tokio::test]
    async fn slow_consumer_applies_back_pressure() {
        let (sink, mut source) = event_channels();
        let events: Vec<std::result::Result<WatchEvent, String>> = (0..3)
            .map(|i| Ok(WatchEvent::Apply(svc(&format!("svc-{i}"), None))))
            .collect();

        let mut forward = tokio::spawn(async move {
            forward_events(futures::stream::iter(events), &sink).await
        });

        let stalled = tokio::time::timeout(Duration::from_millis(50), &mut forward).await;
        assert!(stalled.is_err(), "watcher should block on a full channel");

        for i in 0..3 {
            let Some(ServiceEvent::Created(meta)) = source.recv().await else {
                unreachable!("expected a creation event");
            };
            assert_eq!(meta.name, format!("svc-{i}"));
        }
        forward.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn closed_consumer_stops_forwarding() {
        let (sink, source) = event_channels();
        drop(source);
        let events: Vec<std::result::Result<WatchEvent, String>> =
            vec![Ok(WatchEvent::Apply(svc("web", None)))];
        assert!(forward_events(futures::stream::iter(events), &sink).await.is_ok());
    }
}
