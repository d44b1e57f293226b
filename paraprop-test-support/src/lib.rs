//! Shared test utilities for paraprop crates.
//!
//! Integration suites use these helpers to capture instrumentation, install
//! structured logging, size runs from the environment, and script telemetry
//! and property outcomes.

pub mod ci;
pub mod fixtures;
pub mod logging;

pub mod tracing {
    //! In-memory capture of spans and events for instrumentation assertions.
    use std::{
        collections::HashMap,
        fmt,
        sync::{Arc, Mutex, PoisonError},
    };

    use tracing::{
        Event, Level, Subscriber,
        field::{Field, Visit},
        span::{Attributes, Id, Record},
    };
    use tracing_subscriber::{Layer, layer::Context, registry::LookupSpan};

    /// Layer that records closed spans and every event.
    ///
    /// Clones share storage, so a test can keep one handle and install the
    /// other in a subscriber.
    ///
    /// # Examples
    /// ```
    /// use paraprop_test_support::tracing::RecordingLayer;
    /// use tracing_subscriber::layer::SubscriberExt;
    ///
    /// let layer = RecordingLayer::default();
    /// let subscriber = tracing_subscriber::registry().with(layer.clone());
    /// tracing::subscriber::with_default(subscriber, || {
    ///     tracing::warn!(pool = "io", "resized");
    /// });
    /// assert!(layer.has_event(tracing::Level::WARN, "resized"));
    /// ```
    #[derive(Clone, Default)]
    pub struct RecordingLayer {
        captured: Arc<Mutex<Captured>>,
    }

    #[derive(Default)]
    struct Captured {
        spans: Vec<SpanRecord>,
        events: Vec<EventRecord>,
    }

    impl RecordingLayer {
        /// Closed spans in completion order.
        #[must_use]
        pub fn spans(&self) -> Vec<SpanRecord> {
            self.lock().spans.clone()
        }

        /// Events in emission order.
        #[must_use]
        pub fn events(&self) -> Vec<EventRecord> {
            self.lock().events.clone()
        }

        /// Events emitted at exactly `level`.
        #[must_use]
        pub fn events_at(&self, level: Level) -> Vec<EventRecord> {
            self.lock()
                .events
                .iter()
                .filter(|event| event.level == level)
                .cloned()
                .collect()
        }

        /// Whether an event at `level` carried a message containing `needle`.
        #[must_use]
        pub fn has_event(&self, level: Level, needle: &str) -> bool {
            self.lock()
                .events
                .iter()
                .any(|event| event.level == level && event.message().contains(needle))
        }

        /// Whether a span named `name` has closed.
        #[must_use]
        pub fn has_span(&self, name: &str) -> bool {
            self.lock().spans.iter().any(|span| span.name == name)
        }

        fn lock(&self) -> std::sync::MutexGuard<'_, Captured> {
            self.captured.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// A closed span and the fields recorded on it.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct SpanRecord {
        /// Span name.
        pub name: String,
        /// Recorded fields rendered as text.
        pub fields: HashMap<String, String>,
    }

    /// An emitted event.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct EventRecord {
        /// Event level.
        pub level: Level,
        /// Event target, usually the emitting module path.
        pub target: String,
        /// Fields rendered as text, including `message`.
        pub fields: HashMap<String, String>,
    }

    impl EventRecord {
        /// The formatted message, or an empty string.
        #[must_use]
        pub fn message(&self) -> &str {
            self.fields.get("message").map_or("", String::as_str)
        }

        /// A field rendered as text.
        #[must_use]
        pub fn field(&self, name: &str) -> Option<&str> {
            self.fields.get(name).map(String::as_str)
        }
    }

    struct PendingSpan(SpanRecord);

    impl<S> Layer<S> for RecordingLayer
    where
        S: Subscriber + for<'span> LookupSpan<'span>,
    {
        fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
            let Some(span) = ctx.span(id) else {
                return;
            };
            let mut record = SpanRecord {
                name: attrs.metadata().name().to_owned(),
                fields: HashMap::new(),
            };
            attrs.record(&mut Fields(&mut record.fields));
            span.extensions_mut().insert(PendingSpan(record));
        }

        fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
            if let Some(span) = ctx.span(id) {
                if let Some(pending) = span.extensions_mut().get_mut::<PendingSpan>() {
                    values.record(&mut Fields(&mut pending.0.fields));
                }
            }
        }

        fn on_close(&self, id: Id, ctx: Context<'_, S>) {
            let closed = ctx
                .span(&id)
                .and_then(|span| span.extensions_mut().remove::<PendingSpan>());
            if let Some(PendingSpan(record)) = closed {
                self.lock().spans.push(record);
            }
        }

        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            let mut fields = HashMap::new();
            event.record(&mut Fields(&mut fields));
            let metadata = event.metadata();
            self.lock().events.push(EventRecord {
                level: *metadata.level(),
                target: metadata.target().to_owned(),
                fields,
            });
        }
    }

    /// Renders every field as text; typed `record_*` calls fall back to
    /// `record_debug`, so only strings need special handling.
    struct Fields<'a>(&'a mut HashMap<String, String>);

    impl Visit for Fields<'_> {
        fn record_str(&mut self, field: &Field, value: &str) {
            self.0.insert(field.name().to_owned(), value.to_owned());
        }

        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            self.0.insert(field.name().to_owned(), format!("{value:?}"));
        }
    }
}
