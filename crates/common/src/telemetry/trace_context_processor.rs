use opentelemetry::logs::{AnyValue, LogRecord as _};
use opentelemetry::trace::TraceContextExt;
use opentelemetry::{InstrumentationScope, Key};
use opentelemetry_sdk::logs::{LogProcessor, LogRecord, LogResult};
use opentelemetry_sdk::Resource;
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// Log processor that stamps trace_id and span_id onto every record
///
/// Lets a denied request's log line be joined to its trace without
/// derived-field configuration in the log backend.
#[derive(Debug)]
pub struct TraceContextLogProcessor<P: LogProcessor> {
    inner: P,
}

impl<P: LogProcessor> TraceContextLogProcessor<P> {
    pub fn new(inner: P) -> Self {
        Self { inner }
    }
}

fn current_span_ids() -> Option<(String, String)> {
    let otel_context = Span::current().context();
    let otel_span = otel_context.span();
    let span_context = otel_span.span_context();
    span_context.is_valid().then(|| {
        (
            span_context.trace_id().to_string(),
            span_context.span_id().to_string(),
        )
    })
}

impl<P: LogProcessor> LogProcessor for TraceContextLogProcessor<P> {
    fn emit(&self, record: &mut LogRecord, instrumentation: &InstrumentationScope) {
        let ids = record
            .trace_context
            .as_ref()
            .map(|tc| (tc.trace_id.to_string(), tc.span_id.to_string()))
            .or_else(current_span_ids);

        if let Some((trace_id, span_id)) = ids {
            record.add_attribute(Key::new("trace_id"), AnyValue::String(trace_id.into()));
            record.add_attribute(Key::new("span_id"), AnyValue::String(span_id.into()));
        }

        self.inner.emit(record, instrumentation);
    }

    fn force_flush(&self) -> LogResult<()> {
        self.inner.force_flush()
    }

    fn shutdown(&self) -> LogResult<()> {
        self.inner.shutdown()
    }

    fn set_resource(&self, resource: &Resource) {
        self.inner.set_resource(resource);
    }
}
