//! The tracer provider owns the span pipeline.

use crate::error::{TraceError, TraceResult};
use crate::internal_logs::{tk_debug, tk_error, tk_info};
use crate::resource::Resource;
use crate::trace::span_processor::{
    BatchSpanProcessor, SimpleSpanProcessor, SpanProcessor,
};
use crate::trace::{
    Config, IdGenerator, ShouldSample, SpanExporter, SpanLimits, Tracer,
};
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The entry point of the tracing pipeline.
///
/// A provider holds the configuration shared by every span it creates and
/// the processors finished spans flow through. Clones are cheap and share
/// the same pipeline; the pipeline shuts down when [`shutdown`] is called or
/// when the last clone is dropped, whichever comes first.
///
/// [`shutdown`]: TracerProvider::shutdown
#[derive(Clone, Debug)]
pub struct TracerProvider {
    inner: Arc<TracerProviderInner>,
}

#[derive(Debug)]
struct TracerProviderInner {
    processors: Vec<Box<dyn SpanProcessor>>,
    config: Config,
    is_shutdown: AtomicBool,
}

impl TracerProviderInner {
    /// Shut down every processor, reporting the first error.
    fn shutdown_processors(&self) -> TraceResult<()> {
        let mut result = Ok(());
        for processor in &self.processors {
            if let Err(err) = processor.shutdown() {
                tk_error!(
                    name: "TracerProvider.Shutdown.ProcessorFailed",
                    error = err.to_string()
                );
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        result
    }
}

impl Drop for TracerProviderInner {
    fn drop(&mut self) {
        if !self.is_shutdown.load(Ordering::Relaxed) {
            tk_debug!(name: "TracerProvider.ShutdownOnDrop");
            let _ = self.shutdown_processors();
        }
    }
}

impl TracerProvider {
    /// Start building a provider.
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Returns a tracer whose spans carry `scope_name` as their
    /// instrumentation scope, typically the name of the instrumented
    /// library or component.
    pub fn tracer(&self, scope_name: impl Into<Cow<'static, str>>) -> Tracer {
        Tracer::new(scope_name.into(), self.clone())
    }

    pub(crate) fn config(&self) -> &Config {
        &self.inner.config
    }

    pub(crate) fn span_processors(&self) -> &[Box<dyn SpanProcessor>] {
        &self.inner.processors
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.inner.is_shutdown.load(Ordering::Relaxed)
    }

    /// Push buffered spans through every processor.
    ///
    /// All processors are flushed even if one fails; the first error is
    /// returned.
    pub fn force_flush(&self) -> TraceResult<()> {
        let mut result = Ok(());
        for processor in self.span_processors() {
            if let Err(err) = processor.force_flush() {
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        result
    }

    /// Shut the pipeline down, flushing outstanding spans.
    ///
    /// Only the first call does the work; subsequent calls (from any clone)
    /// report [`TraceError::AlreadyShutdown`]. Afterwards every tracer from
    /// this provider mints only non-recording spans.
    pub fn shutdown(&self) -> TraceResult<()> {
        if self.inner.is_shutdown.swap(true, Ordering::Relaxed) {
            return Err(TraceError::AlreadyShutdown);
        }
        tk_info!(name: "TracerProvider.Shutdown");
        self.inner.shutdown_processors()
    }
}

/// Builder for [`TracerProvider`].
#[derive(Debug, Default)]
pub struct Builder {
    processors: Vec<Box<dyn SpanProcessor>>,
    config: Config,
}

impl Builder {
    /// Register `exporter` behind a [`SimpleSpanProcessor`].
    pub fn with_simple_exporter<T: SpanExporter + 'static>(self, exporter: T) -> Self {
        self.with_span_processor(SimpleSpanProcessor::new(exporter))
    }

    /// Register `exporter` behind a [`BatchSpanProcessor`] with the default
    /// batching configuration.
    pub fn with_batch_exporter<T: SpanExporter + 'static>(self, exporter: T) -> Self {
        self.with_span_processor(BatchSpanProcessor::with_defaults(exporter))
    }

    /// Register a span processor. Processors are invoked in registration
    /// order.
    pub fn with_span_processor<T: SpanProcessor + 'static>(mut self, processor: T) -> Self {
        self.processors.push(Box::new(processor));
        self
    }

    /// Set the sampler consulted for every new span.
    pub fn with_sampler<T: ShouldSample + 'static>(mut self, sampler: T) -> Self {
        self.config.sampler = Box::new(sampler);
        self
    }

    /// Set the id generator.
    pub fn with_id_generator<T: IdGenerator + 'static>(mut self, id_generator: T) -> Self {
        self.config.id_generator = Box::new(id_generator);
        self
    }

    /// Set all span limits at once.
    pub fn with_span_limits(mut self, span_limits: SpanLimits) -> Self {
        self.config.span_limits = span_limits;
        self
    }

    /// Cap the number of attributes per span.
    pub fn with_max_attributes_per_span(mut self, max: u32) -> Self {
        self.config.span_limits.max_attributes_per_span = max;
        self
    }

    /// Cap the number of events per span.
    pub fn with_max_events_per_span(mut self, max: u32) -> Self {
        self.config.span_limits.max_events_per_span = max;
        self
    }

    /// Cap the number of links per span.
    pub fn with_max_links_per_span(mut self, max: u32) -> Self {
        self.config.span_limits.max_links_per_span = max;
        self
    }

    /// Cap the number of attributes per event.
    pub fn with_max_attributes_per_event(mut self, max: u32) -> Self {
        self.config.span_limits.max_attributes_per_event = max;
        self
    }

    /// Cap the number of attributes per link.
    pub fn with_max_attributes_per_link(mut self, max: u32) -> Self {
        self.config.span_limits.max_attributes_per_link = max;
        self
    }

    /// Cap the length of string attribute values.
    pub fn with_max_attribute_value_length(mut self, max: u32) -> Self {
        self.config.span_limits.max_attribute_value_length = Some(max);
        self
    }

    /// Set the resource describing the producing entity.
    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.config.resource = resource;
        self
    }

    /// Build the provider, distributing the resource to every processor.
    pub fn build(self) -> TracerProvider {
        let Builder {
            mut processors,
            config,
        } = self;

        for processor in &mut processors {
            processor.set_resource(&config.resource);
        }

        TracerProvider {
            inner: Arc::new(TracerProviderInner {
                processors,
                config,
                is_shutdown: AtomicBool::new(false),
            }),
        }
    }
}
