//! Span processors sit between finished spans and exporters.
//!
//! [`SimpleSpanProcessor`] exports every span synchronously as it ends,
//! which is simple and predictable but puts the exporter on the hot path.
//! [`BatchSpanProcessor`] decouples span ends from exports with a bounded
//! queue drained by a dedicated worker thread. [`MultiSpanProcessor`] fans
//! out to several processors when one pipeline is not enough.

use crate::context::Context;
use crate::error::{ExportResult, TraceError, TraceResult};
use crate::internal_logs::{tk_debug, tk_error, tk_info, tk_warn};
use crate::resource::Resource;
use crate::trace::export::{SpanData, SpanExporter};
use crate::trace::Span;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Default maximum queue size.
const DEFAULT_MAX_QUEUE_SIZE: usize = 2048;
/// Default delay between two consecutive exports.
const DEFAULT_SCHEDULED_DELAY: Duration = Duration::from_millis(5_000);
/// Default maximum batch size.
const DEFAULT_MAX_EXPORT_BATCH_SIZE: usize = 512;
/// Default maximum time an export (or flush/shutdown) may take.
const DEFAULT_MAX_EXPORT_TIMEOUT: Duration = Duration::from_millis(30_000);

const ENV_BSP_MAX_QUEUE_SIZE: &str = "TRACEKIT_BSP_MAX_QUEUE_SIZE";
const ENV_BSP_SCHEDULE_DELAY: &str = "TRACEKIT_BSP_SCHEDULE_DELAY";
const ENV_BSP_MAX_EXPORT_BATCH_SIZE: &str = "TRACEKIT_BSP_MAX_EXPORT_BATCH_SIZE";
const ENV_BSP_EXPORT_TIMEOUT: &str = "TRACEKIT_BSP_EXPORT_TIMEOUT";

/// Interface for hooking into the span lifecycle.
///
/// Only spans with the sampled flag set reach [`on_end`](SpanProcessor::on_end).
pub trait SpanProcessor: Send + Sync + fmt::Debug {
    /// Called when a recording span starts, with the parent context the span
    /// was created under. This happens synchronously on the creating thread
    /// and must not block.
    fn on_start(&self, span: &mut Span, cx: &Context);

    /// Called when a sampled span ends, with the finished snapshot. This
    /// happens synchronously on the ending thread and should hand off
    /// quickly.
    fn on_end(&self, span: SpanData);

    /// Push any buffered spans through to the exporter.
    fn force_flush(&self) -> TraceResult<()>;

    /// Flush and release all resources. Further calls on the processor are
    /// no-ops; `shutdown` itself reports [`TraceError::AlreadyShutdown`]
    /// when repeated.
    fn shutdown(&self) -> TraceResult<()>;

    /// Receive the resource to forward to the exporter. Called once at
    /// pipeline construction.
    fn set_resource(&mut self, _resource: &Resource) {}
}

/// A processor that exports every finished span before returning control.
#[derive(Debug)]
pub struct SimpleSpanProcessor {
    exporter: Mutex<Box<dyn SpanExporter>>,
    is_shutdown: AtomicBool,
}

impl SimpleSpanProcessor {
    /// Create a new processor wrapping `exporter`.
    pub fn new(exporter: impl SpanExporter + 'static) -> Self {
        SimpleSpanProcessor {
            exporter: Mutex::new(Box::new(exporter)),
            is_shutdown: AtomicBool::new(false),
        }
    }
}

impl SpanProcessor for SimpleSpanProcessor {
    fn on_start(&self, _span: &mut Span, _cx: &Context) {
        // nothing to do at start
    }

    fn on_end(&self, span: SpanData) {
        if self.is_shutdown.load(Ordering::Relaxed) {
            tk_debug!(name: "SimpleSpanProcessor.OnEnd.AfterShutdown");
            return;
        }

        let result = self
            .exporter
            .lock()
            .map_err(|_| TraceError::Other("SimpleSpanProcessor mutex poisoned".into()))
            .and_then(|mut exporter| {
                futures_executor::block_on(exporter.export(vec![span]))
            });

        if let Err(err) = result {
            tk_error!(
                name: "SimpleSpanProcessor.OnEnd.ExportFailed",
                error = err.to_string(),
                retryable = err.is_retryable()
            );
        }
    }

    fn force_flush(&self) -> TraceResult<()> {
        if self.is_shutdown.load(Ordering::Relaxed) {
            return Err(TraceError::AlreadyShutdown);
        }
        // nothing is buffered here; give the exporter a chance to flush
        match self.exporter.lock() {
            Ok(mut exporter) => futures_executor::block_on(exporter.force_flush()),
            Err(_) => Err(TraceError::Other(
                "SimpleSpanProcessor mutex poisoned".into(),
            )),
        }
    }

    fn shutdown(&self) -> TraceResult<()> {
        if self.is_shutdown.swap(true, Ordering::Relaxed) {
            return Err(TraceError::AlreadyShutdown);
        }
        match self.exporter.lock() {
            Ok(mut exporter) => {
                exporter.shutdown();
                Ok(())
            }
            Err(_) => Err(TraceError::Other(
                "SimpleSpanProcessor mutex poisoned".into(),
            )),
        }
    }

    fn set_resource(&mut self, resource: &Resource) {
        if let Ok(mut exporter) = self.exporter.lock() {
            exporter.set_resource(resource);
        }
    }
}

/// Batching configuration for [`BatchSpanProcessor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    pub(crate) max_queue_size: usize,
    pub(crate) scheduled_delay: Duration,
    pub(crate) max_export_batch_size: usize,
    pub(crate) max_export_timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            scheduled_delay: DEFAULT_SCHEDULED_DELAY,
            max_export_batch_size: DEFAULT_MAX_EXPORT_BATCH_SIZE,
            max_export_timeout: DEFAULT_MAX_EXPORT_TIMEOUT,
        }
    }
}

/// Builder for [`BatchConfig`], seeded from the `TRACEKIT_BSP_*` environment
/// variables where set.
#[derive(Debug)]
pub struct BatchConfigBuilder {
    max_queue_size: usize,
    scheduled_delay: Duration,
    max_export_batch_size: usize,
    max_export_timeout: Duration,
}

impl Default for BatchConfigBuilder {
    fn default() -> Self {
        let defaults = BatchConfig::default();
        BatchConfigBuilder {
            max_queue_size: crate::trace::config::env_value(ENV_BSP_MAX_QUEUE_SIZE)
                .unwrap_or(defaults.max_queue_size),
            scheduled_delay: crate::trace::config::env_value(ENV_BSP_SCHEDULE_DELAY)
                .map(Duration::from_millis)
                .unwrap_or(defaults.scheduled_delay),
            max_export_batch_size: crate::trace::config::env_value(
                ENV_BSP_MAX_EXPORT_BATCH_SIZE,
            )
            .unwrap_or(defaults.max_export_batch_size),
            max_export_timeout: crate::trace::config::env_value(ENV_BSP_EXPORT_TIMEOUT)
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_export_timeout),
        }
    }
}

impl BatchConfigBuilder {
    /// Set the maximum number of spans queued between the application and
    /// the worker thread. Spans arriving at a full queue are dropped.
    pub fn with_max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.max_queue_size = max_queue_size;
        self
    }

    /// Set the delay after which buffered spans are exported even if the
    /// batch is not full.
    pub fn with_scheduled_delay(mut self, scheduled_delay: Duration) -> Self {
        self.scheduled_delay = scheduled_delay;
        self
    }

    /// Set the number of buffered spans that triggers an immediate export.
    pub fn with_max_export_batch_size(mut self, max_export_batch_size: usize) -> Self {
        self.max_export_batch_size = max_export_batch_size;
        self
    }

    /// Set how long `force_flush` and `shutdown` wait for the worker to
    /// acknowledge before reporting a timeout.
    pub fn with_max_export_timeout(mut self, max_export_timeout: Duration) -> Self {
        self.max_export_timeout = max_export_timeout;
        self
    }

    /// Validate and build the configuration.
    ///
    /// A batch size larger than the queue could never fill a batch, so it is
    /// rejected outright rather than silently clamped.
    pub fn build(self) -> TraceResult<BatchConfig> {
        if self.max_queue_size == 0 || self.max_export_batch_size == 0 {
            return Err(TraceError::InvalidConfig(
                "batch queue size and batch size must be at least 1".into(),
            ));
        }
        if self.max_export_batch_size > self.max_queue_size {
            return Err(TraceError::InvalidConfig(format!(
                "max_export_batch_size {} exceeds max_queue_size {}",
                self.max_export_batch_size, self.max_queue_size
            )));
        }

        Ok(BatchConfig {
            max_queue_size: self.max_queue_size,
            scheduled_delay: self.scheduled_delay,
            max_export_batch_size: self.max_export_batch_size,
            max_export_timeout: self.max_export_timeout,
        })
    }
}

/// Messages exchanged between the application threads and the batch worker.
#[derive(Debug)]
enum BatchMessage {
    /// A finished span to buffer.
    ExportSpan(SpanData),
    /// Export everything buffered and acknowledge.
    ForceFlush(SyncSender<ExportResult>),
    /// Drain, shut the exporter down, acknowledge and exit.
    Shutdown(SyncSender<ExportResult>),
    /// Forward the resource to the exporter.
    SetResource(Arc<Resource>),
}

/// A processor that buffers finished spans and exports them in batches from
/// a dedicated worker thread.
///
/// The queue between the application and the worker is bounded at
/// `max_queue_size`; when it is full, new spans are dropped and counted
/// rather than blocking the application. Batches go out when
/// `max_export_batch_size` spans have accumulated or `scheduled_delay` has
/// elapsed since the last export, whichever comes first.
pub struct BatchSpanProcessor {
    message_sender: SyncSender<BatchMessage>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
    max_export_timeout: Duration,
    is_shutdown: AtomicBool,
    dropped_spans: AtomicUsize,
}

impl BatchSpanProcessor {
    /// Create a new batch processor draining into `exporter`.
    pub fn new(exporter: impl SpanExporter + 'static, config: BatchConfig) -> Self {
        let (message_sender, message_receiver) = mpsc::sync_channel(config.max_queue_size);

        let handle = thread::Builder::new()
            .name("TracekitBatchSpanProcessor".to_string())
            .spawn(move || {
                tk_info!(
                    name: "BatchSpanProcessor.ThreadStarted",
                    interval_in_millisecs = config.scheduled_delay.as_millis() as u64,
                    max_export_batch_size = config.max_export_batch_size,
                    max_queue_size = config.max_queue_size
                );
                let mut exporter = exporter;
                let mut spans = Vec::with_capacity(config.max_export_batch_size);
                let mut last_export_time = Instant::now();

                loop {
                    let remaining = config
                        .scheduled_delay
                        .saturating_sub(last_export_time.elapsed());
                    match message_receiver.recv_timeout(remaining) {
                        Ok(BatchMessage::ExportSpan(span)) => {
                            spans.push(span);
                            if spans.len() >= config.max_export_batch_size {
                                export_batch(&mut exporter, &mut spans);
                                last_export_time = Instant::now();
                            }
                        }
                        Ok(BatchMessage::ForceFlush(sender)) => {
                            let result = export_batch(&mut exporter, &mut spans);
                            let _ = sender.send(result);
                            last_export_time = Instant::now();
                        }
                        Ok(BatchMessage::Shutdown(sender)) => {
                            // pick up spans that raced into the queue ahead
                            // of the shutdown message
                            while let Ok(BatchMessage::ExportSpan(span)) =
                                message_receiver.try_recv()
                            {
                                spans.push(span);
                                if spans.len() >= config.max_export_batch_size {
                                    export_batch(&mut exporter, &mut spans);
                                }
                            }
                            let result = export_batch(&mut exporter, &mut spans);
                            exporter.shutdown();
                            let _ = sender.send(result);
                            tk_info!(name: "BatchSpanProcessor.ThreadStopped");
                            break;
                        }
                        Ok(BatchMessage::SetResource(resource)) => {
                            exporter.set_resource(&resource);
                        }
                        Err(RecvTimeoutError::Timeout) => {
                            if !spans.is_empty() {
                                export_batch(&mut exporter, &mut spans);
                            }
                            last_export_time = Instant::now();
                        }
                        Err(RecvTimeoutError::Disconnected) => {
                            // all senders gone without a shutdown message
                            export_batch(&mut exporter, &mut spans);
                            exporter.shutdown();
                            tk_info!(name: "BatchSpanProcessor.ThreadStopped");
                            break;
                        }
                    }
                }
            })
            .expect("failed to spawn batch span processor thread");

        BatchSpanProcessor {
            message_sender,
            handle: Mutex::new(Some(handle)),
            max_export_timeout: config.max_export_timeout,
            is_shutdown: AtomicBool::new(false),
            dropped_spans: AtomicUsize::new(0),
        }
    }

    /// Create a batch processor with the default configuration (including
    /// `TRACEKIT_BSP_*` environment overrides). An invalid combination of
    /// environment values falls back to the built-in defaults.
    pub fn with_defaults(exporter: impl SpanExporter + 'static) -> Self {
        let config = BatchConfigBuilder::default().build().unwrap_or_else(|err| {
            tk_warn!(
                name: "BatchSpanProcessor.InvalidEnvConfig",
                error = err.to_string()
            );
            BatchConfig::default()
        });
        BatchSpanProcessor::new(exporter, config)
    }
}

fn export_batch(exporter: &mut impl SpanExporter, spans: &mut Vec<SpanData>) -> ExportResult {
    if spans.is_empty() {
        return Ok(());
    }
    let batch = spans.split_off(0);
    let count = batch.len();
    let result = futures_executor::block_on(exporter.export(batch));
    if let Err(err) = &result {
        tk_error!(
            name: "BatchSpanProcessor.ExportFailed",
            batch_size = count,
            error = err.to_string(),
            retryable = err.is_retryable()
        );
    }
    result
}

impl SpanProcessor for BatchSpanProcessor {
    fn on_start(&self, _span: &mut Span, _cx: &Context) {
        // nothing to do at start
    }

    fn on_end(&self, span: SpanData) {
        if self.is_shutdown.load(Ordering::Relaxed) {
            tk_debug!(name: "BatchSpanProcessor.OnEnd.AfterShutdown");
            return;
        }

        if self
            .message_sender
            .try_send(BatchMessage::ExportSpan(span))
            .is_err()
        {
            // full queue; drop rather than block the application
            if self.dropped_spans.fetch_add(1, Ordering::Relaxed) == 0 {
                tk_warn!(name: "BatchSpanProcessor.SpanDroppedDueToFullQueue");
            }
        }
    }

    fn force_flush(&self) -> TraceResult<()> {
        if self.is_shutdown.load(Ordering::Relaxed) {
            return Err(TraceError::AlreadyShutdown);
        }
        let (sender, receiver) = mpsc::sync_channel(1);
        self.message_sender
            .try_send(BatchMessage::ForceFlush(sender))
            .map_err(|err| TraceError::Other(err.to_string()))?;
        receiver
            .recv_timeout(self.max_export_timeout)
            .map_err(|_| TraceError::Timeout(self.max_export_timeout))?
    }

    fn shutdown(&self) -> TraceResult<()> {
        if self.is_shutdown.swap(true, Ordering::Relaxed) {
            return Err(TraceError::AlreadyShutdown);
        }

        let dropped = self.dropped_spans.load(Ordering::Relaxed);
        if dropped > 0 {
            tk_warn!(
                name: "BatchSpanProcessor.SpansDropped",
                dropped_count = dropped
            );
        }

        let (sender, receiver) = mpsc::sync_channel(1);
        self.message_sender
            .try_send(BatchMessage::Shutdown(sender))
            .map_err(|err| TraceError::Other(err.to_string()))?;
        let result = receiver
            .recv_timeout(self.max_export_timeout)
            .map_err(|_| TraceError::Timeout(self.max_export_timeout))?;

        if let Ok(mut handle) = self.handle.lock() {
            if let Some(handle) = handle.take() {
                if handle.join().is_err() {
                    return Err(TraceError::Other(
                        "batch span processor thread panicked".into(),
                    ));
                }
            }
        }

        result
    }

    fn set_resource(&mut self, resource: &Resource) {
        let _ = self
            .message_sender
            .try_send(BatchMessage::SetResource(Arc::new(resource.clone())));
    }
}

impl fmt::Debug for BatchSpanProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchSpanProcessor")
            .field("max_export_timeout", &self.max_export_timeout)
            .field("is_shutdown", &self.is_shutdown.load(Ordering::Relaxed))
            .finish()
    }
}

impl Drop for BatchSpanProcessor {
    fn drop(&mut self) {
        if !self.is_shutdown.load(Ordering::Relaxed) {
            if let Err(err) = self.shutdown() {
                tk_error!(
                    name: "BatchSpanProcessor.ShutdownOnDropFailed",
                    error = err.to_string()
                );
            }
        }
    }
}

/// A processor that forwards every callback to an ordered list of child
/// processors.
///
/// A failing child never stops the others; `force_flush` and `shutdown`
/// invoke every child and report the first error encountered.
#[derive(Debug)]
pub struct MultiSpanProcessor {
    processors: Vec<Box<dyn SpanProcessor>>,
}

impl MultiSpanProcessor {
    /// Create a new processor fanning out to `processors`.
    pub fn new(processors: Vec<Box<dyn SpanProcessor>>) -> Self {
        MultiSpanProcessor { processors }
    }
}

impl SpanProcessor for MultiSpanProcessor {
    fn on_start(&self, span: &mut Span, cx: &Context) {
        for processor in &self.processors {
            processor.on_start(span, cx);
        }
    }

    fn on_end(&self, span: SpanData) {
        if let Some((last, rest)) = self.processors.split_last() {
            for processor in rest {
                processor.on_end(span.clone());
            }
            last.on_end(span);
        }
    }

    fn force_flush(&self) -> TraceResult<()> {
        let mut result = Ok(());
        for processor in &self.processors {
            if let Err(err) = processor.force_flush() {
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        result
    }

    fn shutdown(&self) -> TraceResult<()> {
        let mut result = Ok(());
        for processor in &self.processors {
            if let Err(err) = processor.shutdown() {
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        result
    }

    fn set_resource(&mut self, resource: &Resource) {
        for processor in &mut self.processors {
            processor.set_resource(resource);
        }
    }
}
