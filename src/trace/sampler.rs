//! Head sampling: deciding a span's fate at creation time.

use crate::common::KeyValue;
use crate::context::Context;
use crate::trace::{Link, SpanKind, TraceContextExt, TraceId, TraceState};
use std::fmt;

/// The decision a sampler returns for a new span.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SamplingDecision {
    /// The span is neither recorded nor exported. The SDK returns a
    /// non-recording span that still carries a valid context for
    /// propagation.
    Drop,
    /// The span records data but the sampled flag stays clear, so it is not
    /// exported.
    RecordOnly,
    /// The span records data and the sampled flag is set.
    RecordAndSample,
}

/// The outcome of a sampling decision.
#[derive(Clone, Debug, PartialEq)]
pub struct SamplingResult {
    /// Whether the span should record and/or be sampled.
    pub decision: SamplingDecision,
    /// Extra attributes the sampler wants on the span.
    pub attributes: Vec<KeyValue>,
    /// The trace state the new span's context should carry.
    pub trace_state: TraceState,
}

/// Allows `Box<dyn ShouldSample>` to be cloned.
pub trait CloneShouldSample {
    #[doc(hidden)]
    fn box_clone(&self) -> Box<dyn ShouldSample>;
}

impl<T> CloneShouldSample for T
where
    T: ShouldSample + Clone + 'static,
{
    fn box_clone(&self) -> Box<dyn ShouldSample> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn ShouldSample> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// The interface for deciding whether a span is recorded and sampled.
///
/// Samplers run exactly once, when the span starts; the decision never
/// changes afterwards.
pub trait ShouldSample: CloneShouldSample + Send + Sync + fmt::Debug {
    /// Decide whether a span should be sampled, given its (optional) parent
    /// context and everything known about the span at creation time.
    #[allow(clippy::too_many_arguments)]
    fn should_sample(
        &self,
        parent_context: Option<&Context>,
        trace_id: TraceId,
        name: &str,
        span_kind: &SpanKind,
        attributes: &[KeyValue],
        links: &[Link],
    ) -> SamplingResult;

    /// A human-readable description of the sampler configuration, suitable
    /// for diagnostics.
    fn description(&self) -> String;
}

/// The samplers bundled with the SDK.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum Sampler {
    /// Always sample.
    AlwaysOn,
    /// Never sample.
    AlwaysOff,
    /// Follow the parent's sampled flag when a valid parent exists,
    /// otherwise delegate to the wrapped root sampler. A context carrying an
    /// invalid span context counts as no parent.
    ParentBased(Box<dyn ShouldSample>),
    /// Sample the given fraction of traces, decided deterministically from
    /// the trace id so every participant in a trace agrees. Fractions `>= 1`
    /// always sample, fractions `<= 0` never do.
    TraceIdRatioBased(f64),
}

impl ShouldSample for Sampler {
    fn should_sample(
        &self,
        parent_context: Option<&Context>,
        trace_id: TraceId,
        name: &str,
        span_kind: &SpanKind,
        attributes: &[KeyValue],
        links: &[Link],
    ) -> SamplingResult {
        let decision = match self {
            Sampler::AlwaysOn => SamplingDecision::RecordAndSample,
            Sampler::AlwaysOff => SamplingDecision::Drop,
            Sampler::ParentBased(delegate) => {
                return parent_context
                    .filter(|cx| {
                        cx.has_active_span() && cx.span().span_context().is_valid()
                    })
                    .map_or_else(
                        || {
                            delegate.should_sample(
                                parent_context,
                                trace_id,
                                name,
                                span_kind,
                                attributes,
                                links,
                            )
                        },
                        |cx| {
                            let span = cx.span();
                            let parent_span_context = span.span_context();
                            let decision = if parent_span_context.is_sampled() {
                                SamplingDecision::RecordAndSample
                            } else {
                                SamplingDecision::Drop
                            };
                            SamplingResult {
                                decision,
                                attributes: Vec::new(),
                                trace_state: parent_span_context.trace_state().clone(),
                            }
                        },
                    );
            }
            Sampler::TraceIdRatioBased(prob) => sample_based_on_probability(*prob, trace_id),
        };

        SamplingResult {
            decision,
            attributes: Vec::new(),
            // inherit the parent's trace state so vendor data survives
            // through unsampled hops
            trace_state: match parent_context.filter(|cx| cx.has_active_span()) {
                Some(cx) => cx.span().span_context().trace_state().clone(),
                None => TraceState::default(),
            },
        }
    }

    fn description(&self) -> String {
        match self {
            Sampler::AlwaysOn => "AlwaysOnSampler".to_string(),
            Sampler::AlwaysOff => "AlwaysOffSampler".to_string(),
            Sampler::ParentBased(delegate) => {
                format!("ParentBased{{{}}}", delegate.description())
            }
            Sampler::TraceIdRatioBased(prob) => {
                format!("TraceIdRatioBasedSampler{{{}}}", prob)
            }
        }
    }
}

fn sample_based_on_probability(prob: f64, trace_id: TraceId) -> SamplingDecision {
    if prob >= 1.0 {
        return SamplingDecision::RecordAndSample;
    }
    let prob_upper_bound = (prob.max(0.0) * (1u64 << 63) as f64) as u64;
    let bytes = trace_id.to_bytes();
    let trace_id_low = u64::from_be_bytes([
        bytes[8], bytes[9], bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15],
    ]);
    // shift out the sign-equivalent bit so the comparison space matches the
    // 63-bit upper bound
    if trace_id_low >> 1 < prob_upper_bound {
        SamplingDecision::RecordAndSample
    } else {
        SamplingDecision::Drop
    }
}
