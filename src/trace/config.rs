//! Tracer provider configuration.

use crate::internal_logs::tk_warn;
use crate::resource::Resource;
use crate::trace::{IdGenerator, RandomIdGenerator, Sampler, ShouldSample, SpanLimits};
use std::env;
use std::str::FromStr;

const ENV_SAMPLER: &str = "TRACEKIT_TRACES_SAMPLER";
const ENV_SAMPLER_ARG: &str = "TRACEKIT_TRACES_SAMPLER_ARG";
const ENV_SPAN_ATTRIBUTE_COUNT_LIMIT: &str = "TRACEKIT_SPAN_ATTRIBUTE_COUNT_LIMIT";
const ENV_SPAN_EVENT_COUNT_LIMIT: &str = "TRACEKIT_SPAN_EVENT_COUNT_LIMIT";
const ENV_SPAN_LINK_COUNT_LIMIT: &str = "TRACEKIT_SPAN_LINK_COUNT_LIMIT";
const ENV_SPAN_ATTRIBUTE_VALUE_LENGTH_LIMIT: &str = "TRACEKIT_SPAN_ATTRIBUTE_VALUE_LENGTH_LIMIT";

/// The pipeline-wide settings a [`TracerProvider`](crate::trace::TracerProvider)
/// applies to every span it creates.
#[derive(Debug)]
pub struct Config {
    /// The sampler consulted once per span at creation time.
    pub sampler: Box<dyn ShouldSample>,

    /// The generator minting trace and span ids.
    pub id_generator: Box<dyn IdGenerator>,

    /// Caps on per-span data.
    pub span_limits: SpanLimits,

    /// Attributes describing the producing entity, stamped on every span.
    pub resource: Resource,
}

impl Default for Config {
    /// Defaults (parent-based always-on sampling, random ids, standard
    /// limits), then environment overrides where set.
    fn default() -> Self {
        let mut config = Config {
            sampler: Box::new(Sampler::ParentBased(Box::new(Sampler::AlwaysOn))),
            id_generator: Box::<RandomIdGenerator>::default(),
            span_limits: SpanLimits::default(),
            resource: Resource::empty(),
        };

        if let Some(sampler) = sampler_from_env() {
            config.sampler = sampler;
        }
        if let Some(limit) = env_value::<u32>(ENV_SPAN_ATTRIBUTE_COUNT_LIMIT) {
            config.span_limits.max_attributes_per_span = limit;
        }
        if let Some(limit) = env_value::<u32>(ENV_SPAN_EVENT_COUNT_LIMIT) {
            config.span_limits.max_events_per_span = limit;
        }
        if let Some(limit) = env_value::<u32>(ENV_SPAN_LINK_COUNT_LIMIT) {
            config.span_limits.max_links_per_span = limit;
        }
        if let Some(limit) = env_value::<u32>(ENV_SPAN_ATTRIBUTE_VALUE_LENGTH_LIMIT) {
            config.span_limits.max_attribute_value_length = Some(limit);
        }

        config
    }
}

pub(crate) fn env_value<T: FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tk_warn!(
                name: "Config.InvalidEnvValue",
                env_var = name,
                value = raw.as_str()
            );
            None
        }
    }
}

fn sampler_from_env() -> Option<Box<dyn ShouldSample>> {
    let name = env::var(ENV_SAMPLER).ok()?;

    let ratio = || {
        env_value::<f64>(ENV_SAMPLER_ARG).unwrap_or_else(|| {
            tk_warn!(name: "Config.MissingSamplerArg", env_var = ENV_SAMPLER_ARG);
            1.0
        })
    };

    let sampler: Sampler = match name.as_str() {
        "always_on" => Sampler::AlwaysOn,
        "always_off" => Sampler::AlwaysOff,
        "traceidratio" => Sampler::TraceIdRatioBased(ratio()),
        "parentbased_always_on" => Sampler::ParentBased(Box::new(Sampler::AlwaysOn)),
        "parentbased_always_off" => Sampler::ParentBased(Box::new(Sampler::AlwaysOff)),
        "parentbased_traceidratio" => {
            Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(ratio())))
        }
        unknown => {
            tk_warn!(
                name: "Config.UnknownSampler",
                env_var = ENV_SAMPLER,
                value = unknown
            );
            return None;
        }
    };

    Some(Box::new(sampler))
}
