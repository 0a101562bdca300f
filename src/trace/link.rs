//! Links connecting a span to other spans, possibly in other traces.

use crate::common::KeyValue;
use crate::trace::SpanContext;

/// A causal reference from one span to another.
#[derive(Clone, Debug, PartialEq)]
pub struct Link {
    /// The span context of the linked span.
    pub span_context: SpanContext,
    /// Attributes describing this link.
    pub attributes: Vec<KeyValue>,
    /// The number of attributes dropped from this link due to limits.
    pub dropped_attributes_count: u32,
}

impl Link {
    /// Create a new link.
    pub fn new(
        span_context: SpanContext,
        attributes: Vec<KeyValue>,
        dropped_attributes_count: u32,
    ) -> Self {
        Link {
            span_context,
            attributes,
            dropped_attributes_count,
        }
    }

    /// Create a new link with a span context and attributes.
    pub fn with_attributes(span_context: SpanContext, attributes: Vec<KeyValue>) -> Self {
        Link::new(span_context, attributes, 0)
    }
}

/// The links recorded on a span, together with the count of links the span
/// was not able to keep.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpanLinks {
    /// The recorded links.
    pub links: Vec<Link>,
    /// The number of links dropped due to `max_links_per_span`.
    pub dropped_count: u32,
}

impl SpanLinks {
    /// Iterate over the recorded links.
    pub fn iter(&self) -> std::slice::Iter<'_, Link> {
        self.links.iter()
    }

    /// The number of recorded links.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Whether no links were recorded.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

impl IntoIterator for SpanLinks {
    type Item = Link;
    type IntoIter = std::vec::IntoIter<Link>;

    fn into_iter(self) -> Self::IntoIter {
        self.links.into_iter()
    }
}
