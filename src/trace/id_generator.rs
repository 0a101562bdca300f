//! Generation of trace and span ids.

use crate::trace::{SpanId, TraceId};
use rand::rngs::{OsRng, SmallRng};
use rand::{RngCore, SeedableRng};
use std::cell::RefCell;
use std::fmt;

/// Interface for generating the ids that identify traces and spans.
pub trait IdGenerator: Send + Sync + fmt::Debug {
    /// Generate a new, valid (non-zero) `TraceId`.
    fn new_trace_id(&self) -> TraceId;

    /// Generate a new, valid (non-zero) `SpanId`.
    fn new_span_id(&self) -> SpanId;
}

/// Default [`IdGenerator`] implementation.
///
/// Ids come from the operating system's cryptographically strong random
/// source. If that source fails (it can on exotic or sandboxed targets), a
/// thread-local PRNG seeded from whatever entropy is available takes over so
/// span creation never fails. The all-zero value is invalid by definition
/// and is regenerated on the off chance it comes up.
#[derive(Clone, Debug, Default)]
pub struct RandomIdGenerator {
    _private: (),
}

impl IdGenerator for RandomIdGenerator {
    fn new_trace_id(&self) -> TraceId {
        loop {
            let mut bytes = [0u8; 16];
            fill_random(&mut bytes);
            let trace_id = TraceId::from_bytes(bytes);
            if trace_id != TraceId::INVALID {
                return trace_id;
            }
        }
    }

    fn new_span_id(&self) -> SpanId {
        loop {
            let mut bytes = [0u8; 8];
            fill_random(&mut bytes);
            let span_id = SpanId::from_bytes(bytes);
            if span_id != SpanId::INVALID {
                return span_id;
            }
        }
    }
}

fn fill_random(bytes: &mut [u8]) {
    if OsRng.try_fill_bytes(bytes).is_err() {
        FALLBACK_RNG.with(|rng| rng.borrow_mut().fill_bytes(bytes));
    }
}

thread_local! {
    /// Non-cryptographic fallback for when the OS source is unavailable.
    static FALLBACK_RNG: RefCell<SmallRng> = RefCell::new(SmallRng::from_entropy());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_valid() {
        let generator = RandomIdGenerator::default();
        for _ in 0..100 {
            assert_ne!(generator.new_trace_id(), TraceId::INVALID);
            assert_ne!(generator.new_span_id(), SpanId::INVALID);
        }
    }

    #[test]
    fn generated_ids_are_distinct() {
        let generator = RandomIdGenerator::default();
        let a = generator.new_trace_id();
        let b = generator.new_trace_id();
        assert_ne!(a, b);

        let a = generator.new_span_id();
        let b = generator.new_span_id();
        assert_ne!(a, b);
    }
}
