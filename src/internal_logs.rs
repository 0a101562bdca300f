//! Self-diagnostics for the SDK.
//!
//! The SDK never panics and never writes to stderr on its own. Anything
//! noteworthy (dropped spans, invalid configuration values, export failures)
//! is emitted through these macros, which forward to [`tracing`] with the
//! target `tracekit` when the `internal-logs` feature (on by default) is
//! enabled. With the feature off the macros compile to nothing, though the
//! arguments are still type-checked in test and debug builds.
//!
//! Each macro expands to a single block so calls work in expression position
//! (e.g. as a match arm) as well as statement position.
//!
//! **Warning**: do not hand spans produced by this crate to a `tracing`
//! subscriber that is itself instrumented with `tracekit`, or the
//! diagnostics will feed back into themselves.

/// Emit an error-level diagnostic.
macro_rules! tk_error {
    (name: $name:expr $(,)?) => {{
        #[cfg(feature = "internal-logs")]
        {
            tracing::error!(name: $name, target: "tracekit", "");
        }
        #[cfg(all(not(feature = "internal-logs"), any(test, debug_assertions)))]
        {
            let _ = $name;
        }
    }};
    (name: $name:expr, $($key:ident = $value:expr),+ $(,)?) => {{
        #[cfg(feature = "internal-logs")]
        {
            tracing::error!(name: $name, target: "tracekit", $($key = $value),+, "");
        }
        #[cfg(all(not(feature = "internal-logs"), any(test, debug_assertions)))]
        {
            let _ = ($name, $($value),+);
        }
    }};
}

/// Emit a warning-level diagnostic.
macro_rules! tk_warn {
    (name: $name:expr $(,)?) => {{
        #[cfg(feature = "internal-logs")]
        {
            tracing::warn!(name: $name, target: "tracekit", "");
        }
        #[cfg(all(not(feature = "internal-logs"), any(test, debug_assertions)))]
        {
            let _ = $name;
        }
    }};
    (name: $name:expr, $($key:ident = $value:expr),+ $(,)?) => {{
        #[cfg(feature = "internal-logs")]
        {
            tracing::warn!(name: $name, target: "tracekit", $($key = $value),+, "");
        }
        #[cfg(all(not(feature = "internal-logs"), any(test, debug_assertions)))]
        {
            let _ = ($name, $($value),+);
        }
    }};
}

/// Emit an info-level diagnostic.
macro_rules! tk_info {
    (name: $name:expr $(,)?) => {{
        #[cfg(feature = "internal-logs")]
        {
            tracing::info!(name: $name, target: "tracekit", "");
        }
        #[cfg(all(not(feature = "internal-logs"), any(test, debug_assertions)))]
        {
            let _ = $name;
        }
    }};
    (name: $name:expr, $($key:ident = $value:expr),+ $(,)?) => {{
        #[cfg(feature = "internal-logs")]
        {
            tracing::info!(name: $name, target: "tracekit", $($key = $value),+, "");
        }
        #[cfg(all(not(feature = "internal-logs"), any(test, debug_assertions)))]
        {
            let _ = ($name, $($value),+);
        }
    }};
}

/// Emit a debug-level diagnostic.
macro_rules! tk_debug {
    (name: $name:expr $(,)?) => {{
        #[cfg(feature = "internal-logs")]
        {
            tracing::debug!(name: $name, target: "tracekit", "");
        }
        #[cfg(all(not(feature = "internal-logs"), any(test, debug_assertions)))]
        {
            let _ = $name;
        }
    }};
    (name: $name:expr, $($key:ident = $value:expr),+ $(,)?) => {{
        #[cfg(feature = "internal-logs")]
        {
            tracing::debug!(name: $name, target: "tracekit", $($key = $value),+, "");
        }
        #[cfg(all(not(feature = "internal-logs"), any(test, debug_assertions)))]
        {
            let _ = ($name, $($value),+);
        }
    }};
}

pub(crate) use {tk_debug, tk_error, tk_info, tk_warn};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macros_work_in_expression_position() {
        // match arms and if/else branches hand the macro expansion to the
        // compiler as an expression, not a statement
        let result: Result<(), &str> = Err("boom");
        match result {
            Ok(()) => tk_info!(name: "Test.Ok"),
            Err(err) => tk_warn!(name: "Test.Failed", message = err),
        }

        if result.is_err() {
            tk_error!(name: "Test.Failed")
        } else {
            tk_debug!(name: "Test.Ok", detail = "fine")
        }
    }
}
