//! Runtime configuration for the resize notification engine.
//!
//! The one genuine tunable is the notify-loop iteration cap. The right value
//! is empirical, so it is exposed both programmatically and through an
//! environment variable rather than hard-coded.

use std::env;

/// Runtime configuration for the notify loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotifierConfig {
    /// Maximum delivery-loop repetitions within one frame before
    /// non-stabilization is treated as an error condition. Minimum 1.
    pub max_notify_iterations: usize,
}

impl NotifierConfig {
    /// Default iteration cap. Small on purpose: a loop that has not settled
    /// after a handful of layout passes is oscillating, not converging.
    pub const DEFAULT_MAX_ITERATIONS: usize = 4;

    /// Construct a config with an explicit iteration cap (minimum 1).
    #[must_use]
    pub const fn new(max_notify_iterations: usize) -> Self {
        let cap = if max_notify_iterations < 1 { 1 } else { max_notify_iterations };
        Self { max_notify_iterations: cap }
    }

    /// Load configuration from environment variables.
    ///
    /// - `RESIZE_NOTIFIER_MAX_ITERATIONS`: iteration cap (default: 4)
    #[must_use]
    pub fn from_env() -> Self {
        let max_notify_iterations = env::var("RESIZE_NOTIFIER_MAX_ITERATIONS")
            .ok()
            .and_then(|val| val.parse::<usize>().ok())
            .unwrap_or(Self::DEFAULT_MAX_ITERATIONS)
            .max(1);
        Self { max_notify_iterations }
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ITERATIONS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_clamps_cap_to_at_least_one() {
        assert_eq!(NotifierConfig::new(0).max_notify_iterations, 1);
        assert_eq!(NotifierConfig::new(7).max_notify_iterations, 7);
    }

    #[test]
    fn from_env_parses_clamps_and_falls_back() {
        // All cases run in one test: the variable is process-global and
        // unit tests share the process.
        // SAFETY: no other test in this binary touches this variable.
        unsafe { env::set_var("RESIZE_NOTIFIER_MAX_ITERATIONS", "7") };
        assert_eq!(NotifierConfig::from_env().max_notify_iterations, 7);

        unsafe { env::set_var("RESIZE_NOTIFIER_MAX_ITERATIONS", "0") };
        assert_eq!(NotifierConfig::from_env().max_notify_iterations, 1);

        unsafe { env::set_var("RESIZE_NOTIFIER_MAX_ITERATIONS", "not-a-number") };
        assert_eq!(
            NotifierConfig::from_env().max_notify_iterations,
            NotifierConfig::DEFAULT_MAX_ITERATIONS
        );

        unsafe { env::remove_var("RESIZE_NOTIFIER_MAX_ITERATIONS") };
        assert_eq!(
            NotifierConfig::from_env().max_notify_iterations,
            NotifierConfig::DEFAULT_MAX_ITERATIONS
        );
    }

    #[test]
    fn default_matches_documented_cap() {
        assert_eq!(
            NotifierConfig::default().max_notify_iterations,
            NotifierConfig::DEFAULT_MAX_ITERATIONS
        );
    }
}
