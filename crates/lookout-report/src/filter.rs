//! Sampler, level filter and before-report hook
//!
//! Every ingested payload passes these gates before it is queued:
//!
//! 1. **Sampling** - a uniform draw against `sample_rate`
//! 2. **Level filter** - error payloads only; see [`ReportLevel::admits`]
//! 3. **Hook** - a caller-supplied [`BeforeReport`] that may veto or
//!    replace the stamped payload

use std::fmt;
use std::sync::Arc;

use lookout_core::domain::payload::record_level;
use lookout_core::domain::{Category, DomainError, Payload, ReportLevel};
use lookout_core::ports::DropReason;
use rand::Rng;

// ============================================================================
// Hook
// ============================================================================

/// What the before-report hook decided for a payload
#[derive(Debug, Clone, PartialEq)]
pub enum HookDecision {
    /// Drop the payload silently
    Veto,
    /// Deliver this object instead of the original payload
    Replace(Payload),
    /// Deliver the original payload
    Keep,
}

/// Caller-supplied transform/veto hook, run on the stamped payload
pub type BeforeReport = Arc<dyn Fn(&Payload) -> HookDecision + Send + Sync>;

/// Runs `hook` on `payload`. Returns `None` when the payload is vetoed.
pub fn apply_hook(hook: Option<&BeforeReport>, payload: Payload) -> Option<Payload> {
    let Some(hook) = hook else {
        return Some(payload);
    };
    match hook(&payload) {
        HookDecision::Veto => None,
        HookDecision::Replace(replacement) => Some(replacement),
        HookDecision::Keep => Some(payload),
    }
}

// ============================================================================
// ReportFilter
// ============================================================================

/// Source of uniform draws in `[0, 1)`
pub type SampleSource = Box<dyn Fn() -> f64 + Send + Sync>;

/// Sample-rate and level gate
pub struct ReportFilter {
    sample_rate: f64,
    report_level: ReportLevel,
    draw: SampleSource,
}

impl fmt::Debug for ReportFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportFilter")
            .field("sample_rate", &self.sample_rate)
            .field("report_level", &self.report_level)
            .finish_non_exhaustive()
    }
}

impl ReportFilter {
    /// Creates a filter drawing from the thread-local RNG
    ///
    /// # Errors
    /// Returns [`DomainError::InvalidSampleRate`] when `sample_rate` is
    /// outside `[0, 1]` or not a number.
    pub fn new(sample_rate: f64, report_level: ReportLevel) -> Result<Self, DomainError> {
        Self::with_source(
            sample_rate,
            report_level,
            Box::new(|| rand::thread_rng().gen::<f64>()),
        )
    }

    /// Creates a filter with a custom draw source (useful for testing)
    pub fn with_source(
        sample_rate: f64,
        report_level: ReportLevel,
        draw: SampleSource,
    ) -> Result<Self, DomainError> {
        if !(0.0..=1.0).contains(&sample_rate) {
            return Err(DomainError::InvalidSampleRate(sample_rate));
        }
        Ok(Self {
            sample_rate,
            report_level,
            draw,
        })
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn report_level(&self) -> ReportLevel {
        self.report_level
    }

    /// Whether a single draw falls inside the sample rate.
    ///
    /// A rate of 0 admits nothing and a rate of 1 admits everything.
    pub fn sample(&self) -> bool {
        if self.sample_rate <= 0.0 {
            return false;
        }
        if self.sample_rate >= 1.0 {
            return true;
        }
        (self.draw)() <= self.sample_rate
    }

    /// Applies sampling and, for error payloads, the level threshold.
    pub fn admit(&self, category: Category, payload: &Payload) -> Result<(), DropReason> {
        if !self.sample() {
            return Err(DropReason::Sampled);
        }
        if category == Category::Error && !self.report_level.admits(record_level(payload)) {
            return Err(DropReason::Filtered);
        }
        Ok(())
    }
}
