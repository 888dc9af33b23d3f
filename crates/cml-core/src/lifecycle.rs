//! Pass lifecycle tracking.

use std::time::Instant;

/// Stages of a single engine pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassPhase {
    /// Script environment assembled.
    Bind,
    /// Policy script executed and its outputs read.
    Execute,
    /// Backing files validated.
    Validate,
    /// Conditional response resolved.
    Resolve,
    /// Request re-targeted at the regeneration handler.
    Redirect,
    /// Pass ended on the error path.
    Error,
}

impl PassPhase {
    /// Phase name for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bind => "bind",
            Self::Execute => "execute",
            Self::Validate => "validate",
            Self::Resolve => "resolve",
            Self::Redirect => "redirect",
            Self::Error => "error",
        }
    }
}

/// Timing context for one pass.
#[derive(Debug, Clone)]
pub struct PassTiming {
    start: Instant,
    phases: Vec<PassPhase>,
}

impl PassTiming {
    /// Start timing a pass.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            phases: Vec::new(),
        }
    }

    /// Record the end of a phase.
    pub fn mark(&mut self, phase: PassPhase) {
        self.phases.push(phase);
    }

    /// Elapsed microseconds since start.
    pub fn elapsed_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    /// Phases reached so far, in order.
    pub fn phases(&self) -> &[PassPhase] {
        &self.phases
    }

    /// Phases reached so far as `bind,execute,...`.
    pub fn trail(&self) -> String {
        self.phases
            .iter()
            .map(PassPhase::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl Default for PassTiming {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marks_keep_order() {
        let mut timing = PassTiming::new();
        timing.mark(PassPhase::Bind);
        timing.mark(PassPhase::Execute);
        timing.mark(PassPhase::Redirect);

        assert_eq!(
            timing.phases(),
            &[PassPhase::Bind, PassPhase::Execute, PassPhase::Redirect]
        );
        assert_eq!(timing.trail(), "bind,execute,redirect");
    }
}
