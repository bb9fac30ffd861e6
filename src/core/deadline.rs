use crate::core::error::{Result, RiskError};
use std::time::{Duration, Instant};

/// Caller-supplied time budget for one calculation.
///
/// Long-running stages poll [`Deadline::check`]; expiry surfaces as
/// [`RiskError::CalculationTimeout`] instead of a partial result.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn is_expired(&self) -> bool {
        self.started.elapsed() > self.budget
    }

    pub fn check(&self) -> Result<()> {
        let elapsed = self.started.elapsed();
        if elapsed > self.budget {
            return Err(RiskError::CalculationTimeout {
                budget: self.budget,
                elapsed,
            });
        }
        Ok(())
    }
}

/// Check an optional deadline.
pub fn check(deadline: Option<&Deadline>) -> Result<()> {
    deadline.map_or(Ok(()), Deadline::check)
}
