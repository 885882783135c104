//! Cooperative per-module deadlines

use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// A point in time after which a module must stop and report failure
///
/// Modules call [`Deadline::check`] at natural checkpoints (between
/// columns, between k-means restarts).
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    expires_at: Option<Instant>,
}

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Self {
            expires_at: Instant::now().checked_add(timeout),
        }
    }

    /// A deadline that never expires
    pub fn none() -> Self {
        Self { expires_at: None }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|t| Instant::now() >= t)
    }

    /// Fail with a computation error once expired
    pub fn check(&self, stage: &str) -> Result<()> {
        if self.is_expired() {
            return Err(Error::Computation(format!("deadline exceeded during {}", stage)));
        }
        Ok(())
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_timeout_expires() {
        let deadline = Deadline::after(Duration::ZERO);
        assert!(deadline.is_expired());
        assert!(matches!(deadline.check("test"), Err(Error::Computation(_))));
    }

    #[test]
    fn test_none_never_expires() {
        assert!(Deadline::none().check("test").is_ok());
        assert!(Deadline::after(Duration::from_secs(60)).check("test").is_ok());
    }
}
