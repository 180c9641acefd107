//! Tunable command-generation settings.

use crate::config::Limits;

/// Desired command length and vocabulary sampling scope.
///
/// Both values are kept inside the configured bounds on every write; the
/// struct holds only the latest tuned value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSettings {
    length: usize,
    scope: u8,
    limits: Limits,
}

impl CommandSettings {
    /// Creates settings, clamping both values into `limits`.
    #[must_use]
    pub fn new(length: usize, scope: u8, limits: Limits) -> Self {
        let mut settings = Self {
            length: limits.cmd_min,
            scope: limits.scope_min,
            limits,
        };
        settings.set_length(length);
        settings.set_scope(scope);
        settings
    }

    /// Desired number of tokens per command.
    #[must_use]
    pub const fn length(&self) -> usize {
        self.length
    }

    /// Sampling scope percentage.
    #[must_use]
    pub const fn scope(&self) -> u8 {
        self.scope
    }

    /// Bounds the settings are clamped to.
    #[must_use]
    pub const fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Sets the desired length, clamped.
    pub fn set_length(&mut self, length: usize) {
        self.length = length.clamp(self.limits.cmd_min, self.limits.cmd_max);
    }

    /// Sets the scope, clamped.
    pub fn set_scope(&mut self, scope: u8) {
        self.scope = scope.clamp(self.limits.scope_min, self.limits.scope_max);
    }

    /// Moves the desired length one step in the direction of `step`'s sign
    /// and returns the new length.
    pub fn nudge_length(&mut self, step: i8) -> usize {
        let next = match step.signum() {
            1 => self.length.saturating_add(1),
            -1 => self.length.saturating_sub(1),
            _ => self.length,
        };
        self.set_length(next);
        self.length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_clamps_into_limits() {
        let s = CommandSettings::new(0, 0, Limits::default());
        assert_eq!(s.length(), 1);
        assert_eq!(s.scope(), 1);

        let s = CommandSettings::new(50, 200, Limits::default());
        assert_eq!(s.length(), 10);
        assert_eq!(s.scope(), 100);
    }

    #[test]
    fn nudge_stays_in_bounds() {
        let mut s = CommandSettings::new(1, 50, Limits::default());
        assert_eq!(s.nudge_length(-1), 1);
        assert_eq!(s.nudge_length(1), 2);
        assert_eq!(s.nudge_length(0), 2);
        for _ in 0..20 {
            s.nudge_length(1);
        }
        assert_eq!(s.length(), 10);
    }
}
