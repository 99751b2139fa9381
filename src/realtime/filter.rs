use crate::nav::Fix;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterVerdict {
    Accept,
    /// Same timestamp and position as the last accepted fix
    Duplicate,
    /// Older than the last accepted fix
    OutOfOrder,
}

/// Guards the engine from repeated and reordered platform fixes. The engine
/// itself does not deduplicate.
#[derive(Debug, Default)]
pub struct FixFilter {
    last: Option<Fix>,
}

impl FixFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invalid fixes are passed on for the engine to reject but never become
    /// the reference fix, so a corrupt timestamp cannot hold back later fixes.
    pub fn check(&mut self, fix: &Fix) -> FilterVerdict {
        if fix.validate().is_err() {
            return FilterVerdict::Accept;
        }
        if let Some(last) = &self.last {
            if fix.is_duplicate_of(last) {
                return FilterVerdict::Duplicate;
            }
            if fix.timestamp_ms < last.timestamp_ms {
                return FilterVerdict::OutOfOrder;
            }
        }
        self.last = Some(*fix);
        FilterVerdict::Accept
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}
