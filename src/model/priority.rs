//! Registration priority.

use serde::{Deserialize, Serialize};

/// Queue a registration command is drained from.
///
/// The drain empties `High` fully, then `Medium`, then `Low`, so commands on a
/// higher queue are applied before any command on a lower one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    /// Drained first.
    High,
    /// Default.
    #[default]
    Medium,
    /// Drained last.
    Low,
}

impl Priority {
    /// All priorities in drain order.
    pub const DRAIN_ORDER: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    /// Returns a short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_medium() {
        assert_eq!(Priority::default(), Priority::Medium);
    }

    #[test]
    fn drain_order_is_high_to_low() {
        let mut sorted = Priority::DRAIN_ORDER;
        sorted.sort();
        assert_eq!(sorted, Priority::DRAIN_ORDER);
    }
}
