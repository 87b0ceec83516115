//! Letter grades from the share of outdated/affected dependencies.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Letter grade. Boundary values belong to the better grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    /// ≤ 5%
    A,
    /// ≤ 15%
    B,
    /// ≤ 30%
    C,
    /// ≤ 50%
    D,
    /// > 50%
    F,
}

impl Grade {
    /// Grade a percentage in `0.0..=100.0`.
    pub fn from_percentage(percent: f64) -> Self {
        if percent <= 5.0 {
            Self::A
        } else if percent <= 15.0 {
            Self::B
        } else if percent <= 30.0 {
            Self::C
        } else if percent <= 50.0 {
            Self::D
        } else {
            Self::F
        }
    }

    /// Grade `affected` out of `total`. Nothing to grade counts as `A`.
    pub fn from_ratio(affected: u64, total: u64) -> Self {
        if total == 0 {
            return Self::A;
        }
        Self::from_percentage(percentage(affected, total))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::F => "F",
        }
    }

    /// Risk label shown next to the grade.
    pub fn risk_label(&self) -> &'static str {
        match self {
            Self::A => "EXCELLENT",
            Self::B => "GOOD",
            Self::C => "NEEDS ATTENTION",
            Self::D => "POOR",
            Self::F => "CRITICAL",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `affected / total` as a percentage, multiplying first so exact boundaries stay exact.
pub fn percentage(affected: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (affected as f64 * 100.0) / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundaries_belong_to_better_grade() {
        assert_eq!(Grade::from_percentage(5.0), Grade::A);
        assert_eq!(Grade::from_percentage(15.0), Grade::B);
        assert_eq!(Grade::from_percentage(30.0), Grade::C);
        assert_eq!(Grade::from_percentage(50.0), Grade::D);
        assert_eq!(Grade::from_percentage(50.01), Grade::F);
        assert_eq!(Grade::from_percentage(5.01), Grade::B);
    }

    #[test]
    fn test_from_ratio() {
        assert_eq!(Grade::from_ratio(5, 100), Grade::A);
        assert_eq!(Grade::from_ratio(3, 20), Grade::B);
        assert_eq!(Grade::from_ratio(1, 2), Grade::D);
        assert_eq!(Grade::from_ratio(5001, 10000), Grade::F);
        assert_eq!(Grade::from_ratio(0, 0), Grade::A);
    }

    #[test]
    fn test_risk_labels() {
        assert_eq!(Grade::A.risk_label(), "EXCELLENT");
        assert_eq!(Grade::C.risk_label(), "NEEDS ATTENTION");
        assert_eq!(Grade::F.risk_label(), "CRITICAL");
    }
}
