use serde::{Deserialize, Serialize};
use std::fmt::Display;

use crate::error::{AppError, AppResult};

/// Number of recommendations to request, always within 1..=50
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct TopK(u8);

impl TopK {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 50;
    pub const DEFAULT: u8 = 10;

    /// Validates a requested value
    pub fn new(k: i64) -> AppResult<Self> {
        if k < i64::from(Self::MIN) || k > i64::from(Self::MAX) {
            return Err(AppError::InvalidInput(format!(
                "top_k must be between {} and {}, got {}",
                Self::MIN,
                Self::MAX,
                k
            )));
        }
        Ok(Self(k as u8))
    }

    /// Clamps any value into range, the way the top-K input field behaves
    pub fn clamped(k: i64) -> Self {
        Self(k.clamp(i64::from(Self::MIN), i64::from(Self::MAX)) as u8)
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for TopK {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

impl TryFrom<i64> for TopK {
    type Error = AppError;

    fn try_from(k: i64) -> AppResult<Self> {
        Self::new(k)
    }
}

impl From<TopK> for u8 {
    fn from(k: TopK) -> u8 {
        k.0
    }
}

impl Display for TopK {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
