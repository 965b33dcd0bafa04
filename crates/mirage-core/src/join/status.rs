use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed-length vector of join outcomes, used as a map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JoinStatus(Box<[bool]>);

impl JoinStatus {
    pub fn new(bits: Vec<bool>) -> Self {
        Self(bits.into_boxed_slice())
    }

    pub fn empty() -> Self {
        Self(Box::new([]))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn bit(&self, i: usize) -> bool {
        self.0.get(i).copied().unwrap_or(false)
    }

    pub fn bits(&self) -> &[bool] {
        &self.0
    }

    /// Keep only the bits at `positions`, in that order.
    pub fn project(&self, positions: &[usize]) -> JoinStatus {
        JoinStatus(positions.iter().map(|&p| self.bit(p)).collect())
    }
}

impl From<Vec<bool>> for JoinStatus {
    fn from(bits: Vec<bool>) -> Self {
        Self::new(bits)
    }
}

impl fmt::Display for JoinStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bit in self.0.iter() {
            write!(f, "{}", if *bit { '1' } else { '0' })?;
        }
        Ok(())
    }
}
