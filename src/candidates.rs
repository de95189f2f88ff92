use serde::{Serialize, Serializer};

use crate::types::VersionStage;

/// Versions a file could still be. Narrowing returns a new set; a set never
/// regains a stage it has lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionCandidateSet {
    remaining: [bool; 4],
}

impl VersionCandidateSet {
    pub fn full() -> Self {
        Self {
            remaining: [true; 4],
        }
    }

    pub fn excluding(&self, stages: &[VersionStage]) -> Self {
        let mut remaining = self.remaining;
        for stage in stages {
            remaining[index(*stage)] = false;
        }
        Self { remaining }
    }

    pub fn contains(&self, stage: VersionStage) -> bool {
        self.remaining[index(stage)]
    }

    pub fn stages(&self) -> Vec<VersionStage> {
        VersionStage::ALL
            .into_iter()
            .filter(|s| self.contains(*s))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        !self.remaining.iter().any(|r| *r)
    }
}

impl Default for VersionCandidateSet {
    fn default() -> Self {
        Self::full()
    }
}

fn index(stage: VersionStage) -> usize {
    match stage {
        VersionStage::SubmittedManuscriptUnderReview => 0,
        VersionStage::AcceptedManuscript => 1,
        VersionStage::Proof => 2,
        VersionStage::VersionOfRecord => 3,
    }
}

impl Serialize for VersionCandidateSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.stages())
    }
}
