use promptjudge_content::Namespace;
use serde::{Deserialize, Serialize};

use crate::RunError;

/// What to compare, and the context to compare it in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    /// Candidate A
    pub baseline: String,
    /// Candidate B
    pub variant: String,
    /// Who the judge should act as
    pub expert: String,
    /// `[owner/collection:]path[@version]` strings
    pub context_refs: Vec<String>,
    /// Namespace for references without one
    pub namespace: Namespace,
    /// Improvement round this run belongs to (1 = first)
    pub iteration: u32,
}

impl RunRequest {
    pub fn new(
        baseline: impl Into<String>,
        variant: impl Into<String>,
        expert: impl Into<String>,
        namespace: Namespace,
    ) -> Self {
        Self {
            baseline: baseline.into(),
            variant: variant.into(),
            expert: expert.into(),
            context_refs: Vec::new(),
            namespace,
            iteration: 1,
        }
    }

    pub fn with_context(mut self, refs: Vec<String>) -> Self {
        self.context_refs = refs;
        self
    }

    pub fn with_iteration(mut self, iteration: u32) -> Self {
        self.iteration = iteration;
        self
    }

    /// Upfront checks; the only failures that make a run unsuccessful
    pub fn validate(&self) -> Result<(), RunError> {
        if self.baseline.trim().is_empty() {
            return Err(RunError::EmptyCandidate { which: "baseline" });
        }
        if self.variant.trim().is_empty() {
            return Err(RunError::EmptyCandidate { which: "variant" });
        }
        if self.baseline.trim() == self.variant.trim() {
            return Err(RunError::IdenticalCandidates);
        }
        if self.expert.trim().is_empty() {
            return Err(RunError::EmptyExpert);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(baseline: &str, variant: &str, expert: &str) -> RunRequest {
        RunRequest::new(baseline, variant, expert, Namespace::new("acme", "prompts"))
    }

    #[test]
    fn test_validate() {
        assert_eq!(request("a", "b", "expert").validate(), Ok(()));
        assert_eq!(
            request("  ", "b", "expert").validate(),
            Err(RunError::EmptyCandidate { which: "baseline" })
        );
        assert_eq!(
            request("a", "", "expert").validate(),
            Err(RunError::EmptyCandidate { which: "variant" })
        );
        assert_eq!(
            request("same\n", "same", "expert").validate(),
            Err(RunError::IdenticalCandidates)
        );
        assert_eq!(request("a", "b", "").validate(), Err(RunError::EmptyExpert));
    }
}
