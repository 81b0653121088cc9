use serde::{Deserialize, Serialize};

/// One evaluation pass, and the aspect of the candidate it scores
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aspect {
    Structure,
    Expertise,
    Effectiveness,
}

pub const ALL_ASPECTS: [Aspect; 3] = [Aspect::Structure, Aspect::Expertise, Aspect::Effectiveness];

impl Aspect {
    /// Attributes judged by this aspect's pass
    pub fn attributes(&self) -> &'static [Attribute] {
        match self {
            Aspect::Structure => &[Attribute::Clarity, Attribute::Organization],
            Aspect::Expertise => &[Attribute::Accuracy, Attribute::Depth],
            Aspect::Effectiveness => &[Attribute::Completeness, Attribute::Actionability],
        }
    }
}

impl std::fmt::Display for Aspect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Aspect::Structure => write!(f, "structure"),
            Aspect::Expertise => write!(f, "expertise"),
            Aspect::Effectiveness => write!(f, "effectiveness"),
        }
    }
}

/// A quality named in strengths and weaknesses
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    Clarity,
    Organization,
    Accuracy,
    Depth,
    Completeness,
    Actionability,
}

impl Attribute {
    /// Scores at or above this count as a strength
    pub fn strength_at(&self) -> f64 {
        match self {
            Attribute::Depth | Attribute::Completeness => 8.0,
            Attribute::Clarity
            | Attribute::Organization
            | Attribute::Accuracy
            | Attribute::Actionability => 7.0,
        }
    }

    /// Scores strictly below this count as a weakness
    pub fn weakness_below(&self) -> f64 {
        match self {
            Attribute::Depth | Attribute::Completeness => 6.0,
            Attribute::Clarity
            | Attribute::Organization
            | Attribute::Accuracy
            | Attribute::Actionability => 5.0,
        }
    }
}

impl std::fmt::Display for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Attribute::Clarity => "clarity",
            Attribute::Organization => "organization",
            Attribute::Accuracy => "accuracy",
            Attribute::Depth => "depth",
            Attribute::Completeness => "completeness",
            Attribute::Actionability => "actionability",
        };
        write!(f, "{}", name)
    }
}

/// An attribute tagged with the aspect that judged it
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Quality {
    pub aspect: Aspect,
    pub attribute: Attribute,
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.aspect, self.attribute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completeness_is_held_to_a_stricter_bar() {
        assert!(Attribute::Completeness.strength_at() > Attribute::Clarity.strength_at());
        assert!(Attribute::Depth.weakness_below() > Attribute::Accuracy.weakness_below());
    }

    #[test]
    fn test_every_attribute_belongs_to_one_aspect() {
        let mut seen: Vec<Attribute> = ALL_ASPECTS
            .iter()
            .flat_map(|a| a.attributes().iter().copied())
            .collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 6);
    }
}
