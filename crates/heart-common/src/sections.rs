use indexmap::IndexMap;

/// Ordered section name → body mapping, in order of first appearance.
pub type SectionMap = IndexMap<String, String>;

pub const RECOMMENDATION: &str = "Recommendation";
pub const RATIONALE: &str = "Rationale";
pub const NEXT_STEPS: &str = "Next Steps";
pub const CONSULT_OTHER_TEAMS: &str = "Consult Other Teams";

/// The four sections the assistant is instructed to answer with, in display order.
pub const CANONICAL_SECTIONS: [&str; 4] =
    [RECOMMENDATION, RATIONALE, NEXT_STEPS, CONSULT_OTHER_TEAMS];
