use crate::hierarchy::QualifierHierarchy;
use crate::hierarchy::conversion::ConversionHierarchy;
use crate::rules::RefinementRules;

/// Conversion categories only come from declarations and contracts, the
/// rules add nothing beyond equality refinement.
#[derive(Debug, Default)]
pub struct ConversionRules {
    hierarchy: ConversionHierarchy,
}

impl ConversionRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conversion(&self) -> &ConversionHierarchy {
        &self.hierarchy
    }
}

impl RefinementRules for ConversionRules {
    fn hierarchy(&self) -> &(dyn QualifierHierarchy + 'static) {
        &self.hierarchy
    }
}
