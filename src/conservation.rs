use std::collections::HashSet;

/// Blocks harvest of species that need a special permit.
#[derive(Debug, Clone, Default)]
pub struct ConservationGuard {
    endangered: HashSet<String>,
}

impl ConservationGuard {
    pub fn new<I, S>(endangered: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            endangered: endangered.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_unrestricted(&self, species: &str) -> bool {
        !self.endangered.contains(species)
    }
}
