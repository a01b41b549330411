use std::collections::BTreeSet;

/// Names enabled by configuration and backed by an installed adapter.
#[derive(Debug, Clone, Default)]
pub struct CapabilitySet {
    available: BTreeSet<String>,
}

impl CapabilitySet {
    pub fn new(
        enabled: impl IntoIterator<Item = String>,
        installed: impl IntoIterator<Item = String>,
    ) -> Self {
        let installed: BTreeSet<String> = installed.into_iter().collect();
        Self {
            available: enabled
                .into_iter()
                .filter(|name| installed.contains(name))
                .collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.available.contains(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.available.iter().cloned().collect()
    }
}
