use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ExplorerError;

/// Datahub category codes and their English labels.
const BUILTIN_LABELS: &[(&str, &str)] = &[
    ("BE01", "Apartments, block of flats"),
    (
        "BE02",
        "Apartments, small house (row, semi-detached, detached), electric heating",
    ),
    (
        "BE03",
        "Apartments, small house (row, semi-detached, detached), non-electric heating",
    ),
    ("BE04", "Apartments, holiday home"),
    ("BE05", "Residential properties"),
    ("BE06", "Agricultural production (TOL A)"),
    ("BE07", "Industry (TOL B and C)"),
    ("BE08", "Community or energy and water supply (TOL D, E)"),
    ("BE09", "Construction (temporary electricity) (TOL F)"),
    ("BE10", "Services"),
    ("BE11", "Outdoor lighting"),
    ("BE12", "Electric car charging points"),
    ("BE13", "Traffic"),
    ("BE14", "Other site"),
    ("AB01", "Company"),
    ("AB02", "Consumer"),
    ("AV01", "Hydropower"),
    ("AV02", "Wind power"),
    ("AV03", "Nuclear power"),
    ("AV04", "Gas turbine"),
    ("AV05", "Diesel engine"),
    ("AV06", "Solar power"),
    ("AV07", "Wave power"),
    ("AV08", "Combined heat and power"),
    ("AV09", "Biopower"),
    ("AV10", "Other production"),
    ("AV11", "Wind power, offshore"),
    ("AV12", "Energy storage"),
    ("0", "0-2000 kWh"),
    ("2k", "2000-20 000 kWh"),
    ("20k", "20 000-100 000 kWh"),
    ("100k", "over 100 000 kWh"),
    ("E13", "Continuous measurement"),
    ("E14", "Reading measurement"),
    ("E16", "Unmetered"),
];

pub trait LabelLookup: Send + Sync {
    fn lookup(&self, code: &str) -> Option<String>;
}

/// What to do with a code the lookup does not know.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackPolicy {
    #[default]
    Identity,
    Strict,
}

#[derive(Debug, Clone, Default)]
pub struct BuiltinLabels;

impl LabelLookup for BuiltinLabels {
    fn lookup(&self, code: &str) -> Option<String> {
        BUILTIN_LABELS
            .iter()
            .find(|(key, _)| *key == code)
            .map(|(_, label)| label.to_string())
    }
}

/// Extra codes layered over another lookup. Overlay entries win.
#[derive(Debug, Clone, Default)]
pub struct OverlayLabels<L> {
    base: L,
    overrides: HashMap<String, String>,
}

impl<L: LabelLookup> OverlayLabels<L> {
    pub fn new(base: L, overrides: HashMap<String, String>) -> Self {
        Self { base, overrides }
    }
}

impl<L: LabelLookup> LabelLookup for OverlayLabels<L> {
    fn lookup(&self, code: &str) -> Option<String> {
        self.overrides
            .get(code)
            .cloned()
            .or_else(|| self.base.lookup(code))
    }
}

/// A lookup bound to its fallback policy.
pub struct Labeler {
    lookup: Box<dyn LabelLookup>,
    policy: FallbackPolicy,
}

impl Labeler {
    pub fn new(lookup: Box<dyn LabelLookup>, policy: FallbackPolicy) -> Self {
        Self { lookup, policy }
    }

    pub fn builtin() -> Self {
        Self::new(Box::new(BuiltinLabels), FallbackPolicy::Identity)
    }

    pub fn with_overrides(overrides: HashMap<String, String>, policy: FallbackPolicy) -> Self {
        Self::new(Box::new(OverlayLabels::new(BuiltinLabels, overrides)), policy)
    }

    pub fn policy(&self) -> FallbackPolicy {
        self.policy
    }

    pub fn label(&self, code: &str) -> Result<String, ExplorerError> {
        match self.lookup.lookup(code) {
            Some(label) => Ok(label),
            None => match self.policy {
                FallbackPolicy::Identity => {
                    tracing::debug!(code, "no label for category code, using raw code");
                    Ok(code.to_string())
                }
                FallbackPolicy::Strict => Err(ExplorerError::MappingGap(code.to_string())),
            },
        }
    }

    /// Label for one tag combination, dimensions joined with " - ".
    pub fn combination_label(&self, codes: &[String]) -> Result<String, ExplorerError> {
        let labels = codes
            .iter()
            .map(|code| self.label(code))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(labels.join(" - ").trim().to_string())
    }
}

impl Default for Labeler {
    fn default() -> Self {
        Self::builtin()
    }
}

pub fn builtin_entries() -> impl Iterator<Item = (&'static str, &'static str)> {
    BUILTIN_LABELS.iter().copied()
}
