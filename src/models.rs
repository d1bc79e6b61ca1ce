use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ErrorCategory;

/// Why a straw was not marked good
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StrawFailure {
    TooFewHits { hits: usize, minimum: usize },
    TooFewPeaks { measured: usize, simulated: usize },
    PeakCountMismatch { measured: usize, simulated: usize },
    SingularFit,
    OutOfRange { pixel: usize, value: f64 },
}

impl StrawFailure {
    pub fn category(&self) -> ErrorCategory {
        match self {
            StrawFailure::TooFewHits { .. }
            | StrawFailure::TooFewPeaks { .. }
            | StrawFailure::PeakCountMismatch { .. } => ErrorCategory::InsufficientData,
            StrawFailure::SingularFit => ErrorCategory::SingularFit,
            StrawFailure::OutOfRange { .. } => ErrorCategory::OutOfRange,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            StrawFailure::TooFewHits { hits, minimum } => {
                format!("{} hits, minimum {}", hits, minimum)
            }
            StrawFailure::TooFewPeaks {
                measured,
                simulated,
            } => format!("{} measured / {} simulated peaks", measured, simulated),
            StrawFailure::PeakCountMismatch {
                measured,
                simulated,
            } => format!("peak counts differ: {} vs {}", measured, simulated),
            StrawFailure::SingularFit => "singular polynomial fit".to_string(),
            StrawFailure::OutOfRange { pixel, value } => {
                format!("pixel {} maps to {:.1}", pixel, value)
            }
        }
    }
}

/// Calibration record for one straw
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Straw {
    pub measured_peaks: Vec<f64>,
    pub simulated_peaks: Vec<f64>,
    pub good_straw: bool,
    /// Ascending power order `[c0, c1, c2, c3, c4]`
    pub calibration_parameters: Vec<f64>,
    pub measured_hits_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<StrawFailure>,
    /// Histograms whose Gaussian refinement diverged and fell back to raw candidates (0-2)
    #[serde(default, skip_serializing_if = "is_zero")]
    pub refinement_fallbacks: usize,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

impl Straw {
    pub fn failed(failure: StrawFailure, measured_hits_count: usize) -> Self {
        Self {
            measured_hits_count,
            failure: Some(failure),
            ..Default::default()
        }
    }
}

/// Calibration results for every straw, indexed by straw number.
///
/// Serialized as a JSON object keyed by the decimal straw index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<usize, Straw>",
    into = "BTreeMap<usize, Straw>"
)]
pub struct StrawTable {
    straws: Vec<Straw>,
}

impl StrawTable {
    pub fn new(straws: Vec<Straw>) -> Self {
        Self { straws }
    }

    pub fn len(&self) -> usize {
        self.straws.len()
    }

    pub fn is_empty(&self) -> bool {
        self.straws.is_empty()
    }

    pub fn get(&self, straw: usize) -> Option<&Straw> {
        self.straws.get(straw)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Straw)> {
        self.straws.iter().enumerate()
    }

    pub fn good_count(&self) -> usize {
        self.straws.iter().filter(|s| s.good_straw).count()
    }

    /// Straws with at least one diverged Gaussian refinement
    pub fn refinement_fallback_count(&self) -> usize {
        self.straws
            .iter()
            .filter(|s| s.refinement_fallbacks > 0)
            .count()
    }

    /// Not-good straws per error class
    pub fn failure_counts(&self) -> BTreeMap<ErrorCategory, usize> {
        let mut counts = BTreeMap::new();
        for failure in self.straws.iter().filter_map(|s| s.failure.as_ref()) {
            *counts.entry(failure.category()).or_insert(0) += 1;
        }
        counts
    }
}

impl From<StrawTable> for BTreeMap<usize, Straw> {
    fn from(table: StrawTable) -> Self {
        table.straws.into_iter().enumerate().collect()
    }
}

impl TryFrom<BTreeMap<usize, Straw>> for StrawTable {
    type Error = String;

    fn try_from(map: BTreeMap<usize, Straw>) -> Result<Self, Self::Error> {
        // BTreeMap iterates in key order, so contiguity means key == position
        for (position, key) in map.keys().enumerate() {
            if *key != position {
                return Err(format!("straw index {} missing from calibration data", position));
            }
        }
        Ok(Self {
            straws: map.into_values().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn good_straw() -> Straw {
        Straw {
            measured_peaks: vec![50.0, 130.5, 210.25, 290.0, 370.0, 450.0],
            simulated_peaks: vec![52.0, 132.0, 212.0, 292.0, 372.0, 452.0],
            good_straw: true,
            calibration_parameters: vec![2.0, 1.0, 1e-7, -3e-10, 4e-13],
            measured_hits_count: 1200,
            failure: None,
            refinement_fallbacks: 0,
        }
    }

    #[test]
    fn test_field_names() {
        let json = serde_json::to_string(&good_straw()).unwrap();
        assert!(json.contains("\"measuredPeaks\""));
        assert!(json.contains("\"simulatedPeaks\""));
        assert!(json.contains("\"goodStraw\":true"));
        assert!(json.contains("\"calibrationParameters\""));
        assert!(json.contains("\"measuredHitsCount\":1200"));
        assert!(!json.contains("failure"));
        assert!(!json.contains("refinementFallbacks"));
    }

    #[test]
    fn test_refinement_fallbacks_serialized_when_present() {
        let straw = Straw {
            refinement_fallbacks: 2,
            ..good_straw()
        };
        let json = serde_json::to_string(&straw).unwrap();
        assert!(json.contains("\"refinementFallbacks\":2"));
        let back: Straw = serde_json::from_str(&json).unwrap();
        assert_eq!(back, straw);

        let table = StrawTable::new(vec![good_straw(), straw]);
        assert_eq!(table.refinement_fallback_count(), 1);
    }

    #[test]
    fn test_failure_serialization() {
        let straw = Straw::failed(StrawFailure::TooFewHits { hits: 50, minimum: 100 }, 50);
        let json = serde_json::to_string(&straw).unwrap();
        assert!(json.contains("\"kind\":\"tooFewHits\""));

        let back: Straw = serde_json::from_str(&json).unwrap();
        assert_eq!(back, straw);
    }

    #[test]
    fn test_table_keys_are_straw_indices() {
        let table = StrawTable::new(vec![
            good_straw(),
            Straw::failed(StrawFailure::SingularFit, 300),
        ]);
        let value = serde_json::to_value(&table).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 2);
        assert_eq!(object["0"]["goodStraw"], true);
        assert_eq!(object["1"]["goodStraw"], false);

        let back: StrawTable = serde_json::from_value(value).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn test_table_rejects_gaps() {
        let json = r#"{"0": {"measuredPeaks": [], "simulatedPeaks": [], "goodStraw": false,
                             "calibrationParameters": [], "measuredHitsCount": 0},
                       "2": {"measuredPeaks": [], "simulatedPeaks": [], "goodStraw": false,
                             "calibrationParameters": [], "measuredHitsCount": 0}}"#;
        assert!(serde_json::from_str::<StrawTable>(json).is_err());
    }

    #[test]
    fn test_failure_counts() {
        let table = StrawTable::new(vec![
            good_straw(),
            Straw::failed(StrawFailure::TooFewHits { hits: 3, minimum: 100 }, 3),
            Straw::failed(StrawFailure::TooFewPeaks { measured: 3, simulated: 3 }, 900),
            Straw::failed(StrawFailure::SingularFit, 900),
        ]);
        assert_eq!(table.good_count(), 1);
        let counts = table.failure_counts();
        assert_eq!(counts[&ErrorCategory::InsufficientData], 2);
        assert_eq!(counts[&ErrorCategory::SingularFit], 1);
        assert!(!counts.contains_key(&ErrorCategory::OutOfRange));
    }
}
