/// Peaks paired by rank between the measured and simulated histograms
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedPeaks {
    pub measured: Vec<f64>,
    pub simulated: Vec<f64>,
    /// Peak counts before truncation
    pub measured_found: usize,
    pub simulated_found: usize,
}

impl MatchedPeaks {
    pub fn len(&self) -> usize {
        self.measured.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measured.is_empty()
    }

    pub fn count_difference(&self) -> usize {
        self.measured_found.abs_diff(self.simulated_found)
    }
}

/// Pair the i-th smallest measured peak with the i-th smallest simulated peak.
///
/// Extra peaks on the longer side are discarded.
pub fn match_peaks(measured: &[f64], simulated: &[f64]) -> MatchedPeaks {
    let mut m = measured.to_vec();
    let mut s = simulated.to_vec();
    m.sort_by(|a, b| a.total_cmp(b));
    s.sort_by(|a, b| a.total_cmp(b));

    let n = m.len().min(s.len());
    m.truncate(n);
    s.truncate(n);

    MatchedPeaks {
        measured: m,
        simulated: s,
        measured_found: measured.len(),
        simulated_found: simulated.len(),
    }
}
