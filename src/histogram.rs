/// Fixed-resolution 1-D hit histogram for a single straw
///
/// Bin `i` counts hits whose position is exactly `i`, so the histogram covers
/// `[0, resolution)` with unit-width bins and bin coordinates are pixel positions.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    pub counts: Vec<f64>,
    /// Hits outside `[0, resolution)`
    pub dropped: usize,
}

impl Histogram {
    pub fn from_hits(hits: &[i32], resolution: usize) -> Self {
        let mut counts = vec![0.0; resolution];
        let mut dropped = 0;

        for &hit in hits {
            match usize::try_from(hit) {
                Ok(bin) if bin < resolution => counts[bin] += 1.0,
                _ => dropped += 1,
            }
        }

        Self { counts, dropped }
    }

    pub fn resolution(&self) -> usize {
        self.counts.len()
    }
}
