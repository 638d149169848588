use crate::error::{TallyError, TallyResult};
use serde::Serialize;

/// Binning of one histogram dimension. Bin `0` is the underflow and bin `bins() + 1` the
/// overflow.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Axis {
    edges: Vec<f64>,
}

impl Axis {
    pub fn uniform(bins: usize, low: f64, high: f64) -> TallyResult<Self> {
        if bins == 0 || !(low < high) {
            return Err(TallyError::InvalidTarget(format!(
                "invalid uniform axis ({bins} bins from {low} to {high})"
            )));
        }
        let width = (high - low) / bins as f64;
        let mut edges: Vec<f64> = (0..bins).map(|i| low + width * i as f64).collect();
        edges.push(high);
        Ok(Self { edges })
    }

    pub fn variable(edges: Vec<f64>) -> TallyResult<Self> {
        if edges.len() < 2 || edges.windows(2).any(|w| !(w[0] < w[1])) {
            return Err(TallyError::InvalidTarget(
                "axis edges must be strictly increasing with at least two values".into(),
            ));
        }
        Ok(Self { edges })
    }

    pub fn bins(&self) -> usize {
        self.edges.len() - 1
    }

    /// Lower edge of in-range bin `bin` (1-based).
    pub fn low_edge(&self, bin: usize) -> f64 {
        self.edges[bin.clamp(1, self.bins()) - 1]
    }

    /// Upper edge of in-range bin `bin` (1-based).
    pub fn up_edge(&self, bin: usize) -> f64 {
        self.edges[bin.clamp(1, self.bins())]
    }

    /// NaN is counted as overflow.
    pub fn find_bin(&self, x: f64) -> usize {
        if x < self.edges[0] {
            0
        } else if x.is_nan() || x >= self.edges[self.bins()] {
            self.bins() + 1
        } else {
            self.edges.partition_point(|&edge| edge <= x)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Hist1D {
    name: String,
    axis: Axis,
    contents: Vec<f64>,
    sumw2: Vec<f64>,
    entries: u64,
}

impl Hist1D {
    pub fn new(name: impl Into<String>, axis: Axis) -> Self {
        let cells = axis.bins() + 2;
        Self {
            name: name.into(),
            axis,
            contents: vec![0.0; cells],
            sumw2: vec![0.0; cells],
            entries: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn axis(&self) -> &Axis {
        &self.axis
    }

    pub fn entries(&self) -> u64 {
        self.entries
    }

    pub fn find_bin(&self, x: f64) -> usize {
        self.axis.find_bin(x)
    }

    pub fn fill(&mut self, x: f64, weight: f64) {
        let bin = self.axis.find_bin(x);
        self.contents[bin] += weight;
        self.sumw2[bin] += weight * weight;
        self.entries += 1;
    }

    /// Content of `bin`, including the underflow (`0`) and overflow (`bins() + 1`) bins.
    pub fn bin_content(&self, bin: usize) -> f64 {
        self.contents.get(bin).copied().unwrap_or(0.0)
    }

    pub fn set_bin_content(&mut self, bin: usize, value: f64) {
        if let Some(content) = self.contents.get_mut(bin) {
            *content = value;
        }
    }

    pub fn bin_error(&self, bin: usize) -> f64 {
        self.sumw2.get(bin).copied().unwrap_or(0.0).sqrt()
    }

    pub fn contents(&self) -> &[f64] {
        &self.contents
    }

    /// Sum of the in-range bins.
    pub fn integral(&self) -> f64 {
        self.contents[1..=self.axis.bins()].iter().sum()
    }

    /// Sum of all bins including under- and overflow.
    pub fn total(&self) -> f64 {
        self.contents.iter().sum()
    }

    /// Empty histogram with the same binning.
    pub fn empty_clone(&self, name: impl Into<String>) -> Self {
        Self::new(name, self.axis.clone())
    }

    pub fn add(&mut self, other: &Hist1D) -> TallyResult<()> {
        if self.axis != other.axis {
            return Err(TallyError::IncompatibleMerge {
                target: self.name.clone(),
                reason: format!("binning differs from {}", other.name),
            });
        }
        for (a, b) in self.contents.iter_mut().zip(&other.contents) {
            *a += b;
        }
        for (a, b) in self.sumw2.iter_mut().zip(&other.sumw2) {
            *a += b;
        }
        self.entries += other.entries;
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Hist2D {
    name: String,
    x_axis: Axis,
    y_axis: Axis,
    contents: Vec<f64>,
    sumw2: Vec<f64>,
    entries: u64,
}

impl Hist2D {
    pub fn new(name: impl Into<String>, x_axis: Axis, y_axis: Axis) -> Self {
        let cells = (x_axis.bins() + 2) * (y_axis.bins() + 2);
        Self {
            name: name.into(),
            x_axis,
            y_axis,
            contents: vec![0.0; cells],
            sumw2: vec![0.0; cells],
            entries: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn x_axis(&self) -> &Axis {
        &self.x_axis
    }

    pub fn y_axis(&self) -> &Axis {
        &self.y_axis
    }

    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Global bin index of `(bin_x, bin_y)`; both may address under- or overflow.
    pub fn bin(&self, bin_x: usize, bin_y: usize) -> usize {
        bin_y * (self.x_axis.bins() + 2) + bin_x
    }

    pub fn find_bin(&self, x: f64, y: f64) -> usize {
        self.bin(self.x_axis.find_bin(x), self.y_axis.find_bin(y))
    }

    pub fn fill(&mut self, x: f64, y: f64, weight: f64) {
        let bin = self.find_bin(x, y);
        self.contents[bin] += weight;
        self.sumw2[bin] += weight * weight;
        self.entries += 1;
    }

    pub fn bin_content(&self, bin: usize) -> f64 {
        self.contents.get(bin).copied().unwrap_or(0.0)
    }

    pub fn set_bin_content(&mut self, bin: usize, value: f64) {
        if let Some(content) = self.contents.get_mut(bin) {
            *content = value;
        }
    }

    pub fn total(&self) -> f64 {
        self.contents.iter().sum()
    }

    pub fn empty_clone(&self, name: impl Into<String>) -> Self {
        Self::new(name, self.x_axis.clone(), self.y_axis.clone())
    }

    pub fn add(&mut self, other: &Hist2D) -> TallyResult<()> {
        if self.x_axis != other.x_axis || self.y_axis != other.y_axis {
            return Err(TallyError::IncompatibleMerge {
                target: self.name.clone(),
                reason: format!("binning differs from {}", other.name),
            });
        }
        for (a, b) in self.contents.iter_mut().zip(&other.contents) {
            *a += b;
        }
        for (a, b) in self.sumw2.iter_mut().zip(&other.sumw2) {
            *a += b;
        }
        self.entries += other.entries;
        Ok(())
    }
}
