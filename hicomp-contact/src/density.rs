//! Per-interval densities used to type compartments.
//!
//! A [`DensitySource`] measures how "rich" an interval is and says which
//! side of 1.0 means A-like. Two sources are provided: a [`ReferenceTrack`]
//! (gene density, GC content, ... read from bedGraph or BED) and the
//! [`InteractionDensity`] of the contact matrix itself.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use hicomp_core::{HicompError, Result, Summarizable};

use crate::compartment::CompartmentInterval;
use crate::matrix::ContactMatrix;
use crate::sections::Section;

/// Capability to measure interval densities.
pub trait DensitySource: Sync {
    /// Density of chromosome-local bins `start..=end` of `section`, skipping
    /// the global bins in `bads`.
    fn density(&self, section: &Section, start: usize, end: usize, bads: &BTreeSet<usize>) -> f64;

    /// Whether a normalized density denotes the A-like compartment.
    fn is_a_like(&self, density: f64) -> bool;
}

// ---------------------------------------------------------------------------
// Reference track
// ---------------------------------------------------------------------------

/// Binned reference signal: chromosome → bin → value.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReferenceTrack {
    values: HashMap<String, HashMap<usize, f64>>,
}

fn skip_line(line: &str) -> bool {
    line.is_empty() || line.starts_with("track") || line.starts_with("browser") || line.starts_with('#')
}

fn parse_field<T: std::str::FromStr>(field: &str, what: &str, line: usize) -> Result<T> {
    field
        .parse()
        .map_err(|_| HicompError::Parse(format!("line {}: invalid {} '{}'", line, what, field)))
}

impl ReferenceTrack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `value` to every bin overlapped by `[start, end)`.
    pub fn add(&mut self, chromosome: &str, start: u64, end: u64, value: f64, resolution: usize) {
        let res = resolution as u64;
        let first = (start / res) as usize;
        let last = (end.max(start + 1) - 1) / res;
        let bins = self.values.entry(chromosome.to_string()).or_default();
        for bin in first..=last as usize {
            *bins.entry(bin).or_insert(0.0) += value;
        }
    }

    /// Parse a bedGraph track (`chrom start end value`).
    ///
    /// Skips `track`, `browser` and `#` lines. Values are summed into the
    /// bins each record overlaps.
    pub fn from_bedgraph_str(data: &str, resolution: usize) -> Result<Self> {
        Self::parse(data, resolution, true)
    }

    /// Parse a BED file; each bin counts the features overlapping it.
    pub fn from_bed_str(data: &str, resolution: usize) -> Result<Self> {
        Self::parse(data, resolution, false)
    }

    /// Read a bedGraph (`.bedgraph`, `.bg`) or BED file from disk.
    pub fn from_path(path: impl AsRef<Path>, resolution: usize) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let is_bedgraph = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("bedgraph") || e.eq_ignore_ascii_case("bg"));
        Self::parse(&text, resolution, is_bedgraph)
    }

    fn parse(data: &str, resolution: usize, with_value: bool) -> Result<Self> {
        if resolution == 0 {
            return Err(HicompError::InvalidInput("resolution must be positive".into()));
        }
        let needed = if with_value { 4 } else { 3 };
        let mut track = Self::new();
        for (idx, line) in data.lines().enumerate() {
            let line = line.trim();
            if skip_line(line) {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < needed {
                return Err(HicompError::Parse(format!(
                    "line {}: expected {} fields, found {}",
                    idx + 1,
                    needed,
                    fields.len()
                )));
            }
            let start: u64 = parse_field(fields[1], "start coordinate", idx + 1)?;
            let end: u64 = parse_field(fields[2], "end coordinate", idx + 1)?;
            if end < start {
                return Err(HicompError::Parse(format!(
                    "line {}: end {} before start {}",
                    idx + 1,
                    end,
                    start
                )));
            }
            let value = if with_value {
                parse_field(fields[3], "value", idx + 1)?
            } else {
                1.0
            };
            track.add(fields[0], start, end, value, resolution);
        }
        Ok(track)
    }

    /// Value of a chromosome-local bin.
    pub fn value(&self, chromosome: &str, bin: usize) -> Option<f64> {
        self.values.get(chromosome)?.get(&bin).copied()
    }

    pub fn has_chromosome(&self, chromosome: &str) -> bool {
        self.values.contains_key(chromosome)
    }

    pub fn chromosomes(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|k| k.as_str())
    }
}

impl Summarizable for ReferenceTrack {
    fn summary(&self) -> String {
        let bins: usize = self.values.values().map(|b| b.len()).sum();
        format!(
            "ReferenceTrack: {} chromosomes, {} bins with signal",
            self.values.len(),
            bins
        )
    }
}

impl DensitySource for ReferenceTrack {
    fn density(&self, section: &Section, start: usize, end: usize, bads: &BTreeSet<usize>) -> f64 {
        let (sum, count) = (start..=end)
            .filter(|k| !bads.contains(&(section.start + k)))
            .fold((0.0, 0usize), |(s, c), k| {
                (s + self.value(&section.name, k).unwrap_or(0.0), c + 1)
            });
        if count == 0 {
            1.0
        } else {
            sum / count as f64
        }
    }

    fn is_a_like(&self, density: f64) -> bool {
        density >= 1.0
    }
}

// ---------------------------------------------------------------------------
// Interaction density
// ---------------------------------------------------------------------------

/// How [`InteractionDensity`] summarizes an interval's block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DensityMetric {
    /// Mean normalized count over the interval's self-block.
    #[default]
    Mean,
    /// Mean of the self-contacts only.
    Diagonal,
    /// Block sum relative to the interval rows against the whole chromosome.
    PerColumn,
}

/// Density of normalized contacts within each interval.
///
/// Compact, B-like chromatin interacts more with itself, so densities
/// below the chromosome mean are A-like.
#[derive(Debug, Clone, Copy)]
pub struct InteractionDensity<'a> {
    matrix: &'a ContactMatrix,
    metric: DensityMetric,
}

impl<'a> InteractionDensity<'a> {
    pub fn new(matrix: &'a ContactMatrix, metric: DensityMetric) -> Self {
        Self { matrix, metric }
    }

    /// Observed over expected, bias-corrected; missing state is skipped.
    fn normalized(&self, chromosome: &str, i: usize, j: usize) -> f64 {
        let mut v = self.matrix.value(i, j);
        if let Some(b) = self.matrix.bias() {
            v /= b[i] * b[j];
        }
        match self.matrix.expected().and_then(|e| e.at(chromosome, i.abs_diff(j))) {
            Some(e) if e > 0.0 && e.is_finite() => v / e,
            _ => v,
        }
    }
}

impl DensitySource for InteractionDensity<'_> {
    fn density(&self, section: &Section, start: usize, end: usize, bads: &BTreeSet<usize>) -> f64 {
        let rows: Vec<usize> = (section.start + start..=section.start + end)
            .filter(|b| !bads.contains(b))
            .collect();
        if rows.is_empty() {
            return 1.0;
        }
        let value = match self.metric {
            DensityMetric::Mean => {
                let sum: f64 = rows
                    .iter()
                    .flat_map(|&i| rows.iter().map(move |&j| (i, j)))
                    .map(|(i, j)| self.normalized(&section.name, i, j))
                    .sum();
                sum / (rows.len() * rows.len()) as f64
            }
            DensityMetric::Diagonal => {
                rows.iter().map(|&i| self.normalized(&section.name, i, i)).sum::<f64>() / rows.len() as f64
            }
            DensityMetric::PerColumn => {
                let cols: Vec<usize> = section.range().filter(|b| !bads.contains(b)).collect();
                let mut block = 0.0;
                let mut whole = 0.0;
                for &i in &rows {
                    for &j in &cols {
                        let v = self.normalized(&section.name, i, j);
                        whole += v;
                        if rows.binary_search(&j).is_ok() {
                            block += v;
                        }
                    }
                }
                if whole == 0.0 {
                    return 1.0;
                }
                block / whole
            }
        };
        if value.is_finite() {
            value
        } else {
            1.0
        }
    }

    fn is_a_like(&self, density: f64) -> bool {
        density < 1.0
    }
}

/// Measure every non-masked interval of `section` and normalize the result.
pub fn measure_densities(
    intervals: &mut [CompartmentInterval],
    source: &dyn DensitySource,
    section: &Section,
    bads: &BTreeSet<usize>,
) {
    for c in intervals.iter_mut().filter(|c| !c.kind.is_masked()) {
        c.density = source.density(section, c.start, c.end, bads);
    }
    normalize_densities(intervals);
}

/// Scale densities so that non-masked intervals average 1.0.
///
/// Masked intervals get 1.0; a zero or undefined mean leaves every density
/// at 1.0.
pub fn normalize_densities(intervals: &mut [CompartmentInterval]) {
    let (sum, count) = intervals
        .iter()
        .filter(|c| !c.kind.is_masked())
        .fold((0.0, 0usize), |(s, n), c| (s + c.density, n + 1));
    let mean = if count == 0 { 0.0 } else { sum / count as f64 };
    for c in intervals.iter_mut() {
        if c.kind.is_masked() || mean == 0.0 || !mean.is_finite() {
            c.density = 1.0;
        } else {
            c.density /= mean;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compartment::CompartmentType;

    fn chr1(len: usize) -> Section {
        Section {
            name: "chr1".into(),
            start: 0,
            end: len,
        }
    }

    #[test]
    fn bedgraph_values_land_in_overlapped_bins() {
        let data = "track type=bedGraph\n# comment\nchr1\t0\t250\t2.0\nchr1\t150\t200\t1.0\nchr2\t0\t100\t4\n";
        let t = ReferenceTrack::from_bedgraph_str(data, 100).unwrap();
        assert_eq!(t.value("chr1", 0), Some(2.0));
        assert_eq!(t.value("chr1", 1), Some(3.0));
        assert_eq!(t.value("chr1", 2), Some(2.0));
        assert_eq!(t.value("chr1", 3), None);
        assert_eq!(t.value("chr2", 0), Some(4.0));
        assert_eq!(t.value("chr2", 1), None);
        assert!(t.has_chromosome("chr2"));
    }

    #[test]
    fn bed_counts_features() {
        let data = "chr1\t10\t20\tgeneA\nchr1\t50\t90\tgeneB\t0\t+\nchr1\t120\t130\n";
        let t = ReferenceTrack::from_bed_str(data, 100).unwrap();
        assert_eq!(t.value("chr1", 0), Some(2.0));
        assert_eq!(t.value("chr1", 1), Some(1.0));
    }

    #[test]
    fn files_are_read_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let bg = dir.path().join("gc.bedgraph");
        std::fs::write(&bg, "track type=bedGraph\nchr2\t0\t200\t0.4\n").unwrap();
        let t = ReferenceTrack::from_path(&bg, 100).unwrap();
        assert_eq!(t.value("chr2", 1), Some(0.4));

        let bed = dir.path().join("genes.bed");
        std::fs::write(&bed, "chr2\t0\t50\tg1\n").unwrap();
        let t = ReferenceTrack::from_path(&bed, 100).unwrap();
        assert_eq!(t.value("chr2", 0), Some(1.0));

        assert!(matches!(
            ReferenceTrack::from_path(dir.path().join("missing.bg"), 100),
            Err(HicompError::Io(_))
        ));
    }

    #[test]
    fn malformed_tracks_are_rejected() {
        assert!(matches!(
            ReferenceTrack::from_bedgraph_str("chr1\t0\t10\n", 10),
            Err(HicompError::Parse(_))
        ));
        let err = ReferenceTrack::from_bedgraph_str("chr1\t0\t10\t1\nchr1\tx\t10\t1\n", 10).unwrap_err();
        assert!(err.to_string().contains("line 2"));
        assert!(ReferenceTrack::from_bed_str("chr1\t20\t10\n", 10).is_err());
        assert!(ReferenceTrack::from_bed_str("chr1\t0\t10\n", 0).is_err());
    }

    #[test]
    fn reference_density_skips_bad_bins() {
        let t = ReferenceTrack::from_bedgraph_str("chr1\t0\t100\t3\nchr1\t100\t200\t1\n", 100).unwrap();
        let section = chr1(4);
        let none = BTreeSet::new();
        // bins 2 and 3 carry no signal and count as zero
        assert_eq!(t.density(&section, 0, 3, &none), 1.0);
        let bads: BTreeSet<usize> = [1, 2, 3].into_iter().collect();
        assert_eq!(t.density(&section, 0, 3, &bads), 3.0);
        assert_eq!(t.density(&section, 2, 3, &bads), 1.0);
        assert!(t.is_a_like(1.0));
        assert!(!t.is_a_like(0.99));
    }

    #[test]
    fn interaction_metrics() {
        let rows = vec![
            vec![4.0, 2.0, 0.0, 0.0],
            vec![2.0, 4.0, 0.0, 0.0],
            vec![0.0, 0.0, 1.0, 1.0],
            vec![0.0, 0.0, 1.0, 1.0],
        ];
        let m = ContactMatrix::from_dense(&rows, 1).unwrap();
        let section = chr1(4);
        let none = BTreeSet::new();

        let mean = InteractionDensity::new(&m, DensityMetric::Mean);
        assert_eq!(mean.density(&section, 0, 1, &none), 3.0);
        assert_eq!(mean.density(&section, 2, 3, &none), 1.0);
        assert!(mean.is_a_like(0.5));

        let diag = InteractionDensity::new(&m, DensityMetric::Diagonal);
        assert_eq!(diag.density(&section, 0, 1, &none), 4.0);

        let per_col = InteractionDensity::new(&m, DensityMetric::PerColumn);
        assert_eq!(per_col.density(&section, 0, 1, &none), 1.0);
        assert_eq!(per_col.density(&section, 0, 0, &none), 4.0 / 6.0);

        let all: BTreeSet<usize> = (0..4).collect();
        assert_eq!(mean.density(&section, 0, 3, &all), 1.0);
    }

    #[test]
    fn densities_normalize_to_unit_mean() {
        let mut cs = vec![
            CompartmentInterval::new(0, 3, CompartmentType::A),
            CompartmentInterval::new(4, 5, CompartmentType::Masked),
            CompartmentInterval::new(6, 9, CompartmentType::B),
        ];
        cs[0].density = 3.0;
        cs[1].density = 100.0;
        cs[2].density = 1.0;
        normalize_densities(&mut cs);
        assert_eq!(cs[0].density, 1.5);
        assert_eq!(cs[1].density, 1.0);
        assert_eq!(cs[2].density, 0.5);

        let mut zeros = vec![CompartmentInterval::new(0, 1, CompartmentType::A)];
        zeros[0].density = 0.0;
        normalize_densities(&mut zeros);
        assert_eq!(zeros[0].density, 1.0);
    }
}
