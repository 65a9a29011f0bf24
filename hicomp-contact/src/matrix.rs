//! Sparse symmetric Hi-C contact matrix.
//!
//! [`ContactMatrix`] stores only populated cells, keyed by the linear index
//! `row * size + col`. Symmetry is repaired once at construction. The
//! matrix also carries the normalization state (bad bins, per-bin bias,
//! expected counts by distance) and the compartments produced by the
//! latest labeling run.

use std::collections::{BTreeSet, HashMap};
use std::ops::Range;

use hicomp_core::{HicompError, Result, Summarizable};

use crate::compartment::CompartmentInterval;
use crate::diagnostics::Diagnostic;
use crate::focus::Focus;
use crate::normalization::NormalizationPort;
use crate::sections::Sections;

/// Number of off-diagonal cells inspected when checking symmetry.
const SYMMETRY_SAMPLE: usize = 10;

fn is_close(a: f64, b: f64) -> bool {
    (a - b).abs() <= (1e-9 * a.abs().max(b.abs())).max(1e-12)
}

// ---------------------------------------------------------------------------
// Expected counts
// ---------------------------------------------------------------------------

/// Expected contact count as a function of bin distance.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Expected {
    /// One decay curve for the whole genome.
    Genome(Vec<f64>),
    /// One decay curve per chromosome.
    PerChromosome(HashMap<String, Vec<f64>>),
}

impl Expected {
    /// Decay curve that applies to `chromosome`.
    pub fn for_chromosome(&self, chromosome: &str) -> Option<&[f64]> {
        match self {
            Expected::Genome(v) => Some(v),
            Expected::PerChromosome(m) => m.get(chromosome).map(|v| v.as_slice()),
        }
    }

    /// Expected count at `distance` bins; distances past the end of the
    /// curve reuse its last value.
    pub fn at(&self, chromosome: &str, distance: usize) -> Option<f64> {
        let curve = self.for_chromosome(chromosome)?;
        curve.get(distance).or_else(|| curve.last()).copied()
    }
}

// ---------------------------------------------------------------------------
// Options and views
// ---------------------------------------------------------------------------

/// How symmetry was established at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymmetryRepair {
    /// Sampled cells already agreed with their mirror.
    Symmetric,
    /// The populated direction was mirrored into the empty one.
    Copied,
    /// Both directions held counts; they were added together.
    Summed,
}

/// Options of [`ContactMatrix::cis_trans_ratio`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CisTransOptions {
    /// Divide every count by `bias[i] * bias[j]`.
    pub normalized: bool,
    /// Chromosomes left out of both numerator and denominator.
    pub exclude: Vec<String>,
    /// Count self-contacts in the numerator.
    pub diagonal: bool,
}

impl Default for CisTransOptions {
    fn default() -> Self {
        Self {
            normalized: false,
            exclude: Vec::new(),
            diagonal: true,
        }
    }
}

/// Dense window of a [`ContactMatrix`].
#[derive(Debug, Clone, PartialEq)]
pub struct DenseView {
    pub rows: Vec<Vec<f64>>,
    /// `true` where the row or column bin is bad.
    pub mask: Option<Vec<Vec<bool>>>,
    /// Global bins of the rows.
    pub row_bins: Range<usize>,
    /// Global bins of the columns.
    pub col_bins: Range<usize>,
}

impl DenseView {
    /// `(rows, columns)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.row_bins.len(), self.col_bins.len())
    }

    pub fn is_masked(&self, row: usize, col: usize) -> bool {
        self.mask.as_ref().is_some_and(|m| m[row][col])
    }
}

// ---------------------------------------------------------------------------
// ContactMatrix
// ---------------------------------------------------------------------------

/// Genome-wide contact counts between bins.
#[derive(Debug, Clone)]
pub struct ContactMatrix {
    cells: HashMap<usize, f64>,
    size: usize,
    resolution: usize,
    sections: Sections,
    bads: BTreeSet<usize>,
    bias: Option<Vec<f64>>,
    expected: Option<Expected>,
    compartments: HashMap<String, Vec<CompartmentInterval>>,
    repair: SymmetryRepair,
}

impl ContactMatrix {
    /// Empty `size × size` matrix with `resolution` base pairs per bin.
    pub fn new(size: usize, resolution: usize) -> Result<Self> {
        if resolution == 0 {
            return Err(HicompError::InvalidInput("resolution must be positive".into()));
        }
        Ok(Self {
            cells: HashMap::new(),
            size,
            resolution,
            sections: Sections::anonymous(size),
            bads: BTreeSet::new(),
            bias: None,
            expected: None,
            compartments: HashMap::new(),
            repair: SymmetryRepair::Symmetric,
        })
    }

    /// Build from `(row, col, count)` triples; later triples overwrite
    /// earlier ones at the same cell. Symmetry is repaired afterwards.
    pub fn from_triplets<I>(triplets: I, size: usize, resolution: usize) -> Result<Self>
    where
        I: IntoIterator<Item = (usize, usize, f64)>,
    {
        let mut m = Self::new(size, resolution)?;
        for (row, col, value) in triplets {
            m.set(row, col, value)?;
        }
        m.repair = m.symmetricize();
        Ok(m)
    }

    /// Build from a pre-populated linear-index mapping.
    pub fn from_cells(cells: HashMap<usize, f64>, size: usize, resolution: usize) -> Result<Self> {
        let mut m = Self::new(size, resolution)?;
        for (k, v) in cells {
            if size == 0 || k >= size * size {
                return Err(HicompError::OutOfRange {
                    row: if size == 0 { k } else { k / size },
                    col: if size == 0 { 0 } else { k % size },
                    size,
                });
            }
            if v != 0.0 {
                m.cells.insert(k, v);
            }
        }
        m.repair = m.symmetricize();
        Ok(m)
    }

    /// Build from dense square rows.
    pub fn from_dense(rows: &[Vec<f64>], resolution: usize) -> Result<Self> {
        let size = rows.len();
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != size) {
            return Err(HicompError::InvalidInput(format!(
                "row {} has {} values, expected {}",
                i,
                row.len(),
                size
            )));
        }
        let triplets = rows
            .iter()
            .enumerate()
            .flat_map(|(i, row)| row.iter().enumerate().map(move |(j, &v)| (i, j, v)));
        Self::from_triplets(triplets, size, resolution)
    }

    /// Detect and repair asymmetry.
    ///
    /// Detection is sample-based: only the first [`SYMMETRY_SAMPLE`]
    /// off-diagonal cells in linear-index order are compared with their
    /// mirrors. When those agree the rest of the matrix is not checked and
    /// is left as stored.
    fn symmetricize(&mut self) -> SymmetryRepair {
        let n = self.size;
        let mut keys: Vec<usize> = self.cells.keys().copied().collect();
        keys.sort_unstable();

        let mut mode = SymmetryRepair::Symmetric;
        let mut checked = 0;
        for &k in &keys {
            let (i, j) = (k / n, k % n);
            if i == j {
                continue;
            }
            let (a, b) = (self.value(i, j), self.value(j, i));
            if !is_close(a, b) {
                mode = if a != 0.0 && b != 0.0 {
                    SymmetryRepair::Summed
                } else {
                    SymmetryRepair::Copied
                };
                break;
            }
            checked += 1;
            if checked >= SYMMETRY_SAMPLE {
                break;
            }
        }
        if mode == SymmetryRepair::Symmetric {
            return mode;
        }

        let old = std::mem::take(&mut self.cells);
        let get = |i: usize, j: usize| old.get(&(i * n + j)).copied().unwrap_or(0.0);
        for &k in &keys {
            let (i, j) = (k / n, k % n);
            if i == j {
                self.cells.insert(k, get(i, j));
                continue;
            }
            let (lo, hi) = (i.min(j), i.max(j));
            let value = match mode {
                SymmetryRepair::Summed => get(lo, hi) + get(hi, lo),
                _ => {
                    let upper = get(lo, hi);
                    if upper != 0.0 {
                        upper
                    } else {
                        get(hi, lo)
                    }
                }
            };
            if value != 0.0 {
                self.cells.insert(lo * n + hi, value);
                self.cells.insert(hi * n + lo, value);
            }
        }
        log::debug!("contact matrix symmetricized ({:?})", mode);
        mode
    }

    // -- accessors ----------------------------------------------------------

    /// Number of bins.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Base pairs per bin.
    pub fn resolution(&self) -> usize {
        self.resolution
    }

    pub fn sections(&self) -> &Sections {
        &self.sections
    }

    pub fn has_chromosomes(&self) -> bool {
        self.sections.has_chromosomes()
    }

    /// Symmetry repair applied at construction.
    pub fn symmetry_repair(&self) -> SymmetryRepair {
        self.repair
    }

    pub fn bads(&self) -> &BTreeSet<usize> {
        &self.bads
    }

    pub fn is_bad(&self, bin: usize) -> bool {
        self.bads.contains(&bin)
    }

    pub fn bias(&self) -> Option<&[f64]> {
        self.bias.as_deref()
    }

    pub fn expected(&self) -> Option<&Expected> {
        self.expected.as_ref()
    }

    /// Compartments of the latest labeling run, by chromosome.
    pub fn compartments(&self) -> &HashMap<String, Vec<CompartmentInterval>> {
        &self.compartments
    }

    pub fn compartments_for(&self, chromosome: &str) -> Option<&[CompartmentInterval]> {
        self.compartments.get(chromosome).map(|v| v.as_slice())
    }

    pub(crate) fn replace_compartments(
        &mut self,
        compartments: HashMap<String, Vec<CompartmentInterval>>,
    ) {
        self.compartments = compartments;
    }

    // -- cells --------------------------------------------------------------

    fn check(&self, row: usize, col: usize) -> Result<()> {
        if row >= self.size || col >= self.size {
            return Err(HicompError::OutOfRange {
                row,
                col,
                size: self.size,
            });
        }
        Ok(())
    }

    /// Count at `(row, col)`; unpopulated cells read 0.
    pub fn get(&self, row: usize, col: usize) -> Result<f64> {
        self.check(row, col)?;
        Ok(self.value(row, col))
    }

    /// Store a count; writing 0 removes the cell.
    ///
    /// Only this single cell is written. Keeping the matrix symmetric is
    /// up to the caller.
    pub fn set(&mut self, row: usize, col: usize, value: f64) -> Result<()> {
        self.check(row, col)?;
        let k = row * self.size + col;
        if value == 0.0 {
            self.cells.remove(&k);
        } else {
            self.cells.insert(k, value);
        }
        Ok(())
    }

    /// Unchecked read for in-bounds indices.
    pub(crate) fn value(&self, row: usize, col: usize) -> f64 {
        self.cells.get(&(row * self.size + col)).copied().unwrap_or(0.0)
    }

    fn cell(&self, row: usize, col: usize, bias: Option<&[f64]>) -> f64 {
        let v = self.value(row, col);
        match bias {
            Some(b) => v / b[row] / b[col],
            None => v,
        }
    }

    /// Cell of a dense window. Without the diagonal, a self-contact reads
    /// 0 when normalized and 1 or 0 (present or not) when raw.
    fn window_cell(&self, row: usize, col: usize, diagonal: bool, bias: Option<&[f64]>) -> f64 {
        if diagonal || row != col {
            return self.cell(row, col, bias);
        }
        match bias {
            Some(_) => 0.0,
            None if self.value(row, col) != 0.0 => 1.0,
            None => 0.0,
        }
    }

    /// Number of populated cells.
    pub fn nnz(&self) -> usize {
        self.cells.len()
    }

    /// Populated cells as `(row, col, count)`, in no particular order.
    pub fn triplets(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        let n = self.size;
        self.cells.iter().map(move |(&k, &v)| (k / n, k % n, v))
    }

    /// Compressed sparse row export: `(data, indices, indptr)`.
    ///
    /// `indptr[i]..indptr[i+1]` spans the entries of row `i`, sorted by column.
    pub fn to_csr(&self) -> (Vec<f64>, Vec<usize>, Vec<usize>) {
        let mut keys: Vec<usize> = self.cells.keys().copied().collect();
        keys.sort_unstable();

        let mut data = Vec::with_capacity(keys.len());
        let mut indices = Vec::with_capacity(keys.len());
        let mut indptr = vec![0usize; self.size + 1];
        for k in keys {
            data.push(self.cells[&k]);
            indices.push(k % self.size);
            indptr[k / self.size + 1] += 1;
        }
        for i in 1..=self.size {
            indptr[i] += indptr[i - 1];
        }
        (data, indices, indptr)
    }

    // -- normalization state ------------------------------------------------

    /// Replace the set of bad bins.
    pub fn set_bads(&mut self, bads: BTreeSet<usize>) -> Result<()> {
        if let Some(&b) = bads.iter().find(|&&b| b >= self.size) {
            return Err(HicompError::OutOfRange {
                row: b,
                col: b,
                size: self.size,
            });
        }
        self.bads = bads;
        Ok(())
    }

    /// Replace the per-bin bias; one finite, positive factor per bin.
    pub fn set_bias(&mut self, bias: Vec<f64>) -> Result<()> {
        if bias.len() != self.size {
            return Err(HicompError::InvalidInput(format!(
                "bias has {} values for {} bins",
                bias.len(),
                self.size
            )));
        }
        if let Some(i) = bias.iter().position(|b| !b.is_finite() || *b <= 0.0) {
            return Err(HicompError::InvalidInput(format!(
                "bias of bin {} is {}",
                i, bias[i]
            )));
        }
        self.bias = Some(bias);
        Ok(())
    }

    pub fn set_expected(&mut self, expected: Expected) {
        self.expected = Some(expected);
    }

    /// Detect bad bins with `port` and store them.
    ///
    /// Returns the number of bad bins.
    pub fn filter_columns<P: NormalizationPort + ?Sized>(
        &mut self,
        port: &P,
        perc_zero: f64,
        min_count: Option<f64>,
        by_mean: bool,
    ) -> Result<usize> {
        let mut bads = port.filter(self, perc_zero, min_count)?;
        if by_mean {
            let extra = port.filter_by_mean(self, &bads)?;
            bads.extend(extra);
        }
        log::info!(
            "found {} of {} columns with poor signal",
            bads.len(),
            self.size
        );
        self.set_bads(bads)?;
        Ok(self.bads.len())
    }

    /// Estimate and store the bias.
    ///
    /// With `sqrt` the square root of every factor is kept. With a `factor`
    /// the biases are rescaled so that the mean normalized count per cell
    /// equals `factor`.
    pub fn normalize_hic<P: NormalizationPort + ?Sized>(
        &mut self,
        port: &P,
        iterations: usize,
        max_dev: f64,
        sqrt: bool,
        factor: Option<f64>,
    ) -> Result<()> {
        let mut bias = port.estimate_bias(self, &self.bads, iterations, max_dev)?;
        if sqrt {
            bias.iter_mut().for_each(|b| *b = b.sqrt());
        }
        if let Some(factor) = factor {
            if factor.is_nan() || factor <= 0.0 {
                return Err(HicompError::InvalidInput(format!(
                    "rescaling factor must be positive, got {}",
                    factor
                )));
            }
            let norm_sum = self.sum(Some(&bias), None);
            let target = (norm_sum / (self.size as f64 * self.size as f64 * factor)).sqrt();
            log::debug!("rescaling biases to factor {} (sum {:.3})", factor, norm_sum);
            if target.is_finite() && target > 0.0 {
                bias.iter_mut().for_each(|b| *b *= target);
            }
        }
        self.set_bias(bias)
    }

    /// Estimate and store expected counts by distance.
    pub fn normalize_expected<P: NormalizationPort + ?Sized>(
        &mut self,
        port: &P,
        signal_to_noise: f64,
        per_chromosome: bool,
    ) -> Result<()> {
        let expected = port.estimate_expected(self, &self.bads, signal_to_noise, per_chromosome)?;
        self.expected = Some(expected);
        Ok(())
    }

    // -- statistics ---------------------------------------------------------

    /// Total count over cells whose row and column are both good.
    ///
    /// With `bias` every count is divided by `bias[i] * bias[j]`. Without
    /// `bads` the matrix's own bad bins are skipped.
    pub fn sum(&self, bias: Option<&[f64]>, bads: Option<&BTreeSet<usize>>) -> f64 {
        let bads = bads.unwrap_or(&self.bads);
        let n = self.size;
        self.cells
            .iter()
            .filter_map(|(&k, &v)| {
                let (i, j) = (k / n, k % n);
                if bads.contains(&i) || bads.contains(&j) {
                    return None;
                }
                Some(match bias {
                    Some(b) => v / (b[i] * b[j]),
                    None => v,
                })
            })
            .sum()
    }

    /// Fraction of the signal falling within chromosomes.
    ///
    /// NaN when the matrix has no chromosome information; 0.0 when nothing
    /// is left to count.
    pub fn cis_trans_ratio(&self, options: &CisTransOptions) -> Result<f64> {
        self.cis_trans_ratio_with(options, |a, b| a == b)
    }

    /// [`cis_trans_ratio`](Self::cis_trans_ratio) treating consecutive
    /// chromosomes for which `equals` holds as one, e.g. the two arms of a
    /// chromosome.
    pub fn cis_trans_ratio_with<F>(&self, options: &CisTransOptions, equals: F) -> Result<f64>
    where
        F: Fn(&str, &str) -> bool,
    {
        let bias = self.checked_bias(options.normalized)?;
        if !self.sections.has_chromosomes() {
            return Ok(f64::NAN);
        }

        let mut group = Vec::with_capacity(self.sections.len());
        let mut current = 0usize;
        let mut previous: Option<&str> = None;
        for section in self.sections.iter() {
            if let Some(prev) = previous {
                if !equals(&section.name, prev) {
                    current += 1;
                }
            }
            group.push(current);
            previous = Some(&section.name);
        }

        let mut bads = self.bads.clone();
        for name in &options.exclude {
            let section = self.sections.get(name).ok_or_else(|| {
                HicompError::InvalidInput(format!("cannot exclude unknown chromosome '{}'", name))
            })?;
            bads.extend(section.range());
        }

        let n = self.size;
        let mut intra = 0.0;
        for (&k, &v) in &self.cells {
            let (i, j) = (k / n, k % n);
            if bads.contains(&i) || bads.contains(&j) || (!options.diagonal && i == j) {
                continue;
            }
            let (Some(gi), Some(gj)) = (self.sections.index_of(i), self.sections.index_of(j))
            else {
                continue;
            };
            if group[gi] == group[gj] {
                intra += match bias {
                    Some(b) => v / b[i] / b[j],
                    None => v,
                };
            }
        }

        let total = self.sum(bias, Some(&bads));
        if total == 0.0 {
            return Ok(0.0);
        }
        Ok(intra / total)
    }

    // -- sections -----------------------------------------------------------

    /// Set chromosomes from lengths in base pairs (`length / resolution + 1`
    /// bins each). Names default to `chr0`, `chr1`, ...
    ///
    /// Returns a [`Diagnostic::SectionSizeMismatch`] when the matrix grew.
    pub fn add_sections(&mut self, lengths: &[u64], names: Option<&[&str]>) -> Result<Option<Diagnostic>> {
        let res = self.resolution as u64;
        let bins: Vec<usize> = lengths.iter().map(|&l| (l / res) as usize + 1).collect();
        self.apply_sections(Sections::from_bins(&bins, names)?)
    }

    /// Set chromosomes from lengths already expressed in bins.
    pub fn add_binned_sections(&mut self, bins: &[usize], names: Option<&[&str]>) -> Result<Option<Diagnostic>> {
        self.apply_sections(Sections::from_bins(bins, names)?)
    }

    /// Set chromosomes from `(name, length_bp)` pairs of a reference genome.
    pub fn add_sections_from_reference(&mut self, chromosomes: &[(&str, u64)]) -> Result<Option<Diagnostic>> {
        let names: Vec<&str> = chromosomes.iter().map(|(n, _)| *n).collect();
        let lengths: Vec<u64> = chromosomes.iter().map(|(_, l)| *l).collect();
        self.add_sections(&lengths, Some(&names))
    }

    fn apply_sections(&mut self, sections: Sections) -> Result<Option<Diagnostic>> {
        let total = sections.total();
        if total < self.size {
            return Err(HicompError::Configuration(format!(
                "chromosome lengths give {} bins but the matrix already has {}",
                total, self.size
            )));
        }
        let diagnostic = (total != self.size).then(|| {
            let d = Diagnostic::SectionSizeMismatch {
                previous: self.size,
                current: total,
            }
            .emit();
            self.resize(total);
            d
        });
        self.sections = sections;
        Ok(diagnostic)
    }

    fn resize(&mut self, new_size: usize) {
        let old = self.size;
        self.cells = std::mem::take(&mut self.cells)
            .into_iter()
            .map(|(k, v)| ((k / old) * new_size + k % old, v))
            .collect();
        if let Some(bias) = self.bias.as_mut() {
            bias.resize(new_size, 1.0);
        }
        self.size = new_size;
    }

    // -- dense views --------------------------------------------------------

    fn checked_bias(&self, normalized: bool) -> Result<Option<&[f64]>> {
        if !normalized {
            return Ok(None);
        }
        self.bias
            .as_deref()
            .map(Some)
            .ok_or_else(|| HicompError::Configuration("experiment not normalized yet".into()))
    }

    fn focus_ranges(&self, focus: Option<&Focus>) -> Result<(Range<usize>, Range<usize>)> {
        match focus {
            Some(f) => f.resolve(&self.sections, self.resolution, self.size),
            None => Ok((0..self.size, 0..self.size)),
        }
    }

    /// Materialize a dense window.
    ///
    /// With `diagonal == false` and row and column windows starting at the
    /// same bin, self-contacts read 0 in normalized views and 1 (0 when
    /// empty) in raw ones. `masked` adds a mask of bad rows and columns.
    pub fn get_matrix(
        &self,
        focus: Option<&Focus>,
        diagonal: bool,
        normalized: bool,
        masked: bool,
    ) -> Result<DenseView> {
        let bias = self.checked_bias(normalized)?;
        let (row_bins, col_bins) = self.focus_ranges(focus)?;
        let square = row_bins.start == col_bins.start;
        let rows = row_bins
            .clone()
            .map(|i| {
                col_bins
                    .clone()
                    .map(|j| self.window_cell(i, j, diagonal || !square, bias))
                    .collect()
            })
            .collect();
        let mask = masked.then(|| {
            row_bins
                .clone()
                .map(|i| col_bins.clone().map(|j| self.is_bad(i) || self.is_bad(j)).collect())
                .collect()
        });
        Ok(DenseView {
            rows,
            mask,
            row_bins,
            col_bins,
        })
    }

    /// Stream a dense window row by row; bad rows come out as zeros.
    pub fn yield_matrix(
        &self,
        focus: Option<&Focus>,
        diagonal: bool,
        normalized: bool,
    ) -> Result<impl Iterator<Item = Vec<f64>> + '_> {
        let bias = self.checked_bias(normalized)?;
        let (row_bins, col_bins) = self.focus_ranges(focus)?;
        let square = row_bins.start == col_bins.start;
        Ok(row_bins.map(move |i| {
            if self.is_bad(i) {
                return vec![0.0; col_bins.len()];
            }
            col_bins
                .clone()
                .map(|j| self.window_cell(i, j, diagonal || !square, bias))
                .collect()
        }))
    }

    /// Resolve a focus to its `(rows, cols)` global bin ranges.
    pub fn focus_bins(&self, focus: Option<&Focus>) -> Result<(Range<usize>, Range<usize>)> {
        self.focus_ranges(focus)
    }
}

impl Summarizable for ContactMatrix {
    fn summary(&self) -> String {
        format!(
            "ContactMatrix: {} bins at {} bp, {} cells, {} bad, {} sections",
            self.size,
            self.resolution,
            self.cells.len(),
            self.bads.len(),
            self.sections.len()
        )
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn two_chromosomes() -> ContactMatrix {
        // chr1 = bins 0..3, chr2 = bins 3..6
        let mut t = Vec::new();
        for i in 0..6 {
            for j in 0..6 {
                let same = (i < 3) == (j < 3);
                t.push((i, j, if same { 4.0 } else { 1.0 }));
            }
        }
        let mut m = ContactMatrix::from_triplets(t, 6, 100).unwrap();
        m.add_binned_sections(&[3, 3], Some(&["chr1", "chr2"])).unwrap();
        m
    }

    #[test]
    fn get_set_and_bounds() {
        let mut m = ContactMatrix::new(4, 1000).unwrap();
        m.set(1, 2, 5.0).unwrap();
        assert_eq!(m.get(1, 2).unwrap(), 5.0);
        assert_eq!(m.get(2, 1).unwrap(), 0.0);
        assert_eq!(m.nnz(), 1);
        m.set(1, 2, 0.0).unwrap();
        assert_eq!(m.nnz(), 0);
        assert!(matches!(
            m.get(4, 0),
            Err(HicompError::OutOfRange { row: 4, col: 0, size: 4 })
        ));
        assert!(m.set(0, 9, 1.0).is_err());
        assert!(ContactMatrix::new(3, 0).is_err());
    }

    #[test]
    fn copy_repair_fills_empty_half() {
        let m = ContactMatrix::from_triplets(
            vec![(0, 1, 2.0), (0, 2, 3.0), (1, 2, 4.0), (1, 1, 7.0)],
            3,
            1,
        )
        .unwrap();
        assert_eq!(m.symmetry_repair(), SymmetryRepair::Copied);
        for (i, j) in [(0, 1), (0, 2), (1, 2)] {
            assert_eq!(m.get(i, j).unwrap(), m.get(j, i).unwrap());
        }
        assert_eq!(m.get(2, 1).unwrap(), 4.0);
        assert_eq!(m.get(1, 1).unwrap(), 7.0);
    }

    #[test]
    fn copy_repair_prefers_upper_triangle() {
        let m = ContactMatrix::from_triplets(
            vec![(0, 1, 2.0), (2, 0, 5.0), (1, 2, 1.0), (2, 1, 9.0)],
            3,
            1,
        )
        .unwrap();
        // first sampled cell (0,1) disagrees with an empty mirror: copy mode
        assert_eq!(m.symmetry_repair(), SymmetryRepair::Copied);
        assert_eq!(m.get(0, 2).unwrap(), 5.0);
        assert_eq!(m.get(2, 1).unwrap(), 1.0);
        assert_eq!(m.get(1, 2).unwrap(), 1.0);
    }

    #[test]
    fn sum_repair_adds_both_directions_once() {
        let m = ContactMatrix::from_triplets(
            vec![(0, 1, 2.0), (1, 0, 3.0), (0, 2, 1.0), (2, 2, 6.0)],
            3,
            1,
        )
        .unwrap();
        assert_eq!(m.symmetry_repair(), SymmetryRepair::Summed);
        assert_eq!(m.get(0, 1).unwrap(), 5.0);
        assert_eq!(m.get(1, 0).unwrap(), 5.0);
        assert_eq!(m.get(2, 0).unwrap(), 1.0);
        assert_eq!(m.get(2, 2).unwrap(), 6.0);
    }

    #[test]
    fn symmetric_input_untouched() {
        let m = ContactMatrix::from_dense(
            &[vec![1.0, 2.0], vec![2.0, 3.0]],
            10,
        )
        .unwrap();
        assert_eq!(m.symmetry_repair(), SymmetryRepair::Symmetric);
        assert_eq!(m.nnz(), 4);
        assert!(ContactMatrix::from_dense(&[vec![1.0], vec![2.0, 3.0]], 10).is_err());
    }

    #[test]
    fn asymmetry_past_the_sample_is_kept() {
        let mut t: Vec<(usize, usize, f64)> = (1..=10).flat_map(|j| [(0, j, 2.0), (j, 0, 2.0)]).collect();
        t.push((5, 7, 3.0));
        let m = ContactMatrix::from_triplets(t, 12, 100).unwrap();
        assert_eq!(m.symmetry_repair(), SymmetryRepair::Symmetric);
        assert_eq!(m.get(5, 7).unwrap(), 3.0);
        assert_eq!(m.get(7, 5).unwrap(), 0.0);
    }

    #[test]
    fn from_cells_validates_keys() {
        let mut cells = HashMap::new();
        cells.insert(1, 2.0);
        let m = ContactMatrix::from_cells(cells.clone(), 2, 1).unwrap();
        assert_eq!(m.get(1, 0).unwrap(), 2.0);
        cells.insert(4, 1.0);
        assert!(ContactMatrix::from_cells(cells, 2, 1).is_err());
    }

    #[test]
    fn sum_skips_bad_bins_and_applies_bias() {
        let mut m = two_chromosomes();
        assert_eq!(m.sum(None, None), 18.0 * 4.0 + 18.0);
        m.set_bads([0].into_iter().collect()).unwrap();
        // row/column 0 held 3 cis cells of 4 and 3 trans cells of 1 each way
        assert_eq!(m.sum(None, None), 72.0 + 18.0 - (2.0 * 12.0 - 4.0) - 6.0);
        let bias = vec![2.0; 6];
        let plain = m.sum(None, None);
        assert!((m.sum(Some(&bias), None) - plain / 4.0).abs() < 1e-12);
    }

    #[test]
    fn cis_trans_ratio_basic() {
        let m = two_chromosomes();
        let r = m.cis_trans_ratio(&CisTransOptions::default()).unwrap();
        assert!((r - 72.0 / 90.0).abs() < 1e-12);

        let no_diag = CisTransOptions {
            diagonal: false,
            ..Default::default()
        };
        let r = m.cis_trans_ratio(&no_diag).unwrap();
        assert!((r - (72.0 - 24.0) / 90.0).abs() < 1e-12);
    }

    #[test]
    fn cis_trans_ratio_merges_equal_chromosomes() {
        let m = two_chromosomes();
        let r = m
            .cis_trans_ratio_with(&CisTransOptions::default(), |_, _| true)
            .unwrap();
        assert!((r - 1.0).abs() < 1e-12);
    }

    #[test]
    fn cis_trans_ratio_trans_only_excluded_is_zero() {
        let mut t = Vec::new();
        for i in 0..3 {
            for j in 3..6 {
                t.push((i, j, 2.0));
            }
        }
        let mut m = ContactMatrix::from_triplets(t, 6, 1).unwrap();
        m.add_binned_sections(&[3, 3], Some(&["chr1", "chrX"])).unwrap();
        let opts = CisTransOptions {
            exclude: vec!["chrX".into()],
            ..Default::default()
        };
        assert_eq!(m.cis_trans_ratio(&opts).unwrap(), 0.0);
    }

    #[test]
    fn cis_trans_ratio_errors_and_nan() {
        let m = ContactMatrix::from_dense(&[vec![1.0, 1.0], vec![1.0, 1.0]], 1).unwrap();
        assert!(m.cis_trans_ratio(&CisTransOptions::default()).unwrap().is_nan());
        let normalized = CisTransOptions {
            normalized: true,
            ..Default::default()
        };
        assert!(matches!(
            m.cis_trans_ratio(&normalized),
            Err(HicompError::Configuration(_))
        ));
        let m = two_chromosomes();
        let opts = CisTransOptions {
            exclude: vec!["chrZ".into()],
            ..Default::default()
        };
        assert!(matches!(
            m.cis_trans_ratio(&opts),
            Err(HicompError::InvalidInput(_))
        ));
    }

    #[test]
    fn sections_partition_the_matrix() {
        let mut m = ContactMatrix::new(25, 100).unwrap();
        let d = m.add_sections(&[1000, 999, 399], None).unwrap();
        // 11 + 10 + 4 bins
        assert!(d.is_none());
        let mut next = 0;
        for s in m.sections().iter() {
            assert_eq!(s.start, next);
            next = s.end;
        }
        assert_eq!(next, m.size());
    }

    #[test]
    fn growing_sections_warns_and_rekeys() {
        let mut m = ContactMatrix::from_triplets(vec![(1, 2, 3.0)], 3, 100).unwrap();
        let d = m.add_sections_from_reference(&[("chrA", 250), ("chrB", 100)]).unwrap();
        assert_eq!(
            d,
            Some(Diagnostic::SectionSizeMismatch { previous: 3, current: 5 })
        );
        assert_eq!(m.size(), 5);
        assert_eq!(m.get(1, 2).unwrap(), 3.0);
        assert_eq!(m.get(2, 1).unwrap(), 3.0);
        assert_eq!(m.sections().get("chrB").unwrap().range(), 3..5);
    }

    #[test]
    fn shrinking_sections_is_rejected() {
        let mut m = ContactMatrix::new(10, 100).unwrap();
        assert!(matches!(
            m.add_binned_sections(&[3, 3], None),
            Err(HicompError::Configuration(_))
        ));
        assert_eq!(m.size(), 10);
    }

    #[test]
    fn dense_view_with_focus_mask_and_diagonal() {
        let mut m = two_chromosomes();
        m.set_bads([4].into_iter().collect()).unwrap();
        let focus: Focus = "chr2".parse().unwrap();
        let view = m.get_matrix(Some(&focus), false, false, true).unwrap();
        assert_eq!(view.shape(), (3, 3));
        assert_eq!(view.rows[0][0], 1.0);
        assert_eq!(view.rows[0][2], 4.0);
        assert!(view.is_masked(1, 0));
        assert!(view.is_masked(0, 1));
        assert!(!view.is_masked(0, 2));

        let trans: Focus = "chr1,chr2".parse().unwrap();
        let view = m.get_matrix(Some(&trans), false, false, false).unwrap();
        assert_eq!(view.rows[0][0], 1.0);
        assert!(view.mask.is_none());

        assert!(matches!(
            m.get_matrix(None, true, true, false),
            Err(HicompError::Configuration(_))
        ));
    }

    #[test]
    fn normalized_view_divides_by_bias() {
        let mut m = two_chromosomes();
        m.set_bias(vec![1.0, 2.0, 1.0, 1.0, 1.0, 1.0]).unwrap();
        let view = m.get_matrix(Some(&Focus::Bins { start: 1, end: 2 }), true, true, false).unwrap();
        assert_eq!(view.rows, vec![vec![4.0, 2.0], vec![2.0, 1.0]]);
        assert!(m.set_bias(vec![1.0; 5]).is_err());
        assert!(m.set_bias(vec![0.0; 6]).is_err());
    }

    #[test]
    fn hidden_diagonal_flags_raw_contacts() {
        let mut m = ContactMatrix::from_triplets(vec![(0, 0, 7.0), (0, 1, 2.0), (2, 2, 3.0)], 3, 100).unwrap();
        let raw = m.get_matrix(None, false, false, false).unwrap();
        assert_eq!(raw.rows, vec![vec![1.0, 2.0, 0.0], vec![2.0, 0.0, 0.0], vec![0.0, 0.0, 1.0]]);
        let streamed: Vec<Vec<f64>> = m.yield_matrix(None, false, false).unwrap().collect();
        assert_eq!(streamed, raw.rows);

        m.set_bias(vec![1.0, 2.0, 1.0]).unwrap();
        let norm = m.get_matrix(None, false, true, false).unwrap();
        assert_eq!(norm.rows, vec![vec![0.0, 1.0, 0.0], vec![1.0, 0.0, 0.0], vec![0.0, 0.0, 0.0]]);

        // windows starting at different bins keep their cells
        let off = m.get_matrix(Some(&Focus::BinPair { rows: (1, 2), cols: (2, 3) }), false, false, false);
        assert_eq!(off.unwrap().rows[0][0], 2.0);
    }

    #[test]
    fn yield_matrix_zeroes_bad_rows() {
        let mut m = two_chromosomes();
        m.set_bads([1].into_iter().collect()).unwrap();
        let rows: Vec<Vec<f64>> = m.yield_matrix(None, true, false).unwrap().collect();
        assert_eq!(rows.len(), 6);
        assert!(rows[1].iter().all(|&v| v == 0.0));
        assert_eq!(rows[0][1], 4.0);
        let dense = m.get_matrix(None, true, false, false).unwrap();
        assert_eq!(rows[2], dense.rows[2]);
    }

    #[test]
    fn csr_export() {
        let m = ContactMatrix::from_triplets(vec![(0, 1, 2.0), (2, 2, 1.0)], 3, 1).unwrap();
        let (data, indices, indptr) = m.to_csr();
        assert_eq!(data, vec![2.0, 2.0, 1.0]);
        assert_eq!(indices, vec![1, 0, 2]);
        assert_eq!(indptr, vec![0, 1, 2, 3]);
        let mut t: Vec<_> = m.triplets().collect();
        t.sort_by_key(|&(i, j, _)| (i, j));
        assert_eq!(t, vec![(0, 1, 2.0), (1, 0, 2.0), (2, 2, 1.0)]);
    }

    #[test]
    fn expected_lookup_reuses_last_value() {
        let e = Expected::Genome(vec![4.0, 2.0]);
        assert_eq!(e.at("any", 0), Some(4.0));
        assert_eq!(e.at("any", 7), Some(2.0));
        let mut per = HashMap::new();
        per.insert("chr1".to_string(), vec![1.0]);
        let e = Expected::PerChromosome(per);
        assert_eq!(e.at("chr1", 3), Some(1.0));
        assert_eq!(e.at("chr2", 0), None);
        assert_eq!(Expected::Genome(vec![]).at("x", 0), None);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn construction_yields_symmetric_matrix(
            cells in proptest::collection::vec((0usize..8, 0usize..8, 1u32..50), 0..40),
        ) {
            // one triangle only, so the first sampled cell already disagrees
            let triplets = cells.iter().map(|&(i, j, v)| (i.min(j), i.max(j), v as f64));
            let m = ContactMatrix::from_triplets(triplets, 8, 1).unwrap();
            for (i, j, v) in m.triplets() {
                prop_assert_eq!(m.get(j, i).unwrap(), v);
            }
        }
    }
}
