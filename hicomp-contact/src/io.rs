//! Text writers for compartments, eigenvectors and contact matrices.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use hicomp_core::{HicompError, Result};

use crate::compartment::EigenTrack;
use crate::focus::Focus;
use crate::matrix::ContactMatrix;

/// Compartment table of `matrix`.
///
/// Chromosomes are written in section order, or in the given order when
/// `chromosomes` is set. With `tracks`, a `## CHR <name>\tEigenvector: <n>`
/// line records the eigenvector behind each chromosome. Coordinates are
/// 1-based bins; masked intervals have no density.
pub fn compartments_to_string(
    matrix: &ContactMatrix,
    chromosomes: Option<&[&str]>,
    tracks: Option<&[EigenTrack]>,
) -> String {
    let names: Vec<&str> = match chromosomes {
        Some(names) => names.to_vec(),
        None => matrix
            .sections()
            .iter()
            .map(|s| s.name.as_str())
            .filter(|name| matrix.compartments_for(name).is_some())
            .collect(),
    };

    let mut out = String::new();
    if let Some(tracks) = tracks {
        let selected: HashMap<&str, usize> = tracks
            .iter()
            .map(|t| (t.chromosome.as_str(), t.selected))
            .collect();
        for name in &names {
            if let Some(ev) = selected.get(name) {
                out.push_str(&format!("## CHR {}\tEigenvector: {}\n", name, ev));
            }
        }
    }
    out.push_str(&format!(
        "#{}start\tend\trich in A\ttype\n",
        if names.len() > 1 { "CHR\t" } else { "\t" }
    ));
    for name in &names {
        for c in matrix.compartments_for(name).unwrap_or_default() {
            let density = if c.kind.is_masked() {
                "nan".to_string()
            } else {
                format!("{:.2}", c.density)
            };
            out.push_str(&format!(
                "{}\t{}\t{}\t{}\t{}\n",
                name,
                c.start + 1,
                c.end + 1,
                density,
                c.kind.letter()
            ));
        }
    }
    out
}

/// Write [`compartments_to_string`] to `path`.
pub fn write_compartments(
    path: impl AsRef<Path>,
    matrix: &ContactMatrix,
    chromosomes: Option<&[&str]>,
    tracks: Option<&[EigenTrack]>,
) -> Result<()> {
    fs::write(path, compartments_to_string(matrix, chromosomes, tracks))?;
    Ok(())
}

/// Eigenvectors of one chromosome as columns, headed by their eigenvalues.
pub fn eigenvectors_to_string(track: &EigenTrack) -> String {
    let header: Vec<String> = track
        .eigenvalues
        .iter()
        .enumerate()
        .map(|(k, v)| format!("EV_{} ({:.4})", k + 1, v))
        .collect();
    let mut out = format!("# {}\n", header.join("\t"));
    let len = track.eigenvectors.first().map_or(0, |v| v.len());
    for bin in 0..len {
        let row: Vec<String> = track.eigenvectors.iter().map(|v| v[bin].to_string()).collect();
        out.push_str(&row.join("\t"));
        out.push('\n');
    }
    out
}

/// `chrom`, 0-based start and end in bp of a global bin.
fn bin_coordinates(matrix: &ContactMatrix, bin: usize) -> Option<(&str, u64, u64)> {
    let section = matrix.sections().chromosome_of(bin)?;
    let res = matrix.resolution() as u64;
    let local = (bin - section.start) as u64;
    Some((section.name.as_str(), local * res, (local + 1) * res))
}

/// Dense matrix as tab-separated text.
///
/// The first line lists bad rows relative to the window (`# MASKED 0,3`).
/// Matrices with chromosomes prefix each row with `chrom\tstart-end`.
pub fn matrix_to_string(
    matrix: &ContactMatrix,
    focus: Option<&Focus>,
    diagonal: bool,
    normalized: bool,
) -> Result<String> {
    let (rows, _) = matrix.focus_bins(focus)?;
    let masked: Vec<String> = matrix
        .bads()
        .range(rows.clone())
        .map(|&k| (k - rows.start).to_string())
        .collect();
    let mut out = format!("# MASKED {}\n", masked.join(","));
    let named = matrix.has_chromosomes();
    for (i, line) in rows.zip(matrix.yield_matrix(focus, diagonal, normalized)?) {
        if named {
            if let Some((chrom, start, end)) = bin_coordinates(matrix, i) {
                out.push_str(&format!("{}\t{}-{}\t", chrom, start + 1, end));
            }
        }
        let values: Vec<String> = line.iter().map(|v| v.to_string()).collect();
        out.push_str(&values.join("\t"));
        out.push('\n');
    }
    Ok(out)
}

/// Layout of [`coord_table_to_string`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CoordFormat {
    /// `chr1\t100\t200\tchr2:300-400,5\t1\t.`
    #[default]
    Bed,
    /// `chr1:100-200\tchr2:300-400\t5`
    LongRange,
}

impl FromStr for CoordFormat {
    type Err = HicompError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "BED" => Ok(CoordFormat::Bed),
            "long-range" => Ok(CoordFormat::LongRange),
            _ => Err(HicompError::Configuration(format!("format \"{}\" not found", s))),
        }
    }
}

impl fmt::Display for CoordFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordFormat::Bed => f.write_str("BED"),
            CoordFormat::LongRange => f.write_str("long-range"),
        }
    }
}

/// Non-zero contacts of a window as a pairwise coordinate table.
///
/// Each pair of bins is written once. Raw counts are printed as integers,
/// normalized ones with six decimals.
pub fn coord_table_to_string(
    matrix: &ContactMatrix,
    focus: Option<&Focus>,
    diagonal: bool,
    normalized: bool,
    format: CoordFormat,
) -> Result<String> {
    if !matrix.has_chromosomes() {
        return Err(HicompError::InvalidInput(
            "coordinate tables need named chromosomes".into(),
        ));
    }
    let (rows, cols) = matrix.focus_bins(focus)?;
    let square = rows.start == cols.start;
    let value = |v: f64| {
        if normalized {
            format!("{:.6}", v)
        } else {
            format!("{:.0}", v.trunc())
        }
    };

    let mut out = String::new();
    let mut count = 1;
    for (i, line) in rows.zip(matrix.yield_matrix(focus, diagonal, normalized)?) {
        let Some((ci, si, ei)) = bin_coordinates(matrix, i) else {
            continue;
        };
        for (j, &v) in cols.clone().zip(&line) {
            if v == 0.0 || (square && (j < i || (!diagonal && j == i))) {
                continue;
            }
            let Some((cj, sj, ej)) = bin_coordinates(matrix, j) else {
                continue;
            };
            match format {
                CoordFormat::Bed => {
                    out.push_str(&format!(
                        "{}\t{}\t{}\t{}:{}-{},{}\t{}\t.\n",
                        ci,
                        si,
                        ei,
                        cj,
                        sj,
                        ej,
                        value(v),
                        count
                    ));
                    count += 1;
                }
                CoordFormat::LongRange => {
                    out.push_str(&format!(
                        "{}:{}-{}\t{}:{}-{}\t{}\n",
                        ci,
                        si,
                        ei,
                        cj,
                        sj,
                        ej,
                        value(v)
                    ));
                }
            }
        }
    }
    Ok(out)
}
