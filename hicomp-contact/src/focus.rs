//! Genomic windows for dense matrix views.
//!
//! A [`Focus`] selects the rows and columns of a dense view, either as
//! 1-based inclusive bin windows or as region strings such as `chr3` or
//! `chr3:10000-20000`.

use std::ops::Range;
use std::str::FromStr;

use hicomp_core::{HicompError, Result};

use crate::sections::Sections;

/// A chromosome, optionally restricted to a base-pair span.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Region {
    pub chromosome: String,
    /// `(begin, end)` in base pairs.
    pub span: Option<(u64, u64)>,
}

impl FromStr for Region {
    type Err = HicompError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let malformed = || {
            HicompError::Parse(format!(
                "region '{}' should be in format \"chr3:10000-20000\"",
                s
            ))
        };
        let Some((chromosome, coords)) = s.split_once(':') else {
            if s.is_empty() {
                return Err(malformed());
            }
            return Ok(Region {
                chromosome: s.to_string(),
                span: None,
            });
        };
        let (begin, end) = coords.split_once('-').ok_or_else(malformed)?;
        let begin: u64 = begin.trim().parse().map_err(|_| malformed())?;
        let end: u64 = end.trim().parse().map_err(|_| malformed())?;
        if chromosome.is_empty() || begin > end {
            return Err(malformed());
        }
        Ok(Region {
            chromosome: chromosome.to_string(),
            span: Some((begin, end)),
        })
    }
}

/// Window of a dense matrix view.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Focus {
    /// Same 1-based inclusive bin window for rows and columns.
    Bins { start: usize, end: usize },
    /// Separate 1-based inclusive windows for rows and columns.
    BinPair {
        rows: (usize, usize),
        cols: (usize, usize),
    },
    Region(Region),
    /// Rows from the first region, columns from the second.
    RegionPair(Region, Region),
}

impl FromStr for Focus {
    type Err = HicompError;

    /// `"chr3"`, `"chr3:10000-20000"` or two regions joined by a comma.
    fn from_str(s: &str) -> Result<Self> {
        match s.split_once(',') {
            Some((a, b)) => Ok(Focus::RegionPair(a.parse()?, b.parse()?)),
            None => Ok(Focus::Region(s.parse()?)),
        }
    }
}

impl Focus {
    /// Resolve to half-open global bin ranges `(rows, cols)`.
    pub(crate) fn resolve(
        &self,
        sections: &Sections,
        resolution: usize,
        size: usize,
    ) -> Result<(Range<usize>, Range<usize>)> {
        match self {
            Focus::Bins { start, end } => {
                let r = bin_window(*start, *end, size)?;
                Ok((r.clone(), r))
            }
            Focus::BinPair { rows, cols } => Ok((
                bin_window(rows.0, rows.1, size)?,
                bin_window(cols.0, cols.1, size)?,
            )),
            Focus::Region(region) => {
                let r = region_window(region, sections, resolution)?;
                Ok((r.clone(), r))
            }
            Focus::RegionPair(a, b) => Ok((
                region_window(a, sections, resolution)?,
                region_window(b, sections, resolution)?,
            )),
        }
    }
}

fn bin_window(start: usize, end: usize, size: usize) -> Result<Range<usize>> {
    if start == 0 || start > end || end > size {
        return Err(HicompError::InvalidInput(format!(
            "focus {}-{} outside 1..={}",
            start, end, size
        )));
    }
    Ok(start - 1..end)
}

fn region_window(region: &Region, sections: &Sections, resolution: usize) -> Result<Range<usize>> {
    let section = sections.get(&region.chromosome).ok_or_else(|| {
        HicompError::InvalidInput(format!("unknown chromosome '{}'", region.chromosome))
    })?;
    let Some((begin, end)) = region.span else {
        return Ok(section.range());
    };
    let res = resolution as u64;
    let start = section.start + (begin / res) as usize;
    let stop = section.start + (end / res) as usize;
    if stop > section.end {
        return Err(HicompError::InvalidInput(format!(
            "region {}:{}-{} extends past the chromosome end",
            region.chromosome, begin, end
        )));
    }
    Ok(start..stop)
}
