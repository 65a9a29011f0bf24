//! Chromosome sections of a genome-wide bin axis.
//!
//! [`Sections`] partitions `[0, size)` into consecutive, non-overlapping bin
//! ranges, one per chromosome, in chromosome order. A matrix without named
//! chromosomes carries a single anonymous section spanning every bin.

use std::ops::Range;

use hicomp_core::{HicompError, Result, Summarizable};

/// Name given to the section of a matrix without chromosome information.
pub const ANONYMOUS_SECTION: &str = "*";

/// One chromosome: a name and its `[start, end)` range of global bins.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Section {
    pub name: String,
    pub start: usize,
    pub end: usize,
}

impl Section {
    /// Number of bins.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    /// Global bin range.
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Whether the global bin `bin` lies in this section.
    pub fn contains(&self, bin: usize) -> bool {
        self.start <= bin && bin < self.end
    }
}

/// Ordered partition of the bin axis into chromosomes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sections {
    sections: Vec<Section>,
    named: bool,
}

impl Sections {
    /// A single unnamed section covering `[0, size)`.
    pub fn anonymous(size: usize) -> Self {
        Self {
            sections: vec![Section {
                name: ANONYMOUS_SECTION.to_string(),
                start: 0,
                end: size,
            }],
            named: false,
        }
    }

    /// Build sections from per-chromosome bin counts.
    ///
    /// Chromosomes are named `chr0`, `chr1`, ... when `names` is `None`.
    pub fn from_bins(bins: &[usize], names: Option<&[&str]>) -> Result<Self> {
        if bins.is_empty() {
            return Err(HicompError::InvalidInput(
                "sections: need at least one chromosome".into(),
            ));
        }
        if let Some(names) = names {
            if names.len() != bins.len() {
                return Err(HicompError::InvalidInput(format!(
                    "sections: {} names for {} chromosomes",
                    names.len(),
                    bins.len()
                )));
            }
        }
        let mut sections = Vec::with_capacity(bins.len());
        let mut total = 0;
        for (k, &n) in bins.iter().enumerate() {
            let name = match names {
                Some(names) => names[k].to_string(),
                None => format!("chr{}", k),
            };
            if sections.iter().any(|s: &Section| s.name == name) {
                return Err(HicompError::InvalidInput(format!(
                    "sections: duplicate chromosome name '{}'",
                    name
                )));
            }
            sections.push(Section {
                name,
                start: total,
                end: total + n,
            });
            total += n;
        }
        Ok(Self {
            sections,
            named: true,
        })
    }

    /// `false` for the anonymous single-section layout.
    pub fn has_chromosomes(&self) -> bool {
        self.named
    }

    /// Total number of bins covered.
    pub fn total(&self) -> usize {
        self.sections.last().map_or(0, |s| s.end)
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter()
    }

    pub fn as_slice(&self) -> &[Section] {
        &self.sections
    }

    /// Look up a section by chromosome name.
    pub fn get(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Section holding the global bin `bin`.
    pub fn chromosome_of(&self, bin: usize) -> Option<&Section> {
        let idx = self.sections.partition_point(|s| s.end <= bin);
        self.sections.get(idx).filter(|s| s.contains(bin))
    }

    /// Index (in chromosome order) of the section holding `bin`.
    pub fn index_of(&self, bin: usize) -> Option<usize> {
        let idx = self.sections.partition_point(|s| s.end <= bin);
        (idx < self.sections.len() && self.sections[idx].contains(bin)).then_some(idx)
    }
}

impl Summarizable for Sections {
    fn summary(&self) -> String {
        if self.named {
            format!("Sections: {} chromosomes, {} bins", self.len(), self.total())
        } else {
            format!("Sections: anonymous, {} bins", self.total())
        }
    }
}
