//! Genome-wide compartment calling.
//!
//! [`find_compartments`] prepares normalization, segments every chromosome,
//! optionally relabels the intervals with an HMM or by clustering and
//! stores the result on the matrix.

use std::collections::HashMap;

use hicomp_core::{HicompError, Result, Summarizable};
use hicomp_stats::zscore;

use crate::cluster_label::{ClusterCompartmentClassifier, ClusterConfig, ClusterOutcome};
use crate::compartment::{CompartmentInterval, EigenTrack};
use crate::density::{measure_densities, DensityMetric, DensitySource, InteractionDensity, ReferenceTrack};
use crate::diagnostics::Diagnostic;
use crate::hmm_label::{assign_letters, path_intervals, HmmCompartmentClassifier, HmmConfig, HmmDecoding};
use crate::matrix::ContactMatrix;
use crate::normalization::{prepare_normalization, NormalizationPort, PrepareConfig};
use crate::sections::Section;
use crate::segment::{ChromosomeSegmentation, CorrelationSegmenter, SegmentOutcome, SegmenterConfig};

/// How provisional intervals are relabeled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Labeling {
    /// Keep the density-based A/B of the segmentation.
    #[default]
    Provisional,
    /// Re-segment with Gaussian HMMs trained on all chromosomes.
    Hmm,
    /// Relabel by Ward clustering of the intervals.
    Cluster,
}

/// Parameters of [`find_compartments`].
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CompartmentConfig {
    pub prepare: PrepareConfig,
    pub segmenter: SegmenterConfig,
    pub labeling: Labeling,
    /// Metric of the interaction density used without a reference track.
    pub density_metric: DensityMetric,
    /// Restrict the run to these chromosomes; all sections otherwise.
    pub chromosomes: Option<Vec<String>>,
    pub hmm: HmmConfig,
    pub cluster: ClusterConfig,
}

/// Everything a compartment run produced besides the intervals.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CompartmentReport {
    /// Eigenvectors of every segmented chromosome, in section order.
    pub tracks: Vec<EigenTrack>,
    pub diagnostics: Vec<Diagnostic>,
    pub hmm: HashMap<String, HmmDecoding>,
    pub clusters: HashMap<String, ClusterOutcome>,
}

impl Summarizable for CompartmentReport {
    fn summary(&self) -> String {
        format!(
            "CompartmentReport: {} chromosomes segmented, {} diagnostics",
            self.tracks.len(),
            self.diagnostics.len()
        )
    }
}

/// Call compartments on every selected chromosome of `matrix`.
///
/// Missing bad bins, expected counts and bias are filled in through `port`
/// first. With a `reference` track the eigenvectors are oriented against it
/// and it serves as the density source; otherwise the interaction density
/// of the matrix is used. Degenerate chromosomes get an empty compartment
/// list and a [`Diagnostic::DegenerateChromosome`]. The compartments of the
/// matrix are replaced once every chromosome is done.
pub fn find_compartments<P: NormalizationPort + ?Sized>(
    matrix: &mut ContactMatrix,
    port: &P,
    config: &CompartmentConfig,
    reference: Option<&ReferenceTrack>,
) -> Result<CompartmentReport> {
    let mut report = CompartmentReport {
        diagnostics: prepare_normalization(matrix, port, &config.prepare)?,
        ..Default::default()
    };

    let view: &ContactMatrix = matrix;
    let sections = selected_sections(view, config.chromosomes.as_deref())?;
    let interaction = InteractionDensity::new(view, config.density_metric);
    let density: &dyn DensitySource = match reference {
        Some(track) => track,
        None => &interaction,
    };

    let segmenter = CorrelationSegmenter::new(config.segmenter.clone());
    let segment = |section: &Section| segmenter.segment(view, section, reference, density);
    #[cfg(feature = "parallel")]
    let outcomes: Vec<SegmentOutcome> = {
        use rayon::prelude::*;
        sections.par_iter().map(segment).collect::<Result<_>>()?
    };
    #[cfg(not(feature = "parallel"))]
    let outcomes: Vec<SegmentOutcome> = sections.iter().map(segment).collect::<Result<_>>()?;

    let mut segmented: Vec<(&Section, ChromosomeSegmentation)> = Vec::new();
    let mut results: Vec<(String, Vec<CompartmentInterval>)> = Vec::with_capacity(sections.len());
    for (section, outcome) in sections.iter().zip(outcomes) {
        match outcome {
            SegmentOutcome::Segmented(seg) => segmented.push((section, *seg)),
            SegmentOutcome::Degenerate(reason) => {
                report.diagnostics.push(
                    Diagnostic::DegenerateChromosome {
                        chromosome: section.name.clone(),
                        reason,
                    }
                    .emit(),
                );
                results.push((section.name.clone(), Vec::new()));
            }
        }
    }

    match config.labeling {
        Labeling::Provisional => {}
        Labeling::Hmm => {
            let classifier = HmmCompartmentClassifier::new(config.hmm.clone());
            relabel_hmm(&classifier, view, &mut segmented, density, &mut report)?;
        }
        Labeling::Cluster => {
            let classifier = ClusterCompartmentClassifier::new(config.cluster.clone());
            for (section, seg) in segmented.iter_mut() {
                let outcome = classifier.classify(
                    &section.name,
                    &seg.correlation,
                    seg.length,
                    &mut seg.intervals,
                    density,
                );
                seg.diagnostics.extend(outcome.diagnostics.iter().cloned());
                report.clusters.insert(section.name.clone(), outcome);
            }
        }
    }

    for (section, seg) in segmented {
        report.diagnostics.extend(seg.diagnostics);
        report.tracks.push(seg.track);
        results.push((section.name.clone(), seg.intervals));
    }

    let compartments: HashMap<String, Vec<CompartmentInterval>> = results.into_iter().collect();
    log::info!(
        "compartments called on {} chromosomes ({} labeling)",
        compartments.len(),
        match config.labeling {
            Labeling::Provisional => "provisional",
            Labeling::Hmm => "HMM",
            Labeling::Cluster => "cluster",
        }
    );
    matrix.replace_compartments(compartments);
    Ok(report)
}

fn selected_sections(matrix: &ContactMatrix, names: Option<&[String]>) -> Result<Vec<Section>> {
    match names {
        None => Ok(matrix.sections().iter().cloned().collect()),
        Some(names) => names
            .iter()
            .map(|name| {
                matrix
                    .sections()
                    .get(name)
                    .cloned()
                    .ok_or_else(|| HicompError::Configuration(format!("unknown chromosome {}", name)))
            })
            .collect(),
    }
}

/// Train on the z-scored tracks of all chromosomes, then decode each one.
///
/// Chromosomes with a constant track cannot be standardized and keep their
/// provisional labels.
fn relabel_hmm(
    classifier: &HmmCompartmentClassifier,
    matrix: &ContactMatrix,
    segmented: &mut [(&Section, ChromosomeSegmentation)],
    density: &dyn DensitySource,
    report: &mut CompartmentReport,
) -> Result<()> {
    let tracks: Vec<Option<Vec<f64>>> = segmented
        .iter()
        .map(|(section, seg)| {
            let ev = seg.track.selected_vector();
            let values: Vec<f64> = seg.good.iter().map(|&k| ev[k]).collect();
            match zscore(&values) {
                Ok(z) => Some(z),
                Err(e) => {
                    log::debug!("{}: skipping HMM labeling, {}", section.name, e);
                    None
                }
            }
        })
        .collect();
    let pooled: Vec<&[f64]> = tracks.iter().flatten().map(|t| t.as_slice()).collect();
    if pooled.is_empty() {
        return Ok(());
    }
    let models = classifier.train(&pooled)?;

    for ((section, seg), track) in segmented.iter_mut().zip(&tracks) {
        let Some(z) = track else {
            continue;
        };
        let decoding = classifier.decode(&models, z)?;
        let (mut intervals, states) = path_intervals(&decoding.path, &seg.good, seg.length);
        measure_densities(&mut intervals, density, section, matrix.bads());
        assign_letters(&mut intervals, &states, |d| density.is_a_like(d));
        log::debug!(
            "{}: {} states selected, {} intervals",
            section.name,
            decoding.n_states,
            intervals.len()
        );
        seg.intervals = intervals;
        report.hmm.insert(section.name.clone(), decoding);
    }
    Ok(())
}
