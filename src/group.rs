use std::cell::{RefCell, RefMut};
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use num_traits::Zero;
use serde::Serialize;

use crate::analysis::{Analysis, SharedAnalysis};
use crate::argon::age_equation;
use crate::constants::{AgeUnits, ArArConstants};
use crate::isochron::{calculate_isochron, IsochronResult};
use crate::plateau::{alpha_label, calculate_plateau_age, PlateauOptions};
use crate::preferred::PreferredAttr;
use crate::stats::{
    arithmetic_mean, modify_error, mswd, mswd_about, standard_deviation_about, validate_mswd,
    weighted_mean, ErrorKind,
};
use crate::UFloat;

/// Which analyses an integrated value is summed over
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntegratedSubset {
    Total,
    Valid,
    Plateau,
}

#[derive(Clone, Debug, PartialEq)]
/// Weighted mean of an attribute with both error estimates
pub struct MeanStats {
    pub mean: f64,
    pub sd: f64,
    pub sem: f64,
    pub values: Vec<f64>,
    pub errors: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AttrStats {
    pub mean: f64,
    pub sd: f64,
    pub sem: f64,
    pub mswd: f64,
    pub valid_mswd: bool,
    pub min: f64,
    pub max: f64,
    /// Spread of the values as a percentage of the maximum
    pub total_dev: f64,
}

#[derive(Clone, Debug)]
pub struct PlateauResult {
    pub age: UFloat,
    /// Inclusive range of step indices
    pub steps: (usize, usize),
    /// Number of non-omitted steps in the range
    pub nsteps: usize,
    pub mswd: f64,
    pub mswd_valid: bool,
}

impl PlateauResult {
    /// The step range as labels, for example `B-F`
    #[must_use]
    pub fn steps_str(&self) -> String {
        format!("{}-{}", alpha_label(self.steps.0), alpha_label(self.steps.1))
    }
}

#[derive(Default)]
struct Cache {
    token: Option<u64>,
    weighted_age: Option<UFloat>,
    arith_age: Option<UFloat>,
    integrated_age: Option<UFloat>,
    isochron: Option<Option<IsochronResult>>,
    plateau: Option<Option<PlateauResult>>,
}

/// An ordered collection of analyses and the estimators aggregating them
///
/// Estimators are memoized against a token derived from the group's own change counter and
/// the revision of every member, so omitting a member invalidates every cached value.
///
/// Groups built with `AnalysisGroup::step_heat` treat their members as heating steps and can
/// additionally search for a plateau.
pub struct AnalysisGroup {
    analyses: Vec<SharedAnalysis>,
    attribute: String,
    error_kinds: BTreeMap<PreferredAttr, ErrorKind>,
    isochron_age_error_kind: ErrorKind,
    include_j_error_in_mean: bool,
    include_j_error_in_individual_analyses: bool,
    age_units: Option<AgeUnits>,
    plateau_options: Option<PlateauOptions>,
    dirty: u64,
    cache: RefCell<Cache>,
}

impl AnalysisGroup {
    #[must_use]
    pub fn new(analyses: Vec<SharedAnalysis>) -> Self {
        Self {
            analyses,
            attribute: "uage".to_owned(),
            error_kinds: BTreeMap::new(),
            isochron_age_error_kind: ErrorKind::Sem,
            include_j_error_in_mean: true,
            include_j_error_in_individual_analyses: false,
            age_units: None,
            plateau_options: None,
            dirty: 0,
            cache: RefCell::new(Cache::default()),
        }
    }

    /// A group of heating steps, ordered by extraction
    #[must_use]
    pub fn step_heat(analyses: Vec<SharedAnalysis>, options: PlateauOptions) -> Self {
        Self {
            plateau_options: Some(options),
            ..Self::new(analyses)
        }
    }

    /// Hash of everything the memoized estimators depend on
    #[must_use]
    pub fn token(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.dirty.hash(&mut hasher);
        self.analyses.len().hash(&mut hasher);
        for analysis in &self.analyses {
            analysis.borrow().revision().hash(&mut hasher);
        }
        hasher.finish()
    }

    fn cache(&self) -> RefMut<'_, Cache> {
        let token = self.token();
        let mut cache = self.cache.borrow_mut();
        if cache.token != Some(token) {
            *cache = Cache {
                token: Some(token),
                ..Cache::default()
            };
        }
        cache
    }

    /// Force every estimator to be recomputed on the next read
    pub fn invalidate(&mut self) {
        self.dirty = self.dirty.wrapping_add(1);
    }

    #[must_use]
    pub fn analyses(&self) -> &[SharedAnalysis] {
        &self.analyses
    }

    pub fn push(&mut self, analysis: SharedAnalysis) {
        self.analyses.push(analysis);
        self.invalidate();
    }

    pub fn set_analyses(&mut self, analyses: Vec<SharedAnalysis>) {
        self.analyses = analyses;
        self.invalidate();
    }

    /// Set the attribute the group MSWD and weighted mean are computed over
    pub fn set_attribute(&mut self, attribute: &str) {
        attribute.clone_into(&mut self.attribute);
        self.invalidate();
    }

    #[must_use]
    pub fn error_kind(&self, attr: PreferredAttr) -> ErrorKind {
        self.error_kinds.get(&attr).copied().unwrap_or_default()
    }

    pub fn set_error_kind(&mut self, attr: PreferredAttr, kind: ErrorKind) {
        self.error_kinds.insert(attr, kind);
        self.invalidate();
    }

    fn error_kind_for(&self, attr: &str) -> ErrorKind {
        attr.parse::<PreferredAttr>()
            .map_or(ErrorKind::Sd, |attr| self.error_kind(attr))
    }

    pub fn set_isochron_age_error_kind(&mut self, kind: ErrorKind) {
        self.isochron_age_error_kind = kind;
        self.invalidate();
    }

    pub fn set_plateau_age_error_kind(&mut self, kind: ErrorKind) {
        if let Some(options) = &mut self.plateau_options {
            options.plateau_age_error_kind = kind;
        }
        self.invalidate();
    }

    /// Force the plateau to span the steps labelled `low` to `high`
    pub fn set_fixed_steps(&mut self, steps: Option<(String, String)>) {
        if let Some(options) = &mut self.plateau_options {
            options.fixed_steps = steps;
        }
        self.invalidate();
    }

    #[must_use]
    pub const fn plateau_options(&self) -> Option<&PlateauOptions> {
        self.plateau_options.as_ref()
    }

    pub fn set_include_j_error_in_mean(&mut self, include: bool) {
        self.include_j_error_in_mean = include;
        self.invalidate();
    }

    pub fn set_include_j_error_in_individual_analyses(&mut self, include: bool) {
        self.include_j_error_in_individual_analyses = include;
        self.invalidate();
    }

    pub fn set_temporary_age_units(&mut self, units: Option<AgeUnits>) {
        self.age_units = units;
        self.invalidate();
    }

    #[must_use]
    pub fn age_units(&self) -> AgeUnits {
        self.age_units
            .unwrap_or_else(|| self.arar_constants().age_units)
    }

    /// Factor converting the group's age units to Ma
    #[must_use]
    pub fn age_scalar(&self) -> f64 {
        self.age_units().ma_scalar()
    }

    #[must_use]
    pub fn arar_constants(&self) -> ArArConstants {
        self.analyses
            .first()
            .map_or_else(ArArConstants::default, |a| a.borrow().arar_constants())
    }

    #[must_use]
    pub fn identifier(&self) -> String {
        self.analyses
            .first()
            .map_or_else(String::new, |a| a.borrow().identifier())
    }

    #[must_use]
    pub fn sample(&self) -> String {
        self.analyses
            .first()
            .map_or_else(String::new, |a| a.borrow().sample())
    }

    #[must_use]
    pub fn aliquot(&self) -> u32 {
        self.analyses.first().map_or(0, |a| a.borrow().aliquot())
    }

    #[must_use]
    pub fn j(&self) -> Option<UFloat> {
        self.analyses.first().and_then(|a| a.borrow().j())
    }

    /// Relative error of J
    #[must_use]
    pub fn j_err(&self) -> f64 {
        self.j().map_or(0.0, |j| {
            if j.nominal_value() == 0.0 {
                f64::NAN
            } else {
                j.std_dev() / j.nominal_value()
            }
        })
    }

    pub fn clean_analyses(&self) -> impl Iterator<Item = &SharedAnalysis> {
        self.analyses.iter().filter(|a| !a.borrow().is_omitted())
    }

    #[must_use]
    pub fn nanalyses(&self) -> usize {
        self.clean_analyses().count()
    }

    #[must_use]
    pub fn total_n(&self) -> usize {
        self.analyses.len()
    }

    #[must_use]
    pub fn nratio(&self) -> String {
        format!("{}/{}", self.nanalyses(), self.total_n())
    }

    /// Nominal values and standard deviations of `attr` over the non-omitted analyses
    #[must_use]
    pub fn get_values(&self, attr: &str) -> Option<(Vec<f64>, Vec<f64>)> {
        let (values, errors): (Vec<f64>, Vec<f64>) = self
            .clean_analyses()
            .map(|a| {
                let value = a.borrow().get_value(attr);
                (value.nominal_value(), value.std_dev())
            })
            .unzip();
        (!values.is_empty()).then_some((values, errors))
    }

    /// Mean of `attr` and its error
    ///
    /// Weighted means report the propagated standard error, or the standard deviation about
    /// the weighted mean for `ErrorKind::Sd`. Unweighted means report the sample standard
    /// deviation. An empty group gives `(0, 0)`.
    #[must_use]
    pub fn calculate_mean(&self, attr: &str, use_weights: bool, error_kind: ErrorKind) -> (f64, f64) {
        let Some((values, errors)) = self.get_values(attr) else {
            return (0.0, 0.0);
        };
        if !use_weights {
            return arithmetic_mean(&values);
        }

        let (mean, sem) = weighted_mean(&values, &errors);
        match error_kind {
            ErrorKind::Sd => (mean, standard_deviation_about(&values, mean)),
            ErrorKind::Sem | ErrorKind::Msem => (mean, sem),
        }
    }

    /// Weighted mean of `attr` with both the standard deviation and standard error
    #[must_use]
    pub fn calculate_mean_both(&self, attr: &str) -> Option<MeanStats> {
        let (values, errors) = self.get_values(attr)?;
        let (mean, sem) = weighted_mean(&values, &errors);
        Some(MeanStats {
            mean,
            sd: standard_deviation_about(&values, mean),
            sem,
            values,
            errors,
        })
    }

    /// Apply the error rule for `kind`, using the group MSWD unless one is supplied
    #[must_use]
    pub fn modify_error(&self, error: f64, kind: ErrorKind, mswd: Option<f64>) -> f64 {
        modify_error(error, kind, mswd.unwrap_or_else(|| self.mswd()))
    }

    fn age_attribute(&self) -> &'static str {
        if self.include_j_error_in_individual_analyses {
            "uage_w_j_err"
        } else {
            "uage"
        }
    }

    fn mean_attribute(&self) -> &str {
        if self.attribute.starts_with("uage") {
            self.age_attribute()
        } else {
            &self.attribute
        }
    }

    #[must_use]
    pub fn mswd(&self) -> f64 {
        self.calculate_mswd(self.mean_attribute())
    }

    #[must_use]
    pub fn calculate_mswd(&self, attr: &str) -> f64 {
        self.get_values(attr)
            .map_or(0.0, |(values, errors)| mswd(&values, &errors, 1))
    }

    #[must_use]
    pub fn get_mswd_tuple(&self) -> (f64, bool, usize) {
        let mswd = self.mswd();
        let n = self.nanalyses();
        (mswd, validate_mswd(mswd, n, 1), n)
    }

    #[must_use]
    pub fn attr_stats(&self, attr: &str) -> Option<AttrStats> {
        let stats = self.calculate_mean_both(attr)?;
        let mswd = mswd_about(&stats.values, &stats.errors, stats.mean, 1);
        let min = stats.values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = stats.values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Some(AttrStats {
            mean: stats.mean,
            sd: stats.sd,
            sem: stats.sem,
            mswd,
            valid_mswd: validate_mswd(mswd, self.nanalyses(), 1),
            min,
            max,
            total_dev: (max - min) / max * 100.0,
        })
    }

    /// Weighted mean of `attr`, with the error reported as `kind`
    ///
    /// Without a `kind` the error kind configured for the attribute is used, or the standard
    /// deviation for attributes without one.
    #[must_use]
    pub fn weighted_mean(&self, attr: &str, kind: Option<ErrorKind>) -> UFloat {
        if attr == "age" {
            return self.weighted_age();
        }
        let kind = kind.unwrap_or_else(|| self.error_kind_for(attr));
        let (mean, error) = self.calculate_mean(attr, true, kind);
        let error = self.modify_error(error, kind, Some(self.calculate_mswd(attr)));
        UFloat::new(mean, error)
    }

    #[must_use]
    pub fn arithmetic_mean(&self, attr: &str) -> UFloat {
        if attr == "age" {
            return self.arith_age();
        }
        let (mean, error) = self.calculate_mean(attr, false, ErrorKind::Sd);
        UFloat::new(mean, error)
    }

    #[must_use]
    pub fn weighted_age(&self) -> UFloat {
        let cached = self.cache().weighted_age.clone();
        cached.unwrap_or_else(|| {
            let kind = self.error_kind(PreferredAttr::Age);
            let (mean, error) = self.calculate_mean(self.mean_attribute(), true, kind);
            let error = self.modify_error(error, kind, None);
            let age = UFloat::new(mean, error.max(0.0));
            self.cache().weighted_age = Some(age.clone());
            age
        })
    }

    #[must_use]
    pub fn arith_age(&self) -> UFloat {
        let cached = self.cache().arith_age.clone();
        cached.unwrap_or_else(|| {
            let attr = if self.include_j_error_in_individual_analyses {
                "uage"
            } else {
                "uage_wo_j_err"
            };
            let (mean, error) = self.calculate_mean(attr, false, ErrorKind::Sd);
            let error = self.modify_error(error, self.error_kind(PreferredAttr::Age), None);
            let age = UFloat::new(mean, error);
            self.cache().arith_age = Some(age.clone());
            age
        })
    }

    /// Age of the summed radiogenic 40Ar over the summed 39K of the valid analyses
    ///
    /// Zero for groups of interpreted ages, or when no 39K was measured.
    #[must_use]
    pub fn integrated_age(&self) -> UFloat {
        let cached = self.cache().integrated_age.clone();
        cached.unwrap_or_else(|| {
            let age = self.calculate_integrated_age();
            self.cache().integrated_age = Some(age.clone());
            age
        })
    }

    fn calculate_integrated_age(&self) -> UFloat {
        let analyses = self.clean_analyses().collect::<Vec<_>>();
        let Some(first) = analyses.first() else {
            return UFloat::zero();
        };
        if analyses.iter().any(|a| a.borrow().is_interpreted()) {
            return UFloat::zero();
        }

        let rad40: UFloat = analyses
            .iter()
            .map(|a| a.borrow().computed_value("rad40"))
            .sum();
        let k39: UFloat = analyses
            .iter()
            .map(|a| a.borrow().computed_value("k39"))
            .sum();
        let first = first.borrow();
        match (rad40.checked_div(&k39), first.j()) {
            (Some(f), Some(j)) => age_equation(&j, &f, &first.arar_constants()),
            _ => UFloat::zero(),
        }
    }

    /// Inverse isochron through the members that have isochron ratios
    #[must_use]
    pub fn isochron(&self) -> Option<IsochronResult> {
        let cached = self.cache().isochron.clone();
        cached.unwrap_or_else(|| {
            let isochron = self.calculate_isochron_age();
            self.cache().isochron = Some(isochron.clone());
            isochron
        })
    }

    fn calculate_isochron_age(&self) -> Option<IsochronResult> {
        let mut ratios = vec![];
        let mut excludes = vec![];
        for analysis in &self.analyses {
            let analysis = analysis.borrow();
            if let Some(point) = analysis.isochron_ratios() {
                if analysis.is_omitted() {
                    excludes.push(ratios.len());
                }
                ratios.push(point);
            }
        }
        if ratios.is_empty() {
            return None;
        }

        let j = self.j().unwrap_or_default();
        let j = if self.include_j_error_in_mean {
            j
        } else {
            j.without_error()
        };

        let mut result = calculate_isochron(&ratios, &excludes, &j, &self.arar_constants())?;
        let error = self.modify_error(
            result.age.std_dev(),
            self.isochron_age_error_kind,
            Some(result.regression.mswd),
        );
        result.age = UFloat::new(result.age.nominal_value(), error);
        Some(result)
    }

    #[must_use]
    pub fn isochron_age(&self) -> UFloat {
        self.isochron().map_or_else(UFloat::zero, |result| result.age)
    }

    #[must_use]
    pub fn isochron_4036(&self) -> Option<UFloat> {
        self.isochron().map(|result| result.trapped_4036)
    }

    /// The plateau of a step heat group
    ///
    /// Always `None` for groups not built with `step_heat`, and for groups containing
    /// interpreted ages. Single step plateaus are discarded.
    #[must_use]
    pub fn plateau(&self) -> Option<PlateauResult> {
        let cached = self.cache().plateau.clone();
        cached.unwrap_or_else(|| {
            let plateau = self.calculate_plateau();
            self.cache().plateau = Some(plateau.clone());
            plateau
        })
    }

    fn calculate_plateau(&self) -> Option<PlateauResult> {
        let options = self.plateau_options.as_ref()?;
        if self.analyses.is_empty() || self.analyses.iter().any(|a| a.borrow().is_interpreted())
        {
            return None;
        }

        let mut ages = vec![];
        let mut errors = vec![];
        let mut k39 = vec![];
        let mut excludes = vec![];
        for (i, analysis) in self.analyses.iter().enumerate() {
            let analysis = analysis.borrow();
            ages.push(analysis.age());
            errors.push(analysis.age_err());
            k39.push(analysis.computed_value("k39").nominal_value());
            if analysis.is_omitted() {
                excludes.push(i);
            }
        }

        let (age, error, steps) = calculate_plateau_age(&ages, &errors, &k39, options, &excludes)?;
        if steps.0 == steps.1 {
            return None;
        }

        let (step_ages, step_errors): (Vec<f64>, Vec<f64>) = (steps.0..=steps.1)
            .filter(|i| !excludes.contains(i))
            .map(|i| (ages[i], errors[i]))
            .unzip();
        let nsteps = step_ages.len();
        let mswd = mswd(&step_ages, &step_errors, 1);
        let error = modify_error(error, options.plateau_age_error_kind, mswd);
        let error = if error.is_nan() { 0.0 } else { error.max(0.0) };

        Some(PlateauResult {
            age: UFloat::new(age, error),
            steps,
            nsteps,
            mswd,
            mswd_valid: validate_mswd(mswd, nsteps, 1),
        })
    }

    #[must_use]
    pub fn plateau_age(&self) -> UFloat {
        self.plateau().map_or_else(UFloat::zero, |plateau| plateau.age)
    }

    #[must_use]
    pub fn plateau_steps(&self) -> Option<(usize, usize)> {
        self.plateau().map(|plateau| plateau.steps)
    }

    #[must_use]
    pub fn plateau_steps_str(&self) -> String {
        self.plateau()
            .map_or_else(String::new, |plateau| plateau.steps_str())
    }

    #[must_use]
    pub fn nsteps(&self) -> usize {
        self.plateau().map_or(0, |plateau| plateau.nsteps)
    }

    #[must_use]
    pub fn plateau_mswd(&self) -> f64 {
        self.plateau().map_or(0.0, |plateau| plateau.mswd)
    }

    #[must_use]
    pub fn plateau_mswd_valid(&self) -> bool {
        self.plateau().map_or(false, |plateau| plateau.mswd_valid)
    }

    #[must_use]
    pub fn get_plateau_mswd_tuple(&self) -> (f64, bool, usize) {
        self.plateau().map_or((0.0, false, 0), |plateau| {
            (plateau.mswd, plateau.mswd_valid, plateau.nsteps)
        })
    }

    /// Whether the step at `index` is a non-omitted member of the plateau range
    #[must_use]
    pub fn get_is_plateau_step(&self, index: usize) -> bool {
        let Some(analysis) = self.analyses.get(index) else {
            return false;
        };
        !analysis.borrow().is_omitted()
            && self
                .plateau_steps()
                .map_or(false, |(low, high)| (low..=high).contains(&index))
    }

    #[must_use]
    pub fn plateau_analyses(&self) -> Vec<SharedAnalysis> {
        self.analyses
            .iter()
            .enumerate()
            .filter(|(i, _)| self.get_is_plateau_step(*i))
            .map(|(_, a)| a.clone())
            .collect()
    }

    /// Sum `attr` over a subset of the analyses, forming ratios of sums where required
    ///
    /// K/Ca and K/Cl are corrected by the production ratios of the first analysis. A zero
    /// denominator gives `0 +/- 0`.
    #[must_use]
    pub fn calculate_integrated(&self, attr: PreferredAttr, subset: IntegratedSubset) -> UFloat {
        if attr == PreferredAttr::Age {
            return self.integrated_age();
        }

        let analyses = match subset {
            IntegratedSubset::Total => self.analyses.clone(),
            IntegratedSubset::Valid => self.clean_analyses().cloned().collect(),
            IntegratedSubset::Plateau => self.plateau_analyses(),
        };
        let Some(first) = analyses.first() else {
            return UFloat::zero();
        };
        let ratios = first.borrow().production_ratios();

        match attr {
            PreferredAttr::Kca => ratio_of_sums(
                sum_over(&analyses, |a| a.computed_value("k39")),
                sum_over(&analyses, |a| a.non_ar_isotope("ca37")),
                ratios.k_ca_factor(),
            ),
            PreferredAttr::Kcl => ratio_of_sums(
                sum_over(&analyses, |a| a.computed_value("k39")),
                sum_over(&analyses, |a| a.non_ar_isotope("cl38")),
                ratios.k_cl_factor(),
            ),
            PreferredAttr::Rad40Percent => ratio_of_sums(
                sum_over(&analyses, |a| a.computed_value("rad40")),
                sum_over(&analyses, |a| a.computed_value("a40")),
                100.0,
            ),
            PreferredAttr::MolesK39 => sum_over(&analyses, |a| a.moles_k39()),
            PreferredAttr::SignalK39 => sum_over(&analyses, |a| a.computed_value("k39")),
            PreferredAttr::Age => UFloat::zero(),
        }
    }

    #[must_use]
    pub fn total_ar39(&self) -> f64 {
        sum_over(&self.analyses, |a| a.computed_value("k39")).nominal_value()
    }

    fn percent_of_total_ar39(&self, analyses: &[SharedAnalysis]) -> f64 {
        let total = self.total_ar39();
        if total == 0.0 {
            return 0.0;
        }
        sum_over(analyses, |a| a.computed_value("k39")).nominal_value() / total * 100.0
    }

    #[must_use]
    pub fn plateau_total_ar39(&self) -> f64 {
        self.percent_of_total_ar39(&self.plateau_analyses())
    }

    #[must_use]
    pub fn valid_total_ar39(&self) -> f64 {
        let valid = self.clean_analyses().cloned().collect::<Vec<_>>();
        self.percent_of_total_ar39(&valid)
    }

    /// Percentage of the total 39Ar released up to and including step `index`
    #[must_use]
    pub fn cumulative_ar39(&self, index: usize) -> f64 {
        let end = (index + 1).min(self.analyses.len());
        self.percent_of_total_ar39(&self.analyses[..end])
    }
}

fn sum_over(analyses: &[SharedAnalysis], value: impl Fn(&dyn Analysis) -> UFloat) -> UFloat {
    analyses.iter().map(|a| value(&*a.borrow())).sum()
}

fn ratio_of_sums(numerator: UFloat, denominator: UFloat, factor: f64) -> UFloat {
    numerator
        .checked_div(&denominator)
        .map_or_else(UFloat::zero, |ratio| ratio * factor)
}

#[cfg(test)]
mod tests {
    use crate::analysis::{shared, SharedAnalysis};
    use crate::arar_age::tests::analysis_with_f;
    use crate::plateau::PlateauOptions;
    use crate::preferred::PreferredAttr;
    use crate::stats::ErrorKind;

    use super::{AnalysisGroup, IntegratedSubset};

    fn group_of(fs: &[(f64, f64)]) -> Vec<SharedAnalysis> {
        fs.iter()
            .map(|(f, e)| shared(analysis_with_f("12345", 1, *f, *e)))
            .collect()
    }

    #[test]
    fn weighted_age_of_identical_errors_is_the_arithmetic_mean() {
        let group = AnalysisGroup::new(group_of(&[(10.0, 0.01), (10.2, 0.01), (10.4, 0.01)]));
        let ages = group
            .analyses()
            .iter()
            .map(|a| a.borrow().age())
            .collect::<Vec<_>>();
        let mean = ages.iter().sum::<f64>() / 3.0;

        approx::assert_relative_eq!(
            group.weighted_age().nominal_value(),
            mean,
            max_relative = 1e-4
        );
        approx::assert_relative_eq!(
            group.arith_age().nominal_value(),
            mean,
            max_relative = 1e-12
        );
    }

    #[test]
    fn omission_invalidates_cached_values() {
        let analyses = group_of(&[(10.0, 0.01), (10.0, 0.01), (20.0, 0.01)]);
        let group = AnalysisGroup::new(analyses.clone());
        let before = group.weighted_age().nominal_value();
        assert_eq!(group.nanalyses(), 3);

        analyses[2].borrow_mut().set_omitted(true);

        let after = group.weighted_age().nominal_value();
        assert!(after < before);
        approx::assert_relative_eq!(after, analyses[0].borrow().age(), max_relative = 1e-9);
        assert_eq!(group.nratio(), "2/3");
    }

    #[test]
    fn standard_deviation_and_standard_error_differ() {
        let group = AnalysisGroup::new(group_of(&[(10.0, 0.01), (11.0, 0.01), (12.0, 0.01)]));
        let (_, sd) = group.calculate_mean("uage", true, ErrorKind::Sd);
        let (_, sem) = group.calculate_mean("uage", true, ErrorKind::Sem);
        assert!(sd > sem);

        let both = group.calculate_mean_both("uage").unwrap();
        approx::assert_relative_eq!(both.sd, sd);
        approx::assert_relative_eq!(both.sem, sem);
    }

    #[test]
    fn msem_expands_overdispersed_weighted_age() {
        let mut group =
            AnalysisGroup::new(group_of(&[(10.0, 0.01), (11.0, 0.01), (12.0, 0.01)]));
        group.set_error_kind(PreferredAttr::Age, ErrorKind::Sem);
        let sem = group.weighted_age().std_dev();

        group.set_error_kind(PreferredAttr::Age, ErrorKind::Msem);
        let msem = group.weighted_age().std_dev();

        let mswd = group.mswd();
        assert!(mswd > 1.0);
        approx::assert_relative_eq!(msem, sem * mswd.sqrt(), max_relative = 1e-9);
    }

    #[test]
    fn empty_group_has_no_values() {
        let group = AnalysisGroup::new(vec![]);
        assert!(group.get_values("uage").is_none());
        assert_eq!(group.calculate_mean("uage", true, ErrorKind::Sem), (0.0, 0.0));
        approx::assert_relative_eq!(group.integrated_age().nominal_value(), 0.0);
        assert!(group.plateau().is_none());
    }

    #[test]
    fn integrated_age_of_equal_f_steps_is_the_step_age() {
        let group = AnalysisGroup::new(group_of(&[(10.0, 0.01), (10.0, 0.01)]));
        let step_age = group.analyses()[0].borrow().age();
        approx::assert_relative_eq!(
            group.integrated_age().nominal_value(),
            step_age,
            max_relative = 1e-9
        );
    }

    #[test]
    fn zero_calcium_gives_zero_integrated_kca() {
        let group = AnalysisGroup::new(group_of(&[(10.0, 0.01), (10.0, 0.01)]));
        let kca = group.calculate_integrated(PreferredAttr::Kca, IntegratedSubset::Total);
        approx::assert_relative_eq!(kca.nominal_value(), 0.0);
        approx::assert_relative_eq!(kca.std_dev(), 0.0);
    }

    #[test]
    fn step_heat_plateau_skips_outlying_step() {
        let steps = group_of(&[
            (10.0, 0.01),
            (10.0, 0.01),
            (10.0, 0.01),
            (50.0, 0.01),
            (10.0, 0.01),
        ]);
        let group = AnalysisGroup::step_heat(steps, PlateauOptions::default());

        assert_eq!(group.plateau_steps(), Some((0, 2)));
        assert_eq!(group.plateau_steps_str(), "A-C");
        assert_eq!(group.nsteps(), 3);
        assert!(group.get_is_plateau_step(1));
        assert!(!group.get_is_plateau_step(3));
        assert!(!group.get_is_plateau_step(4));
        assert_eq!(group.plateau_analyses().len(), 3);
        approx::assert_relative_eq!(group.plateau_total_ar39(), 60.0, max_relative = 1e-9);
        approx::assert_relative_eq!(group.cumulative_ar39(1), 40.0, max_relative = 1e-9);
    }

    #[test]
    fn omitted_steps_are_not_plateau_steps() {
        let steps = group_of(&[(10.0, 0.01), (10.0, 0.01), (10.0, 0.01), (10.0, 0.01)]);
        let group = AnalysisGroup::step_heat(steps.clone(), PlateauOptions::default());
        assert_eq!(group.plateau_steps(), Some((0, 3)));

        steps[1].borrow_mut().set_omitted(true);
        assert_eq!(group.nsteps(), 3);
        assert!(!group.get_is_plateau_step(1));
        approx::assert_relative_eq!(group.valid_total_ar39(), 75.0, max_relative = 1e-9);
    }

    #[test]
    fn plain_groups_have_no_plateau() {
        let group = AnalysisGroup::new(group_of(&[(10.0, 0.01), (10.0, 0.01), (10.0, 0.01)]));
        assert!(group.plateau().is_none());
        approx::assert_relative_eq!(group.plateau_age().nominal_value(), 0.0);
    }
}
