use std::collections::{BTreeMap, BTreeSet};

use log::{debug, warn};
use num_traits::Zero;

use crate::analysis::{zero_if_missing, Analysis, SubgroupId};
use crate::argon::{
    abundance_sensitivity_correction, age_equation, calculate_decay_factor, calculate_f,
    calculate_flux, ChronSegment, FCalculation, ARGON_KEYS,
};
use crate::attribute::AttrQuery;
use crate::constants::{ArArConstants, InterferenceCorrections, ProductionRatios};
use crate::isotope::{Blank, Isotope};
use crate::UFloat;

const SECONDS_PER_DAY: f64 = 60.0 * 60.0 * 24.0;
const TEMPORARY_BLANK_TOLERANCE: f64 = 1e-5;

#[derive(Clone, Debug, Default)]
struct Derived {
    uf: Option<UFloat>,
    f_wo_irrad: Option<UFloat>,
    uage: Option<UFloat>,
    uage_w_j_err: Option<UFloat>,
    uage_wo_j_err: Option<UFloat>,
    age_err_wo_irrad: f64,
    kca: UFloat,
    kcl: UFloat,
    non_ar_isotopes: BTreeMap<String, UFloat>,
    computed: BTreeMap<String, UFloat>,
    corrected_intensities: BTreeMap<String, UFloat>,
}

#[derive(Clone, Debug)]
/// The Ar/Ar attributes of a single analysis
///
/// Derived values (F, ages, K/Ca, K/Cl) are stale until `calculate_age` is called. Callers
/// changing corrections after the fact should `invalidate` before recalculating.
pub struct ArArAge {
    pub identifier: String,
    pub aliquot: u32,
    pub sample: String,
    pub irradiation: String,
    pub irradiation_level: String,
    pub irradiation_position: usize,
    pub isotopes: BTreeMap<String, Isotope>,
    pub j: Option<UFloat>,
    pub arar_constants: ArArConstants,
    pub interference_corrections: InterferenceCorrections,
    pub production_ratios: ProductionRatios,
    pub chron_segments: Vec<ChronSegment>,
    /// Analysis time, seconds
    pub timestamp: f64,
    /// End of irradiation, seconds
    pub irradiation_time: f64,
    pub fixed_k3739: Option<UFloat>,
    /// Moles per unit of signal
    pub sensitivity: f64,
    /// Sample weight in milligrams
    pub weight: f64,
    pub temporary_ic_factors: BTreeMap<String, UFloat>,
    ar39_decay_factor: f64,
    ar37_decay_factor: f64,
    derived: Derived,
    omitted: bool,
    revision: u64,
    subgroup: Option<SubgroupId>,
    missing_isotope_warned: bool,
    kca_warned: bool,
    kcl_warned: bool,
}

impl ArArAge {
    #[must_use]
    pub fn new(identifier: impl Into<String>, aliquot: u32) -> Self {
        Self {
            identifier: identifier.into(),
            aliquot,
            sample: String::new(),
            irradiation: String::new(),
            irradiation_level: String::new(),
            irradiation_position: 0,
            isotopes: BTreeMap::new(),
            j: None,
            arar_constants: ArArConstants::default(),
            interference_corrections: InterferenceCorrections::default(),
            production_ratios: ProductionRatios::default(),
            chron_segments: vec![],
            timestamp: 0.0,
            irradiation_time: 0.0,
            fixed_k3739: None,
            sensitivity: 1e-17,
            weight: 0.0,
            temporary_ic_factors: BTreeMap::new(),
            ar39_decay_factor: 0.0,
            ar37_decay_factor: 0.0,
            derived: Derived::default(),
            omitted: false,
            revision: 0,
            subgroup: None,
            missing_isotope_warned: false,
            kca_warned: false,
            kcl_warned: false,
        }
    }

    #[must_use]
    pub fn with_isotope(mut self, isotope: Isotope) -> Self {
        self.set_isotope(isotope);
        self
    }

    pub fn set_isotope(&mut self, isotope: Isotope) {
        self.isotopes.insert(isotope.name.clone(), isotope);
        self.invalidate();
    }

    pub fn set_j(&mut self, value: f64, error: f64) {
        self.j = Some(UFloat::tagged(value, error, "J"));
        self.invalidate();
    }

    /// Discard every derived value, forcing the next `calculate_age` to recompute
    pub fn invalidate(&mut self) {
        self.derived = Derived::default();
        self.ar39_decay_factor = 0.0;
        self.ar37_decay_factor = 0.0;
        self.revision += 1;
    }

    #[must_use]
    pub fn decay_days(&self) -> f64 {
        (self.timestamp - self.irradiation_time) / SECONDS_PER_DAY
    }

    #[must_use]
    pub fn irradiation_label(&self) -> String {
        format!(
            "{}{} {}",
            self.irradiation, self.irradiation_level, self.irradiation_position
        )
    }

    #[must_use]
    pub fn detector_keys(&self) -> Vec<String> {
        self.isotopes
            .values()
            .map(|iso| iso.detector.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    #[must_use]
    pub const fn decay_factors(&self) -> (f64, f64) {
        (self.ar37_decay_factor, self.ar39_decay_factor)
    }

    /// Compute the 37Ar and 39Ar decay factors, once
    pub fn calculate_decay_factors(&mut self) {
        if self.ar39_decay_factor == 0.0 {
            let constants = &self.arar_constants;
            self.ar37_decay_factor =
                calculate_decay_factor(constants.lambda_ar37.value, &self.chron_segments);
            self.ar39_decay_factor =
                calculate_decay_factor(constants.lambda_ar39.value, &self.chron_segments);
        }
    }

    pub fn calculate_f(&mut self) -> Option<UFloat> {
        self.calculate_decay_factors();
        let intensities = self.assemble_isotope_intensities()?;
        let interferences = self.interference_corrections.clone();
        Some(self.compute_f(&intensities, &interferences).f)
    }

    /// Calculate the age and its variants
    ///
    /// Does nothing if an age already exists unless `force` is set, which is required when
    /// error components need to be recomputed.
    pub fn calculate_age(&mut self, force: bool) {
        if self.derived.uage.is_none() || force {
            self.calculate_decay_factors();
            let interferences = self.interference_corrections.clone();
            self.compute_age(&interferences);
            self.calculate_kca();
            self.calculate_kcl();
        }
    }

    /// Calculate the age as if no interference corrections applied
    pub fn calculate_no_interference(&mut self) {
        self.calculate_decay_factors();
        self.compute_age(&InterferenceCorrections::default());
    }

    /// Recompute the age values from the current F, calculating F if required
    pub fn recalculate_age(&mut self) {
        if self.derived.uf.is_none() {
            self.calculate_f();
        }
        if let Some(f) = self.derived.uf.clone() {
            let f_wo_irrad = self.derived.f_wo_irrad.clone().unwrap_or_else(|| f.clone());
            self.set_age_values(&f, &f_wo_irrad);
        }
    }

    /// The J value of a monitor of known age, in years, from its F value
    #[must_use]
    pub fn model_j(&self, monitor_age: &UFloat, lambda_k: &UFloat) -> Option<UFloat> {
        self.derived
            .uf
            .as_ref()
            .map(|f| calculate_flux(f, monitor_age, lambda_k))
    }

    fn assemble_ar_ar_isotopes(&mut self) -> Option<[UFloat; 5]> {
        if let Some(missing) = ARGON_KEYS
            .iter()
            .find(|key| !self.isotopes.contains_key(**key))
        {
            if !self.missing_isotope_warned {
                warn!(
                    "{}: no isotope \"{missing}\", required for age calculation",
                    self.identifier
                );
            }
            self.missing_isotope_warned = true;
            return None;
        }
        self.missing_isotope_warned = false;

        Some(ARGON_KEYS.map(|key| self.isotopes[key].intensity()))
    }

    fn assemble_isotope_intensities(&mut self) -> Option<[UFloat; 5]> {
        let Some(intensities) = self.assemble_ar_ar_isotopes() else {
            debug!("{}: failed assembling isotopes", self.identifier);
            return None;
        };

        let [a40, a39, a38, a37, a36] = abundance_sensitivity_correction(
            &intensities,
            self.arar_constants.abundance_sensitivity,
        );

        // all m/z 39 and 37 is assumed to be radioactive argon
        Some([
            a40,
            a39 * self.ar39_decay_factor,
            a38,
            a37 * self.ar37_decay_factor,
            a36,
        ])
    }

    fn compute_f(
        &mut self,
        intensities: &[UFloat; 5],
        interferences: &InterferenceCorrections,
    ) -> FCalculation {
        let calculation = calculate_f(
            intensities,
            self.decay_days(),
            interferences,
            &self.arar_constants,
            self.fixed_k3739.as_ref(),
        );
        self.derived.uf = Some(calculation.f.clone());
        self.derived.f_wo_irrad = Some(calculation.f_wo_irrad.clone());
        calculation
    }

    fn compute_age(&mut self, interferences: &InterferenceCorrections) {
        let Some(intensities) = self.assemble_isotope_intensities() else {
            return;
        };

        for (key, value) in ["Ar39", "Ar37"]
            .into_iter()
            .zip([&intensities[1], &intensities[3]])
        {
            if let Some(isotope) = self.isotopes.get_mut(key) {
                isotope.decay_corrected = Some(value.clone());
            }
        }
        self.derived.corrected_intensities = ARGON_KEYS
            .iter()
            .zip(&intensities)
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect();

        let calculation = self.compute_f(&intensities, interferences);

        for (key, value) in &calculation.interference_corrected {
            if let Some(isotope) = self.isotopes.get_mut(key) {
                isotope.interference_corrected_value = Some(value.clone());
            }
        }
        self.derived.non_ar_isotopes = calculation.non_ar_isotopes;
        self.derived.computed = calculation.computed;

        self.set_age_values(&calculation.f, &calculation.f_wo_irrad);
    }

    fn set_age_values(&mut self, f: &UFloat, f_wo_irrad: &UFloat) {
        let j = self
            .j
            .clone()
            .unwrap_or_else(|| UFloat::tagged(1e-4, 1e-7, "J"));
        let constants = &self.arar_constants;

        let uage_w_j_err = age_equation(&j, f, constants);
        let uage = age_equation(&j.without_error(), f, constants);
        let age_wo_irrad = age_equation(&j.without_error(), f_wo_irrad, constants);

        self.derived.uage_wo_j_err = Some(uage.decorrelated());
        self.derived.age_err_wo_irrad = age_wo_irrad.std_dev();
        self.derived.uage = Some(uage);
        self.derived.uage_w_j_err = Some(uage_w_j_err);

        let components = self
            .isotopes
            .keys()
            .map(|name| (name.clone(), self.get_error_component(name)))
            .collect::<Vec<_>>();
        for (name, component) in components {
            if let Some(isotope) = self.isotopes.get_mut(&name) {
                isotope.age_error_component = component;
            }
        }
        self.revision += 1;
    }

    fn calculate_kca(&mut self) {
        let k = self.get_computed_value("k39");
        let ca = self.get_non_ar_isotope("ca37");
        let factor = self.production_ratios.k_ca_factor();
        self.derived.kca = if let Some(ratio) = k.checked_div(&ca) {
            ratio * factor
        } else {
            if !self.kca_warned {
                self.kca_warned = true;
                debug!("{}: ca37 is zero. can't calculate k/ca", self.identifier);
            }
            UFloat::zero()
        };
    }

    fn calculate_kcl(&mut self) {
        let k = self.get_computed_value("k39");
        let cl = self.get_non_ar_isotope("cl38");
        let factor = self.production_ratios.k_cl_factor();
        self.derived.kcl = if let Some(ratio) = k.checked_div(&cl) {
            ratio * factor
        } else {
            if !self.kcl_warned {
                self.kcl_warned = true;
                warn!("{}: cl38 is zero. can't calculate k/cl", self.identifier);
            }
            UFloat::zero()
        };
    }

    /// Percentage of the age variance (including J) contributed by sources tagged `tag`
    #[must_use]
    pub fn get_error_component(&self, tag: &str) -> f64 {
        self.derived.uage_w_j_err.as_ref().map_or(0.0, |uage| {
            let total = uage.std_dev();
            if total == 0.0 {
                0.0
            } else {
                uage.error_component(tag).powi(2) / total.powi(2) * 100.0
            }
        })
    }

    pub fn set_temporary_ic_factor(&mut self, detector: &str, value: f64, error: f64) -> UFloat {
        let factor = UFloat::tagged(value, error, format!("{detector} IC"));
        self.temporary_ic_factors
            .insert(detector.to_owned(), factor.clone());
        factor
    }

    /// Evaluate a blank without replacing the stored one
    ///
    /// Values within tolerance of the current temporary blank are ignored.
    pub fn set_temporary_blank(&mut self, isotope: &str, value: f64, error: f64, fit: &str) {
        let Some(iso) = self.isotopes.get_mut(isotope) else {
            return;
        };
        if let Some(current) = &iso.temporary_blank {
            if (current.value - value).abs() < TEMPORARY_BLANK_TOLERANCE
                && (current.error - error).abs() < TEMPORARY_BLANK_TOLERANCE
            {
                return;
            }
        }
        debug!("temp blank {isotope}({value:0.4}+/-{error:0.4}) fit={fit}");
        iso.temporary_blank = Some(Blank {
            value,
            error,
            fit: fit.to_owned(),
        });
        self.invalidate();
    }

    #[must_use]
    pub fn get_corrected_ratio(&self, numerator: &str, denominator: &str) -> Option<UFloat> {
        let n = self.isotopes.get(numerator)?.interference_corrected_value();
        let d = self.isotopes.get(denominator)?.interference_corrected_value();
        n.checked_div(&d)
    }

    #[must_use]
    pub fn get_ratio(&self, numerator: &str, denominator: &str, non_ic_corr: bool) -> Option<UFloat> {
        let value = |iso: &Isotope| {
            if non_ic_corr {
                iso.non_detector_corrected_value()
            } else {
                iso.intensity()
            }
        };
        let n = value(self.isotopes.get(numerator)?);
        let d = value(self.isotopes.get(denominator)?);
        n.checked_div(&d)
    }

    #[must_use]
    pub fn get_interference_corrected_value(&self, isotope: &str) -> UFloat {
        self.isotopes.get(isotope).map_or_else(
            || UFloat::tagged(0.0, 0.0, isotope),
            Isotope::interference_corrected_value,
        )
    }

    #[must_use]
    pub fn isochron3940(&self) -> UFloat {
        self.get_interference_corrected_value("Ar39")
            .checked_div(&self.get_interference_corrected_value("Ar40"))
            .unwrap_or_else(UFloat::zero)
    }

    #[must_use]
    pub fn isochron3640(&self) -> UFloat {
        self.get_interference_corrected_value("Ar36")
            .checked_div(&self.get_interference_corrected_value("Ar40"))
            .unwrap_or_else(UFloat::zero)
    }

    #[must_use]
    pub fn get_non_ar_isotope(&self, key: &str) -> UFloat {
        zero_if_missing(self.derived.non_ar_isotopes.get(key))
    }

    #[must_use]
    pub fn get_computed_value(&self, key: &str) -> UFloat {
        zero_if_missing(self.derived.computed.get(key))
    }

    #[must_use]
    pub const fn uf(&self) -> Option<&UFloat> {
        self.derived.uf.as_ref()
    }

    #[must_use]
    pub const fn uage(&self) -> Option<&UFloat> {
        self.derived.uage.as_ref()
    }

    #[must_use]
    pub const fn uage_w_j_err(&self) -> Option<&UFloat> {
        self.derived.uage_w_j_err.as_ref()
    }

    #[must_use]
    pub const fn uage_wo_j_err(&self) -> Option<&UFloat> {
        self.derived.uage_wo_j_err.as_ref()
    }

    #[must_use]
    pub const fn age_err_wo_irrad(&self) -> f64 {
        self.derived.age_err_wo_irrad
    }

    #[must_use]
    pub const fn kca(&self) -> &UFloat {
        &self.derived.kca
    }

    #[must_use]
    pub const fn kcl(&self) -> &UFloat {
        &self.derived.kcl
    }

    #[must_use]
    pub fn corrected_intensity(&self, isotope: &str) -> UFloat {
        zero_if_missing(self.derived.corrected_intensities.get(isotope))
    }

    #[must_use]
    pub fn k39(&self) -> UFloat {
        self.get_computed_value("k39")
    }

    #[must_use]
    pub fn signal_k39(&self) -> UFloat {
        self.k39()
    }

    #[must_use]
    pub fn moles_k39(&self) -> UFloat {
        self.k39() * self.sensitivity
    }

    #[must_use]
    pub fn moles_ar40(&self) -> UFloat {
        self.isotopes
            .get("Ar40")
            .map_or_else(UFloat::zero, |iso| iso.intensity() * self.sensitivity)
    }

    /// Weight percent K2O, requires the sample weight
    #[must_use]
    pub fn k2o(&self) -> Option<UFloat> {
        const K40_K: f64 = 0.000_116_7;
        const MW_K2O: f64 = 94.2;
        if self.weight == 0.0 {
            return None;
        }
        let moles_k = self.get_non_ar_isotope("k40") / K40_K * self.sensitivity;
        Some(moles_k * MW_K2O * 100.0 / (2.0 * self.weight * 0.001))
    }

    fn ic_factor(&self, isotope: &Isotope) -> UFloat {
        self.temporary_ic_factors
            .get(&isotope.detector)
            .cloned()
            .unwrap_or_else(|| isotope.ic_factor.clone())
    }

    fn detector_ratio(&self, numerator: &str, denominator: &str) -> Option<UFloat> {
        let signal = |detector: &str| {
            self.isotopes
                .values()
                .find(|iso| iso.detector == detector)
                .map(Isotope::non_detector_corrected_value)
        };
        signal(numerator)?.checked_div(&signal(denominator)?)
    }

    fn named_value(&self, name: &str) -> Option<UFloat> {
        match name {
            "age" | "uage" => self.derived.uage.clone(),
            "kca" => Some(self.derived.kca.clone()),
            "kcl" => Some(self.derived.kcl.clone()),
            "cak" => UFloat::exact(1.0).checked_div(&self.derived.kca),
            "moles_k39" => Some(self.moles_k39()),
            "signal_k39" => Some(self.signal_k39()),
            "moles_Ar40" => Some(self.moles_ar40()),
            "total40" => Some(self.get_computed_value("a40")),
            "isochron3940" => Some(self.isochron3940()),
            "isochron3640" => Some(self.isochron3640()),
            "j" | "J" => self.j.clone(),
            "F" => self.derived.uf.clone(),
            "k2o" => self.k2o(),
            _ => None,
        }
    }
}

impl Analysis for ArArAge {
    fn get_value(&self, attr: &str) -> UFloat {
        let value = match AttrQuery::parse(attr) {
            AttrQuery::Baseline(isotope) => self.isotopes.get(isotope).map(|i| i.baseline.clone()),
            AttrQuery::AgeOrF(name) => match name {
                "uage_wo_j_err" => self.derived.uage_wo_j_err.clone(),
                "uage_w_j_err" => self.derived.uage_w_j_err.clone(),
                _ => self.derived.uf.clone(),
            },
            AttrQuery::Ratio {
                numerator,
                denominator,
            } => self.get_ratio(numerator, denominator, true),
            AttrQuery::CorrectedRatio4036 => self.get_corrected_ratio("Ar40", "Ar36"),
            AttrQuery::IcFactor(isotope) => self.isotopes.get(isotope).map(|i| self.ic_factor(i)),
            AttrQuery::DetectorRatio {
                numerator,
                denominator,
            } => self.detector_ratio(numerator, denominator),
            AttrQuery::Unresolvable => None,
            AttrQuery::Direct(name) => self
                .derived
                .computed
                .get(name)
                .cloned()
                .or_else(|| self.isotopes.get(name).map(Isotope::intensity))
                .or_else(|| self.named_value(name)),
        };
        value.unwrap_or_else(UFloat::zero)
    }

    fn is_omitted(&self) -> bool {
        self.omitted
    }

    fn set_omitted(&mut self, omitted: bool) {
        if self.omitted != omitted {
            self.omitted = omitted;
            self.revision += 1;
        }
    }

    fn revision(&self) -> u64 {
        self.revision
    }

    fn aliquot(&self) -> u32 {
        self.aliquot
    }

    fn identifier(&self) -> String {
        self.identifier.clone()
    }

    fn sample(&self) -> String {
        self.sample.clone()
    }

    fn irradiation_position(&self) -> usize {
        self.irradiation_position
    }

    fn j(&self) -> Option<UFloat> {
        self.j.clone()
    }

    fn arar_constants(&self) -> ArArConstants {
        self.arar_constants.clone()
    }

    fn production_ratios(&self) -> ProductionRatios {
        self.production_ratios
    }

    fn computed_value(&self, key: &str) -> UFloat {
        self.get_computed_value(key)
    }

    fn non_ar_isotope(&self, key: &str) -> UFloat {
        self.get_non_ar_isotope(key)
    }

    fn subgroup(&self) -> Option<SubgroupId> {
        self.subgroup
    }

    fn set_subgroup(&mut self, subgroup: Option<SubgroupId>) {
        self.subgroup = subgroup;
    }

    fn age(&self) -> f64 {
        self.derived.uage.as_ref().map_or(0.0, UFloat::nominal_value)
    }

    fn age_err(&self) -> f64 {
        self.derived.uage.as_ref().map_or(0.0, UFloat::std_dev)
    }

    fn isochron_ratios(&self) -> Option<(UFloat, UFloat)> {
        Some((self.isochron3940(), self.isochron3640()))
    }

    fn moles_k39(&self) -> UFloat {
        Self::moles_k39(self)
    }
}
