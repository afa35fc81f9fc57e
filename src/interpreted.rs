use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use itertools::Itertools;
use num_traits::Zero;

use crate::analysis::{Analysis, SharedAnalysis, SubgroupId};
use crate::constants::{ArArConstants, ProductionRatios};
use crate::group::{AnalysisGroup, IntegratedSubset};
use crate::plateau::PlateauOptions;
use crate::preferred::{PreferredAttr, PreferredKind, PreferredValue, PreferredValueTable};
use crate::stats::ErrorKind;
use crate::subgrouping::SubgroupInfo;
use crate::UFloat;

/// A step heat group reduced to one preferred value per attribute
///
/// Implements `Analysis`, so an interpreted age can itself be a member of a group. Preferred
/// values are recomputed whenever a kind changes, and on read once the underlying group has
/// changed.
pub struct InterpretedAgeGroup {
    group: AnalysisGroup,
    preferred_values: RefCell<PreferredValueTable>,
    computed: Cell<Option<u64>>,
    pub name: String,
    pub label_name: String,
    pub record_id: String,
    pub use_interpreted_age: bool,
    omitted: bool,
    revision: u64,
    subgroup: Option<SubgroupId>,
}

impl InterpretedAgeGroup {
    #[must_use]
    pub fn new(analyses: Vec<SharedAnalysis>, plateau_options: PlateauOptions) -> Self {
        let group = AnalysisGroup::step_heat(analyses, plateau_options);
        let name = if group.total_n() == 0 {
            String::new()
        } else {
            format!("{:02}", group.aliquot())
        };
        Self {
            group,
            preferred_values: RefCell::new(PreferredValueTable::default()),
            computed: Cell::new(None),
            name,
            label_name: String::new(),
            record_id: String::new(),
            use_interpreted_age: true,
            omitted: false,
            revision: 0,
            subgroup: None,
        }
    }

    #[must_use]
    pub const fn group(&self) -> &AnalysisGroup {
        &self.group
    }

    pub fn group_mut(&mut self) -> &mut AnalysisGroup {
        &mut self.group
    }

    #[must_use]
    pub fn aliquot(&self) -> u32 {
        self.group.aliquot()
    }

    /// Choose how `attr` is derived and recompute its preferred value
    ///
    /// For the age the error kind also becomes the plateau and isochron error kind.
    ///
    /// # Errors
    /// Returns an error if `kind` is only defined for ages and `attr` is not the age
    pub fn set_preferred_kind(
        &mut self,
        attr: PreferredAttr,
        kind: PreferredKind,
        error_kind: ErrorKind,
    ) -> crate::Result<()> {
        self.apply_kind(attr, kind, error_kind)?;
        self.recompute();
        Ok(())
    }

    /// # Errors
    /// See `set_preferred_kind`
    pub fn set_preferred_age(
        &mut self,
        kind: PreferredKind,
        error_kind: ErrorKind,
    ) -> crate::Result<()> {
        self.set_preferred_kind(PreferredAttr::Age, kind, error_kind)
    }

    /// Reset every preferred kind from a subgroup description, or to the defaults
    ///
    /// The age defaults to a weighted mean with MSEM. Other attributes default to a weighted
    /// mean with MSEM when the group spans several aliquots, and to the total integrated
    /// value with SD otherwise.
    ///
    /// # Errors
    /// Returns an error if the subgroup pairs an attribute with a kind only defined for ages
    pub fn set_preferred_kinds(&mut self, subgroup: Option<&SubgroupInfo>) -> crate::Result<()> {
        let naliquots = self
            .group
            .analyses()
            .iter()
            .map(|a| a.borrow().aliquot())
            .unique()
            .count();

        for attr in PreferredAttr::ALL {
            let default = if attr == PreferredAttr::Age || naliquots > 1 {
                (PreferredKind::WeightedMean, ErrorKind::Msem)
            } else {
                (PreferredKind::TotalIntegrated, ErrorKind::Sd)
            };
            let (kind, mut error_kind) = subgroup
                .and_then(|sg| sg.overrides.get(&attr).copied())
                .unwrap_or(default);
            if attr == PreferredAttr::Age {
                if let Some(kind) = subgroup.and_then(|sg| sg.error_kind) {
                    error_kind = kind;
                }
            }
            self.apply_kind(attr, kind, error_kind)?;
        }
        self.recompute();
        Ok(())
    }

    fn apply_kind(
        &mut self,
        attr: PreferredAttr,
        kind: PreferredKind,
        error_kind: ErrorKind,
    ) -> crate::Result<()> {
        let table = self.preferred_values.get_mut();
        let value = table.get_mut(attr);
        value.set_kind(kind, error_kind)?;
        let error_kind = value.error_kind;

        self.group.set_error_kind(attr, error_kind);
        if attr == PreferredAttr::Age {
            self.group.set_plateau_age_error_kind(error_kind);
            self.group.set_isochron_age_error_kind(error_kind);
        }
        Ok(())
    }

    #[must_use]
    pub fn get_preferred_kind(&self, attr: PreferredAttr) -> PreferredKind {
        self.preferred_values.borrow().get(attr).kind
    }

    #[must_use]
    pub fn get_preferred_value(&self, attr: PreferredAttr) -> PreferredValue {
        self.refresh();
        self.preferred_values.borrow().get(attr).clone()
    }

    /// Every preferred value, current with the group
    #[must_use]
    pub fn preferred_values(&self) -> Vec<PreferredValue> {
        self.refresh();
        self.preferred_values.borrow().iter().cloned().collect()
    }

    fn refresh(&self) {
        if self.computed.get() != Some(self.group.token()) {
            self.recompute();
        }
    }

    fn recompute(&self) {
        let kinds = self
            .preferred_values
            .borrow()
            .iter()
            .map(|pv| (pv.attr, pv.kind, pv.error_kind))
            .collect::<Vec<_>>();
        let values = kinds
            .into_iter()
            .map(|(attr, kind, error_kind)| (attr, self.calculate_preferred(attr, kind, error_kind)))
            .collect::<Vec<_>>();

        let mut table = self.preferred_values.borrow_mut();
        for (attr, value) in values {
            let pv = table.get_mut(attr);
            pv.value = value.nominal_value();
            pv.error = value.std_dev();
        }
        self.computed.set(Some(self.group.token()));
    }

    /// The value of `attr` derived as `kind`
    #[must_use]
    pub fn calculate_preferred(
        &self,
        attr: PreferredAttr,
        kind: PreferredKind,
        error_kind: ErrorKind,
    ) -> UFloat {
        if attr == PreferredAttr::Age {
            return self.age_of_kind(kind);
        }
        match kind {
            PreferredKind::WeightedMean => self.group.weighted_mean(attr.key(), Some(error_kind)),
            PreferredKind::ArithmeticMean => self.group.arithmetic_mean(attr.key()),
            PreferredKind::TotalIntegrated => {
                self.group.calculate_integrated(attr, IntegratedSubset::Total)
            }
            PreferredKind::ValidIntegrated => {
                self.group.calculate_integrated(attr, IntegratedSubset::Valid)
            }
            PreferredKind::PlateauIntegrated => {
                self.group.calculate_integrated(attr, IntegratedSubset::Plateau)
            }
            PreferredKind::Plateau | PreferredKind::Isochron | PreferredKind::PlateauElseWeightedMean => {
                UFloat::zero()
            }
        }
    }

    fn age_of_kind(&self, kind: PreferredKind) -> UFloat {
        match kind {
            PreferredKind::WeightedMean => self.group.weighted_age(),
            PreferredKind::ArithmeticMean => self.group.arith_age(),
            PreferredKind::Isochron => self.group.isochron_age(),
            PreferredKind::Plateau => self.group.plateau_age(),
            PreferredKind::PlateauElseWeightedMean => self
                .group
                .plateau()
                .map_or_else(|| self.group.weighted_age(), |plateau| plateau.age),
            PreferredKind::TotalIntegrated
            | PreferredKind::ValidIntegrated
            | PreferredKind::PlateauIntegrated => self.group.integrated_age(),
        }
    }

    #[must_use]
    pub fn preferred_age(&self) -> UFloat {
        self.age_of_kind(self.get_preferred_kind(PreferredAttr::Age))
    }

    /// Preferred age in Ma
    #[must_use]
    pub fn ma_scaled_age(&self) -> UFloat {
        self.preferred_age() / self.group.age_scalar()
    }

    /// The age of `kind`, or of the preferred kind, with a short label
    #[must_use]
    pub fn get_age(&self, kind: Option<PreferredKind>) -> (UFloat, &'static str) {
        let kind = kind.unwrap_or_else(|| self.get_preferred_kind(PreferredAttr::Age));
        let label = match kind {
            PreferredKind::WeightedMean => "wt. mean",
            PreferredKind::ArithmeticMean => "arith. mean",
            PreferredKind::Plateau => "plateau",
            PreferredKind::Isochron => "isochron",
            PreferredKind::TotalIntegrated
            | PreferredKind::ValidIntegrated
            | PreferredKind::PlateauIntegrated => "integrated",
            PreferredKind::PlateauElseWeightedMean => {
                if self.group.plateau().is_some() {
                    "plateau"
                } else {
                    "wt. mean"
                }
            }
        };
        (self.age_of_kind(kind), label)
    }

    /// Nominal values and errors of every age estimator, errors keyed with an `_err` suffix
    #[must_use]
    pub fn ages(&self) -> BTreeMap<String, f64> {
        let estimators = [
            ("weighted_age", self.group.weighted_age()),
            ("plateau_age", self.group.plateau_age()),
            ("isochron_age", self.group.isochron_age()),
            ("integrated_age", self.group.integrated_age()),
        ];
        let mut ages = BTreeMap::new();
        for (key, value) in estimators {
            ages.insert(key.to_owned(), value.nominal_value());
            ages.insert(format!("{key}_err"), value.std_dev());
        }
        ages
    }

    fn plateau_preferred(&self) -> bool {
        match self.get_preferred_kind(PreferredAttr::Age) {
            PreferredKind::Plateau => true,
            PreferredKind::PlateauElseWeightedMean => self.group.plateau().is_some(),
            _ => false,
        }
    }

    #[must_use]
    pub fn get_preferred_mswd(&self) -> f64 {
        if self.get_preferred_kind(PreferredAttr::Age) == PreferredKind::Plateau {
            self.group.plateau_mswd()
        } else {
            self.group.mswd()
        }
    }

    #[must_use]
    pub fn get_preferred_mswd_tuple(&self) -> (f64, bool, usize) {
        if self.plateau_preferred() {
            self.group.get_plateau_mswd_tuple()
        } else {
            self.group.get_mswd_tuple()
        }
    }

    /// Number of analyses behind the preferred age, the plateau steps when a plateau is used
    #[must_use]
    pub fn nanalyses(&self) -> usize {
        if self.plateau_preferred() {
            self.group.nsteps()
        } else {
            self.group.nanalyses()
        }
    }

    fn preferred_uvalue(&self, attr: PreferredAttr) -> UFloat {
        self.get_preferred_value(attr).uvalue()
    }

    fn sum_clean(&self, value: impl Fn(&dyn Analysis) -> UFloat) -> UFloat {
        self.group
            .clean_analyses()
            .map(|a| value(&*a.borrow()))
            .sum()
    }
}

impl Analysis for InterpretedAgeGroup {
    fn get_value(&self, attr: &str) -> UFloat {
        match attr {
            "age" | "uage" | "uage_w_j_err" | "uage_wo_j_err" => self.preferred_age(),
            "kca" => self.preferred_uvalue(PreferredAttr::Kca),
            "kcl" => self.preferred_uvalue(PreferredAttr::Kcl),
            "rad40_percent" => self.preferred_uvalue(PreferredAttr::Rad40Percent),
            "moles_k39" => self.preferred_uvalue(PreferredAttr::MolesK39),
            "signal_k39" | "k39" => self.preferred_uvalue(PreferredAttr::SignalK39),
            "weighted_age" => self.group.weighted_age(),
            "arith_age" => self.group.arith_age(),
            "plateau_age" => self.group.plateau_age(),
            "isochron_age" => self.group.isochron_age(),
            "integrated_age" => self.group.integrated_age(),
            _ => UFloat::zero(),
        }
    }

    fn is_omitted(&self) -> bool {
        self.omitted
    }

    fn set_omitted(&mut self, omitted: bool) {
        if self.omitted != omitted {
            self.omitted = omitted;
            self.revision = self.revision.wrapping_add(1);
        }
    }

    fn revision(&self) -> u64 {
        self.revision.wrapping_add(self.group.token())
    }

    fn aliquot(&self) -> u32 {
        self.group.aliquot()
    }

    fn identifier(&self) -> String {
        self.group.identifier()
    }

    fn sample(&self) -> String {
        self.group.sample()
    }

    fn irradiation_position(&self) -> usize {
        self.group
            .analyses()
            .first()
            .map_or(0, |a| a.borrow().irradiation_position())
    }

    fn j(&self) -> Option<UFloat> {
        self.group.j()
    }

    fn arar_constants(&self) -> ArArConstants {
        self.group.arar_constants()
    }

    fn production_ratios(&self) -> ProductionRatios {
        self.group
            .analyses()
            .first()
            .map_or_else(ProductionRatios::default, |a| a.borrow().production_ratios())
    }

    fn computed_value(&self, key: &str) -> UFloat {
        self.sum_clean(|a| a.computed_value(key))
    }

    fn non_ar_isotope(&self, key: &str) -> UFloat {
        self.sum_clean(|a| a.non_ar_isotope(key))
    }

    fn subgroup(&self) -> Option<SubgroupId> {
        self.subgroup
    }

    fn set_subgroup(&mut self, subgroup: Option<SubgroupId>) {
        self.subgroup = subgroup;
    }

    fn is_interpreted(&self) -> bool {
        true
    }
}
