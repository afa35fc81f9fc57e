use std::cell::RefCell;
use std::rc::Rc;

use num_traits::Zero;

use crate::constants::{ArArConstants, ProductionRatios};
use crate::UFloat;

/// Handle to a subgroup, resolved through a `SubgroupRegistry`
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubgroupId(pub(crate) u64);

/// The interface groups aggregate over
///
/// Both single analyses and interpreted age groups implement it, so a fully aggregated group
/// can take part in a higher level aggregation as a single row.
pub trait Analysis {
    /// Look up a value by attribute name, `0 +/- 0` when the name cannot be resolved
    fn get_value(&self, attr: &str) -> UFloat;

    fn is_omitted(&self) -> bool;

    fn set_omitted(&mut self, omitted: bool);

    /// Incremented whenever a change invalidates aggregates containing this analysis
    fn revision(&self) -> u64;

    fn aliquot(&self) -> u32;

    fn identifier(&self) -> String;

    fn sample(&self) -> String;

    /// 1-based hole of the irradiation tray
    fn irradiation_position(&self) -> usize;

    fn j(&self) -> Option<UFloat>;

    fn arar_constants(&self) -> ArArConstants;

    fn production_ratios(&self) -> ProductionRatios;

    fn computed_value(&self, key: &str) -> UFloat;

    fn non_ar_isotope(&self, key: &str) -> UFloat;

    fn subgroup(&self) -> Option<SubgroupId>;

    fn set_subgroup(&mut self, subgroup: Option<SubgroupId>);

    /// Nominal age, without the J uncertainty
    fn age(&self) -> f64 {
        self.get_value("uage").nominal_value()
    }

    fn age_err(&self) -> f64 {
        self.get_value("uage").std_dev()
    }

    /// Inverse isochron coordinates (39Ar/40Ar, 36Ar/40Ar), absent for aggregates
    fn isochron_ratios(&self) -> Option<(UFloat, UFloat)> {
        None
    }

    fn moles_k39(&self) -> UFloat {
        self.get_value("moles_k39")
    }

    fn is_interpreted(&self) -> bool {
        false
    }
}

pub type SharedAnalysis = Rc<RefCell<dyn Analysis>>;

/// Wrap an analysis so it can be shared by several groups
pub fn shared<A: Analysis + 'static>(analysis: A) -> SharedAnalysis {
    Rc::new(RefCell::new(analysis))
}

pub(crate) fn zero_if_missing(value: Option<&UFloat>) -> UFloat {
    value.cloned().unwrap_or_else(UFloat::zero)
}
