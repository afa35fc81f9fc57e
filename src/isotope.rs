use num_traits::Zero;

use crate::UFloat;

#[derive(Clone, Debug, Default)]
/// A blank measurement subtracted from an isotope signal
pub struct Blank {
    pub value: f64,
    pub error: f64,
    pub fit: String,
}

impl Blank {
    #[must_use]
    pub fn uvalue(&self, name: &str) -> UFloat {
        UFloat::tagged(self.value, self.error, format!("{name} blank"))
    }
}

#[derive(Clone, Debug)]
/// A single measured isotope of an analysis
pub struct Isotope {
    pub name: String,
    pub detector: String,
    /// Regressed intercept of the raw signal
    pub value: UFloat,
    pub baseline: UFloat,
    pub blank: UFloat,
    /// Blank under evaluation, used in place of `blank` while set
    pub temporary_blank: Option<Blank>,
    pub ic_factor: UFloat,
    pub interference_corrected_value: Option<UFloat>,
    pub decay_corrected: Option<UFloat>,
    /// Percentage of the age variance attributable to this isotope
    pub age_error_component: f64,
}

impl Isotope {
    /// Create an isotope measured on `detector` with no baseline, blank or ic correction
    #[must_use]
    pub fn new(name: &str, detector: &str, value: f64, error: f64) -> Self {
        Self {
            name: name.to_owned(),
            detector: detector.to_owned(),
            value: UFloat::tagged(value, error, name),
            baseline: UFloat::zero(),
            blank: UFloat::zero(),
            temporary_blank: None,
            ic_factor: UFloat::exact(1.0),
            interference_corrected_value: None,
            decay_corrected: None,
            age_error_component: 0.0,
        }
    }

    #[must_use]
    pub fn with_baseline(mut self, value: f64, error: f64) -> Self {
        self.baseline = UFloat::tagged(value, error, format!("{} baseline", self.name));
        self
    }

    #[must_use]
    pub fn with_blank(mut self, value: f64, error: f64) -> Self {
        self.blank = UFloat::tagged(value, error, format!("{} blank", self.name));
        self
    }

    #[must_use]
    pub fn with_ic_factor(mut self, value: f64, error: f64) -> Self {
        self.ic_factor = UFloat::tagged(value, error, format!("{} IC", self.detector));
        self
    }

    fn effective_blank(&self) -> UFloat {
        self.temporary_blank
            .as_ref()
            .map_or_else(|| self.blank.clone(), |b| b.uvalue(&self.name))
    }

    #[must_use]
    pub fn baseline_corrected_value(&self) -> UFloat {
        &self.value - &self.baseline
    }

    /// Baseline and blank corrected signal before detector inter-calibration
    #[must_use]
    pub fn non_detector_corrected_value(&self) -> UFloat {
        self.baseline_corrected_value() - self.effective_blank()
    }

    /// Fully corrected intensity used by the age calculation
    #[must_use]
    pub fn intensity(&self) -> UFloat {
        self.non_detector_corrected_value() * &self.ic_factor
    }

    #[must_use]
    pub fn interference_corrected_value(&self) -> UFloat {
        self.interference_corrected_value
            .clone()
            .unwrap_or_else(|| self.intensity())
    }
}
