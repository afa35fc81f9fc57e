use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::stats::ErrorKind;
use crate::{Error, UFloat};

/// The estimators a preferred value can be derived with
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum PreferredKind {
    #[serde(rename = "Plateau else Weighted Mean")]
    PlateauElseWeightedMean,
    #[serde(rename = "Weighted Mean")]
    WeightedMean,
    #[serde(rename = "Total Integrated", alias = "Integrated")]
    TotalIntegrated,
    #[serde(rename = "Valid Integrated")]
    ValidIntegrated,
    #[serde(rename = "Plateau Integrated")]
    PlateauIntegrated,
    #[serde(rename = "Arithmetic Mean")]
    ArithmeticMean,
    Plateau,
    Isochron,
}

impl PreferredKind {
    pub const ALL: [Self; 8] = [
        Self::PlateauElseWeightedMean,
        Self::WeightedMean,
        Self::TotalIntegrated,
        Self::ValidIntegrated,
        Self::PlateauIntegrated,
        Self::ArithmeticMean,
        Self::Plateau,
        Self::Isochron,
    ];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::PlateauElseWeightedMean => "Plateau else Weighted Mean",
            Self::WeightedMean => "Weighted Mean",
            Self::TotalIntegrated => "Total Integrated",
            Self::ValidIntegrated => "Valid Integrated",
            Self::PlateauIntegrated => "Plateau Integrated",
            Self::ArithmeticMean => "Arithmetic Mean",
            Self::Plateau => "Plateau",
            Self::Isochron => "Isochron",
        }
    }

    /// Kinds that only make sense for ages
    #[must_use]
    pub const fn is_age_only(self) -> bool {
        matches!(
            self,
            Self::Plateau | Self::Isochron | Self::PlateauElseWeightedMean
        )
    }

    /// Kinds with no scatter to expand, which always report a standard deviation
    #[must_use]
    pub const fn forces_sd(self) -> bool {
        matches!(
            self,
            Self::ArithmeticMean
                | Self::TotalIntegrated
                | Self::ValidIntegrated
                | Self::PlateauIntegrated
        )
    }

    #[must_use]
    pub const fn is_integrated(self) -> bool {
        matches!(
            self,
            Self::TotalIntegrated | Self::ValidIntegrated | Self::PlateauIntegrated
        )
    }
}

impl fmt::Display for PreferredKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for PreferredKind {
    type Err = Error;

    /// Parse a kind label, ignoring case and treating spaces and underscores alike
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalised = s.trim().to_lowercase().replace(' ', "_");
        match normalised.as_str() {
            "plateau_else_weighted_mean" => Ok(Self::PlateauElseWeightedMean),
            "weighted_mean" | "wt._mean" => Ok(Self::WeightedMean),
            "total_integrated" | "integrated" => Ok(Self::TotalIntegrated),
            "valid_integrated" => Ok(Self::ValidIntegrated),
            "plateau_integrated" => Ok(Self::PlateauIntegrated),
            "arithmetic_mean" => Ok(Self::ArithmeticMean),
            "plateau" => Ok(Self::Plateau),
            "isochron" => Ok(Self::Isochron),
            _ => Err(Error::UnknownPreferredKind(s.to_owned())),
        }
    }
}

/// Attributes an interpreted age carries a preferred value for
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PreferredAttr {
    Age,
    Kca,
    Kcl,
    Rad40Percent,
    MolesK39,
    SignalK39,
}

impl PreferredAttr {
    pub const ALL: [Self; 6] = [
        Self::Age,
        Self::Kca,
        Self::Kcl,
        Self::Rad40Percent,
        Self::MolesK39,
        Self::SignalK39,
    ];

    /// The attribute name understood by `Analysis::get_value`
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Age => "age",
            Self::Kca => "kca",
            Self::Kcl => "kcl",
            Self::Rad40Percent => "rad40_percent",
            Self::MolesK39 => "moles_k39",
            Self::SignalK39 => "signal_k39",
        }
    }

    /// Display name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Age => "Age",
            Self::Kca => "K/Ca",
            Self::Kcl => "K/Cl",
            Self::Rad40Percent => "%40Ar*",
            Self::MolesK39 => "Mol 39K",
            Self::SignalK39 => "Signal 39K",
        }
    }
}

impl FromStr for PreferredAttr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|attr| attr.key() == s)
            .ok_or_else(|| Error::UnknownPreferredAttr(s.to_owned()))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
/// The value chosen to represent one attribute of an interpreted age
pub struct PreferredValue {
    pub attr: PreferredAttr,
    pub kind: PreferredKind,
    pub error_kind: ErrorKind,
    pub value: f64,
    pub error: f64,
}

impl PreferredValue {
    #[must_use]
    pub const fn new(attr: PreferredAttr) -> Self {
        Self {
            attr,
            kind: PreferredKind::WeightedMean,
            error_kind: ErrorKind::Msem,
            value: 0.0,
            error: 0.0,
        }
    }

    #[must_use]
    pub fn uvalue(&self) -> UFloat {
        UFloat::new(self.value, self.error)
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.attr.name()
    }

    /// Update the kind and error kind, validating the combination
    ///
    /// # Errors
    /// Returns an error if `kind` is only defined for ages and this is not the age
    pub fn set_kind(&mut self, kind: PreferredKind, error_kind: ErrorKind) -> crate::Result<()> {
        if kind.is_age_only() && self.attr != PreferredAttr::Age {
            return Err(Error::UnsupportedPreferredKind {
                attr: self.attr.key().to_owned(),
                kind: kind.label().to_owned(),
            });
        }
        self.kind = kind;
        self.error_kind = if kind.forces_sd() {
            ErrorKind::Sd
        } else {
            error_kind
        };
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PreferredValueTable {
    values: Vec<PreferredValue>,
}

impl Default for PreferredValueTable {
    fn default() -> Self {
        Self {
            values: PreferredAttr::ALL.map(PreferredValue::new).to_vec(),
        }
    }
}

impl PreferredValueTable {
    #[must_use]
    pub fn get(&self, attr: PreferredAttr) -> &PreferredValue {
        &self.values[Self::position(attr)]
    }

    pub fn get_mut(&mut self, attr: PreferredAttr) -> &mut PreferredValue {
        &mut self.values[Self::position(attr)]
    }

    pub fn iter(&self) -> impl Iterator<Item = &PreferredValue> {
        self.values.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PreferredValue> {
        self.values.iter_mut()
    }

    fn position(attr: PreferredAttr) -> usize {
        PreferredAttr::ALL
            .iter()
            .position(|a| *a == attr)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use crate::stats::ErrorKind;
    use crate::Error;

    use super::{PreferredAttr, PreferredKind, PreferredValue, PreferredValueTable};

    #[test]
    fn kinds_parse_from_labels_and_aliases() {
        for kind in PreferredKind::ALL {
            assert_eq!(kind.label().parse::<PreferredKind>().unwrap(), kind);
        }
        assert_eq!(
            "Integrated".parse::<PreferredKind>().unwrap(),
            PreferredKind::TotalIntegrated
        );
        assert_eq!(
            "Wt. Mean".parse::<PreferredKind>().unwrap(),
            PreferredKind::WeightedMean
        );
        assert_eq!(
            "plateau_else_weighted_mean".parse::<PreferredKind>().unwrap(),
            PreferredKind::PlateauElseWeightedMean
        );
    }

    #[test]
    fn unknown_kinds_are_rejected() {
        assert!(matches!(
            "Weighted Maen".parse::<PreferredKind>(),
            Err(Error::UnknownPreferredKind(_))
        ));
    }

    #[test]
    fn integrated_and_arithmetic_kinds_force_sd() {
        let mut value = PreferredValue::new(PreferredAttr::Kca);
        value
            .set_kind(PreferredKind::ArithmeticMean, ErrorKind::Msem)
            .unwrap();
        assert_eq!(value.error_kind, ErrorKind::Sd);

        value
            .set_kind(PreferredKind::WeightedMean, ErrorKind::Sem)
            .unwrap();
        assert_eq!(value.error_kind, ErrorKind::Sem);
    }

    #[test]
    fn age_only_kinds_are_rejected_for_other_attributes() {
        let mut value = PreferredValue::new(PreferredAttr::Kcl);
        assert!(value
            .set_kind(PreferredKind::Isochron, ErrorKind::Sem)
            .is_err());
        assert_eq!(value.kind, PreferredKind::WeightedMean);

        let mut age = PreferredValue::new(PreferredAttr::Age);
        assert!(age.set_kind(PreferredKind::Plateau, ErrorKind::Sem).is_ok());
    }

    #[test]
    fn table_holds_one_value_per_attribute() {
        let table = PreferredValueTable::default();
        assert_eq!(table.iter().count(), PreferredAttr::ALL.len());
        for attr in PreferredAttr::ALL {
            assert_eq!(table.get(attr).attr, attr);
            assert_eq!(attr.key().parse::<PreferredAttr>().unwrap(), attr);
        }
    }
}
