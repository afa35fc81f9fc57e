/// A parsed attribute query against an analysis
///
/// Attribute names follow a small grammar, checked in order:
///
/// * `<iso>bs` the baseline of an isotope
/// * `uage_wo_j_err`, `uage_w_j_err`, `uF` age and F values
/// * `u<num>/<den>` or `u<num>_<den>` a ratio of non-ic-corrected isotope values
/// * `icf_40_36` the interference corrected 40/36 ratio
/// * `<iso>ic` the inter-calibration factor of an isotope
/// * `<num>/<den> DetIC` a ratio of the signals measured on two detectors
/// * anything else is looked up directly
///
/// # Examples
///
/// ```
/// use argon_age::attribute::AttrQuery;
///
/// assert_eq!(AttrQuery::parse("Ar40bs"), AttrQuery::Baseline("Ar40"));
/// assert_eq!(
///     AttrQuery::parse("uAr40/Ar39"),
///     AttrQuery::Ratio { numerator: "Ar40", denominator: "Ar39" }
/// );
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttrQuery<'a> {
    Baseline(&'a str),
    AgeOrF(&'a str),
    Ratio {
        numerator: &'a str,
        denominator: &'a str,
    },
    CorrectedRatio4036,
    IcFactor(&'a str),
    DetectorRatio {
        numerator: &'a str,
        denominator: &'a str,
    },
    /// A ratio-like name that could not be split into two operands
    Unresolvable,
    Direct(&'a str),
}

impl<'a> AttrQuery<'a> {
    #[must_use]
    pub fn parse(attr: &'a str) -> Self {
        if let Some(isotope) = attr.strip_suffix("bs") {
            return Self::Baseline(isotope);
        }
        if matches!(attr, "uage_wo_j_err" | "uage_w_j_err" | "uF") {
            return Self::AgeOrF(attr);
        }
        if let Some(ratio) = attr.strip_prefix('u') {
            if ratio.contains('/') || ratio.contains('_') {
                return split_ratio(ratio).map_or(Self::Unresolvable, |(numerator, denominator)| {
                    Self::Ratio {
                        numerator,
                        denominator,
                    }
                });
            }
        }
        if attr == "icf_40_36" {
            return Self::CorrectedRatio4036;
        }
        if let Some(isotope) = attr.strip_suffix("ic") {
            return Self::IcFactor(isotope);
        }
        if attr.ends_with("DetIC") {
            return attr
                .split_whitespace()
                .next()
                .and_then(|ratio| ratio.split_once('/'))
                .map_or(Self::Unresolvable, |(numerator, denominator)| {
                    Self::DetectorRatio {
                        numerator,
                        denominator,
                    }
                });
        }
        Self::Direct(attr)
    }
}

fn split_ratio(ratio: &str) -> Option<(&str, &str)> {
    ratio
        .split_once('/')
        .or_else(|| ratio.split_once('_'))
        .filter(|(n, d)| !n.is_empty() && !d.is_empty())
}
