use argon_age::analysis::{shared, SharedAnalysis};
use argon_age::arar_age::ArArAge;
use argon_age::argon::age_equation;
use argon_age::constants::ArArConstants;
use argon_age::group::AnalysisGroup;
use argon_age::interpreted::InterpretedAgeGroup;
use argon_age::isotope::Isotope;
use argon_age::plateau::PlateauOptions;
use argon_age::preferred::{PreferredAttr, PreferredKind};
use argon_age::stats::ErrorKind;
use argon_age::{Result, UFloat};

const F: f64 = 10.0;
const ATM4036: f64 = 295.5;
const J: f64 = 1e-3;

/// Radiogenic argon with an F of `f` mixed with `ar36` of atmospheric argon
fn mixture(aliquot: u32, f: f64, ar36: f64) -> SharedAnalysis {
    let ar39 = 10.0;
    let ar40 = f * ar39 + ATM4036 * ar36;
    let mut analysis = ArArAge::new("22222", aliquot)
        .with_isotope(Isotope::new("Ar40", "H1", ar40, 0.01))
        .with_isotope(Isotope::new("Ar39", "AX", ar39, 0.01))
        .with_isotope(Isotope::new("Ar38", "L1", 0.0, 0.0))
        .with_isotope(Isotope::new("Ar37", "L2", 0.0, 0.0))
        .with_isotope(Isotope::new("Ar36", "CDD", ar36, 1e-5));
    analysis.set_j(J, 1e-6);
    analysis.calculate_age(false);
    shared(analysis)
}

fn mixing_line() -> Vec<SharedAnalysis> {
    [0.005, 0.01, 0.02, 0.04, 0.08]
        .into_iter()
        .zip(1..)
        .map(|(ar36, aliquot)| mixture(aliquot, F, ar36))
        .collect()
}

fn expected_age() -> f64 {
    age_equation(
        &UFloat::exact(J),
        &UFloat::exact(F),
        &ArArConstants::default(),
    )
    .nominal_value()
}

#[test]
fn isochron_recovers_radiogenic_age_and_trapped_argon() {
    let group = AnalysisGroup::new(mixing_line());

    let result = group.isochron().unwrap();
    assert_eq!(result.regression.n, 5);
    approx::assert_relative_eq!(group.isochron_age().nominal_value(), expected_age(), max_relative = 1e-6);
    approx::assert_relative_eq!(
        group.isochron_4036().unwrap().nominal_value(),
        ATM4036,
        max_relative = 1e-6
    );
    assert!(result.regression.mswd < 1e-6);
}

#[test]
fn omitted_analyses_are_left_out_of_the_isochron() {
    let mut analyses = mixing_line();
    let outlier = mixture(6, 1.3 * F, 0.03);
    analyses.insert(2, outlier.clone());
    let group = AnalysisGroup::new(analyses);

    let skewed = group.isochron_age().nominal_value();
    assert!((skewed - expected_age()).abs() / expected_age() > 1e-4);

    outlier.borrow_mut().set_omitted(true);

    let result = group.isochron().unwrap();
    assert_eq!(result.regression.n, 5);
    approx::assert_relative_eq!(group.isochron_age().nominal_value(), expected_age(), max_relative = 1e-6);
}

#[test]
fn j_error_widens_the_isochron_age() {
    let mut group = AnalysisGroup::new(mixing_line());
    let with_j = group.isochron_age();

    group.set_include_j_error_in_mean(false);
    let without_j = group.isochron_age();

    approx::assert_relative_eq!(with_j.nominal_value(), without_j.nominal_value());
    assert!(without_j.std_dev() > 0.0);
    assert!(with_j.std_dev() > without_j.std_dev());
}

#[test]
fn preferred_isochron_matches_the_group_isochron() -> Result<()> {
    let mut interpreted = InterpretedAgeGroup::new(mixing_line(), PlateauOptions::default());
    interpreted.set_preferred_kind(PreferredAttr::Age, PreferredKind::Isochron, ErrorKind::Msem)?;

    let preferred = interpreted.preferred_age();
    let isochron = interpreted.group().isochron_age();
    approx::assert_relative_eq!(preferred.nominal_value(), isochron.nominal_value());
    approx::assert_relative_eq!(preferred.std_dev(), isochron.std_dev());
    approx::assert_relative_eq!(preferred.nominal_value(), expected_age(), max_relative = 1e-6);

    let (age, label) = interpreted.get_age(None);
    assert_eq!(label, "isochron");
    approx::assert_relative_eq!(age.nominal_value(), isochron.nominal_value());
    Ok(())
}
