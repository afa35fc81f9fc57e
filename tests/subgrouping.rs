use argon_age::analysis::{shared, SharedAnalysis};
use argon_age::arar_age::ArArAge;
use argon_age::isotope::Isotope;
use argon_age::plateau::PlateauOptions;
use argon_age::preferred::{PreferredAttr, PreferredKind};
use argon_age::stats::ErrorKind;
use argon_age::subgrouping::{
    apply_subgrouping, compress_groups, make_interpreted_age_subgroups, SubgroupInfo,
    SubgroupRegistry,
};
use argon_age::Result;

fn analysis(aliquot: u32, f: f64) -> SharedAnalysis {
    let ar39 = 10.0;
    let mut analysis = ArArAge::new("66000", aliquot)
        .with_isotope(Isotope::new("Ar40", "H1", f * ar39, 0.01 * ar39))
        .with_isotope(Isotope::new("Ar39", "AX", ar39, 0.01))
        .with_isotope(Isotope::new("Ar38", "L1", 0.0, 0.0))
        .with_isotope(Isotope::new("Ar37", "L2", 0.0, 0.0))
        .with_isotope(Isotope::new("Ar36", "CDD", 0.0, 0.0));
    analysis.set_j(1e-3, 1e-6);
    analysis.calculate_age(false);
    shared(analysis)
}

fn names(registry: &SubgroupRegistry, items: &[SharedAnalysis]) -> Vec<String> {
    items.iter().map(|a| registry.name_of(a)).collect()
}

#[test]
fn a_lone_subgroup_member_is_dissolved() -> Result<()> {
    let items = (1..=4).map(|i| analysis(i, 10.0)).collect::<Vec<_>>();
    let mut registry = SubgroupRegistry::default();

    let first = registry.insert(SubgroupInfo::default());
    let second = registry.insert(SubgroupInfo::default());
    items[0].borrow_mut().set_subgroup(Some(first));
    items[1].borrow_mut().set_subgroup(Some(first));
    items[2].borrow_mut().set_subgroup(Some(second));
    for (id, name) in [(first, "sg1"), (second, "sg2")] {
        if let Some(info) = registry.get_mut(id) {
            info.name = name.to_owned();
        }
    }

    compress_groups(&mut registry, &items);

    assert_eq!(names(&registry, &items), ["00", "00", "", ""]);
    assert!(items[2].borrow().subgroup().is_none());
    assert!(items[3].borrow().subgroup().is_none());

    // sg2 lost its last member
    assert_eq!(registry.len(), 1);
    assert!(registry.get(second).is_none());
    Ok(())
}

#[test]
fn subgroups_become_interpreted_ages() -> Result<()> {
    let items = vec![
        analysis(1, 10.0),
        analysis(2, 10.1),
        analysis(3, 9.9),
        analysis(4, 20.0),
        analysis(5, 30.0),
    ];
    let mut registry = SubgroupRegistry::default();

    let info = SubgroupInfo::default().with_override(
        PreferredAttr::Age,
        PreferredKind::WeightedMean,
        ErrorKind::Sem,
    );
    apply_subgrouping(&mut registry, info, &items[..3], Some(&items), None)?;
    assert_eq!(names(&registry, &items), ["00", "00", "00", "", ""]);

    let grouped = make_interpreted_age_subgroups(&registry, &items, &PlateauOptions::default())?;
    assert_eq!(grouped.len(), 3);

    let interpreted = grouped[0].borrow();
    assert!(interpreted.is_interpreted());
    assert_eq!(interpreted.aliquot(), 1);

    let ages = items[..3]
        .iter()
        .map(|a| a.borrow().age())
        .collect::<Vec<_>>();
    let min = ages.iter().copied().fold(f64::INFINITY, f64::min);
    let max = ages.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    assert!((min..=max).contains(&interpreted.age()));

    // summed over the three members
    approx::assert_relative_eq!(
        interpreted.computed_value("k39").nominal_value(),
        30.0,
        max_relative = 1e-9
    );
    assert!(!grouped[1].borrow().is_interpreted());
    Ok(())
}
