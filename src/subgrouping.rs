//! Interactive grouping of adjacent analyses
use std::collections::BTreeMap;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::analysis::{shared, SharedAnalysis, SubgroupId};
use crate::interpreted::InterpretedAgeGroup;
use crate::plateau::PlateauOptions;
use crate::preferred::{PreferredAttr, PreferredKind};
use crate::stats::ErrorKind;
use crate::{Error, Result};

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
/// Shared description of a subgroup
pub struct SubgroupInfo {
    /// Zero padded group number, for example `03`
    pub name: String,
    /// Error kind of the subgroup age
    pub error_kind: Option<ErrorKind>,
    /// Preferred kind and error kind per attribute
    pub overrides: BTreeMap<PreferredAttr, (PreferredKind, ErrorKind)>,
}

impl SubgroupInfo {
    #[must_use]
    pub fn with_override(
        mut self,
        attr: PreferredAttr,
        kind: PreferredKind,
        error_kind: ErrorKind,
    ) -> Self {
        self.overrides.insert(attr, (kind, error_kind));
        self
    }
}

#[derive(Clone, Debug, Default)]
/// Owner of every subgroup, analyses refer to them by `SubgroupId`
pub struct SubgroupRegistry {
    next_id: u64,
    groups: BTreeMap<SubgroupId, SubgroupInfo>,
}

impl SubgroupRegistry {
    pub fn insert(&mut self, info: SubgroupInfo) -> SubgroupId {
        let id = SubgroupId(self.next_id);
        self.next_id += 1;
        self.groups.insert(id, info);
        id
    }

    #[must_use]
    pub fn get(&self, id: SubgroupId) -> Option<&SubgroupInfo> {
        self.groups.get(&id)
    }

    pub fn get_mut(&mut self, id: SubgroupId) -> Option<&mut SubgroupInfo> {
        self.groups.get_mut(&id)
    }

    pub fn remove(&mut self, id: SubgroupId) -> Option<SubgroupInfo> {
        self.groups.remove(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// The subgroup an analysis belongs to, if its handle is still registered
    #[must_use]
    pub fn info_of(&self, analysis: &SharedAnalysis) -> Option<&SubgroupInfo> {
        analysis.borrow().subgroup().and_then(|id| self.get(id))
    }

    /// The name of an analysis's subgroup, empty when it has none
    #[must_use]
    pub fn name_of(&self, analysis: &SharedAnalysis) -> String {
        self.info_of(analysis)
            .map_or_else(String::new, |info| info.name.clone())
    }

    /// Drop every subgroup none of `items` refers to
    pub fn prune(&mut self, items: &[SharedAnalysis]) {
        let referenced = items
            .iter()
            .filter_map(|item| item.borrow().subgroup())
            .collect::<Vec<_>>();
        self.groups.retain(|id, _| referenced.contains(id));
    }
}

/// Put the `selected` analyses into a new subgroup described by `info`
///
/// The group number is one more than the largest numeric subgroup name among `items`, or
/// `gid` when no items are given. Selecting a single analysis does nothing.
///
/// # Errors
/// Returns an error if neither `items` nor `gid` is supplied
pub fn apply_subgrouping(
    registry: &mut SubgroupRegistry,
    mut info: SubgroupInfo,
    selected: &[SharedAnalysis],
    items: Option<&[SharedAnalysis]>,
    gid: Option<usize>,
) -> Result<Option<SubgroupId>> {
    if selected.len() <= 1 {
        return Ok(None);
    }
    if items.is_none() && gid.is_none() {
        return Err(Error::MissingGroupId);
    }

    let gid = match items {
        Some(items) if !items.is_empty() => items
            .iter()
            .filter_map(|item| registry.name_of(item).parse::<usize>().ok())
            .max()
            .map_or(0, |max| max + 1),
        _ => gid.unwrap_or_default(),
    };
    info.name = format!("{gid:02}");

    let id = registry.insert(info);
    for analysis in selected {
        analysis.borrow_mut().set_subgroup(Some(id));
    }

    if let Some(items) = items.filter(|items| !items.is_empty()) {
        compress_groups(registry, items);
    }
    Ok(registry.get(id).is_some().then_some(id))
}

/// Renumber adjacent runs of subgroup members from `00`
///
/// Runs with fewer than two non-omitted members are dissolved, and subgroups no longer
/// referenced by `items` are dropped from the registry.
pub fn compress_groups(registry: &mut SubgroupRegistry, items: &[SharedAnalysis]) {
    let runs = items
        .iter()
        .group_by(|item| registry.name_of(item))
        .into_iter()
        .map(|(name, run)| (name, run.cloned().collect::<Vec<_>>()))
        .collect::<Vec<_>>();

    let mut count = 0;
    for (name, run) in runs {
        let valid = run.iter().filter(|a| !a.borrow().is_omitted()).count();
        if name.is_empty() || valid <= 1 {
            for analysis in &run {
                analysis.borrow_mut().set_subgroup(None);
            }
            continue;
        }

        let renamed = format!("{count:02}");
        for id in run.iter().filter_map(|a| a.borrow().subgroup()).unique() {
            if let Some(info) = registry.get_mut(id) {
                info.name.clone_from(&renamed);
            }
        }
        count += 1;
    }
    registry.prune(items);
}

/// Set the age error kind of the subgroups of `selected`
///
/// Every subgroup among `items` sharing a name with a selected subgroup is updated too.
pub fn set_subgrouping_error(
    registry: &mut SubgroupRegistry,
    error_kind: ErrorKind,
    selected: &[SharedAnalysis],
    items: &[SharedAnalysis],
) {
    let names = selected
        .iter()
        .filter_map(|a| registry.info_of(a).map(|info| info.name.clone()))
        .collect::<Vec<_>>();
    if names.is_empty() {
        return;
    }

    let ids = selected
        .iter()
        .chain(items)
        .filter(|a| names.contains(&registry.name_of(a)))
        .filter_map(|a| a.borrow().subgroup())
        .unique()
        .collect::<Vec<_>>();
    for id in ids {
        if let Some(info) = registry.get_mut(id) {
            info.error_kind = Some(error_kind);
        }
    }
}

/// Replace each adjacent run of subgroup members by an interpreted age of the run
///
/// Analyses outside a subgroup pass through unchanged.
///
/// # Errors
/// Returns an error if a subgroup overrides an attribute with a kind it does not support
pub fn make_interpreted_age_subgroups(
    registry: &SubgroupRegistry,
    analyses: &[SharedAnalysis],
    plateau_options: &PlateauOptions,
) -> Result<Vec<SharedAnalysis>> {
    let mut interpreted = vec![];
    for (name, run) in &analyses.iter().group_by(|a| registry.name_of(a)) {
        let run = run.cloned().collect::<Vec<_>>();
        let info = run.first().and_then(|a| registry.info_of(a));
        match info {
            Some(info) if !name.is_empty() && run.len() > 1 => {
                let mut group = InterpretedAgeGroup::new(run, plateau_options.clone());
                group.set_preferred_kinds(Some(info))?;
                let kind = group.get_preferred_kind(PreferredAttr::Age).label();
                let label = format!("{:02}{}", group.aliquot(), &kind[..2]);
                group.label_name.clone_from(&label);
                group.record_id = label;
                interpreted.push(shared(group));
            }
            _ => interpreted.extend(run),
        }
    }
    Ok(interpreted)
}

#[cfg(test)]
mod tests {
    use crate::analysis::{shared, SharedAnalysis};
    use crate::arar_age::tests::analysis_with_f;
    use crate::plateau::PlateauOptions;
    use crate::stats::ErrorKind;
    use crate::Error;
    use itertools::Itertools;

    use super::{
        apply_subgrouping, compress_groups, make_interpreted_age_subgroups,
        set_subgrouping_error, SubgroupInfo, SubgroupRegistry,
    };

    fn items(n: u32) -> Vec<SharedAnalysis> {
        (0..n)
            .map(|i| shared(analysis_with_f("12345", i + 1, 10.0, 0.01)))
            .collect()
    }

    fn names(registry: &SubgroupRegistry, items: &[SharedAnalysis]) -> Vec<String> {
        items.iter().map(|a| registry.name_of(a)).collect()
    }

    #[test]
    fn single_selection_is_a_no_op() {
        let mut registry = SubgroupRegistry::default();
        let items = items(3);
        let id = apply_subgrouping(
            &mut registry,
            SubgroupInfo::default(),
            &items[..1],
            Some(&items),
            None,
        )
        .unwrap();
        assert!(id.is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn items_or_gid_is_required() {
        let mut registry = SubgroupRegistry::default();
        let items = items(2);
        let result = apply_subgrouping(&mut registry, SubgroupInfo::default(), &items, None, None);
        assert!(matches!(result, Err(Error::MissingGroupId)));
    }

    #[test]
    fn group_ids_follow_existing_names() {
        let mut registry = SubgroupRegistry::default();
        let items = items(4);

        apply_subgrouping(
            &mut registry,
            SubgroupInfo::default(),
            &items[..2],
            None,
            Some(7),
        )
        .unwrap();
        assert_eq!(names(&registry, &items), ["07", "07", "", ""]);

        apply_subgrouping(
            &mut registry,
            SubgroupInfo::default(),
            &items[2..],
            Some(&items),
            None,
        )
        .unwrap();
        assert_eq!(names(&registry, &items), ["00", "00", "01", "01"]);
    }

    #[test]
    fn compress_dissolves_singletons_and_renumbers() {
        let mut registry = SubgroupRegistry::default();
        let items = items(4);
        let first = registry.insert(SubgroupInfo {
            name: "01".to_owned(),
            ..SubgroupInfo::default()
        });
        let second = registry.insert(SubgroupInfo {
            name: "02".to_owned(),
            ..SubgroupInfo::default()
        });
        items[0].borrow_mut().set_subgroup(Some(first));
        items[1].borrow_mut().set_subgroup(Some(first));
        items[2].borrow_mut().set_subgroup(Some(second));

        compress_groups(&mut registry, &items);

        assert_eq!(names(&registry, &items), ["00", "00", "", ""]);
        assert!(items[2].borrow().subgroup().is_none());
        assert!(items[3].borrow().subgroup().is_none());
        assert_eq!(items[0].borrow().subgroup(), items[1].borrow().subgroup());
    }

    #[test]
    fn regrouping_releases_replaced_subgroups() {
        let mut registry = SubgroupRegistry::default();
        let items = items(4);

        for _ in 0..5 {
            for selected in [&items[..2], &items[..3]] {
                apply_subgrouping(
                    &mut registry,
                    SubgroupInfo::default(),
                    selected,
                    Some(&items),
                    None,
                )
                .unwrap();
            }
        }

        let live = items
            .iter()
            .filter_map(|a| a.borrow().subgroup())
            .unique()
            .count();
        assert_eq!(live, 1);
        assert_eq!(registry.len(), live);
        assert_eq!(names(&registry, &items), ["00", "00", "00", ""]);
    }

    #[test]
    fn dissolved_subgroups_leave_the_registry() {
        let mut registry = SubgroupRegistry::default();
        let items = items(3);
        items[1].borrow_mut().set_omitted(true);

        let id = apply_subgrouping(
            &mut registry,
            SubgroupInfo::default(),
            &items[..2],
            Some(&items),
            None,
        )
        .unwrap();

        assert!(id.is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn omitted_members_do_not_count() {
        let mut registry = SubgroupRegistry::default();
        let items = items(2);
        items[1].borrow_mut().set_omitted(true);
        let id = registry.insert(SubgroupInfo {
            name: "00".to_owned(),
            ..SubgroupInfo::default()
        });
        for item in &items {
            item.borrow_mut().set_subgroup(Some(id));
        }

        compress_groups(&mut registry, &items);
        assert!(items.iter().all(|a| a.borrow().subgroup().is_none()));
    }

    #[test]
    fn error_kind_is_shared_by_the_subgroup() {
        let mut registry = SubgroupRegistry::default();
        let items = items(3);
        let id = apply_subgrouping(
            &mut registry,
            SubgroupInfo::default(),
            &items[..2],
            Some(&items),
            None,
        )
        .unwrap()
        .unwrap();

        set_subgrouping_error(&mut registry, ErrorKind::Sd, &items[..1], &items);

        assert_eq!(registry.get(id).unwrap().error_kind, Some(ErrorKind::Sd));
        assert_eq!(
            registry.info_of(&items[1]).unwrap().error_kind,
            Some(ErrorKind::Sd)
        );
    }

    #[test]
    fn runs_become_interpreted_ages() {
        let mut registry = SubgroupRegistry::default();
        let items = items(4);
        apply_subgrouping(
            &mut registry,
            SubgroupInfo::default(),
            &items[1..3],
            Some(&items),
            None,
        )
        .unwrap();

        let grouped =
            make_interpreted_age_subgroups(&registry, &items, &PlateauOptions::default()).unwrap();

        assert_eq!(grouped.len(), 3);
        assert!(!grouped[0].borrow().is_interpreted());
        assert!(grouped[1].borrow().is_interpreted());
        assert!(!grouped[2].borrow().is_interpreted());
        assert_eq!(grouped[1].borrow().aliquot(), 2);
    }
}
