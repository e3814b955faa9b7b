use super::types::{ElementType, ElementTypeCatalog, TypeList};
use std::collections::HashSet;
use tracing::debug;

/// Substitution of file-native type ids by catalog ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeRemapping {
    pairs: Vec<(i32, i32)>,
}

impl TypeRemapping {
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pairs(&self) -> &[(i32, i32)] {
        &self.pairs
    }

    /// Rewrites every value in one pass, so chained or swapped ids are safe.
    pub fn apply(&self, values: &mut [i32]) {
        if self.pairs.is_empty() {
            return;
        }
        for v in values.iter_mut() {
            if let Some(&(_, to)) = self.pairs.iter().find(|(from, _)| from == v) {
                *v = to;
            }
        }
    }
}

/// Merges the types discovered in one frame into a long-lived catalog.
///
/// Existing entries are matched by id first and by name when the id match
/// carries a different name. Types that match neither get a fresh id. Catalog
/// entries not referenced by this frame are removed only when `is_new_file` is set.
pub fn reconcile_types(
    discovered: &TypeList,
    catalog: &mut ElementTypeCatalog,
    is_new_file: bool,
) -> TypeRemapping {
    let mut remapping = TypeRemapping::default();
    let mut active = HashSet::with_capacity(discovered.len());
    let frame_max_id = discovered.types().iter().map(|t| t.id).max().unwrap_or(0);

    for item in discovered.types() {
        let by_id = catalog.find_by_id(item.id).map(|t| t.name.clone());
        let target = match by_id {
            Some(existing) if existing == item.name || item.name.is_empty() || existing.is_empty() => {
                item.id
            }
            Some(existing) => match catalog.find_by_name(&item.name) {
                Some(named) => named.id,
                None => {
                    let fresh = catalog.unique_id(frame_max_id + 1);
                    debug!(
                        file_id = item.id,
                        new_id = fresh,
                        name = %item.name,
                        previous = %existing,
                        "Type id is taken by another name; assigning a new id."
                    );
                    fresh
                }
            },
            None => match catalog.find_by_name(&item.name).filter(|_| !item.name.is_empty()) {
                Some(named) => named.id,
                None => item.id,
            },
        };

        if catalog.find_by_id(target).is_none() {
            catalog.insert(ElementType::with_defaults(target, &item.name));
        }
        if let Some(entry) = catalog.find_by_id_mut(target) {
            if entry.name.is_empty() && !item.name.is_empty() {
                entry.name = item.name.clone();
            }
            if let Some(color) = item.color {
                entry.color = color;
            }
            if item.radius > 0.0 {
                entry.radius = item.radius;
            }
            if item.mass > 0.0 {
                entry.mass = item.mass;
            }
        }

        active.insert(target);
        if target != item.id {
            remapping.pairs.push((item.id, target));
        }
    }

    if is_new_file {
        catalog.retain(|t| active.contains(&t.id));
    }
    catalog.sort_by_id();
    remapping
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named_list(entries: &[(i32, &str)]) -> TypeList {
        let mut list = TypeList::new();
        for &(id, name) in entries {
            list.add_type_id(id);
            list.set_type_name(id, name);
        }
        list
    }

    #[test]
    fn first_load_copies_types_verbatim() {
        let mut catalog = ElementTypeCatalog::new();
        let remap = reconcile_types(&named_list(&[(1, "Cu"), (2, "Zr")]), &mut catalog, true);
        assert!(remap.is_empty());
        assert_eq!(catalog.find_by_name("Cu").unwrap().id, 1);
        assert_eq!(catalog.find_by_name("Zr").unwrap().id, 2);
    }

    #[test]
    fn swapped_ids_keep_catalog_ids_stable_and_remap_data() {
        let mut catalog = ElementTypeCatalog::new();
        reconcile_types(&named_list(&[(1, "Cu"), (2, "Zr")]), &mut catalog, true);

        let remap = reconcile_types(&named_list(&[(1, "Zr"), (2, "Cu")]), &mut catalog, false);
        let mut column = vec![1, 2, 2, 1];
        remap.apply(&mut column);

        assert_eq!(column, vec![2, 1, 1, 2]);
        assert_eq!(catalog.find_by_name("Cu").unwrap().id, 1);
        assert_eq!(catalog.find_by_name("Zr").unwrap().id, 2);
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn shifted_id_for_known_name_maps_back_to_original_id() {
        let mut catalog = ElementTypeCatalog::new();
        reconcile_types(&named_list(&[(1, "Cu"), (2, "Zr")]), &mut catalog, true);

        let remap = reconcile_types(&named_list(&[(5, "Zr")]), &mut catalog, false);
        assert_eq!(remap.pairs(), &[(5, 2)]);
    }

    #[test]
    fn conflicting_unknown_name_gets_fresh_id() {
        let mut catalog = ElementTypeCatalog::new();
        reconcile_types(&named_list(&[(1, "Cu")]), &mut catalog, true);

        let remap = reconcile_types(&named_list(&[(1, "Ni")]), &mut catalog, false);
        assert_eq!(remap.pairs(), &[(1, 2)]);
        assert_eq!(catalog.find_by_name("Ni").unwrap().id, 2);
        assert_eq!(catalog.find_by_name("Cu").unwrap().id, 1);
    }

    #[test]
    fn stale_types_are_dropped_only_on_new_file() {
        let mut catalog = ElementTypeCatalog::new();
        reconcile_types(&named_list(&[(1, "Cu"), (2, "Zr")]), &mut catalog, true);

        reconcile_types(&named_list(&[(1, "Cu")]), &mut catalog, false);
        assert_eq!(catalog.len(), 2);

        reconcile_types(&named_list(&[(1, "Cu")]), &mut catalog, true);
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn unnamed_types_match_by_id_and_keep_customizations() {
        let mut catalog = ElementTypeCatalog::new();
        let mut list = TypeList::new();
        list.add_type_id(1);
        reconcile_types(&list, &mut catalog, true);
        catalog.find_by_id_mut(1).unwrap().color = [0.1, 0.2, 0.3];

        let remap = reconcile_types(&list, &mut catalog, false);
        assert!(remap.is_empty());
        assert_eq!(catalog.find_by_id(1).unwrap().color, [0.1, 0.2, 0.3]);
    }

    #[test]
    fn file_supplied_mass_overrides_catalog_value() {
        let mut catalog = ElementTypeCatalog::new();
        let mut list = named_list(&[(1, "Cu")]);
        reconcile_types(&list, &mut catalog, true);
        list.set_type_mass(1, 63.5);
        reconcile_types(&list, &mut catalog, false);
        assert_eq!(catalog.find_by_id(1).unwrap().mass, 63.5);
    }
}
