//! In-memory view of the organisation tree.
//!
//! The directory is loaded once per request from the `org_unit` table and then
//! queried purely: ancestor walks, level-scoped lookups, and functional
//! department selection all happen here without touching the database.

use std::collections::HashMap;

use crate::domain::org::{OrgLevel, OrgUnit, UnitId};

#[derive(Clone, Debug, Default)]
pub struct OrgDirectory {
    units: HashMap<UnitId, OrgUnit>,
    /// Child ids per parent, ordered by (sort_order, id).
    children: HashMap<UnitId, Vec<UnitId>>,
    roots: Vec<UnitId>,
}

impl OrgDirectory {
    /// Builds the directory from a flat unit list. Soft-deleted units are
    /// dropped here so no query ever sees them.
    pub fn from_units(units: impl IntoIterator<Item = OrgUnit>) -> Self {
        let units: HashMap<UnitId, OrgUnit> = units
            .into_iter()
            .filter(|unit| !unit.deleted)
            .map(|unit| (unit.id, unit))
            .collect();

        let mut children: HashMap<UnitId, Vec<UnitId>> = HashMap::new();
        let mut roots = Vec::new();
        for unit in units.values() {
            match unit.parent_id {
                Some(parent) if units.contains_key(&parent) => {
                    children.entry(parent).or_default().push(unit.id);
                }
                _ => roots.push(unit.id),
            }
        }

        let by_rank = |id: &UnitId, map: &HashMap<UnitId, OrgUnit>| {
            let unit = &map[id];
            (unit.sort_order, unit.id)
        };
        for ids in children.values_mut() {
            ids.sort_by_key(|id| by_rank(id, &units));
        }
        roots.sort_by_key(|id| by_rank(id, &units));

        Self { units, children, roots }
    }

    pub fn get(&self, id: UnitId) -> Option<&OrgUnit> {
        self.units.get(&id)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn roots(&self) -> impl Iterator<Item = &OrgUnit> {
        self.roots.iter().filter_map(|id| self.units.get(id))
    }

    pub fn children(&self, id: UnitId) -> impl Iterator<Item = &OrgUnit> {
        self.children
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|child| self.units.get(child))
    }

    /// Walks from `id` to the root, starting with `id` itself. Bounded by the
    /// directory size so a corrupt parent cycle cannot loop forever.
    pub fn ancestors(&self, id: UnitId) -> Vec<&OrgUnit> {
        let mut chain = Vec::new();
        let mut cursor = self.units.get(&id);
        while let Some(unit) = cursor {
            chain.push(unit);
            if chain.len() > self.units.len() {
                break;
            }
            cursor = unit.parent_id.and_then(|parent| self.units.get(&parent));
        }
        chain
    }

    /// Nearest ancestor-or-self at the given level. A county user's enclosing
    /// `City` unit is the city company their county rolls up to.
    pub fn enclosing(&self, id: UnitId, level: OrgLevel) -> Option<&OrgUnit> {
        self.ancestors(id).into_iter().find(|unit| unit.level == level)
    }

    /// Functional department of the given family directly under `scope`.
    /// Returns the first match in (sort_order, id) order when a company has
    /// more than one department of the same family.
    pub fn functional_dept_under(&self, scope: UnitId, family: &str) -> Option<&OrgUnit> {
        self.children(scope).find(|unit| {
            unit.level == OrgLevel::Dept && unit.functional_family() == Some(family)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::OrgDirectory;
    use crate::domain::org::{OrgLevel, OrgUnit, UnitId};

    fn unit(id: i64, parent: Option<i64>, code: &str, level: OrgLevel) -> OrgUnit {
        OrgUnit {
            id: UnitId(id),
            parent_id: parent.map(UnitId),
            name: code.to_string(),
            code: code.to_string(),
            family: None,
            level,
            manager_id: None,
            sort_order: id as i32,
            deleted: false,
        }
    }

    fn directory() -> OrgDirectory {
        OrgDirectory::from_units(vec![
            unit(1, None, "PROV", OrgLevel::Province),
            unit(2, Some(1), "CITY-A", OrgLevel::City),
            unit(3, Some(2), "CITY-A-NET", OrgLevel::Dept),
            unit(4, Some(2), "CITY-A-LEGAL", OrgLevel::Dept),
            unit(5, Some(2), "COUNTY-C", OrgLevel::County),
            unit(6, Some(5), "COUNTY-C-NET", OrgLevel::Dept),
            unit(7, Some(1), "PROV-FIN", OrgLevel::Dept),
        ])
    }

    #[test]
    fn ancestors_walk_to_the_root() {
        let dir = directory();
        let codes: Vec<&str> =
            dir.ancestors(UnitId(6)).iter().map(|unit| unit.code.as_str()).collect();
        assert_eq!(codes, vec!["COUNTY-C-NET", "COUNTY-C", "CITY-A", "PROV"]);
    }

    #[test]
    fn enclosing_finds_the_nearest_level() {
        let dir = directory();
        assert_eq!(dir.enclosing(UnitId(6), OrgLevel::City).map(|u| u.id), Some(UnitId(2)));
        assert_eq!(dir.enclosing(UnitId(6), OrgLevel::County).map(|u| u.id), Some(UnitId(5)));
        assert_eq!(dir.enclosing(UnitId(6), OrgLevel::Province).map(|u| u.id), Some(UnitId(1)));
        // Self counts.
        assert_eq!(dir.enclosing(UnitId(2), OrgLevel::City).map(|u| u.id), Some(UnitId(2)));
    }

    #[test]
    fn functional_dept_is_matched_by_family_keyword() {
        let dir = directory();
        let net = dir.functional_dept_under(UnitId(2), "NET");
        assert_eq!(net.map(|u| u.id), Some(UnitId(3)));
        assert!(dir.functional_dept_under(UnitId(2), "FIN").is_none());
    }

    #[test]
    fn deleted_units_are_invisible() {
        let mut removed = unit(3, Some(2), "CITY-A-NET", OrgLevel::Dept);
        removed.deleted = true;
        let dir = OrgDirectory::from_units(vec![
            unit(1, None, "PROV", OrgLevel::Province),
            unit(2, Some(1), "CITY-A", OrgLevel::City),
            removed,
        ]);
        assert!(dir.get(UnitId(3)).is_none());
        assert!(dir.functional_dept_under(UnitId(2), "NET").is_none());
    }

    #[test]
    fn parent_cycle_does_not_hang_the_walk() {
        let a = unit(1, Some(2), "A", OrgLevel::City);
        let b = unit(2, Some(1), "B", OrgLevel::City);
        let dir = OrgDirectory::from_units(vec![a, b]);
        let chain = dir.ancestors(UnitId(1));
        assert!(chain.len() <= 3);
    }

    #[test]
    fn children_are_ordered_by_sort_order() {
        let dir = directory();
        let codes: Vec<&str> =
            dir.children(UnitId(2)).map(|unit| unit.code.as_str()).collect();
        assert_eq!(codes, vec!["CITY-A-NET", "CITY-A-LEGAL", "COUNTY-C"]);
    }
}
