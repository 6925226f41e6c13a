use std::collections::{HashMap, HashSet};

use super::ArchiveError;
use crate::config::{AssociationDescriptor, ConfigError, TableDescriptor};

/// The tables an archiver knows about and how they cascade.
///
/// Built once from configuration and never mutated; predicates for a run are
/// applied to copies of the root descriptors with [`Catalog::with_predicates`].
#[derive(Debug, Clone)]
pub struct Catalog {
    tables: Vec<TableDescriptor>,
    associations: Vec<AssociationDescriptor>,
}

impl Catalog {
    /// Validate and build a catalog.
    ///
    /// Root names must be unique, every association must hang off a root or
    /// another association's child table, and the associations must not
    /// form a cycle.
    pub fn new(
        tables: Vec<TableDescriptor>,
        associations: Vec<AssociationDescriptor>,
    ) -> Result<Self, ConfigError> {
        let mut roots = HashSet::new();
        for table in &tables {
            table.validate()?;
            if !roots.insert(table.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "table '{}' is listed more than once",
                    table.name
                )));
            }
        }

        let children: HashSet<&str> = associations
            .iter()
            .map(|a| a.child_table.as_str())
            .collect();
        for assoc in &associations {
            assoc.validate()?;
            let parent = assoc.parent_table.as_str();
            if !roots.contains(parent) && !children.contains(parent) {
                return Err(ConfigError::Validation(format!(
                    "association for '{}' references unknown parent table '{}'",
                    assoc.child_table, parent
                )));
            }
        }

        check_acyclic(&associations)?;

        Ok(Self {
            tables,
            associations,
        })
    }

    /// Root tables, in the order they are archived.
    pub fn tables(&self) -> &[TableDescriptor] {
        &self.tables
    }

    pub fn associations(&self) -> &[AssociationDescriptor] {
        &self.associations
    }

    pub fn table(&self, name: &str) -> Option<&TableDescriptor> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Associations whose parent is `table`, in declaration order.
    pub fn children_of<'a>(
        &'a self,
        table: &'a str,
    ) -> impl Iterator<Item = &'a AssociationDescriptor> + 'a {
        self.associations
            .iter()
            .filter(move |a| a.parent_table == table)
    }

    /// `table` followed by every table its rows cascade into, depth first in
    /// declaration order, each once.
    pub fn cascade_of<'a>(&'a self, table: &'a str) -> Vec<&'a str> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut stack = vec![table];
        while let Some(name) = stack.pop() {
            if !seen.insert(name) {
                continue;
            }
            order.push(name);
            let children: Vec<&str> = self
                .children_of(name)
                .map(|a| a.child_table.as_str())
                .collect();
            stack.extend(children.into_iter().rev());
        }
        order
    }

    /// Every table a run may write to: roots first, then child tables in
    /// declaration order, each once.
    pub fn table_names(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.tables
            .iter()
            .map(|t| t.name.as_str())
            .chain(self.associations.iter().map(|a| a.child_table.as_str()))
            .filter(|name| seen.insert(*name))
            .collect()
    }

    /// Root descriptors with the given predicates applied.
    ///
    /// Predicates already present on a descriptor are kept unless
    /// overridden. Naming a table that is not a root is an error.
    pub fn with_predicates<I, K, V>(&self, predicates: I) -> Result<Vec<TableDescriptor>, ArchiveError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut tables = self.tables.clone();
        for (name, predicate) in predicates {
            let name = name.as_ref();
            let table = tables
                .iter_mut()
                .find(|t| t.name == name)
                .ok_or_else(|| ArchiveError::UnknownTable {
                    table: name.to_string(),
                })?;
            table.predicate = Some(predicate.into());
        }
        Ok(tables)
    }
}

fn check_acyclic(associations: &[AssociationDescriptor]) -> Result<(), ConfigError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit<'a>(
        table: &'a str,
        edges: &HashMap<&'a str, Vec<&'a str>>,
        marks: &mut HashMap<&'a str, Mark>,
        path: &mut Vec<&'a str>,
    ) -> Result<(), ConfigError> {
        match marks.get(table) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                path.push(table);
                return Err(ConfigError::Validation(format!(
                    "associations form a cycle: {}",
                    path.join(" -> ")
                )));
            }
            None => {}
        }
        marks.insert(table, Mark::Visiting);
        path.push(table);
        for child in edges.get(table).into_iter().flatten() {
            visit(*child, edges, marks, path)?;
        }
        path.pop();
        marks.insert(table, Mark::Done);
        Ok(())
    }

    let mut edges: HashMap<&str, Vec<&str>> = HashMap::new();
    for assoc in associations {
        edges
            .entry(assoc.parent_table.as_str())
            .or_default()
            .push(assoc.child_table.as_str());
    }

    let mut marks = HashMap::new();
    for assoc in associations {
        visit(
            assoc.parent_table.as_str(),
            &edges,
            &mut marks,
            &mut Vec::new(),
        )?;
    }
    Ok(())
}
