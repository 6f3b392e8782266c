//! Member path resolution and join planning.
//!
//! Every entity reached by a query gets its own table alias. Loading an
//! entity eagerly loads its whole family: ancestor tables are joined to
//! supply inherited members, descendant tables are joined so that members
//! and discriminators of every concrete subtype are available. Paths are
//! memoized, so the same link path always maps to the same aliases.

use std::collections::{HashMap, HashSet};

use tablemap_core::{BuildError, LinkKind, Schema, TableId, TableMemberInfo};

use crate::where_tree::FieldRef;

/// How a table is attached to the statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinKind {
    /// The FROM table
    Root,
    /// Ancestor joined on the key of the table aliased `of`
    Parent { of: String, required: bool },
    /// Subtype joined on the key of the table aliased `of`
    Child { of: String },
    /// Link target joined through `from.column`
    Link {
        from: String,
        member: String,
        column: String,
        nullable: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedTable {
    pub alias: String,
    pub table: TableId,
    /// Link path of the entity this table belongs to (empty for the root)
    pub path: String,
    pub kind: JoinKind,
    /// Are this table's columns selected?
    pub projected: bool,
}

/// One loaded entity and the tables of its family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathEntry {
    pub path: String,
    pub table: TableId,
    /// Indexes into [`JoinPlan::tables`]: the entity's own table first, then
    /// ancestors nearest first, then descendants in pre-order.
    pub family: Vec<usize>,
}

/// Tables and loaded paths of one statement, in join order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinPlan {
    pub tables: Vec<JoinedTable>,
    pub paths: Vec<PathEntry>,
}

impl JoinPlan {
    /// The FROM table.
    pub fn root(&self) -> Option<&JoinedTable> {
        self.tables.first()
    }

    pub fn by_alias(&self, alias: &str) -> Option<&JoinedTable> {
        self.tables.iter().find(|t| t.alias == alias)
    }

    pub fn path(&self, path: &str) -> Option<&PathEntry> {
        self.paths.iter().find(|p| p.path == path)
    }

    pub fn family<'a>(&'a self, entry: &'a PathEntry) -> impl Iterator<Item = &'a JoinedTable> {
        entry.family.iter().map(move |&i| &self.tables[i])
    }

    /// Alias of `table` among the family of `entry`.
    pub fn alias_in_family(&self, entry: &PathEntry, table: TableId) -> Option<&str> {
        let tables = &self.tables;
        entry
            .family
            .iter()
            .map(|&i| &tables[i])
            .find(|t| t.table == table)
            .map(|t| t.alias.as_str())
    }

    pub fn projected(&self) -> impl Iterator<Item = &JoinedTable> {
        self.tables.iter().filter(|t| t.projected)
    }

    /// Aliases of the root entity's family.
    pub fn root_family(&self) -> Vec<&str> {
        self.paths
            .first()
            .map(|entry| self.family(entry).map(|t| t.alias.as_str()).collect())
            .unwrap_or_default()
    }
}

/// A resolved member path.
#[derive(Debug, Clone)]
pub struct ResolvedField {
    pub field: FieldRef,
    /// Table declaring the member
    pub table: TableId,
    pub member: TableMemberInfo,
}

const RESERVED_ALIASES: &[&str] = &[
    "ADD", "ALL", "AND", "ANY", "AS", "ASC", "BY", "CASE", "CROSS", "DESC", "DIV", "DO", "ELSE",
    "END", "FOR", "FROM", "GROUP", "IF", "IN", "INNER", "INTO", "IS", "JOIN", "KEY", "LEFT",
    "LIKE", "LIMIT", "MOD", "NOT", "NULL", "ON", "OR", "ORDER", "OUTER", "RIGHT", "SET", "TABLE",
    "THEN", "TO", "USE", "WHEN", "WHERE", "XOR",
];

/// Base alias of a type name: its uppercase letters, or its first two
/// characters when it has none.
pub fn alias_base(type_name: &str) -> String {
    let upper: String = type_name.chars().filter(char::is_ascii_uppercase).collect();
    if !upper.is_empty() {
        return upper;
    }
    let head: String = type_name.chars().take(2).collect();
    if head.is_empty() {
        "T".to_string()
    } else {
        head
    }
}

fn is_reserved(alias: &str) -> bool {
    let upper = alias.to_ascii_uppercase();
    RESERVED_ALIASES.contains(&upper.as_str())
}

/// Builds the join plan of one statement.
#[derive(Debug)]
pub struct PathResolver<'s> {
    schema: &'s Schema,
    plan: JoinPlan,
    path_index: HashMap<String, usize>,
    used_aliases: HashSet<String>,
}

impl<'s> PathResolver<'s> {
    /// Start a plan whose FROM table is `root`. The root family is loaded
    /// immediately.
    pub fn new(schema: &'s Schema, root: TableId) -> Self {
        let mut resolver = Self {
            schema,
            plan: JoinPlan::default(),
            path_index: HashMap::new(),
            used_aliases: HashSet::new(),
        };
        resolver.load_table(root, "", JoinKind::Root);
        resolver
    }

    pub fn schema(&self) -> &'s Schema {
        self.schema
    }

    pub fn root_table(&self) -> TableId {
        self.plan.paths[0].table
    }

    /// Alias of the root table.
    pub fn root_alias(&self) -> &str {
        &self.plan.tables[0].alias
    }

    pub fn plan(&self) -> &JoinPlan {
        &self.plan
    }

    pub fn into_plan(self) -> JoinPlan {
        self.plan
    }

    /// Main alias of an already loaded path.
    pub fn alias_of(&self, path: &str) -> Option<&str> {
        self.path_index
            .get(path)
            .map(|&i| self.plan.tables[self.plan.paths[i].family[0]].alias.as_str())
    }

    /// Resolve a dotted member path to a column. Intermediate segments must
    /// be foreign-key links and are joined. A trailing foreign-key member
    /// resolves to its own column, without joining the target.
    pub fn resolve(&mut self, path: &str) -> Result<ResolvedField, BuildError> {
        let segments = self.split(path)?;
        let Some((last, prefix)) = segments.split_last() else {
            return Err(self.unknown(path));
        };
        let entry = self.load_links(prefix, path, false)?;
        let (alias, table, member) = self
            .member_in_family(entry, last)
            .ok_or_else(|| self.unknown(path))?;
        if member.link == LinkKind::Multiple {
            return Err(BuildError::unsupported(format!(
                "many-to-many member '{path}' cannot be compared"
            )));
        }
        Ok(ResolvedField {
            field: FieldRef::new(alias, member.storage_name.clone(), member.name.clone()),
            table,
            member,
        })
    }

    pub fn field(&mut self, path: &str) -> Result<FieldRef, BuildError> {
        self.resolve(path).map(|r| r.field)
    }

    /// Load every link of `path` and add the reached entities to the
    /// projection.
    pub fn include(&mut self, path: &str) -> Result<(), BuildError> {
        let segments = self.split(path)?;
        self.load_links(&segments, path, true).map(|_| ())
    }

    /// Project the root entity's family.
    pub fn project_root(&mut self) {
        self.project(0);
    }

    fn project(&mut self, entry: usize) {
        for &i in &self.plan.paths[entry].family {
            self.plan.tables[i].projected = true;
        }
    }

    fn split<'p>(&self, path: &'p str) -> Result<Vec<&'p str>, BuildError> {
        let segments: Vec<&str> = path.split('.').collect();
        if path.is_empty() || segments.iter().any(|s| s.is_empty()) {
            return Err(self.unknown(path));
        }
        Ok(segments)
    }

    fn unknown(&self, path: &str) -> BuildError {
        BuildError::UnknownMember {
            type_name: self.schema.table(self.root_table()).type_name.clone(),
            path: path.to_string(),
        }
    }

    /// Walk foreign-key links from the root, loading each target. Returns
    /// the index of the last reached path entry.
    fn load_links(
        &mut self,
        segments: &[&str],
        full_path: &str,
        project: bool,
    ) -> Result<usize, BuildError> {
        let mut current = 0;
        let mut path = String::new();
        for segment in segments {
            let (owner_alias, _, member) = self
                .member_in_family(current, segment)
                .ok_or_else(|| self.unknown(full_path))?;
            let owner_type = &self.schema.table(self.plan.paths[current].table).type_name;
            match member.link {
                LinkKind::Simple => {}
                LinkKind::Multiple => {
                    return Err(BuildError::unsupported(format!(
                        "many-to-many member '{segment}' cannot be traversed"
                    )));
                }
                LinkKind::None | LinkKind::Parent => {
                    return Err(BuildError::NotALink {
                        type_name: owner_type.clone(),
                        member: (*segment).to_string(),
                    });
                }
            }
            let target = member.linked_table.ok_or_else(|| BuildError::NotALink {
                type_name: owner_type.clone(),
                member: (*segment).to_string(),
            })?;
            if !path.is_empty() {
                path.push('.');
            }
            path.push_str(segment);
            current = self.load_table(
                target,
                &path,
                JoinKind::Link {
                    from: owner_alias,
                    member: member.name.clone(),
                    column: member.storage_name.clone(),
                    nullable: member.nullable,
                },
            );
            if project {
                self.project(current);
            }
        }
        Ok(current)
    }

    /// Find a member among the tables of a loaded entity's family.
    fn member_in_family(
        &self,
        entry: usize,
        name: &str,
    ) -> Option<(String, TableId, TableMemberInfo)> {
        self.plan.paths[entry].family.iter().find_map(|&i| {
            let joined = &self.plan.tables[i];
            self.schema
                .table(joined.table)
                .member(name)
                .map(|m| (joined.alias.clone(), joined.table, m.clone()))
        })
    }

    /// Load an entity and its family under `path`, returning its path entry.
    fn load_table(&mut self, table: TableId, path: &str, kind: JoinKind) -> usize {
        if let Some(&existing) = self.path_index.get(path) {
            return existing;
        }
        let required = match &kind {
            JoinKind::Link { nullable, .. } => !nullable,
            _ => true,
        };

        let alias = self.next_alias(table);
        let mut family = vec![self.push(alias.clone(), table, path, kind)];

        let mut child_alias = alias.clone();
        for ancestor in self.schema.ancestors(table) {
            let ancestor_alias = self.next_alias(ancestor);
            family.push(self.push(
                ancestor_alias.clone(),
                ancestor,
                path,
                JoinKind::Parent {
                    of: child_alias,
                    required,
                },
            ));
            child_alias = ancestor_alias;
        }

        self.load_children(table, &alias, path, &mut family);

        tracing::trace!(
            path = %path,
            alias = %alias,
            tables = family.len(),
            "loaded entity family"
        );

        let index = self.plan.paths.len();
        self.plan.paths.push(PathEntry {
            path: path.to_string(),
            table,
            family,
        });
        self.path_index.insert(path.to_string(), index);
        index
    }

    fn load_children(&mut self, table: TableId, alias: &str, path: &str, family: &mut Vec<usize>) {
        let children = self.schema.table(table).children.clone();
        for child in children {
            let child_alias = self.next_alias(child);
            family.push(self.push(
                child_alias.clone(),
                child,
                path,
                JoinKind::Child {
                    of: alias.to_string(),
                },
            ));
            self.load_children(child, &child_alias, path, family);
        }
    }

    fn push(&mut self, alias: String, table: TableId, path: &str, kind: JoinKind) -> usize {
        self.plan.tables.push(JoinedTable {
            alias,
            table,
            path: path.to_string(),
            kind,
            projected: false,
        });
        self.plan.tables.len() - 1
    }

    fn next_alias(&mut self, table: TableId) -> String {
        let base = alias_base(&self.schema.table(table).type_name);
        let mut candidate = base.clone();
        let mut suffix = 1;
        while self.used_aliases.contains(&candidate) || is_reserved(&candidate) {
            candidate = format!("{base}{suffix}");
            suffix += 1;
        }
        self.used_aliases.insert(candidate.clone());
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::schema;
    use tablemap_core::{EntityDescriptor, MemberDescriptor};

    #[test]
    fn alias_bases() {
        assert_eq!(alias_base("PersonLocation"), "PL");
        assert_eq!(alias_base("Cat"), "C");
        assert_eq!(alias_base("cat"), "ca");
        assert_eq!(alias_base("x"), "x");
    }

    #[test]
    fn colliding_aliases_get_suffixes() {
        let schema = schema();
        let person = schema.id_of("Person").unwrap();
        let mut resolver = PathResolver::new(&schema, person);
        let current = resolver.field("location.city").unwrap();
        let previous = resolver.field("previous.city").unwrap();
        assert_eq!(current.alias, "PL");
        assert_eq!(previous.alias, "PL1");
        assert_eq!(resolver.alias_of("previous"), Some("PL1"));
    }

    #[test]
    fn family_aliases_outlive_the_path_entry() {
        let schema = schema();
        let cat = schema.id_of("Cat").unwrap();
        let animal = schema.id_of("Animal").unwrap();
        let resolver = PathResolver::new(&schema, cat);
        let plan = resolver.plan();
        let alias = {
            let entry = plan.paths.first().cloned().unwrap();
            plan.alias_in_family(&entry, animal)
        };
        assert_eq!(alias, Some("A"));
    }

    #[test]
    fn loading_a_subtype_skips_its_siblings() {
        let schema = schema();
        let cat = schema.id_of("Cat").unwrap();
        let dog = schema.id_of("Dog").unwrap();
        let resolver = PathResolver::new(&schema, cat);
        let plan = resolver.plan();
        let family: Vec<_> = plan
            .family(&plan.paths[0])
            .map(|t| t.alias.as_str())
            .collect();
        assert_eq!(family, vec!["C", "A"]);
        assert!(plan.tables.iter().all(|t| t.table != dog));
    }

    #[test]
    fn reserved_words_are_skipped() {
        let schema = Schema::builder()
            .register_descriptor(
                EntityDescriptor::new("OrderRow", "order_row").member(MemberDescriptor::key("id")),
            )
            .build()
            .unwrap();
        let row = schema.id_of("OrderRow").unwrap();
        let resolver = PathResolver::new(&schema, row);
        assert_eq!(resolver.root_alias(), "OR1");
    }

    #[test]
    fn paths_are_memoized() {
        let schema = schema();
        let person = schema.id_of("Person").unwrap();
        let mut resolver = PathResolver::new(&schema, person);
        let a = resolver.field("location.country.name").unwrap();
        let b = resolver.field("location.country.id").unwrap();
        assert_eq!(a.alias, b.alias);
        assert_eq!(resolver.plan().tables.len(), 3);
    }

    #[test]
    fn trailing_link_resolves_to_foreign_key() {
        let schema = schema();
        let person = schema.id_of("Person").unwrap();
        let mut resolver = PathResolver::new(&schema, person);
        let field = resolver.field("location").unwrap();
        assert_eq!(field, FieldRef::new("P", "location_id", "location"));
        assert_eq!(resolver.plan().tables.len(), 1);
    }

    #[test]
    fn family_is_loaded_for_abstract_root() {
        let schema = schema();
        let animal = schema.id_of("Animal").unwrap();
        let resolver = PathResolver::new(&schema, animal);
        let aliases: Vec<_> = resolver.plan().tables.iter().map(|t| t.alias.as_str()).collect();
        assert_eq!(aliases, vec!["A", "C", "D"]);
        assert_eq!(
            resolver.plan().tables[1].kind,
            JoinKind::Child { of: "A".to_string() }
        );
    }

    #[test]
    fn subtype_members_resolve_across_family() {
        let schema = schema();
        let cat = schema.id_of("Cat").unwrap();
        let mut resolver = PathResolver::new(&schema, cat);
        assert_eq!(resolver.field("color").unwrap().alias, "C");
        assert_eq!(resolver.field("name").unwrap().alias, "A");
        assert_eq!(
            resolver.plan().tables[1].kind,
            JoinKind::Parent {
                of: "C".to_string(),
                required: true
            }
        );

        let animal = schema.id_of("Animal").unwrap();
        let mut resolver = PathResolver::new(&schema, animal);
        assert_eq!(resolver.field("trained").unwrap().alias, "D");
    }

    #[test]
    fn many_links_and_unknown_members_are_rejected() {
        let schema = schema();
        let person = schema.id_of("Person").unwrap();
        let mut resolver = PathResolver::new(&schema, person);
        assert!(matches!(
            resolver.field("friends.name"),
            Err(BuildError::UnsupportedExpression { .. })
        ));
        assert!(matches!(
            resolver.field("friends"),
            Err(BuildError::UnsupportedExpression { .. })
        ));
        assert!(matches!(
            resolver.field("name.first"),
            Err(BuildError::NotALink { .. })
        ));
        assert!(matches!(
            resolver.field("shoe_size"),
            Err(BuildError::UnknownMember { .. })
        ));
        assert!(resolver.field("location..city").is_err());
    }

    #[test]
    fn include_projects_linked_family() {
        let schema = schema();
        let animal = schema.id_of("Animal").unwrap();
        let mut resolver = PathResolver::new(&schema, animal);
        resolver.project_root();
        resolver.include("owner.location").unwrap();
        let projected: Vec<_> = resolver.plan().projected().map(|t| t.alias.as_str()).collect();
        assert_eq!(projected, vec!["A", "C", "D", "P", "PL"]);
        match &resolver.plan().by_alias("P").unwrap().kind {
            JoinKind::Link { from, nullable, .. } => {
                assert_eq!(from, "A");
                assert!(*nullable);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
