/// How a queryable column's raw string values are typed before binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Text,
    Int,
    Float,
    Bool,
    Timestamp,
    Id,
}

/// One API-visible column: external name, backing SQL column, value type.
#[derive(Debug)]
pub struct Column {
    pub name: &'static str,
    pub sql: &'static str,
    pub kind: ValueKind,
}

/// Static descriptor of a queryable table. `columns` is the whitelist of
/// fields clients may filter and sort by; `select_list` is the full column
/// list the row struct decodes from; `scope` is a predicate ANDed into
/// every query built against the collection.
#[derive(Debug)]
pub struct Collection {
    pub table: &'static str,
    pub select_list: &'static str,
    pub scope: Option<&'static str>,
    pub id: &'static str,
    pub columns: &'static [Column],
}

impl Collection {
    pub fn column(&self, name: &str) -> Option<&'static Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn id_column(&self) -> &'static Column {
        self.column(self.id)
            .expect("collection id must be a declared column")
    }
}
