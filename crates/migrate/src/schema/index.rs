//! Index definitions

/// Kind of index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexKind {
    #[default]
    Plain,
    Unique,
    Primary,
    /// MySQL only; other dialects compile it as a plain index
    Fulltext,
}

impl IndexKind {
    /// Suffix used when deriving an index name
    pub fn suffix(&self) -> &'static str {
        match self {
            IndexKind::Plain => "idx",
            IndexKind::Unique => "unique",
            IndexKind::Primary => "primary",
            IndexKind::Fulltext => "fulltext",
        }
    }
}

/// An index over an ordered list of columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    /// Empty means derive from table, columns and kind
    pub name: Option<String>,
    pub kind: IndexKind,
    pub columns: Vec<String>,
}

impl Index {
    pub fn new(columns: &[&str]) -> Self {
        Self {
            name: None,
            kind: IndexKind::Plain,
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn named(&mut self, name: &str) -> &mut Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn unique(&mut self) -> &mut Self {
        self.kind = IndexKind::Unique;
        self
    }

    pub fn primary(&mut self) -> &mut Self {
        self.kind = IndexKind::Primary;
        self
    }

    pub fn fulltext(&mut self) -> &mut Self {
        self.kind = IndexKind::Fulltext;
        self
    }
}
