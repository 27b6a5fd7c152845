use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Tag,
    Numeric,
    Geo,
}

impl FieldType {
    /// Keyword used by the index-definition wire commands.
    pub fn keyword(self) -> &'static str {
        match self {
            FieldType::Text => "TEXT",
            FieldType::Tag => "TAG",
            FieldType::Numeric => "NUMERIC",
            FieldType::Geo => "GEO",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl FromStr for FieldType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "TEXT" => Ok(FieldType::Text),
            "TAG" => Ok(FieldType::Tag),
            "NUMERIC" => Ok(FieldType::Numeric),
            "GEO" => Ok(FieldType::Geo),
            _ => Err(SchemaError::UnknownFieldType(s.to_owned())),
        }
    }
}

/// One indexed attribute: where it lives in the document, what it is called
/// in queries, and how it is indexed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub path: String,
    pub alias: String,
    pub kind: FieldType,
    #[serde(default)]
    pub sortable: bool,
}

impl FieldDescriptor {
    pub fn new(path: impl Into<String>, alias: impl Into<String>, kind: FieldType) -> Self {
        Self {
            path: path.into(),
            alias: alias.into(),
            kind,
            sortable: false,
        }
    }

    pub fn text(path: &str, alias: &str) -> Self {
        Self::new(path, alias, FieldType::Text)
    }

    pub fn tag(path: &str, alias: &str) -> Self {
        Self::new(path, alias, FieldType::Tag)
    }

    pub fn numeric(path: &str, alias: &str) -> Self {
        Self::new(path, alias, FieldType::Numeric)
    }

    pub fn geo(path: &str, alias: &str) -> Self {
        Self::new(path, alias, FieldType::Geo)
    }

    #[must_use]
    pub fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.alias.trim().is_empty() {
            return Err(SchemaError::EmptyAlias);
        }
        if !self.path.starts_with("$.") || self.path.len() < 3 {
            return Err(SchemaError::InvalidPath(self.alias.clone()));
        }
        Ok(())
    }

    /// `<path> AS <alias> <TYPE> [SORTABLE]`
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            self.path.clone(),
            "AS".to_owned(),
            self.alias.clone(),
            self.kind.keyword().to_owned(),
        ];
        if self.sortable {
            args.push("SORTABLE".to_owned());
        }
        args
    }
}

/// Ordered set of field descriptors with unique aliases.
///
/// The schema only grows: there is no API to remove or retype a field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSchema {
    fields: Vec<FieldDescriptor>,
}

impl IndexSchema {
    pub fn new(fields: Vec<FieldDescriptor>) -> Result<Self, SchemaError> {
        let mut schema = Self::default();
        for field in fields {
            schema.push(field)?;
        }
        Ok(schema)
    }

    /// Append a field. Fails if the alias is already declared.
    pub fn push(&mut self, field: FieldDescriptor) -> Result<(), SchemaError> {
        field.validate()?;
        if self.contains_alias(&field.alias) {
            return Err(SchemaError::DuplicateAlias(field.alias));
        }
        self.fields.push(field);
        Ok(())
    }

    pub fn contains_alias(&self, alias: &str) -> bool {
        self.fields.iter().any(|f| f.alias == alias)
    }

    pub fn get(&self, alias: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.alias == alias)
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.alias.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// True if every field of `other` appears here, in the same order, as a prefix.
    pub fn extends(&self, other: &IndexSchema) -> bool {
        other.fields.len() <= self.fields.len()
            && other.fields.iter().zip(&self.fields).all(|(a, b)| a == b)
    }

    /// Flattened `SCHEMA` arguments for index creation.
    pub fn to_args(&self) -> Vec<String> {
        self.fields.iter().flat_map(FieldDescriptor::to_args).collect()
    }
}
