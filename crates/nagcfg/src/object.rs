//! object definitions
//!
//! An [ObjectDefinition] is one `define <type> { ... }` block. Fresh from the parser it
//! only carries the attributes written in its block. The [resolver](crate::resolver)
//! later fills the inherited layer from its `use` templates.
//!
//! Attribute lookups walk the layers in [Layer::ORDER] and stop at the first hit.
use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::path::{Path, PathBuf};

/// Column the canonical writer pads attribute keys to
pub const KEY_COLUMN_WIDTH: usize = 30;

/// Where an attribute value was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    /// Written in the object's own block
    Defined,
    /// Merged in from a template
    Inherited,
    /// Implied when nothing sets it
    Default,
}

impl Layer {
    pub const ORDER: [Layer; 3] = [Layer::Defined, Layer::Inherited, Layer::Default];
}

/// Value of an attribute that no layer above [Layer::Default] sets
fn default_value(key: &str) -> Option<&'static str> {
    match key {
        "register" => Some("1"),
        _ => None,
    }
}

/// Where a definition came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Meta {
    pub object_type: String,
    pub source_file: PathBuf,
    /// 1-based line of `define`
    pub line_start: usize,
    /// 1-based line of the closing `}`
    pub line_end: usize,
    /// Source text of the lines `line_start..=line_end`
    pub raw_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectDefinition {
    pub meta: Meta,
    /// Attributes written in the block, in source order
    pub defined_attributes: IndexMap<String, String>,
    /// Attributes merged in from templates
    pub inherited_attributes: IndexMap<String, String>,
    /// Names of the inherited attributes, in merge order
    pub template_fields: Vec<String>,
}

impl ObjectDefinition {
    pub fn new(object_type: impl Into<String>, source_file: impl Into<PathBuf>) -> Self {
        Self {
            meta: Meta {
                object_type: object_type.into(),
                source_file: source_file.into(),
                line_start: 0,
                line_end: 0,
                raw_text: String::new(),
            },
            defined_attributes: IndexMap::new(),
            inherited_attributes: IndexMap::new(),
            template_fields: Vec::new(),
        }
    }

    /// Builder style [ObjectDefinition::set]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn object_type(&self) -> &str {
        &self.meta.object_type
    }

    pub fn source_file(&self) -> &Path {
        &self.meta.source_file
    }

    /// Look an attribute up in a single layer
    pub fn layer(&self, layer: Layer, key: &str) -> Option<&str> {
        match layer {
            Layer::Defined => self.defined_attributes.get(key).map(String::as_str),
            Layer::Inherited => self.inherited_attributes.get(key).map(String::as_str),
            Layer::Default => default_value(key),
        }
    }

    /// Look an attribute up through the given layers, reporting which one answered
    pub fn lookup_in(&self, layers: &[Layer], key: &str) -> Option<(&str, Layer)> {
        layers
            .iter()
            .find_map(|layer| self.layer(*layer, key).map(|value| (value, *layer)))
    }

    /// Look an attribute up through all layers
    pub fn lookup(&self, key: &str) -> Option<(&str, Layer)> {
        self.lookup_in(&Layer::ORDER, key)
    }

    /// Effective value: defined, else inherited
    pub fn get(&self, key: &str) -> Option<&str> {
        self.lookup_in(&[Layer::Defined, Layer::Inherited], key)
            .map(|(value, _)| value)
    }

    /// Effective value including implied defaults
    pub fn get_or_default(&self, key: &str) -> Option<&str> {
        self.lookup(key).map(|(value, _)| value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Defined attributes followed by inherited ones that are not overridden
    pub fn effective_attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.defined_attributes
            .iter()
            .chain(
                self.inherited_attributes
                    .iter()
                    .filter(|(key, _)| !self.defined_attributes.contains_key(*key)),
            )
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.defined_attributes.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.defined_attributes.shift_remove(key)
    }

    /// Rename a defined attribute in place, keeping its position
    pub fn rename(&mut self, key: &str, new_key: impl Into<String>) -> bool {
        let Some(index) = self.defined_attributes.get_index_of(key) else {
            return false;
        };
        let new_key = new_key.into();
        let Some((_, value)) = self.defined_attributes.shift_remove_index(index) else {
            return false;
        };
        let (new_index, _) = self.defined_attributes.insert_full(new_key, value);
        self.defined_attributes.move_index(new_index, index.min(new_index));
        true
    }

    /// Template name (`name` attribute)
    pub fn name(&self) -> Option<&str> {
        self.defined_attributes.get("name").map(String::as_str)
    }

    /// Parent template names from `use`, in listed order
    pub fn parents(&self) -> impl Iterator<Item = &str> {
        self.defined_attributes
            .get("use")
            .map(String::as_str)
            .into_iter()
            .flat_map(crate::util::split_list)
    }

    /// `register 0` marks a definition as template only
    pub fn is_registered(&self) -> bool {
        self.get_or_default("register")
            .map_or(true, |register| register.trim() != "0")
    }

    /// Drop everything the resolver merged in
    pub fn clear_inheritance(&mut self) {
        self.inherited_attributes.clear();
        self.template_fields.clear();
    }

    /// Same definition in the same place
    pub(crate) fn same_origin(&self, other: &ObjectDefinition) -> bool {
        self.meta.object_type == other.meta.object_type
            && self.meta.source_file == other.meta.source_file
            && self.meta.line_start == other.meta.line_start
    }
}

/// Pad `key` to [KEY_COLUMN_WIDTH] and follow it with `value`
pub fn format_attribute(key: &str, value: &str) -> String {
    if value.is_empty() {
        return format!("    {key}");
    }
    format!("    {key:<width$} {value}", width = KEY_COLUMN_WIDTH)
}

/// Canonical text form, only defined attributes are written
impl std::fmt::Display for ObjectDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "define {} {{", self.meta.object_type)?;
        for (key, value) in &self.defined_attributes {
            writeln!(f, "{}", format_attribute(key, value))?;
        }
        writeln!(f, "}}")
    }
}

impl Serialize for ObjectDefinition {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut ser = serializer.serialize_map(Some(5))?;
        ser.serialize_entry("object_type", &self.meta.object_type)?;
        ser.serialize_entry("line_start", &self.meta.line_start)?;
        ser.serialize_entry("line_end", &self.meta.line_end)?;
        ser.serialize_entry("defined", &self.defined_attributes)?;
        ser.serialize_entry("inherited", &self.inherited_attributes)?;
        ser.end()
    }
}
