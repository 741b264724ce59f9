//! `use` template inheritance
//!
//! Every definition carrying a `name` attribute is a template and can be named in
//! another definition's `use` list (`register 0` only hides it from being an instance,
//! it stays usable as a parent).
//!
//! Parents are applied in listed order and each parent is fully resolved before it is
//! applied, so grandparent values reach the child through the parent. An attribute is
//! only taken from a parent if neither the child nor an earlier parent provided it:
//! the first listed parent wins.
//!
//! A missing parent or a `use` cycle is reported as an [Issue] against the child and
//! that parent is skipped. Resolution carries on for everything else.
use crate::issue::{Issue, Issues};
use crate::object::ObjectDefinition;
use indexmap::IndexMap;
use std::collections::HashMap;

/// Attributes that never flow from a template into its children
pub const NOT_INHERITED: &[&str] = &["use", "register", "meta", "name"];

/// What a definition receives from its templates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inheritance {
    pub attributes: IndexMap<String, String>,
    /// attribute names in the order they were merged
    pub fields: Vec<String>,
}

/// Memoized merge results of one resolution pass
///
/// Keyed by the definition's source text, which together with the (fixed) set of
/// definitions of the pass determines the result.
#[derive(Debug, Default)]
pub struct MergeCache {
    merged: HashMap<String, Inheritance>,
}

impl MergeCache {
    pub fn len(&self) -> usize {
        self.merged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.merged.is_empty()
    }
}

/// Template lookup over a fixed list of definitions
#[derive(Debug)]
pub struct TemplateResolver<'a> {
    objects: &'a [ObjectDefinition],
    templates: HashMap<(&'a str, &'a str), usize>,
}

impl<'a> TemplateResolver<'a> {
    pub fn new(objects: &'a [ObjectDefinition]) -> Self {
        let mut templates = HashMap::new();
        for (index, object) in objects.iter().enumerate() {
            let Some(name) = object.name() else {
                continue;
            };
            let key = (object.object_type(), name);
            if let Some(existing) = templates.get(&key) {
                tracing::debug!(?key, existing, index, "template name collision, keeping first");
                continue;
            }
            templates.insert(key, index);
        }

        Self { objects, templates }
    }

    /// Index of the template `name` of `object_type`
    pub fn template(&self, object_type: &str, name: &str) -> Option<usize> {
        self.templates.get(&(object_type, name)).copied()
    }

    /// Everything the definition at `index` inherits
    #[tracing::instrument(level = "trace", skip(self, cache, issues))]
    pub fn inheritance_of(
        &self,
        index: usize,
        cache: &mut MergeCache,
        issues: &mut Issues,
    ) -> Inheritance {
        let mut visiting = Vec::new();
        self.merge(index, cache, &mut visiting, issues)
    }

    fn cache_key(&self, index: usize) -> String {
        let raw_text = &self.objects[index].meta.raw_text;
        if raw_text.is_empty() {
            // definitions built in memory have no text, fall back to their position
            format!("\0{index}")
        } else {
            raw_text.clone()
        }
    }

    fn merge(
        &self,
        index: usize,
        cache: &mut MergeCache,
        visiting: &mut Vec<usize>,
        issues: &mut Issues,
    ) -> Inheritance {
        let key = self.cache_key(index);
        if let Some(merged) = cache.merged.get(&key) {
            return merged.clone();
        }

        let object = &self.objects[index];
        visiting.push(index);

        let mut result = Inheritance::default();
        for parent_name in object.parents() {
            let Some(parent) = self.template(object.object_type(), parent_name) else {
                issues.log(Issue::MissingParent {
                    file: object.meta.source_file.clone(),
                    line_start: object.meta.line_start,
                    line_end: object.meta.line_end,
                    object_type: object.meta.object_type.clone(),
                    parent: parent_name.to_string(),
                });
                continue;
            };

            if visiting.contains(&parent) {
                issues.log(Issue::UseCycle {
                    file: object.meta.source_file.clone(),
                    line_start: object.meta.line_start,
                    line_end: object.meta.line_end,
                    object_type: object.meta.object_type.clone(),
                    parent: parent_name.to_string(),
                });
                continue;
            }

            let parent_inheritance = self.merge(parent, cache, visiting, issues);
            let parent_object = &self.objects[parent];

            for (name, value) in parent_object
                .defined_attributes
                .iter()
                .chain(parent_inheritance.attributes.iter())
            {
                if NOT_INHERITED.contains(&name.as_str())
                    || object.defined_attributes.contains_key(name)
                    || result.attributes.contains_key(name)
                {
                    continue;
                }
                result.attributes.insert(name.clone(), value.clone());
                result.fields.push(name.clone());
            }
        }

        visiting.pop();
        cache.merged.insert(key, result.clone());
        result
    }
}

/// Resolve inheritance for all definitions
///
/// Whatever was inherited before is dropped first, so resolving a resolved list again
/// gives the same result.
pub fn resolve(mut objects: Vec<ObjectDefinition>, issues: &mut Issues) -> Vec<ObjectDefinition> {
    for object in &mut objects {
        object.clear_inheritance();
    }

    let mut cache = MergeCache::default();
    let inherited: Vec<Inheritance> = {
        let resolver = TemplateResolver::new(&objects);
        (0..objects.len())
            .map(|index| resolver.inheritance_of(index, &mut cache, issues))
            .collect()
    };
    tracing::debug!(objects = objects.len(), cached = cache.len(), "templates resolved");

    for (object, inheritance) in objects.iter_mut().zip(inherited) {
        object.inherited_attributes = inheritance.attributes;
        object.template_fields = inheritance.fields;
    }

    objects
}
