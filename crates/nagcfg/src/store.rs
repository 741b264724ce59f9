//! resolved definitions grouped by type
//!
//! Groups are keyed `all_<type>` and keep parse order. Templates (`register 0`) are
//! part of their group, filter with `register=1` to leave them out.
use crate::object::ObjectDefinition;
use crate::query::{matches_all, Predicate};
use crate::util::split_list;
use indexmap::IndexMap;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum StoreError {
    #[error("No default lookup key for object type {0:?}, pass one explicitly")]
    NoDefaultKey(String),
}

/// Name of the group holding definitions of `object_type`
pub fn group_key(object_type: &str) -> String {
    format!("all_{object_type}")
}

/// Attribute naming a definition of `object_type` in simple lookups
pub fn default_key(object_type: &str) -> Option<&'static str> {
    match object_type {
        "host" => Some("host_name"),
        "hostgroup" => Some("hostgroup_name"),
        "service" => Some("name"),
        "servicegroup" => Some("servicegroup_name"),
        "contact" => Some("contact_name"),
        "contactgroup" => Some("contactgroup_name"),
        "timeperiod" => Some("timeperiod_name"),
        "command" => Some("command_name"),
        _ => None,
    }
}

#[derive(Debug, Default, Clone)]
pub struct ObjectStore {
    groups: IndexMap<String, Vec<ObjectDefinition>>,
}

impl ObjectStore {
    pub fn new(objects: impl IntoIterator<Item = ObjectDefinition>) -> Self {
        let mut store = Self::default();
        for object in objects {
            store.insert(object);
        }
        store
    }

    pub fn insert(&mut self, object: ObjectDefinition) {
        self.groups
            .entry(group_key(object.object_type()))
            .or_default()
            .push(object);
    }

    /// A group by its `all_<type>` key
    pub fn group(&self, key: &str) -> &[ObjectDefinition] {
        self.groups.get(key).map_or(&[], Vec::as_slice)
    }

    pub fn groups(&self) -> impl Iterator<Item = (&str, &[ObjectDefinition])> {
        self.groups
            .iter()
            .map(|(key, objects)| (key.as_str(), objects.as_slice()))
    }

    /// All definitions of `object_type`
    pub fn objects(&self, object_type: &str) -> &[ObjectDefinition] {
        self.group(&group_key(object_type))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObjectDefinition> {
        self.groups.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Definition of `object_type` whose `key` (or the type's default key) is `name`
    pub fn get(
        &self,
        object_type: &str,
        name: &str,
        key: Option<&str>,
    ) -> Result<Option<&ObjectDefinition>, StoreError> {
        let key = key
            .or_else(|| default_key(object_type))
            .ok_or_else(|| StoreError::NoDefaultKey(object_type.to_string()))?;

        Ok(self
            .objects(object_type)
            .iter()
            .find(|object| object.get(key) == Some(name)))
    }

    /// Definitions matching all predicates, optionally limited to one type
    pub fn filter(
        &self,
        object_type: Option<&str>,
        predicates: &[Predicate],
    ) -> Vec<&ObjectDefinition> {
        let candidates: Box<dyn Iterator<Item = &ObjectDefinition> + '_> = match object_type {
            Some(object_type) => Box::new(self.objects(object_type).iter()),
            None => Box::new(self.iter()),
        };
        candidates
            .filter(|object| matches_all(predicates, object))
            .collect()
    }

    /// The stored definition that came from the same place as `object`
    pub fn find_mut(&mut self, object: &ObjectDefinition) -> Option<&mut ObjectDefinition> {
        self.groups
            .get_mut(&group_key(object.object_type()))?
            .iter_mut()
            .find(|stored| stored.same_origin(object))
    }

    pub fn remove(&mut self, object: &ObjectDefinition) -> Option<ObjectDefinition> {
        let group = self.groups.get_mut(&group_key(object.object_type()))?;
        let index = group.iter().position(|stored| stored.same_origin(object))?;
        Some(group.remove(index))
    }

    /// Names of the hostgroups `host_name` belongs to
    ///
    /// Membership comes from the hostgroup's `members` and from the host's own
    /// `hostgroups` attribute.
    pub fn host_hostgroups(&self, host_name: &str) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();

        for hostgroup in self.objects("hostgroup") {
            let Some(name) = hostgroup.get("hostgroup_name") else {
                continue;
            };
            let listed = hostgroup
                .get("members")
                .is_some_and(|members| split_list(members).any(|m| m == host_name || m == "*"));
            if listed && !names.contains(&name) {
                names.push(name);
            }
        }

        for host in self.objects("host") {
            if host.get("host_name") != Some(host_name) {
                continue;
            }
            for name in host.get("hostgroups").into_iter().flat_map(split_list) {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }

        names
    }

    /// Hosts that belong to `hostgroup_name`
    pub fn hostgroup_hosts(&self, hostgroup_name: &str) -> Vec<&ObjectDefinition> {
        self.objects("host")
            .iter()
            .filter(|host| host.is_registered())
            .filter(|host| {
                host.get("host_name").is_some_and(|name| {
                    self.host_hostgroups(name).contains(&hostgroup_name)
                })
            })
            .collect()
    }

    /// Whether `service` applies to `host_name`
    ///
    /// `host_name` and `hostgroup_name` are lists, `*` matches every host and a `!`
    /// prefixed entry excludes the host even if another entry matched it.
    pub fn service_applies_to(&self, service: &ObjectDefinition, host_name: &str) -> bool {
        let hostgroups = self.host_hostgroups(host_name);
        let mut matched = false;

        for entry in service.get("host_name").into_iter().flat_map(split_list) {
            match entry.strip_prefix('!') {
                Some(excluded) if excluded.trim() == host_name => return false,
                Some(_) => {}
                None => matched |= entry == host_name || entry == "*",
            }
        }

        for entry in service.get("hostgroup_name").into_iter().flat_map(split_list) {
            match entry.strip_prefix('!') {
                Some(excluded) if hostgroups.contains(&excluded.trim()) => return false,
                Some(_) => {}
                None => matched |= entry == "*" || hostgroups.contains(&entry),
            }
        }

        matched
    }

    /// Registered services that apply to `host_name`
    pub fn host_services(&self, host_name: &str) -> Vec<&ObjectDefinition> {
        self.objects("service")
            .iter()
            .filter(|service| service.is_registered())
            .filter(|service| self.service_applies_to(service, host_name))
            .collect()
    }

    /// The service `description` on `host_name`
    pub fn get_service(&self, host_name: &str, description: &str) -> Option<&ObjectDefinition> {
        self.host_services(host_name)
            .into_iter()
            .find(|service| service.get("service_description") == Some(description))
    }
}
