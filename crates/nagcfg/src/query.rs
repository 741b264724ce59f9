//! attribute predicates
//!
//! Queries keep the `attribute__suffix=value` syntax (`host_name__startswith=web`),
//! the suffix is parsed once into an [Operator]. A key without a known suffix is an
//! exact match on the whole key.
//!
//! | suffix             | matches when                                          |
//! |--------------------|-------------------------------------------------------|
//! | (none)             | value equals target                                   |
//! | `__isnot`          | value differs from target (or is missing)             |
//! | `__contains`       | value contains target                                 |
//! | `__notcontains`    | value does not contain target (or is missing)         |
//! | `__startswith`     | value starts with target                              |
//! | `__notstartswith`  | value does not start with target (or is missing)      |
//! | `__endswith`       | value ends with target                                |
//! | `__notendswith`    | value does not end with target (or is missing)        |
//! | `__regex`          | target regex finds a match in value                   |
//! | `__in`             | value is one of the comma separated targets           |
//! | `__notin`          | value is none of the targets (or is missing)          |
//! | `__has_field`      | the comma separated value lists the target            |
//! | `__exists`         | attribute presence equals the boolean target          |
//!
//! Comparisons see implied defaults, so `register=1` matches definitions that do not
//! set `register` at all.
use crate::object::ObjectDefinition;
use crate::util::split_list;

#[derive(thiserror::Error, Debug)]
pub enum QueryError {
    #[error("Predicate {0:?} is not of the form key=value")]
    Malformed(String),
    #[error("Invalid regex for {attribute}")]
    Regex {
        attribute: String,
        #[source]
        source: regex::Error,
    },
    #[error("Expected true or false for {attribute}__exists, got {value:?}")]
    NotABoolean { attribute: String, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    IsNot,
    Contains,
    NotContains,
    StartsWith,
    NotStartsWith,
    EndsWith,
    NotEndsWith,
    Regex,
    In,
    NotIn,
    HasField,
    Exists,
}

impl Operator {
    const SUFFIXES: &'static [(&'static str, Operator)] = &[
        ("isnot", Operator::IsNot),
        ("contains", Operator::Contains),
        ("notcontains", Operator::NotContains),
        ("startswith", Operator::StartsWith),
        ("notstartswith", Operator::NotStartsWith),
        ("endswith", Operator::EndsWith),
        ("notendswith", Operator::NotEndsWith),
        ("regex", Operator::Regex),
        ("in", Operator::In),
        ("notin", Operator::NotIn),
        ("has_field", Operator::HasField),
        ("exists", Operator::Exists),
    ];

    /// Split a predicate key into attribute name and operator
    pub fn parse(key: &str) -> (&str, Operator) {
        for (suffix, operator) in Self::SUFFIXES {
            if let Some(attribute) = key
                .strip_suffix(suffix)
                .and_then(|rest| rest.strip_suffix("__"))
            {
                if !attribute.is_empty() {
                    return (attribute, *operator);
                }
            }
        }
        (key, Operator::Equals)
    }

    pub fn suffix(self) -> &'static str {
        match self {
            Operator::Equals => "",
            Operator::IsNot => "__isnot",
            Operator::Contains => "__contains",
            Operator::NotContains => "__notcontains",
            Operator::StartsWith => "__startswith",
            Operator::NotStartsWith => "__notstartswith",
            Operator::EndsWith => "__endswith",
            Operator::NotEndsWith => "__notendswith",
            Operator::Regex => "__regex",
            Operator::In => "__in",
            Operator::NotIn => "__notin",
            Operator::HasField => "__has_field",
            Operator::Exists => "__exists",
        }
    }

    /// Whether the operator is satisfied by a missing attribute
    fn matches_missing(self) -> bool {
        matches!(
            self,
            Operator::IsNot
                | Operator::NotContains
                | Operator::NotStartsWith
                | Operator::NotEndsWith
                | Operator::NotIn
        )
    }
}

/// What an attribute value is compared against
#[derive(Debug, Clone)]
pub enum Target {
    Text(String),
    List(Vec<String>),
    Pattern(regex::Regex),
    Flag(bool),
}

#[derive(Debug, Clone)]
pub struct Predicate {
    attribute: String,
    operator: Operator,
    target: Target,
}

impl Predicate {
    /// Build from a (possibly suffixed) key and its value
    pub fn new(key: &str, value: &str) -> Result<Self, QueryError> {
        let (attribute, operator) = Operator::parse(key);
        let target = match operator {
            Operator::In | Operator::NotIn => {
                Target::List(split_list(value).map(str::to_string).collect())
            }
            Operator::Regex => Target::Pattern(regex::Regex::new(value).map_err(|source| {
                QueryError::Regex {
                    attribute: attribute.to_string(),
                    source,
                }
            })?),
            Operator::Exists => Target::Flag(parse_flag(value).ok_or_else(|| {
                QueryError::NotABoolean {
                    attribute: attribute.to_string(),
                    value: value.to_string(),
                }
            })?),
            _ => Target::Text(value.to_string()),
        };

        Ok(Self {
            attribute: attribute.to_string(),
            operator,
            target,
        })
    }

    /// `__in`/`__notin` predicate over an explicit list
    pub fn in_list(attribute: &str, values: Vec<String>, negate: bool) -> Self {
        Self {
            attribute: attribute.to_string(),
            operator: if negate { Operator::NotIn } else { Operator::In },
            target: Target::List(values),
        }
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn matches(&self, object: &ObjectDefinition) -> bool {
        if self.operator == Operator::Exists {
            let Target::Flag(expected) = self.target else {
                return false;
            };
            return object.contains(&self.attribute) == expected;
        }

        let Some(actual) = object.get_or_default(&self.attribute) else {
            return self.operator.matches_missing();
        };

        match (self.operator, &self.target) {
            (Operator::Equals, Target::Text(target)) => actual == target,
            (Operator::IsNot, Target::Text(target)) => actual != target,
            (Operator::Contains, Target::Text(target)) => actual.contains(target.as_str()),
            (Operator::NotContains, Target::Text(target)) => !actual.contains(target.as_str()),
            (Operator::StartsWith, Target::Text(target)) => actual.starts_with(target.as_str()),
            (Operator::NotStartsWith, Target::Text(target)) => {
                !actual.starts_with(target.as_str())
            }
            (Operator::EndsWith, Target::Text(target)) => actual.ends_with(target.as_str()),
            (Operator::NotEndsWith, Target::Text(target)) => !actual.ends_with(target.as_str()),
            (Operator::Regex, Target::Pattern(pattern)) => pattern.is_match(actual),
            (Operator::In, Target::List(targets)) => targets.iter().any(|t| t == actual),
            (Operator::NotIn, Target::List(targets)) => !targets.iter().any(|t| t == actual),
            (Operator::HasField, Target::Text(target)) => {
                split_list(actual).any(|member| member == target)
            }
            _ => false,
        }
    }
}

impl std::str::FromStr for Predicate {
    type Err = QueryError;

    /// Parse `key[__suffix]=value`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((key, value)) = s.split_once('=') else {
            return Err(QueryError::Malformed(s.to_string()));
        };
        Predicate::new(key.trim(), value.trim())
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Conjunction of predicates, an empty list matches everything
pub fn matches_all(predicates: &[Predicate], object: &ObjectDefinition) -> bool {
    predicates.iter().all(|predicate| predicate.matches(object))
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn host() -> ObjectDefinition {
        ObjectDefinition::new("host", "hosts.cfg")
            .with("host_name", "web01.example.com")
            .with("hostgroups", "+web, linux")
    }

    fn check(predicate: &str) -> bool {
        predicate
            .parse::<Predicate>()
            .expect("predicate must parse")
            .matches(&host())
    }

    #[test]
    fn suffix_parsing() {
        assert_eq!(Operator::parse("host_name"), ("host_name", Operator::Equals));
        assert_eq!(
            Operator::parse("host_name__notcontains"),
            ("host_name", Operator::NotContains)
        );
        assert_eq!(Operator::parse("members__has_field"), ("members", Operator::HasField));
        assert_eq!(Operator::parse("a__in"), ("a", Operator::In));
        assert_eq!(Operator::parse("a__notin"), ("a", Operator::NotIn));
        assert_eq!(Operator::parse("__in"), ("__in", Operator::Equals));
        assert_eq!(Operator::parse("odd__suffix"), ("odd__suffix", Operator::Equals));
        for (suffix, operator) in Operator::SUFFIXES {
            assert_eq!(operator.suffix(), format!("__{suffix}"));
        }
    }

    #[test]
    fn string_operators() {
        assert!(check("host_name=web01.example.com"));
        assert!(!check("host_name=web01"));
        assert!(check("host_name__isnot=db01"));
        assert!(check("host_name__contains=example"));
        assert!(check("host_name__notcontains=test"));
        assert!(check("host_name__startswith=web"));
        assert!(check("host_name__notstartswith=db"));
        assert!(check("host_name__endswith=.com"));
        assert!(check("host_name__notendswith=.org"));
        assert!(check(r"host_name__regex=^web\d+\."));
        assert!(!check("host_name__regex=^db"));
    }

    #[test]
    fn list_operators() {
        assert!(check("host_name__in=db01,web01.example.com"));
        assert!(check("host_name__notin=db01,db02"));
        assert!(check("hostgroups__has_field=web"));
        assert!(check("hostgroups__has_field=linux"));
        assert!(!check("hostgroups__has_field=lin"));
    }

    #[test]
    fn missing_attributes() {
        assert!(!check("alias=x"));
        assert!(!check("alias__contains=x"));
        assert!(check("alias__isnot=x"));
        assert!(check("alias__notcontains=x"));
        assert!(check("alias__notin=x,y"));
        assert!(check("alias__exists=false"));
        assert!(check("host_name__exists=true"));
        assert!(!check("host_name__exists=0"));
    }

    #[test]
    fn register_defaults_to_one() {
        assert!(check("register=1"));
        assert!(!check("register=0"));
        assert!(check("register__exists=false"));

        let template = host().with("register", "0");
        assert!(!"register=1".parse::<Predicate>().unwrap().matches(&template));
    }

    #[test]
    fn inherited_values_are_seen() {
        let mut host = host();
        host.inherited_attributes
            .insert("check_period".into(), "24x7".into());
        assert!("check_period=24x7".parse::<Predicate>().unwrap().matches(&host));
    }

    #[test]
    fn conjunction() {
        let predicates = vec![
            Predicate::new("host_name__startswith", "web").unwrap(),
            Predicate::in_list("hostgroups", vec!["+web, linux".into()], false),
        ];
        assert!(matches_all(&predicates, &host()));
        assert!(matches_all(&[], &host()));
    }

    #[test]
    fn invalid_predicates() {
        assert!(matches!(
            "host_name".parse::<Predicate>(),
            Err(QueryError::Malformed(_))
        ));
        assert!(matches!(
            Predicate::new("host_name__regex", "("),
            Err(QueryError::Regex { .. })
        ));
        assert!(matches!(
            Predicate::new("alias__exists", "maybe"),
            Err(QueryError::NotABoolean { .. })
        ));
    }
}
