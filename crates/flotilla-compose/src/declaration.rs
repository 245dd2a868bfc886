//! Service declarations built from a configuration mapping.
//!
//! A declaration is the static description of one service before its
//! references are resolved. Every key other than `links` and
//! `volumes_from` is kept verbatim in [`ServiceDeclaration::options`].

use flotilla_common::constants::{LINKS_KEY, VOLUMES_FROM_KEY};
use flotilla_common::error::{FlotillaError, Result};
use serde_yaml::{Mapping, Value};

use crate::reference;

/// A named service configuration prior to dependency resolution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceDeclaration {
    /// Service name, unique within a project.
    pub name: String,
    /// Raw `target[:alias]` link references.
    pub links: Vec<String>,
    /// Raw `target[:mode]` volumes-from references.
    pub volumes_from: Vec<String>,
    /// Remaining options, passed through untouched.
    pub options: Mapping,
}

impl ServiceDeclaration {
    /// Creates a declaration with no references or options.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the link references.
    #[must_use]
    pub fn with_links<I, S>(mut self, links: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.links = links.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the volumes-from references.
    #[must_use]
    pub fn with_volumes_from<I, S>(mut self, volumes_from: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.volumes_from = volumes_from.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a pass-through option.
    #[must_use]
    pub fn with_option(mut self, key: &str, value: impl Into<Value>) -> Self {
        let _ = self.options.insert(Value::from(key), value.into());
        self
    }

    /// Names of the services this declaration links to.
    ///
    /// # Errors
    ///
    /// Returns an error if a link reference is malformed.
    pub fn link_targets(&self) -> Result<Vec<String>> {
        reference::targets(&self.links)
    }

    /// Names of the services or containers this declaration mounts volumes from.
    ///
    /// # Errors
    ///
    /// Returns an error if a volumes-from reference is malformed.
    pub fn volume_targets(&self) -> Result<Vec<String>> {
        reference::targets(&self.volumes_from)
    }
}

/// Converts a configuration mapping into declarations, in mapping order.
///
/// Every entry is validated before any declaration is returned, so a bad
/// entry anywhere fails the whole set.
///
/// # Errors
///
/// Returns a configuration error if a key is not a string, a value is not a
/// mapping, or `links` / `volumes_from` is not a list of strings.
pub fn from_config(config: &Mapping) -> Result<Vec<ServiceDeclaration>> {
    config
        .iter()
        .map(|(key, value)| {
            let name = key.as_str().ok_or_else(|| {
                FlotillaError::config(format!("service name {key:?} must be a string"))
            })?;
            from_entry(name, value)
        })
        .collect()
}

fn from_entry(name: &str, value: &Value) -> Result<ServiceDeclaration> {
    let Value::Mapping(options) = value else {
        return Err(FlotillaError::config(format!(
            "service \"{name}\" doesn't have any configuration options. \
             All top level keys in your configuration must map to a \
             mapping of configuration options."
        )));
    };

    let mut options = options.clone();
    let links = take_string_list(&mut options, name, LINKS_KEY)?;
    let volumes_from = take_string_list(&mut options, name, VOLUMES_FROM_KEY)?;

    Ok(ServiceDeclaration {
        name: name.to_string(),
        links,
        volumes_from,
        options,
    })
}

fn take_string_list(options: &mut Mapping, owner: &str, key: &str) -> Result<Vec<String>> {
    match options.shift_remove(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Sequence(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                other => Err(FlotillaError::config(format!(
                    "service \"{owner}\" has a non-string entry in {key}: {other:?}"
                ))),
            })
            .collect(),
        Some(other) => Err(FlotillaError::config(format!(
            "service \"{owner}\" must declare {key} as a list, got {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Mapping {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn entries_become_declarations_in_order() {
        let config = parse(
            "web:\n  image: busybox:latest\n  links: [db, 'cache:redis']\ndb:\n  image: postgres\n",
        );
        let decls = from_config(&config).unwrap();
        assert_eq!(decls.len(), 2);
        assert_eq!(decls[0].name, "web");
        assert_eq!(decls[0].links, vec!["db", "cache:redis"]);
        assert_eq!(decls[1].name, "db");
        assert!(decls[1].links.is_empty());
    }

    #[test]
    fn references_are_removed_from_options() {
        let config = parse("db:\n  image: postgres\n  volumes_from: [data]\n");
        let decls = from_config(&config).unwrap();
        assert_eq!(decls[0].volumes_from, vec!["data"]);
        assert!(!decls[0].options.contains_key("volumes_from"));
        assert_eq!(
            decls[0].options.get("image").and_then(Value::as_str),
            Some("postgres")
        );
    }

    #[test]
    fn non_mapping_value_is_rejected() {
        let config = parse("web: busybox:latest\n");
        let err = from_config(&config).unwrap_err();
        assert!(err.is_configuration_error());
        assert!(err.to_string().contains("web"), "got: {err}");
    }

    #[test]
    fn bad_entry_anywhere_fails_all() {
        let config = parse("db:\n  image: postgres\nweb: 42\n");
        assert!(from_config(&config).is_err());
    }

    #[test]
    fn links_must_be_a_list_of_strings() {
        let config = parse("web:\n  links: db\n");
        assert!(from_config(&config).is_err());
        let config = parse("web:\n  links: [1]\n");
        assert!(from_config(&config).is_err());
    }

    #[test]
    fn null_links_mean_none() {
        let config = parse("web:\n  links:\n");
        let decls = from_config(&config).unwrap();
        assert!(decls[0].links.is_empty());
    }

    #[test]
    fn builder_sets_fields() {
        let decl = ServiceDeclaration::new("web")
            .with_links(["db:database"])
            .with_volumes_from(["data:ro"])
            .with_option("image", "busybox");
        assert_eq!(decl.link_targets().unwrap(), vec!["db"]);
        assert_eq!(decl.volume_targets().unwrap(), vec!["data"]);
        assert!(decl.options.contains_key("image"));
    }
}
