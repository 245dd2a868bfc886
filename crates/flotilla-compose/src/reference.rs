//! Parsing of `target[:suffix]` service references using `nom`.
//!
//! Links use the suffix as the alias the target is exposed under.
//! Volumes-from references use it as the access mode (`ro`, `rw`).

use flotilla_common::constants::REFERENCE_SEPARATOR;
use flotilla_common::error::{FlotillaError, Result};
use nom::{
    IResult, Parser,
    bytes::complete::take_while1,
    character::complete::char,
    combinator::{all_consuming, opt, rest},
    sequence::preceded,
};

/// A parsed reference to another service or container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Name of the referenced service or container.
    pub target: String,
    /// Text after the first `:`, if any and non-empty.
    pub suffix: Option<String>,
}

impl Reference {
    /// Parses a raw reference string.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the target part is empty.
    pub fn parse(raw: &str) -> Result<Self> {
        let (_, (target, suffix)) = reference(raw.trim())
            .map_err(|_| FlotillaError::config(format!("malformed reference \"{raw}\"")))?;
        Ok(Self {
            target: target.to_string(),
            suffix: suffix.filter(|s| !s.is_empty()).map(str::to_string),
        })
    }

    /// Returns the alias of a link reference.
    #[must_use]
    pub fn alias(&self) -> Option<&str> {
        self.suffix.as_deref()
    }
}

fn reference(input: &str) -> IResult<&str, (&str, Option<&str>)> {
    all_consuming((
        take_while1(|c: char| c != REFERENCE_SEPARATOR),
        opt(preceded(char(REFERENCE_SEPARATOR), rest)),
    ))
    .parse(input)
}

/// Parses every reference and returns just the targets, in order.
///
/// # Errors
///
/// Returns an error if any reference is malformed.
pub fn targets(raw: &[String]) -> Result<Vec<String>> {
    raw.iter()
        .map(|r| Reference::parse(r).map(|parsed| parsed.target))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_target() {
        let r = Reference::parse("db").unwrap();
        assert_eq!(r.target, "db");
        assert_eq!(r.alias(), None);
    }

    #[test]
    fn target_with_alias() {
        let r = Reference::parse("db:database").unwrap();
        assert_eq!(r.target, "db");
        assert_eq!(r.alias(), Some("database"));
    }

    #[test]
    fn only_first_separator_splits() {
        let r = Reference::parse("db:a:b").unwrap();
        assert_eq!(r.target, "db");
        assert_eq!(r.suffix.as_deref(), Some("a:b"));
    }

    #[test]
    fn empty_suffix_is_absent() {
        let r = Reference::parse("db:").unwrap();
        assert_eq!(r.suffix, None);
    }

    #[test]
    fn empty_target_is_rejected() {
        let err = Reference::parse(":alias").unwrap_err();
        assert!(err.is_configuration_error());
        assert!(Reference::parse("").is_err());
    }

    #[test]
    fn targets_strip_suffixes() {
        let raw = vec!["db:alias".to_string(), "cache".to_string()];
        assert_eq!(targets(&raw).unwrap(), vec!["db", "cache"]);
    }
}
