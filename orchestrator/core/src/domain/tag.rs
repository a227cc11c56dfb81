// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Tag Schema
//!
//! Typed, validated configuration parameters declared by templates and
//! overridden per server instance.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Declares tag types and the validation rules applied to tag values

use serde::{Deserialize, Serialize};
use std::fmt;

/// Value type of a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagType {
    #[default]
    String,
    Int,
    Boolean,
    Choice,
}

impl TagType {
    /// Parses a type name as written in a template manifest (case-insensitive).
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "string" => Some(TagType::String),
            "int" | "integer" => Some(TagType::Int),
            "boolean" | "bool" => Some(TagType::Boolean),
            "choice" => Some(TagType::Choice),
            _ => None,
        }
    }
}

impl fmt::Display for TagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TagType::String => "string",
            TagType::Int => "int",
            TagType::Boolean => "boolean",
            TagType::Choice => "choice",
        };
        f.write_str(name)
    }
}

/// Declaration of a single tag on a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagDefinition {
    pub name: String,

    #[serde(rename = "type", default)]
    pub tag_type: TagType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(rename = "default", default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,

    #[serde(default)]
    pub required: bool,

    /// Permission node required to change the tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission: Option<String>,

    /// Allowed values for `choice` tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
}

impl TagDefinition {
    pub fn new(name: impl Into<String>, tag_type: TagType) -> Self {
        Self {
            name: name.into(),
            tag_type,
            description: None,
            default_value: None,
            required: false,
            permission: None,
            choices: Vec::new(),
        }
    }

    /// Returns true when `input` is acceptable for this tag.
    ///
    /// Choice tags compare case-insensitively. Booleans accept only
    /// `true`/`false` in any case.
    pub fn validate(&self, input: &str) -> bool {
        match self.tag_type {
            TagType::String => true,
            TagType::Int => input.parse::<i32>().is_ok(),
            TagType::Boolean => {
                input.eq_ignore_ascii_case("true") || input.eq_ignore_ascii_case("false")
            }
            TagType::Choice => self.choices.iter().any(|c| c.eq_ignore_ascii_case(input)),
        }
    }

    /// Enumerable values for this tag, empty when the domain is open.
    pub fn options(&self) -> Vec<String> {
        match self.tag_type {
            TagType::Choice => self.choices.clone(),
            TagType::Boolean => vec!["true".to_string(), "false".to_string()],
            TagType::String | TagType::Int => Vec::new(),
        }
    }

    /// Human readable description, falling back to the tag name.
    pub fn describe(&self) -> &str {
        self.description.as_deref().unwrap_or(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn choice(values: &[&str]) -> TagDefinition {
        let mut tag = TagDefinition::new("difficulty", TagType::Choice);
        tag.choices = values.iter().map(|v| v.to_string()).collect();
        tag
    }

    #[test]
    fn test_parse_tag_type() {
        assert_eq!(TagType::parse("STRING"), Some(TagType::String));
        assert_eq!(TagType::parse("int"), Some(TagType::Int));
        assert_eq!(TagType::parse("Boolean"), Some(TagType::Boolean));
        assert_eq!(TagType::parse("choice"), Some(TagType::Choice));
        assert_eq!(TagType::parse("float"), None);
    }

    #[test]
    fn test_validate_string_accepts_anything() {
        let tag = TagDefinition::new("motd", TagType::String);
        assert!(tag.validate(""));
        assert!(tag.validate("hello world"));
    }

    #[test]
    fn test_validate_int() {
        let tag = TagDefinition::new("max-players", TagType::Int);
        assert!(tag.validate("20"));
        assert!(tag.validate("-3"));
        assert!(!tag.validate("twenty"));
        assert!(!tag.validate("1.5"));
        assert!(!tag.validate("99999999999"));
    }

    #[test]
    fn test_validate_boolean_is_case_insensitive() {
        let tag = TagDefinition::new("pvp", TagType::Boolean);
        assert!(tag.validate("true"));
        assert!(tag.validate("FALSE"));
        assert!(!tag.validate("yes"));
        assert!(!tag.validate("1"));
    }

    #[test]
    fn test_validate_choice() {
        let tag = choice(&["peaceful", "easy", "hard"]);
        assert!(tag.validate("EASY"));
        assert!(tag.validate("hard"));
        assert!(!tag.validate("normal"));
    }

    #[test]
    fn test_options() {
        assert_eq!(choice(&["a", "b"]).options(), vec!["a", "b"]);
        assert_eq!(
            TagDefinition::new("pvp", TagType::Boolean).options(),
            vec!["true", "false"]
        );
        assert!(TagDefinition::new("motd", TagType::String).options().is_empty());
        assert!(TagDefinition::new("port", TagType::Int).options().is_empty());
    }
}
