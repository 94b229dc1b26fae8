/*! Route module names to output file paths.
 *
 * A rule list like `{stem:*}.{ext:so*}={stem}.rewritten.{ext},{n}` decides
 * where each module's assembly lands: module-name globs with named capture
 * groups on the left, path templates referencing those groups on the right.
 * Rules are compiled once, up front; resolution walks them in declaration
 * order and takes the first match.
 */

pub mod pattern;
pub mod rules;

pub use pattern::ModulePattern;
pub use rules::{FileTemplateRule, PathTemplateRules};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathRuleError {
    #[error("unclosed '{{' in pattern")]
    UnclosedGroup,
    #[error("undefined group: {{{0}}}")]
    UndefinedGroup(String),
    #[error("character '{0}' must be escaped")]
    UnescapedDelimiter(char),
    #[error("invalid character in group name: '{0}'")]
    InvalidGroupName(char),
    #[error("all groups must be named")]
    EmptyGroupName,
    #[error("invalid module pattern: {0}")]
    InvalidPattern(String),
}

pub type Result<T> = std::result::Result<T, PathRuleError>;
