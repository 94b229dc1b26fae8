use crate::{PathRuleError, Result};
use regex::Regex;
use std::collections::BTreeMap;

/// Characters that may appear after a backslash in a module pattern. A
/// backslash before anything else is a literal backslash.
const PATTERN_ESCAPES: &str = "\\=,{}:*?[]";

/// A compiled module-name matcher.
///
/// Grammar: literals, `*` (non-greedy any run), `?` (single character), and
/// `{name:subpattern}` named groups. The pattern compiles to an anchored
/// regex; groups are positional, with a name-to-index table on the side. Two
/// implicit names, `name` and `n`, always alias the whole match.
#[derive(Debug, Clone)]
pub struct ModulePattern {
    regex: Regex,
    group_indexes: BTreeMap<String, usize>,
}

impl ModulePattern {
    /// The default pattern for a bare rule: matches any module name.
    pub fn match_anything() -> Self {
        Self::compile("*").expect("the universal pattern always compiles")
    }

    pub fn compile(spec: &str) -> Result<Self> {
        let mut group_indexes = BTreeMap::new();
        group_indexes.insert("name".to_string(), 0);
        group_indexes.insert("n".to_string(), 0);

        let chars: Vec<char> = spec.chars().collect();
        let mut body = String::new();
        let mut group_names = Vec::new();
        let mut open_group = false;
        let mut i = 0;
        while i < chars.len() {
            match chars[i] {
                '{' => {
                    if open_group {
                        return Err(PathRuleError::UnescapedDelimiter('{'));
                    }
                    open_group = true;
                    body.push('(');
                    i += 1;
                    let name_start = i;
                    while i < chars.len() && is_group_name_char(chars[i]) {
                        i += 1;
                    }
                    if i == chars.len() {
                        return Err(PathRuleError::UnclosedGroup);
                    }
                    if chars[i] != ':' {
                        return Err(PathRuleError::InvalidGroupName(chars[i]));
                    }
                    if i == name_start {
                        return Err(PathRuleError::EmptyGroupName);
                    }
                    group_names.push(chars[name_start..i].iter().collect::<String>());
                }
                '}' => {
                    if open_group {
                        body.push(')');
                        open_group = false;
                    } else {
                        body.push_str("\\}");
                    }
                }
                '*' => body.push_str(".*?"),
                '?' => body.push('.'),
                '\\' => {
                    if i + 1 < chars.len() && PATTERN_ESCAPES.contains(chars[i + 1]) {
                        i += 1;
                        body.push_str(&regex::escape(&chars[i].to_string()));
                    } else {
                        body.push_str("\\\\");
                    }
                }
                c => body.push_str(&regex::escape(&c.to_string())),
            }
            i += 1;
        }
        if open_group {
            return Err(PathRuleError::UnclosedGroup);
        }

        for (position, name) in group_names.into_iter().enumerate() {
            group_indexes.insert(name, position + 1);
        }

        let regex = Regex::new(&format!("^(?:{})$", body))
            .map_err(|e| PathRuleError::InvalidPattern(e.to_string()))?;
        Ok(Self {
            regex,
            group_indexes,
        })
    }

    pub fn group_index(&self, name: &str) -> Option<usize> {
        self.group_indexes.get(name).copied()
    }

    pub fn matches(&self, module_name: &str) -> bool {
        self.regex.is_match(module_name)
    }

    /// Capture-group texts by position, group 0 being the whole match.
    pub fn captures(&self, module_name: &str) -> Option<Vec<String>> {
        self.regex.captures(module_name).map(|caps| {
            (0..caps.len())
                .map(|i| caps.get(i).map(|m| m.as_str().to_string()).unwrap_or_default())
                .collect()
        })
    }
}

fn is_group_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn globs_match_module_names() {
        let cases = [
            ("{stem:\\{*\\}}.*", "{hello}.world"),
            ("{stem:*}.{ext:so*}", "libc.so.0"),
            ("*.{ext:so*}", "libc.so.0"),
            ("{s:*}.{e:so*}", "libc.so.0"),
            ("libc.so", "libc.so"),
            ("lib^.so", "lib^.so"),
            ("lib\\w.so", "lib\\w.so"),
            ("lib$.so", "lib$.so"),
            ("lib().so", "lib().so"),
            ("lib\\(", "lib\\("),
            ("(?:hello)", "(?:hello)"),
            ("lib?.so", "liba.so"),
            ("lib?.so", "lib..so"),
        ];
        for (spec, name) in cases {
            let p = ModulePattern::compile(spec).unwrap();
            assert!(p.matches(name), "pattern {:?} should match {:?}", spec, name);
        }
    }

    #[test]
    fn regex_metacharacters_stay_literal() {
        for meta in ['^', '$', '.', '+', '(', ')', '|'] {
            let spec = format!("lib{}", meta);
            let p = ModulePattern::compile(&spec).unwrap();
            assert!(p.matches(&spec), "character {:?} handled wrong", meta);

            let escaped = format!("lib\\{}", meta);
            let p = ModulePattern::compile(&escaped).unwrap();
            assert!(p.matches(&escaped), "character {:?} handled wrong", meta);
        }
    }

    #[test]
    fn star_is_non_greedy_per_group() {
        let p = ModulePattern::compile("{stem:*}.{ext:*}").unwrap();
        let caps = p.captures("hello.so.3").unwrap();
        assert_eq!(caps[1], "hello");
        assert_eq!(caps[2], "so.3");
    }

    #[test]
    fn group_indexes_count_from_one() {
        let p = ModulePattern::compile("{stem:*}.{ext:so*}").unwrap();
        assert_eq!(p.group_index("stem"), Some(1));
        assert_eq!(p.group_index("ext"), Some(2));
        assert_eq!(p.group_index("name"), Some(0));
        assert_eq!(p.group_index("n"), Some(0));
        assert_eq!(p.group_index("missing"), None);
    }

    #[test]
    fn question_mark_matches_exactly_one_char() {
        let p = ModulePattern::compile("lib?.so").unwrap();
        assert!(p.matches("liba.so"));
        assert!(!p.matches("lib.so"));
        assert!(!p.matches("libab.so"));
    }

    #[test]
    fn malformed_patterns_are_compile_errors() {
        assert_eq!(
            ModulePattern::compile("{s%:*}").unwrap_err(),
            PathRuleError::InvalidGroupName('%')
        );
        assert_eq!(
            ModulePattern::compile("{g1:{hello}}").unwrap_err(),
            PathRuleError::UnescapedDelimiter('{')
        );
        assert_eq!(
            ModulePattern::compile("{g1:*.so").unwrap_err(),
            PathRuleError::UnclosedGroup
        );
        assert_eq!(
            ModulePattern::compile("{:*}").unwrap_err(),
            PathRuleError::EmptyGroupName
        );
    }
}
