use crate::pattern::ModulePattern;
use crate::{PathRuleError, Result};
use std::path::PathBuf;

/// Characters that may appear after a backslash in a file template.
const TEMPLATE_ESCAPES: &str = "{\\,=";

#[derive(Debug, Clone, PartialEq, Eq)]
enum TemplateToken {
    Literal(String),
    Group(usize),
}

/// One routing rule: a module pattern paired with a path template. A bare
/// rule (no `=`) matches every module name.
#[derive(Debug, Clone)]
pub struct FileTemplateRule {
    pattern: ModulePattern,
    template: Vec<TemplateToken>,
}

impl FileTemplateRule {
    /// Parse a single `FILE_TEMPLATE` or `MODULE_PATTERN=FILE_TEMPLATE` rule.
    /// The rule text still carries its backslash escapes; they are resolved
    /// here.
    pub fn parse(spec: &str) -> Result<Self> {
        let chars: Vec<char> = spec.chars().collect();
        let mut escaped = false;
        for (i, c) in chars.iter().enumerate() {
            if escaped {
                escaped = false;
                continue;
            }
            if *c == '\\' {
                escaped = true;
                continue;
            }
            if *c == '=' {
                let pattern = ModulePattern::compile(&chars[..i].iter().collect::<String>())?;
                let template = parse_template(&chars[i + 1..], &pattern)?;
                return Ok(Self { pattern, template });
            }
        }
        let pattern = ModulePattern::match_anything();
        let template = parse_template(&chars, &pattern)?;
        Ok(Self { pattern, template })
    }

    /// The substituted template if the pattern matches, else `None`.
    pub fn substitute(&self, module_name: &str) -> Option<String> {
        let captures = self.pattern.captures(module_name)?;
        let mut out = String::new();
        for token in &self.template {
            match token {
                TemplateToken::Literal(text) => out.push_str(text),
                TemplateToken::Group(index) => {
                    out.push_str(captures.get(*index).map(String::as_str).unwrap_or(""))
                }
            }
        }
        Some(out)
    }
}

fn parse_template(chars: &[char], pattern: &ModulePattern) -> Result<Vec<TemplateToken>> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '{' => {
                let close = chars[i + 1..]
                    .iter()
                    .position(|c| *c == '}')
                    .ok_or(PathRuleError::UnclosedGroup)?;
                let name: String = chars[i + 1..i + 1 + close].iter().collect();
                let index = pattern
                    .group_index(&name)
                    .ok_or_else(|| PathRuleError::UndefinedGroup(name.clone()))?;
                if !literal.is_empty() {
                    tokens.push(TemplateToken::Literal(std::mem::take(&mut literal)));
                }
                tokens.push(TemplateToken::Group(index));
                i += close + 1;
            }
            '\\' => {
                if i + 1 < chars.len() && TEMPLATE_ESCAPES.contains(chars[i + 1]) {
                    i += 1;
                    literal.push(chars[i]);
                } else {
                    literal.push('\\');
                }
            }
            c @ (',' | '=') => return Err(PathRuleError::UnescapedDelimiter(c)),
            c => literal.push(c),
        }
        i += 1;
    }
    if !literal.is_empty() {
        tokens.push(TemplateToken::Literal(literal));
    }
    Ok(tokens)
}

/// An ordered rule list compiled from a comma-separated spec. Escaped commas
/// are literal; every error is raised at compile time.
#[derive(Debug, Clone, Default)]
pub struct PathTemplateRules {
    rules: Vec<FileTemplateRule>,
}

impl PathTemplateRules {
    pub fn parse(input: &str) -> Result<Self> {
        let mut rules = Vec::new();
        for spec in split_rules(input) {
            rules.push(FileTemplateRule::parse(&spec)?);
        }
        Ok(Self { rules })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First-match-wins resolution in declaration order. `None` means no
    /// rule matched and the caller supplies its default destination.
    pub fn resolve(&self, module_name: &str) -> Option<PathBuf> {
        self.rules
            .iter()
            .find_map(|rule| rule.substitute(module_name))
            .map(PathBuf::from)
    }
}

/// Split on unescaped commas, keeping escape sequences intact for the rule
/// parser.
fn split_rules(input: &str) -> Vec<String> {
    let mut specs = Vec::new();
    let mut current = String::new();
    let mut escaped = false;
    for c in input.chars() {
        if escaped {
            escaped = false;
            current.push(c);
            continue;
        }
        if c == '\\' {
            escaped = true;
            current.push(c);
            continue;
        }
        if c == ',' {
            specs.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    specs.push(current);
    specs
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn resolve(rules: &str, name: &str) -> Option<String> {
        PathTemplateRules::parse(rules)
            .unwrap()
            .resolve(name)
            .map(|p| p.to_string_lossy().into_owned())
    }

    #[test]
    fn substitutions() {
        let cases = [
            ("*.{ext:so*}=example.{ext}", "hello.so", "example.so"),
            (
                "{stem:*}.{ext:*}={stem}.rw.{ext}",
                "hello.so.3",
                "hello.rw.so.3",
            ),
            (
                "{s1:*}.{s2:*}.{s3:*}.{s4:*}={s3}/{s2}/{s4}/{s1}",
                "a.b.c.d",
                "c/b/d/a",
            ),
            ("*={n}", "'try-to-[escape]'", "'try-to-[escape]'"),
            ("{a:*}-{b:*}={a}1-{b}2", "hello-world", "hello1-world2"),
            (r"{a:*}.{b:*}={a}\\{b}", "hello.world", r"hello\world"),
            (r"{a:*}.{b:*}=dir\{a}\\{b}", "hello.world", r"dir{a}\world"),
            (r"{a:*}.{b:*}=C:\dir\\{a}", "hello.world", r"C:\dir\hello"),
            (r"{g1:hell\\\=0}*=lib/{g1}", r"hell\=0_world", r"lib/hell\=0"),
        ];
        for (rule, name, expected) in cases {
            let parsed = FileTemplateRule::parse(rule).unwrap();
            assert_eq!(
                parsed.substitute(name).as_deref(),
                Some(expected),
                "applying {:?} to {:?}",
                rule,
                name
            );
        }
    }

    #[test]
    fn named_group_feeds_template() {
        assert_eq!(
            resolve("{name:ab*}=out_{name}.s", "abcdef"),
            Some("out_abcdef.s".to_string())
        );
    }

    #[test]
    fn first_match_wins_and_non_matches_fall_through() {
        let rules = PathTemplateRules::parse("mod1=a.s,mod2=b.s").unwrap();
        assert_eq!(rules.resolve("mod1"), Some(PathBuf::from("a.s")));
        assert_eq!(rules.resolve("mod2"), Some(PathBuf::from("b.s")));
        assert_eq!(rules.resolve("mod3"), None);
    }

    #[test]
    fn escaped_comma_is_a_literal_filename() {
        assert_eq!(
            resolve(r"foo\,bar.s", "anything"),
            Some("foo,bar.s".to_string())
        );
    }

    #[test]
    fn bare_rule_matches_everything() {
        let rules = PathTemplateRules::parse("{n}.s").unwrap();
        assert_eq!(rules.resolve("ex"), Some(PathBuf::from("ex.s")));
    }

    #[test]
    fn declaration_order_with_fallback_rule() {
        let rules = PathTemplateRules::parse("{s:*}.{ext:so*}={s}.rewritten.{ext},{n}").unwrap();
        assert_eq!(
            rules.resolve("libc.so.6"),
            Some(PathBuf::from("libc.rewritten.so.6"))
        );
        assert_eq!(rules.resolve("eq"), Some(PathBuf::from("eq")));
    }

    #[test]
    fn no_fallback_means_none() {
        let rules = PathTemplateRules::parse("{s:*}.{ext:so*}={s}.rewritten.{ext}").unwrap();
        assert_eq!(rules.resolve("ex"), None);
    }

    #[test]
    fn escaped_braces_round_trip() {
        let rules = PathTemplateRules::parse(r"\{{s:*}\}\{{t:*}\}={s}.{t}").unwrap();
        assert_eq!(
            rules.resolve("{hello}{world}"),
            Some(PathBuf::from("hello.world"))
        );
    }

    #[test]
    fn whole_match_alias_survives_special_characters() {
        let rules = PathTemplateRules::parse(r"\{\[$.\,\=\]\}={name}").unwrap();
        assert_eq!(rules.resolve("{[$.,=]}"), Some(PathBuf::from("{[$.,=]}")));
    }

    #[test]
    fn compile_time_errors() {
        assert_eq!(
            FileTemplateRule::parse("{s%:*}.so={s%}").unwrap_err(),
            PathRuleError::InvalidGroupName('%')
        );
        assert_eq!(
            FileTemplateRule::parse("{g1:{hello}}.*={g1}").unwrap_err(),
            PathRuleError::UnescapedDelimiter('{')
        );
        assert!(FileTemplateRule::parse("{g1:*.so=hello_{g1}").is_err());
        assert_eq!(
            FileTemplateRule::parse("{g1:[*]}").unwrap_err(),
            PathRuleError::UndefinedGroup("g1:[*]".to_string())
        );
        assert!(FileTemplateRule::parse("{g1:hell=0}").is_err());

        // One of the two '='s needs to be escaped.
        assert_eq!(
            PathTemplateRules::parse("{g1:yes}=4={g1}.s").unwrap_err(),
            PathRuleError::UnescapedDelimiter('=')
        );
    }
}
