//! Placeholder syntax.
//!
//! A template is literal text interleaved with `{{ reference }}` placeholders. Parsing is a
//! small recursive descent over the source: placeholder bodies are located by tracking
//! `{{`/`}}` depth and skipping quoted strings, and plugin call arguments are themselves
//! parsed as templates so nesting such as
//! `{{plugins.a.f("{{plugins.b.g()}}")}}` is represented structurally rather than
//! re-scanned with regular expressions.
//!
//! Reference forms:
//!
//! - `name` - unqualified lookup following scope precedence
//! - `env.NAME`, `profile.NAME`, `api.NAME`, `endpoint.NAME`, `secret.NAME`
//! - `plugins.<plugin>.<member>` - zero-argument variable source
//! - `plugins.<plugin>.<function>(arg, ...)` - parameterized source
//! - `steps.<id>.<path>` - traversal into a recorded step (`response.body.items[0].id`)
//!
//! Any reference may end in `?` to mark it optional. `\{{` renders a literal `{{`, and a
//! `{{` without a matching `}}` is kept as literal text.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::TemplateError;

/// Bare numeric call arguments: optional sign, digits with an optional fraction, and an
/// optional exponent. Words such as `inf` or `NaN` are not numbers here.
static NUMBER_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?$").expect("number literal regex should compile"));

/// Parsed template: an ordered list of literal and placeholder segments.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Template {
    segments: Vec<Segment>,
}

/// One piece of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Placeholder(Reference),
}

/// A parsed placeholder body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Trimmed reference text without the optional marker; used in diagnostics.
    pub raw: String,
    /// True when the reference ended in `?`.
    pub optional: bool,
    pub kind: ReferenceKind,
}

/// Namespaces that address a single scope directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Env,
    Profile,
    Api,
    Endpoint,
    Secret,
}

const SCOPE_PREFIXES: &[(&str, Scope)] = &[
    ("env.", Scope::Env),
    ("profile.", Scope::Profile),
    ("api.", Scope::Api),
    ("endpoint.", Scope::Endpoint),
    ("secret.", Scope::Secret),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceKind {
    /// Unqualified name resolved by precedence.
    Variable(String),
    /// Namespaced lookup in exactly one scope.
    Scoped { scope: Scope, name: String },
    PluginVariable { plugin: String, member: String },
    PluginCall {
        plugin: String,
        function: String,
        arguments: Vec<Template>,
    },
    /// `steps.<id>` followed by dotted/indexed path segments.
    Step { step_id: String, path: Vec<String> },
}

impl Template {
    /// Parses a template string.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut position = 0;

        while position < source.len() {
            let rest = &source[position..];
            if rest.starts_with("\\{{") {
                literal.push_str("{{");
                position += 3;
                continue;
            }
            if rest.starts_with("{{") {
                let Some(end) = find_placeholder_end(source, position + 2) else {
                    literal.push_str(rest);
                    break;
                };
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                let reference = parse_reference(&source[position + 2..end])?;
                segments.push(Segment::Placeholder(reference));
                position = end + 2;
                continue;
            }
            let Some(character) = rest.chars().next() else {
                break;
            };
            literal.push(character);
            position += character.len_utf8();
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self { segments })
    }

    /// Template consisting of a single literal segment.
    pub fn literal(text: impl Into<String>) -> Self {
        let text = text.into();
        if text.is_empty() {
            return Self::default();
        }
        Self {
            segments: vec![Segment::Literal(text)],
        }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Top-level placeholders in source order. Nested argument templates are not included.
    pub fn references(&self) -> impl Iterator<Item = &Reference> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Placeholder(reference) => Some(reference),
            Segment::Literal(_) => None,
        })
    }

    /// True when the template has no placeholders.
    pub fn is_literal(&self) -> bool {
        self.references().next().is_none()
    }
}

/// Cheap pre-check used to skip parsing for plain strings.
pub fn contains_placeholder(text: &str) -> bool {
    text.contains("{{")
}

/// Finds the `}}` that closes a placeholder opened just before `start`.
fn find_placeholder_end(source: &str, start: usize) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut depth = 0usize;
    let mut index = start;

    while index < bytes.len() {
        match bytes[index] {
            b'"' | b'\'' => {
                index = skip_quoted(bytes, index)?;
                continue;
            }
            b'{' if bytes.get(index + 1) == Some(&b'{') => {
                depth += 1;
                index += 2;
                continue;
            }
            b'}' if bytes.get(index + 1) == Some(&b'}') => {
                if depth == 0 {
                    return Some(index);
                }
                depth -= 1;
                index += 2;
                continue;
            }
            _ => index += 1,
        }
    }
    None
}

/// Returns the index just past the closing quote of the string starting at `start`.
fn skip_quoted(bytes: &[u8], start: usize) -> Option<usize> {
    let quote = bytes[start];
    let mut index = start + 1;
    while index < bytes.len() {
        match bytes[index] {
            b'\\' => index += 2,
            byte if byte == quote => return Some(index + 1),
            _ => index += 1,
        }
    }
    None
}

fn parse_reference(inner: &str) -> Result<Reference, TemplateError> {
    let trimmed = inner.trim();
    let (body, optional) = match trimmed.strip_suffix('?') {
        Some(body) => (body.trim_end(), true),
        None => (trimmed, false),
    };
    if body.is_empty() {
        return Err(TemplateError::EmptyReference);
    }

    let kind = parse_reference_kind(body)?;
    Ok(Reference {
        raw: body.to_string(),
        optional,
        kind,
    })
}

fn parse_reference_kind(body: &str) -> Result<ReferenceKind, TemplateError> {
    if let Some(rest) = body.strip_prefix("plugins.") {
        return parse_plugin_reference(body, rest);
    }
    if let Some(rest) = body.strip_prefix("steps.") {
        return parse_step_reference(body, rest);
    }
    for (prefix, scope) in SCOPE_PREFIXES {
        if let Some(name) = body.strip_prefix(prefix) {
            if !is_name(name) {
                return Err(TemplateError::malformed(body, format!("expected a variable name after '{prefix}'")));
            }
            return Ok(ReferenceKind::Scoped {
                scope: *scope,
                name: name.to_string(),
            });
        }
    }
    if !is_name(body) {
        return Err(TemplateError::malformed(body, "not a valid variable name"));
    }
    Ok(ReferenceKind::Variable(body.to_string()))
}

fn is_name(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate
            .chars()
            .all(|character| !character.is_whitespace() && !matches!(character, '(' | ')' | '"' | '\'' | '{' | '}' | ','))
}

fn is_identifier(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate
            .chars()
            .all(|character| character.is_ascii_alphanumeric() || character == '_' || character == '-')
}

fn parse_plugin_reference(body: &str, rest: &str) -> Result<ReferenceKind, TemplateError> {
    let Some((plugin, member)) = rest.split_once('.') else {
        return Err(TemplateError::malformed(body, "expected 'plugins.<plugin>.<member>'"));
    };
    if !is_identifier(plugin) {
        return Err(TemplateError::malformed(body, "plugin name must be alphanumeric"));
    }

    let member = member.trim_end();
    let Some(open) = member.find('(') else {
        if !is_identifier(member) {
            return Err(TemplateError::malformed(body, "plugin member must be alphanumeric"));
        }
        return Ok(ReferenceKind::PluginVariable {
            plugin: plugin.to_string(),
            member: member.to_string(),
        });
    };

    let function = member[..open].trim();
    if !is_identifier(function) {
        return Err(TemplateError::malformed(body, "plugin function name must be alphanumeric"));
    }
    let Some(argument_source) = member[open + 1..].strip_suffix(')') else {
        return Err(TemplateError::malformed(body, "missing closing ')' in plugin call"));
    };
    let arguments = parse_arguments(body, argument_source)?;

    Ok(ReferenceKind::PluginCall {
        plugin: plugin.to_string(),
        function: function.to_string(),
        arguments,
    })
}

/// Splits call arguments on top-level commas and parses each as a template.
fn parse_arguments(body: &str, source: &str) -> Result<Vec<Template>, TemplateError> {
    if source.trim().is_empty() {
        return Ok(Vec::new());
    }

    let bytes = source.as_bytes();
    let mut pieces = Vec::new();
    let mut piece_start = 0;
    let mut brace_depth = 0usize;
    let mut paren_depth = 0usize;
    let mut index = 0;

    while index < bytes.len() {
        match bytes[index] {
            b'"' | b'\'' => {
                index = skip_quoted(bytes, index).ok_or_else(|| TemplateError::malformed(body, "unterminated string argument"))?;
                continue;
            }
            b'{' if bytes.get(index + 1) == Some(&b'{') => {
                brace_depth += 1;
                index += 2;
                continue;
            }
            b'}' if brace_depth > 0 && bytes.get(index + 1) == Some(&b'}') => {
                brace_depth -= 1;
                index += 2;
                continue;
            }
            b'(' => paren_depth += 1,
            b')' => paren_depth = paren_depth.saturating_sub(1),
            b',' if brace_depth == 0 && paren_depth == 0 => {
                pieces.push(&source[piece_start..index]);
                piece_start = index + 1;
            }
            _ => {}
        }
        index += 1;
    }
    pieces.push(&source[piece_start..]);

    pieces.into_iter().map(|piece| parse_argument(body, piece.trim())).collect()
}

fn parse_argument(body: &str, argument: &str) -> Result<Template, TemplateError> {
    if argument.is_empty() {
        return Err(TemplateError::malformed(body, "empty argument in plugin call"));
    }

    let first = argument.as_bytes()[0];
    if (first == b'"' || first == b'\'') && argument.len() >= 2 && argument.as_bytes()[argument.len() - 1] == first {
        let content = unescape(&argument[1..argument.len() - 1]);
        return Template::parse(&content);
    }
    if argument.starts_with("{{") && argument.ends_with("}}") {
        return Template::parse(argument);
    }
    if NUMBER_LITERAL.is_match(argument) {
        return Ok(Template::literal(argument));
    }
    Err(TemplateError::malformed(
        body,
        format!("argument '{argument}' must be a quoted string, a number, or a template"),
    ))
}

fn unescape(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut characters = text.chars().peekable();
    while let Some(character) = characters.next() {
        if character == '\\'
            && let Some(&next) = characters.peek()
            && matches!(next, '\\' | '"' | '\'')
        {
            output.push(next);
            characters.next();
            continue;
        }
        output.push(character);
    }
    output
}

fn parse_step_reference(body: &str, rest: &str) -> Result<ReferenceKind, TemplateError> {
    let split_index = rest.find(['.', '[']).unwrap_or(rest.len());
    let step_id = &rest[..split_index];
    if !is_identifier(step_id) {
        return Err(TemplateError::malformed(body, "step id must be alphanumeric"));
    }
    let path = split_path(&rest[split_index..]).ok_or_else(|| TemplateError::malformed(body, "unterminated '[' in step path"))?;
    Ok(ReferenceKind::Step {
        step_id: step_id.to_string(),
        path,
    })
}

/// Splits `a.b[0]["c"]` into `["a", "b", "0", "c"]`.
fn split_path(path: &str) -> Option<Vec<String>> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut characters = path.chars();

    while let Some(character) = characters.next() {
        match character {
            '.' => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
            }
            '[' => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
                let mut inner = String::new();
                let mut closed = false;
                for next_character in characters.by_ref() {
                    if next_character == ']' {
                        closed = true;
                        break;
                    }
                    inner.push(next_character);
                }
                if !closed {
                    return None;
                }
                segments.push(inner.trim().trim_matches(['"', '\'']).to_string());
            }
            _ => current.push(character),
        }
    }

    if !current.is_empty() {
        segments.push(current);
    }
    Some(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_reference(source: &str) -> Reference {
        let template = Template::parse(source).expect("template parses");
        let mut references = template.references();
        let reference = references.next().expect("one reference").clone();
        assert!(references.next().is_none());
        reference
    }

    #[test]
    fn parses_literals_and_placeholders_in_order() {
        let template = Template::parse("GET {{ baseUrl }}/users/{{id}}?x=1").expect("parse");
        assert_eq!(
            template.segments(),
            &[
                Segment::Literal("GET ".into()),
                Segment::Placeholder(Reference {
                    raw: "baseUrl".into(),
                    optional: false,
                    kind: ReferenceKind::Variable("baseUrl".into()),
                }),
                Segment::Literal("/users/".into()),
                Segment::Placeholder(Reference {
                    raw: "id".into(),
                    optional: false,
                    kind: ReferenceKind::Variable("id".into()),
                }),
                Segment::Literal("?x=1".into()),
            ]
        );
    }

    #[test]
    fn optional_marker_is_stripped_from_raw() {
        let reference = single_reference("{{ format? }}");
        assert!(reference.optional);
        assert_eq!(reference.raw, "format");
        assert_eq!(reference.kind, ReferenceKind::Variable("format".into()));
    }

    #[test]
    fn namespaced_scopes() {
        assert_eq!(
            single_reference("{{env.HOME}}").kind,
            ReferenceKind::Scoped {
                scope: Scope::Env,
                name: "HOME".into()
            }
        );
        assert_eq!(
            single_reference("{{secret.API_KEY}}").kind,
            ReferenceKind::Scoped {
                scope: Scope::Secret,
                name: "API_KEY".into()
            }
        );
        assert!(matches!(
            Template::parse("{{profile.}}"),
            Err(TemplateError::MalformedReference { .. })
        ));
    }

    #[test]
    fn plugin_variable_and_call() {
        assert_eq!(
            single_reference("{{plugins.auth.token}}").kind,
            ReferenceKind::PluginVariable {
                plugin: "auth".into(),
                member: "token".into()
            }
        );

        let reference = single_reference(r#"{{plugins.core.concat("a, b", 42, '{{name}}')}}"#);
        let ReferenceKind::PluginCall {
            plugin,
            function,
            arguments,
        } = reference.kind
        else {
            panic!("expected plugin call");
        };
        assert_eq!(plugin, "core");
        assert_eq!(function, "concat");
        assert_eq!(arguments.len(), 3);
        assert_eq!(arguments[0], Template::literal("a, b"));
        assert_eq!(arguments[1], Template::literal("42"));
        assert_eq!(arguments[2].references().next().map(|r| r.raw.as_str()), Some("name"));
    }

    #[test]
    fn nested_calls_parse_recursively() {
        let reference = single_reference(r#"{{plugins.a.f("{{plugins.b.g("{{plugins.c.h()}}")}}")}}"#);
        let ReferenceKind::PluginCall { arguments, .. } = reference.kind else {
            panic!("expected outer call");
        };
        let middle = arguments[0].references().next().expect("middle reference");
        let ReferenceKind::PluginCall { function, arguments, .. } = &middle.kind else {
            panic!("expected middle call");
        };
        assert_eq!(function, "g");
        let inner = arguments[0].references().next().expect("inner reference");
        assert_eq!(
            inner.kind,
            ReferenceKind::PluginCall {
                plugin: "c".into(),
                function: "h".into(),
                arguments: vec![]
            }
        );
    }

    #[test]
    fn unquoted_template_argument() {
        let reference = single_reference("{{plugins.a.f({{plugins.b.g()}}, 1)}}");
        let ReferenceKind::PluginCall { arguments, .. } = reference.kind else {
            panic!("expected call");
        };
        assert_eq!(arguments.len(), 2);
        assert!(!arguments[0].is_literal());
    }

    #[test]
    fn malformed_calls_are_rejected() {
        assert!(Template::parse("{{plugins.a.f(bare)}}").is_err());
        assert!(Template::parse("{{plugins.a.f(1,)}}").is_err());
        assert!(Template::parse("{{plugins.onlyplugin}}").is_err());
        assert!(Template::parse("{{plugins.a.f(1}}").is_err());
    }

    #[test]
    fn numeric_arguments_must_be_decimal() {
        for number in ["1", "-2.5", "+3", ".5", "1e3", "6.02E-23"] {
            assert!(Template::parse(&format!("{{{{plugins.a.f({number})}}}}")).is_ok(), "{number}");
        }
        for word in ["inf", "NaN", "infinity", "-inf", "1e", "0x10"] {
            assert!(Template::parse(&format!("{{{{plugins.a.f({word})}}}}")).is_err(), "{word}");
        }
    }

    #[test]
    fn step_paths_accept_dots_and_brackets() {
        assert_eq!(
            single_reference(r#"{{steps.login.response.body.items[0]["x-id"]}}"#).kind,
            ReferenceKind::Step {
                step_id: "login".into(),
                path: vec!["response".into(), "body".into(), "items".into(), "0".into(), "x-id".into()],
            }
        );
    }

    #[test]
    fn empty_reference_is_an_error() {
        assert_eq!(Template::parse("a {{ }} b"), Err(TemplateError::EmptyReference));
        assert_eq!(Template::parse("{{?}}"), Err(TemplateError::EmptyReference));
    }

    #[test]
    fn unterminated_placeholder_is_literal() {
        let template = Template::parse("Value: {{ name").expect("parse");
        assert_eq!(template.segments(), &[Segment::Literal("Value: {{ name".into())]);
    }

    #[test]
    fn escaped_braces_render_literally() {
        let template = Template::parse(r"\{{name}} and {{name}}").expect("parse");
        assert_eq!(template.segments()[0], Segment::Literal("{{name}} and ".into()));
        assert_eq!(template.references().count(), 1);
    }

    #[test]
    fn non_ascii_literals_survive() {
        let template = Template::parse("héllo {{x}} wörld").expect("parse");
        assert_eq!(template.segments()[0], Segment::Literal("héllo ".into()));
        assert_eq!(template.segments()[2], Segment::Literal(" wörld".into()));
    }
}
