//! The per-run token context: registry, current scope and the resolver.
use std::borrow::Cow;

use serde_json::Value;

use super::registry::{TokenDefinition, TokenRegistry, TokenScope};
use super::scanner;
use crate::target::Target;
use crate::template::Entry;

/// Upper bound on substitution passes for one string.
///
/// A pass that still changes the string after this many rounds means the
/// registry contains a cycle (`{a}` → `{b}` → `{a}`); resolution stops and
/// returns the partially resolved text.
pub const MAX_PASSES: usize = 32;

/// Upper bound on the length of a string being resolved.  Self-expanding
/// definitions (`{a}` → `{a}{a}`) stop here instead of exhausting memory.
pub const MAX_RESOLVED_LEN: usize = 1 << 20;

/// Where tokens currently resolve to: one site of the target, identified by
/// its absolute URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    url: String,
    id: String,
    title: String,
}

impl Scope {
    /// Create a scope from its absolute URL, identifier and title.
    #[must_use]
    pub fn new(url: impl Into<String>, id: impl Into<String>, title: impl Into<String>) -> Self {
        let url: String = url.into();
        Self {
            url: url.trim_end_matches('/').to_string(),
            id: id.into(),
            title: title.into(),
        }
    }

    /// The root scope of a target.
    #[must_use]
    pub fn of(target: &dyn Target) -> Self {
        Self::new(target.url(), target.id(), target.title())
    }

    /// A child scope below this one.
    #[must_use]
    pub fn child(&self, relative: &str, id: impl Into<String>, title: impl Into<String>) -> Self {
        Self::new(
            format!("{}/{}", self.url, relative.trim_matches('/')),
            id,
            title,
        )
    }

    /// Absolute URL without a trailing slash.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Identifier of the site.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display title of the site.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Scheme and authority, e.g. `https://contoso.example`.
    #[must_use]
    pub fn host_url(&self) -> &str {
        split_url(&self.url).0
    }

    /// Path below the host, e.g. `/sites/dev`.  Empty for a host root.
    #[must_use]
    pub fn server_relative_path(&self) -> &str {
        split_url(&self.url).1
    }

    /// Registry key: scopes compare by case-insensitive URL.
    fn key(&self) -> String {
        self.url.to_ascii_lowercase()
    }

    fn builtins(&self) -> Vec<TokenDefinition> {
        let path = self.server_relative_path();
        vec![
            TokenDefinition::builtin(&["{site}", "~site"], path, TokenScope::Target),
            TokenDefinition::builtin(&["{siteurl}"], self.url.as_str(), TokenScope::Target),
            TokenDefinition::builtin(&["{siteid}"], self.id.as_str(), TokenScope::Target),
            TokenDefinition::builtin(
                &["{sitetitle}", "{sitename}"],
                self.title.as_str(),
                TokenScope::Target,
            ),
        ]
    }
}

fn split_url(url: &str) -> (&str, &str) {
    let authority = url.find("://").map_or(0, |i| i + 3);
    match url.get(authority..).and_then(|rest| rest.find('/')) {
        Some(offset) => url.split_at(authority + offset),
        None => (url, ""),
    }
}

fn slice(text: &str, start: usize, end: usize) -> &str {
    text.get(start..end).unwrap_or_default()
}

/// Alias table plus current scope for one apply or extract run.
///
/// # Examples
///
/// ```
/// use provisioner::tokens::{Scope, TokenContext};
///
/// let root = Scope::new("https://contoso.example/sites/dev", "1", "Dev");
/// let ctx = TokenContext::new(root).with_parameters([("Owner", "alice")]);
/// assert_eq!(ctx.parse_string("{site}/Lists"), "/sites/dev/Lists");
/// assert_eq!(ctx.parse_string("by {$owner}"), "by alice");
/// assert_eq!(ctx.unresolved_tokens("{nope} {site}"), vec!["{nope}"]);
/// ```
#[derive(Debug, Clone)]
pub struct TokenContext {
    registry: TokenRegistry,
    scope: Scope,
    root: Scope,
}

impl TokenContext {
    /// Create a context rooted at `root` with the built-in tokens registered.
    #[must_use]
    pub fn new(root: Scope) -> Self {
        let mut registry = TokenRegistry::default();
        for def in [
            TokenDefinition::builtin(
                &["{sitecollection}", "~sitecollection"],
                root.server_relative_path(),
                TokenScope::Global,
            ),
            TokenDefinition::builtin(&["{sitecollectionid}"], root.id(), TokenScope::Global),
            TokenDefinition::builtin(&["{hosturl}"], root.host_url(), TokenScope::Global),
        ] {
            registry.register(&def);
        }
        registry.rebase(&root.key(), &root.builtins());
        Self {
            registry,
            scope: root.clone(),
            root,
        }
    }

    /// Create a context rooted at the target's top-level site.
    #[must_use]
    pub fn for_target(target: &dyn Target) -> Self {
        Self::new(Scope::of(target))
    }

    /// Register `{parameter:NAME}` and `{$NAME}` for every pair.
    #[must_use]
    pub fn with_parameters<I, K, V>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (name, value) in parameters {
            self.register_parameter(name.as_ref(), value);
        }
        self
    }

    /// Register a template parameter under both of its spellings.
    pub fn register_parameter(&mut self, name: &str, value: impl Into<String>) {
        let long = format!("{{parameter:{name}}}");
        let short = format!("{{${name}}}");
        self.registry.register(&TokenDefinition::builtin(
            &[long.as_str(), short.as_str()],
            value,
            TokenScope::Global,
        ));
    }

    /// Register a definition.  Scope-relative definitions belong to the
    /// current scope.
    pub fn register(&mut self, def: &TokenDefinition) {
        tracing::trace!(aliases = ?def.aliases(), scope = ?def.scope(), "register token");
        self.registry.register(def);
    }

    /// The scope tokens currently resolve against.
    #[must_use]
    pub const fn scope(&self) -> &Scope {
        &self.scope
    }

    /// The scope the run started at.
    #[must_use]
    pub const fn root(&self) -> &Scope {
        &self.root
    }

    /// Number of aliases currently resolvable.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    /// Returns `true` if no alias is resolvable.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry.len() == 0
    }

    /// Value of one alias, matched case-insensitively.
    #[must_use]
    pub fn lookup(&self, alias: &str) -> Option<&str> {
        self.registry.get(alias)
    }

    /// Make `scope` current and return the previous scope.
    ///
    /// Only scope-relative aliases change: the built-ins are re-derived from
    /// `scope`, and aliases registered while `scope` was previously current
    /// become visible again.  Global aliases are untouched.
    pub fn rebase(&mut self, scope: Scope) -> Scope {
        if scope.key() != self.registry.active_scope() {
            tracing::debug!(from = %self.scope.url, to = %scope.url, "rebase tokens");
        }
        self.registry.rebase(&scope.key(), &scope.builtins());
        std::mem::replace(&mut self.scope, scope)
    }

    /// Run `f` with `scope` current, then rebase back to the previous scope.
    pub fn with_scope<R>(&mut self, scope: Scope, f: impl FnOnce(&mut Self) -> R) -> R {
        let previous = self.rebase(scope);
        let result = f(self);
        self.rebase(previous);
        result
    }

    /// Resolve every registered token in `input`.
    ///
    /// Unknown tokens are left verbatim; resolution never fails.  Input
    /// without any token marker is returned borrowed.
    #[must_use]
    pub fn parse_string<'a>(&self, input: &'a str) -> Cow<'a, str> {
        if !scanner::has_marker(input) {
            return Cow::Borrowed(input);
        }
        let exact = if scanner::is_guid_literal(input) {
            None
        } else {
            self.registry.get(input)
        };
        let mut current = match exact {
            Some(value) => Cow::Owned(value.to_string()),
            None => Cow::Borrowed(input),
        };
        for _ in 0..MAX_PASSES {
            if !scanner::has_marker(&current) {
                return current;
            }
            let Some(next) = self.substitute(&current, None) else {
                return current;
            };
            if next.len() > MAX_RESOLVED_LEN {
                tracing::warn!(
                    len = next.len(),
                    "token expansion exceeded {MAX_RESOLVED_LEN} bytes; stopping"
                );
                return Cow::Owned(next);
            }
            current = Cow::Owned(next);
        }
        tracing::warn!(
            input,
            "token resolution did not settle after {MAX_PASSES} passes; check for cyclic tokens"
        );
        current
    }

    /// Token-looking substrings of `input` that do not resolve.
    ///
    /// Each leftover is reported once, in order of first appearance.  Braced
    /// GUID literals are not tokens and are never reported.
    #[must_use]
    pub fn unresolved_tokens(&self, input: &str) -> Vec<String> {
        if !scanner::has_marker(input) {
            return Vec::new();
        }
        let resolved = self.parse_string(input);
        let mut leftovers = Vec::new();
        let _ = self.substitute(&resolved, Some(&mut leftovers));
        let mut seen = Vec::with_capacity(leftovers.len());
        for token in leftovers {
            if !seen.contains(&token) {
                seen.push(token);
            }
        }
        seen
    }

    /// Resolve every string inside a JSON value.
    #[must_use]
    pub fn resolve_value(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.parse_string(s).into_owned()),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.resolve_value(v)).collect()),
            Value::Object(map) => Value::Object(self.resolve_entry(map)),
            other => other.clone(),
        }
    }

    /// Resolve every string field of an entry.
    #[must_use]
    pub fn resolve_entry(&self, entry: &Entry) -> Entry {
        entry
            .iter()
            .map(|(k, v)| (k.clone(), self.resolve_value(v)))
            .collect()
    }

    /// Leftover tokens across every string of an entry.
    #[must_use]
    pub fn unresolved_in_entry(&self, entry: &Entry) -> Vec<String> {
        let mut found = Vec::new();
        for value in entry.values() {
            self.collect_unresolved(value, &mut found);
        }
        found
    }

    fn collect_unresolved(&self, value: &Value, found: &mut Vec<String>) {
        match value {
            Value::String(s) => {
                for token in self.unresolved_tokens(s) {
                    if !found.contains(&token) {
                        found.push(token);
                    }
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.collect_unresolved(item, found);
                }
            }
            Value::Object(map) => {
                for item in map.values() {
                    self.collect_unresolved(item, found);
                }
            }
            _ => {}
        }
    }

    /// Replace target-specific values in `text` with the tokens that
    /// produce them, so extracted entries can be applied elsewhere.
    ///
    /// A string equal to the site title becomes `{sitetitle}`.  Otherwise
    /// the site URL, path and identifiers are replaced wherever they occur,
    /// longest first, and only when followed by a non-identifier character.
    #[must_use]
    pub fn tokenize(&self, text: &str) -> String {
        if !self.scope.title.is_empty() && text == self.scope.title {
            return "{sitetitle}".to_string();
        }
        let mut needles: Vec<(&str, &str)> = vec![
            (self.scope.url.as_str(), "{siteurl}"),
            (self.scope.server_relative_path(), "{site}"),
            (self.scope.id.as_str(), "{siteid}"),
        ];
        if self.root.id != self.scope.id {
            needles.push((self.root.id.as_str(), "{sitecollectionid}"));
        }
        needles.retain(|(needle, _)| !needle.is_empty());
        needles.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        let bytes = text.as_bytes();
        let mut out = String::with_capacity(text.len());
        let mut copied = 0;
        let mut pos = 0;
        while pos < bytes.len() {
            let rest = text.get(pos..).unwrap_or_default();
            let hit = needles.iter().find(|(needle, _)| {
                rest.as_bytes()
                    .get(..needle.len())
                    .is_some_and(|head| head.eq_ignore_ascii_case(needle.as_bytes()))
                    && rest
                        .as_bytes()
                        .get(needle.len())
                        .is_none_or(|&b| !(b.is_ascii_alphanumeric() || b == b'-' || b == b'_'))
            });
            if let Some((needle, token)) = hit {
                out.push_str(slice(text, copied, pos));
                out.push_str(token);
                pos += needle.len();
                copied = pos;
            } else {
                pos += 1;
                while pos < bytes.len() && !text.is_char_boundary(pos) {
                    pos += 1;
                }
            }
        }
        out.push_str(slice(text, copied, text.len()));
        out
    }

    /// One left-to-right substitution pass.
    ///
    /// Returns the rewritten string, or `None` if nothing was substituted.
    /// When `leftovers` is given, unresolved structural candidates are
    /// appended to it.
    fn substitute(&self, input: &str, mut leftovers: Option<&mut Vec<String>>) -> Option<String> {
        let bytes = input.as_bytes();
        let mut out = String::new();
        let mut changed = false;
        let mut copied = 0;
        let mut pos = 0;

        while pos < bytes.len() {
            if !bytes.get(pos).copied().is_some_and(scanner::is_marker) {
                pos += 1;
                continue;
            }
            let end = scanner::token_end(input, pos);
            if let Some(end) = end
                && scanner::is_guid_literal(slice(input, pos, end))
            {
                pos = end;
                continue;
            }
            let rest = slice(input, pos, input.len());
            let irregular = self.registry.match_prefix(rest);
            let structural = end.map(|end| {
                let candidate = slice(input, pos, end);
                (end, candidate, self.registry.get(candidate))
            });

            let replacement: Option<(usize, Cow<'_, str>)> = match (structural, irregular) {
                (Some((end, _, Some(value))), Some((len, other))) => {
                    if len > end - pos {
                        Some((pos + len, Cow::Borrowed(other)))
                    } else {
                        Some((end, Cow::Borrowed(value)))
                    }
                }
                (Some((end, _, Some(value))), None) => Some((end, Cow::Borrowed(value))),
                (_, Some((len, value))) => Some((pos + len, Cow::Borrowed(value))),
                (Some((end, candidate, None)), None) => {
                    if let Some(rewritten) = self.resolve_nested(candidate) {
                        Some((end, Cow::Owned(rewritten)))
                    } else {
                        if let Some(list) = leftovers.as_deref_mut() {
                            list.push(candidate.to_string());
                        }
                        None
                    }
                }
                (None, None) => {
                    pos += 1;
                    continue;
                }
            };

            match replacement {
                Some((end, value)) => {
                    out.push_str(slice(input, copied, pos));
                    out.push_str(&value);
                    changed = true;
                    pos = end;
                    copied = end;
                }
                None => {
                    pos = structural.map_or(pos + 1, |(end, _, _)| end);
                }
            }
        }

        if !changed {
            return None;
        }
        out.push_str(slice(input, copied, input.len()));
        Some(out)
    }

    /// Resolve the tokens nested inside an unregistered candidate such as
    /// `{listid:{parameter:List}}`.  Returns the rewritten candidate (or its
    /// value, if the rewritten form is registered), or `None` if nothing
    /// inside resolved.
    fn resolve_nested(&self, candidate: &str) -> Option<String> {
        let inner = candidate.strip_prefix('{')?.strip_suffix('}')?;
        if !scanner::has_marker(inner) {
            return None;
        }
        let inner = self.substitute(inner, None)?;
        let rewritten = format!("{{{inner}}}");
        Some(
            self.registry
                .get(&rewritten)
                .map_or(rewritten, str::to_string),
        )
    }
}
