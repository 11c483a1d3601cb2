//! `[[TOKEN]]` placeholders and their run-scoped replacement values

use regex::Regex;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use uuid::Uuid;

use crate::error::Result;
use crate::password::{MAX_PASSWORD_LENGTH, MIN_PASSWORD_LENGTH, PasswordGenerator};

static PLACEHOLDER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[(\w+)\]\]").expect("placeholder pattern is valid"));

const GUID_PREFIX: &str = "GUID_";
const PASSWORD_PREFIX: &str = "PASSWORD_";

const DEFAULT_PASSWORD_LENGTH: usize = 10;
const DEFAULT_PASSWORD_NON_ALPHANUMERIC: usize = 4;

/// Returns true if `text` contains at least one `[[TOKEN]]`
pub fn contains_placeholder(text: &str) -> bool {
    PLACEHOLDER_PATTERN.is_match(text)
}

/// The identifier between the brackets of a placeholder, e.g. `GUID_Foo`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlaceholderKey(String);

impl PlaceholderKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The placeholder as it appears in a template
    pub fn token(&self) -> String {
        format!("[[{}]]", self.0)
    }

    /// All placeholder keys in `text`, in order of appearance
    pub fn scan(text: &str) -> impl Iterator<Item = PlaceholderKey> + '_ {
        PLACEHOLDER_PATTERN
            .captures_iter(text)
            .map(|caps| PlaceholderKey::new(&caps[1]))
    }
}

/// Values generated during one provisioning run.
///
/// Keyed by the full placeholder key so every occurrence of a key, in any
/// file name or file body, resolves to the same value.
#[derive(Debug, Default)]
pub struct TemplateContext {
    guids: HashMap<String, Uuid>,
    passwords: HashMap<String, String>,
}

impl TemplateContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn guid(&mut self, key: &str) -> Uuid {
        *self
            .guids
            .entry(key.to_string())
            .or_insert_with(Uuid::new_v4)
    }

    fn password(
        &mut self,
        key: &str,
        generate: impl FnOnce() -> Result<String>,
    ) -> Result<String> {
        if let Some(existing) = self.passwords.get(key) {
            return Ok(existing.clone());
        }
        let password = generate()?;
        self.passwords.insert(key.to_string(), password.clone());
        Ok(password)
    }
}

/// Word inflection used by the `COMPONENTNAME_Plural`/`_Singular` placeholders
pub trait Inflector: Send + Sync {
    fn pluralize(&self, word: &str) -> String;
    fn singularize(&self, word: &str) -> String;
}

/// English inflection rules from the `pluralizer` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct EnglishInflector;

impl Inflector for EnglishInflector {
    fn pluralize(&self, word: &str) -> String {
        pluralizer::pluralize(word, 2, false)
    }

    fn singularize(&self, word: &str) -> String {
        pluralizer::pluralize(word, 1, false)
    }
}

/// Parse `PASSWORD_<length>_<nonAlphanumeric>[_<anything>]`.
///
/// Values that are missing or unparseable fall back to the defaults. The
/// generator performs the final range check.
pub fn password_parameters(key: &str) -> (usize, usize) {
    let mut length = DEFAULT_PASSWORD_LENGTH;
    let mut non_alphanumeric = DEFAULT_PASSWORD_NON_ALPHANUMERIC;

    let parts: Vec<&str> = key.split('_').collect();
    if parts.len() >= 3 {
        if let Ok(parsed) = parts[1].parse::<usize>() {
            if (MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&parsed) {
                length = parsed;
            }
        }
        if let Ok(parsed) = parts[2].parse::<usize>() {
            if parsed <= length {
                non_alphanumeric = parsed;
            }
        }
    }

    (length, non_alphanumeric)
}

/// Resolves placeholder keys for one component
#[derive(Clone)]
pub struct PlaceholderResolver {
    component_name: String,
    passwords: Arc<dyn PasswordGenerator>,
    inflector: Arc<dyn Inflector>,
}

impl PlaceholderResolver {
    pub fn new(
        component_name: impl Into<String>,
        passwords: Arc<dyn PasswordGenerator>,
        inflector: Arc<dyn Inflector>,
    ) -> Self {
        Self {
            component_name: component_name.into(),
            passwords,
            inflector,
        }
    }

    pub fn component_name(&self) -> &str {
        &self.component_name
    }

    /// Replacement text for one key. Unknown keys come back as the original
    /// `[[KEY]]` text.
    pub fn resolve(&self, key: &PlaceholderKey, context: &mut TemplateContext) -> Result<String> {
        let key_str = key.as_str();

        if key_str.starts_with(GUID_PREFIX) {
            return Ok(context.guid(key_str).hyphenated().to_string());
        }

        if key_str.starts_with(PASSWORD_PREFIX) {
            let (length, non_alphanumeric) = password_parameters(key_str);
            return context.password(key_str, || {
                self.passwords.generate(length, non_alphanumeric)
            });
        }

        let name = self.component_name.as_str();
        let value = match key_str {
            "COMPONENTNAME" => name.to_string(),
            "COMPONENTNAME_ToLower" => name.to_lowercase(),
            "COMPONENTNAME_Plural" => self.inflector.pluralize(name),
            "COMPONENTNAME_Singular" => self.inflector.singularize(name),
            "COMPONENTNAME_Plural_ToLower" => self.inflector.pluralize(name).to_lowercase(),
            "COMPONENTNAME_Singular_ToLower" => self.inflector.singularize(name).to_lowercase(),
            _ => key.token(),
        };
        Ok(value)
    }

    /// Replace every placeholder in `text`. Borrows the input when nothing matches.
    pub fn substitute<'t>(
        &self,
        text: &'t str,
        context: &mut TemplateContext,
    ) -> Result<Cow<'t, str>> {
        if !contains_placeholder(text) {
            return Ok(Cow::Borrowed(text));
        }

        let mut output = String::with_capacity(text.len());
        let mut last = 0;
        for caps in PLACEHOLDER_PATTERN.captures_iter(text) {
            let (Some(whole), Some(key)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            output.push_str(&text[last..whole.start()]);
            output.push_str(&self.resolve(&PlaceholderKey::new(key.as_str()), context)?);
            last = whole.end();
        }
        output.push_str(&text[last..]);

        Ok(Cow::Owned(output))
    }
}
