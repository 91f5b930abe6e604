//! Named access tokens stored together in one secret.
//!
//! The secret holds `name:value` entries joined by `;`. Reading also accepts
//! `,` and newlines between entries, and keeps bare values under
//! `legacy-<n>` names so older secrets survive a rewrite.

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::executor::{CommandRunner, CommandSpec, EchoPolicy, RunOptions};
use crate::varfile;

pub const ENTRY_DELIMITER: &str = ";";
pub const FIELD_DELIMITER: char = ':';
const ACCEPTED_ENTRY_DELIMITERS: [char; 3] = [';', ',', '\n'];
const FORBIDDEN: [char; 4] = [':', ';', ',', '\n'];

const GENERATED_PREFIX: &str = "generated-";
const LEGACY_PREFIX: &str = "legacy-";

/// Reject token names/values that would not survive serialization.
pub fn validate_component(label: &str, component: &str) -> Result<()> {
    if component.is_empty() {
        return Err(Error::invalid_token_component(label, "must not be empty"));
    }
    if component.trim() != component {
        return Err(Error::invalid_token_component(
            label,
            "must not start or end with whitespace",
        ));
    }
    if let Some(c) = component.chars().find(|c| FORBIDDEN.contains(c)) {
        return Err(Error::invalid_token_component(
            label,
            format!("cannot contain {:?}", c),
        ));
    }
    Ok(())
}

/// Split `name:value` or `name=value` into validated parts.
pub fn parse_assignment(raw: &str) -> Result<(String, String)> {
    let (name, value) = raw
        .split_once(FIELD_DELIMITER)
        .or_else(|| raw.split_once('='))
        .ok_or_else(|| {
            Error::invalid_token_component("entry", "use name:token or name=token when adding tokens")
        })?;
    let (name, value) = (name.trim(), value.trim());
    validate_component("name", name)?;
    validate_component("value", value)?;
    Ok((name.to_string(), value.to_string()))
}

/// Random alphanumeric token of `length` characters.
pub fn generate_value(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenSet {
    entries: BTreeMap<String, String>,
}

impl TokenSet {
    /// Named entries are read first; bare values then take the lowest free
    /// `legacy-<n>` names in encounter order.
    pub fn parse(raw: &str) -> Self {
        let mut set = Self::default();
        let mut bare = Vec::new();

        for entry in raw.split(ACCEPTED_ENTRY_DELIMITERS).map(str::trim) {
            if entry.is_empty() {
                continue;
            }
            match entry.split_once(FIELD_DELIMITER) {
                Some((name, value)) => {
                    let (name, value) = (name.trim(), value.trim());
                    if !name.is_empty() && !value.is_empty() {
                        set.entries.insert(name.to_string(), value.to_string());
                    }
                }
                None => bare.push(entry),
            }
        }

        let mut next = 1usize;
        for value in bare {
            let name = loop {
                let candidate = format!("{}{}", LEGACY_PREFIX, next);
                next += 1;
                if !set.contains(&candidate) {
                    break candidate;
                }
            };
            set.entries.insert(name, value.to_string());
        }
        set
    }

    /// Entries sorted by name, joined with `;`.
    pub fn serialize(&self) -> String {
        self.entries
            .iter()
            .map(|(name, value)| format!("{}{}{}", name, FIELD_DELIMITER, value))
            .collect::<Vec<_>>()
            .join(ENTRY_DELIMITER)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Insert or overwrite after validating both sides.
    pub fn insert(&mut self, name: &str, value: &str) -> Result<Option<String>> {
        validate_component("name", name)?;
        validate_component("value", value)?;
        Ok(self.entries.insert(name.to_string(), value.to_string()))
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.entries.remove(name)
    }

    /// `generated-<n>` with the smallest unused `n`, starting at 1.
    pub fn next_generated_name(&self) -> String {
        (1..)
            .map(|n: usize| format!("{}{}", GENERATED_PREFIX, n))
            .find(|name| !self.contains(name))
            .unwrap_or_else(|| GENERATED_PREFIX.to_string())
    }
}

// === Secret store ===

pub trait SecretStore {
    /// Current secret value; `None` when absent or empty.
    fn get(&self, vault: &str, name: &str) -> Result<Option<String>>;
    fn set(&self, vault: &str, name: &str, value: &str) -> Result<()>;
}

/// Secrets held in a key vault, reached through the cloud CLI.
pub struct KeyVaultStore<'a> {
    runner: &'a dyn CommandRunner,
    az: String,
}

impl<'a> KeyVaultStore<'a> {
    pub fn new(runner: &'a dyn CommandRunner, az: impl Into<String>) -> Self {
        Self {
            runner,
            az: az.into(),
        }
    }
}

impl SecretStore for KeyVaultStore<'_> {
    fn get(&self, vault: &str, name: &str) -> Result<Option<String>> {
        let output = self.runner.run(
            &CommandSpec::new(&self.az).args([
                "keyvault",
                "secret",
                "show",
                "--vault-name",
                vault,
                "--name",
                name,
                "--query",
                "value",
                "--output",
                "tsv",
            ]),
            RunOptions::captured(EchoPolicy::OnError),
        )?;
        let value = output.stdout.trim();
        Ok((!value.is_empty()).then(|| value.to_string()))
    }

    fn set(&self, vault: &str, name: &str, value: &str) -> Result<()> {
        self.runner.run(
            &CommandSpec::new(&self.az).args([
                "keyvault",
                "secret",
                "set",
                "--vault-name",
                vault,
                "--name",
                name,
                "--value",
                value,
            ]),
            RunOptions::captured(EchoPolicy::OnError),
        )?;
        Ok(())
    }
}

// === Registry operations ===

#[derive(Debug, Clone, Default)]
pub struct TokenRequest {
    pub add: Vec<String>,
    pub remove: Vec<String>,
    pub generate: Vec<String>,
    pub list_only: bool,
}

impl TokenRequest {
    pub fn has_mutations(&self) -> bool {
        !(self.add.is_empty() && self.remove.is_empty() && self.generate.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct GeneratedToken {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSummary {
    pub vault: String,
    pub secret: String,
    pub total_tokens: usize,
    pub generated: Vec<GeneratedToken>,
    pub added_names: Vec<String>,
    pub removed_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TokenOutcome {
    Listed {
        vault: String,
        secret: String,
        /// `name:value`, sorted by name.
        tokens: Vec<String>,
    },
    Updated(TokenSummary),
}

/// Read the set, treating any read failure as an empty set.
pub fn load(store: &dyn SecretStore, vault: &str, secret: &str) -> TokenSet {
    match store.get(vault, secret) {
        Ok(Some(raw)) => TokenSet::parse(&raw),
        Ok(None) => TokenSet::default(),
        Err(err) => {
            log_status!(
                "tokens",
                "Could not read secret '{}' from {} ({}); starting from an empty set",
                secret,
                vault,
                err.message
            );
            TokenSet::default()
        }
    }
}

fn generate_into(
    set: &mut TokenSet,
    request: &str,
    length: usize,
    generated: &mut Vec<GeneratedToken>,
) -> Result<()> {
    let mut push = |set: &mut TokenSet, name: String| -> Result<()> {
        let value = generate_value(length);
        set.insert(&name, &value)?;
        generated.push(GeneratedToken { name, value });
        Ok(())
    };

    let request = request.trim();
    if !request.is_empty() && request.chars().all(|c| c.is_ascii_digit()) {
        let count: usize = request
            .parse()
            .map_err(|_| Error::invalid_token_component("count", format!("'{}' is too large", request)))?;
        for _ in 0..count {
            let name = set.next_generated_name();
            push(&mut *set, name)?;
        }
        return Ok(());
    }

    if request.is_empty() {
        return Ok(());
    }
    validate_component("name", request)?;
    if set.contains(request) {
        return Err(Error::token_name_collision(request));
    }
    push(&mut *set, request.to_string())
}

/// Apply generate, add, then remove, and write the set back.
///
/// A list-only request with no mutations never writes. Any other request
/// rewrites the whole secret, even when nothing changed.
pub fn apply(
    store: &dyn SecretStore,
    vault: &str,
    secret: &str,
    request: &TokenRequest,
    token_length: usize,
) -> Result<TokenOutcome> {
    let mut set = load(store, vault, secret);

    let mut generated = Vec::new();
    for item in &request.generate {
        generate_into(&mut set, item, token_length, &mut generated)?;
    }

    let mut added_names = Vec::with_capacity(request.add.len());
    for raw in &request.add {
        let (name, value) = parse_assignment(raw)?;
        set.insert(&name, &value)?;
        added_names.push(name);
    }

    for name in &request.remove {
        set.remove(name.trim());
    }

    if request.list_only && !request.has_mutations() {
        return Ok(TokenOutcome::Listed {
            vault: vault.to_string(),
            secret: secret.to_string(),
            tokens: set
                .iter()
                .map(|(name, value)| format!("{}{}{}", name, FIELD_DELIMITER, value))
                .collect(),
        });
    }

    store.set(vault, secret, &set.serialize())?;
    log_status!("tokens", "Wrote {} token(s) to {}/{}", set.len(), vault, secret);

    added_names.sort();
    let mut removed_names: Vec<String> = request.remove.iter().map(|n| n.trim().to_string()).collect();
    removed_names.sort();

    Ok(TokenOutcome::Updated(TokenSummary {
        vault: vault.to_string(),
        secret: secret.to_string(),
        total_tokens: set.len(),
        generated,
        added_names,
        removed_names,
    }))
}

/// Vault from the explicit value, else from `key` in the variable file.
pub fn resolve_vault(explicit: Option<&str>, var_file: &Path, key: &str) -> Result<String> {
    if let Some(vault) = explicit.map(str::trim).filter(|v| !v.is_empty()) {
        return Ok(vault.to_string());
    }
    varfile::lookup_file(var_file, key)?
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            Error::config_missing_key(key, Some(var_file.display().to_string()))
                .with_hint(format!("Set {} in the variable file or pass --vault-name", key))
        })
}
