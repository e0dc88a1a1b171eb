//! Expression-to-address evaluation.
//!
//! Only the narrow form a debugger command line needs is supported:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := number | symbol
//! number  := '0x' hex | '0n' decimal | decimal
//! symbol  := [module '!'] name
//! ```
//!
//! Every failure evaluates to 0, which callers treat as "unresolved".

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use tracing::trace;

/// Resolves symbol names for [`evaluate`].
pub trait ExpressionHost: Send + Sync
{
    /// Address of `name`, optionally qualified by `module`.
    fn resolve_symbol(&self, module: Option<&str>, name: &str) -> Option<u64>;
}

/// Registry of named addresses, the built-in [`ExpressionHost`].
///
/// Names registered with a module (`module!name`) are found both qualified
/// and unqualified. An unqualified name registered in several modules
/// resolves to the module that sorts first.
#[derive(Debug, Default)]
pub struct GlobalSymbols
{
    entries: RwLock<HashMap<(String, String), u64>>,
}

impl GlobalSymbols
{
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Register `name` (optionally `module!name`) at `address`.
    pub fn register(&self, name: &str, address: u64)
    {
        let key = split_qualified(name);
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, address);
    }

    pub fn unregister(&self, name: &str) -> Option<u64>
    {
        let key = split_qualified(name);
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key)
    }
}

impl ExpressionHost for GlobalSymbols
{
    fn resolve_symbol(&self, module: Option<&str>, name: &str) -> Option<u64>
    {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(module) = module {
            return entries
                .get(&(module.to_ascii_lowercase(), name.to_string()))
                .copied()
                .or_else(|| entries.get(&(String::new(), name.to_string())).copied());
        }
        entries.get(&(String::new(), name.to_string())).copied().or_else(|| {
            let mut matches: Vec<_> = entries.iter().filter(|((_, entry), _)| entry == name).collect();
            matches.sort_by(|a, b| a.0.cmp(b.0));
            matches.first().map(|(_, address)| **address)
        })
    }
}

fn split_qualified(name: &str) -> (String, String)
{
    match name.split_once('!') {
        Some((module, symbol)) => (module.trim().to_ascii_lowercase(), symbol.trim().to_string()),
        None => (String::new(), name.trim().to_string()),
    }
}

/// Evaluate `text` to an address. Returns 0 when anything fails to resolve.
pub fn evaluate(text: &str, host: &dyn ExpressionHost) -> u64
{
    let result = evaluate_terms(text, host);
    if result.is_none() {
        trace!(expression = text, "expression did not resolve");
    }
    result.unwrap_or(0)
}

fn evaluate_terms(text: &str, host: &dyn ExpressionHost) -> Option<u64>
{
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let mut total: u64 = 0;
    let mut negate = false;
    let mut start = 0;
    // A leading sign has no left operand to apply to.
    for (index, ch) in text.char_indices().skip(1) {
        if ch == '+' || ch == '-' {
            total = apply(total, term(&text[start..index], host)?, negate)?;
            negate = ch == '-';
            start = index + 1;
        }
    }
    apply(total, term(&text[start..], host)?, negate)
}

fn apply(total: u64, value: u64, negate: bool) -> Option<u64>
{
    if negate {
        total.checked_sub(value)
    } else {
        total.checked_add(value)
    }
}

fn term(text: &str, host: &dyn ExpressionHost) -> Option<u64>
{
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Some(value) = number(text) {
        return Some(value);
    }
    let (module, name) = match text.split_once('!') {
        Some((module, name)) => (Some(module.trim()), name.trim()),
        None => (None, text),
    };
    if name.is_empty() || name.contains(char::is_whitespace) {
        return None;
    }
    host.resolve_symbol(module, name)
}

fn number(text: &str) -> Option<u64>
{
    let lower = text.to_ascii_lowercase();
    if let Some(hex) = lower.strip_prefix("0x") {
        u64::from_str_radix(&hex.replace('`', ""), 16).ok()
    } else if let Some(decimal) = lower.strip_prefix("0n") {
        decimal.parse().ok()
    } else if lower.bytes().all(|byte| byte.is_ascii_digit()) {
        lower.parse().ok()
    } else {
        None
    }
}
