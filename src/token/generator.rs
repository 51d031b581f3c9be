//! # Token Generator
//!
//! Produces new bootstrap token ids (templated) and secrets (random).
//!
//! Token ids are expanded from a configurable template against a fixed
//! variable set. Token secrets are drawn character by character from a
//! configured alphabet using the operating system CSPRNG; `gen_range`
//! samples the index without modulo bias.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use regex::Regex;
use std::sync::LazyLock;

use crate::token::TOKEN_SEPARATOR;

static TEMPLATE_VARIABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z]+)\}").expect("template variable regex is valid"));

/// Expand a token id template against the recognized variable set
///
/// Recognized variables:
/// - `{Date}` - `now` in UTC, formatted as `%y%m%d` (6 digits)
///
/// Unrecognized variables and stray braces are configuration errors; they are
/// rejected here so a bad template stops the process at startup instead of
/// producing broken ids at rotation time.
pub fn expand_id_template(template: &str, now: DateTime<Utc>) -> Result<String> {
    let date = now.format("%y%m%d").to_string();

    let mut unknown = None;
    let expanded = TEMPLATE_VARIABLE
        .replace_all(template, |caps: &regex::Captures<'_>| match &caps[1] {
            "Date" => date.clone(),
            other => {
                unknown.get_or_insert_with(|| other.to_string());
                String::new()
            }
        })
        .into_owned();

    if let Some(variable) = unknown {
        bail!("token id template \"{template}\" references unknown variable \"{{{variable}}}\"");
    }
    if expanded.contains(['{', '}']) {
        bail!("token id template \"{template}\" contains unbalanced braces");
    }
    if expanded.is_empty() {
        bail!("token id template \"{template}\" expands to an empty id");
    }
    if expanded.contains(TOKEN_SEPARATOR) {
        bail!("token id template \"{template}\" expands to an id containing \"{TOKEN_SEPARATOR}\"");
    }

    Ok(expanded)
}

/// Generate a random token secret of `length` characters drawn from `alphabet`
///
/// Uses the operating system CSPRNG. An unavailable random source is
/// unrecoverable at runtime and surfaces as an error to stop the process.
pub fn generate_secret(length: usize, alphabet: &str) -> Result<String> {
    let chars: Vec<char> = alphabet.chars().collect();
    if chars.is_empty() {
        bail!("token alphabet must not be empty");
    }

    // Preflight the OS random source so an unavailable CSPRNG surfaces as an
    // error instead of a panic mid-draw
    let mut probe = [0u8; 1];
    OsRng
        .try_fill_bytes(&mut probe)
        .context("secure random source is unavailable")?;

    let secret = (0..length)
        .map(|_| chars[OsRng.gen_range(0..chars.len())])
        .collect();
    Ok(secret)
}
