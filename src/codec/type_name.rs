//! Stable type names for object payloads.
//!
//! Assembly-qualified names carry version, culture and public key token
//! qualifiers that change with every release. Entries are keyed on the name
//! with those qualifiers removed so they stay readable across deployments.

use std::sync::LazyLock;

use regex::Regex;

static VOLATILE_QUALIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r",\s*(?:Version|Culture|PublicKeyToken)\s*=\s*[^,\]]*").expect("valid pattern")
});

/// Strips version, culture and public key token qualifiers from a type name,
/// including those of nested generic arguments.
///
/// ```
/// use typed_cache::codec::stable_type_name;
///
/// let name = "Shop.Order, Shop, Version=1.4.0.0, Culture=neutral, PublicKeyToken=null";
/// assert_eq!(stable_type_name(name), "Shop.Order, Shop");
/// ```
pub fn stable_type_name(qualified: &str) -> String {
    VOLATILE_QUALIFIER
        .replace_all(qualified.trim(), "")
        .into_owned()
}
