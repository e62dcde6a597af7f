use crate::variables::VariableStore;
use regex::{Captures, Regex};
use std::sync::LazyLock;

static VARIABLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([A-Za-z0-9_]+)\]").expect("variable regex"));

/// A path string that may embed `[name]` variable references, resolved
/// against the variable store. Constructing or re-assigning a template
/// registers every referenced name with an empty initial value; names
/// removed out-of-band resolve to the empty string.
#[derive(Clone)]
pub struct PathTemplate {
    raw: String,
    store: VariableStore,
}

impl PathTemplate {
    pub fn new(raw: impl Into<String>, store: &VariableStore) -> Self {
        let template = Self {
            raw: raw.into(),
            store: store.clone(),
        };
        template.register_names();
        template
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn resolve(&self) -> String {
        VARIABLE_RE
            .replace_all(&self.raw, |caps: &Captures| {
                self.store.get(&caps[1]).unwrap_or_default()
            })
            .into_owned()
    }

    pub fn variable_names(&self) -> Vec<String> {
        VARIABLE_RE
            .captures_iter(&self.raw)
            .map(|caps| caps[1].to_owned())
            .collect()
    }

    /// Registers newly introduced names; names no longer referenced stay
    /// in the store until an explicit prune sweep.
    pub fn set_raw(&mut self, raw: impl Into<String>) {
        self.raw = raw.into();
        self.register_names();
    }

    fn register_names(&self) {
        for name in self.variable_names() {
            self.store.register_if_absent(&name, "");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_unset_variables_to_empty_string() {
        let store = VariableStore::in_memory();
        let template = PathTemplate::new("[x]/data", &store);
        assert_eq!(template.resolve(), "/data");
        assert_eq!(template.raw(), "[x]/data");
    }

    #[test]
    fn resolves_against_current_store_value() {
        let store = VariableStore::in_memory();
        let template = PathTemplate::new("[x]/data", &store);
        store.set("x", "foo");
        assert_eq!(template.resolve(), "foo/data");
        assert_eq!(template.raw(), "[x]/data");
    }

    #[test]
    fn construction_seeds_referenced_names() {
        let store = VariableStore::in_memory();
        let _template = PathTemplate::new("[a]/[b_2]/tail", &store);
        assert_eq!(store.get("a"), Some(String::new()));
        assert_eq!(store.get("b_2"), Some(String::new()));
    }

    #[test]
    fn set_raw_registers_new_names_without_deregistering_old_ones() {
        let store = VariableStore::in_memory();
        let mut template = PathTemplate::new("[a]/data", &store);
        template.set_raw("[b]/data");
        assert_eq!(store.get("a"), Some(String::new()));
        assert_eq!(store.get("b"), Some(String::new()));
        assert_eq!(template.variable_names(), vec![String::from("b")]);
    }

    #[test]
    fn ignores_malformed_references() {
        let store = VariableStore::in_memory();
        let template = PathTemplate::new("[not closed/[ok]/[bad-char]", &store);
        store.set("ok", "yes");
        assert_eq!(template.resolve(), "[not closed/yes/[bad-char]");
    }
}
