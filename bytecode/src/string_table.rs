use std::collections::HashMap;

/// Deduplicating, insertion-ordered string pool.
///
/// Interning is exact: no case folding or normalization. Entries are never
/// removed, so an index stays valid for the life of the table.
#[derive(Debug, Default, Clone)]
pub struct StringTable {
    index: HashMap<String, usize>,
    strings: Vec<String>,
}

impl StringTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of `s`, assigning the next one on first sight.
    pub fn intern(&mut self, s: &str) -> usize {
        if let Some(&i) = self.index.get(s) {
            return i;
        }
        let i = self.strings.len();
        self.strings.push(s.to_owned());
        self.index.insert(s.to_owned(), i);
        i
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.strings.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Strings in assignment order.
    pub fn to_vec(&self) -> Vec<String> {
        self.strings.clone()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.strings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_idempotent() {
        let mut t = StringTable::new();
        let a = t.intern("name");
        assert_eq!(t.intern("name"), a);
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn indices_follow_first_sight() {
        let mut t = StringTable::new();
        assert_eq!(t.intern("hi "), 0);
        assert_eq!(t.intern("name"), 1);
        assert_eq!(t.intern("hi "), 0);
        assert_eq!(t.intern("x"), 2);
        assert_eq!(t.into_vec(), vec!["hi ", "name", "x"]);
    }

    #[test]
    fn exact_equality() {
        let mut t = StringTable::new();
        assert_ne!(t.intern("A"), t.intern("a"));
        assert_ne!(t.intern("a"), t.intern("a "));
        assert_eq!(t.get(1), Some("a"));
        assert_eq!(t.get(9), None);
    }
}
