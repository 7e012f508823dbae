use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// Interned string handle. Equality is an integer compare; the text lives in
/// the [`Interner`] for the duration of one compilation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Symbol(u32);

impl Symbol {
    pub const EMPTY: Symbol = Symbol(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Default for Symbol {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Append-only interner. All interned text is concatenated into one buffer;
/// a symbol is a span into it, and deduplication goes through hash buckets
/// of candidate symbols, so no string is stored twice.
pub struct Interner {
    text: String,
    spans: Vec<(u32, u32)>,
    buckets: HashMap<u64, Vec<Symbol>>,
}

impl Interner {
    pub fn new() -> Self {
        let mut interner = Interner {
            text: String::new(),
            spans: vec![(0, 0)],
            buckets: HashMap::new(),
        };
        // Slot 0 is the empty string, so interning "" lands on EMPTY.
        interner
            .buckets
            .insert(Self::fingerprint(""), vec![Symbol::EMPTY]);
        interner
    }

    fn fingerprint(s: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        s.hash(&mut hasher);
        hasher.finish()
    }

    fn span_text(&self, sym: Symbol) -> &str {
        let (start, end) = self.spans[sym.index()];
        &self.text[start as usize..end as usize]
    }

    pub fn intern(&mut self, s: &str) -> Symbol {
        let key = Self::fingerprint(s);
        if let Some(candidates) = self.buckets.get(&key) {
            for &sym in candidates {
                if self.span_text(sym) == s {
                    return sym;
                }
            }
        }
        let start = self.text.len() as u32;
        self.text.push_str(s);
        let sym = Symbol(self.spans.len() as u32);
        self.spans.push((start, self.text.len() as u32));
        self.buckets.entry(key).or_default().push(sym);
        sym
    }

    pub fn resolve(&self, sym: Symbol) -> &str {
        self.span_text(sym)
    }

    /// Look up an existing entry without interning a new one.
    pub fn lookup(&self, s: &str) -> Option<Symbol> {
        self.buckets
            .get(&Self::fingerprint(s))?
            .iter()
            .copied()
            .find(|&sym| self.span_text(sym) == s)
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.len() <= 1
    }
}

impl Default for Interner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_string_interns_to_same_symbol() {
        let mut interner = Interner::new();
        let a = interner.intern("pin");
        let b = interner.intern("pin");
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_strings_intern_to_distinct_symbols() {
        let mut interner = Interner::new();
        let a = interner.intern("duty");
        let b = interner.intern("period");
        assert_ne!(a, b);
    }

    #[test]
    fn resolve_round_trips() {
        let mut interner = Interner::new();
        let sym = interner.intern("sensor_task");
        assert_eq!(interner.resolve(sym), "sensor_task");
    }

    #[test]
    fn lookup_does_not_intern() {
        let mut interner = Interner::new();
        let before = interner.len();
        assert!(interner.lookup("main").is_none());
        assert_eq!(interner.len(), before);
        interner.intern("main");
        assert!(interner.lookup("main").is_some());
    }

    #[test]
    fn empty_symbol_is_empty_string() {
        let interner = Interner::new();
        assert_eq!(interner.resolve(Symbol::EMPTY), "");
    }

    #[test]
    fn interning_empty_reuses_the_sentinel() {
        let mut interner = Interner::new();
        assert_eq!(interner.intern(""), Symbol::EMPTY);
        assert!(interner.is_empty());
    }

    #[test]
    fn len_counts_unique_entries() {
        let mut interner = Interner::new();
        assert!(interner.is_empty());
        interner.intern("x");
        interner.intern("y");
        interner.intern("x");
        assert_eq!(interner.len(), 3);
        assert!(!interner.is_empty());
    }

    #[test]
    fn shared_prefixes_stay_distinct_in_the_buffer() {
        let mut interner = Interner::new();
        let long = interner.intern("led_pin");
        let short = interner.intern("led");
        assert_ne!(long, short);
        assert_eq!(interner.resolve(long), "led_pin");
        assert_eq!(interner.resolve(short), "led");
    }
}
