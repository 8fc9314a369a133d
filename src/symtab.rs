//! Symbol table data model
//!
//! The resolution driver consumes symbol data produced elsewhere (ELF and
//! DWARF loading is a separate concern); this module only models lookup:
//! symbols with address ranges, per-module tables, and the collection of
//! tables belonging to one traced process.

/// One function symbol occupying `[addr, addr + size)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub addr: u64,
    pub size: u64,
    pub name: String,
}

impl Symbol {
    pub fn new(addr: u64, size: u64, name: impl Into<String>) -> Self {
        Self {
            addr,
            size,
            name: name.into(),
        }
    }
}

/// An address-ordered table of symbols for one module (or one linkage
/// scope, e.g. the dynamic/import stubs of the main binary).
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    syms: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new(mut syms: Vec<Symbol>) -> Self {
        syms.sort_by_key(|sym| sym.addr);
        Self { syms }
    }

    /// Exact-name lookup.
    pub fn find_name(&self, name: &str) -> Option<&Symbol> {
        self.syms.iter().find(|sym| sym.name == name)
    }

    /// Symbols in address order.
    pub fn iter(&self) -> std::slice::Iter<'_, Symbol> {
        self.syms.iter()
    }

    pub fn len(&self) -> usize {
        self.syms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.syms.is_empty()
    }
}

impl<'a> IntoIterator for &'a SymbolTable {
    type Item = &'a Symbol;
    type IntoIter = std::slice::Iter<'a, Symbol>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A loaded shared library and its symbol table.
#[derive(Debug, Clone)]
pub struct ModuleMap {
    pub name: String,
    pub symtab: SymbolTable,
}

impl ModuleMap {
    pub fn new(name: impl Into<String>, symtab: SymbolTable) -> Self {
        Self {
            name: name.into(),
            symtab,
        }
    }
}

/// All symbol tables of one traced process: the main binary's regular and
/// dynamic (PLT) tables, plus every loaded module in load order.
#[derive(Debug, Clone, Default)]
pub struct SymbolTables {
    pub filename: String,
    pub symtab: SymbolTable,
    pub dsymtab: SymbolTable,
    pub maps: Vec<ModuleMap>,
}

impl SymbolTables {
    /// Basename of the main binary.
    pub fn basename(&self) -> &str {
        self.filename.rsplit('/').next().unwrap_or(&self.filename)
    }

    /// Whether a module qualifier names the main binary. Prefix matching
    /// lets `prog` select `prog-1.2` the way the map lookup does.
    pub fn is_main_binary(&self, module: &str) -> bool {
        !module.is_empty() && self.basename().starts_with(module)
    }

    /// Find a loaded module by name.
    pub fn find_map(&self, name: &str) -> Option<&ModuleMap> {
        self.maps.iter().find(|map| map.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> SymbolTable {
        SymbolTable::new(vec![
            Symbol::new(0x3000, 0x100, "gamma"),
            Symbol::new(0x1000, 0x100, "alpha"),
            Symbol::new(0x2000, 0x100, "beta"),
        ])
    }

    #[test]
    fn test_table_sorted_by_address() {
        let names: Vec<_> = table().iter().map(|s| s.name.clone()).collect();
        assert_eq!(names, vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn test_find_name() {
        let tab = table();
        assert_eq!(tab.find_name("beta").unwrap().addr, 0x2000);
        assert!(tab.find_name("delta").is_none());
    }

    #[test]
    fn test_main_binary_prefix_match() {
        let tabs = SymbolTables {
            filename: "/usr/bin/myprog-1.2".to_string(),
            ..SymbolTables::default()
        };
        assert_eq!(tabs.basename(), "myprog-1.2");
        assert!(tabs.is_main_binary("myprog"));
        assert!(tabs.is_main_binary("myprog-1.2"));
        assert!(!tabs.is_main_binary("otherprog"));
        assert!(!tabs.is_main_binary(""));
    }

    #[test]
    fn test_find_map() {
        let tabs = SymbolTables {
            filename: "/bin/t".to_string(),
            maps: vec![ModuleMap::new("libfoo.so", table())],
            ..SymbolTables::default()
        };
        assert!(tabs.find_map("libfoo.so").is_some());
        assert!(tabs.find_map("libbar.so").is_none());
    }
}
