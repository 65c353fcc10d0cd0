use crate::config;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterEntry {
    pub name: &'static str,
    pub value: String,
}

/// Displayed register state: the eight general registers followed by the PC.
///
/// The set of names and their order are fixed at construction; only values change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterTable {
    entries: [RegisterEntry; config::NUM_REGISTERS],
}

impl RegisterTable {
    pub fn new() -> Self {
        RegisterTable {
            entries: config::REGISTER_NAMES.map(|name| RegisterEntry {
                name,
                value: config::INITIAL_REGISTER_VALUE.to_string(),
            }),
        }
    }

    pub fn reset(&mut self) {
        for entry in &mut self.entries {
            entry.value.clear();
            entry.value.push_str(config::INITIAL_REGISTER_VALUE);
        }
    }

    /// Stores `value` verbatim under `name` (case-insensitive).
    ///
    /// Returns `false` and leaves the table untouched when the name is unknown.
    pub fn update(&mut self, name: &str, value: &str) -> bool {
        match self.entries.iter_mut().find(|e| e.name.eq_ignore_ascii_case(name)) {
            Some(entry) => {
                entry.value.clear();
                entry.value.push_str(value);
                true
            }
            None => {
                tracing::debug!(register = name, "ignoring update for unknown register");
                false
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
            .map(|e| e.value.as_str())
    }

    pub fn pc(&self) -> &str {
        self.get("PC").unwrap_or(config::INITIAL_REGISTER_VALUE)
    }

    pub fn snapshot(&self) -> &[RegisterEntry] {
        &self.entries
    }
}

impl Default for RegisterTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(table: &RegisterTable) -> Vec<&'static str> {
        table.snapshot().iter().map(|e| e.name).collect()
    }

    #[test]
    fn test_initial_state() {
        let table = RegisterTable::new();
        assert_eq!(names(&table), config::REGISTER_NAMES.to_vec());
        assert!(table.snapshot().iter().all(|e| e.value == "0x0000"));
    }

    #[test]
    fn test_update_is_case_insensitive() {
        let mut table = RegisterTable::new();
        assert!(table.update("pc", "0x0010"));
        assert_eq!(table.pc(), "0x0010");
        assert!(table.update("PC", "0x0020"));
        assert_eq!(table.get("Pc"), Some("0x0020"));
        assert!(table.update("T0", "0x000F"));
        assert_eq!(table.get("t0"), Some("0x000F"));
        assert_eq!(names(&table), config::REGISTER_NAMES.to_vec());
    }

    #[test]
    fn test_update_stores_value_verbatim() {
        let mut table = RegisterTable::new();
        table.update("a0", "0xbeef");
        assert_eq!(table.get("a0"), Some("0xbeef"));
    }

    #[test]
    fn test_unknown_register_is_ignored() {
        let mut table = RegisterTable::new();
        let before = table.clone();
        assert!(!table.update("x9", "0x1234"));
        assert!(!table.update("", "0x1234"));
        assert_eq!(table, before);
        assert_eq!(table.snapshot().len(), config::NUM_REGISTERS);
    }

    #[test]
    fn test_update_is_idempotent() {
        let mut once = RegisterTable::new();
        once.update("sp", "0x0100");
        let mut twice = RegisterTable::new();
        twice.update("sp", "0x0100");
        twice.update("sp", "0x0100");
        assert_eq!(once, twice);
    }

    #[test]
    fn test_last_write_wins() {
        let mut table = RegisterTable::new();
        table.update("t0", "0x0001");
        table.update("t0", "0x0002");
        assert_eq!(table.get("t0"), Some("0x0002"));
    }

    #[test]
    fn test_reset_restores_initial_values() {
        let mut table = RegisterTable::new();
        table.update("t0", "0x0001");
        table.update("s1", "0xFFFF");
        table.update("PC", "0x0042");
        table.reset();
        assert_eq!(table, RegisterTable::new());
        assert!(table.snapshot().iter().all(|e| e.value == "0x0000"));
    }
}
