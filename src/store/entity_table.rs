use dashmap::DashMap;

/// Identity table of keyed entities: which `(class, key)` pairs exist and in
/// which order they were created.
#[derive(Debug, Default)]
pub struct EntityTable {
    classes: DashMap<String, ClassEntities>,
}

#[derive(Debug, Clone, Default)]
struct ClassEntities {
    key_field: String,
    keys: Vec<String>,
}

impl EntityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `key` for `class`. Re-registering keeps the original position.
    pub fn register(&self, class: &str, key_field: &str, key: &str) {
        let mut entry = self.classes.entry(class.to_string()).or_default();
        entry.key_field = key_field.to_string();
        if !entry.keys.iter().any(|k| k == key) {
            entry.keys.push(key.to_string());
        }
    }

    pub fn contains(&self, class: &str, key: &str) -> bool {
        self.classes
            .get(class)
            .map(|entities| entities.keys.iter().any(|k| k == key))
            .unwrap_or(false)
    }

    pub fn key_field(&self, class: &str) -> Option<String> {
        self.classes.get(class).map(|e| e.key_field.clone())
    }

    pub fn keys(&self, class: &str) -> Vec<String> {
        self.classes
            .get(class)
            .map(|e| e.keys.clone())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        self.classes.clear();
    }
}
