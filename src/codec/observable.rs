use super::{serialize, Accessor, CodecError, CodecResult, Value};

/// Array read from the store. Every mutation re-serializes the whole array
/// and writes it back through the binding before the local copy changes.
/// Detached arrays (built by application code) only change locally.
#[derive(Debug, Clone, Default)]
pub struct ObservableArray {
    items: Vec<Value>,
    binding: Option<Accessor>,
}

impl ObservableArray {
    pub fn detached(items: Vec<Value>) -> Self {
        Self {
            items,
            binding: None,
        }
    }

    pub(crate) fn bound(items: Vec<Value>, binding: Accessor) -> Self {
        Self {
            items,
            binding: Some(binding),
        }
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    pub fn items(&self) -> &[Value] {
        &self.items
    }

    pub fn into_items(self) -> Vec<Value> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.items.iter()
    }

    fn commit(&mut self, items: Vec<Value>) -> CodecResult<()> {
        if let Some(binding) = &self.binding {
            let tree = serialize(&Value::Array(Self::detached(items.clone())), binding)?;
            binding.set(tree)?;
        }
        self.items = items;
        Ok(())
    }

    pub fn push(&mut self, value: Value) -> CodecResult<()> {
        let mut items = self.items.clone();
        items.push(value);
        self.commit(items)
    }

    pub fn extend(&mut self, values: impl IntoIterator<Item = Value>) -> CodecResult<()> {
        let mut items = self.items.clone();
        items.extend(values);
        self.commit(items)
    }

    pub fn pop(&mut self) -> CodecResult<Option<Value>> {
        let mut items = self.items.clone();
        let popped = items.pop();
        self.commit(items)?;
        Ok(popped)
    }

    pub fn shift(&mut self) -> CodecResult<Option<Value>> {
        if self.items.is_empty() {
            return Ok(None);
        }
        let mut items = self.items.clone();
        let first = items.remove(0);
        self.commit(items)?;
        Ok(Some(first))
    }

    pub fn unshift(&mut self, value: Value) -> CodecResult<()> {
        let mut items = self.items.clone();
        items.insert(0, value);
        self.commit(items)
    }

    /// Removes `delete_count` items at `start` and inserts `insert` there.
    /// Both bounds are clamped to the array length.
    pub fn splice(
        &mut self,
        start: usize,
        delete_count: usize,
        insert: Vec<Value>,
    ) -> CodecResult<Vec<Value>> {
        let mut items = self.items.clone();
        let start = start.min(items.len());
        let end = start.saturating_add(delete_count).min(items.len());
        let removed = items.splice(start..end, insert).collect();
        self.commit(items)?;
        Ok(removed)
    }

    pub fn set(&mut self, index: usize, value: Value) -> CodecResult<()> {
        if index >= self.items.len() {
            return Err(CodecError::IndexOutOfRange {
                index,
                len: self.items.len(),
            });
        }
        let mut items = self.items.clone();
        items[index] = value;
        self.commit(items)
    }

    /// Keeps the items for which `keep` is true.
    pub fn retain(&mut self, mut keep: impl FnMut(&Value) -> bool) -> CodecResult<()> {
        let items = self.items.iter().filter(|v| keep(v)).cloned().collect();
        self.commit(items)
    }
}
