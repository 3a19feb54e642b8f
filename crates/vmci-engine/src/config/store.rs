//! Configuration table as loaded from the VM

use super::{ConfigCategory, ConfigError, ConfigResult};
use rustc_hash::FxHashMap;
use vmci_sdk::{ConfigTable, ConfigValue, VmBoundary, VmField, VmFlag, VmIntrinsic};

/// Immutable name-indexed view of the VM configuration table
#[derive(Debug, Default)]
pub struct ConfigStore {
    fields: FxHashMap<String, VmField>,
    type_sizes: FxHashMap<String, i64>,
    constants: FxHashMap<String, ConfigValue>,
    addresses: FxHashMap<String, u64>,
    flags: FxHashMap<String, VmFlag>,
    intrinsics: Vec<VmIntrinsic>,
}

fn insert_unique<V>(
    map: &mut FxHashMap<String, V>,
    category: ConfigCategory,
    name: String,
    value: V,
) -> ConfigResult<()> {
    if map.contains_key(&name) {
        return Err(ConfigError::DuplicateEntry { category, name });
    }
    map.insert(name, value);
    Ok(())
}

impl ConfigStore {
    /// Read the table from the VM
    pub fn load(boundary: &dyn VmBoundary) -> ConfigResult<Self> {
        let store = Self::from_table(boundary.read_configuration()?)?;
        tracing::debug!(
            fields = store.fields.len(),
            constants = store.constants.len(),
            addresses = store.addresses.len(),
            flags = store.flags.len(),
            type_sizes = store.type_sizes.len(),
            intrinsics = store.intrinsics.len(),
            "loaded VM configuration"
        );
        Ok(store)
    }

    /// Index a table, rejecting duplicate names
    pub fn from_table(table: ConfigTable) -> ConfigResult<Self> {
        let mut store = ConfigStore::default();
        for field in table.fields {
            insert_unique(&mut store.fields, ConfigCategory::Field, field.name.clone(), field)?;
        }
        for (name, size) in table.type_sizes {
            insert_unique(&mut store.type_sizes, ConfigCategory::TypeSize, name, size)?;
        }
        for (name, value) in table.constants {
            insert_unique(&mut store.constants, ConfigCategory::Constant, name, value)?;
        }
        for (name, address) in table.addresses {
            insert_unique(&mut store.addresses, ConfigCategory::Address, name, address)?;
        }
        for flag in table.flags {
            insert_unique(&mut store.flags, ConfigCategory::Flag, flag.name.clone(), flag)?;
        }
        store.intrinsics = table.intrinsics;
        Ok(store)
    }

    /// Field by name
    pub fn field(&self, name: &str) -> Option<&VmField> {
        self.fields.get(name)
    }

    /// Type size by name
    pub fn type_size(&self, name: &str) -> Option<i64> {
        self.type_sizes.get(name).copied()
    }

    /// Constant by name
    pub fn constant(&self, name: &str) -> Option<&ConfigValue> {
        self.constants.get(name)
    }

    /// Address by name
    pub fn address(&self, name: &str) -> Option<u64> {
        self.addresses.get(name).copied()
    }

    /// Flag by name
    pub fn flag(&self, name: &str) -> Option<&VmFlag> {
        self.flags.get(name)
    }

    /// Methods the VM intrinsifies
    pub fn intrinsics(&self) -> &[VmIntrinsic] {
        &self.intrinsics
    }

    /// Sorted names present in a category
    pub fn names(&self, category: ConfigCategory) -> Vec<String> {
        let mut names: Vec<String> = match category {
            ConfigCategory::Field => self.fields.keys().cloned().collect(),
            ConfigCategory::TypeSize => self.type_sizes.keys().cloned().collect(),
            ConfigCategory::Constant => self.constants.keys().cloned().collect(),
            ConfigCategory::Address => self.addresses.keys().cloned().collect(),
            ConfigCategory::Flag => self.flags.keys().cloned().collect(),
        };
        names.sort_unstable();
        names
    }

    pub(crate) fn missing(&self, category: ConfigCategory, name: &str) -> ConfigError {
        ConfigError::EntryMissing {
            category,
            name: name.to_string(),
            available: self.names(category),
        }
    }
}
