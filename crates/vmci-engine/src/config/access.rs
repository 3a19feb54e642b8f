//! Typed access to the VM configuration

use super::{ConfigCategory, ConfigError, ConfigResult, ConfigStore};
use std::sync::Arc;
use vmci_sdk::{ConfigValue, VmBoundary, VmField, VmIntrinsic};

// ============================================================================
// Coercion
// ============================================================================

/// Types a configuration value can be coerced to
pub trait FromConfigValue: Sized {
    /// Name of the target type, for diagnostics
    const TYPE_NAME: &'static str;

    /// Convert, or `None` if the representation is incompatible
    fn from_config_value(value: &ConfigValue) -> Option<Self>;
}

impl FromConfigValue for bool {
    const TYPE_NAME: &'static str = "boolean";

    fn from_config_value(value: &ConfigValue) -> Option<Self> {
        match value {
            ConfigValue::Str(s) => Some(s == "true"),
            ConfigValue::Bool(b) => Some(*b),
            ConfigValue::Long(v) => Some(*v != 0),
        }
    }
}

impl FromConfigValue for i8 {
    const TYPE_NAME: &'static str = "byte";

    fn from_config_value(value: &ConfigValue) -> Option<Self> {
        match value {
            ConfigValue::Long(v) => Some(*v as i8),
            _ => None,
        }
    }
}

impl FromConfigValue for i32 {
    const TYPE_NAME: &'static str = "int";

    fn from_config_value(value: &ConfigValue) -> Option<Self> {
        match value {
            ConfigValue::Long(v) => Some(*v as i32),
            _ => None,
        }
    }
}

impl FromConfigValue for i64 {
    const TYPE_NAME: &'static str = "long";

    fn from_config_value(value: &ConfigValue) -> Option<Self> {
        match value {
            ConfigValue::Long(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromConfigValue for String {
    const TYPE_NAME: &'static str = "String";

    fn from_config_value(value: &ConfigValue) -> Option<Self> {
        match value {
            ConfigValue::Str(s) => Some(s.clone()),
            _ => None,
        }
    }
}

fn convert<T: FromConfigValue>(name: &str, value: &ConfigValue) -> ConfigResult<T> {
    T::from_config_value(value).ok_or_else(|| ConfigError::Conversion {
        name: name.to_string(),
        from: value.kind_name(),
        to: T::TYPE_NAME,
    })
}

// ============================================================================
// ConfigAccess
// ============================================================================

/// Typed getters over a [`ConfigStore`].
///
/// The `_or` variants return the supplied default when the entry is absent.
/// They still fail when the entry is present but cannot be converted or has an
/// unexpected native type.
pub struct ConfigAccess {
    store: ConfigStore,
    boundary: Arc<dyn VmBoundary>,
}

impl ConfigAccess {
    /// Load the table from the VM
    pub fn load(boundary: Arc<dyn VmBoundary>) -> ConfigResult<Self> {
        let store = ConfigStore::load(boundary.as_ref())?;
        Ok(Self { store, boundary })
    }

    /// Wrap an already loaded store
    pub fn new(store: ConfigStore, boundary: Arc<dyn VmBoundary>) -> Self {
        Self { store, boundary }
    }

    /// Underlying store
    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// Methods the VM intrinsifies
    pub fn intrinsics(&self) -> &[VmIntrinsic] {
        self.store.intrinsics()
    }

    // ========================================================================
    // Constants
    // ========================================================================

    /// Required constant
    pub fn get_constant<T: FromConfigValue>(&self, name: &str) -> ConfigResult<T> {
        self.constant(name)?
            .ok_or_else(|| self.store.missing(ConfigCategory::Constant, name))
    }

    /// Optional constant
    pub fn get_constant_or<T: FromConfigValue>(&self, name: &str, not_present: T) -> ConfigResult<T> {
        Ok(self.constant(name)?.unwrap_or(not_present))
    }

    fn constant<T: FromConfigValue>(&self, name: &str) -> ConfigResult<Option<T>> {
        self.store
            .constant(name)
            .map(|value| convert(name, value))
            .transpose()
    }

    // ========================================================================
    // Fields
    // ========================================================================

    fn field(&self, name: &str, expected_type: Option<&str>) -> ConfigResult<Option<&VmField>> {
        let Some(field) = self.store.field(name) else {
            return Ok(None);
        };
        if let Some(expected) = expected_type {
            if field.type_name.as_deref() != Some(expected) {
                return Err(ConfigError::NativeTypeMismatch {
                    name: name.to_string(),
                    expected: expected.to_string(),
                    actual: field.type_name.clone(),
                });
            }
        }
        Ok(Some(field))
    }

    fn required_field(&self, name: &str, expected_type: Option<&str>) -> ConfigResult<&VmField> {
        self.field(name, expected_type)?
            .ok_or_else(|| self.store.missing(ConfigCategory::Field, name))
    }

    fn offset_of<T: FromConfigValue>(field: &VmField) -> ConfigResult<T> {
        if field.is_static() {
            return Err(ConfigError::StaticField {
                name: field.name.clone(),
            });
        }
        convert(&field.name, &ConfigValue::Long(field.offset))
    }

    fn value_of<T: FromConfigValue>(field: &VmField) -> ConfigResult<T> {
        match &field.value {
            Some(value) if field.is_static() => convert(&field.name, value),
            _ => Err(ConfigError::NotStatic {
                name: field.name.clone(),
            }),
        }
    }

    fn address_of(field: &VmField) -> ConfigResult<u64> {
        if !field.is_static() {
            return Err(ConfigError::NotStatic {
                name: field.name.clone(),
            });
        }
        Ok(field.address)
    }

    /// Offset of a required instance field
    pub fn get_field_offset<T: FromConfigValue>(
        &self,
        name: &str,
        expected_type: Option<&str>,
    ) -> ConfigResult<T> {
        Self::offset_of(self.required_field(name, expected_type)?)
    }

    /// Offset of an optional instance field
    pub fn get_field_offset_or<T: FromConfigValue>(
        &self,
        name: &str,
        expected_type: Option<&str>,
        not_present: T,
    ) -> ConfigResult<T> {
        match self.field(name, expected_type)? {
            Some(field) => Self::offset_of(field),
            None => Ok(not_present),
        }
    }

    /// Value of a required static field
    pub fn get_field_value<T: FromConfigValue>(
        &self,
        name: &str,
        expected_type: Option<&str>,
    ) -> ConfigResult<T> {
        Self::value_of(self.required_field(name, expected_type)?)
    }

    /// Value of an optional static field
    pub fn get_field_value_or<T: FromConfigValue>(
        &self,
        name: &str,
        expected_type: Option<&str>,
        not_present: T,
    ) -> ConfigResult<T> {
        match self.field(name, expected_type)? {
            Some(field) => Self::value_of(field),
            None => Ok(not_present),
        }
    }

    /// Address of a required static field
    pub fn get_field_address(&self, name: &str, expected_type: Option<&str>) -> ConfigResult<u64> {
        Self::address_of(self.required_field(name, expected_type)?)
    }

    /// Address of an optional static field
    pub fn get_field_address_or(
        &self,
        name: &str,
        expected_type: Option<&str>,
        not_present: u64,
    ) -> ConfigResult<u64> {
        match self.field(name, expected_type)? {
            Some(field) => Self::address_of(field),
            None => Ok(not_present),
        }
    }

    // ========================================================================
    // Flags
    // ========================================================================

    /// Flags missing from the startup table are queried from the VM
    fn flag<T: FromConfigValue>(&self, name: &str) -> ConfigResult<Option<T>> {
        let value = match self.store.flag(name) {
            Some(flag) => Some(flag.value.clone()),
            None => self.boundary.get_flag_value(name),
        };
        value.map(|value| convert(name, &value)).transpose()
    }

    /// Required flag
    pub fn get_flag<T: FromConfigValue>(&self, name: &str) -> ConfigResult<T> {
        self.flag(name)?
            .ok_or_else(|| self.store.missing(ConfigCategory::Flag, name))
    }

    /// Optional flag
    pub fn get_flag_or<T: FromConfigValue>(&self, name: &str, not_present: T) -> ConfigResult<T> {
        Ok(self.flag(name)?.unwrap_or(not_present))
    }

    // ========================================================================
    // Type sizes and addresses
    // ========================================================================

    /// Size of a native type
    pub fn get_type_size(&self, name: &str) -> ConfigResult<i64> {
        self.store
            .type_size(name)
            .ok_or_else(|| self.store.missing(ConfigCategory::TypeSize, name))
    }

    /// Required named address
    pub fn get_address(&self, name: &str) -> ConfigResult<u64> {
        self.store
            .address(name)
            .ok_or_else(|| self.store.missing(ConfigCategory::Address, name))
    }

    /// Optional named address
    pub fn get_address_or(&self, name: &str, not_present: u64) -> ConfigResult<u64> {
        Ok(self.store.address(name).unwrap_or(not_present))
    }
}
