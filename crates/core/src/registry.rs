//! Path-addressed ("NTCore\System\Kernel") key/value façade over the hive
//! (spec §4.G). String-path tokenization, create-if-absent key creation,
//! and type coercion between an external value-type tag and the internal
//! `vk` cell layout. No caching: every call goes through the hive lock.

use std::sync::Arc;

use tracing::instrument;

use crate::error::ConfigError;
use crate::hive::{Hive, Signature};

const INLINE_THRESHOLD: usize = 32;
const LIST_INITIAL_CAPACITY: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    String,
    Dword,
    Qword,
    Binary,
    MultiString,
}

impl ValueType {
    fn to_tag(self) -> u32 {
        match self {
            ValueType::String => 0,
            ValueType::Dword => 1,
            ValueType::Qword => 2,
            ValueType::Binary => 3,
            ValueType::MultiString => 4,
        }
    }

    fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(ValueType::String),
            1 => Some(ValueType::Dword),
            2 => Some(ValueType::Qword),
            3 => Some(ValueType::Binary),
            4 => Some(ValueType::MultiString),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    String(String),
    Dword(u32),
    Qword(u64),
    Binary(Vec<u8>),
    MultiString(Vec<String>),
}

impl Value {
    fn value_type(&self) -> ValueType {
        match self {
            Value::String(_) => ValueType::String,
            Value::Dword(_) => ValueType::Dword,
            Value::Qword(_) => ValueType::Qword,
            Value::Binary(_) => ValueType::Binary,
            Value::MultiString(_) => ValueType::MultiString,
        }
    }

    fn encode(&self) -> Vec<u8> {
        match self {
            Value::String(s) => s.as_bytes().to_vec(),
            Value::Dword(n) => n.to_le_bytes().to_vec(),
            Value::Qword(n) => n.to_le_bytes().to_vec(),
            Value::Binary(b) => b.clone(),
            Value::MultiString(parts) => {
                let mut out = Vec::new();
                for part in parts {
                    out.extend_from_slice(part.as_bytes());
                    out.push(0);
                }
                out
            }
        }
    }

    fn decode(ty: ValueType, bytes: &[u8]) -> Result<Self, ConfigError> {
        match ty {
            ValueType::String => Ok(Value::String(
                String::from_utf8(bytes.to_vec()).map_err(|_| ConfigError::TypeMismatch {
                    expected: "utf8 string",
                    found: "binary",
                })?,
            )),
            ValueType::Dword => {
                let raw: [u8; 4] = bytes.try_into().map_err(|_| ConfigError::TypeMismatch {
                    expected: "4-byte dword",
                    found: "wrong length",
                })?;
                Ok(Value::Dword(u32::from_le_bytes(raw)))
            }
            ValueType::Qword => {
                let raw: [u8; 8] = bytes.try_into().map_err(|_| ConfigError::TypeMismatch {
                    expected: "8-byte qword",
                    found: "wrong length",
                })?;
                Ok(Value::Qword(u64::from_le_bytes(raw)))
            }
            ValueType::Binary => Ok(Value::Binary(bytes.to_vec())),
            ValueType::MultiString => {
                let text = String::from_utf8_lossy(bytes);
                let parts = text
                    .split('\0')
                    .filter(|s| !s.is_empty())
                    .map(|s| s.to_string())
                    .collect();
                Ok(Value::MultiString(parts))
            }
        }
    }
}

/// A flat list of `u32` cell offsets (subkeys or values), stored as
/// `[capacity: u32][count: u32][entries: u32 * capacity]` and grown by
/// doubling via [`Hive::resize`].
mod offset_list {
    use super::*;

    pub fn create(hive: &Hive) -> Result<u32, ConfigError> {
        let payload_len = 8 + LIST_INITIAL_CAPACITY * 4;
        let offset = hive.allocate_tagged(payload_len, Signature::Subkeys)?;
        let mut buf = vec![0u8; payload_len as usize];
        buf[0..4].copy_from_slice(&LIST_INITIAL_CAPACITY.to_le_bytes());
        hive.write(offset, &buf)?;
        Ok(offset)
    }

    pub fn entries(hive: &Hive, offset: u32) -> Result<Vec<u32>, ConfigError> {
        let header = hive.get(offset, 8)?;
        let count = u32::from_le_bytes(header[4..8].try_into().unwrap());
        let body = hive.get(offset, 8 + count * 4)?;
        Ok(body[8..]
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
            .collect())
    }

    pub fn append(hive: &Hive, mut offset: u32, new_entry: u32) -> Result<u32, ConfigError> {
        let header = hive.get(offset, 8)?;
        let capacity = u32::from_le_bytes(header[0..4].try_into().unwrap());
        let count = u32::from_le_bytes(header[4..8].try_into().unwrap());

        if count == capacity {
            let new_capacity = capacity * 2;
            let new_len = 8 + new_capacity * 4;
            offset = hive.resize(offset, new_len)?;
            let mut cap_bytes = [0u8; 4];
            cap_bytes.copy_from_slice(&new_capacity.to_le_bytes());
            hive.write(offset, &[&cap_bytes[..], &count.to_le_bytes()].concat())?;
        }

        let entry_offset = offset + 8 + count * 4;
        hive.write(entry_offset, &new_entry.to_le_bytes())?;
        let new_count = count + 1;
        hive.write(offset + 4, &new_count.to_le_bytes())?;
        Ok(offset)
    }
}

/// `{parent, subkeys, values, security}: u32`, two `u32` counts, a `u16`
/// name length, then the UTF-8 name.
mod key_cell {
    use super::*;

    pub struct KeyCell {
        pub parent: u32,
        pub subkeys: u32,
        pub values: u32,
        pub subkey_count: u32,
        pub value_count: u32,
        pub name: String,
    }

    const FIXED_LEN: usize = 4 + 4 + 4 + 4 + 4 + 4 + 2;

    pub fn create(hive: &Hive, parent: u32, name: &str) -> Result<u32, ConfigError> {
        let cell = KeyCell {
            parent,
            subkeys: 0,
            values: 0,
            subkey_count: 0,
            value_count: 0,
            name: name.to_string(),
        };
        let bytes = encode(&cell);
        let offset = hive.allocate_tagged(bytes.len() as u32, Signature::Key)?;
        hive.write(offset, &bytes)?;
        Ok(offset)
    }

    fn encode(cell: &KeyCell) -> Vec<u8> {
        let mut buf = Vec::with_capacity(FIXED_LEN + cell.name.len());
        buf.extend_from_slice(&cell.parent.to_le_bytes());
        buf.extend_from_slice(&cell.subkeys.to_le_bytes());
        buf.extend_from_slice(&cell.values.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes()); // security_offset, reserved
        buf.extend_from_slice(&cell.subkey_count.to_le_bytes());
        buf.extend_from_slice(&cell.value_count.to_le_bytes());
        buf.extend_from_slice(&(cell.name.len() as u16).to_le_bytes());
        buf.extend_from_slice(cell.name.as_bytes());
        buf
    }

    pub fn read(hive: &Hive, offset: u32) -> Result<KeyCell, ConfigError> {
        let header = hive.get(offset, FIXED_LEN as u32)?;
        let name_len = u16::from_le_bytes(header[22..24].try_into().unwrap()) as u32;
        let full = hive.get(offset, FIXED_LEN as u32 + name_len)?;
        Ok(KeyCell {
            parent: u32::from_le_bytes(full[0..4].try_into().unwrap()),
            subkeys: u32::from_le_bytes(full[4..8].try_into().unwrap()),
            values: u32::from_le_bytes(full[8..12].try_into().unwrap()),
            subkey_count: u32::from_le_bytes(full[16..20].try_into().unwrap()),
            value_count: u32::from_le_bytes(full[20..24].try_into().unwrap()),
            name: String::from_utf8_lossy(&full[FIXED_LEN..]).to_string(),
        })
    }

    pub fn set_subkeys(hive: &Hive, offset: u32, subkeys: u32, subkey_count: u32) -> Result<(), ConfigError> {
        hive.write(offset + 4, &subkeys.to_le_bytes())?;
        hive.write(offset + 16, &subkey_count.to_le_bytes())?;
        Ok(())
    }

    pub fn set_values(hive: &Hive, offset: u32, values: u32, value_count: u32) -> Result<(), ConfigError> {
        hive.write(offset + 8, &values.to_le_bytes())?;
        hive.write(offset + 20, &value_count.to_le_bytes())?;
        Ok(())
    }
}

/// `{type: u32, data_len: u32, name_len: u32, external: u32}`, then either
/// `data_len` inline bytes or a 4-byte external `db`-cell offset, then the
/// name.
mod value_cell {
    use super::*;

    const FIXED_LEN: usize = 4 + 4 + 4 + 4;

    pub fn create(hive: &Hive, name: &str, value: &Value) -> Result<u32, ConfigError> {
        let data = value.encode();
        let external = data.len() > INLINE_THRESHOLD;
        let stored_data_len = if external { 4 } else { data.len() };
        let total = FIXED_LEN + stored_data_len + name.len();

        let data_offset = if external {
            let cell = hive.allocate_tagged(data.len() as u32, Signature::Data)?;
            hive.write(cell, &data)?;
            Some(cell)
        } else {
            None
        };

        let mut buf = Vec::with_capacity(total);
        buf.extend_from_slice(&value.value_type().to_tag().to_le_bytes());
        buf.extend_from_slice(&(data.len() as u32).to_le_bytes());
        buf.extend_from_slice(&(name.len() as u32).to_le_bytes());
        buf.extend_from_slice(&(external as u32).to_le_bytes());
        match data_offset {
            Some(off) => buf.extend_from_slice(&off.to_le_bytes()),
            None => buf.extend_from_slice(&data),
        }
        buf.extend_from_slice(name.as_bytes());

        let offset = hive.allocate_tagged(buf.len() as u32, Signature::Value)?;
        hive.write(offset, &buf)?;
        Ok(offset)
    }

    pub fn read_name(hive: &Hive, offset: u32) -> Result<String, ConfigError> {
        let header = hive.get(offset, FIXED_LEN as u32)?;
        let data_len = u32::from_le_bytes(header[4..8].try_into().unwrap());
        let name_len = u32::from_le_bytes(header[8..12].try_into().unwrap());
        let external = u32::from_le_bytes(header[12..16].try_into().unwrap()) != 0;
        let stored_data_len = if external { 4 } else { data_len };
        let full = hive.get(offset, FIXED_LEN as u32 + stored_data_len + name_len)?;
        let name_start = FIXED_LEN + stored_data_len as usize;
        Ok(String::from_utf8_lossy(&full[name_start..]).to_string())
    }

    pub fn read_value(hive: &Hive, offset: u32) -> Result<Value, ConfigError> {
        let header = hive.get(offset, FIXED_LEN as u32)?;
        let type_tag = u32::from_le_bytes(header[0..4].try_into().unwrap());
        let data_len = u32::from_le_bytes(header[4..8].try_into().unwrap());
        let external = u32::from_le_bytes(header[12..16].try_into().unwrap()) != 0;
        let ty = ValueType::from_tag(type_tag).ok_or(ConfigError::TypeMismatch {
            expected: "known value type",
            found: "unrecognized tag",
        })?;

        let data = if external {
            let full = hive.get(offset, FIXED_LEN as u32 + 4)?;
            let data_offset = u32::from_le_bytes(full[FIXED_LEN..FIXED_LEN + 4].try_into().unwrap());
            hive.get(data_offset, data_len)?
        } else {
            let full = hive.get(offset, FIXED_LEN as u32 + data_len)?;
            full[FIXED_LEN..].to_vec()
        };
        Value::decode(ty, &data)
    }
}

/// Path-addressed key/value façade owning a shared handle to the hive it
/// layers over.
pub struct Registry {
    hive: Arc<Hive>,
}

impl Registry {
    pub fn new(hive: Arc<Hive>) -> Self {
        Self { hive }
    }

    fn tokenize(path: &str) -> Vec<&str> {
        path.split(['\\', '/']).filter(|s| !s.is_empty()).collect()
    }

    fn ensure_root(&self) -> Result<u32, ConfigError> {
        let candidate = self.hive.root_cell();
        if self.hive.validate(candidate).is_ok() {
            if let Ok(cells) = self.hive.walk() {
                if cells
                    .iter()
                    .any(|c| c.offset == candidate && c.signature == Signature::Key)
                {
                    return Ok(candidate);
                }
            }
        }
        let root = key_cell::create(&self.hive, 0, "")?;
        self.hive.set_root_cell(root);
        Ok(root)
    }

    fn find_child(&self, parent_offset: u32, name: &str) -> Result<Option<u32>, ConfigError> {
        let parent = key_cell::read(&self.hive, parent_offset)?;
        if parent.subkeys == 0 {
            return Ok(None);
        }
        for child_offset in offset_list::entries(&self.hive, parent.subkeys)? {
            let child = key_cell::read(&self.hive, child_offset)?;
            if child.name == name {
                return Ok(Some(child_offset));
            }
        }
        Ok(None)
    }

    fn find_or_create_child(&self, parent_offset: u32, name: &str) -> Result<u32, ConfigError> {
        if let Some(existing) = self.find_child(parent_offset, name)? {
            return Ok(existing);
        }
        let new_offset = key_cell::create(&self.hive, parent_offset, name)?;
        let parent = key_cell::read(&self.hive, parent_offset)?;
        let list_offset = if parent.subkeys == 0 {
            offset_list::create(&self.hive)?
        } else {
            parent.subkeys
        };
        let list_offset = offset_list::append(&self.hive, list_offset, new_offset)?;
        key_cell::set_subkeys(&self.hive, parent_offset, list_offset, parent.subkey_count + 1)?;
        Ok(new_offset)
    }

    /// Create every key along `path` that doesn't already exist and
    /// return the offset of the last component.
    #[instrument(skip(self))]
    pub fn create_key(&self, path: &str) -> Result<u32, ConfigError> {
        let mut current = self.ensure_root()?;
        for token in Self::tokenize(path) {
            current = self.find_or_create_child(current, token)?;
        }
        Ok(current)
    }

    /// Returns the key's offset without creating anything, or `None` if
    /// any path component is missing.
    #[instrument(skip(self))]
    pub fn open_key(&self, path: &str) -> Result<Option<u32>, ConfigError> {
        let mut current = self.ensure_root()?;
        for token in Self::tokenize(path) {
            match self.find_child(current, token)? {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    #[instrument(skip(self, value))]
    pub fn set_value(&self, key_offset: u32, name: &str, value: Value) -> Result<(), ConfigError> {
        let key = key_cell::read(&self.hive, key_offset)?;
        if key.values != 0 {
            for vk_offset in offset_list::entries(&self.hive, key.values)? {
                if value_cell::read_name(&self.hive, vk_offset)? == name {
                    // Overwrite by allocating a fresh vk cell and swapping
                    // the pointer; the stale cell is freed.
                    let new_vk = value_cell::create(&self.hive, name, &value)?;
                    let entries = offset_list::entries(&self.hive, key.values)?;
                    let idx = entries.iter().position(|&o| o == vk_offset).unwrap();
                    let slot_offset = key.values + 8 + (idx as u32) * 4;
                    self.hive.write(slot_offset, &new_vk.to_le_bytes())?;
                    self.hive.free(vk_offset)?;
                    return Ok(());
                }
            }
        }

        let vk_offset = value_cell::create(&self.hive, name, &value)?;
        let list_offset = if key.values == 0 {
            offset_list::create(&self.hive)?
        } else {
            key.values
        };
        let list_offset = offset_list::append(&self.hive, list_offset, vk_offset)?;
        key_cell::set_values(&self.hive, key_offset, list_offset, key.value_count + 1)?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn get_value(&self, key_offset: u32, name: &str) -> Result<Option<Value>, ConfigError> {
        let key = key_cell::read(&self.hive, key_offset)?;
        if key.values == 0 {
            return Ok(None);
        }
        for vk_offset in offset_list::entries(&self.hive, key.values)? {
            if value_cell::read_name(&self.hive, vk_offset)? == name {
                return Ok(Some(value_cell::read_value(&self.hive, vk_offset)?));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hive::Hive;

    #[test]
    fn create_key_is_idempotent_and_nested() {
        let registry = Registry::new(Arc::new(Hive::create(65536)));
        let a = registry.create_key(r"NTCore\System\Kernel").unwrap();
        let b = registry.create_key(r"NTCore\System\Kernel").unwrap();
        assert_eq!(a, b);
        assert!(registry.open_key(r"NTCore\System").unwrap().is_some());
        assert!(registry.open_key(r"NTCore\Other").unwrap().is_none());
    }

    #[test]
    fn values_round_trip_by_type() {
        let registry = Registry::new(Arc::new(Hive::create(65536)));
        let key = registry.create_key(r"NTCore\System\Kernel").unwrap();

        registry
            .set_value(key, "Version", Value::String("1.0".into()))
            .unwrap();
        registry.set_value(key, "MaxThreads", Value::Dword(4096)).unwrap();
        registry
            .set_value(key, "BootId", Value::Qword(0xDEAD_BEEF_CAFE))
            .unwrap();
        registry
            .set_value(key, "Blob", Value::Binary(vec![1, 2, 3, 4, 5]))
            .unwrap();
        registry
            .set_value(
                key,
                "SearchPath",
                Value::MultiString(vec!["a".into(), "b".into(), "c".into()]),
            )
            .unwrap();

        assert_eq!(
            registry.get_value(key, "Version").unwrap(),
            Some(Value::String("1.0".into()))
        );
        assert_eq!(registry.get_value(key, "MaxThreads").unwrap(), Some(Value::Dword(4096)));
        assert_eq!(
            registry.get_value(key, "BootId").unwrap(),
            Some(Value::Qword(0xDEAD_BEEF_CAFE))
        );
        assert_eq!(
            registry.get_value(key, "Blob").unwrap(),
            Some(Value::Binary(vec![1, 2, 3, 4, 5]))
        );
        assert_eq!(
            registry.get_value(key, "SearchPath").unwrap(),
            Some(Value::MultiString(vec!["a".into(), "b".into(), "c".into()]))
        );
        assert_eq!(registry.get_value(key, "Missing").unwrap(), None);
    }

    #[test]
    fn set_value_overwrites_existing_entry() {
        let registry = Registry::new(Arc::new(Hive::create(65536)));
        let key = registry.create_key("Config").unwrap();
        registry.set_value(key, "Mode", Value::Dword(1)).unwrap();
        registry.set_value(key, "Mode", Value::Dword(2)).unwrap();
        assert_eq!(registry.get_value(key, "Mode").unwrap(), Some(Value::Dword(2)));
    }

    #[test]
    fn large_binary_value_uses_external_data_cell() {
        let registry = Registry::new(Arc::new(Hive::create(65536)));
        let key = registry.create_key("Config").unwrap();
        let big = vec![7u8; INLINE_THRESHOLD * 4];
        registry.set_value(key, "Big", Value::Binary(big.clone())).unwrap();
        assert_eq!(registry.get_value(key, "Big").unwrap(), Some(Value::Binary(big)));
    }

    #[test]
    fn many_subkeys_force_list_growth() {
        let registry = Registry::new(Arc::new(Hive::create(1 << 20)));
        for i in 0..(LIST_INITIAL_CAPACITY * 3) {
            registry.create_key(&format!("Root\\Child{i}")).unwrap();
        }
        for i in 0..(LIST_INITIAL_CAPACITY * 3) {
            assert!(registry.open_key(&format!("Root\\Child{i}")).unwrap().is_some());
        }
    }
}
