//! Mutable CIM instances shared through reference-counted handles.
//!
//! An [`Instance`] is a handle: cloning it shares the same underlying state,
//! so a filter applied through one handle is visible through all of them.
//! [`Instance::clone_instance`] makes an independent deep copy.

use std::fmt;
use std::sync::Arc;

use cim_codec::{ConstClass, InstanceDescriptor, InstanceProperty, InstanceView, MsgSegment};
use cim_types::{CimType, CimValue, DataType, ObjectPath, ValueState};
use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use tracing::{debug, trace};

use crate::arena::RequestArena;
use crate::error::{InstanceError, InstanceResult};
use crate::source::ClassSource;

/// A property as returned by [`Instance::get_property`].
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyData {
    pub name: String,
    pub data_type: DataType,
    pub value: Option<CimValue>,
    pub state: ValueState,
}

/// Requested properties plus the key properties that identify the instance.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PropertyFilter {
    pub properties: Vec<String>,
    pub keys: Vec<String>,
}

impl PropertyFilter {
    /// Whether a property named `name` may be populated.
    pub fn admits(&self, name: &str) -> bool {
        self.properties
            .iter()
            .chain(self.keys.iter())
            .any(|n| n.eq_ignore_ascii_case(name))
    }
}

#[derive(Clone)]
enum SlotValue {
    Ready(Option<CimValue>),
    /// Still encoded in the buffer the instance arrived in.
    Encoded { source: Arc<InstanceView>, index: usize },
}

#[derive(Clone)]
struct Slot {
    name: String,
    data_type: DataType,
    state: ValueState,
    value: SlotValue,
}

impl Slot {
    fn new(name: &str, data_type: DataType, value: Option<CimValue>, key: bool) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            state: ValueState {
                key,
                null: value.is_none(),
            },
            value: SlotValue::Ready(value),
        }
    }

    /// Current value, decoding from the source buffer without caching.
    fn current(&self) -> InstanceResult<Option<CimValue>> {
        match &self.value {
            SlotValue::Ready(value) => Ok(value.clone()),
            SlotValue::Encoded { source, index } => decode_slot(source, *index),
        }
    }

    fn materialize(&mut self) -> InstanceResult<()> {
        if let SlotValue::Encoded { source, index } = &self.value {
            let value = decode_slot(source, *index)?;
            trace!(property = %self.name, "materialized encoded value");
            self.value = SlotValue::Ready(value);
        }
        Ok(())
    }

    fn snapshot(&self) -> InstanceResult<PropertyData> {
        Ok(PropertyData {
            name: self.name.clone(),
            data_type: self.data_type,
            value: self.current()?,
            state: self.state,
        })
    }
}

fn decode_slot(source: &InstanceView, index: usize) -> InstanceResult<Option<CimValue>> {
    let property = source
        .property_at(index)
        .ok_or_else(|| InstanceError::NoSuchProperty(format!("#{index}")))?;
    let (_, _, value) = property.decode()?;
    Ok(value)
}

#[derive(Clone)]
struct InstanceData {
    namespace: Option<String>,
    class_name: String,
    slots: Vec<Slot>,
    filter: Option<PropertyFilter>,
    dropped: usize,
}

impl InstanceData {
    fn new(namespace: Option<&str>, class_name: &str) -> Self {
        Self {
            namespace: namespace.map(str::to_string),
            class_name: class_name.to_string(),
            slots: Vec::new(),
            filter: None,
            dropped: 0,
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.name.eq_ignore_ascii_case(name))
    }

    fn slot(&self, name: &str) -> InstanceResult<&Slot> {
        self.position(name)
            .map(|i| &self.slots[i])
            .ok_or_else(|| InstanceError::NoSuchProperty(name.to_string()))
    }

    /// Store a value, or count it as dropped when the filter excludes it.
    fn set(&mut self, name: &str, data_type: DataType, value: Option<CimValue>, key: bool) -> bool {
        if let Some(filter) = &self.filter {
            if !filter.admits(name) {
                self.dropped += 1;
                trace!(property = name, "dropped filtered property");
                return false;
            }
        }
        match self.position(name) {
            Some(i) => {
                let slot = &mut self.slots[i];
                slot.data_type = data_type;
                slot.state = ValueState {
                    key: key || slot.state.key,
                    null: value.is_none(),
                };
                slot.value = SlotValue::Ready(value);
            }
            None => self.slots.push(Slot::new(name, data_type, value, key)),
        }
        true
    }

    fn apply_filter(&mut self, filter: PropertyFilter) {
        let before = self.slots.len();
        self.slots.retain(|s| filter.admits(&s.name));
        debug!(
            class = %self.class_name,
            kept = self.slots.len(),
            removed = before - self.slots.len(),
            "applied property filter"
        );
        self.filter = Some(filter);
    }

    /// Key bindings from key-flagged properties, falling back to the class
    /// key list when none are flagged.
    fn object_path(&self, source: &dyn ClassSource) -> InstanceResult<ObjectPath> {
        let mut path = ObjectPath::new(self.namespace.as_deref(), self.class_name.clone());
        for slot in self.slots.iter().filter(|s| s.state.key) {
            if let Some(value) = slot.current()? {
                path.add_key(slot.name.clone(), value);
            }
        }
        if !path.has_keys() {
            let keys = source.key_list(self.namespace.as_deref(), &self.class_name)?;
            for key in keys {
                if let Some(slot) = self.position(&key).map(|i| &self.slots[i]) {
                    if let Some(value) = slot.current()? {
                        path.add_key(key, value);
                    }
                }
            }
        }
        Ok(path)
    }

    /// Names of the properties that identify the instance: every
    /// key-flagged property whether set or not, or the class key list when
    /// none are flagged.
    fn key_names(&self, source: &dyn ClassSource) -> InstanceResult<Vec<String>> {
        let flagged: Vec<String> = self
            .slots
            .iter()
            .filter(|s| s.state.key)
            .map(|s| s.name.clone())
            .collect();
        if !flagged.is_empty() {
            return Ok(flagged);
        }
        source.key_list(self.namespace.as_deref(), &self.class_name)
    }

    fn to_descriptor(&self) -> InstanceResult<InstanceDescriptor> {
        let mut descriptor = InstanceDescriptor::new(self.namespace.as_deref(), self.class_name.clone());
        for slot in &self.slots {
            descriptor.properties.push(InstanceProperty {
                name: slot.name.clone(),
                data_type: slot.data_type,
                value: slot.current()?,
                key: slot.state.key,
            });
        }
        Ok(descriptor)
    }
}

/// Handle to a CIM instance.
///
/// Clones share state. After [`Instance::release`] every sharing handle
/// reports [`InstanceError::InvalidHandle`].
#[derive(Clone)]
pub struct Instance {
    inner: Arc<RwLock<Option<InstanceData>>>,
}

impl Instance {
    fn from_data(data: InstanceData) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(data))),
        }
    }

    /// An instance with no properties.
    pub fn new(namespace: Option<&str>, class_name: &str) -> Self {
        Self::from_data(InstanceData::new(namespace, class_name))
    }

    /// An instance seeded from the class: every declared property with its
    /// default value (or null), key properties flagged as keys.
    pub fn from_class(namespace: Option<&str>, class: &ConstClass) -> Self {
        let mut data = InstanceData::new(namespace, class.name());
        for property in class.properties() {
            let data_type = property
                .data_type()
                .unwrap_or(DataType::scalar(CimType::String));
            data.slots.push(Slot::new(
                property.name(),
                data_type,
                property.value(),
                property.is_key(),
            ));
        }
        Self::from_data(data)
    }

    /// Look the class up in `source` and seed a new instance from it.
    pub fn create(source: &dyn ClassSource, namespace: Option<&str>, class_name: &str) -> InstanceResult<Self> {
        let class = source.lookup_class(namespace, class_name)?;
        Ok(Self::from_class(namespace, &class))
    }

    /// Like [`Instance::create`], registered with `arena` so that it is
    /// released when the request ends.
    pub fn new_tracked(
        arena: &RequestArena,
        source: &dyn ClassSource,
        namespace: Option<&str>,
        class_name: &str,
    ) -> InstanceResult<Self> {
        let instance = Self::create(source, namespace, class_name)?;
        arena.track(&instance);
        Ok(instance)
    }

    /// Rebuild an instance from a transport segment. Array and reference
    /// values stay encoded until first read.
    pub fn from_segment(segment: MsgSegment) -> InstanceResult<Self> {
        let view = Arc::new(segment.into_instance()?);
        let mut data = InstanceData::new(view.namespace(), view.class_name());
        for (index, property) in view.properties().enumerate() {
            let (data_type, state, value) = match property.data_type() {
                Some(dt) if dt.array || dt.base == CimType::Reference => (
                    dt,
                    property.state(),
                    SlotValue::Encoded {
                        source: Arc::clone(&view),
                        index,
                    },
                ),
                _ => {
                    let (dt, state, value) = property.decode()?;
                    (dt, state, SlotValue::Ready(value))
                }
            };
            data.slots.push(Slot {
                name: property.name().to_string(),
                data_type,
                state,
                value,
            });
        }
        Ok(Self::from_data(data))
    }

    /// Encode the instance for transport.
    pub fn to_segment(&self) -> InstanceResult<MsgSegment> {
        let descriptor = self.with_data(|d| d.to_descriptor())??;
        let view = InstanceView::from_descriptor(&descriptor)?;
        Ok(MsgSegment::from_instance(&view))
    }

    fn with_data<T>(&self, f: impl FnOnce(&InstanceData) -> T) -> InstanceResult<T> {
        let guard = self.inner.read();
        guard.as_ref().map(f).ok_or(InstanceError::InvalidHandle)
    }

    fn with_data_mut<T>(&self, f: impl FnOnce(&mut InstanceData) -> T) -> InstanceResult<T> {
        let mut guard = self.inner.write();
        guard.as_mut().map(f).ok_or(InstanceError::InvalidHandle)
    }

    pub fn is_valid(&self) -> bool {
        self.inner.read().is_some()
    }

    /// Whether `other` is a handle to the same instance.
    pub fn same_handle(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of handles sharing this instance.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub fn namespace(&self) -> InstanceResult<Option<String>> {
        self.with_data(|d| d.namespace.clone())
    }

    pub fn class_name(&self) -> InstanceResult<String> {
        self.with_data(|d| d.class_name.clone())
    }

    /// Set a property value. With a filter active, a property outside it is
    /// not stored; the drop is counted and the call still succeeds.
    pub fn set_property(&self, name: &str, value: Option<CimValue>, data_type: DataType) -> InstanceResult<()> {
        if let Some(value) = &value {
            value.check_type(data_type)?;
        }
        self.with_data_mut(|d| {
            d.set(name, data_type, value, false);
        })
    }

    /// Set a property and flag it as part of the object path.
    pub fn set_key_property(&self, name: &str, value: CimValue) -> InstanceResult<()> {
        let data_type = value.data_type();
        self.with_data_mut(|d| {
            d.set(name, data_type, Some(value), true);
        })
    }

    pub fn get_property(&self, name: &str) -> InstanceResult<PropertyData> {
        let guard = self.inner.upgradable_read();
        let data = guard.as_ref().ok_or(InstanceError::InvalidHandle)?;
        let index = data
            .position(name)
            .ok_or_else(|| InstanceError::NoSuchProperty(name.to_string()))?;
        self.slot_at(guard, index)
    }

    pub fn get_property_at(&self, index: usize) -> InstanceResult<PropertyData> {
        let guard = self.inner.upgradable_read();
        let data = guard.as_ref().ok_or(InstanceError::InvalidHandle)?;
        if index >= data.slots.len() {
            return Err(InstanceError::NoSuchProperty(format!("#{index}")));
        }
        self.slot_at(guard, index)
    }

    /// Read slot `index`, decoding and caching an encoded value first.
    fn slot_at(
        &self,
        guard: RwLockUpgradableReadGuard<'_, Option<InstanceData>>,
        index: usize,
    ) -> InstanceResult<PropertyData> {
        let ready = guard
            .as_ref()
            .is_some_and(|d| matches!(d.slots[index].value, SlotValue::Ready(_)));
        if ready {
            let data = guard.as_ref().ok_or(InstanceError::InvalidHandle)?;
            return data.slots[index].snapshot();
        }
        let mut guard = RwLockUpgradableReadGuard::upgrade(guard);
        let data = guard.as_mut().ok_or(InstanceError::InvalidHandle)?;
        let slot = &mut data.slots[index];
        slot.materialize()?;
        slot.snapshot()
    }

    pub fn property_count(&self) -> InstanceResult<usize> {
        self.with_data(|d| d.slots.len())
    }

    pub fn property_names(&self) -> InstanceResult<Vec<String>> {
        self.with_data(|d| d.slots.iter().map(|s| s.name.clone()).collect())
    }

    /// How many `set_property` calls the active filter discarded.
    pub fn dropped_count(&self) -> InstanceResult<usize> {
        self.with_data(|d| d.dropped)
    }

    pub fn is_filtered(&self) -> InstanceResult<bool> {
        self.with_data(|d| d.filter.is_some())
    }

    pub fn filter(&self) -> InstanceResult<Option<PropertyFilter>> {
        self.with_data(|d| d.filter.clone())
    }

    /// Restrict the instance to `properties` plus its key properties.
    ///
    /// The key names come from the instance's key-flagged properties, set or
    /// not, or from the class key list when none are flagged. The new content
    /// replaces the old in place, so every handle sees the filtered
    /// instance. `None` leaves the instance unchanged.
    pub fn set_property_filter(&self, properties: Option<&[&str]>, source: &dyn ClassSource) -> InstanceResult<()> {
        let Some(properties) = properties else {
            return Ok(());
        };
        let mut guard = self.inner.write();
        let data = guard.as_mut().ok_or(InstanceError::InvalidHandle)?;
        let keys = data.key_names(source)?;

        let mut filtered = data.clone();
        filtered.apply_filter(PropertyFilter {
            properties: properties.iter().map(|p| p.to_string()).collect(),
            keys,
        });
        *data = filtered;
        Ok(())
    }

    /// The instance's identity. Key-flagged properties are used when
    /// present; otherwise the class key list is fetched from `source`.
    ///
    /// Keys whose value is null have no binding in the returned path.
    pub fn object_path(&self, source: &dyn ClassSource) -> InstanceResult<ObjectPath> {
        let guard = self.inner.read();
        let data = guard.as_ref().ok_or(InstanceError::InvalidHandle)?;
        data.object_path(source)
    }

    /// Adopt the namespace, class, and keys of `path`. An active filter is
    /// re-applied with the path's key names.
    pub fn set_object_path(&self, path: &ObjectPath) -> InstanceResult<()> {
        self.with_data_mut(|d| {
            if let Some(namespace) = &path.namespace {
                d.namespace = Some(namespace.clone());
            }
            d.class_name = path.class_name.clone();
            let refilter = d.filter.take().map(|f| PropertyFilter {
                properties: f.properties,
                keys: path.key_names().map(str::to_string).collect(),
            });
            for binding in &path.keys {
                d.set(&binding.name, binding.value.data_type(), Some(binding.value.clone()), true);
            }
            if let Some(filter) = refilter {
                d.apply_filter(filter);
            }
        })
    }

    /// Set `CreationClassName` to the instance's class and
    /// `SystemCreationClassName` to `system_class`, both as keys.
    pub fn set_creation_class_names(&self, system_class: &str) -> InstanceResult<()> {
        let class_name = self.class_name()?;
        self.set_key_property("CreationClassName", CimValue::String(class_name))?;
        self.set_key_property("SystemCreationClassName", CimValue::String(system_class.to_string()))
    }

    /// Structural equality: same property count, and every property of
    /// `self` has a same-named, same-typed, equal-valued counterpart.
    pub fn compare(&self, other: &Instance) -> InstanceResult<bool> {
        if self.same_handle(other) {
            return self.with_data(|_| true);
        }
        // Only one instance lock is held at a time.
        let ours = self.with_data(|d| {
            d.slots
                .iter()
                .map(|s| Ok((s.name.clone(), s.data_type, s.current()?)))
                .collect::<InstanceResult<Vec<_>>>()
        })??;
        let guard = other.inner.read();
        let theirs = guard.as_ref().ok_or(InstanceError::InvalidHandle)?;
        if ours.len() != theirs.slots.len() {
            return Ok(false);
        }
        for (name, data_type, value) in ours {
            let Some(slot) = theirs.position(&name).map(|i| &theirs.slots[i]) else {
                return Ok(false);
            };
            if slot.data_type != data_type || slot.current()? != value {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// An independent copy with its own handle.
    pub fn clone_instance(&self) -> InstanceResult<Instance> {
        self.with_data(|d| Self::from_data(d.clone()))
    }

    /// Drop the instance's content. Every sharing handle becomes invalid.
    pub fn release(&self) {
        if self.inner.write().take().is_some() {
            trace!("released instance");
        }
    }

    pub fn to_descriptor(&self) -> InstanceResult<InstanceDescriptor> {
        self.with_data(|d| d.to_descriptor())?
    }

    /// Value of `name`, failing when the property is absent.
    pub fn value(&self, name: &str) -> InstanceResult<Option<CimValue>> {
        self.with_data(|d| d.slot(name).and_then(Slot::current))?
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.inner.read();
        match guard.as_ref() {
            Some(d) => f
                .debug_struct("Instance")
                .field("namespace", &d.namespace)
                .field("class_name", &d.class_name)
                .field("properties", &d.slots.len())
                .field("filtered", &d.filter.is_some())
                .finish(),
            None => f.write_str("Instance(<released>)"),
        }
    }
}

/// MOF-like rendering.
impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.inner.read();
        let Some(d) = guard.as_ref() else {
            return f.write_str("// released instance");
        };
        writeln!(f, "instance of {}", d.class_name)?;
        f.write_str("{\n")?;
        for slot in &d.slots {
            f.write_str("    ")?;
            if slot.state.key {
                f.write_str("[Key] ")?;
            }
            match slot.current() {
                Ok(Some(value)) => writeln!(f, "{} = {value};", slot.name)?,
                Ok(None) => writeln!(f, "{} = NULL;", slot.name)?,
                Err(_) => writeln!(f, "{} = <undecodable>;", slot.name)?,
            }
        }
        f.write_str("};")
    }
}
