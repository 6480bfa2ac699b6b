//! Object and instance arena
//!
//! Objects are stored type-erased behind [`ObjectEntry`]; instance data lives
//! in a single arena keyed by `(object_id, instance_id)` and is handed to the
//! owning object's capabilities by reference for the duration of a call.

use crate::error::{Lwm2mError, Lwm2mResult};
use crate::object::{Lwm2mObject, Operation};
use log::debug;
use lwm2m_core::{ContentType, Lwm2mPath, Resource};
use lwm2m_tlv::Tlv;
use std::any::{Any, TypeId};
use std::collections::BTreeMap;

type InstanceData = Box<dyn Any + Send>;

/// Type-erased view of an [`Lwm2mObject`]
trait ObjectEntry: Send {
    fn id(&self) -> u16;
    fn resource_count(&self) -> u16;
    fn instance_type(&self) -> TypeId;
    fn supports(&mut self, operation: Operation) -> bool;
    fn create(&mut self, iid: u16, content_type: ContentType, content: &[u8])
        -> Lwm2mResult<InstanceData>;
    fn read(&self, instance: &InstanceData, iid: u16, rid: u16) -> Lwm2mResult<Resource>;
    fn write_resource(&mut self, instance: &mut InstanceData, iid: u16, resource: &Resource)
        -> Lwm2mResult<()>;
    fn write_tlv(&mut self, instance: &mut InstanceData, iid: u16, tlvs: &[Tlv]) -> Lwm2mResult<()>;
    fn execute(&mut self, instance: &mut InstanceData, iid: u16, rid: u16, args: &[u8])
        -> Lwm2mResult<()>;
    fn delete(&mut self, instance: &mut InstanceData, iid: u16) -> Lwm2mResult<()>;
}

struct Erased<O>(O);

fn unsupported(object_id: u16, operation: Operation) -> Lwm2mError {
    Lwm2mError::Unsupported(format!("object {} does not support {}", object_id, operation))
}

fn wrong_instance(object_id: u16) -> Lwm2mError {
    Lwm2mError::InvalidState(format!("instance data of object {} has the wrong type", object_id))
}

impl<O: Lwm2mObject> Erased<O> {
    fn downcast<'a>(&self, instance: &'a InstanceData) -> Lwm2mResult<&'a O::Instance> {
        instance
            .downcast_ref::<O::Instance>()
            .ok_or_else(|| wrong_instance(self.0.id()))
    }

    fn downcast_mut<'a>(id: u16, instance: &'a mut InstanceData) -> Lwm2mResult<&'a mut O::Instance> {
        instance
            .downcast_mut::<O::Instance>()
            .ok_or_else(|| wrong_instance(id))
    }
}

impl<O: Lwm2mObject> ObjectEntry for Erased<O> {
    fn id(&self) -> u16 {
        self.0.id()
    }

    fn resource_count(&self) -> u16 {
        self.0.resource_count()
    }

    fn instance_type(&self) -> TypeId {
        TypeId::of::<O::Instance>()
    }

    fn supports(&mut self, operation: Operation) -> bool {
        match operation {
            Operation::Create => self.0.creator().is_some(),
            Operation::Read => self.0.reader().is_some(),
            Operation::WriteResource => self.0.resource_writer().is_some(),
            Operation::WriteTlv => self.0.tlv_writer().is_some(),
            Operation::Execute => self.0.executor().is_some(),
            Operation::Delete => self.0.deleter().is_some(),
        }
    }

    fn create(&mut self, iid: u16, content_type: ContentType, content: &[u8])
        -> Lwm2mResult<InstanceData> {
        let id = self.0.id();
        let creator = self.0.creator().ok_or_else(|| unsupported(id, Operation::Create))?;
        let instance = creator.create(iid, content_type, content)?;
        Ok(Box::new(instance))
    }

    fn read(&self, instance: &InstanceData, iid: u16, rid: u16) -> Lwm2mResult<Resource> {
        let reader = self
            .0
            .reader()
            .ok_or_else(|| unsupported(self.0.id(), Operation::Read))?;
        reader.read(self.downcast(instance)?, iid, rid)
    }

    fn write_resource(&mut self, instance: &mut InstanceData, iid: u16, resource: &Resource)
        -> Lwm2mResult<()> {
        let id = self.0.id();
        let writer = self
            .0
            .resource_writer()
            .ok_or_else(|| unsupported(id, Operation::WriteResource))?;
        writer.write_resource(Self::downcast_mut(id, instance)?, iid, resource)
    }

    fn write_tlv(&mut self, instance: &mut InstanceData, iid: u16, tlvs: &[Tlv]) -> Lwm2mResult<()> {
        let id = self.0.id();
        let writer = self
            .0
            .tlv_writer()
            .ok_or_else(|| unsupported(id, Operation::WriteTlv))?;
        writer.write_tlv(Self::downcast_mut(id, instance)?, iid, tlvs)
    }

    fn execute(&mut self, instance: &mut InstanceData, iid: u16, rid: u16, args: &[u8])
        -> Lwm2mResult<()> {
        let id = self.0.id();
        let executor = self
            .0
            .executor()
            .ok_or_else(|| unsupported(id, Operation::Execute))?;
        executor.execute(Self::downcast_mut(id, instance)?, iid, rid, args)
    }

    fn delete(&mut self, instance: &mut InstanceData, iid: u16) -> Lwm2mResult<()> {
        let id = self.0.id();
        let deleter = self
            .0
            .deleter()
            .ok_or_else(|| unsupported(id, Operation::Delete))?;
        deleter.delete(Self::downcast_mut(id, instance)?, iid)
    }
}

/// Registered objects and the arena of their instances
#[derive(Default)]
pub struct ObjectRegistry {
    objects: BTreeMap<u16, Box<dyn ObjectEntry>>,
    instances: BTreeMap<(u16, u16), InstanceData>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an object definition
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` if an object with the same id is registered.
    pub fn register<O: Lwm2mObject>(&mut self, object: O) -> Lwm2mResult<()> {
        let id = object.id();
        if self.objects.contains_key(&id) {
            return Err(Lwm2mError::AlreadyExists(format!("object {}", id)));
        }
        self.objects.insert(id, Box::new(Erased(object)));
        Ok(())
    }

    pub fn contains_object(&self, object_id: u16) -> bool {
        self.objects.contains_key(&object_id)
    }

    pub fn contains_instance(&self, object_id: u16, instance_id: u16) -> bool {
        self.instances.contains_key(&(object_id, instance_id))
    }

    /// Ids of every registered object, ascending
    pub fn object_ids(&self) -> Vec<u16> {
        self.objects.keys().copied().collect()
    }

    /// Ids of the instances of one object, ascending
    pub fn instance_ids(&self, object_id: u16) -> Vec<u16> {
        self.instances
            .range((object_id, 0)..=(object_id, u16::MAX))
            .map(|((_, iid), _)| *iid)
            .collect()
    }

    pub fn resource_count(&self, object_id: u16) -> Option<u16> {
        self.objects.get(&object_id).map(|o| o.resource_count())
    }

    /// True if the object implements `operation`
    pub fn supports(&mut self, object_id: u16, operation: Operation) -> bool {
        self.objects
            .get_mut(&object_id)
            .is_some_and(|o| o.supports(operation))
    }

    fn object(&self, object_id: u16) -> Lwm2mResult<&dyn ObjectEntry> {
        self.objects
            .get(&object_id)
            .map(|o| o.as_ref())
            .ok_or_else(|| Lwm2mError::UnknownPath(Lwm2mPath::object(object_id).to_string()))
    }

    fn object_and_instance(
        &mut self,
        object_id: u16,
        instance_id: u16,
    ) -> Lwm2mResult<(&mut Box<dyn ObjectEntry>, &mut InstanceData)> {
        let object = self
            .objects
            .get_mut(&object_id)
            .ok_or_else(|| Lwm2mError::UnknownPath(Lwm2mPath::object(object_id).to_string()))?;
        let instance = self
            .instances
            .get_mut(&(object_id, instance_id))
            .ok_or_else(|| {
                Lwm2mError::NotFound(Lwm2mPath::instance(object_id, instance_id).to_string())
            })?;
        Ok((object, instance))
    }

    /// Smallest instance id not in use for the object
    pub fn next_instance_id(&self, object_id: u16) -> Lwm2mResult<u16> {
        let mut candidate = 0u16;
        for iid in self.instance_ids(object_id) {
            if iid != candidate {
                break;
            }
            candidate = candidate.checked_add(1).ok_or(Lwm2mError::OutOfMemory)?;
        }
        if candidate == lwm2m_core::path::MAX_ID {
            return Err(Lwm2mError::OutOfMemory);
        }
        Ok(candidate)
    }

    /// Insert locally created instance data under a given id
    ///
    /// # Errors
    ///
    /// Returns `UnknownPath` if the object is not registered, `InvalidArgument`
    /// if `I` is not the object's instance type, and `AlreadyExists` if the
    /// id is taken.
    pub fn insert_instance<I: Send + 'static>(
        &mut self,
        object_id: u16,
        instance_id: u16,
        instance: I,
    ) -> Lwm2mResult<()> {
        let object = self.object(object_id)?;
        if object.instance_type() != TypeId::of::<I>() {
            return Err(Lwm2mError::InvalidArgument(format!(
                "instance type does not belong to object {}",
                object_id
            )));
        }
        if self.contains_instance(object_id, instance_id) {
            return Err(Lwm2mError::AlreadyExists(
                Lwm2mPath::instance(object_id, instance_id).to_string(),
            ));
        }
        self.instances
            .insert((object_id, instance_id), Box::new(instance));
        debug!("Added instance {}", Lwm2mPath::instance(object_id, instance_id));
        Ok(())
    }

    /// Insert locally created instance data under the next free id
    pub fn add_instance<I: Send + 'static>(&mut self, object_id: u16, instance: I) -> Lwm2mResult<u16> {
        let instance_id = self.next_instance_id(object_id)?;
        self.insert_instance(object_id, instance_id, instance)?;
        Ok(instance_id)
    }

    /// Borrow instance data for local use
    pub fn instance<I: 'static>(&self, object_id: u16, instance_id: u16) -> Option<&I> {
        self.instances
            .get(&(object_id, instance_id))
            .and_then(|i| i.downcast_ref::<I>())
    }

    /// Mutably borrow instance data for local use
    pub fn instance_mut<I: 'static>(&mut self, object_id: u16, instance_id: u16) -> Option<&mut I> {
        self.instances
            .get_mut(&(object_id, instance_id))
            .and_then(|i| i.downcast_mut::<I>())
    }

    /// Create an instance through the object's `create` capability
    ///
    /// Without an explicit id the next free one is used.
    ///
    /// # Returns
    ///
    /// The id of the new instance.
    pub fn create_instance(
        &mut self,
        object_id: u16,
        instance_id: Option<u16>,
        content_type: ContentType,
        content: &[u8],
    ) -> Lwm2mResult<u16> {
        self.object(object_id)?;
        let instance_id = match instance_id {
            Some(iid) if self.contains_instance(object_id, iid) => {
                return Err(Lwm2mError::AlreadyExists(
                    Lwm2mPath::instance(object_id, iid).to_string(),
                ));
            }
            Some(iid) => iid,
            None => self.next_instance_id(object_id)?,
        };

        let object = self
            .objects
            .get_mut(&object_id)
            .ok_or_else(|| Lwm2mError::UnknownPath(Lwm2mPath::object(object_id).to_string()))?;
        let data = object.create(instance_id, content_type, content)?;
        self.instances.insert((object_id, instance_id), data);
        debug!("Created instance {}", Lwm2mPath::instance(object_id, instance_id));
        Ok(instance_id)
    }

    /// Read one resource
    pub fn read_resource(&self, object_id: u16, instance_id: u16, resource_id: u16)
        -> Lwm2mResult<Resource> {
        let object = self.object(object_id)?;
        let instance = self.instances.get(&(object_id, instance_id)).ok_or_else(|| {
            Lwm2mError::NotFound(Lwm2mPath::instance(object_id, instance_id).to_string())
        })?;
        object.read(instance, instance_id, resource_id)
    }

    /// Read every resource of an instance
    ///
    /// Walks resource ids `0..resource_count`, skipping empty and undefined
    /// resources. Any other error aborts the read.
    pub fn read_instance(&self, object_id: u16, instance_id: u16) -> Lwm2mResult<Vec<Resource>> {
        let object = self.object(object_id)?;
        let instance = self.instances.get(&(object_id, instance_id)).ok_or_else(|| {
            Lwm2mError::NotFound(Lwm2mPath::instance(object_id, instance_id).to_string())
        })?;

        let mut resources = Vec::new();
        for resource_id in 0..object.resource_count() {
            match object.read(instance, instance_id, resource_id) {
                Ok(resource) => resources.push(resource),
                Err(e) if e.is_skippable_read() => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(resources)
    }

    pub fn write_resource(&mut self, object_id: u16, instance_id: u16, resource: &Resource)
        -> Lwm2mResult<()> {
        let (object, instance) = self.object_and_instance(object_id, instance_id)?;
        object.write_resource(instance, instance_id, resource)
    }

    pub fn write_tlv(&mut self, object_id: u16, instance_id: u16, tlvs: &[Tlv]) -> Lwm2mResult<()> {
        let (object, instance) = self.object_and_instance(object_id, instance_id)?;
        object.write_tlv(instance, instance_id, tlvs)
    }

    pub fn execute(&mut self, object_id: u16, instance_id: u16, resource_id: u16, args: &[u8])
        -> Lwm2mResult<()> {
        let (object, instance) = self.object_and_instance(object_id, instance_id)?;
        object.execute(instance, instance_id, resource_id, args)
    }

    /// Delete an instance through the object's `delete` capability
    ///
    /// The instance stays in the arena unless the capability exists and
    /// succeeds.
    pub fn delete_instance(&mut self, object_id: u16, instance_id: u16) -> Lwm2mResult<()> {
        let (object, instance) = self.object_and_instance(object_id, instance_id)?;
        object.delete(instance, instance_id)?;
        self.instances.remove(&(object_id, instance_id));
        debug!("Deleted instance {}", Lwm2mPath::instance(object_id, instance_id));
        Ok(())
    }
}
